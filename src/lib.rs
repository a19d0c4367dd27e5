// streamdkim – streaming DKIM signing and verification engine
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! A streaming implementation of *DomainKeys Identified Mail* (DKIM) signing
//! and verification, as described in [RFC 6376].
//!
//! A message is fed to a [`Context`] as it arrives, in chunks of any size.
//! Headers are collected, while the body is canonicalized and hashed line by
//! line and is not retained in memory. At the end of the message,
//! [`Context::finish`] either produces the requested `DKIM-Signature` headers
//! or verifies the signatures found in the message.
//!
//! The lower-level building blocks (canonicalization, signature and key record
//! parsing, header formatting) are available in the public modules.
//!
//! # Usage
//!
//! Verification needs a DNS TXT lookup, any implementation of
//! [`LookupTxt`], for example a closure:
//!
//! ```
//! use streamdkim::Context;
//!
//! let lookup = |_name: &str| -> Option<String> {
//!     // look up the TXT record …
//!     None
//! };
//!
//! let mut ctx = Context::init_verify(lookup, false);
//! ctx.feed(b"From: me@example.com\r\n\r\nHello!\r\n").unwrap();
//! let outcome = ctx.finish().unwrap();
//!
//! assert!(!outcome.verified);
//! ```
//!
//! Signing takes one [`SignRequest`] per signature to produce:
//!
//! ```no_run
//! use streamdkim::{Context, SignRequest};
//!
//! # let private_key_pem = String::new();
//! let request = SignRequest::new("example.com", "selector", private_key_pem, "sha256").unwrap();
//!
//! let mut ctx = Context::init_sign(false);
//! ctx.add_sign_request(request).unwrap();
//! ctx.feed(b"From: me@example.com\r\n\r\nHello!\r\n").unwrap();
//! let outcome = ctx.finish().unwrap();
//!
//! let header = outcome.signatures[0].header.as_ref().unwrap();
//! ```
//!
//! # Cargo features
//!
//! The feature **`pre-rfc8301`** enables the historic SHA-1 hash algorithm
//! (dependency `sha1`), for both signing and verification. Its use is
//! strongly discouraged.
//!
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376

pub mod body_hash;
pub mod canonicalize;
pub mod context;
pub mod crypto;
pub mod header;
pub mod message_hash;
mod parse;
pub mod quoted_printable;
pub mod record;
pub mod signature;
pub mod signer;
mod util;
pub mod verifier;

pub use crate::{
    context::{Context, FeedError, Outcome, MAX_BODY_LINE_LEN, MAX_HEADERS, MAX_HEADER_LEN},
    crypto::{HashAlgorithm, KeyType},
    signature::{Canonicalization, CanonicalizationAlgorithm, Signature},
    signer::{SignRequest, SignerError, Timestamp},
    util::{decode_base64, encode_base64, Base64Error, CanonicalStr},
    verifier::{Config, LookupTxt, VerificationReason, VerificationStatus},
};
