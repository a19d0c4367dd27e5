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

//! Representation of a DKIM signature.

mod parse;

pub use parse::parse_signature;

use crate::{
    body_hash::{BodyHashId, BodyHashKey},
    crypto::{HashAlgorithm, KeyType},
    record::PublicKeyRecord,
    signer::SignerError,
    util::CanonicalStr,
    verifier::{VerificationReason, VerificationStatus},
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// The name of the DKIM signature header.
pub const DKIM_SIGNATURE_NAME: &str = "DKIM-Signature";

/// The only supported signature version, the value of the `v=` tag.
pub const SIGNATURE_VERSION: &str = "1";

/// A canonicalization algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CanonicalizationAlgorithm {
    /// The *simple* canonicalization algorithm.
    #[default]
    Simple,
    /// The *relaxed* canonicalization algorithm.
    Relaxed,
}

impl CanonicalStr for CanonicalizationAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }
}

impl Display for CanonicalizationAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for CanonicalizationAlgorithm {
    type Err = ParseCanonicalizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("simple") {
            Ok(Self::Simple)
        } else if s.eq_ignore_ascii_case("relaxed") {
            Ok(Self::Relaxed)
        } else {
            Err(ParseCanonicalizationError)
        }
    }
}

/// An error that occurs when parsing a canonicalization.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ParseCanonicalizationError;

impl Display for ParseCanonicalizationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown canonicalization")
    }
}

impl Error for ParseCanonicalizationError {}

/// A pair of header and body canonicalization algorithms, the value of the
/// `c=` tag. The default is *simple/simple*.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Canonicalization {
    /// The header canonicalization.
    pub header: CanonicalizationAlgorithm,
    /// The body canonicalization.
    pub body: CanonicalizationAlgorithm,
}

impl Canonicalization {
    pub const fn new(header: CanonicalizationAlgorithm, body: CanonicalizationAlgorithm) -> Self {
        Self { header, body }
    }
}

impl From<(CanonicalizationAlgorithm, CanonicalizationAlgorithm)> for Canonicalization {
    fn from((header, body): (CanonicalizationAlgorithm, CanonicalizationAlgorithm)) -> Self {
        Self { header, body }
    }
}

impl Display for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.header, self.body)
    }
}

impl fmt::Debug for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Canonicalization {
    type Err = ParseCanonicalizationError;

    /// Parses a `c=` value. A single algorithm stands for the header
    /// canonicalization, with *simple* body canonicalization.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if let Some((header, body)) = s.split_once('/') {
            Self {
                header: header.parse()?,
                body: body.parse()?,
            }
        } else {
            Self {
                header: s.parse()?,
                body: Default::default(),
            }
        })
    }
}

/// A DKIM signature, either produced by signing or parsed from a
/// `DKIM-Signature` header for verification.
///
/// Tag values appear as found: for verification, the mandatory tags may be
/// missing, and are only checked when the signature is verified.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    /// The *v=* tag.
    pub version: Option<Box<str>>,
    /// The key type from the *a=* tag. Unknown until the private key has been
    /// read when signing.
    pub key_type: Option<KeyType>,
    /// The hash algorithm from the *a=* tag.
    pub hash_algorithm: HashAlgorithm,
    /// The *c=* tag.
    pub canonicalization: Canonicalization,
    /// The *d=* tag.
    pub domain: Option<Box<str>>,
    /// The *s=* tag.
    pub selector: Option<Box<str>>,
    /// The *h=* tag, colon-separated.
    pub signed_headers: Option<Box<str>>,
    /// The *i=* tag, decoded.
    pub identity: Option<Box<[u8]>>,
    /// The *l=* tag.
    pub body_length: Option<u64>,
    /// The *t=* tag.
    pub timestamp: Option<u64>,
    /// The *x=* tag.
    pub expiration: Option<u64>,
    /// The *q=* tag.
    pub query_method: Option<Box<str>>,
    /// The *z=* tag, decoded.
    pub copied_headers: Option<Box<[u8]>>,
    /// The *bh=* tag, decoded.
    pub body_hash: Option<Box<[u8]>>,
    /// The *b=* tag, decoded.
    pub signature_data: Option<Box<[u8]>>,
    /// The raw header with the value of the *b=* tag removed.
    pub raw_without_signature_data: Box<[u8]>,

    /// The body hash this signature uses, an index into the body hash set of
    /// the message.
    pub body_hash_id: Option<BodyHashId>,

    /// The complete formatted `DKIM-Signature` header, after signing.
    pub header: Option<String>,
    /// Why no header could be produced, after signing.
    pub signing_error: Option<SignerError>,

    /// The verification status.
    pub status: VerificationStatus,
    /// The reason for a verification status other than pass.
    pub reason: Option<VerificationReason>,
    /// The public key record, once it has been retrieved.
    pub key_record: Option<PublicKeyRecord>,
    /// The size of the public key in bits, once it has been read.
    pub key_bits: Option<usize>,
}

impl Signature {
    /// Creates a signature with the given algorithm and no tags.
    pub fn new(key_type: Option<KeyType>, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            version: None,
            key_type,
            hash_algorithm,
            canonicalization: Default::default(),
            domain: None,
            selector: None,
            signed_headers: None,
            identity: None,
            body_length: None,
            timestamp: None,
            expiration: None,
            query_method: None,
            copied_headers: None,
            body_hash: None,
            signature_data: None,
            raw_without_signature_data: Default::default(),
            body_hash_id: None,
            header: None,
            signing_error: None,
            status: VerificationStatus::None,
            reason: None,
            key_record: None,
            key_bits: None,
        }
    }

    /// The identity of the body hash this signature requires.
    pub fn body_hash_key(&self) -> BodyHashKey {
        BodyHashKey::new(self.hash_algorithm, self.canonicalization.body, self.body_length)
    }

    /// The value of the *a=* tag, for example `rsa-sha256`.
    pub fn algorithm_tag(&self) -> String {
        match self.key_type {
            Some(key_type) => format!("{}-{}", key_type, self.hash_algorithm),
            None => format!("-{}", self.hash_algorithm),
        }
    }

    /// The signed header names from the *h=* tag.
    pub fn signed_header_names(&self) -> impl Iterator<Item = &str> {
        self.signed_headers
            .as_deref()
            .unwrap_or_default()
            .split(':')
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn is_pass(&self) -> bool {
        self.status == VerificationStatus::Pass
    }
}
