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

//! Signing of messages.

pub mod format;
pub mod select;

use crate::{
    body_hash::BodyHashSet,
    crypto::{HashAlgorithm, SigningKey},
    header::RawHeader,
    message_hash::compute_data_hash,
    signature::{Canonicalization, CanonicalizationAlgorithm, Signature},
    util::encode_base64,
};
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{trace, warn};

/// The headers signed when no other list is configured, from RFC 6376,
/// section 5.4.1, plus the MIME and resent headers.
pub const DEFAULT_SIGN_HEADERS: &str = "\
From:Sender:Reply-To:Subject:Date:Message-ID:To:Cc:MIME-Version:Content-Type:\
Content-Transfer-Encoding:Content-ID:Content-Description:Resent-Date:\
Resent-From:Resent-Sender:Resent-To:Resent-Cc:Resent-Message-ID:In-Reply-To:\
References:List-Id:List-Help:List-Unsubscribe:List-Subscribe:List-Post:\
List-Owner:List-Archive";

/// An error that occurs when signing.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignerError {
    MissingParameter,
    UnsupportedHashAlgorithm,
    PrivateKey,
    SigningFailure,
    MissingBodyHash,
    NotSigning,
    FeedingStarted,
}

impl Display for SignerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameter => write!(f, "missing signing parameter"),
            Self::UnsupportedHashAlgorithm => write!(f, "unsupported hash algorithm"),
            Self::PrivateKey => write!(f, "could not read private key"),
            Self::SigningFailure => write!(f, "signing failed"),
            Self::MissingBodyHash => write!(f, "body hash not available"),
            Self::NotSigning => write!(f, "context is not for signing"),
            Self::FeedingStarted => write!(f, "message data already fed"),
        }
    }
}

impl Error for SignerError {}

/// A generator for the timestamp tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Timestamp {
    /// The current time when the signature is produced.
    #[default]
    Now,
    Exact(u64),
}

impl Timestamp {
    fn to_unix_secs(self) -> u64 {
        match self {
            Self::Now => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            Self::Exact(t) => t,
        }
    }
}

/// A request to add one signature to a message.
///
/// The private key is only read when the signature is produced at the end of
/// the message; a key that cannot be read fails this request alone.
#[derive(Clone)]
pub struct SignRequest {
    pub domain: String,
    pub selector: String,
    private_key: String,
    pub hash_algorithm: HashAlgorithm,
    /// The default is *relaxed/relaxed*.
    pub canonicalization: Canonicalization,
    /// Colon-separated list of header names to sign. See
    /// [`select::select_headers`] for the `+` and `=` prefixes.
    pub sign_headers: String,
    /// The agent or user identifier, the *i=* tag.
    pub identity: Option<Vec<u8>>,
    /// Limit on the number of body bytes signed, the *l=* tag.
    pub body_length: Option<u64>,
    pub timestamp: Option<Timestamp>,
    pub expiration: Option<u64>,
}

impl SignRequest {
    /// Creates a request for a signature by `domain` and `selector`, with a
    /// PEM-encoded private key and a hash algorithm name such as `sha256`.
    pub fn new(
        domain: impl Into<String>,
        selector: impl Into<String>,
        private_key_pem: impl Into<String>,
        hash_name: &str,
    ) -> Result<Self, SignerError> {
        let domain = domain.into();
        let selector = selector.into();
        let private_key = private_key_pem.into();

        if domain.is_empty() || selector.is_empty() || private_key.is_empty() {
            return Err(SignerError::MissingParameter);
        }

        let hash_algorithm = hash_name
            .parse()
            .map_err(|_| SignerError::UnsupportedHashAlgorithm)?;

        Ok(Self {
            domain,
            selector,
            private_key,
            hash_algorithm,
            canonicalization: Canonicalization::new(
                CanonicalizationAlgorithm::Relaxed,
                CanonicalizationAlgorithm::Relaxed,
            ),
            sign_headers: DEFAULT_SIGN_HEADERS.into(),
            identity: None,
            body_length: None,
            timestamp: None,
            expiration: None,
        })
    }

    /// The signature to be completed once the message has been read. The key
    /// type stays unknown until the private key is read.
    pub(crate) fn to_signature(&self) -> Signature {
        let mut sig = Signature::new(None, self.hash_algorithm);
        sig.canonicalization = self.canonicalization;
        sig.domain = Some(self.domain.as_str().into());
        sig.selector = Some(self.selector.as_str().into());
        sig.identity = self.identity.clone().map(Into::into);
        sig.body_length = self.body_length;
        sig.expiration = self.expiration;
        sig
    }
}

impl Debug for SignRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignRequest")
            .field("domain", &self.domain)
            .field("selector", &self.selector)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("canonicalization", &self.canonicalization)
            .field("sign_headers", &self.sign_headers)
            .field("identity", &self.identity.as_deref().map(String::from_utf8_lossy))
            .field("body_length", &self.body_length)
            .field("timestamp", &self.timestamp)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Completes a signature: on success the formatted header is stored in
/// `sig.header`, otherwise the error in `sig.signing_error`.
pub(crate) fn sign(
    request: &SignRequest,
    sig: &mut Signature,
    headers: &[RawHeader],
    body_hashes: &BodyHashSet,
) {
    match perform_signing(request, sig, headers, body_hashes) {
        Ok(header) => {
            trace!(domain = %request.domain, selector = %request.selector, "signature created");
            sig.header = Some(header);
        }
        Err(e) => {
            warn!(domain = %request.domain, selector = %request.selector, "could not sign message: {e}");
            sig.signing_error = Some(e);
        }
    }
}

fn perform_signing(
    request: &SignRequest,
    sig: &mut Signature,
    headers: &[RawHeader],
    body_hashes: &BodyHashSet,
) -> Result<String, SignerError> {
    let body_hash = sig
        .body_hash_id
        .and_then(|id| body_hashes.get(id))
        .ok_or(SignerError::MissingBodyHash)?;
    let digest = body_hash.digest().ok_or(SignerError::MissingBodyHash)?;

    sig.body_hash = Some(digest.into());

    // a shorter body is signed in its entirety, without l=
    if let Some(limit) = sig.body_length {
        if body_hash.signed_body_bytes() < limit {
            sig.body_length = None;
        }
    }

    sig.timestamp = request.timestamp.map(Timestamp::to_unix_secs);

    let key = SigningKey::from_pem(&request.private_key).map_err(|_| SignerError::PrivateKey)?;
    sig.key_type = Some(key.key_type());

    let selected = select::select_headers(headers, &request.sign_headers);
    sig.signed_headers = Some(selected.names.join(":").into());

    let unsigned = format::format_without_signature(sig, &selected.names);

    let mut signature_header = unsigned.as_str().to_owned();
    signature_header.push(';');

    let data_hash = compute_data_hash(
        sig.hash_algorithm,
        sig.canonicalization.header,
        selected.headers,
        signature_header.as_bytes(),
    );

    trace!(data_hash = %encode_base64(&data_hash), "header hash computed");

    let signature_data = key
        .sign(sig.hash_algorithm, &data_hash)
        .map_err(|_| SignerError::SigningFailure)?;

    sig.raw_without_signature_data = signature_header.into_bytes().into();
    let header = format::insert_signature_data(unsigned, &signature_data);
    sig.signature_data = Some(signature_data.into());

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_request_new() {
        let request = SignRequest::new("example.com", "sel", "key", "sha256").unwrap();

        assert_eq!(request.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(request.canonicalization.to_string(), "relaxed/relaxed");
        assert_eq!(request.sign_headers, DEFAULT_SIGN_HEADERS);

        assert_eq!(
            SignRequest::new("", "sel", "key", "sha256").unwrap_err(),
            SignerError::MissingParameter
        );
        assert_eq!(
            SignRequest::new("example.com", "sel", "", "sha256").unwrap_err(),
            SignerError::MissingParameter
        );
        assert_eq!(
            SignRequest::new("example.com", "sel", "key", "md5").unwrap_err(),
            SignerError::UnsupportedHashAlgorithm
        );
    }

    #[test]
    fn sign_request_debug_hides_key() {
        let request = SignRequest::new("example.com", "sel", "SECRET", "sha512").unwrap();

        let s = format!("{request:?}");

        assert!(s.contains("example.com"));
        assert!(!s.contains("SECRET"));
    }

    #[test]
    fn sign_request_to_signature() {
        let mut request = SignRequest::new("example.com", "sel", "key", "sha256").unwrap();
        request.identity = Some(b"@example.com".to_vec());
        request.body_length = Some(10);

        let sig = request.to_signature();

        assert_eq!(sig.key_type, None);
        assert_eq!(sig.domain.as_deref(), Some("example.com"));
        assert_eq!(sig.selector.as_deref(), Some("sel"));
        assert_eq!(sig.identity.as_deref(), Some(&b"@example.com"[..]));
        assert_eq!(sig.body_hash_key().body_length, Some(10));
    }

    #[test]
    fn default_sign_headers_list() {
        let names: Vec<_> = DEFAULT_SIGN_HEADERS.split(':').collect();

        assert_eq!(names.len(), 28);
        assert_eq!(names[0], "From");
        assert_eq!(names[27], "List-Archive");
    }
}
