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

//! Cryptographic utilities.
//!
//! # Public keys in DNS
//!
//! RFC 6376 says that the p= tag contains an RSA public key in format
//! RSAPublicKey, but the example in its appendix C installs the key in format
//! SubjectPublicKeyInfo, and that is what has become widespread. RSA keys are
//! therefore read as SubjectPublicKeyInfo first, then as RSAPublicKey.
//!
//! Ed25519 keys are read as the 32 raw public key bytes mandated by RFC 8463.
//! Keys that arrive wrapped in a larger envelope are cut down to their
//! trailing 32 bytes by the key resolver before they get here.

mod ed25519;
mod hash;
mod rsa;

pub use self::{
    ed25519::{read_ed25519_verifying_key, sign_ed25519, verify_ed25519, ED25519_KEY_LEN},
    hash::{digest, new_digest, BoxedDigest},
    rsa::{read_rsa_public_key, rsa_key_bits, sign_rsa, verify_rsa},
};

use crate::util::CanonicalStr;
use ::rsa::{pkcs1::DecodeRsaPrivateKey, RsaPrivateKey, RsaPublicKey};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use pkcs8::{der::pem::PemLabel, Document, PrivateKeyInfo};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// A private key used for signing.
#[derive(Debug)]
pub enum SigningKey {
    Rsa(RsaPrivateKey),
    Ed25519(Ed25519SigningKey),
}

impl SigningKey {
    /// Reads a private key from a PEM document: either PKCS#8 (`PRIVATE KEY`,
    /// RSA or Ed25519) or PKCS#1 (`RSA PRIVATE KEY`).
    pub fn from_pem(s: &str) -> Result<Self, SigningError> {
        let (label, der) = Document::from_pem(s).map_err(|_| SigningError::InvalidKey)?;

        if label == "RSA PRIVATE KEY" {
            return RsaPrivateKey::from_pkcs1_der(der.as_bytes())
                .map(Self::Rsa)
                .map_err(|_| SigningError::InvalidKey);
        }

        PrivateKeyInfo::validate_pem_label(label).map_err(|_| SigningError::InvalidKey)?;

        let info =
            PrivateKeyInfo::try_from(der.as_bytes()).map_err(|_| SigningError::InvalidKey)?;

        if let Ok(k) = RsaPrivateKey::try_from(info.clone()) {
            Ok(Self::Rsa(k))
        } else if let Ok(k) = Ed25519SigningKey::try_from(info) {
            Ok(Self::Ed25519(k))
        } else {
            Err(SigningError::InvalidKey)
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Ed25519(_) => KeyType::Ed25519,
        }
    }

    /// Signs the header hash `data_hash`, which was computed with `hash_alg`.
    pub fn sign(&self, hash_alg: HashAlgorithm, data_hash: &[u8]) -> Result<Vec<u8>, SigningError> {
        match self {
            Self::Rsa(k) => sign_rsa(hash_alg, k, data_hash),
            Self::Ed25519(k) => Ok(sign_ed25519(k, data_hash)),
        }
    }
}

/// A public key used for verification.
#[derive(Debug)]
pub enum VerifyingKey {
    Rsa(RsaPublicKey),
    Ed25519(Ed25519VerifyingKey),
}

impl VerifyingKey {
    pub fn from_key_data(key_type: KeyType, key_data: &[u8]) -> Result<Self, VerificationError> {
        match key_type {
            KeyType::Rsa => read_rsa_public_key(key_data).map(Self::Rsa),
            KeyType::Ed25519 => read_ed25519_verifying_key(key_data).map(Self::Ed25519),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Ed25519(_) => KeyType::Ed25519,
        }
    }

    /// The key size in bits.
    pub fn key_bits(&self) -> usize {
        match self {
            Self::Rsa(k) => rsa_key_bits(k),
            Self::Ed25519(_) => ED25519_KEY_LEN * 8,
        }
    }

    pub fn verify(
        &self,
        hash_alg: HashAlgorithm,
        data_hash: &[u8],
        signature_data: &[u8],
    ) -> Result<(), VerificationError> {
        match self {
            Self::Rsa(k) => verify_rsa(hash_alg, k, data_hash, signature_data),
            Self::Ed25519(k) => verify_ed25519(k, data_hash, signature_data),
        }
    }
}

/// An error that occurs when parsing an algorithm name.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ParseAlgorithmError;

impl Display for ParseAlgorithmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown algorithm")
    }
}

impl Error for ParseAlgorithmError {}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyType {
    Rsa,
    Ed25519,
}

impl KeyType {
    pub fn all() -> Vec<Self> {
        vec![Self::Rsa, Self::Ed25519]
    }
}

impl CanonicalStr for KeyType {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for KeyType {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|k| s.eq_ignore_ascii_case(k.canonical_str()))
            .ok_or(ParseAlgorithmError)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HashAlgorithm {
    #[cfg(feature = "pre-rfc8301")]
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn all() -> Vec<Self> {
        #[allow(unused_mut)]
        let mut all = vec![Self::Sha256, Self::Sha512];
        #[cfg(feature = "pre-rfc8301")]
        all.insert(0, Self::Sha1);
        all
    }
}

impl CanonicalStr for HashAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            #[cfg(feature = "pre-rfc8301")]
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|h| s.eq_ignore_ascii_case(h.canonical_str()))
            .ok_or(ParseAlgorithmError)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VerificationError {
    InvalidKey,
    InvalidSignature,
    VerificationFailure,
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key data"),
            Self::InvalidSignature => write!(f, "invalid signature data"),
            Self::VerificationFailure => write!(f, "signature verification failed"),
        }
    }
}

impl Error for VerificationError {}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SigningError {
    InvalidKey,
    SigningFailure,
}

impl Display for SigningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid private key"),
            Self::SigningFailure => write!(f, "signing failed"),
        }
    }
}

impl Error for SigningError {}
