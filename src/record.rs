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

//! DKIM public key record.
//!
//! See RFC 6376, section 3.6.1.

use crate::{
    crypto::HashAlgorithm,
    parse::{remove_whitespace, trim_whitespace},
    quoted_printable,
    util::{decode_base64, CanonicalStr},
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

pub const RECORD_VERSION: &str = "DKIM1";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RecordParseError {
    UnsupportedVersion,
    MissingKey,
    RevokedKey,
    InvalidKeyData,
}

impl Display for RecordParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion => write!(f, "unsupported version"),
            Self::MissingKey => write!(f, "p= tag missing"),
            Self::RevokedKey => write!(f, "key revoked"),
            Self::InvalidKeyData => write!(f, "invalid Base64 key data"),
        }
    }
}

impl Error for RecordParseError {}

enum RecordTag {
    Version,
    HashAlgorithms,
    KeyType,
    Granularity,
    Notes,
    KeyData,
    ServiceType,
    Flags,
}

impl RecordTag {
    fn new(name: &str) -> Option<Self> {
        match name {
            "v" => Some(Self::Version),
            "h" => Some(Self::HashAlgorithms),
            "k" => Some(Self::KeyType),
            "g" => Some(Self::Granularity),
            "n" => Some(Self::Notes),
            "p" => Some(Self::KeyData),
            "s" => Some(Self::ServiceType),
            "t" => Some(Self::Flags),
            _ => None,
        }
    }
}

/// A DKIM public key record, as published in DNS.
///
/// Tags that were not present hold their default values. The key type is kept
/// as written; it is checked against the signature during verification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKeyRecord {
    pub version: Box<str>,
    /// The *h=* tag, colon-separated; absent means all hash algorithms.
    pub hash_algorithms: Option<Box<str>>,
    pub key_type: Box<str>,
    /// The *g=* tag, obsolete but still parsed.
    pub granularity: Box<str>,
    pub notes: Option<Box<[u8]>>,
    /// The *s=* tag, colon-separated.
    pub service_type: Box<str>,
    pub testing: bool,
    pub no_subdomains: bool,
    pub key_data: Box<[u8]>,
}

impl PublicKeyRecord {
    /// Whether the *h=* tag permits the given hash algorithm.
    pub fn allows_hash(&self, hash_alg: HashAlgorithm) -> bool {
        match &self.hash_algorithms {
            None => true,
            Some(algs) => algs
                .split(':')
                .any(|a| trim_whitespace(a).eq_ignore_ascii_case(hash_alg.canonical_str())),
        }
    }

    /// Whether the *s=* tag permits use of the key for email.
    pub fn allows_email_service(&self) -> bool {
        self.service_type.split(':').map(trim_whitespace).any(|s| s == "*" || s.eq_ignore_ascii_case("email"))
    }
}

impl FromStr for PublicKeyRecord {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut version = None;
        let mut hash_algorithms = None;
        let mut key_type = None;
        let mut granularity = None;
        let mut notes = None;
        let mut key_data = None;
        let mut service_type = None;
        let mut testing = false;
        let mut no_subdomains = false;

        for element in s.split(';') {
            let Some((name, value)) = element.split_once('=') else {
                continue;
            };
            let name = trim_whitespace(name);
            let value = trim_whitespace(value);

            // only single-letter tags are defined
            let Some(tag) = RecordTag::new(name) else {
                continue;
            };

            match tag {
                RecordTag::Version => {
                    if value != RECORD_VERSION {
                        return Err(RecordParseError::UnsupportedVersion);
                    }
                    version = Some(value.into());
                }
                RecordTag::HashAlgorithms => hash_algorithms = Some(value.into()),
                RecordTag::KeyType => key_type = Some(value.into()),
                RecordTag::Granularity => granularity = Some(value.into()),
                RecordTag::Notes => notes = Some(quoted_printable::decode(value.as_bytes()).into()),
                RecordTag::KeyData => {
                    let value = remove_whitespace(value);
                    if value.is_empty() {
                        return Err(RecordParseError::RevokedKey);
                    }
                    let data = decode_base64(&value).map_err(|_| RecordParseError::InvalidKeyData)?;
                    key_data = Some(data.into());
                }
                RecordTag::ServiceType => service_type = Some(value.into()),
                RecordTag::Flags => {
                    testing = value.contains('y');
                    no_subdomains = value.contains('s');
                }
            }
        }

        let key_data = key_data.ok_or(RecordParseError::MissingKey)?;

        Ok(Self {
            version: version.unwrap_or_else(|| RECORD_VERSION.into()),
            hash_algorithms,
            key_type: key_type.unwrap_or_else(|| "rsa".into()),
            granularity: granularity.unwrap_or_else(|| "*".into()),
            notes,
            service_type: service_type.unwrap_or_else(|| "*".into()),
            testing,
            no_subdomains,
            key_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_defaults() {
        let record: PublicKeyRecord = "p=YWJj".parse().unwrap();

        assert_eq!(
            record,
            PublicKeyRecord {
                version: "DKIM1".into(),
                hash_algorithms: None,
                key_type: "rsa".into(),
                granularity: "*".into(),
                notes: None,
                service_type: "*".into(),
                testing: false,
                no_subdomains: false,
                key_data: b"abc".to_vec().into(),
            }
        );
        assert!(record.allows_hash(HashAlgorithm::Sha256));
        assert!(record.allows_email_service());
    }

    #[test]
    fn record_all_tags() {
        let record: PublicKeyRecord =
            "v=DKIM1; h=sha1:sha256; k=ed25519; g=*; n=highly=20interesting; s=email; t=y:s; p=YW\r\n\t Jj; x=ignored"
                .parse()
                .unwrap();

        assert_eq!(record.key_type.as_ref(), "ed25519");
        assert_eq!(record.notes.as_deref(), Some(&b"highly interesting"[..]));
        assert_eq!(record.key_data.as_ref(), b"abc");
        assert!(record.testing);
        assert!(record.no_subdomains);
        assert!(record.allows_hash(HashAlgorithm::Sha256));
        assert!(!record.allows_hash(HashAlgorithm::Sha512));
        assert!(record.allows_email_service());
    }

    #[test]
    fn record_service_types() {
        let record: PublicKeyRecord = "s=other:EMAIL; p=YWJj".parse().unwrap();
        assert!(record.allows_email_service());

        let record: PublicKeyRecord = "s=other; p=YWJj".parse().unwrap();
        assert!(!record.allows_email_service());
    }

    #[test]
    fn record_errors() {
        assert_eq!("v=DKIM1; k=rsa".parse::<PublicKeyRecord>(), Err(RecordParseError::MissingKey));
        assert_eq!("v=DKIM1; p=".parse::<PublicKeyRecord>(), Err(RecordParseError::RevokedKey));
        assert_eq!("v=DKIM2; p=YWJj".parse::<PublicKeyRecord>(), Err(RecordParseError::UnsupportedVersion));
        assert_eq!("p=YW!j".parse::<PublicKeyRecord>(), Err(RecordParseError::InvalidKeyData));
        assert_eq!("".parse::<PublicKeyRecord>(), Err(RecordParseError::MissingKey));
    }

    #[test]
    fn record_empty_values() {
        let record: PublicKeyRecord = "v=DKIM1; n=; t=; h=; p=YWJj".parse().unwrap();
        assert_eq!(record.notes.as_deref(), Some(&b""[..]));
        assert!(!record.testing);
        assert!(!record.no_subdomains);
        assert!(!record.allows_hash(HashAlgorithm::Sha256));

        let record: PublicKeyRecord = "k=; p=YWJj".parse().unwrap();
        assert_eq!(&*record.key_type, "");

        assert_eq!("v=; p=YWJj".parse::<PublicKeyRecord>(), Err(RecordParseError::UnsupportedVersion));
    }

    #[test]
    fn record_ignores_malformed_elements() {
        let record: PublicKeyRecord = "garbage; ; longtag=x; p=YWJj;".parse().unwrap();
        assert_eq!(record.key_data.as_ref(), b"abc");
    }
}
