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

//! Scanner for the tag=value list of a `DKIM-Signature` header.

use crate::{
    crypto::{HashAlgorithm, KeyType},
    parse::{chomp, parse_decimal, CR, LF},
    quoted_printable,
    signature::{Canonicalization, Signature},
    util::decode_base64,
};
use std::str;
use tracing::debug;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScanState {
    /// Between tags, waiting for the first letter of a tag name.
    Limbo,
    /// Accumulating a tag name, up to `=`.
    Tag,
    /// Accumulating a value, up to `;` or the end of input.
    Value,
}

/// One recognised tag=value pair of a signature, with its value interpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
enum SignatureTag<'a> {
    Version(&'a str),
    Algorithm(Option<KeyType>, Option<HashAlgorithm>),
    Canonicalization(Option<Canonicalization>),
    QueryMethod(&'a str),
    Domain(&'a str),
    Selector(&'a str),
    SignedHeaders(&'a str),
    BodyHash(Option<Vec<u8>>),
    SignatureData(Option<Vec<u8>>),
    Identity(Vec<u8>),
    Timestamp(Option<u64>),
    Expiration(Option<u64>),
    BodyLength(Option<u64>),
    CopiedHeaders(Vec<u8>),
    Unknown,
}

impl<'a> SignatureTag<'a> {
    fn new(name: &str, value: &'a str) -> Self {
        match name {
            "v" => Self::Version(value),
            "a" => {
                let mut parts = value.splitn(2, '-');
                let key_type = parts.next().and_then(|s| s.parse().ok());
                let hash_alg = parts.next().and_then(|s| s.parse().ok());
                Self::Algorithm(key_type, hash_alg)
            }
            "c" => Self::Canonicalization(value.parse().ok()),
            "q" => Self::QueryMethod(value),
            "d" => Self::Domain(value),
            "s" => Self::Selector(value),
            "h" => Self::SignedHeaders(value),
            "bh" => Self::BodyHash(decode_base64(value).ok()),
            "b" => Self::SignatureData(decode_base64(value).ok()),
            "i" => Self::Identity(quoted_printable::decode(value.as_bytes())),
            "t" => Self::Timestamp(parse_decimal(value)),
            "x" => Self::Expiration(parse_decimal(value)),
            "l" => Self::BodyLength(parse_decimal(value)),
            "z" => Self::CopiedHeaders(quoted_printable::decode(value.as_bytes())),
            _ => Self::Unknown,
        }
    }
}

#[derive(Default)]
struct ParsedTags {
    key_type: Option<KeyType>,
    hash_algorithm: Option<HashAlgorithm>,
    version: Option<Box<str>>,
    canonicalization: Option<Canonicalization>,
    query_method: Option<Box<str>>,
    domain: Option<Box<str>>,
    selector: Option<Box<str>>,
    signed_headers: Option<Box<str>>,
    body_hash: Option<Box<[u8]>>,
    signature_data: Option<Box<[u8]>>,
    identity: Option<Box<[u8]>>,
    timestamp: Option<u64>,
    expiration: Option<u64>,
    body_length: Option<u64>,
    copied_headers: Option<Box<[u8]>>,
}

impl ParsedTags {
    fn apply(&mut self, name: &str, tag: SignatureTag<'_>) {
        match tag {
            SignatureTag::Version(v) => self.version = Some(v.into()),
            SignatureTag::Algorithm(key_type, hash_alg) => {
                self.key_type = key_type;
                self.hash_algorithm = hash_alg;
            }
            SignatureTag::Canonicalization(Some(c)) => self.canonicalization = Some(c),
            SignatureTag::Canonicalization(None) => {
                debug!("unknown canonicalization in DKIM signature, using default");
            }
            SignatureTag::QueryMethod(q) => self.query_method = Some(q.into()),
            SignatureTag::Domain(d) => self.domain = Some(d.into()),
            SignatureTag::Selector(s) => self.selector = Some(s.into()),
            SignatureTag::SignedHeaders(h) => self.signed_headers = Some(h.into()),
            SignatureTag::BodyHash(bh) => self.body_hash = bh.map(Into::into),
            SignatureTag::SignatureData(b) => self.signature_data = b.map(Into::into),
            SignatureTag::Identity(i) => self.identity = Some(i.into()),
            SignatureTag::Timestamp(t) => self.timestamp = t,
            SignatureTag::Expiration(x) => self.expiration = x,
            SignatureTag::BodyLength(l) => self.body_length = l,
            SignatureTag::CopiedHeaders(z) => self.copied_headers = Some(z.into()),
            SignatureTag::Unknown => {
                debug!(tag = name, "ignoring unknown tag in DKIM signature");
            }
        }
    }
}

struct Scanner {
    state: ScanState,
    past_name: bool,
    in_b_value: bool,
    tag: Vec<u8>,
    value: Vec<u8>,
    stripped: Vec<u8>,
    tags: ParsedTags,
}

impl Scanner {
    fn new(capacity: usize) -> Self {
        Self {
            state: ScanState::Limbo,
            past_name: false,
            in_b_value: false,
            tag: vec![],
            value: vec![],
            stripped: Vec::with_capacity(capacity),
            tags: Default::default(),
        }
    }

    /// Consumes one byte, or the end of input as `None`.
    fn step(&mut self, c: Option<u8>) {
        self.scan(c);

        // the copy omits the value of the b= tag but keeps everything else
        if let Some(c) = c {
            if !self.in_b_value {
                self.stripped.push(c);
            }
        }
    }

    fn scan(&mut self, c: Option<u8>) {
        let c = match c {
            Some(c) => c,
            None => {
                if self.state == ScanState::Value {
                    self.commit();
                }
                return;
            }
        };

        if c == CR || c == LF {
            return;
        }

        if !self.past_name {
            if c == b':' {
                self.past_name = true;
            }
            return;
        }

        match self.state {
            ScanState::Limbo => {
                if c.is_ascii_lowercase() {
                    self.tag.push(c);
                    self.state = ScanState::Tag;
                }
            }
            ScanState::Tag => {
                if c == b'=' {
                    if self.tag == b"b" {
                        self.stripped.push(c);
                        self.in_b_value = true;
                    }
                    self.state = ScanState::Value;
                } else if !c.is_ascii_whitespace() {
                    self.tag.push(c);
                }
            }
            ScanState::Value => match c {
                b' ' | b'\t' => {}
                b';' => self.commit(),
                _ => self.value.push(c),
            },
        }
    }

    fn commit(&mut self) {
        // a tag without a value is ignored like an unknown tag
        if !self.value.is_empty() {
            match (str::from_utf8(&self.tag), str::from_utf8(&self.value)) {
                (Ok(name), Ok(value)) => {
                    let tag = SignatureTag::new(name, value);
                    self.tags.apply(name, tag);
                }
                _ => {
                    debug!("ignoring tag with ill-formed UTF-8 in DKIM signature");
                }
            }
        }

        self.tag.clear();
        self.value.clear();
        self.in_b_value = false;
        self.state = ScanState::Limbo;
    }
}

/// Parses a raw `DKIM-Signature` header, the complete header including the
/// field name.
///
/// Returns `None` if the signature algorithm is missing or unknown: such a
/// signature can never be verified and is discarded. Any other problem is
/// left for verification to detect.
pub fn parse_signature(raw: &[u8]) -> Option<Signature> {
    let mut scanner = Scanner::new(raw.len());

    for &c in raw {
        scanner.step(Some(c));
    }
    scanner.step(None);

    let Scanner { stripped, tags, .. } = scanner;

    let (key_type, hash_algorithm) = match (tags.key_type, tags.hash_algorithm) {
        (Some(k), Some(h)) => (k, h),
        _ => {
            debug!("discarding DKIM signature with unknown algorithm");
            return None;
        }
    };

    let mut sig = Signature::new(Some(key_type), hash_algorithm);

    sig.version = tags.version;
    sig.canonicalization = tags.canonicalization.unwrap_or_default();
    sig.query_method = tags.query_method;
    sig.domain = tags.domain;
    sig.selector = tags.selector;
    sig.signed_headers = tags.signed_headers;
    sig.body_hash = tags.body_hash;
    sig.signature_data = tags.signature_data;
    sig.identity = tags.identity;
    sig.timestamp = tags.timestamp;
    sig.expiration = tags.expiration;
    sig.body_length = tags.body_length;
    sig.copied_headers = tags.copied_headers;
    sig.raw_without_signature_data = chomp(&stripped).into();

    Some(sig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::CanonicalizationAlgorithm;

    // RFC 6376, appendix A.2
    const RFC_EXAMPLE: &str = "\
DKIM-Signature: v=1; a=rsa-sha256; s=brisbane; d=example.com;\r
      c=simple/simple; q=dns/txt; i=joe@football.example.com;\r
      h=Received : From : To : Subject : Date : Message-ID;\r
      bh=2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=;\r
      b=AuUoFEfDxTDkHlLXSZEpZj79LICEps6eda7W3deTVFOk4yAUoqOB\r
        4nujc7YopdG5dWLSdNg6xNAZpOPr+kHxt1IrE+NahM6L/LbvaHut\r
        KVdkLLkpVaVVQPzeRDI009SO2Il5Lu7rDNH6mZckBdrIx0orEtZV\r
        4bmp/YzhwvcubU4=;\r
";

    #[test]
    fn parse_rfc_example() {
        let sig = parse_signature(RFC_EXAMPLE.as_bytes()).unwrap();

        assert_eq!(sig.version.as_deref(), Some("1"));
        assert_eq!(sig.key_type, Some(KeyType::Rsa));
        assert_eq!(sig.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(sig.domain.as_deref(), Some("example.com"));
        assert_eq!(sig.selector.as_deref(), Some("brisbane"));
        assert_eq!(sig.query_method.as_deref(), Some("dns/txt"));
        assert_eq!(sig.identity.as_deref(), Some(&b"joe@football.example.com"[..]));
        assert_eq!(
            sig.signed_headers.as_deref(),
            Some("Received:From:To:Subject:Date:Message-ID")
        );
        assert_eq!(
            sig.canonicalization,
            Canonicalization::new(CanonicalizationAlgorithm::Simple, CanonicalizationAlgorithm::Simple)
        );
        assert_eq!(sig.body_hash.as_ref().map(|bh| bh.len()), Some(32));
        assert_eq!(sig.signature_data.as_ref().map(|b| b.len()), Some(128));
        assert_eq!(sig.body_length, None);

        assert_eq!(
            str::from_utf8(&sig.raw_without_signature_data).unwrap(),
            "\
DKIM-Signature: v=1; a=rsa-sha256; s=brisbane; d=example.com;\r
      c=simple/simple; q=dns/txt; i=joe@football.example.com;\r
      h=Received : From : To : Subject : Date : Message-ID;\r
      bh=2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=;\r
      b=;"
        );
    }

    #[test]
    fn parse_strips_b_value_only() {
        let sig = parse_signature(b"DKIM-Signature: a=rsa-sha256; b = AAAA ; bh = AAAA ; c = relaxed")
            .unwrap();

        assert_eq!(
            &sig.raw_without_signature_data[..],
            b"DKIM-Signature: a=rsa-sha256; b =; bh = AAAA ; c = relaxed"
        );
        assert_eq!(sig.signature_data.as_deref(), Some(&[0, 0, 0][..]));
        assert_eq!(sig.body_hash.as_deref(), Some(&[0, 0, 0][..]));
        assert_eq!(
            sig.canonicalization,
            Canonicalization::new(CanonicalizationAlgorithm::Relaxed, CanonicalizationAlgorithm::Simple)
        );
    }

    #[test]
    fn parse_unknown_algorithm() {
        assert_eq!(parse_signature(b"DKIM-Signature: v=1; a=dsa-sha256; d=example.com"), None);
        assert_eq!(parse_signature(b"DKIM-Signature: v=1; a=rsa-md5; d=example.com"), None);
        assert_eq!(parse_signature(b"DKIM-Signature: v=1; d=example.com"), None);
    }

    #[test]
    fn parse_tolerates_odd_input() {
        let sig = parse_signature(
            b"DKIM-Signature: v=1; a=ed25519-sha256; xyz=unknown; Q=upper; t=abc; x=12; l=0; i=; z=From:a=40b|To:c",
        )
        .unwrap();

        assert_eq!(sig.key_type, Some(KeyType::Ed25519));
        assert_eq!(sig.timestamp, None);
        assert_eq!(sig.expiration, Some(12));
        assert_eq!(sig.body_length, Some(0));
        assert_eq!(sig.identity, None);
        assert_eq!(sig.copied_headers.as_deref(), Some(&b"From:a@b|To:c"[..]));
        assert_eq!(sig.body_hash, None);
        assert_eq!(sig.signature_data, None);
    }

    #[test]
    fn parse_missing_body_hash() {
        let sig = parse_signature(b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=sel; h=from; b=AAAA").unwrap();

        assert_eq!(sig.body_hash, None);
        assert!(sig.signature_data.is_some());
        assert_eq!(
            &sig.raw_without_signature_data[..],
            b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=sel; h=from; b="
        );
    }

    #[test]
    fn signature_tag_values() {
        assert_eq!(SignatureTag::new("v", "1"), SignatureTag::Version("1"));
        assert_eq!(
            SignatureTag::new("a", "rsa-sha512"),
            SignatureTag::Algorithm(Some(KeyType::Rsa), Some(HashAlgorithm::Sha512))
        );
        assert_eq!(
            SignatureTag::new("a", "rsa"),
            SignatureTag::Algorithm(Some(KeyType::Rsa), None)
        );
        assert_eq!(SignatureTag::new("bh", "!!"), SignatureTag::BodyHash(None));
        assert_eq!(SignatureTag::new("bx", "1"), SignatureTag::Unknown);
        assert_eq!(SignatureTag::new("l", "100"), SignatureTag::BodyLength(Some(100)));
    }
}
