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

//! Incremental body hashes, shared between signatures.

use crate::{
    canonicalize::{is_blank_line, relax_body_line},
    crypto::{self, BoxedDigest, HashAlgorithm},
    parse::CRLF,
    signature::CanonicalizationAlgorithm,
    util::encode_base64,
};
use std::fmt::{self, Debug, Formatter};
use tracing::trace;

/// The identity of a body hash: signatures agreeing on all three components
/// share one body hash.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BodyHashKey {
    pub hash_algorithm: HashAlgorithm,
    pub canonicalization: CanonicalizationAlgorithm,
    pub body_length: Option<u64>,
}

impl BodyHashKey {
    pub fn new(
        hash_algorithm: HashAlgorithm,
        canonicalization: CanonicalizationAlgorithm,
        body_length: Option<u64>,
    ) -> Self {
        Self {
            hash_algorithm,
            canonicalization,
            body_length,
        }
    }
}

/// A handle to a body hash in a [`BodyHashSet`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BodyHashId(usize);

/// One incremental body hash.
pub struct BodyHash {
    key: BodyHashKey,
    hasher: BoxedDigest,
    signed_body_bytes: u64,
    buffered_blank_lines: usize,
    digest: Option<Box<[u8]>>,
}

impl BodyHash {
    fn new(key: BodyHashKey) -> Self {
        Self {
            key,
            hasher: crypto::new_digest(key.hash_algorithm),
            signed_body_bytes: 0,
            buffered_blank_lines: 0,
            digest: None,
        }
    }

    pub fn key(&self) -> BodyHashKey {
        self.key
    }

    /// The number of canonicalized body bytes that went into the hash.
    pub fn signed_body_bytes(&self) -> u64 {
        self.signed_body_bytes
    }

    /// The finalized digest, available once the body hash set is finished.
    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }

    // bytes beyond the l= limit are silently discounted
    fn update(&mut self, data: &[u8]) {
        let len = match self.key.body_length {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.signed_body_bytes);
                usize::try_from(remaining).map_or(data.len(), |r| r.min(data.len()))
            }
            None => data.len(),
        };

        if len > 0 {
            trace!(data = ?String::from_utf8_lossy(&data[..len]), "hashing body data");
            self.hasher.update(&data[..len]);
            self.signed_body_bytes += len as u64;
        }
    }

    fn flush_blank_lines(&mut self) {
        for _ in 0..self.buffered_blank_lines {
            self.update(CRLF);
        }
        self.buffered_blank_lines = 0;
    }
}

impl Debug for BodyHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyHash")
            .field("key", &self.key)
            .field("signed_body_bytes", &self.signed_body_bytes)
            .field("buffered_blank_lines", &self.buffered_blank_lines)
            .field("digest", &self.digest.as_ref().map(encode_base64))
            .finish()
    }
}

/// The set of body hashes required by the signatures of one message. There
/// is at most one body hash per [`BodyHashKey`].
#[derive(Debug, Default)]
pub struct BodyHashSet {
    hashes: Vec<BodyHash>,
}

impl BodyHashSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the body hash with the given identity, creating it if needed.
    pub fn get_or_create(&mut self, key: BodyHashKey) -> BodyHashId {
        if let Some(i) = self.hashes.iter().position(|h| h.key == key) {
            return BodyHashId(i);
        }

        trace!(?key, "new body hash");
        self.hashes.push(BodyHash::new(key));
        BodyHashId(self.hashes.len() - 1)
    }

    pub fn get(&self, id: BodyHashId) -> Option<&BodyHash> {
        self.hashes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BodyHash> {
        self.hashes.iter()
    }

    /// Feeds one complete, CRLF-terminated body line to every body hash.
    pub fn feed_line(&mut self, line: &[u8]) {
        if line == CRLF {
            for hash in &mut self.hashes {
                hash.buffered_blank_lines += 1;
            }
            return;
        }

        let mut relaxed_line = None;
        let is_blank = is_blank_line(line);

        for hash in &mut self.hashes {
            match hash.key.canonicalization {
                CanonicalizationAlgorithm::Simple => {
                    hash.flush_blank_lines();
                    hash.update(line);
                }
                CanonicalizationAlgorithm::Relaxed => {
                    if is_blank {
                        hash.buffered_blank_lines += 1;
                        continue;
                    }
                    hash.flush_blank_lines();
                    let relaxed = relaxed_line.get_or_insert_with(|| relax_body_line(line));
                    hash.update(relaxed);
                }
            }
        }
    }

    /// Marks the end of the body: trailing blank lines are dropped, and a body
    /// hash that has seen no data at all hashes a single CRLF.
    pub fn complete_body(&mut self) {
        for hash in &mut self.hashes {
            if hash.signed_body_bytes == 0 {
                hash.update(CRLF);
            }
            hash.buffered_blank_lines = 0;
        }
    }

    /// Finalizes the digests of all body hashes.
    pub fn finish(&mut self) {
        for hash in &mut self.hashes {
            if hash.digest.is_none() {
                let digest = hash.hasher.finalize_reset();
                trace!(key = ?hash.key, digest = %encode_base64(&digest), "body hash finished");
                hash.digest = Some(digest);
            }
        }
    }
}
