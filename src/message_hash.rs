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

//! Computation of the header hash.

use crate::{
    canonicalize::{canonicalize_header, canonicalize_signature_header},
    crypto::{new_digest, BoxedDigest, HashAlgorithm},
    header::RawHeader,
    signature::CanonicalizationAlgorithm,
};
use std::fmt::{self, Debug, Formatter};
use tracing::trace;

/// An incremental hasher over the signed headers of a message, in the order
/// given by a signature's *h=* list, followed by the signature header itself.
pub struct HeaderHasher {
    canonicalization: CanonicalizationAlgorithm,
    digest: BoxedDigest,
    buf: Vec<u8>,
}

impl HeaderHasher {
    pub fn new(hash_alg: HashAlgorithm, canonicalization: CanonicalizationAlgorithm) -> Self {
        Self {
            canonicalization,
            digest: new_digest(hash_alg),
            buf: vec![],
        }
    }

    /// Hashes one signed header, canonicalized and terminated with CRLF.
    pub fn update_header(&mut self, header: &RawHeader) {
        self.buf.clear();
        canonicalize_header(&mut self.buf, self.canonicalization, header.as_bytes());

        trace!(header = ?String::from_utf8_lossy(&self.buf), "hashing header");
        self.digest.update(&self.buf);
    }

    /// Hashes the `DKIM-Signature` header with empty *b=* value, canonicalized
    /// but without CRLF, and returns the final digest.
    pub fn finish(mut self, signature_header: &[u8]) -> Box<[u8]> {
        let canonical = canonicalize_signature_header(self.canonicalization, signature_header);

        trace!(header = ?String::from_utf8_lossy(&canonical), "hashing signature header");
        self.digest.update(&canonical);
        self.digest.finalize_reset()
    }
}

impl Debug for HeaderHasher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderHasher")
            .field("canonicalization", &self.canonicalization)
            .finish_non_exhaustive()
    }
}

/// Computes the header hash over the given signed headers and the signature
/// header.
pub fn compute_data_hash<'a>(
    hash_alg: HashAlgorithm,
    canonicalization: CanonicalizationAlgorithm,
    headers: impl IntoIterator<Item = &'a RawHeader>,
    signature_header: &[u8],
) -> Box<[u8]> {
    let mut hasher = HeaderHasher::new(hash_alg, canonicalization);
    for header in headers {
        hasher.update_header(header);
    }
    hasher.finish(signature_header)
}
