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

use crate::crypto::HashAlgorithm;
use digest::DynDigest;
#[cfg(feature = "pre-rfc8301")]
use sha1::Sha1;
use sha2::{Sha256, Sha512};

/// An incremental hasher for one of the supported hash algorithms.
pub type BoxedDigest = Box<dyn DynDigest + Send>;

/// Creates a fresh incremental hasher.
pub fn new_digest(hash_alg: HashAlgorithm) -> BoxedDigest {
    match hash_alg {
        HashAlgorithm::Sha256 => Box::new(Sha256::default()),
        HashAlgorithm::Sha512 => Box::new(Sha512::default()),
        #[cfg(feature = "pre-rfc8301")]
        HashAlgorithm::Sha1 => Box::new(Sha1::default()),
    }
}

/// Computes the digest of some data in one go.
pub fn digest(hash_alg: HashAlgorithm, data: &[u8]) -> Box<[u8]> {
    let mut hasher = new_digest(hash_alg);
    hasher.update(data);
    hasher.finalize()
}
