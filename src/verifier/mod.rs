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

//! Verification of signed messages.

pub mod lookup;

pub use lookup::{key_query_name, resolve_public_key, LookupTxt, ResolvedKey};

use crate::{
    body_hash::BodyHashSet,
    crypto::{HashAlgorithm, KeyType},
    header::{select_signed_headers, RawHeader},
    message_hash::compute_data_hash,
    signature::{Signature, SIGNATURE_VERSION},
    util::{encode_base64, CanonicalStr},
};
use std::fmt::{self, Display, Formatter};
use tracing::{debug, info, trace};

/// Configuration for the verification process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Feeding a message with more `DKIM-Signature` headers than this fails.
    /// `None` means no limit.
    pub max_signatures: Option<usize>,

    /// Minimum acceptable key size in bits for RSA keys. A signature made
    /// with a smaller key fails even when it is cryptographically valid.
    pub min_rsa_key_bits: usize,

    /// Minimum acceptable key size in bits for Ed25519 keys.
    pub min_ed25519_key_bits: usize,

    /// When this flag is set, verification stops after the first signature
    /// that passes; remaining signatures keep status `None`.
    pub minimal: bool,

    /// When given, only signatures using one of these hash algorithms are
    /// verified, in order of preference.
    pub hash_preference: Option<Vec<HashAlgorithm>>,

    /// When given, only signatures using one of these key types are verified,
    /// in order of preference.
    pub key_type_preference: Option<Vec<KeyType>>,
}

impl Config {
    fn min_key_bits(&self, key_type: KeyType) -> usize {
        match key_type {
            KeyType::Rsa => self.min_rsa_key_bits,
            KeyType::Ed25519 => self.min_ed25519_key_bits,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_signatures: Some(10),
            min_rsa_key_bits: 1024,
            min_ed25519_key_bits: 250,
            minimal: false,
            hash_preference: None,
            key_type_preference: None,
        }
    }
}

/// The verification status of a signature.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum VerificationStatus {
    /// Not (yet) verified.
    #[default]
    None,
    /// The signature cannot be evaluated: it is ill-formed, or its public key
    /// is unusable.
    Invalid,
    Fail,
    Pass,
}

impl CanonicalStr for VerificationStatus {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Invalid => "invalid",
            Self::Fail => "fail",
            Self::Pass => "pass",
        }
    }
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// The reason for a verification status other than pass.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VerificationReason {
    /// The body hash does not match the *bh=* tag.
    FailBody,
    /// The signature does not verify against the header hash.
    FailMessage,
    SigAlgoMismatch,
    PubkeyUnavailable,
    PubkeyDnsRecord,
    PubkeyImport,
    PubkeyKeysize,
    SignatureError,
    DkimVersion,
}

impl CanonicalStr for VerificationReason {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::FailBody => "fail_body",
            Self::FailMessage => "fail_message",
            Self::SigAlgoMismatch => "sig_algo_mismatch",
            Self::PubkeyUnavailable => "pubkey_unavailable",
            Self::PubkeyDnsRecord => "pubkey_dnsrecord",
            Self::PubkeyImport => "pubkey_import",
            Self::PubkeyKeysize => "pubkey_keysize",
            Self::SignatureError => "signature_error",
            Self::DkimVersion => "dkim_version",
        }
    }
}

impl Display for VerificationReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// Drops signatures with algorithms not in the preference lists, and orders
/// the rest by preference (hash algorithm first, then key type).
pub fn apply_preferences(config: &Config, signatures: &mut Vec<Signature>) {
    fn position<T: PartialEq>(prefs: Option<&[T]>, item: Option<T>) -> Option<usize> {
        match prefs {
            None => Some(0),
            Some(prefs) => item.and_then(|item| prefs.iter().position(|p| *p == item)),
        }
    }

    let hash_prefs = config.hash_preference.as_deref();
    let key_prefs = config.key_type_preference.as_deref();

    if hash_prefs.is_none() && key_prefs.is_none() {
        return;
    }

    signatures.retain(|sig| {
        let keep = position(hash_prefs, Some(sig.hash_algorithm)).is_some()
            && position(key_prefs, sig.key_type).is_some();
        if !keep {
            debug!(algorithm = %sig.algorithm_tag(), "skipping signature with unwanted algorithm");
        }
        keep
    });

    signatures.sort_by_key(|sig| {
        (
            position(hash_prefs, Some(sig.hash_algorithm)),
            position(key_prefs, sig.key_type),
        )
    });
}

/// Verifies all signatures of a message whose body hashes are finished.
/// Returns whether at least one signature passed.
pub(crate) fn verify_signatures<L>(
    lookup: &L,
    config: &Config,
    signatures: &mut [Signature],
    headers: &[RawHeader],
    body_hashes: &BodyHashSet,
) -> bool
where
    L: LookupTxt + ?Sized,
{
    let mut verified = false;

    for sig in signatures.iter_mut() {
        let domain = sig.domain.as_deref().unwrap_or_default().to_owned();
        let selector = sig.selector.as_deref().unwrap_or_default().to_owned();

        let result = check_body_hash(sig, body_hashes)
            .and_then(|_| verify_signature(lookup, config, sig, headers));

        match result {
            Ok(()) => {
                trace!(%domain, %selector, "signature verified");
                sig.status = VerificationStatus::Pass;
                sig.reason = None;
                verified = true;
            }
            Err((status, reason)) => {
                info!(%domain, %selector, %status, %reason, "signature did not verify");
                sig.status = status;
                sig.reason = Some(reason);
            }
        }

        if config.minimal && verified {
            break;
        }
    }

    verified
}

type Verdict = (VerificationStatus, VerificationReason);

fn check_body_hash(sig: &Signature, body_hashes: &BodyHashSet) -> Result<(), Verdict> {
    // without bh= the signature is ill-formed, which verification reports
    let Some(expected) = &sig.body_hash else {
        return Ok(());
    };

    let computed = sig
        .body_hash_id
        .and_then(|id| body_hashes.get(id))
        .and_then(|h| h.digest());

    trace!(
        computed = ?computed.map(encode_base64),
        expected = %encode_base64(expected),
        "checking body hash"
    );

    if computed == Some(&expected[..]) {
        Ok(())
    } else {
        Err((VerificationStatus::Fail, VerificationReason::FailBody))
    }
}

fn verify_signature<L>(
    lookup: &L,
    config: &Config,
    sig: &mut Signature,
    headers: &[RawHeader],
) -> Result<(), Verdict>
where
    L: LookupTxt + ?Sized,
{
    use VerificationReason::*;
    use VerificationStatus::*;

    let (Some(key_type), Some(domain), Some(selector), Some(_), Some(_), Some(signature_data), Some(version)) = (
        sig.key_type,
        sig.domain.as_deref().filter(|s| !s.is_empty()),
        sig.selector.as_deref().filter(|s| !s.is_empty()),
        &sig.signed_headers,
        &sig.body_hash,
        &sig.signature_data,
        &sig.version,
    ) else {
        return Err((Invalid, SignatureError));
    };

    if &**version != SIGNATURE_VERSION {
        return Err((Invalid, DkimVersion));
    }

    let ResolvedKey { record, key } =
        resolve_public_key(lookup, key_type, selector, domain).map_err(|reason| (Invalid, reason))?;

    let key_bits = key.key_bits();
    let allows_hash = record.allows_hash(sig.hash_algorithm);
    sig.key_bits = Some(key_bits);
    sig.key_record = Some(record);

    if !allows_hash {
        return Err((Fail, SigAlgoMismatch));
    }

    let signed_headers = select_signed_headers(headers, sig.signed_header_names());

    let data_hash = compute_data_hash(
        sig.hash_algorithm,
        sig.canonicalization.header,
        signed_headers,
        &sig.raw_without_signature_data,
    );

    if let Err(e) = key.verify(sig.hash_algorithm, &data_hash, signature_data) {
        debug!("signature verification failed: {e}");
        return Err((Fail, FailMessage));
    }

    if key_bits < config.min_key_bits(key_type) {
        debug!(key_bits, "public key too small");
        return Err((Fail, PubkeyKeysize));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(key_type: KeyType, hash_alg: HashAlgorithm, domain: &str) -> Signature {
        let mut sig = Signature::new(Some(key_type), hash_alg);
        sig.domain = Some(domain.into());
        sig
    }

    fn domains(signatures: &[Signature]) -> Vec<&str> {
        signatures.iter().map(|s| s.domain.as_deref().unwrap()).collect()
    }

    #[test]
    fn config_default() {
        let config = Config::default();

        assert_eq!(config.max_signatures, Some(10));
        assert_eq!(config.min_key_bits(KeyType::Rsa), 1024);
        assert_eq!(config.min_key_bits(KeyType::Ed25519), 250);
        assert!(!config.minimal);
    }

    #[test]
    fn verdict_names() {
        assert_eq!(VerificationStatus::default().to_string(), "none");
        assert_eq!(VerificationStatus::Invalid.to_string(), "invalid");
        assert_eq!(VerificationReason::PubkeyDnsRecord.to_string(), "pubkey_dnsrecord");
        assert_eq!(VerificationReason::FailBody.to_string(), "fail_body");
    }

    #[test]
    fn apply_preferences_none() {
        let mut signatures = vec![
            sig(KeyType::Rsa, HashAlgorithm::Sha256, "a"),
            sig(KeyType::Ed25519, HashAlgorithm::Sha512, "b"),
        ];

        apply_preferences(&Config::default(), &mut signatures);

        assert_eq!(domains(&signatures), ["a", "b"]);
    }

    #[test]
    fn apply_preferences_filters_and_orders() {
        let mut signatures = vec![
            sig(KeyType::Rsa, HashAlgorithm::Sha256, "a"),
            sig(KeyType::Ed25519, HashAlgorithm::Sha256, "b"),
            sig(KeyType::Rsa, HashAlgorithm::Sha512, "c"),
            sig(KeyType::Ed25519, HashAlgorithm::Sha512, "d"),
            sig(KeyType::Rsa, HashAlgorithm::Sha256, "e"),
        ];

        let config = Config {
            key_type_preference: Some(vec![KeyType::Ed25519, KeyType::Rsa]),
            hash_preference: Some(vec![HashAlgorithm::Sha256]),
            ..Default::default()
        };

        apply_preferences(&config, &mut signatures);

        assert_eq!(domains(&signatures), ["b", "a", "e"]);
    }

    #[test]
    fn apply_preferences_key_type_only() {
        let mut signatures = vec![
            sig(KeyType::Rsa, HashAlgorithm::Sha256, "a"),
            sig(KeyType::Ed25519, HashAlgorithm::Sha256, "b"),
        ];

        let config = Config {
            key_type_preference: Some(vec![KeyType::Ed25519]),
            ..Default::default()
        };

        apply_preferences(&config, &mut signatures);

        assert_eq!(domains(&signatures), ["b"]);
    }
}
