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

//! Public key lookup.

use crate::{
    crypto::{KeyType, VerifyingKey, ED25519_KEY_LEN},
    record::PublicKeyRecord,
    verifier::VerificationReason,
};
use tracing::debug;

/// A trait for the DNS TXT lookup used to retrieve public key records.
pub trait LookupTxt {
    /// Looks up the TXT record at `name`, a fully qualified name with a final
    /// dot (eg `selector._domainkey.example.com.`).
    ///
    /// `None` or an empty string means there is no record.
    fn lookup_txt(&self, name: &str) -> Option<String>;
}

impl<F> LookupTxt for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup_txt(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Returns the DNS name of the public key record for `selector` and `domain`.
pub fn key_query_name(selector: &str, domain: &str) -> String {
    format!("{selector}._domainkey.{domain}.")
}

/// A public key and the record it was published in.
#[derive(Debug)]
pub struct ResolvedKey {
    pub record: PublicKeyRecord,
    pub key: VerifyingKey,
}

/// Retrieves and imports the public key for a signature of the given key type.
///
/// All failures are reported as the reason for an invalid signature.
pub fn resolve_public_key<L>(
    lookup: &L,
    key_type: KeyType,
    selector: &str,
    domain: &str,
) -> Result<ResolvedKey, VerificationReason>
where
    L: LookupTxt + ?Sized,
{
    let name = key_query_name(selector, domain);

    let txt = match lookup.lookup_txt(&name) {
        Some(txt) if !txt.is_empty() => txt,
        _ => {
            debug!(%name, "no public key record");
            return Err(VerificationReason::PubkeyUnavailable);
        }
    };

    let record: PublicKeyRecord = txt.parse().map_err(|e| {
        debug!(%name, "could not parse public key record: {e}");
        VerificationReason::PubkeyDnsRecord
    })?;

    if !record.allows_email_service() {
        debug!(%name, service_type = %record.service_type, "public key not for use with email");
        return Err(VerificationReason::PubkeyDnsRecord);
    }

    let record_key_type: KeyType = record.key_type.parse().map_err(|_| {
        debug!(%name, key_type = %record.key_type, "unknown key type in public key record");
        VerificationReason::PubkeyImport
    })?;

    if record_key_type != key_type {
        debug!(%name, "key type of public key record does not match signature");
        return Err(VerificationReason::PubkeyImport);
    }

    let mut key_data = &record.key_data[..];

    // Ed25519 keys published as SubjectPublicKeyInfo: the raw key comes last
    if key_type == KeyType::Ed25519 && key_data.len() > ED25519_KEY_LEN {
        debug!(%name, len = key_data.len(), "using trailing {ED25519_KEY_LEN} bytes of Ed25519 key data");
        key_data = &key_data[key_data.len() - ED25519_KEY_LEN..];
    }

    let key = VerifyingKey::from_key_data(key_type, key_data).map_err(|e| {
        debug!(%name, "could not import public key: {e}");
        VerificationReason::PubkeyImport
    })?;

    Ok(ResolvedKey { record, key })
}
