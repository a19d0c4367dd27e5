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

//! Representation of raw header data.

use crate::parse::is_wsp;
use std::fmt::{self, Debug, Formatter};

/// A raw header as it appeared in the message: field name, colon, and
/// possibly folded value, with the final line break trimmed.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct RawHeader(Box<[u8]>);

impl RawHeader {
    pub fn new(value: impl Into<Box<[u8]>>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The field name: everything before the first colon, without trailing
    /// whitespace. A header without a colon is all name.
    pub fn name(&self) -> &[u8] {
        let name = match self.0.iter().position(|&b| b == b':') {
            Some(i) => &self.0[..i],
            None => &self.0[..],
        };
        let len = name.iter().rposition(|&b| !is_wsp(b)).map_or(0, |i| i + 1);
        &name[..len]
    }

    /// Compares the field name against `name`, ignoring ASCII case.
    pub fn has_name(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name.as_bytes())
    }
}

impl AsRef<[u8]> for RawHeader {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for RawHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawHeader")
            .field(&String::from_utf8_lossy(&self.0))
            .finish()
    }
}

/// Selects the headers named in a signature's *h=* list.
///
/// Each name picks the next header of that name not picked yet, going through
/// the headers in the order they appeared in the message. Names with no (or no
/// more) matching header select nothing, as with over-signed names.
///
/// Note that RFC 6376, section 5.4.2, matches repeated headers from the
/// bottom of the header section upwards. Here the first instance is matched
/// first, for signing and verification alike, so a signature over a repeated
/// header (such as `Received`) made by a signer that follows the RFC order
/// may not verify here, and vice versa.
pub fn select_signed_headers<'a, 'b, I>(headers: &'a [RawHeader], names: I) -> Vec<&'a RawHeader>
where
    I: IntoIterator<Item = &'b str>,
{
    let mut used = vec![false; headers.len()];
    let mut selected = vec![];

    for name in names {
        let next = headers
            .iter()
            .enumerate()
            .find(|(i, h)| !used[*i] && h.has_name(name));

        if let Some((i, header)) = next {
            used[i] = true;
            selected.push(header);
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &[&str]) -> Vec<RawHeader> {
        raw.iter().map(|h| RawHeader::new(h.as_bytes())).collect()
    }

    #[test]
    fn raw_header_name() {
        assert_eq!(RawHeader::new(*b"From: me").name(), b"From");
        assert_eq!(RawHeader::new(*b"Subject \t: x").name(), b"Subject");
        assert_eq!(RawHeader::new(*b"X-Empty:").name(), b"X-Empty");
        assert_eq!(RawHeader::new(*b"garbage").name(), b"garbage");

        assert!(RawHeader::new(*b"dkim-signature: v=1").has_name("DKIM-Signature"));
        assert!(!RawHeader::new(*b"To: you").has_name("From"));
    }

    #[test]
    fn select_signed_headers_in_order() {
        let headers = headers(&[
            "Received: one",
            "From: me",
            "Received: two",
            "To: you",
            "received: three",
        ]);

        let selected = select_signed_headers(&headers, ["received", "From", "Received", "Cc"]);

        assert_eq!(
            selected,
            [&headers[0], &headers[1], &headers[2]],
        );
    }

    #[test]
    fn select_signed_headers_repeated_name_takes_topmost() {
        let headers = headers(&["Received: top", "Received: bottom"]);

        let selected = select_signed_headers(&headers, ["Received"]);

        assert_eq!(selected, [&headers[0]]);
    }

    #[test]
    fn select_signed_headers_oversigned() {
        let headers = headers(&["From: me", "Subject: hi"]);

        let selected = select_signed_headers(&headers, ["From", "Subject", "From", "Subject"]);

        assert_eq!(selected, [&headers[0], &headers[1]]);
    }
}
