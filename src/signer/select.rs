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

//! Selection of the headers to sign.

use crate::{header::RawHeader, parse::trim_whitespace};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Multiplicity {
    /// Sign the first matching header only.
    Once,
    /// `+name`: sign every instance, and list the name once more.
    Oversign,
    /// `=name`: sign every instance.
    All,
}

#[derive(Debug)]
struct SignListEntry<'a> {
    name: &'a str,
    multiplicity: Multiplicity,
    ticked: bool,
}

fn parse_sign_list(sign_headers: &str) -> Vec<SignListEntry<'_>> {
    sign_headers
        .split(':')
        .map(trim_whitespace)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let (name, multiplicity) = if let Some(name) = s.strip_prefix('+') {
                (name, Multiplicity::Oversign)
            } else if let Some(name) = s.strip_prefix('=') {
                (name, Multiplicity::All)
            } else {
                (s, Multiplicity::Once)
            };
            SignListEntry {
                name,
                multiplicity,
                ticked: false,
            }
        })
        .filter(|e| !e.name.is_empty())
        .collect()
}

/// Headers chosen for signing, and the resulting contents of the *h=* tag.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct SelectedHeaders<'a> {
    pub headers: Vec<&'a RawHeader>,
    pub names: Vec<String>,
}

/// Selects the headers to sign, going through the message headers in the
/// order they appeared.
///
/// `sign_headers` is a colon-separated list of header names. A plain entry
/// covers only the first header of that name; entries prefixed with `+` or `=`
/// cover all of them, and `+` entries are listed in *h=* one extra time so
/// that no further instance can be added later. Plain entries without any
/// matching header are listed in *h=* as well.
///
/// Repeated headers are signed in arrival order, top down, not bottom up as
/// RFC 6376, section 5.4.2, describes. Verifiers following the RFC order can
/// verify such a signature only if each signed name occurs once.
pub fn select_headers<'a>(headers: &'a [RawHeader], sign_headers: &str) -> SelectedHeaders<'a> {
    let mut entries = parse_sign_list(sign_headers);
    let mut selected = SelectedHeaders::default();

    for header in headers {
        let name = header.name();

        let entry = entries
            .iter_mut()
            .find(|e| !e.ticked && e.name.as_bytes().eq_ignore_ascii_case(name));

        if let Some(entry) = entry {
            if entry.multiplicity == Multiplicity::Once {
                entry.ticked = true;
            }
            selected.headers.push(header);
            selected.names.push(String::from_utf8_lossy(name).into_owned());
        }
    }

    for entry in entries {
        match entry.multiplicity {
            Multiplicity::Once if !entry.ticked => selected.names.push(entry.name.into()),
            Multiplicity::Oversign => selected.names.push(entry.name.into()),
            _ => {}
        }
    }

    selected
}
