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

//! Formatting of the `DKIM-Signature` header.

use crate::{
    quoted_printable,
    signature::{Signature, DKIM_SIGNATURE_NAME, SIGNATURE_VERSION},
    util::encode_base64,
};

// Note: columns count characters, not bytes.

pub const LINE_WIDTH: usize = 78;

const FOLD: &str = "\r\n\t";

/// A column-aware header builder that keeps lines within [`LINE_WIDTH`]
/// characters, folding with CRLF and a tab.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeaderFolder {
    output: String,
    column: usize,
}

impl HeaderFolder {
    pub fn new(start: &str) -> Self {
        Self {
            output: start.into(),
            column: start.chars().count(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.output
    }

    pub fn into_string(self) -> String {
        self.output
    }

    fn fold(&mut self) {
        self.output.push_str(FOLD);
        self.column = 1;
    }

    fn push(&mut self, c: char) {
        self.output.push(c);
        self.column += 1;
    }

    fn push_str(&mut self, s: &str) {
        self.output.push_str(s);
        self.column += s.chars().count();
    }

    /// Appends an item.
    ///
    /// The optional `pad` character (a separator such as `;`) is attached to
    /// the preceding text, and the item itself, `intro` followed by `payload`,
    /// is then set off by a space. Without `pad` the item is attached
    /// directly. An item that does not fit on the current line goes on a new
    /// line; an item too long for any line is broken up anywhere inside its
    /// payload.
    pub fn append(&mut self, pad: Option<char>, intro: Option<&str>, payload: &str) {
        if let Some(pad) = pad {
            if self.column + 1 > LINE_WIDTH {
                self.fold();
            }
            self.push(pad);
        }

        let intro = intro.unwrap_or_default();
        let sep = usize::from(pad.is_some());
        let intro_len = intro.chars().count();
        let len = intro_len + payload.chars().count();

        if self.column + sep + len <= LINE_WIDTH {
            if pad.is_some() {
                self.push(' ');
            }
        } else if 1 + len <= LINE_WIDTH || self.column + sep + intro_len > LINE_WIDTH {
            self.fold();
        } else if pad.is_some() {
            self.push(' ');
        }

        self.push_str(intro);

        for c in payload.chars() {
            if self.column >= LINE_WIDTH {
                self.fold();
            }
            self.push(c);
        }
    }
}

/// Formats the signature header up to and including the (empty) *b=* tag.
/// Appending `;` gives the header text that gets hashed and signed.
pub fn format_without_signature(sig: &Signature, signed_header_names: &[String]) -> HeaderFolder {
    let mut header = HeaderFolder::new(&format!("{DKIM_SIGNATURE_NAME}: v={SIGNATURE_VERSION}"));

    header.append(Some(';'), Some("a="), &sig.algorithm_tag());
    header.append(Some(';'), Some("q="), "dns/txt");
    header.append(Some(';'), Some("c="), &sig.canonicalization.to_string());
    header.append(Some(';'), Some("d="), sig.domain.as_deref().unwrap_or_default());
    header.append(Some(';'), Some("s="), sig.selector.as_deref().unwrap_or_default());

    header.append(Some(';'), Some("h="), "");
    for (i, name) in signed_header_names.iter().enumerate() {
        if i > 0 {
            header.append(None, None, ":");
        }
        header.append(None, None, name);
    }

    let body_hash = sig.body_hash.as_ref().map(encode_base64).unwrap_or_default();
    header.append(Some(';'), Some("bh="), &body_hash);

    if let Some(identity) = &sig.identity {
        header.append(Some(';'), Some("i="), &quoted_printable::encode(identity));
    }
    if let Some(t) = sig.timestamp {
        header.append(Some(';'), Some("t="), &t.to_string());
    }
    if let Some(x) = sig.expiration {
        header.append(Some(';'), Some("x="), &x.to_string());
    }
    if let Some(l) = sig.body_length {
        header.append(Some(';'), Some("l="), &l.to_string());
    }

    header.append(Some(';'), Some("b="), "");

    header
}

/// Completes the header with the Base64-encoded signature data.
pub fn insert_signature_data(mut header: HeaderFolder, signature_data: &[u8]) -> String {
    header.append(None, None, &encode_base64(signature_data));
    header.append(None, None, ";");
    header.into_string()
}
