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

//! DKIM-Quoted-Printable encoding.
//!
//! See RFC 6376, section 2.11.

use std::fmt::Write;

/// Encodes bytes as a DKIM-Quoted-Printable string.
pub fn encode(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len());

    for &b in bytes {
        if is_dkim_safe(b) {
            result.push(char::from(b));
        } else {
            // writing to a String cannot fail
            let _ = write!(result, "={b:02X}");
        }
    }

    result
}

/// Decodes DKIM-Quoted-Printable data.
///
/// Decoding is lenient: whitespace is skipped, and an `=` that does not
/// introduce a valid hex octet is dropped.
pub fn decode(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'=' => {
                if let Some(x) = bytes.get(i + 1..i + 3).and_then(decode_hex_octet) {
                    result.push(x);
                    i += 3;
                    continue;
                }
            }
            b' ' | b'\t' | b'\r' | b'\n' => {}
            b => result.push(b),
        }
        i += 1;
    }

    result
}

fn decode_hex_octet(digits: &[u8]) -> Option<u8> {
    let s = std::str::from_utf8(digits).ok()?;
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

fn is_dkim_safe(b: u8) -> bool {
    // printable ASCII except semicolon and equals sign
    matches!(b, b'!'..=b':' | b'<' | b'>'..=b'~')
}
