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

//! Canonicalization algorithms.
//!
//! See RFC 6376, section 3.4.
//!
//! Headers are canonicalized one raw header at a time, body data one
//! CRLF-terminated line at a time. The line functions are the building blocks
//! of the streaming body hashes in [`crate::body_hash`]; [`canonicalize_body`]
//! applies the same rules to a complete body in memory.

use crate::{
    parse::{chomp, is_wsp, CR, CRLF, LF, SP},
    signature::CanonicalizationAlgorithm,
};
use std::borrow::Cow;

/// Appends the canonical form of a raw header, terminated with CRLF.
///
/// The raw header is the complete header text including the field name,
/// possibly folded, with or without the final line break.
pub fn canonicalize_header(result: &mut Vec<u8>, algorithm: CanonicalizationAlgorithm, raw: &[u8]) {
    match algorithm {
        CanonicalizationAlgorithm::Simple => result.extend(chomp(raw)),
        CanonicalizationAlgorithm::Relaxed => relax_header_into(result, raw),
    }
    result.extend(CRLF);
}

/// Returns the canonical form of a `DKIM-Signature` header with its `b=` value
/// removed. Unlike other headers it is hashed without a terminating CRLF.
pub fn canonicalize_signature_header(algorithm: CanonicalizationAlgorithm, raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    match algorithm {
        CanonicalizationAlgorithm::Simple => result.extend(chomp(raw)),
        CanonicalizationAlgorithm::Relaxed => relax_header_into(&mut result, raw),
    }
    result
}

fn relax_header_into(result: &mut Vec<u8>, raw: &[u8]) {
    let start = result.len();
    let mut seen_wsp = false;
    let mut past_name = false;

    for &b in raw {
        let mut c = b;

        if c == CR || c == LF {
            continue;
        }

        if is_wsp(c) {
            if seen_wsp {
                continue;
            }
            c = SP;
            seen_wsp = true;
        } else if !past_name && c == b':' {
            // no whitespace on either side of the colon
            if seen_wsp {
                result.pop();
            }
            past_name = true;
            seen_wsp = true;
        } else {
            seen_wsp = false;
        }

        if !past_name {
            c = c.to_ascii_lowercase();
        }

        result.push(c);
    }

    if result.len() > start && result.last() == Some(&SP) {
        result.pop();
    }
}

/// Returns whether a CRLF-terminated body line counts as blank under relaxed
/// body canonicalization: it holds nothing but whitespace.
pub fn is_blank_line(line: &[u8]) -> bool {
    let i = line.iter().position(|&b| !is_wsp(b)).unwrap_or(line.len());
    &line[i..] == CRLF
}

/// Applies relaxed body canonicalization to one CRLF-terminated line.
pub fn relax_body_line(line: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(line.len());
    let mut seen_wsp = false;

    for &b in line {
        match b {
            CR => {
                if result.last() == Some(&SP) {
                    result.pop();
                }
                result.push(b);
            }
            b' ' | b'\t' => {
                if !seen_wsp {
                    result.push(SP);
                    seen_wsp = true;
                }
            }
            _ => {
                seen_wsp = false;
                result.push(b);
            }
        }
    }

    result
}

/// Splits body data into lines, each terminated with CRLF. A bare LF counts as
/// a line break, and a final unterminated line gets a CRLF appended.
pub fn body_lines(body: &[u8]) -> impl Iterator<Item = Cow<'_, [u8]>> {
    body.split_inclusive(|&b| b == LF).map(|line| {
        if line.ends_with(CRLF) {
            Cow::Borrowed(line)
        } else {
            let mut line = chomp(line).to_vec();
            line.extend(CRLF);
            Cow::Owned(line)
        }
    })
}

/// Canonicalizes a complete message body.
///
/// Trailing empty lines are removed (under relaxed canonicalization, also
/// lines that contain only whitespace), and an empty body canonicalizes to a
/// single CRLF under both algorithms.
pub fn canonicalize_body(algorithm: CanonicalizationAlgorithm, body: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(body.len());
    let mut blank_lines = 0;

    for line in body_lines(body) {
        let is_blank = match algorithm {
            CanonicalizationAlgorithm::Simple => *line == *CRLF,
            CanonicalizationAlgorithm::Relaxed => is_blank_line(&line),
        };

        if is_blank {
            blank_lines += 1;
            continue;
        }

        for _ in 0..blank_lines {
            result.extend(CRLF);
        }
        blank_lines = 0;

        match algorithm {
            CanonicalizationAlgorithm::Simple => result.extend(&line[..]),
            CanonicalizationAlgorithm::Relaxed => result.extend(relax_body_line(&line)),
        }
    }

    if result.is_empty() {
        result.extend(CRLF);
    }

    result
}
