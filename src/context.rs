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

//! The per-message processing context.
//!
//! A [`Context`] consumes a message as a stream of bytes. It splits the
//! header section into raw headers, and feeds the body line by line to the
//! body hashes, which are shared between all signatures that agree on hash
//! algorithm, body canonicalization and body length limit. Signing or
//! verification proper happens at the end of the message in
//! [`Context::finish`].

use crate::{
    body_hash::{BodyHash, BodyHashSet},
    header::RawHeader,
    parse::{chomp, is_wsp, CR, CRLF, LF},
    signature::{parse_signature, Signature, DKIM_SIGNATURE_NAME},
    signer::{self, SignRequest, SignerError},
    verifier::{self, Config, LookupTxt},
};
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
};
use tracing::{debug, trace, warn};

/// The maximum length of a header in bytes, including folded lines.
pub const MAX_HEADER_LEN: usize = 65536;
/// The maximum number of headers in a message.
pub const MAX_HEADERS: usize = 512;
/// The maximum length of a body line in bytes, including the line break.
pub const MAX_BODY_LINE_LEN: usize = 16384;

/// An error that occurs when feeding a message that exceeds structural
/// limits. Processing of the message cannot continue.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FeedError {
    HeaderTooLong,
    LineTooLong,
    TooManyHeaders,
    TooManySignatures,
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTooLong => write!(f, "header too long"),
            Self::LineTooLong => write!(f, "body line too long"),
            Self::TooManyHeaders => write!(f, "too many headers"),
            Self::TooManySignatures => write!(f, "too many DKIM signatures"),
        }
    }
}

impl Error for FeedError {}

enum Mode<'a> {
    Sign {
        requests: Vec<SignRequest>,
    },
    Verify {
        lookup: Box<dyn LookupTxt + 'a>,
        config: Config,
    },
}

/// The result of processing a message.
#[derive(Debug)]
pub struct Outcome {
    /// The signatures: when signing in the order they were requested, when
    /// verifying in the order they appear in the message.
    pub signatures: Vec<Signature>,
    /// The finished body hashes the signatures refer to.
    pub body_hashes: BodyHashSet,
    /// Whether at least one signature passed verification.
    pub verified: bool,
}

impl Outcome {
    /// The body hash used by the given signature.
    pub fn body_hash(&self, sig: &Signature) -> Option<&BodyHash> {
        sig.body_hash_id.and_then(|id| self.body_hashes.get(id))
    }
}

/// A context for signing or verifying one message.
pub struct Context<'a> {
    mode: Mode<'a>,
    dot_stuffed: bool,

    started: bool,
    past_headers: bool,
    seen_cr: bool,
    seen_lf: bool,
    seen_eod: bool,

    current_header: Vec<u8>,
    line: Vec<u8>,
    headers: Vec<RawHeader>,
    num_signature_headers: usize,

    body_hashes: BodyHashSet,
    signatures: Vec<Signature>,
}

impl<'a> Context<'a> {
    fn new(mode: Mode<'a>, dot_stuffed: bool) -> Self {
        Self {
            mode,
            dot_stuffed,
            started: false,
            past_headers: false,
            seen_cr: false,
            seen_lf: false,
            seen_eod: false,
            current_header: vec![],
            line: vec![],
            headers: vec![],
            num_signature_headers: 0,
            body_hashes: BodyHashSet::new(),
            signatures: vec![],
        }
    }

    /// Creates a context for verifying a message, using `lookup` to retrieve
    /// public key records.
    ///
    /// With `dot_stuffed`, the message is expected in SMTP DATA form: a line
    /// with a single dot ends the message, and leading dots are doubled.
    pub fn init_verify(lookup: impl LookupTxt + 'a, dot_stuffed: bool) -> Self {
        let mode = Mode::Verify {
            lookup: Box::new(lookup),
            config: Default::default(),
        };
        Self::new(mode, dot_stuffed)
    }

    /// Replaces the verification configuration. Has no effect when signing.
    pub fn with_config(mut self, config: Config) -> Self {
        if let Mode::Verify { config: c, .. } = &mut self.mode {
            *c = config;
        }
        self
    }

    /// Creates a context for signing a message. Signatures are requested with
    /// [`Context::add_sign_request`] before feeding the message.
    pub fn init_sign(dot_stuffed: bool) -> Self {
        let mode = Mode::Sign { requests: vec![] };
        Self::new(mode, dot_stuffed)
    }

    /// Adds a signature to produce.
    ///
    /// Requests must be added before any message data is fed: a body hash
    /// created later would miss the beginning of the body.
    pub fn add_sign_request(&mut self, request: SignRequest) -> Result<(), SignerError> {
        let Mode::Sign { requests } = &mut self.mode else {
            warn!("ignoring sign request in verification context");
            return Err(SignerError::NotSigning);
        };

        if self.started {
            warn!(
                domain = %request.domain,
                selector = %request.selector,
                "ignoring sign request added after message data"
            );
            return Err(SignerError::FeedingStarted);
        }

        let mut sig = request.to_signature();
        sig.body_hash_id = Some(self.body_hashes.get_or_create(sig.body_hash_key()));

        self.signatures.push(sig);
        requests.push(request);

        Ok(())
    }

    /// The signatures known so far.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Feeds a chunk of message data. Line breaks may be CRLF or bare LF.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), FeedError> {
        if !data.is_empty() {
            self.started = true;
        }

        for &c in data {
            if self.past_headers {
                self.feed_body_byte(c)?;
            } else {
                self.feed_header_byte(c)?;
            }
        }
        Ok(())
    }

    /// Signals the end of the message. Only needed when the message is not
    /// dot-stuffed: a dot-stuffed message ends with its terminating dot line.
    pub fn feed_eod(&mut self) -> Result<(), FeedError> {
        self.started = true;

        if !self.past_headers {
            self.header_complete()?;
            self.past_headers = true;
            self.seen_cr = false;
            self.seen_lf = false;
        }
        self.body_complete();
        Ok(())
    }

    /// Completes processing: produces the requested signatures, or verifies
    /// the signatures found.
    pub fn finish(mut self) -> Result<Outcome, FeedError> {
        if !self.seen_eod {
            self.feed_eod()?;
        }

        self.body_hashes.finish();

        let verified = match &self.mode {
            Mode::Sign { requests } => {
                for (request, sig) in requests.iter().zip(&mut self.signatures) {
                    signer::sign(request, sig, &self.headers, &self.body_hashes);
                }
                false
            }
            Mode::Verify { lookup, config } => {
                verifier::apply_preferences(config, &mut self.signatures);
                verifier::verify_signatures(
                    &**lookup,
                    config,
                    &mut self.signatures,
                    &self.headers,
                    &self.body_hashes,
                )
            }
        };

        Ok(Outcome {
            signatures: self.signatures,
            body_hashes: self.body_hashes,
            verified,
        })
    }

    fn feed_header_byte(&mut self, c: u8) -> Result<(), FeedError> {
        match c {
            CR => self.seen_cr = true,
            LF => {
                if !self.seen_cr {
                    self.push_header_byte(CR)?;
                }
                self.seen_cr = false;

                // an empty line ends the header section
                if self.seen_lf || self.current_header == [CR] {
                    self.header_complete()?;
                    self.past_headers = true;
                    self.seen_lf = false;
                    trace!(headers = self.headers.len(), "end of header section");
                    return Ok(());
                }

                self.seen_lf = true;
            }
            _ => {
                if self.seen_lf {
                    // anything but a continuation line starts a new header
                    if !is_wsp(c) {
                        self.header_complete()?;
                    }
                    self.seen_lf = false;
                }
                self.seen_cr = false;
            }
        }

        self.push_header_byte(c)
    }

    fn push_header_byte(&mut self, c: u8) -> Result<(), FeedError> {
        if self.current_header.len() >= MAX_HEADER_LEN {
            return Err(FeedError::HeaderTooLong);
        }
        self.current_header.push(c);
        Ok(())
    }

    fn header_complete(&mut self) -> Result<(), FeedError> {
        let raw = chomp(&self.current_header);
        if raw.is_empty() {
            self.current_header.clear();
            return Ok(());
        }

        if self.headers.len() >= MAX_HEADERS {
            return Err(FeedError::TooManyHeaders);
        }

        let header = RawHeader::new(raw);
        self.current_header.clear();

        if let Mode::Verify { config, .. } = &self.mode {
            if header.has_name(DKIM_SIGNATURE_NAME) {
                self.num_signature_headers += 1;
                if matches!(config.max_signatures, Some(max) if self.num_signature_headers > max) {
                    return Err(FeedError::TooManySignatures);
                }

                match parse_signature(header.as_bytes()) {
                    Some(mut sig) => {
                        sig.body_hash_id = Some(self.body_hashes.get_or_create(sig.body_hash_key()));
                        self.signatures.push(sig);
                    }
                    None => {
                        debug!(header = ?header, "ignoring unusable DKIM-Signature header");
                    }
                }
            }
        }

        self.headers.push(header);

        Ok(())
    }

    fn feed_body_byte(&mut self, c: u8) -> Result<(), FeedError> {
        if self.seen_eod {
            return Ok(());
        }

        if c == LF && !self.seen_cr {
            self.push_line_byte(CR)?;
        }
        self.push_line_byte(c)?;
        self.seen_cr = c == CR;

        if c == LF {
            self.body_line_complete();
        }

        Ok(())
    }

    fn push_line_byte(&mut self, c: u8) -> Result<(), FeedError> {
        if self.line.len() >= MAX_BODY_LINE_LEN {
            return Err(FeedError::LineTooLong);
        }
        self.line.push(c);
        Ok(())
    }

    fn body_line_complete(&mut self) {
        let mut line = &self.line[..];

        if self.dot_stuffed {
            if line == b".\r\n" {
                self.line.clear();
                self.body_complete();
                return;
            }
            if line.starts_with(b"..") {
                line = &line[1..];
            }
        }

        self.body_hashes.feed_line(line);
        self.line.clear();
    }

    fn body_complete(&mut self) {
        if self.seen_eod {
            return;
        }

        // a final line without line break
        if !self.line.is_empty() {
            if self.seen_cr {
                self.line.push(LF);
            } else {
                self.line.extend(CRLF);
            }
            self.body_line_complete();
            if self.seen_eod {
                return;
            }
        }

        self.body_hashes.complete_body();
        self.seen_eod = true;
    }
}

impl Debug for Context<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Mode::Sign { .. } => "sign",
            Mode::Verify { .. } => "verify",
        };
        f.debug_struct("Context")
            .field("mode", &mode)
            .field("dot_stuffed", &self.dot_stuffed)
            .field("past_headers", &self.past_headers)
            .field("seen_eod", &self.seen_eod)
            .field("headers", &self.headers)
            .field("body_hashes", &self.body_hashes)
            .field("signatures", &self.signatures)
            .finish_non_exhaustive()
    }
}
