use std::{collections::HashMap, fs};
use streamdkim::{Config, Context, LookupTxt, Outcome, SignRequest};

/// The raw Ed25519 public key matching `tests/keys/ed25519.pem`.
pub const ED25519_PUBLIC_KEY: &str = "9VXMCgG0fXGIzwV7eOxKhz+Pe6DRmOBYjyvVoVrc/Dw=";

#[derive(Clone, Debug, Default)]
pub struct MockLookup(HashMap<String, String>);

impl MockLookup {
    pub fn new<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(records.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl LookupTxt for MockLookup {
    fn lookup_txt(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

pub fn read_public_key_file_base64(file_name: &str) -> String {
    let s = fs::read_to_string(file_name).unwrap();
    let mut key_base64: Vec<_> = s.lines().skip(1).collect();
    key_base64.pop();
    key_base64.join("")
}

pub fn read_private_key_file(file_name: &str) -> String {
    fs::read_to_string(file_name).unwrap()
}

pub fn rsa_record() -> String {
    let base64 = read_public_key_file_base64("tests/keys/rsa2048pub.pem");
    format!("v=DKIM1; k=rsa; p={base64}")
}

pub fn ed25519_record() -> String {
    format!("v=DKIM1; k=ed25519; p={ED25519_PUBLIC_KEY}")
}

/// A lookup with RSA key selector `rsa` and Ed25519 key selector `ed25519`
/// at `example.com`.
pub fn default_lookup() -> MockLookup {
    MockLookup::new([
        ("rsa._domainkey.example.com.", rsa_record()),
        ("ed25519._domainkey.example.com.", ed25519_record()),
    ])
}

pub fn rsa_request() -> SignRequest {
    let key = read_private_key_file("tests/keys/rsa2048.pem");
    SignRequest::new("example.com", "rsa", key, "sha256").unwrap()
}

pub fn ed25519_request() -> SignRequest {
    let key = read_private_key_file("tests/keys/ed25519.pem");
    SignRequest::new("example.com", "ed25519", key, "sha256").unwrap()
}

pub fn sign<I>(message: &[u8], requests: I) -> Outcome
where
    I: IntoIterator<Item = SignRequest>,
{
    let mut ctx = Context::init_sign(false);

    for request in requests {
        ctx.add_sign_request(request).unwrap();
    }

    ctx.feed(message).unwrap();

    ctx.finish().unwrap()
}

pub fn verify(lookup: &MockLookup, message: &[u8], config: Config) -> Outcome {
    let mut ctx = Context::init_verify(lookup.clone(), false).with_config(config);

    ctx.feed(message).unwrap();

    ctx.finish().unwrap()
}

/// Prepends the `DKIM-Signature` headers produced by signing to the message.
pub fn prepend_signature_headers(outcome: &Outcome, message: &[u8]) -> Vec<u8> {
    let mut result = vec![];
    for sig in &outcome.signatures {
        result.extend(sig.header.as_ref().unwrap().bytes());
        result.extend(b"\r\n");
    }
    result.extend(message);
    result
}

/// Signs the message with the given requests and returns it with the new
/// signature headers prepended.
pub fn sign_message<I>(message: &[u8], requests: I) -> Vec<u8>
where
    I: IntoIterator<Item = SignRequest>,
{
    let outcome = sign(message, requests);
    prepend_signature_headers(&outcome, message)
}

pub fn make_message() -> Vec<u8> {
    "Message-ID: <1511928109048645963@gluet.ch>
Date: Fri, 9 Jun 2023 16:13:12 +0200
MIME-Version: 1.0
Content-Type: text/plain; charset=utf-8
Content-Disposition: inline
Content-Transfer-Encoding: 8bit
References: <4344283917108237944@example.com>
 <3993077819152979884@gluet.ch>
 <3209900529850518454@example.com>
In-Reply-To: <3209900529850518454@example.com>
From: me <me@gluet.ch>
To: you@example.com
Subject: wie gohts dr Rüdisüli?

Hallo!

Here is some trailing whitespace:  
  <- and some leading whitespace
𝔍nclude some Unicode emojis 🕊 💜
all just to exercise the c14n algorithm a bit.

Das wars!

Tschüss,
"
    .replace('\n', "\r\n")
    .into_bytes()
}
