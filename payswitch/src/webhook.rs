//! Signature verification for inbound provider notifications.
//!
//! A [`WebhookVerifier`] computes an HMAC over the notification body (either
//! the raw bytes or a canonical JSON rendering), hex-encodes it and compares
//! it in constant time with the value of the provider's signature header.

use std::fmt::{self, Write as _};

use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde_json::Value;
use sha2::{Sha256, Sha512};

#[cfg(feature = "telemetry")]
use tracing::warn;

/// Keyed hash used by a provider to sign notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// HMAC-SHA256.
    HmacSha256,
    /// HMAC-SHA512.
    HmacSha512,
}

/// Which rendering of the body the signature covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedBody {
    /// Keys sorted lexicographically, compact separators.
    CanonicalJson,
    /// The bytes exactly as received.
    Raw,
}

/// What to do with notifications when no webhook secret is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnsignedPolicy {
    /// Fail every notification.
    #[default]
    Reject,
    /// Accept notifications without checking a signature.
    AcceptUnsigned,
}

/// Verifies notification signatures for one provider.
#[derive(Clone)]
pub struct WebhookVerifier {
    algorithm: SignatureAlgorithm,
    body: SignedBody,
    headers: &'static [&'static str],
    secret: Option<String>,
    unsigned: UnsignedPolicy,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("algorithm", &self.algorithm)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("unsigned", &self.unsigned)
            .finish()
    }
}

impl WebhookVerifier {
    /// Creates a verifier reading the signature from the first present
    /// header in `headers`.
    #[must_use]
    pub const fn new(
        algorithm: SignatureAlgorithm,
        body: SignedBody,
        headers: &'static [&'static str],
    ) -> Self {
        Self {
            algorithm,
            body,
            headers,
            secret: None,
            unsigned: UnsignedPolicy::Reject,
        }
    }

    /// Sets the shared secret. Blank secrets count as absent.
    #[must_use]
    pub fn with_secret(mut self, secret: Option<impl Into<String>>) -> Self {
        self.secret = secret.map(Into::into).filter(|s| !s.trim().is_empty());
        self
    }

    /// Sets what happens when no secret is configured.
    #[must_use]
    pub const fn with_unsigned_policy(mut self, policy: UnsignedPolicy) -> Self {
        self.unsigned = policy;
        self
    }

    /// Returns `true` if a secret is configured.
    #[must_use]
    pub const fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Returns `true` if the notification carries a valid signature, or if
    /// no secret is configured and the policy accepts unsigned notifications.
    #[must_use]
    pub fn verify(&self, raw_body: &[u8], headers: &HeaderMap) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            if self.unsigned == UnsignedPolicy::AcceptUnsigned {
                #[cfg(feature = "telemetry")]
                warn!("no webhook secret configured, accepting unsigned notification");
                return true;
            }
            return false;
        };
        let Some(signature) = self.signature_header(headers) else {
            return false;
        };
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Some(message) = self.signed_bytes(raw_body) else {
            return false;
        };
        self.verify_mac(secret.as_bytes(), &message, &expected)
    }

    /// Computes the header value a provider would send for `raw_body`.
    ///
    /// Returns `None` without a secret, or when canonical signing is
    /// configured and the body is not valid JSON.
    #[must_use]
    pub fn sign(&self, raw_body: &[u8]) -> Option<String> {
        let secret = self.secret.as_deref()?;
        let message = self.signed_bytes(raw_body)?;
        let digest = match self.algorithm {
            SignatureAlgorithm::HmacSha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
                mac.update(&message);
                mac.finalize().into_bytes().to_vec()
            }
            SignatureAlgorithm::HmacSha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).ok()?;
                mac.update(&message);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Some(hex::encode(digest))
    }

    fn verify_mac(&self, secret: &[u8], message: &[u8], expected: &[u8]) -> bool {
        match self.algorithm {
            SignatureAlgorithm::HmacSha256 => Hmac::<Sha256>::new_from_slice(secret)
                .map(|mut mac| {
                    mac.update(message);
                    mac.verify_slice(expected).is_ok()
                })
                .unwrap_or(false),
            SignatureAlgorithm::HmacSha512 => Hmac::<Sha512>::new_from_slice(secret)
                .map(|mut mac| {
                    mac.update(message);
                    mac.verify_slice(expected).is_ok()
                })
                .unwrap_or(false),
        }
    }

    fn signature_header<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        self.headers
            .iter()
            .find_map(|name| headers.get(*name))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
    }

    fn signed_bytes(&self, raw_body: &[u8]) -> Option<Vec<u8>> {
        match self.body {
            SignedBody::Raw => Some(raw_body.to_vec()),
            SignedBody::CanonicalJson => canonicalize(raw_body),
        }
    }
}

/// Renders a JSON document with lexicographically sorted keys and no
/// insignificant whitespace. Returns `None` for invalid JSON.
#[must_use]
pub fn canonicalize(raw_body: &[u8]) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_slice(raw_body).ok()?;
    let mut out = String::with_capacity(raw_body.len());
    write_canonical(&value, &mut out);
    Some(out.into_bytes())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_ascii_string(key, out);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(text) => write_ascii_string(text, out),
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Quotes `text` using only printable ASCII: anything else becomes a
/// lowercase `\uXXXX` escape, astral characters as a UTF-16 surrogate pair.
fn write_ascii_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0_u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}
