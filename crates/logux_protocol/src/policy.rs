//! Request validation policy.
//!
//! Validation runs in a fixed order and the first failing check decides the
//! response:
//!
//! 1. body shape (`400 Wrong body`)
//! 2. shared secret (`403 Wrong secret`)
//! 3. protocol version (`400 Back-end protocol version is not supported`)
//!
//! The secret is only inspected once the body is known to be an object, and
//! the version only once the caller is authenticated.

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::ops::RangeInclusive;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Back-end protocol version spoken by this implementation.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 4;

/// Why a request was rejected before streaming began.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The body is not JSON or not a JSON object.
    #[error("Wrong body")]
    WrongBody,

    /// The shared secret is missing or wrong.
    #[error("Wrong secret")]
    WrongSecret,

    /// The protocol version is missing or unsupported.
    #[error("Back-end protocol version is not supported")]
    UnsupportedProtocol,
}

impl Rejection {
    /// Returns the HTTP status code for this rejection.
    pub fn status(&self) -> u16 {
        match self {
            Rejection::WrongBody | Rejection::UnsupportedProtocol => 400,
            Rejection::WrongSecret => 403,
        }
    }

    /// Returns the plain-text response body.
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::WrongBody => "Wrong body",
            Rejection::WrongSecret => "Wrong secret",
            Rejection::UnsupportedProtocol => "Back-end protocol version is not supported",
        }
    }
}

/// A request body that passed shape validation.
#[derive(Debug, Clone, Copy)]
pub struct ValidBody<'a> {
    fields: &'a Map<String, Value>,
    commands: &'a [Value],
}

impl<'a> ValidBody<'a> {
    /// Returns the `{version, secret}` subset of the body.
    pub fn meta(&self) -> MetaParams<'a> {
        MetaParams {
            version: self.fields.get("version"),
            secret: self.fields.get("secret"),
        }
    }

    /// Returns the command batch. A missing `commands` field is an empty batch.
    pub fn commands(&self) -> &'a [Value] {
        self.commands
    }
}

/// Authentication and compatibility fields of a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetaParams<'a> {
    /// Raw `version` field.
    pub version: Option<&'a Value>,
    /// Raw `secret` field.
    pub secret: Option<&'a Value>,
}

impl MetaParams<'_> {
    /// Returns the declared version as a number.
    ///
    /// Accepts a JSON integer or a string holding one.
    pub fn version_number(&self) -> Option<u32> {
        match self.version? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the secret if it is a string.
    pub fn secret_str(&self) -> Option<&str> {
        self.secret.and_then(Value::as_str)
    }
}

/// Shared secret and supported version range for incoming requests.
#[derive(Clone)]
pub struct ProtocolPolicy {
    key: Zeroizing<Vec<u8>>,
    tag: Vec<u8>,
    supported_versions: RangeInclusive<u32>,
}

impl std::fmt::Debug for ProtocolPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolPolicy")
            .field("secret", &"<redacted>")
            .field("supported_versions", &self.supported_versions)
            .finish()
    }
}

impl ProtocolPolicy {
    /// Creates a policy that accepts the given secret and the default
    /// protocol version.
    ///
    /// A policy built from an empty secret rejects every request.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let key = Zeroizing::new(secret.as_ref().to_vec());
        let tag = sign(&key, &key).unwrap_or_default();
        Self {
            key,
            tag,
            supported_versions: DEFAULT_PROTOCOL_VERSION..=DEFAULT_PROTOCOL_VERSION,
        }
    }

    /// Sets the supported protocol version range.
    pub fn with_supported_versions(mut self, versions: RangeInclusive<u32>) -> Self {
        self.supported_versions = versions;
        self
    }

    /// Returns the supported protocol version range.
    pub fn supported_versions(&self) -> &RangeInclusive<u32> {
        &self.supported_versions
    }

    /// Runs every check in order and returns the validated body.
    pub fn validate<'a>(&self, parsed: &'a Value) -> Result<ValidBody<'a>, Rejection> {
        let body = Self::validate_body(parsed)?;
        let meta = body.meta();
        self.validate_secret(&meta)?;
        self.validate_protocol(&meta)?;
        Ok(body)
    }

    /// Checks that the body is an object with an optional `commands` array.
    pub fn validate_body(parsed: &Value) -> Result<ValidBody<'_>, Rejection> {
        let fields = parsed.as_object().ok_or(Rejection::WrongBody)?;
        let commands: &[Value] = match fields.get("commands") {
            None | Some(Value::Null) => &[],
            Some(Value::Array(commands)) => commands.as_slice(),
            Some(_) => return Err(Rejection::WrongBody),
        };
        Ok(ValidBody { fields, commands })
    }

    /// Checks the shared secret in constant time.
    pub fn validate_secret(&self, meta: &MetaParams<'_>) -> Result<(), Rejection> {
        let candidate = meta.secret_str().ok_or(Rejection::WrongSecret)?;
        if self.key.is_empty() {
            return Err(Rejection::WrongSecret);
        }
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| Rejection::WrongSecret)?;
        mac.update(candidate.as_bytes());
        mac.verify_slice(&self.tag)
            .map_err(|_| Rejection::WrongSecret)
    }

    /// Checks that the declared version is in the supported range.
    pub fn validate_protocol(&self, meta: &MetaParams<'_>) -> Result<(), Rejection> {
        match meta.version_number() {
            Some(version) if self.supported_versions.contains(&version) => Ok(()),
            _ => Err(Rejection::UnsupportedProtocol),
        }
    }
}

fn sign(key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(data);
    Some(mac.finalize().into_bytes().to_vec())
}
