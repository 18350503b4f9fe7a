use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol version stamped on envelopes that do not carry their own.
pub const UMF_VERSION: &str = "UMF/1.4.6";

/// Long-form field name and its short-form wire alias.
///
/// This table is the single source of truth for aliasing: `Umf::create` looks up the
/// long name first and falls back to the alias, and `Umf::to_short` projects onto the alias.
pub const FIELD_ALIASES: [(&str, &str); 14] = [
    ("to", "to"),
    ("from", "frm"),
    ("headers", "hdr"),
    ("mid", "mid"),
    ("rmid", "rmid"),
    ("signature", "sig"),
    ("timeout", "tmo"),
    ("timestamp", "ts"),
    ("type", "typ"),
    ("version", "ver"),
    ("via", "via"),
    ("forward", "fwd"),
    ("body", "bdy"),
    ("authorization", "aut"),
];

const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

pub fn short_alias(long: &str) -> Option<&'static str> {
    FIELD_ALIASES
        .iter()
        .find(|(name, _)| *name == long)
        .map(|(_, alias)| *alias)
}

/// A canonical (long-form) UMF envelope.
///
/// `mid`, `timestamp` and `version` are always populated. Field order matches the
/// canonical JSON layout used when signing, with `signature` last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Umf {
    pub to: String,
    pub mid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Value>,
    pub timestamp: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// The wire form of an envelope, using three-letter aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortUmf {
    pub to: String,
    pub mid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdr: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmo: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bdy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aut: Option<String>,
}

impl Umf {
    /// An empty envelope: blank `to`, fresh `mid`, current timestamp.
    pub fn new() -> Self {
        Self::create(&Value::Null)
    }

    /// Merges a partial message (long or short field names) into a canonical envelope.
    ///
    /// For each field the long name wins over the alias; falsy values (`null`, `false`,
    /// `0`, `""`) count as absent. A caller-supplied `mid`, `timestamp` or `version`
    /// overrides the generated default. Non-object input yields an empty envelope.
    ///
    /// `headers`, `timeout` and `body` are carried through as given. The string fields
    /// (`timestamp` included) take numbers and booleans in their JSON text form.
    pub fn create(partial: &Value) -> Self {
        let empty = Map::new();
        let fields = partial.as_object().unwrap_or(&empty);

        Self {
            to: text(fields, "to").unwrap_or_default(),
            mid: text(fields, "mid").unwrap_or_else(create_message_id),
            from: text(fields, "from"),
            headers: lookup(fields, "headers").cloned(),
            rmid: text(fields, "rmid"),
            timeout: lookup(fields, "timeout").cloned(),
            timestamp: text(fields, "timestamp").unwrap_or_else(timestamp),
            kind: text(fields, "type"),
            version: text(fields, "version").unwrap_or_else(|| UMF_VERSION.to_string()),
            via: text(fields, "via"),
            forward: text(fields, "forward"),
            body: lookup(fields, "body").cloned(),
            authorization: text(fields, "authorization"),
            signature: text(fields, "signature"),
        }
    }

    /// Decodes a serialized envelope in either form.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::create(&value))
    }

    /// Projects every present field onto its short alias. `to` and `mid` are always emitted.
    pub fn to_short(&self) -> ShortUmf {
        ShortUmf {
            to: self.to.clone(),
            mid: self.mid.clone(),
            frm: present(&self.from),
            hdr: self.headers.clone().filter(is_truthy),
            rmid: present(&self.rmid),
            sig: present(&self.signature),
            tmo: self.timeout.clone().filter(is_truthy),
            ts: Some(self.timestamp.clone()).filter(|ts| !ts.is_empty()),
            typ: present(&self.kind),
            ver: Some(self.version.clone()).filter(|ver| !ver.is_empty()),
            via: present(&self.via),
            fwd: present(&self.forward),
            bdy: self.body.clone().filter(is_truthy),
            aut: present(&self.authorization),
        }
    }

    /// Serializes the short form, the representation used on channels and in queues.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_short())
    }

    /// Replaces any existing signature with an HMAC over the canonical long-form JSON.
    pub fn sign(
        &mut self,
        algorithm: SignatureAlgorithm,
        shared_secret: &[u8],
    ) -> serde_json::Result<()> {
        self.signature = None;
        let canonical = serde_json::to_string(self)?;
        self.signature = Some(algorithm.digest_hex(shared_secret, canonical.as_bytes()));
        Ok(())
    }

    /// Recomputes the signature and compares it with the one carried by the envelope.
    pub fn verify(&self, algorithm: SignatureAlgorithm, shared_secret: &[u8]) -> bool {
        let Some(signature) = self.signature.as_deref() else {
            return false;
        };

        let mut unsigned = self.clone();
        unsigned.signature = None;
        match serde_json::to_string(&unsigned) {
            Ok(canonical) => {
                algorithm.digest_hex(shared_secret, canonical.as_bytes()) == signature
            }
            Err(_) => false,
        }
    }

    /// True iff `from`, `to` and `body` are all present and non-empty.
    pub fn validate(&self) -> bool {
        present(&self.from).is_some()
            && !self.to.is_empty()
            && self.body.as_ref().is_some_and(is_truthy)
    }
}

impl Default for Umf {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ShortUmf> for Umf {
    fn from(short: ShortUmf) -> Self {
        Self {
            to: short.to,
            mid: Some(short.mid)
                .filter(|mid| !mid.is_empty())
                .unwrap_or_else(create_message_id),
            from: short.frm,
            headers: short.hdr,
            rmid: short.rmid,
            timeout: short.tmo,
            timestamp: short.ts.unwrap_or_else(timestamp),
            kind: short.typ,
            version: short.ver.unwrap_or_else(|| UMF_VERSION.to_string()),
            via: short.via,
            forward: short.fwd,
            body: short.bdy,
            authorization: short.aut,
            signature: short.sig,
        }
    }
}

/// Keyed-hash algorithms accepted for envelope signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported signature algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

macro_rules! hmac_hex {
    ($digest:ty, $secret:expr, $data:expr) => {{
        let mut mac = <Hmac<$digest> as Mac>::new_from_slice($secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update($data);
        hex::encode(mac.finalize().into_bytes())
    }};
}

impl SignatureAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    fn digest_hex(self, secret: &[u8], data: &[u8]) -> String {
        match self {
            Self::Sha256 => hmac_hex!(Sha256, secret, data),
            Self::Sha384 => hmac_hex!(Sha384, secret, data),
            Self::Sha512 => hmac_hex!(Sha512, secret, data),
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(UnsupportedAlgorithm(name.to_string())),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Globally unique message ID (UUID v4).
pub fn create_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Compact base-36 identifier for contexts where a full UUID is too long.
pub fn create_short_message_id() -> String {
    let mut value = rand::thread_rng().gen_range(0..MAX_SAFE_INTEGER);
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % 36) as u32;
        digits.push(char::from_digit(digit, 36).unwrap_or('0'));
        value /= 36;
    }
    digits.iter().rev().collect()
}

/// ISO 8601 timestamp with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, long: &str) -> Option<&'a Value> {
    let alias = short_alias(long).unwrap_or(long);
    [long, alias]
        .into_iter()
        .filter_map(|name| fields.get(name))
        .find(|value| is_truthy(value))
}

fn text(fields: &Map<String, Value>, long: &str) -> Option<String> {
    lookup(fields, long).and_then(|value| match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

fn present(field: &Option<String>) -> Option<String> {
    field.clone().filter(|value| !value.is_empty())
}
