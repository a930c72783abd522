//! Request fingerprinting.
//!
//! A fingerprint identifies the structure of a request: method, scheme, host,
//! port, path, query string and parsed body. Headers are deliberately left
//! out; trace ids and similar values differ between retries of the same
//! logical request.
//!
//! ## Scheme (v1)
//!
//! The fields are assembled into a JSON object and written canonically:
//! object keys sorted bytewise at every depth, no whitespace, strings and
//! numbers encoded by `serde_json`. The bytes are prefixed with
//! `idemgate.fingerprint.v1\n`, hashed with SHA-256 and rendered as lowercase
//! hex. Key ordering is done here rather than relying on `serde_json::Map`,
//! whose iteration order changes with the `preserve_order` feature.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::error::IdempotencyError;
use super::request::RequestFacts;

const DOMAIN_TAG: &[u8] = b"idemgate.fingerprint.v1\n";

/// Hex-encoded SHA-256 over the canonical request description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a request.
///
/// Fails with [`IdempotencyError::BodyNotMaterialized`] when no parsed body
/// has been attached to the request.
pub fn fingerprint(request: &RequestFacts) -> Result<Fingerprint, IdempotencyError> {
    let body = request
        .body
        .as_ref()
        .ok_or(IdempotencyError::BodyNotMaterialized)?;

    let mut fields = Map::new();
    fields.insert("body".into(), body.clone());
    fields.insert("host".into(), Value::from(request.host.as_str()));
    fields.insert("method".into(), Value::from(request.method.as_str()));
    fields.insert("path".into(), Value::from(request.path.as_str()));
    fields.insert("port".into(), Value::from(request.port));
    fields.insert(
        "query_string".into(),
        Value::from(request.query_string.as_str()),
    );
    fields.insert("scheme".into(), Value::from(request.scheme.as_str()));

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    hasher.update(canonical_bytes(&Value::Object(fields)));
    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Canonical JSON encoding with sorted object keys.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (index, (key, nested)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out);
                out.push(b':');
                write_canonical(nested, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) {
    // Writing a scalar into a Vec cannot fail.
    let _ = serde_json::to_writer(&mut *out, value);
}
