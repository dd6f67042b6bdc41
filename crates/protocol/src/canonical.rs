//! Canonical byte image used for signing and verification.
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Prefix for reserved metadata keys.
///
/// Keys beginning with this prefix carry unsigned metadata such as
/// the payload type tag and are excluded from the signing image on
/// both the signing and verification paths.
pub const RESERVED_PREFIX: &str = "__";

/// Compute the canonical byte image of a value.
///
/// The image is UTF-8 JSON with object keys in stable sorted order
/// and no insignificant whitespace. Object keys beginning with
/// [RESERVED_PREFIX] are excluded at every nesting depth.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let stripped = strip_reserved(value)?;
    Ok(serde_json::to_vec(&stripped)?)
}

fn strip_reserved(value: Value) -> Result<Value> {
    Ok(match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if key.starts_with(RESERVED_PREFIX) {
                    continue;
                }
                out.insert(key, strip_reserved(value)?);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(strip_reserved)
                .collect::<Result<_>>()?,
        ),
        Value::Number(number) => {
            // Payloads never contain floats; a float here means
            // a hostile or corrupt message.
            if number.is_f64() {
                return Err(Error::FloatNotCanonical);
            }
            Value::Number(number)
        }
        other => other,
    })
}
