//! Extended JSON wrappers.
//!
//! DDP carries timestamps as `{"$date": <millis since epoch>}` and byte
//! buffers as `{"$binary": "<base64>"}`. The helpers here convert between
//! those wrappers and Rust values; the `date` and `binary` submodules plug
//! into serde's `with` attribute for typed documents.
//!
//! ```
//! use chrono::{DateTime, Utc};
//! use ddpwire::message::ejson;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Todo {
//!     title: String,
//!     #[serde(with = "ejson::date")]
//!     created: DateTime<Utc>,
//! }
//!
//! let todo: Todo =
//!     serde_json::from_str(r#"{"title":"x","created":{"$date":0}}"#).expect("decode");
//! assert_eq!(todo.created.timestamp_millis(), 0);
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

const DATE_KEY: &str = "$date";
const BINARY_KEY: &str = "$binary";

/// Wrap a timestamp.
#[must_use]
pub fn to_date(at: DateTime<Utc>) -> Value { json!({ DATE_KEY: at.timestamp_millis() }) }

/// Unwrap a `{"$date": millis}` value.
#[must_use]
pub fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    let object = value.as_object().filter(|object| object.len() == 1)?;
    let millis = object.get(DATE_KEY)?.as_i64()?;
    DateTime::from_timestamp_millis(millis)
}

/// Wrap a byte buffer.
#[must_use]
pub fn to_binary(bytes: &[u8]) -> Value { json!({ BINARY_KEY: BASE64.encode(bytes) }) }

/// Unwrap a `{"$binary": base64}` value.
#[must_use]
pub fn as_binary(value: &Value) -> Option<Vec<u8>> {
    let object = value.as_object().filter(|object| object.len() == 1)?;
    let encoded = object.get(BINARY_KEY)?.as_str()?;
    BASE64.decode(encoded).ok()
}

/// Serde adapter for `DateTime<Utc>` fields encoded as `$date`.
pub mod date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
    use serde_json::Value;

    /// Serialise as `{"$date": millis}`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        super::to_date(*at).serialize(serializer)
    }

    /// Deserialise from `{"$date": millis}`.
    ///
    /// # Errors
    ///
    /// Fails when the value is not a `$date` wrapper or is out of range.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::as_date(&value).ok_or_else(|| D::Error::custom("expected {\"$date\": millis}"))
    }
}

/// Serde adapter for `Vec<u8>` fields encoded as `$binary`.
pub mod binary {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
    use serde_json::Value;

    /// Serialise as `{"$binary": base64}`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        super::to_binary(bytes).serialize(serializer)
    }

    /// Deserialise from `{"$binary": base64}`.
    ///
    /// # Errors
    ///
    /// Fails when the value is not a `$binary` wrapper or is not base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::as_binary(&value).ok_or_else(|| D::Error::custom("expected {\"$binary\": base64}"))
    }
}
