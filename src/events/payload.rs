//! # Event Payload
//!
//! The structured object carried by every event. A payload is always a JSON
//! object; scalars, arrays, and values that cannot be serialized are rejected
//! when the payload is built, so handlers only ever see well-formed objects.
//!
//! Handlers decode the payload into their own model type:
//!
//! ```rust
//! use papa_events::Payload;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct UserCreated {
//!     name: String,
//!     age: u32,
//! }
//!
//! let payload = Payload::from_model(&UserCreated { name: "test user".into(), age: 30 }).unwrap();
//! let decoded: UserCreated = payload.decode().unwrap();
//! assert_eq!(decoded.age, 30);
//! ```

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Immutable, cheaply clonable JSON object payload
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(Arc<Map<String, Value>>);

impl Payload {
    /// Build a payload from any serializable model
    pub fn from_model<T: Serialize + ?Sized>(model: &T) -> Result<Self, PayloadError> {
        let value = serde_json::to_value(model).map_err(PayloadError::NotJsonable)?;
        Self::try_from(value)
    }

    /// Decode the payload into a typed model
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        T::deserialize(Value::Object(self.0.as_ref().clone())).map_err(|source| {
            PayloadError::Decode {
                type_name: std::any::type_name::<T>(),
                source,
            }
        })
    }

    /// Borrow the underlying JSON object
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.as_ref().clone())
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.0.as_ref().clone()).to_string()
    }
}

impl TryFrom<Value> for Payload {
    type Error = PayloadError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(Arc::new(map))),
            other => Err(PayloadError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(Arc::new(map))
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors building or decoding a payload
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload must be jsonable object (got {found})")]
    NotAnObject { found: &'static str },

    #[error("payload is not JSONable: {0}")]
    NotJsonable(#[source] serde_json::Error),

    #[error("payload does not match {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
