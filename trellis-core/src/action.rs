//! Actions
//!
//! An [`Action`] is the only way to ask the store for a state change. It is a
//! tagged, immutable value: a `kind` string naming the request and an opaque
//! JSON payload. Actions carry no behavior.

use std::borrow::Cow;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActionError;

/// An immutable description of a requested state change.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::Action;
///
/// let add = Action::with_payload("ADD_ITEM", json!({ "id": "p1", "price": 10.0 }));
/// assert!(add.is("ADD_ITEM"));
/// assert_eq!(add.payload()["id"], "p1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    kind: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    payload: Value,
}

impl Action {
    /// Create an action without a payload.
    pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
        }
    }

    /// Create an action carrying a raw JSON payload.
    pub fn with_payload(kind: impl Into<Cow<'static, str>>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Create an action whose payload is the serialized form of `payload`.
    pub fn encode<T: Serialize>(
        kind: impl Into<Cow<'static, str>>,
        payload: &T,
    ) -> Result<Self, ActionError> {
        let kind = kind.into();
        let payload = serde_json::to_value(payload).map_err(|source| ActionError::Encode {
            kind: kind.to_string(),
            source,
        })?;
        Ok(Self { kind, payload })
    }

    /// The action kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Check the action kind.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// The raw payload (`Value::Null` when absent).
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        T::deserialize(&self.payload).map_err(|source| ActionError::Decode {
            kind: self.kind.to_string(),
            source,
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}
