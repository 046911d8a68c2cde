//! Structured requests.
//!
//! Hosts that receive commands as JSON (an RPC endpoint, a message queue)
//! decode them into a [`Request`] and turn that into an [`Input`]. Named
//! values may be any JSON scalar; they are handed to the parsers as text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use marshal_core::Input;

/// Errors while decoding a structured request.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("named argument '{name}' must be a scalar, got {kind}")]
    NotScalar { name: String, kind: &'static str },
}

/// A command request in serialisable form.
///
/// ```json
/// { "tokens": ["user", "rename"], "named": { "id": 42, "name": "alice" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub named: HashMap<String, Json>,
}

impl Request {
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_input(self) -> Result<Input, InputError> {
        let mut input = Input::new(self.tokens);
        for (name, value) in self.named {
            let raw = scalar_text(&name, value)?;
            input.named.insert(name, raw);
        }
        Ok(input)
    }
}

/// Builds an [`Input`] from `tokens` and a JSON object of named arguments.
pub fn from_json(
    tokens: impl IntoIterator<Item = impl Into<String>>,
    named: &Json,
) -> Result<Input, InputError> {
    let named: HashMap<String, Json> = serde_json::from_value(named.clone())?;
    Request {
        tokens: tokens.into_iter().map(Into::into).collect(),
        named,
    }
    .into_input()
}

fn scalar_text(name: &str, value: Json) -> Result<String, InputError> {
    let kind = match value {
        Json::String(s) => return Ok(s),
        Json::Null => return Ok("null".to_string()),
        Json::Bool(b) => return Ok(b.to_string()),
        Json::Number(n) => return Ok(n.to_string()),
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    };
    Err(InputError::NotScalar {
        name: name.to_string(),
        kind,
    })
}
