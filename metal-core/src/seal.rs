//! Seal: the optional descriptor stored ahead of a version 2 payload.
//!
//! Serialized as a compact positional JSON array
//! `["seal1", length, mime_type, name, comment]` where trailing absent
//! fields are omitted and absent fields in between are `null`.

use crate::error::{MetalError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const SEAL_SCHEMA: &str = "seal1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seal {
    pub schema: String,
    pub length: u64,
    pub mime_type: Option<String>,
    pub name: Option<String>,
    pub comment: Option<String>,
}

impl Seal {
    pub fn new(length: u64) -> Self {
        Self {
            schema: SEAL_SCHEMA.to_string(),
            length,
            mime_type: None,
            name: None,
            comment: None,
        }
    }

    pub fn for_payload(payload: &[u8]) -> Self {
        Self::new(payload.len() as u64)
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_compatible_schema(schema: &str) -> bool {
        schema == SEAL_SCHEMA
    }

    pub fn stringify(&self) -> String {
        let optional = [&self.mime_type, &self.name, &self.comment];
        let used = optional
            .iter()
            .rposition(|field| field.is_some())
            .map_or(0, |index| index + 1);

        let mut fields = vec![
            Value::String(self.schema.clone()),
            Value::from(self.length),
        ];
        fields.extend(optional[..used].iter().map(|field| match field {
            Some(text) => Value::String(text.clone()),
            None => Value::Null,
        }));

        Value::Array(fields).to_string()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| MetalError::MalformedDescriptor(e.to_string()))?;
        let Value::Array(fields) = value else {
            return Err(MetalError::MalformedDescriptor(
                "descriptor is not an array".to_string(),
            ));
        };

        let schema = match fields.first() {
            Some(Value::String(schema)) if Self::is_compatible_schema(schema) => schema.clone(),
            Some(other) => {
                return Err(MetalError::MalformedDescriptor(format!(
                    "unsupported schema {}",
                    other
                )));
            }
            None => {
                return Err(MetalError::MalformedDescriptor(
                    "descriptor is empty".to_string(),
                ));
            }
        };

        let length = fields.get(1).and_then(Value::as_u64).ok_or_else(|| {
            MetalError::MalformedDescriptor("length must be a non-negative integer".to_string())
        })?;

        Ok(Self {
            schema,
            length,
            mime_type: optional_text(&fields, 2, "mime_type")?,
            name: optional_text(&fields, 3, "name")?,
            comment: optional_text(&fields, 4, "comment")?,
        })
    }
}

fn optional_text(fields: &[Value], index: usize, label: &str) -> Result<Option<String>> {
    match fields.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(MetalError::MalformedDescriptor(format!(
            "{} must be a string or null, got {}",
            label, other
        ))),
    }
}

impl fmt::Display for Seal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

impl FromStr for Seal {
    type Err = MetalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
