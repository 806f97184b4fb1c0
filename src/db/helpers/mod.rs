use anyhow::{anyhow, Context, Result};

use crate::store::Fields;

pub fn encode_body(fields: &Fields) -> Result<String> {
    serde_json::to_string(fields).context("failed to encode document body")
}

pub fn decode_body(raw: &str, id: &str) -> Result<Fields> {
    match serde_json::from_str::<serde_json::Value>(raw)
        .with_context(|| format!("document {id} holds invalid JSON"))?
    {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(anyhow!("document {id} body is not an object: {other}")),
    }
}

/// SQLite JSON path for a top-level field.
pub fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_object_bodies() {
        assert!(decode_body("[1,2]", "x").is_err());
        assert!(decode_body("{\"xp\": 3}", "x").is_ok());
    }

    #[test]
    fn quotes_field_names_in_paths() {
        assert_eq!(json_path("xp"), "$.\"xp\"");
    }
}
