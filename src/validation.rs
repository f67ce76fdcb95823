//! Input validation for the write path
//!
//! Every record is validated before it touches any tier, so a malformed
//! write can never end up half-present across backends.

use std::collections::HashMap;

use crate::constants::{
    MAX_EMBEDDING_DIM, MAX_ID_LENGTH, MAX_METADATA_KEYS, MAX_METADATA_KEY_LENGTH,
    MAX_METADATA_VALUE_BYTES, MAX_NAMESPACE_LENGTH,
};
use crate::errors::{Result, StoreError};
use crate::types::VectorRecord;

fn invalid(field: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidRecord {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Validate a full record before the fan-out write
pub fn validate_record(record: &VectorRecord) -> Result<()> {
    validate_id(record.id.as_str())?;
    validate_namespace(record.namespace())?;
    validate_embedding(&record.embedding)?;
    validate_metadata(&record.metadata)?;
    Ok(())
}

pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(invalid("id", "must not be empty"));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(invalid(
            "id",
            format!("{} bytes exceeds max {}", id.len(), MAX_ID_LENGTH),
        ));
    }
    // Ledger keys are colon-delimited; a control character in an id would
    // corrupt prefix scans.
    if id.chars().any(|c| c.is_control()) {
        return Err(invalid("id", "must not contain control characters"));
    }
    Ok(())
}

pub fn validate_namespace(namespace: Option<&str>) -> Result<()> {
    if let Some(ns) = namespace {
        if ns.is_empty() {
            return Err(invalid("namespace", "must not be empty when present"));
        }
        if ns.len() > MAX_NAMESPACE_LENGTH {
            return Err(invalid(
                "namespace",
                format!("{} bytes exceeds max {}", ns.len(), MAX_NAMESPACE_LENGTH),
            ));
        }
    }
    Ok(())
}

pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(invalid("embedding", "must not be empty"));
    }
    if embedding.len() > MAX_EMBEDDING_DIM {
        return Err(invalid(
            "embedding",
            format!(
                "dimension {} exceeds max {}",
                embedding.len(),
                MAX_EMBEDDING_DIM
            ),
        ));
    }
    if let Some(idx) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(invalid(
            "embedding",
            format!("non-finite value at index {idx}"),
        ));
    }
    Ok(())
}

/// Validate the metadata mapping: bounded key count, bounded key length,
/// bounded serialized value size. Values may be any JSON scalar or
/// structure within the size limit.
pub fn validate_metadata(metadata: &HashMap<String, serde_json::Value>) -> Result<()> {
    if metadata.len() > MAX_METADATA_KEYS {
        return Err(invalid(
            "metadata",
            format!("{} keys exceeds max {}", metadata.len(), MAX_METADATA_KEYS),
        ));
    }
    for (key, value) in metadata {
        if key.is_empty() {
            return Err(invalid("metadata", "key must not be empty"));
        }
        if key.len() > MAX_METADATA_KEY_LENGTH {
            return Err(invalid(
                "metadata",
                format!(
                    "key '{}' is {} bytes, max {}",
                    key,
                    key.len(),
                    MAX_METADATA_KEY_LENGTH
                ),
            ));
        }
        let serialized = serde_json::to_vec(value)
            .map_err(|e| invalid("metadata", format!("value for '{key}' not serializable: {e}")))?;
        if serialized.len() > MAX_METADATA_VALUE_BYTES {
            return Err(invalid(
                "metadata",
                format!(
                    "value for '{}' is {} bytes, max {}",
                    key,
                    serialized.len(),
                    MAX_METADATA_VALUE_BYTES
                ),
            ));
        }
    }
    Ok(())
}
