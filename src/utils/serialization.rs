// src/utils/serialization.rs
//! Codecs between in-memory models and their on-chain string form.
//!
//! The registry stores DID documents and resource records as JSON strings.
//! Decoding validates shape; anything the chain returns that does not parse
//! is reported as malformed rather than patched up.

use crate::error::{RegistrarError, RegistrarResult};
use crate::models::did::DidDocument;
use crate::models::resource::{LinkedResource, ResourcePayload};
use serde_json::Value;

/// Serializes a DID document into its on-chain representation.
pub fn encode_document(document: &DidDocument) -> RegistrarResult<String> {
    serde_json::to_string(document).map_err(|e| RegistrarError::MalformedDocument(e.to_string()))
}

/// Parses an on-chain or caller-supplied DID document.
///
/// # Errors
/// `MalformedDocument` if the input is not JSON or lacks `@context`, `id` or
/// `verificationMethod`.
pub fn decode_document(raw: &str) -> RegistrarResult<DidDocument> {
    serde_json::from_str(raw).map_err(|e| RegistrarError::MalformedDocument(e.to_string()))
}

pub fn encode_resource(resource: &LinkedResource) -> RegistrarResult<String> {
    serde_json::to_string(resource).map_err(|e| RegistrarError::MalformedResource(e.to_string()))
}

pub fn decode_resource(raw: &str) -> RegistrarResult<LinkedResource> {
    serde_json::from_str(raw).map_err(|e| RegistrarError::MalformedResource(e.to_string()))
}

/// Parses and validates an `addResource` payload.
///
/// Returns the payload and the canonical JSON it was parsed from, which is
/// what the checksum is computed over.
pub fn decode_resource_payload(raw: &str) -> RegistrarResult<(ResourcePayload, String)> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| RegistrarError::MalformedResource(e.to_string()))?;
    if !value.is_object() {
        return Err(RegistrarError::MalformedResource(
            "resource payload must be a JSON object".into(),
        ));
    }

    let canonical = canonical_json(&value);
    let payload: ResourcePayload =
        serde_json::from_value(value).map_err(|e| RegistrarError::MalformedResource(e.to_string()))?;

    if payload.resource_name.trim().is_empty() {
        return Err(RegistrarError::MalformedResource("resourceName is required".into()));
    }
    if payload.resource_type.trim().is_empty() {
        return Err(RegistrarError::MalformedResource("resourceType is required".into()));
    }

    Ok((payload, canonical))
}

/// JSON serialization with object keys sorted at every level.
///
/// Two payloads with the same content but different key order produce the
/// same string.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::did::DidDocument;
    use serde_json::json;

    const DID: &str = "did:polygon:testnet:0x2f65b6a8C1bE1A7fA6A0f2c3F6bE5D7E8a9B0c1D";

    #[test]
    fn test_document_round_trip_preserves_unknown_keys() {
        let mut doc = DidDocument::new(DID, "z6Mkabc", "https://example.com");
        doc.extra.insert("alsoKnownAs".into(), json!(["https://example.org/me"]));
        doc.verification_method[0]
            .extra
            .insert("publicKeyJwk".into(), json!({"kty": "EC"}));

        let encoded = encode_document(&doc).unwrap();
        assert_eq!(decode_document(&encoded).unwrap(), doc);
    }

    #[test]
    fn test_minimal_document_decodes() {
        let raw = json!({
            "@context": ["https://w3id.org/did/v1"],
            "id": DID,
            "verificationMethod": [],
        })
        .to_string();
        let doc = decode_document(&raw).unwrap();
        assert!(doc.service.is_empty());
        assert_eq!(encode_document(&doc).unwrap(), raw);
    }

    #[test]
    fn test_missing_required_key_is_malformed() {
        for raw in [
            json!({"id": DID, "verificationMethod": []}).to_string(),
            json!({"@context": [], "verificationMethod": []}).to_string(),
            json!({"@context": [], "id": DID}).to_string(),
            "not json".to_string(),
        ] {
            assert!(matches!(
                decode_document(&raw),
                Err(RegistrarError::MalformedDocument(_))
            ));
        }
    }

    #[test]
    fn test_canonical_json_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":[1,{"q":2,"p":1}],"x":"s"}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":"s","y":[1,{"p":1,"q":2}]},"b":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"x":"s","y":[1,{"p":1,"q":2}]},"b":1}"#);
    }

    #[test]
    fn test_resource_payload_validation() {
        assert!(decode_resource_payload(r#"{"resourceName":"n","resourceType":"t"}"#).is_ok());
        for raw in [
            r#"{"resourceType":"t"}"#,
            r#"{"resourceName":" ","resourceType":"t"}"#,
            r#"{"resourceName":"n"}"#,
            r#"["resourceName"]"#,
            "{",
        ] {
            assert!(matches!(
                decode_resource_payload(raw),
                Err(RegistrarError::MalformedResource(_))
            ));
        }
    }
}
