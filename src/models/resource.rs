// src/models/resource.rs
//! Linked resource data model.
//!
//! A linked resource is a versioned JSON payload attached to a DID. Versions
//! of the same resource (same collection and name) form a chain through
//! `previousVersionId` / `nextVersionId`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Resolution view of one resource version.
///
/// Field order is the wire order of resolution responses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkedResource {
    /// `<did>/resources/<resourceId>`
    #[serde(rename = "resourceURI")]
    pub resource_uri: String,

    /// Collection the lineage lives in (the DID address)
    pub resource_collection_id: String,

    pub resource_id: String,

    pub resource_name: String,

    pub resource_type: String,

    pub media_type: String,

    /// RFC 3339 creation timestamp
    pub created: String,

    /// Hex SHA-256 of the canonical payload
    pub checksum: String,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub previous_version_id: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub next_version_id: Option<String>,
}

/// Response shape of `getResourcesByDid`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkedResourceList {
    #[serde(rename = "linkedResource")]
    pub linked_resource: Vec<LinkedResource>,
}

/// Caller-supplied resource payload for `addResource`.
///
/// Only `resourceName` and `resourceType` are interpreted. Every other key is
/// content; identifiers, timestamps and version pointers are always assigned
/// by the registrar.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePayload {
    #[serde(default)]
    pub resource_name: String,

    #[serde(default)]
    pub resource_type: String,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub media_type: Option<String>,

    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl ResourcePayload {
    pub fn media_type(&self) -> &str {
        self.media_type.as_deref().unwrap_or(DEFAULT_MEDIA_TYPE)
    }
}

/// Older records store missing links as `""` rather than `null`.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LinkedResource {
        LinkedResource {
            resource_uri: "did:polygon:0xabc/resources/1".into(),
            resource_collection_id: "0xabc".into(),
            resource_id: "1".into(),
            resource_name: "PassportSchema".into(),
            resource_type: "W3C-schema".into(),
            media_type: DEFAULT_MEDIA_TYPE.into(),
            created: "2024-01-01T00:00:00Z".into(),
            checksum: "00".into(),
            previous_version_id: None,
            next_version_id: None,
        }
    }

    #[test]
    fn test_wire_key_order() {
        let value = serde_json::to_string(&sample()).unwrap();
        let keys = [
            "resourceURI",
            "resourceCollectionId",
            "resourceId",
            "resourceName",
            "resourceType",
            "mediaType",
            "created",
            "checksum",
            "previousVersionId",
            "nextVersionId",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| value.find(&format!("\"{k}\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(value.contains("\"nextVersionId\":null"));
    }

    #[test]
    fn test_empty_links_read_as_none() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value["previousVersionId"] = Value::String(String::new());
        value["nextVersionId"] = Value::String("2".into());
        let parsed: LinkedResource = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.previous_version_id, None);
        assert_eq!(parsed.next_version_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_payload_defaults_media_type() {
        let payload: ResourcePayload = serde_json::from_str(
            r#"{"resourceName":"PassportSchema","resourceType":"W3C-schema","schema":{"a":1}}"#,
        )
        .unwrap();
        assert_eq!(payload.media_type(), DEFAULT_MEDIA_TYPE);
        assert!(payload.content.contains_key("schema"));
    }
}
