// src/services/versioning.rs
//! Linked resource versioning.
//!
//! Resources with the same collection and name form a lineage. Each new
//! version points back at the previous head, and the previous head is then
//! patched to point forward. The two writes are separate transactions, so a
//! lineage read from the chain can be in one of three states:
//!
//! - consistent: a single chain from origin to head
//! - pending repair: a newer version exists but an older head was never
//!   patched forward (an interrupted write)
//! - inconsistent: forks, dangling pointers or cycles that need a human or a
//!   reconciliation policy

use crate::models::resource::{LinkedResource, ResourcePayload};
use crate::utils::crypto::sha256_hex;
use crate::wallet::key_management::PolygonDid;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Namespace for deterministic resource ids.
const RESOURCE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c_9a4e_2b7d_4c1a_9e3f_6d8b_1a2c_3e4f);

/// Builds the record for a new head version.
///
/// # Arguments
/// * `did` - Owning DID
/// * `payload` - Validated caller payload
/// * `canonical_payload` - Canonical JSON of the payload, hashed into `checksum`
/// * `head` - Current head of the lineage, if any
/// * `now` - Creation time
pub fn prepare_resource(
    did: &PolygonDid,
    payload: &ResourcePayload,
    canonical_payload: &str,
    head: Option<&LinkedResource>,
    now: DateTime<Utc>,
) -> LinkedResource {
    let collection_id = did.address_string();
    let checksum = sha256_hex(canonical_payload.as_bytes());
    let previous_version_id = head.map(|h| h.resource_id.clone());
    let resource_id = resource_id(
        &collection_id,
        &payload.resource_name,
        previous_version_id.as_deref(),
        &checksum,
    );

    LinkedResource {
        resource_uri: format!("{}/resources/{}", did, resource_id),
        resource_collection_id: collection_id,
        resource_id,
        resource_name: payload.resource_name.clone(),
        resource_type: payload.resource_type.clone(),
        media_type: payload.media_type().to_string(),
        created: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        checksum,
        previous_version_id,
        next_version_id: None,
    }
}

/// Copy of `existing_head` pointing forward to `new_head`.
pub fn link_as_head(existing_head: &LinkedResource, new_head: &LinkedResource) -> LinkedResource {
    LinkedResource {
        next_version_id: Some(new_head.resource_id.clone()),
        ..existing_head.clone()
    }
}

/// Deterministic id of a version.
///
/// The same content written on top of the same predecessor always gets the
/// same id, so a retried write collides with its earlier attempt instead of
/// creating a sibling.
pub fn resource_id(collection_id: &str, resource_name: &str, previous: Option<&str>, checksum: &str) -> String {
    let key = format!(
        "{}/{}/{}/{}",
        collection_id.to_lowercase(),
        resource_name,
        previous.unwrap_or(""),
        checksum
    );
    Uuid::new_v5(&RESOURCE_ID_NAMESPACE, key.as_bytes()).to_string()
}

/// A forward pointer that still has to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelink {
    /// Older version whose `nextVersionId` is still null
    pub stale: LinkedResource,
    /// Version that already names `stale` as its predecessor
    pub successor_id: String,
}

impl PendingRelink {
    pub fn patched(&self) -> LinkedResource {
        LinkedResource {
            next_version_id: Some(self.successor_id.clone()),
            ..self.stale.clone()
        }
    }
}

/// Why a lineage cannot be walked from origin to head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageFault {
    /// Several versions share one predecessor (concurrent writers)
    Forked { previous_id: String, successors: Vec<String> },
    /// `nextVersionId` names a resource outside the lineage
    DanglingNext { resource_id: String, next_id: String },
    /// `previousVersionId` names a resource outside the lineage
    DanglingPrevious { resource_id: String, previous_id: String },
    /// A stored forward pointer disagrees with the backward chain
    MislinkedNext { resource_id: String, next_id: String, expected: String },
    /// No single origin, or versions unreachable from it
    Broken(String),
}

impl fmt::Display for LineageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineageFault::Forked { previous_id, successors } => write!(
                f,
                "versions {} all follow {}; concurrent writers need reconciliation",
                successors.join(", "),
                previous_id
            ),
            LineageFault::DanglingNext { resource_id, next_id } => {
                write!(f, "{} points forward to unknown version {}", resource_id, next_id)
            }
            LineageFault::DanglingPrevious { resource_id, previous_id } => {
                write!(f, "{} points back to unknown version {}", resource_id, previous_id)
            }
            LineageFault::MislinkedNext { resource_id, next_id, expected } => write!(
                f,
                "{} points forward to {} but {} follows it",
                resource_id, next_id, expected
            ),
            LineageFault::Broken(reason) => f.write_str(reason),
        }
    }
}

/// One resource lineage as read from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub collection_id: String,
    pub resource_name: String,
    /// Versions ordered origin to head
    pub versions: Vec<LinkedResource>,
    /// Forward pointers an interrupted write left unset
    pub pending_relinks: Vec<PendingRelink>,
}

impl Lineage {
    /// Extracts and validates the lineage `(collection_id, resource_name)`.
    ///
    /// The backward chain (`previousVersionId`) is authoritative because it is
    /// written together with each version; forward pointers are checked
    /// against it.
    pub fn inspect(
        resources: &[LinkedResource],
        collection_id: &str,
        resource_name: &str,
    ) -> Result<Self, LineageFault> {
        let members: Vec<&LinkedResource> = resources
            .iter()
            .filter(|r| {
                r.resource_collection_id.eq_ignore_ascii_case(collection_id)
                    && r.resource_name == resource_name
            })
            .collect();

        let mut lineage = Lineage {
            collection_id: collection_id.to_string(),
            resource_name: resource_name.to_string(),
            versions: Vec::with_capacity(members.len()),
            pending_relinks: Vec::new(),
        };
        if members.is_empty() {
            return Ok(lineage);
        }

        let ids: HashSet<&str> = members.iter().map(|r| r.resource_id.as_str()).collect();
        let mut successors: HashMap<&str, Vec<&LinkedResource>> = HashMap::new();
        let mut origins = Vec::new();

        for member in &members {
            if let Some(next) = member.next_version_id.as_deref() {
                if !ids.contains(next) {
                    return Err(LineageFault::DanglingNext {
                        resource_id: member.resource_id.clone(),
                        next_id: next.to_string(),
                    });
                }
            }
            match member.previous_version_id.as_deref() {
                None => origins.push(*member),
                Some(previous) if ids.contains(previous) => {
                    successors.entry(previous).or_default().push(*member)
                }
                Some(previous) => {
                    return Err(LineageFault::DanglingPrevious {
                        resource_id: member.resource_id.clone(),
                        previous_id: previous.to_string(),
                    })
                }
            }
        }

        if let Some((previous, forked)) = successors.iter().find(|(_, s)| s.len() > 1) {
            return Err(LineageFault::Forked {
                previous_id: previous.to_string(),
                successors: forked.iter().map(|r| r.resource_id.clone()).collect(),
            });
        }
        let origin = match origins.as_slice() {
            [origin] => *origin,
            [] => return Err(LineageFault::Broken("lineage has no origin version".into())),
            _ => return Err(LineageFault::Broken(format!("lineage has {} origin versions", origins.len()))),
        };

        let mut current = origin;
        loop {
            lineage.versions.push(current.clone());
            let next = match successors.get(current.resource_id.as_str()) {
                Some(next) => next[0],
                None => break,
            };
            match current.next_version_id.as_deref() {
                Some(id) if id == next.resource_id => {}
                Some(id) => {
                    return Err(LineageFault::MislinkedNext {
                        resource_id: current.resource_id.clone(),
                        next_id: id.to_string(),
                        expected: next.resource_id.clone(),
                    })
                }
                None => lineage.pending_relinks.push(PendingRelink {
                    stale: current.clone(),
                    successor_id: next.resource_id.clone(),
                }),
            }
            if lineage.versions.len() > members.len() {
                return Err(LineageFault::Broken("version chain loops".into()));
            }
            current = next;
        }

        if lineage.versions.len() != members.len() {
            return Err(LineageFault::Broken(format!(
                "{} of {} versions unreachable from the origin",
                members.len() - lineage.versions.len(),
                members.len()
            )));
        }
        if let Some(next) = current.next_version_id.as_deref() {
            return Err(LineageFault::MislinkedNext {
                resource_id: current.resource_id.clone(),
                next_id: next.to_string(),
                expected: "nothing".into(),
            });
        }

        Ok(lineage)
    }

    /// Latest version (the one no other version follows).
    pub fn head(&self) -> Option<&LinkedResource> {
        self.versions.last()
    }

    pub fn origin(&self) -> Option<&LinkedResource> {
        self.versions.first()
    }

    pub fn is_consistent(&self) -> bool {
        self.pending_relinks.is_empty()
    }
}

/// Orders resources lineage by lineage, each from origin to head.
///
/// Lineages appear in the order their first record appears in `resources`.
/// Records of a lineage that cannot be walked keep their stored order.
pub fn order_by_lineage(resources: Vec<LinkedResource>) -> Vec<LinkedResource> {
    let mut keys: Vec<(String, String)> = Vec::new();
    for resource in &resources {
        let key = (
            resource.resource_collection_id.to_lowercase(),
            resource.resource_name.clone(),
        );
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let mut ordered = Vec::with_capacity(resources.len());
    for (collection_id, resource_name) in keys {
        match Lineage::inspect(&resources, &collection_id, &resource_name) {
            Ok(lineage) => ordered.extend(lineage.versions),
            Err(_) => ordered.extend(
                resources
                    .iter()
                    .filter(|r| {
                        r.resource_collection_id.eq_ignore_ascii_case(&collection_id)
                            && r.resource_name == resource_name
                    })
                    .cloned(),
            ),
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::serialization::decode_resource_payload;
    use chrono::TimeZone;

    const DID: &str = "did:polygon:testnet:0x2f65b6a8C1bE1A7fA6A0f2c3F6bE5D7E8a9B0c1D";

    fn did() -> PolygonDid {
        PolygonDid::parse(DID).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn version(name: &str, body: &str, head: Option<&LinkedResource>) -> LinkedResource {
        let raw = format!(r#"{{"resourceName":"{name}","resourceType":"W3C-schema","body":"{body}"}}"#);
        let (payload, canonical) = decode_resource_payload(&raw).unwrap();
        prepare_resource(&did(), &payload, &canonical, head, now())
    }

    /// Builds a fully linked lineage of `n` versions.
    fn chain(name: &str, n: usize) -> Vec<LinkedResource> {
        let mut versions: Vec<LinkedResource> = Vec::new();
        for i in 0..n {
            let next = version(name, &i.to_string(), versions.last());
            if let Some(last) = versions.last_mut() {
                *last = link_as_head(last, &next);
            }
            versions.push(next);
        }
        versions
    }

    #[test]
    fn test_prepare_first_version() {
        let resource = version("PassportSchema", "a", None);
        assert_eq!(resource.previous_version_id, None);
        assert_eq!(resource.next_version_id, None);
        assert_eq!(resource.resource_collection_id, did().address_string());
        assert_eq!(resource.resource_uri, format!("{DID}/resources/{}", resource.resource_id));
        assert_eq!(resource.created, "2024-05-01T12:00:00.000Z");
        assert_eq!(resource.checksum.len(), 64);
    }

    #[test]
    fn test_checksum_depends_only_on_content() {
        let (a, ca) = decode_resource_payload(r#"{"resourceName":"n","resourceType":"t","x":{"b":1,"a":2}}"#).unwrap();
        let (b, cb) = decode_resource_payload(r#"{"x":{"a":2,"b":1},"resourceType":"t","resourceName":"n"}"#).unwrap();
        let first = prepare_resource(&did(), &a, &ca, None, now());
        let second = prepare_resource(&did(), &b, &cb, None, Utc::now());
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(first.resource_id, second.resource_id);

        let other = version("n", "different", None);
        assert_ne!(first.checksum, other.checksum);
    }

    #[test]
    fn test_same_content_on_new_head_gets_new_id() {
        let first = version("n", "same", None);
        let second = version("n", "same", Some(&first));
        assert_eq!(first.checksum, second.checksum);
        assert_ne!(first.resource_id, second.resource_id);
        assert_eq!(second.previous_version_id.as_deref(), Some(first.resource_id.as_str()));
    }

    #[test]
    fn test_chain_invariant_holds_for_n_versions() {
        for n in 1..=5 {
            let versions = chain("n", n);
            let heads = versions.iter().filter(|r| r.next_version_id.is_none()).count();
            let origins = versions.iter().filter(|r| r.previous_version_id.is_none()).count();
            assert_eq!((heads, origins), (1, 1), "n = {n}");

            let lineage = Lineage::inspect(&versions, &did().address_string(), "n").unwrap();
            assert!(lineage.is_consistent());
            assert_eq!(lineage.versions, versions);
        }
    }

    #[test]
    fn test_inspect_ignores_other_lineages() {
        let mut resources = chain("a", 2);
        resources.extend(chain("b", 3));
        let lineage = Lineage::inspect(&resources, &did().address_string(), "b").unwrap();
        assert_eq!(lineage.versions.len(), 3);
        assert!(Lineage::inspect(&resources, &did().address_string(), "c")
            .unwrap()
            .head()
            .is_none());
    }

    #[test]
    fn test_interrupted_relink_is_pending_repair() {
        let mut versions = chain("n", 2);
        let third = version("n", "2", versions.last());
        versions.push(third.clone());

        let lineage = Lineage::inspect(&versions, &did().address_string(), "n").unwrap();
        assert!(!lineage.is_consistent());
        assert_eq!(lineage.head(), Some(&third));
        assert_eq!(lineage.pending_relinks.len(), 1);

        let relink = &lineage.pending_relinks[0];
        assert_eq!(relink.stale.resource_id, versions[1].resource_id);
        assert_eq!(relink.patched().next_version_id, Some(third.resource_id.clone()));
    }

    #[test]
    fn test_fork_detected() {
        let origin = version("n", "0", None);
        let left = version("n", "left", Some(&origin));
        let right = version("n", "right", Some(&origin));
        let resources = vec![link_as_head(&origin, &left), left, right];

        let fault = Lineage::inspect(&resources, &did().address_string(), "n").unwrap_err();
        assert!(matches!(fault, LineageFault::Forked { ref successors, .. } if successors.len() == 2));
        assert!(fault.to_string().contains("reconciliation"));
    }

    #[test]
    fn test_dangling_next_detected() {
        let mut versions = chain("n", 1);
        versions[0].next_version_id = Some("missing".into());
        assert!(matches!(
            Lineage::inspect(&versions, &did().address_string(), "n"),
            Err(LineageFault::DanglingNext { .. })
        ));
    }

    #[test]
    fn test_mislinked_next_detected() {
        let mut versions = chain("n", 3);
        versions[0].next_version_id = Some(versions[2].resource_id.clone());
        assert!(matches!(
            Lineage::inspect(&versions, &did().address_string(), "n"),
            Err(LineageFault::MislinkedNext { .. })
        ));
    }

    #[test]
    fn test_order_by_lineage_groups_and_sorts() {
        let a = chain("a", 3);
        let b = chain("b", 2);
        let shuffled = vec![a[2].clone(), b[1].clone(), a[0].clone(), b[0].clone(), a[1].clone()];

        let ordered = order_by_lineage(shuffled);
        let expected: Vec<LinkedResource> = a.iter().chain(b.iter()).cloned().collect();
        assert_eq!(ordered, expected);
    }
}
