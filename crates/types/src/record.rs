use crate::{Address, Did, VdrError, VdrResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of registry object a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    DidDocument,
    Schema,
    CredentialDefinition,
    RevocationRegistryEntry,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::DidDocument,
        RecordKind::Schema,
        RecordKind::CredentialDefinition,
        RecordKind::RevocationRegistryEntry,
    ];

    pub fn tag(self) -> u8 {
        match self {
            RecordKind::DidDocument => 1,
            RecordKind::Schema => 2,
            RecordKind::CredentialDefinition => 3,
            RecordKind::RevocationRegistryEntry => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        RecordKind::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

/// Record lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Revoked,
}

impl RecordStatus {
    pub fn tag(self) -> u8 {
        match self {
            RecordStatus::Active => 0,
            RecordStatus::Revoked => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(RecordStatus::Active),
            1 => Some(RecordStatus::Revoked),
            _ => None,
        }
    }
}

/// Opaque record body plus string metadata. Metadata is kept sorted so the
/// encoded form is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordContent {
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RecordContent {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// JSON document content, the common case for registry objects.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(value.to_string().into_bytes())
            .with_metadata("content-type", "application/json")
    }
}

/// Versioned registry document identified by a DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Did,
    pub kind: RecordKind,
    pub version: u64,
    pub owner: Address,
    pub content: RecordContent,
    pub status: RecordStatus,
}

impl Record {
    /// First version of a record, as proposed by a `register` operation.
    pub fn new(id: Did, kind: RecordKind, owner: Address, content: RecordContent) -> Self {
        Self {
            id,
            kind,
            version: 1,
            owner,
            content,
            status: RecordStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// Next version carrying new content.
    pub fn updated(&self, content: RecordContent) -> VdrResult<Self> {
        Ok(Self {
            version: self.next_version()?,
            content,
            ..self.clone()
        })
    }

    /// Next version with the content unchanged and the status revoked.
    pub fn revoked(&self) -> VdrResult<Self> {
        Ok(Self {
            version: self.next_version()?,
            status: RecordStatus::Revoked,
            ..self.clone()
        })
    }

    fn next_version(&self) -> VdrResult<u64> {
        self.version.checked_add(1).ok_or_else(|| {
            VdrError::InvalidOperation(format!("{} has no version after {}", self.id, self.version))
        })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new(
            Did::parse("did:example:123").unwrap(),
            RecordKind::Schema,
            Address([1u8; 20]),
            RecordContent::json(&serde_json::json!({"name": "schema-v1"})),
        )
    }

    #[test]
    fn new_record_starts_active_at_version_one() {
        let record = sample();
        assert_eq!(record.version, 1);
        assert!(record.is_active());
    }

    #[test]
    fn update_and_revoke_bump_version() {
        let record = sample();
        let updated = record.updated(RecordContent::new(b"v2".to_vec())).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.owner, record.owner);

        let revoked = updated.revoked().unwrap();
        assert_eq!(revoked.version, 3);
        assert_eq!(revoked.status, RecordStatus::Revoked);
        assert_eq!(revoked.content, updated.content);
    }

    #[test]
    fn last_version_cannot_advance() {
        let record = Record {
            version: u64::MAX,
            ..sample()
        };
        assert!(matches!(
            record.updated(RecordContent::new(b"v-next".to_vec())),
            Err(VdrError::InvalidOperation(_))
        ));
        assert!(matches!(record.revoked(), Err(VdrError::InvalidOperation(_))));

        let almost = Record {
            version: u64::MAX - 1,
            ..sample()
        };
        assert_eq!(almost.revoked().unwrap().version, u64::MAX);
    }

    #[test]
    fn tags_are_distinct_and_reversible() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(RecordKind::from_tag(0), None);
        assert_eq!(RecordStatus::from_tag(2), None);
    }
}
