//! AnonCreds registry objects stored as record content.
//!
//! Each object serializes to camelCase JSON and travels as the `data` of a
//! [`RecordContent`]. Validation failures are reported as
//! [`VdrError::InvalidOperation`]; content that does not parse is a
//! [`VdrError::MalformedRecord`].

use crate::{RecordContent, RecordKind, VdrError, VdrResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const MAX_ATTRIBUTES: usize = 125;

/// Shared JSON handling for registry objects.
pub trait RegistryObject: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    fn validate(&self) -> VdrResult<()>;

    fn to_json_string(&self) -> VdrResult<String> {
        serde_json::to_string(self)
            .map_err(|err| VdrError::InvalidOperation(format!("unable to serialize object: {err}")))
    }

    fn from_json_str(value: &str) -> VdrResult<Self> {
        serde_json::from_str(value)
            .map_err(|err| VdrError::MalformedRecord(format!("unable to parse object: {err}")))
    }

    fn to_content(&self) -> VdrResult<RecordContent> {
        self.validate()?;
        let value = serde_json::to_value(self)
            .map_err(|err| VdrError::InvalidOperation(format!("unable to serialize object: {err}")))?;
        Ok(RecordContent::json(&value))
    }

    fn from_content(content: &RecordContent) -> VdrResult<Self> {
        serde_json::from_slice(&content.data)
            .map_err(|err| VdrError::MalformedRecord(format!("unable to parse object: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub issuer_id: String,
    pub name: String,
    pub version: String,
    pub attr_names: Vec<String>,
}

impl RegistryObject for Schema {
    const KIND: RecordKind = RecordKind::Schema;

    fn validate(&self) -> VdrResult<()> {
        if self.issuer_id.is_empty() {
            return Err(VdrError::InvalidOperation("schema issuer is empty".into()));
        }
        if self.name.is_empty() || self.version.is_empty() {
            return Err(VdrError::InvalidOperation(
                "schema name and version must be non-empty".into(),
            ));
        }
        if self.attr_names.is_empty() || self.attr_names.len() > MAX_ATTRIBUTES {
            return Err(VdrError::InvalidOperation(format!(
                "schema must declare 1..={MAX_ATTRIBUTES} attributes, got {}",
                self.attr_names.len()
            )));
        }
        let mut seen = HashSet::new();
        for attr in &self.attr_names {
            if attr.is_empty() || !seen.insert(attr.as_str()) {
                return Err(VdrError::InvalidOperation(format!(
                    "schema attribute `{attr}` is empty or duplicated"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDefinition {
    pub issuer_id: String,
    pub schema_id: String,
    pub cred_def_type: String,
    pub tag: String,
    pub value: serde_json::Value,
}

impl RegistryObject for CredentialDefinition {
    const KIND: RecordKind = RecordKind::CredentialDefinition;

    fn validate(&self) -> VdrResult<()> {
        if self.cred_def_type != "CL" {
            return Err(VdrError::InvalidOperation(format!(
                "unsupported credential definition type `{}`",
                self.cred_def_type
            )));
        }
        if self.issuer_id.is_empty() || self.schema_id.is_empty() || self.tag.is_empty() {
            return Err(VdrError::InvalidOperation(
                "credential definition requires issuer, schema id and tag".into(),
            ));
        }
        if !self.value.is_object() {
            return Err(VdrError::InvalidOperation(
                "credential definition value must be a JSON object".into(),
            ));
        }
        Ok(())
    }
}

/// Revocation accumulator value.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulator(String);

impl Accumulator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(&self) -> VdrResult<()> {
        if self.0.is_empty() {
            return Err(VdrError::InvalidOperation("accumulator is empty".into()));
        }
        Ok(())
    }
}

impl From<&str> for Accumulator {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationRegistryEntryData {
    pub current_accumulator: Accumulator,
    #[serde(default)]
    pub prev_accumulator: Option<Accumulator>,
    #[serde(default)]
    pub issued: Option<Vec<u32>>,
    #[serde(default)]
    pub revoked: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationRegistryEntry {
    pub rev_reg_def_id: String,
    pub issuer_id: String,
    pub rev_reg_entry_data: RevocationRegistryEntryData,
}

impl RevocationRegistryEntry {
    pub fn new(
        rev_reg_def_id: impl Into<String>,
        issuer_id: impl Into<String>,
        current_accumulator: Accumulator,
        prev_accumulator: Option<Accumulator>,
    ) -> Self {
        Self {
            rev_reg_def_id: rev_reg_def_id.into(),
            issuer_id: issuer_id.into(),
            rev_reg_entry_data: RevocationRegistryEntryData {
                current_accumulator,
                prev_accumulator,
                issued: None,
                revoked: None,
            },
        }
    }

    pub fn with_revoked(mut self, indices: Vec<u32>) -> Self {
        self.rev_reg_entry_data.revoked = Some(indices);
        self
    }

    pub fn with_issued(mut self, indices: Vec<u32>) -> Self {
        self.rev_reg_entry_data.issued = Some(indices);
        self
    }

    /// Check that this entry chains onto the entry currently on the ledger:
    /// its previous accumulator must equal the ledger's current one, and
    /// both must be absent for the first entry.
    pub fn check_chain(&self, on_ledger: Option<&RevocationRegistryEntry>) -> VdrResult<()> {
        self.validate()?;

        if let Some(current) = on_ledger {
            if current.issuer_id != self.issuer_id {
                return Err(VdrError::InvalidOperation(format!(
                    "issuer mismatch: entry issuer {} != ledger issuer {}",
                    self.issuer_id, current.issuer_id
                )));
            }
            if current.rev_reg_def_id != self.rev_reg_def_id {
                return Err(VdrError::InvalidOperation(format!(
                    "revocation registry mismatch: {} != {}",
                    self.rev_reg_def_id, current.rev_reg_def_id
                )));
            }
        }

        let ledger_accumulator =
            on_ledger.map(|entry| &entry.rev_reg_entry_data.current_accumulator);
        match (&self.rev_reg_entry_data.prev_accumulator, ledger_accumulator) {
            (Some(local), Some(ledger)) if local != ledger => {
                Err(VdrError::InvalidOperation(format!(
                    "prev_accum mismatch: expected {}, found {}",
                    ledger.as_str(),
                    local.as_str()
                )))
            }
            (None, Some(_)) => Err(VdrError::InvalidOperation(
                "prev_accum not provided, but an entry exists on the ledger".into(),
            )),
            (Some(_), None) => Err(VdrError::InvalidOperation(
                "prev_accum provided, but no entry exists on the ledger".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl RegistryObject for RevocationRegistryEntry {
    const KIND: RecordKind = RecordKind::RevocationRegistryEntry;

    fn validate(&self) -> VdrResult<()> {
        if self.rev_reg_def_id.is_empty() || self.issuer_id.is_empty() {
            return Err(VdrError::InvalidOperation(
                "revocation entry requires registry id and issuer".into(),
            ));
        }
        self.rev_reg_entry_data.current_accumulator.validate()?;
        if let Some(prev) = &self.rev_reg_entry_data.prev_accumulator {
            prev.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "did:example:issuer";
    const REG: &str = "did:example:issuer/anoncreds/v0/REV_REG_DEF/1/tag";

    fn entry(current: &str, prev: Option<&str>) -> RevocationRegistryEntry {
        RevocationRegistryEntry::new(REG, ISSUER, Accumulator::from(current), prev.map(Accumulator::from))
    }

    #[test]
    fn empty_accumulator_is_rejected() {
        let err = entry("", None).validate().unwrap_err();
        assert!(err.to_string().contains("accumulator is empty"));
    }

    #[test]
    fn first_entry_has_no_previous_accumulator() {
        assert!(entry("acc1", None).check_chain(None).is_ok());
        let err = entry("acc1", Some("acc0")).check_chain(None).unwrap_err();
        assert!(err.to_string().contains("no entry exists on the ledger"));
    }

    #[test]
    fn chained_entry_must_match_ledger_accumulator() {
        let on_ledger = entry("acc1", None);
        assert!(entry("acc2", Some("acc1")).check_chain(Some(&on_ledger)).is_ok());

        let err = entry("acc2", Some("other")).check_chain(Some(&on_ledger)).unwrap_err();
        assert!(err.to_string().contains("prev_accum mismatch"));

        let err = entry("acc2", None).check_chain(Some(&on_ledger)).unwrap_err();
        assert!(err.to_string().contains("not provided"));
    }

    #[test]
    fn issuer_change_is_rejected() {
        let on_ledger = entry("acc1", None);
        let mut next = entry("acc2", Some("acc1"));
        next.issuer_id = "did:example:other".into();
        let err = next.check_chain(Some(&on_ledger)).unwrap_err();
        assert!(err.to_string().contains("issuer mismatch"));
    }

    #[test]
    fn entry_json_uses_camel_case() {
        let json = entry("acc2", Some("acc1")).with_revoked(vec![3]).to_json_string().unwrap();
        assert!(json.contains("\"revRegDefId\""));
        assert!(json.contains("\"currentAccumulator\":\"acc2\""));
        assert!(json.contains("\"prevAccumulator\":\"acc1\""));

        let back = RevocationRegistryEntry::from_json_str(&json).unwrap();
        assert_eq!(back.rev_reg_entry_data.revoked, Some(vec![3]));
    }

    #[test]
    fn schema_validation() {
        let mut schema = Schema {
            issuer_id: ISSUER.into(),
            name: "degree".into(),
            version: "1.0".into(),
            attr_names: vec!["name".into(), "age".into()],
        };
        assert!(schema.validate().is_ok());

        schema.attr_names.push("age".into());
        assert!(matches!(schema.validate(), Err(VdrError::InvalidOperation(_))));

        schema.attr_names.clear();
        assert!(schema.to_content().is_err());
    }

    #[test]
    fn credential_definition_requires_cl_type() {
        let mut cred_def = CredentialDefinition {
            issuer_id: ISSUER.into(),
            schema_id: "did:example:schema".into(),
            cred_def_type: "CL".into(),
            tag: "default".into(),
            value: serde_json::json!({"primary": {}}),
        };
        let content = cred_def.to_content().unwrap();
        assert_eq!(CredentialDefinition::from_content(&content).unwrap(), cred_def);

        cred_def.cred_def_type = "BBS".into();
        assert!(cred_def.validate().is_err());
    }

    #[test]
    fn garbage_content_is_malformed() {
        let content = RecordContent::new(b"not json".to_vec());
        assert!(matches!(
            Schema::from_content(&content),
            Err(VdrError::MalformedRecord(_))
        ));
    }
}
