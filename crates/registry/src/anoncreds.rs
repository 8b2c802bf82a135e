use crate::Registry;
use tracing::debug;
use vdr_crypto::KeyHandle;
use vdr_types::anoncreds::{CredentialDefinition, RegistryObject, RevocationRegistryEntry, Schema};
use vdr_types::{Did, Record, VdrError, VdrResult};

impl Registry {
    pub async fn register_schema(
        &self,
        did: &Did,
        schema: &Schema,
        signer: &KeyHandle,
    ) -> VdrResult<Record> {
        self.register(did, Schema::KIND, schema.to_content()?, signer)
            .await
    }

    pub async fn register_credential_definition(
        &self,
        did: &Did,
        cred_def: &CredentialDefinition,
        signer: &KeyHandle,
    ) -> VdrResult<Record> {
        self.register(did, CredentialDefinition::KIND, cred_def.to_content()?, signer)
            .await
    }

    /// Publish the next revocation registry entry under `did`.
    ///
    /// The first entry registers the record; later entries must chain onto
    /// the accumulator currently on the ledger and update it.
    pub async fn publish_revocation_entry(
        &self,
        did: &Did,
        entry: &RevocationRegistryEntry,
        signer: &KeyHandle,
    ) -> VdrResult<Record> {
        match self.lookup(did).await? {
            None => {
                entry.check_chain(None)?;
                self.register(did, RevocationRegistryEntry::KIND, entry.to_content()?, signer)
                    .await
            }
            Some(current) => {
                if current.kind != RevocationRegistryEntry::KIND {
                    return Err(VdrError::InvalidOperation(format!(
                        "{did} holds a {:?} record",
                        current.kind
                    )));
                }
                let on_ledger = RevocationRegistryEntry::from_content(&current.content)?;
                entry.check_chain(Some(&on_ledger))?;
                debug!(%did, version = current.version, "appending revocation entry");
                self.update(did, entry.to_content()?, signer).await
            }
        }
    }

    /// Resolve a record and parse its content as `T`.
    pub async fn resolve_object<T: RegistryObject>(&self, did: &Did) -> VdrResult<T> {
        let record = self.resolve(did).await?;
        if record.kind != T::KIND {
            return Err(VdrError::InvalidOperation(format!(
                "{did} holds a {:?} record, expected {:?}",
                record.kind,
                T::KIND
            )));
        }
        T::from_content(&record.content)
    }
}
