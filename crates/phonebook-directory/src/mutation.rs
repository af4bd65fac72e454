//! Single-record add, edit and delete for interactive requests.

use tracing::{info, instrument};

use crate::error::{DirectoryError, DirectoryResult};
use crate::reconcile::{new_entry_attributes, user_dn};
use crate::record::{derive_login, ImportRecord, RecordEdit};
use crate::session::Directory;

#[derive(Debug, Clone)]
pub struct MutationOperations {
    directory: Directory,
}

impl MutationOperations {
    pub fn new(directory: Directory) -> Self {
        Self { directory }
    }

    /// Create one person entry. Returns its DN.
    #[instrument(skip(self, record), fields(key = %record.key()))]
    pub async fn add_one(&self, record: &ImportRecord) -> DirectoryResult<String> {
        let common_name = record.require_common_name()?;
        let config = self.directory.config();
        let dn = user_dn(config, common_name);

        let mut attributes = new_entry_attributes(config, common_name, &record.present_fields());
        let login = derive_login(common_name);
        if !login.is_empty() {
            attributes.insert(4, ("uid".to_string(), vec![login]));
        }

        let mut session = self.directory.open().await?;
        let outcome = session.add(&dn, &attributes).await;
        session.release().await;
        outcome?;

        info!(dn = %dn, "Person added");
        Ok(dn)
    }

    /// Apply the supplied fields of `edit` to an existing entry.
    #[instrument(skip(self, edit), fields(dn = %edit.distinguished_name))]
    pub async fn edit_one(&self, edit: &RecordEdit) -> DirectoryResult<()> {
        let dn = required_dn(&edit.distinguished_name)?;
        let changes = edit.changes()?;
        if changes.is_empty() {
            return Err(DirectoryError::parse("no fields to change"));
        }

        let mut session = self.directory.open().await?;
        let outcome = session.modify(dn, &changes).await;
        session.release().await;
        outcome?;

        info!(dn = %dn, "Person updated");
        Ok(())
    }

    /// Delete one entry by DN.
    #[instrument(skip(self))]
    pub async fn delete_one(&self, dn: &str) -> DirectoryResult<()> {
        let dn = required_dn(dn)?;
        let mut session = self.directory.open().await?;
        let outcome = session.delete(dn).await;
        session.release().await;
        outcome?;

        info!(dn = %dn, "Person deleted");
        Ok(())
    }
}

fn required_dn(dn: &str) -> DirectoryResult<&str> {
    let dn = dn.trim();
    if dn.is_empty() {
        return Err(DirectoryError::parse("distinguished name is required"));
    }
    Ok(dn)
}
