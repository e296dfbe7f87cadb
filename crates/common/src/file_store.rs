//! # JSON File Store
//!
//! [`JsonFileStore`] keeps the whole ledger in memory and mirrors every
//! commit to a single JSON file.
//!
//! ## Write Protocol
//!
//! 1. Apply the unit of work to the in-memory state (validation included).
//! 2. Serialize the full ledger and write it to `{path}.tmp`.
//! 3. `flush()` + `sync_all()`, then rename over `{path}`.
//!
//! If step 2 or 3 fails the in-memory state is reverted, so a failed commit
//! leaves both memory and disk at the previous version.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::ledger::{Claim, ClaimId, User, UserId};
use crate::memory_store::{LedgerSnapshot, LedgerState};
use crate::store::{LedgerStore, StoreError, UnitOfWork, UserFilter};

/// File-backed [`LedgerStore`].
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<LedgerState>,
}

impl JsonFileStore {
    /// Open the ledger at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let raw = fs::read(&path).map_err(|e| StoreError::Io(e.to_string()))?;
            let snapshot: LedgerSnapshot = serde_json::from_slice(&raw)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            info!(
                path = %path.display(),
                users = snapshot.users.len(),
                claims = snapshot.claims.len(),
                "ledger loaded"
            );
            LedgerState::from_snapshot(snapshot)
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
            info!(path = %path.display(), "starting empty ledger");
            LedgerState::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &LedgerState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&state.to_snapshot())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io = |e: std::io::Error| StoreError::Io(e.to_string());
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(io)?;
        file.write_all(&bytes).map_err(io)?;
        file.flush().map_err(io)?;
        file.sync_all().map_err(io)?;
        fs::rename(&tmp, &self.path).map_err(io)?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "ledger persisted");
        Ok(())
    }
}

impl LedgerStore for JsonFileStore {
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().user(id))
    }

    fn find_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        Ok(self.state.read().find_users(filter))
    }

    fn claim(&self, id: ClaimId) -> Result<Option<Claim>, StoreError> {
        Ok(self.state.read().claim(id))
    }

    fn claims_for_user(&self, user: UserId) -> Result<Vec<Claim>, StoreError> {
        Ok(self.state.read().claims_for_user(user))
    }

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError> {
        if work.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();
        let undo = state.apply(work)?;
        if let Err(e) = self.persist(&state) {
            state.revert(undo);
            return Err(e);
        }
        Ok(())
    }
}
