use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::library::{
    Library, MASTER_ACCOUNT, MASTER_REPO, USER_REPO, UpgradePolicy, library_key,
};
use crate::natural::natural_cmp;
use crate::release::{LOCAL_ONLY_ACCOUNT, ReleaseSource, UpdateStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a library for {key} is already registered")]
    Duplicate { key: String },
    #[error("{key} is a built-in library and cannot be removed")]
    WellKnown { key: String },
    #[error("no library registered for {key}")]
    NotFound { key: String },
    #[error("library {key} is missing a title, account, repo or path")]
    Invalid { key: String },
}

/// Every known library, keyed by `account/repo`.
///
/// Always holds exactly one master and one user library.
#[derive(Debug)]
pub struct Libraries {
    entries: HashMap<String, Library>,
}

impl Libraries {
    #[must_use]
    pub fn new(library_root: &Path) -> Self {
        Self::from_entries(Vec::new(), library_root)
    }

    /// Build a registry from loaded entries, dropping invalid ones and adding
    /// whichever built-in libraries are missing.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = Library>, library_root: &Path) -> Self {
        let mut libraries = Self {
            entries: HashMap::new(),
        };
        for library in entries {
            if !library.is_valid() {
                debug!("Dropping invalid library entry {}", library.key());
                continue;
            }
            let key = library.key();
            if libraries.entries.contains_key(&key) {
                debug!("Dropping duplicate library entry {key}");
                continue;
            }
            libraries.entries.insert(key, library);
        }
        libraries.ensure_well_known(library_root);
        libraries
    }

    fn ensure_well_known(&mut self, library_root: &Path) {
        for library in [Library::master(library_root), Library::user(library_root)] {
            self.entries.entry(library.key()).or_insert(library);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Library> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Library> {
        self.entries.get_mut(key)
    }

    /// # Panics
    /// Never in practice: construction and [`Libraries::remove`] keep the
    /// built-in entries present.
    #[must_use]
    pub fn master(&self) -> &Library {
        self.entries
            .get(&library_key(MASTER_ACCOUNT, MASTER_REPO))
            .expect("registry always holds the master library")
    }

    /// # Panics
    /// Never in practice, see [`Libraries::master`].
    #[must_use]
    pub fn user(&self) -> &Library {
        self.entries
            .get(&library_key(LOCAL_ONLY_ACCOUNT, USER_REPO))
            .expect("registry always holds the user library")
    }

    /// Register an additional library.
    ///
    /// # Errors
    /// Returns an error when the library is incomplete or one with the same
    /// account and repo is already registered.
    pub fn insert(&mut self, library: Library) -> Result<(), RegistryError> {
        let key = library.key();
        if !library.is_valid() {
            return Err(RegistryError::Invalid { key });
        }
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Duplicate { key });
        }
        info!("Registering library {key} at {}", library.path().display());
        self.entries.insert(key, library);
        Ok(())
    }

    /// Unregister a library. The files on disk are left alone.
    ///
    /// # Errors
    /// Returns an error for the built-in libraries or an unknown key.
    pub fn remove(&mut self, key: &str) -> Result<Library, RegistryError> {
        match self.entries.get(key) {
            None => Err(RegistryError::NotFound {
                key: key.to_string(),
            }),
            Some(library) if library.is_master() || library.is_user() => {
                Err(RegistryError::WellKnown {
                    key: key.to_string(),
                })
            }
            Some(_) => self.entries.remove(key).ok_or_else(|| RegistryError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Libraries in display order: user, master, then the rest by account
    /// and repo.
    #[must_use]
    pub fn list(&self) -> Vec<&Library> {
        let mut list: Vec<&Library> = self.entries.values().collect();
        list.sort_by(|a, b| display_order(a, b));
        list
    }

    /// Check every library for updates concurrently on the calling task,
    /// sharing one deadline.
    ///
    /// Returns once every check has recorded a result. Checks still running
    /// when `timeout` elapses (or `cancel` fires) are cancelled and record a
    /// failure.
    pub async fn perform_update_checks(
        &self,
        source: &dyn ReleaseSource,
        policy: &UpgradePolicy,
        timeout: Duration,
        cancel: &CancellationToken,
    ) {
        let batch = cancel.child_token();
        let deadline = tokio::spawn({
            let batch = batch.clone();
            async move {
                tokio::time::sleep(timeout).await;
                warn!("Library update checks hit the {}s deadline", timeout.as_secs());
                batch.cancel();
            }
        });

        info!("Checking {} libraries for updates", self.entries.len());
        join_all(
            self.entries
                .values()
                .map(|library| library.check_for_available_upgrade(source, policy, &batch)),
        )
        .await;

        deadline.abort();
        debug!("Library update checks finished");
    }

    /// Update state of each library, in display order.
    #[must_use]
    pub fn update_summary(&self) -> Vec<(String, String, UpdateStatus)> {
        self.list()
            .into_iter()
            .map(|library| {
                (
                    library.key(),
                    library.title().to_string(),
                    UpdateStatus::from_upgrade(library.available_update().as_ref()),
                )
            })
            .collect()
    }
}

fn display_order(a: &Library, b: &Library) -> Ordering {
    match (a.is_user(), b.is_user()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    match (a.is_master(), b.is_master()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    natural_cmp(a.account(), b.account()).then_with(|| natural_cmp(a.repo(), b.repo()))
}

impl Serialize for Libraries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for library in self.list() {
            map.serialize_entry(&library.key(), library)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Libraries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<Library>(value) {
                Ok(library) => Some(library),
                Err(error) => {
                    warn!("Ignoring unreadable library entry {key}: {error}");
                    None
                }
            });
        Ok(Self::from_entries(
            entries,
            &grimoire_platform::default_library_root(),
        ))
    }
}

impl Default for Libraries {
    fn default() -> Self {
        Self::new(&grimoire_platform::default_library_root())
    }
}
