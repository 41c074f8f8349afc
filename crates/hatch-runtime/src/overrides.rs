//! Override points handed to the content runtime
//!
//! The content runtime never sees archive paths. Before it initializes it
//! receives a [`RuntimeOverrides`] adapter that answers its path lookups
//! from the asset store, keeps user data in an external store, builds
//! content types over package resources, and filters the events it emits.

use crate::events::{EventDispatcher, XapiEvent};
use crate::store::{AssetStore, ResourceHandle};
use hatch_pm::normalize_path;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Key of one user-data value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UserDataKey {
    pub content_id: String,
    pub data_type: String,

    /// Sub-item the value belongs to ("0" for the content itself)
    pub sub_content_id: String,
}

impl UserDataKey {
    pub fn new(
        content_id: impl Into<String>,
        data_type: impl Into<String>,
        sub_content_id: impl Into<String>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            data_type: data_type.into(),
            sub_content_id: sub_content_id.into(),
        }
    }
}

/// External key space for user progress and state
pub trait UserDataStore: Send + Sync {
    fn get(&self, key: &UserDataKey) -> Option<Value>;
    fn set(&self, key: UserDataKey, value: Value);

    /// Returns `true` if a value was removed
    fn delete(&self, key: &UserDataKey) -> bool;
}

/// User data kept in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryUserData {
    entries: Mutex<HashMap<UserDataKey, Value>>,
}

impl MemoryUserData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl UserDataStore for MemoryUserData {
    fn get(&self, key: &UserDataKey) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: UserDataKey, value: Value) {
        self.entries.lock().insert(key, value);
    }

    fn delete(&self, key: &UserDataKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }
}

/// A content type as seen by the runtime: one package and its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub machine_name: String,
    pub package_path: String,
    files: BTreeMap<String, ResourceHandle>,
}

impl ContentType {
    /// Base path the runtime uses for the library (`hatch:lib/<package>`)
    pub fn library_path(&self) -> String {
        format!("{}lib/{}", ResourceHandle::SCHEME, self.package_path)
    }

    /// Handle of a file of this library
    pub fn library_file_path(&self, path: &str) -> Option<&ResourceHandle> {
        self.files.get(&normalize_path(path))
    }
}

/// Adapter interface supplied to runtime initialization
pub trait RuntimeOverrides: Send + Sync {
    /// Map a content-relative path to its handle
    ///
    /// Returns `None` for external references (`http:`, `data:`) and for
    /// paths the archive does not contain; the runtime keeps those as-is.
    fn resolve_path(&self, path: &str) -> Option<ResourceHandle>;

    fn user_data_get(&self, key: &UserDataKey) -> Option<Value>;
    fn user_data_set(&self, key: UserDataKey, value: Value);
    fn user_data_delete(&self, key: &UserDataKey) -> bool;

    /// Content type for a machine name
    fn content_type(&self, machine_name: &str) -> Option<ContentType>;

    /// Forward a statement; returns `false` if it was dropped
    fn dispatch_event(&self, statement: Value) -> bool;
}

/// [`RuntimeOverrides`] backed by the asset store of one load
pub struct ArchiveOverrides {
    store: Arc<AssetStore>,
    content_namespace: String,
    /// (machine name, package path), in load order
    libraries: Vec<(String, String)>,
    user_data: Arc<dyn UserDataStore>,
    events: EventDispatcher,
}

impl ArchiveOverrides {
    pub fn new(
        store: Arc<AssetStore>,
        content_namespace: impl Into<String>,
        libraries: Vec<(String, String)>,
        user_data: Arc<dyn UserDataStore>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            store,
            content_namespace: content_namespace.into(),
            libraries,
            user_data,
            events,
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }
}

impl RuntimeOverrides for ArchiveOverrides {
    fn resolve_path(&self, path: &str) -> Option<ResourceHandle> {
        if path.contains("://") || path.starts_with("data:") {
            return None;
        }
        let path = normalize_path(path);
        let relative = path
            .strip_prefix(self.content_namespace.as_str())
            .unwrap_or(&path);
        self.store.content().resolve(relative).cloned()
    }

    fn user_data_get(&self, key: &UserDataKey) -> Option<Value> {
        self.user_data.get(key)
    }

    fn user_data_set(&self, key: UserDataKey, value: Value) {
        self.user_data.set(key, value);
    }

    fn user_data_delete(&self, key: &UserDataKey) -> bool {
        self.user_data.delete(key)
    }

    fn content_type(&self, machine_name: &str) -> Option<ContentType> {
        // Several versions of a library can be present; the first one in
        // load order wins.
        let (name, package_path) = self
            .libraries
            .iter()
            .find(|(name, _)| name == machine_name)?;
        let resources = self.store.package(package_path)?;

        let files = resources
            .files()
            .filter_map(|(path, res)| res.handle().map(|h| (path.to_string(), h.clone())))
            .collect();

        Some(ContentType {
            machine_name: name.clone(),
            package_path: package_path.clone(),
            files,
        })
    }

    fn dispatch_event(&self, statement: Value) -> bool {
        match XapiEvent::from_statement(statement) {
            Some(event) => self.events.dispatch(event),
            None => false,
        }
    }
}

impl std::fmt::Debug for ArchiveOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOverrides")
            .field("content_namespace", &self.content_namespace)
            .field("libraries", &self.libraries)
            .field("events", &self.events)
            .finish()
    }
}
