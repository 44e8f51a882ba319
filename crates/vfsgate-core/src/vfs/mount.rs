//! Mountpoint registry with prefix routing.
//!
//! Routes an address to its mountpoint by the prefix before `:`, and to the
//! adapter the mountpoint names. The table is built once at boot and is
//! read-only afterwards, so lookups need no locking.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::error::{VfsError, VfsResult};
use super::ops::{AdapterContext, VfsAdapter};
use super::path;
use crate::session::Session;

/// Adapter used when a mountpoint does not name one.
pub const SYSTEM_ADAPTER: &str = "system";

/// In-process adapter for scratch mounts.
pub const MEMORY_ADAPTER: &str = "memory";

/// A group requirement on a mountpoint.
///
/// In config: `groups = ["admin", { writefile = ["editors"] }]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRule {
    /// Applies to every method.
    Named(String),
    /// Method name → groups, checked only for that method.
    Methods(BTreeMap<String, Vec<String>>),
}

/// Access policy and backend options of a mountpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountAttributes {
    /// Root template, e.g. `{vfs}/{username}`. Defaults to `{vfs}/<name>`.
    pub root: Option<String>,
    pub read_only: bool,
    pub groups: Vec<GroupRule>,
    /// All named groups must match (true) or any one (false).
    pub strict_groups: bool,
    /// Byte-range reads; defaults to on for the system adapter only.
    pub ranges: Option<bool>,
    pub searchable: bool,
    /// Allow a filesystem watcher when watching is enabled globally.
    pub watch: bool,
}

impl Default for MountAttributes {
    fn default() -> Self {
        Self {
            root: None,
            read_only: false,
            groups: Vec::new(),
            strict_groups: true,
            ranges: None,
            searchable: true,
            watch: true,
        }
    }
}

/// A named binding between an address prefix and a storage adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mountpoint {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Adapter name; `system` when absent.
    #[serde(default)]
    pub adapter: Option<String>,
    #[serde(default)]
    pub attributes: MountAttributes,
}

impl Mountpoint {
    /// The address root of this mount, e.g. `home:/`.
    pub fn root(&self) -> String {
        format!("{}:/", self.name)
    }

    /// Root template with the default applied.
    pub fn root_template(&self) -> String {
        self.attributes
            .root
            .clone()
            .unwrap_or_else(|| format!("{{vfs}}/{}", self.name))
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.as_deref().unwrap_or(SYSTEM_ADAPTER)
    }

    /// Whether `readfile` honors `Range` headers on this mount.
    pub fn ranges_enabled(&self) -> bool {
        self.attributes
            .ranges
            .unwrap_or_else(|| self.adapter_name() == SYSTEM_ADAPTER)
    }
}

/// A mountpoint and its adapter, resolved for one call.
#[derive(Clone)]
pub struct ResolvedTarget {
    pub mount: Arc<Mountpoint>,
    pub adapter: Arc<dyn VfsAdapter>,
}

impl std::fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("mount", &self.mount.name)
            .field("adapter", &self.mount.adapter_name())
            .finish()
    }
}

impl ResolvedTarget {
    /// Bind this target to the calling session.
    pub fn context<'a>(&'a self, session: &'a Session) -> AdapterContext<'a> {
        AdapterContext {
            mount: &self.mount,
            session,
        }
    }

    /// True when both targets run on the same adapter instance.
    pub fn same_adapter(&self, other: &ResolvedTarget) -> bool {
        Arc::ptr_eq(&self.adapter, &other.adapter)
    }
}

/// Immutable registry of mountpoints and adapters.
pub struct MountTable {
    mounts: BTreeMap<String, Arc<Mountpoint>>,
    adapters: HashMap<String, Arc<dyn VfsAdapter>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &self.mounts.keys().collect::<Vec<_>>())
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MountTable {
    /// Build the table, rejecting invalid or duplicate names and mounts that
    /// reference an unregistered adapter.
    pub fn new(
        mounts: impl IntoIterator<Item = Mountpoint>,
        adapters: HashMap<String, Arc<dyn VfsAdapter>>,
    ) -> VfsResult<Self> {
        let mut table = BTreeMap::new();

        for mount in mounts {
            if path::sanitize(&mount.root())? != mount.root()
                || path::get_prefix(&mount.root()) != mount.name
            {
                return Err(VfsError::invalid_path(format!(
                    "invalid mountpoint name '{}'",
                    mount.name
                )));
            }
            if !adapters.contains_key(mount.adapter_name()) {
                return Err(VfsError::other(format!(
                    "mountpoint '{}' uses unknown adapter '{}'",
                    mount.name,
                    mount.adapter_name()
                )));
            }
            if table.contains_key(&mount.name) {
                return Err(VfsError::already_exists(format!("mountpoint '{}'", mount.name)));
            }
            table.insert(mount.name.clone(), Arc::new(mount));
        }

        Ok(Self {
            mounts: table,
            adapters,
        })
    }

    /// Find the mountpoint and adapter for an address.
    pub fn resolve(&self, address: &str) -> VfsResult<ResolvedTarget> {
        let prefix = path::get_prefix(address);
        let mount = self
            .mounts
            .get(prefix)
            .ok_or_else(|| VfsError::no_mount_point(address))?;
        let adapter = self
            .adapters
            .get(mount.adapter_name())
            .ok_or_else(|| {
                VfsError::other(format!(
                    "adapter '{}' is not registered",
                    mount.adapter_name()
                ))
            })?;

        Ok(ResolvedTarget {
            mount: Arc::clone(mount),
            adapter: Arc::clone(adapter),
        })
    }

    /// All mountpoints, ordered by name.
    pub fn list_mounts(&self) -> Vec<Arc<Mountpoint>> {
        self.mounts.values().cloned().collect()
    }
}
