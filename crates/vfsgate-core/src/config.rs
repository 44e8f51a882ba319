//! VFS configuration.
//!
//! Loaded once at boot (usually as the `[vfs]` table of the server's TOML
//! file) and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::vfs::{MountAttributes, Mountpoint};

/// Top-level VFS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Directory `{vfs}` expands to. Relative paths resolve against the
    /// working directory.
    pub root: PathBuf,
    /// Start filesystem watchers for mounts that allow it.
    pub watch: bool,
    pub mountpoints: Vec<Mountpoint>,
    pub mime: MimeConfig,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("vfs"),
            watch: false,
            mountpoints: default_mountpoints(),
            mime: MimeConfig::default(),
        }
    }
}

/// The stock mounts: the read-only distribution and per-user homes.
fn default_mountpoints() -> Vec<Mountpoint> {
    vec![
        Mountpoint {
            name: "osjs".into(),
            label: Some("OS.js".into()),
            adapter: None,
            attributes: MountAttributes {
                root: Some("{root}/dist".into()),
                read_only: true,
                ..Default::default()
            },
        },
        Mountpoint {
            name: "home".into(),
            label: Some("Home".into()),
            adapter: None,
            attributes: MountAttributes {
                root: Some("{vfs}/{username}".into()),
                ..Default::default()
            },
        },
    ]
}

/// Extra MIME mappings layered over the built-in table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MimeConfig {
    /// MIME type → file extensions (without the dot).
    pub define: BTreeMap<String, Vec<String>>,
    /// Exact filename → MIME type (e.g. `Makefile`).
    pub filenames: BTreeMap<String, String>,
}
