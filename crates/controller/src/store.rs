//! File-backed manifest store.
//!
//! One YAML document per `*.yaml`/`*.yml` file, anywhere below the manifest
//! directory except hidden directories. Records are written back in
//! place after each pass: serialize to a hidden temp file in the same
//! directory, then rename over the original.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use discord_reconciler::{API_VERSION, KindRegistry, ManagedObject, Role, decode_other};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::provider::{
    PROVIDER_CONFIG_KIND, ProviderConfig, SECRET_API_VERSION, SECRET_KIND, Secret,
};

/// The registry the controller loads manifests with: the reconciler's
/// defaults plus provider configs and secrets.
pub fn controller_registry() -> KindRegistry {
    let mut registry = KindRegistry::with_defaults();
    registry.register(API_VERSION, PROVIDER_CONFIG_KIND, decode_other);
    registry.register(SECRET_API_VERSION, SECRET_KIND, decode_other);
    registry
}

/// A reconcilable record and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub path: PathBuf,
    pub object: ManagedObject,
}

/// Everything loaded from the manifest directory in one pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<StoredRecord>,
    pub provider_configs: HashMap<String, ProviderConfig>,
    pub secrets: HashMap<String, Secret>,
    /// Recognised documents nothing reconciles (exported channels etc).
    pub passive: usize,
    /// Files that could not be read or decoded.
    pub rejected: Vec<(PathBuf, String)>,
}

/// Directory of YAML manifests.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
    registry: KindRegistry,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>, registry: KindRegistry) -> Self {
        Self {
            dir: dir.into(),
            registry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every manifest. Unknown kinds and undecodable files are skipped
    /// with a warning; a missing or unreadable directory is an error.
    pub async fn load(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        for path in self.manifest_paths().await? {
            let decoded = match self.read(&path).await {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping manifest");
                    snapshot.rejected.push((path, e.to_string()));
                    continue;
                }
            };
            let Some(object) = decoded else {
                warn!(path = %path.display(), "Skipping manifest of unknown kind");
                continue;
            };
            file(&mut snapshot, path, object);
        }

        debug!(
            dir = %self.dir.display(),
            records = snapshot.records.len(),
            provider_configs = snapshot.provider_configs.len(),
            secrets = snapshot.secrets.len(),
            "Loaded manifests"
        );
        Ok(snapshot)
    }

    /// Read and decode one manifest.
    pub async fn read(&self, path: &Path) -> Result<Option<ManagedObject>> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::file_read_failed(path, e))?;
        let value: serde_json::Value =
            serde_yaml::from_str(&content).map_err(|e| Error::yaml_parse_failed(path, e))?;
        Ok(self.registry.decode(value)?)
    }

    /// Write a role back to its file.
    pub async fn save_role(&self, path: &Path, role: &Role) -> Result<()> {
        let yaml = serde_yaml::to_string(role).map_err(|e| Error::file_write_failed(path, e))?;
        let tmp = temp_path(path);

        tokio::fs::write(&tmp, yaml)
            .await
            .map_err(|e| Error::file_write_failed(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::file_write_failed(path, e))?;

        debug!(path = %path.display(), "Saved record");
        Ok(())
    }

    /// Remove a record's file. A file that is already gone is fine.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_write_failed(path, e)),
        }
    }

    /// Manifest files in the directory and its subdirectories, sorted.
    /// Hidden directories are skipped.
    async fn manifest_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut pending = vec![self.dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == self.dir => {
                    return Err(Error::DirectoryNotFound { path: dir });
                }
                Err(e) if dir == self.dir => return Err(Error::file_read_failed(&dir, e)),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::file_read_failed(&dir, e))?
            {
                let path = entry.path();
                if path.is_dir() {
                    if !is_hidden(&path) {
                        pending.push(path);
                    }
                } else if is_manifest(&path) {
                    paths.push(path);
                }
            }
        }

        paths.sort();
        Ok(paths)
    }
}

fn file(snapshot: &mut Snapshot, path: PathBuf, object: ManagedObject) {
    match object {
        ManagedObject::Role(role) => snapshot.records.push(StoredRecord {
            path,
            object: ManagedObject::Role(role),
        }),
        ManagedObject::Other { kind, raw, .. } if kind == PROVIDER_CONFIG_KIND => {
            if let Some(config) = typed::<ProviderConfig>(&path, raw, &mut snapshot.rejected) {
                snapshot
                    .provider_configs
                    .insert(config.metadata.name.clone(), config);
            }
        }
        ManagedObject::Other { kind, raw, .. } if kind == SECRET_KIND => {
            if let Some(secret) = typed::<Secret>(&path, raw, &mut snapshot.rejected) {
                snapshot.secrets.insert(secret.metadata.name.clone(), secret);
            }
        }
        ManagedObject::Other { .. } => snapshot.passive += 1,
    }
}

fn typed<T: DeserializeOwned>(
    path: &Path,
    raw: serde_json::Value,
    rejected: &mut Vec<(PathBuf, String)>,
) -> Option<T> {
    match serde_json::from_value(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping malformed manifest");
            rejected.push((path.to_path_buf(), e.to_string()));
            None
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn is_manifest(path: &Path) -> bool {
    let hidden = is_hidden(path);
    let yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    yaml && !hidden && path.is_file()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("record");
    path.with_file_name(format!(".{name}.tmp"))
}
