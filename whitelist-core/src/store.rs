//! Group storage
//!
//! The dashboard holds groups behind a [`GroupStore`] rather than in shared
//! global state. [`TomlGroupStore`] also persists ids and descriptions, which
//! generated configuration text cannot carry.

use crate::error::{Result, WhitelistError};
use crate::model::WhitelistGroup;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Repository of whitelist groups keyed by id, in insertion order
pub trait GroupStore: Send + Sync {
    fn list(&self) -> Vec<WhitelistGroup>;

    fn get(&self, id: &str) -> Option<WhitelistGroup>;

    /// Insert a group, or replace the group with the same id in place
    fn upsert(&self, group: WhitelistGroup) -> Result<()>;

    /// Delete a group by id and return it
    fn delete(&self, id: &str) -> Result<WhitelistGroup>;

    /// Replace the whole set
    fn replace_all(&self, groups: Vec<WhitelistGroup>) -> Result<()>;

    /// Apply `f` to one group and return the updated copy
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut WhitelistGroup)) -> Result<WhitelistGroup> {
        let mut group = self.get(id).ok_or_else(|| WhitelistError::GroupNotFound {
            group: id.to_string(),
        })?;
        f(&mut group);
        self.upsert(group.clone())?;
        Ok(group)
    }
}

fn lock(groups: &Mutex<IndexMap<String, WhitelistGroup>>) -> MutexGuard<'_, IndexMap<String, WhitelistGroup>> {
    groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn index(groups: Vec<WhitelistGroup>) -> IndexMap<String, WhitelistGroup> {
    groups.into_iter().map(|g| (g.id.clone(), g)).collect()
}

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    groups: Mutex<IndexMap<String, WhitelistGroup>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: Vec<WhitelistGroup>) -> Self {
        Self {
            groups: Mutex::new(index(groups)),
        }
    }
}

impl GroupStore for MemoryGroupStore {
    fn list(&self) -> Vec<WhitelistGroup> {
        lock(&self.groups).values().cloned().collect()
    }

    fn get(&self, id: &str) -> Option<WhitelistGroup> {
        lock(&self.groups).get(id).cloned()
    }

    fn upsert(&self, group: WhitelistGroup) -> Result<()> {
        lock(&self.groups).insert(group.id.clone(), group);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<WhitelistGroup> {
        lock(&self.groups)
            .shift_remove(id)
            .ok_or_else(|| WhitelistError::GroupNotFound {
                group: id.to_string(),
            })
    }

    fn replace_all(&self, groups: Vec<WhitelistGroup>) -> Result<()> {
        *lock(&self.groups) = index(groups);
        Ok(())
    }
}

/// On-disk layout of the group file
#[derive(Debug, Default, Deserialize, Serialize)]
struct GroupFile {
    #[serde(default)]
    groups: Vec<WhitelistGroup>,
}

/// Store persisted to a TOML file after every mutation
#[derive(Debug)]
pub struct TomlGroupStore {
    path: PathBuf,
    groups: Mutex<IndexMap<String, WhitelistGroup>>,
}

impl TomlGroupStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let groups = if path.exists() {
            Self::load(&path)?
        } else {
            tracing::debug!("Group store not found at {:?}, starting empty", path);
            Vec::new()
        };

        Ok(Self {
            path,
            groups: Mutex::new(index(groups)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Vec<WhitelistGroup>> {
        let contents = fs::read_to_string(path).map_err(|source| WhitelistError::StoreLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let file: GroupFile = toml::from_str(&contents)?;
        Ok(file.groups)
    }

    fn save(&self, groups: &IndexMap<String, WhitelistGroup>) -> Result<()> {
        let file = GroupFile {
            groups: groups.values().cloned().collect(),
        };
        let contents = toml::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, contents)?;
        tracing::debug!("Saved {} groups to {:?}", file.groups.len(), self.path);
        Ok(())
    }
}

impl GroupStore for TomlGroupStore {
    fn list(&self) -> Vec<WhitelistGroup> {
        lock(&self.groups).values().cloned().collect()
    }

    fn get(&self, id: &str) -> Option<WhitelistGroup> {
        lock(&self.groups).get(id).cloned()
    }

    fn upsert(&self, group: WhitelistGroup) -> Result<()> {
        let mut current = lock(&self.groups);
        let mut next = current.clone();
        next.insert(group.id.clone(), group);
        self.save(&next)?;
        *current = next;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<WhitelistGroup> {
        let mut current = lock(&self.groups);
        let mut next = current.clone();
        let removed = next
            .shift_remove(id)
            .ok_or_else(|| WhitelistError::GroupNotFound {
                group: id.to_string(),
            })?;
        self.save(&next)?;
        *current = next;
        Ok(removed)
    }

    fn replace_all(&self, groups: Vec<WhitelistGroup>) -> Result<()> {
        let mut current = lock(&self.groups);
        let next = index(groups);
        self.save(&next)?;
        *current = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn group(name: &str) -> WhitelistGroup {
        let mut g = WhitelistGroup::new(name);
        g.add_client("10.0.0.1");
        g.add_destination("example.com");
        g
    }

    #[test]
    fn test_memory_store_crud() {
        let store = MemoryGroupStore::new();
        let a = group("A");
        let b = group("B");
        store.upsert(a.clone()).unwrap();
        store.upsert(b.clone()).unwrap();

        assert_eq!(store.list().len(), 2);
        assert_eq!(store.get(&a.id).unwrap().name, "A");

        let renamed = store.update(&a.id, &mut |g| g.rename("A2")).unwrap();
        assert_eq!(renamed.name, "A2");
        // Order is preserved across updates
        assert_eq!(store.list()[0].name, "A2");

        store.delete(&a.id).unwrap();
        assert!(store.get(&a.id).is_none());
        assert!(matches!(
            store.delete(&a.id),
            Err(WhitelistError::GroupNotFound { .. })
        ));
    }

    #[test]
    fn test_update_missing_group() {
        let store = MemoryGroupStore::new();
        assert!(store.update("nope", &mut |_| {}).is_err());
    }

    #[test]
    fn test_toml_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/groups.toml");

        let mut disabled = group("Off");
        disabled.set_enabled(false);
        disabled.description = "kept while disabled".to_string();

        {
            let store = TomlGroupStore::open(&path).unwrap();
            assert!(store.list().is_empty());
            store.replace_all(vec![group("A"), disabled.clone()]).unwrap();
        }

        let store = TomlGroupStore::open(&path).unwrap();
        let groups = store.list();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "A");
        assert_eq!(groups[1], disabled);
    }

    #[test]
    fn test_toml_store_unchanged_when_save_fails() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes every write fail
        let path = dir.path().join("groups.toml");
        let store = TomlGroupStore::open(&path).unwrap();
        let kept = group("Kept");
        store.replace_all(vec![kept.clone()]).unwrap();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(store.replace_all(vec![group("New")]).is_err());
        assert!(store.upsert(group("Other")).is_err());
        assert!(store.delete(&kept.id).is_err());
        assert_eq!(store.list(), vec![kept]);
    }

    #[test]
    fn test_toml_store_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.toml");
        fs::write(&path, "groups = 3").unwrap();
        assert!(matches!(
            TomlGroupStore::open(&path),
            Err(WhitelistError::StoreParse(_))
        ));
    }
}
