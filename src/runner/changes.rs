//! File change tracking for `changed()` and `unchanged()`
//!
//! Checksums are kept in a small YAML database next to the source file and
//! written back every time a recorded checksum moves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the checksum database file
pub const DATABASE_FILE: &str = ".quill-changes.yaml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Store {
    #[serde(default)]
    files: BTreeMap<String, String>,
}

/// Lazily loaded checksum database
#[derive(Debug)]
pub struct ChangeDatabase {
    path: PathBuf,
    store: Option<Store>,
}

impl ChangeDatabase {
    /// Database stored at an explicit path
    pub fn new(path: PathBuf) -> Self {
        ChangeDatabase { path, store: None }
    }

    /// Database stored in the default file inside `dir`
    pub fn in_directory(dir: &Path) -> Self {
        Self::new(dir.join(DATABASE_FILE))
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether `file` changed since the last call and record its state
    ///
    /// A file seen for the first time counts as changed. A missing file counts
    /// as changed only if it was recorded before.
    pub fn changed(&mut self, file: &Path) -> io::Result<bool> {
        let key = file.to_string_lossy().into_owned();
        let current = checksum(file)?;
        let store = self.load()?;

        let changed = match (&current, store.files.get(&key)) {
            (Some(now), Some(before)) => now != before,
            (Some(_), None) => true,
            (None, Some(_)) => true,
            (None, None) => false,
        };

        if changed {
            match current {
                Some(sum) => store.files.insert(key, sum),
                None => store.files.remove(&key),
            };
            self.save()?;
        }

        log::debug!("{}: changed = {}", file.display(), changed);
        Ok(changed)
    }

    fn load(&mut self) -> io::Result<&mut Store> {
        if self.store.is_none() {
            let store = if self.path.exists() {
                let contents = fs::read_to_string(&self.path)?;
                serde_yaml::from_str(&contents)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            } else {
                Store::default()
            };
            self.store = Some(store);
        }
        Ok(self.store.get_or_insert_with(Store::default))
    }

    fn save(&self) -> io::Result<()> {
        if let Some(store) = &self.store {
            let contents = serde_yaml::to_string(store)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            fs::write(&self.path, contents)?;
        }
        Ok(())
    }
}

fn checksum(file: &Path) -> io::Result<Option<String>> {
    match fs::read(file) {
        Ok(bytes) => Ok(Some(blake3::hash(&bytes).to_hex().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_sight_is_a_change() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("doc.aux");
        fs::write(&file, "one").unwrap();

        let mut db = ChangeDatabase::in_directory(temp_dir.path());
        assert!(db.changed(&file).unwrap());
        assert!(!db.changed(&file).unwrap());

        fs::write(&file, "two").unwrap();
        assert!(db.changed(&file).unwrap());
    }

    #[test]
    fn test_state_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("doc.aux");
        fs::write(&file, "one").unwrap();

        let mut db = ChangeDatabase::in_directory(temp_dir.path());
        assert!(db.changed(&file).unwrap());
        assert!(db.path().exists());

        let mut reloaded = ChangeDatabase::in_directory(temp_dir.path());
        assert!(!reloaded.changed(&file).unwrap());
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("gone.aux");

        let mut db = ChangeDatabase::in_directory(temp_dir.path());
        assert!(!db.changed(&file).unwrap());

        fs::write(&file, "x").unwrap();
        assert!(db.changed(&file).unwrap());
        fs::remove_file(&file).unwrap();
        assert!(db.changed(&file).unwrap());
        assert!(!db.changed(&file).unwrap());
    }
}
