//! Database directory management.
//!
//! A file-backed factory owns one directory:
//!
//! ```text
//! <path>/
//! ├─ LOCK                  # advisory lock held by the factory
//! ├─ 77696467657473.journal  # one journal per database, hex-encoded name
//! └─ ...
//! ```

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_EXTENSION: &str = "journal";

/// An exclusively locked database directory.
#[derive(Debug)]
pub(crate) struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens (and optionally creates) the directory and takes its lock.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> EngineResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::not_found(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(EngineError::invalid_state(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::DirectoryLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Path of the journal for database `name`.
    pub(crate) fn journal_path(&self, name: &str) -> PathBuf {
        self.path
            .join(format!("{}.{JOURNAL_EXTENSION}", encode_name(name)))
    }

    /// Names of every database with a journal in the directory.
    pub(crate) fn database_names(&self) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JOURNAL_EXTENSION) {
                continue;
            }
            if let Some(name) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_name)
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes the journal of database `name`, if present.
    pub(crate) fn remove_journal(&self, name: &str) -> EngineResult<()> {
        match fs::remove_file(self.journal_path(name)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn encode_name(name: &str) -> String {
    name.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_name(stem: &str) -> Option<String> {
    if stem.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..stem.len())
        .step_by(2)
        .map(|i| stem.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn names_survive_hex_encoding() {
        for name in ["widgets", "", "spaces and/slashes", "ünïcode"] {
            assert_eq!(decode_name(&encode_name(name)).as_deref(), Some(name));
        }
        assert_eq!(decode_name("abc"), None);
        assert_eq!(decode_name("zz"), None);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = DatabaseDir::open(dir.path(), true).unwrap();
        assert!(matches!(
            DatabaseDir::open(dir.path(), true),
            Err(EngineError::DirectoryLocked)
        ));
    }

    #[test]
    fn missing_directory_without_create_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(matches!(
            DatabaseDir::open(&missing, false),
            Err(EngineError::NotFound { .. })
        ));
        assert!(DatabaseDir::open(&missing, true).is_ok());
    }

    #[test]
    fn lists_and_removes_journals() {
        let dir = tempdir().unwrap();
        let db_dir = DatabaseDir::open(dir.path(), true).unwrap();
        File::create(db_dir.journal_path("b")).unwrap();
        File::create(db_dir.journal_path("a")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        assert_eq!(db_dir.database_names().unwrap(), vec!["a", "b"]);

        db_dir.remove_journal("a").unwrap();
        db_dir.remove_journal("never-existed").unwrap();
        assert_eq!(db_dir.database_names().unwrap(), vec!["b"]);
    }
}
