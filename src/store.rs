//! Local file store rooted at a fixed directory.
//!
//! Both roles keep their transferred files under a single root. Access is
//! not coordinated: two connections moving the same name race freely, and
//! the last writer wins.
//!
//! Names arrive off the wire as raw bytes. On unix they map to paths byte
//! for byte; elsewhere invalid UTF-8 is replaced.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::{debug, info};

use crate::error::Result;
use crate::payload;

/// A directory used as the source and destination for transfers
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet
    pub async fn ensure_root(&self) -> io::Result<()> {
        if tokio::fs::metadata(&self.root).await.is_err() {
            tokio::fs::create_dir_all(&self.root).await?;
            info!(root = %self.root.display(), "Created store directory");
        }
        Ok(())
    }

    /// Map a wire file name to a path under the root.
    ///
    /// The name is joined as-is; no normalization is applied.
    pub fn resolve(&self, file_name: &[u8]) -> PathBuf {
        self.root.join(os_name(file_name))
    }

    /// Whether `file_name` names a regular file in the store
    pub async fn exists(&self, file_name: &[u8]) -> bool {
        tokio::fs::metadata(self.resolve(file_name))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Open a stored file for reading; absent names are `FileNotFound`
    pub async fn open(&self, file_name: &[u8]) -> Result<File> {
        payload::open_file(&self.resolve(file_name)).await
    }

    /// Names of all entries directly under the root, sorted.
    ///
    /// Subdirectories are listed but not descended into, and hidden
    /// entries are not filtered.
    pub async fn list_names(&self) -> io::Result<Vec<Vec<u8>>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            names.push(wire_name(entry.file_name()));
        }
        names.sort();

        debug!(count = names.len(), "Listed store directory");
        Ok(names)
    }
}

#[cfg(unix)]
fn os_name(name: &[u8]) -> Cow<'_, OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(OsStr::from_bytes(name))
}

#[cfg(not(unix))]
fn os_name(name: &[u8]) -> Cow<'_, OsStr> {
    Cow::Owned(OsString::from(String::from_utf8_lossy(name).into_owned()))
}

#[cfg(unix)]
fn wire_name(name: OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStringExt;
    name.into_vec()
}

#[cfg(not(unix))]
fn wire_name(name: OsString) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;

    #[tokio::test]
    async fn test_resolve_under_root() {
        let store = FileStore::new("files");
        assert_eq!(store.resolve(b"a.txt"), Path::new("files").join("a.txt"));
        assert_eq!(store.resolve(b""), Path::new("files").join(""));
    }

    #[tokio::test]
    async fn test_list_names_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let store = FileStore::new(dir.path());
        assert_eq!(
            store.list_names().await.unwrap(),
            vec![b"a.txt".to_vec(), b"b.txt".to_vec(), b"sub".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_list_names_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.list_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_names_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nope"));
        assert!(store.list_names().await.is_err());
    }

    #[tokio::test]
    async fn test_exists_and_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.exists(b"a.txt").await);
        assert!(!store.exists(b"c.txt").await);
        assert!(!store.exists(b"sub").await);

        assert!(store.open(b"a.txt").await.is_ok());
        assert!(matches!(
            store.open(b"c.txt").await,
            Err(TransferError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_root_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("files"));

        store.ensure_root().await.unwrap();
        assert!(store.root().is_dir());

        // Second call is a no-op
        store.ensure_root().await.unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_non_utf8_names_pass_through() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"\xffc.txt")), b"hi").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.exists(b"\xffc.txt").await);
        assert!(store.open(b"\xffc.txt").await.is_ok());
        assert_eq!(
            store.list_names().await.unwrap(),
            vec![b"a.txt".to_vec(), b"\xffc.txt".to_vec()]
        );
    }
}
