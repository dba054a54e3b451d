//! Abstract filesystem operations of a PNS host.
//!
//! The daemon and the shell reach the OS filesystem only through this trait,
//! which names exactly the operations the protocol needs. [`LocalFs`] is the
//! production implementation over `tokio::fs`.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};

use crate::record::format_time;

/// Metadata subset the protocol cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub is_dir: bool,
    pub size: u64,
    pub ctime: String,
    pub mtime: String,
}

/// Filesystem seam of a host.
#[async_trait]
pub trait HostFs: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn is_dir(&self, path: &Path) -> bool;

    async fn is_file(&self, path: &Path) -> bool;

    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Direct children of a directory, absolute paths.
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    async fn open_read(&self, path: &Path) -> io::Result<File>;

    /// Opens a file for writing, creating missing parent directories.
    async fn create_write(&self, path: &Path) -> io::Result<File>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Move within this host; falls back to copy-and-delete across devices.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

pub struct LocalFs;

#[async_trait]
impl HostFs for LocalFs {
    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }

    async fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
    }

    async fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::metadata(path).await?;
        let mtime = meta.modified()?;
        let ctime = meta.created().unwrap_or(mtime);
        Ok(FileStat {
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            ctime: format_time(ctime),
            mtime: format_time(mtime),
        })
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    async fn open_read(&self, path: &Path) -> io::Result<File> {
        File::open(path).await
    }

    async fn create_write(&self, path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        OpenOptions::new().write(true).create(true).truncate(true).open(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(_) => {
                fs::copy(from, to).await?;
                fs::remove_file(from).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stat_reports_size_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, b"abc").await.unwrap();

        let fs = LocalFs;
        let stat = fs.stat(&file).await.unwrap();
        assert!(!stat.is_dir);
        assert_eq!(stat.size, 3);

        let stat = fs.stat(dir.path()).await.unwrap();
        assert!(stat.is_dir);
        assert_eq!(stat.size, 0);
    }

    #[tokio::test]
    async fn create_write_makes_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub/deeper/b.txt");

        let fs = LocalFs;
        let mut file = fs.create_write(&nested).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut file, b"xy").await.unwrap();
        drop(file);

        assert!(fs.is_file(&nested).await);
        assert_eq!(fs.stat(&nested).await.unwrap().size, 2);
    }
}
