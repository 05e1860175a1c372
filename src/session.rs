//! Resume checkpoints for in-flight transfers
//!
//! One integer offset per (client identity, direction, filename). The file
//! backend names each record after the MD5 of the readable key, so arbitrary
//! filenames and IPv6 identities map to safe storage names.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub client: String,
    pub direction: Direction,
    pub filename: String,
}

impl SessionKey {
    pub fn new(client: &str, direction: Direction, filename: &str) -> Self {
        Self {
            client: client.to_string(),
            direction,
            filename: filename.to_string(),
        }
    }

    /// Hex MD5 of the readable key; used only as a storage identifier.
    pub fn digest(&self) -> String {
        format!("{:x}", md5::compute(self.to_string().as_bytes()))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.client, self.direction, self.filename)
    }
}

/// Persistence backend for transfer offsets.
///
/// Implementations must serialize access per key; the threaded connection
/// handler may touch the store from several threads.
pub trait SessionStore: Send + Sync {
    /// Last saved offset, or 0 when no record exists.
    fn load(&self, key: &SessionKey) -> Result<u64>;
    /// Overwrite the record for `key`.
    fn save(&self, key: &SessionKey, offset: u64) -> Result<()>;
    /// Remove the record; a missing record is not an error.
    fn delete(&self, key: &SessionKey) -> Result<()>;
}

/// `<dir>/<md5>.session` files holding a decimal offset.
pub struct FileSessionStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn record_path(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.session", key.digest()))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, key: &SessionKey) -> Result<u64> {
        let _guard = self.lock.lock();
        match fs::read_to_string(self.record_path(key)) {
            // An unreadable record means progress is unknown: restart from 0
            Ok(data) => Ok(data.trim().parse().unwrap_or(0)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &SessionKey, offset: u64) -> Result<()> {
        let _guard = self.lock.lock();
        // atomic write
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(offset.to_string().as_bytes())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn delete(&self, key: &SessionKey) -> Result<()> {
        let _guard = self.lock.lock();
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Session keys with a transfer in flight on some connection.
///
/// A claim covers a whole UPLOAD/DOWNLOAD, from the first `load` to the final
/// `delete`, so two connections sharing a client identity never drive the
/// same record and file at once.
#[derive(Default)]
pub struct ActiveTransfers {
    keys: Mutex<HashSet<SessionKey>>,
}

impl ActiveTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another connection holds `key`.
    pub fn try_claim(&self, key: &SessionKey) -> Option<TransferClaim<'_>> {
        if !self.keys.lock().insert(key.clone()) {
            return None;
        }
        Some(TransferClaim {
            owner: self,
            key: key.clone(),
        })
    }

    pub fn is_active(&self, key: &SessionKey) -> bool {
        self.keys.lock().contains(key)
    }
}

/// Released on drop, on every exit path of the transfer.
pub struct TransferClaim<'a> {
    owner: &'a ActiveTransfers,
    key: SessionKey,
}

impl Drop for TransferClaim<'_> {
    fn drop(&mut self) {
        self.owner.keys.lock().remove(&self.key);
    }
}

/// In-process store for tests and embedding.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<SessionKey, u64>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &SessionKey) -> Result<u64> {
        Ok(self.records.lock().get(key).copied().unwrap_or(0))
    }

    fn save(&self, key: &SessionKey, offset: u64) -> Result<()> {
        self.records.lock().insert(key.clone(), offset);
        Ok(())
    }

    fn delete(&self, key: &SessionKey) -> Result<()> {
        self.records.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(name: &str) -> SessionKey {
        SessionKey::new("127.0.0.1:50000", Direction::Upload, name)
    }

    #[test]
    fn test_key_format_and_digest() {
        let k = key("a.txt");
        assert_eq!(k.to_string(), "127.0.0.1:50000:upload:a.txt");
        assert_eq!(k.digest().len(), 32);
        assert!(k.digest().chars().all(|c| c.is_ascii_hexdigit()));
        // Direction is part of the key
        let d = SessionKey::new("127.0.0.1:50000", Direction::Download, "a.txt");
        assert_ne!(k.digest(), d.digest());
    }

    #[test]
    fn test_file_store_load_missing_is_zero() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path()).unwrap();
        assert_eq!(store.load(&key("nothing")).unwrap(), 0);
    }

    #[test]
    fn test_file_store_save_overwrite_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path().join("sessions")).unwrap();
        let k = key("big.bin");

        store.save(&k, 4096).unwrap();
        assert_eq!(store.load(&k).unwrap(), 4096);
        store.save(&k, 8192).unwrap();
        assert_eq!(store.load(&k).unwrap(), 8192);
        assert_eq!(fs::read_to_string(store.record_path(&k)).unwrap(), "8192");

        store.delete(&k).unwrap();
        assert!(!store.record_path(&k).exists());
        assert_eq!(store.load(&k).unwrap(), 0);
        // Second delete is a no-op
        store.delete(&k).unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = FileSessionStore::new(tmp.path()).unwrap();
            store.save(&key("resume.iso"), 123).unwrap();
        }
        let store = FileSessionStore::new(tmp.path()).unwrap();
        assert_eq!(store.load(&key("resume.iso")).unwrap(), 123);
    }

    #[test]
    fn test_file_store_corrupt_record_reads_zero() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path()).unwrap();
        let k = key("x");
        fs::write(store.record_path(&k), "not a number").unwrap();
        assert_eq!(store.load(&k).unwrap(), 0);
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path()).unwrap();
        for i in 0..5 {
            store.save(&key("f"), i * 10).unwrap();
        }
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.session", key("f").digest())]);
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let active = ActiveTransfers::new();
        let k = key("busy.bin");
        let claim = active.try_claim(&k).unwrap();
        assert!(active.is_active(&k));
        assert!(active.try_claim(&k).is_none());
        // Other names and directions are independent
        assert!(active.try_claim(&key("other.bin")).is_some());
        let down = SessionKey::new("127.0.0.1:50000", Direction::Download, "busy.bin");
        assert!(active.try_claim(&down).is_some());

        drop(claim);
        assert!(!active.is_active(&k));
        assert!(active.try_claim(&k).is_some());
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        let k = key("m");
        assert_eq!(store.load(&k).unwrap(), 0);
        store.save(&k, 7).unwrap();
        assert_eq!(store.load(&k).unwrap(), 7);
        assert_eq!(store.len(), 1);
        store.delete(&k).unwrap();
        assert!(store.is_empty());
    }
}
