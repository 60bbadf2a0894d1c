//! Acceptance Store
//! Durable, machine-scoped storage of the acceptance record.
//!
//! Reads never fail the caller: anything that cannot be read back cleanly is
//! reported as "no record", which forces a re-prompt instead of trusting
//! stale or damaged data.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::record::AcceptanceRecord;

pub const RECORD_FILE_NAME: &str = "acceptance.json";

/// Upper bound for the record file; anything larger is not ours.
const MAX_RECORD_BYTES: u64 = 64 * 1024;

pub trait AcceptanceStore {
    fn read(&self) -> Option<AcceptanceRecord>;
    fn write(&self, record: &AcceptanceRecord) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;

    /// Called once from an elevated install so that every interactive user can
    /// later write the record.
    fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// --- File Store ---

/// JSON record under `<base>/<organization>/<app_id>/acceptance.json`.
pub struct FileAcceptanceStore {
    dir: PathBuf,
}

impl FileAcceptanceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.store_dir())
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE_NAME)
    }

    fn try_read(&self) -> Result<Option<AcceptanceRecord>, StoreError> {
        let path = self.path();
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("open acceptance record", e)),
        };

        let size = file
            .metadata()
            .map_err(|e| StoreError::io("stat acceptance record", e))?
            .len();
        if size > MAX_RECORD_BYTES {
            warn!("Acceptance record at {:?} is {} bytes; ignoring it", path, size);
            return Ok(None);
        }

        let mut content = String::new();
        file.take(MAX_RECORD_BYTES)
            .read_to_string(&mut content)
            .map_err(|e| StoreError::io("read acceptance record", e))?;

        let record: AcceptanceRecord =
            serde_json::from_str(&content).map_err(StoreError::Corrupt)?;
        if !record.is_consistent() {
            warn!("Acceptance record at {:?} is marked accepted without version or timestamp; ignoring it", path);
            return Ok(None);
        }
        Ok(Some(record))
    }
}

impl AcceptanceStore for FileAcceptanceStore {
    fn read(&self) -> Option<AcceptanceRecord> {
        match self.try_read() {
            Ok(record) => record,
            Err(e) => {
                warn!("Treating acceptance record as absent: {}", e);
                None
            }
        }
    }

    fn write(&self, record: &AcceptanceRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record)?;
        atomic_write(&self.path(), json.as_bytes())?;
        debug!("Wrote acceptance record to {:?}", self.path());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(self.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io("remove acceptance record", e)),
        }

        // Drop the app directory if nothing else lives there.
        if let Ok(mut entries) = fs::read_dir(&self.dir) {
            if entries.next().is_none() {
                let _ = fs::remove_dir(&self.dir);
            }
        }
        Ok(())
    }

    fn prepare(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io("create record directory", e))?;
        grant_shared_access(&self.dir)?;
        debug!("Prepared acceptance store at {:?}", self.dir);
        Ok(())
    }
}

/// The agent runs as whichever member of Users is signed in, so the record
/// must stay replaceable after another user created it. Modify rights are
/// granted on the app directory only and inherited by the record and logs.
#[cfg(windows)]
fn grant_shared_access(dir: &Path) -> Result<(), StoreError> {
    use std::os::windows::process::CommandExt;
    use std::process::Command;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    let output = Command::new("icacls")
        .arg(dir)
        .args(["/grant", "*S-1-5-32-545:(OI)(CI)M", "/T", "/Q"])
        .creation_flags(CREATE_NO_WINDOW)
        .output()
        .map_err(|e| StoreError::io("launch icacls", e))?;
    if output.status.success() {
        return Ok(());
    }
    Err(StoreError::Permissions {
        path: dir.to_path_buf(),
        detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Readable by everyone, writable by the installing account.
#[cfg(not(windows))]
fn grant_shared_access(dir: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).map_err(|e| StoreError::Permissions {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Temp file in the target directory, fsync, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::io(
            "resolve record directory",
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "record path has no parent"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| StoreError::io("create record directory", e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| StoreError::io("create temp file", e))?;
    tmp.write_all(data)
        .map_err(|e| StoreError::io("write temp file", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io("fsync temp file", e))?;

    // Non-privileged callers must be able to check status.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
            .map_err(|e| StoreError::io("set record permissions", e))?;
    }

    tmp.persist(path)
        .map_err(|e| StoreError::io("rename temp file over record", e.error))?;

    #[cfg(unix)]
    {
        let dir = fs::File::open(parent).map_err(|e| StoreError::io("open record directory", e))?;
        dir.sync_all()
            .map_err(|e| StoreError::io("fsync record directory", e))?;
    }

    Ok(())
}

// --- Memory Store ---

/// In-process store used by tests and dry runs.
#[derive(Default)]
pub struct MemoryAcceptanceStore {
    record: Mutex<Option<AcceptanceRecord>>,
    fail_writes: Mutex<bool>,
}

impl MemoryAcceptanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: AcceptanceRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            fail_writes: Mutex::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    fn writes_fail(&self) -> bool {
        self.fail_writes.lock().map(|f| *f).unwrap_or(true)
    }
}

impl AcceptanceStore for MemoryAcceptanceStore {
    fn read(&self) -> Option<AcceptanceRecord> {
        self.record.lock().ok().and_then(|r| r.clone())
    }

    fn write(&self, record: &AcceptanceRecord) -> Result<(), StoreError> {
        if self.writes_fail() {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        let mut slot = self
            .record
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        *slot = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.writes_fail() {
            return Err(StoreError::Unavailable("clear rejected".to_string()));
        }
        let mut slot = self
            .record
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }

    fn prepare(&self) -> Result<(), StoreError> {
        if self.writes_fail() {
            return Err(StoreError::Unavailable("prepare rejected".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(version: &str, count: u32) -> AcceptanceRecord {
        AcceptanceRecord {
            accepted: true,
            accepted_terms_version: version.to_string(),
            acceptance_timestamp: Some(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()),
            accepted_by_identity: "alice".to_string(),
            acceptance_count: count,
            reminder_count: 0,
            last_reminder_timestamp: None,
        }
    }

    #[test]
    fn missing_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path().join("Contoso").join("TermsGate"));
        assert_eq!(store.read(), None);
    }

    #[test]
    fn write_creates_directories_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path().join("Contoso").join("TermsGate"));
        let record = sample("3.3.0", 1);

        store.write(&record).unwrap();

        assert!(store.path().exists());
        assert_eq!(store.read(), Some(record));
    }

    #[test]
    fn write_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path());

        store.write(&sample("3.2.0", 1)).unwrap();
        store.write(&sample("3.3.0", 2)).unwrap();

        let read = store.read().unwrap();
        assert_eq!(read.accepted_terms_version, "3.3.0");
        assert_eq!(read.acceptance_count, 2);

        // No temp files left beside the record.
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(RECORD_FILE_NAME)]);
    }

    #[test]
    fn corrupted_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path());
        fs::write(store.path(), "{ \"accepted\": tr").unwrap();
        assert_eq!(store.read(), None);
    }

    #[test]
    fn unparsable_file_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path());
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.try_read(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn inconsistent_record_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path());
        fs::write(store.path(), r#"{ "accepted": true, "acceptanceCount": 1 }"#).unwrap();
        assert_eq!(store.read(), None);
    }

    #[test]
    fn oversized_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path());
        fs::write(store.path(), vec![b' '; (MAX_RECORD_BYTES + 1) as usize]).unwrap();
        assert_eq!(store.read(), None);
    }

    #[test]
    fn clear_removes_record_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("Contoso").join("TermsGate");
        let store = FileAcceptanceStore::new(&app_dir);
        store.write(&sample("3.3.0", 1)).unwrap();

        store.clear().unwrap();
        assert_eq!(store.read(), None);
        assert!(!app_dir.exists());

        store.clear().unwrap();
        assert_eq!(store.read(), None);
    }

    #[cfg(unix)]
    #[test]
    fn record_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileAcceptanceStore::new(dir.path());
        store.write(&sample("3.3.0", 1)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn prepare_creates_store_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("Contoso").join("TermsGate");
        let store = FileAcceptanceStore::new(&app_dir);

        store.prepare().unwrap();
        store.prepare().unwrap();

        assert!(app_dir.is_dir());
        let mode = fs::metadata(&app_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(store.read(), None);
    }

    #[test]
    fn memory_store_write_failure_leaves_record_untouched() {
        let store = MemoryAcceptanceStore::with_record(sample("3.2.0", 1));
        store.set_fail_writes(true);

        assert!(store.write(&sample("3.3.0", 2)).is_err());
        assert_eq!(store.read(), Some(sample("3.2.0", 1)));

        store.set_fail_writes(false);
        store.clear().unwrap();
        assert_eq!(store.read(), None);
    }
}
