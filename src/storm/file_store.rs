use crate::storm::record::EventRecord;
use crate::storm::store::{RecordStore, UpsertOutcome};
use crate::storm::util::sha256_hex;
use crate::storm::warn::{self, WarnEvent};
use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

const LOCK_FILE: &str = "store.lock";
const RECORDS_DIR: &str = "records";

/// Directory-backed document store: one pretty-printed JSON file per record,
/// named by the SHA-256 of its `record_key`.
///
/// Writes land in a temp file in the same directory and are renamed into
/// place, so a reader never sees a half-written document. An advisory lock
/// on `store.lock` serializes writers across processes; the mutex does the
/// same between threads sharing one handle.
#[derive(Debug)]
pub struct FileRecordStore {
    root: PathBuf,
    records_dir: PathBuf,
    lock: Mutex<File>,
}

struct StoreLock<'a> {
    file: MutexGuard<'a, File>,
}

impl Drop for StoreLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&*self.file);
    }
}

impl FileRecordStore {
    pub fn open(root: &Path) -> Result<Self> {
        let records_dir = root.join(RECORDS_DIR);
        fs::create_dir_all(&records_dir)
            .with_context(|| format!("failed to create {}", records_dir.display()))?;

        let lock_path = root.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("failed to open {}", lock_path.display()))?;

        Ok(Self {
            root: root.to_path_buf(),
            records_dir,
            lock: Mutex::new(lock),
        })
    }

    fn document_path(&self, record_key: &str) -> PathBuf {
        self.records_dir
            .join(format!("{}.json", sha256_hex(record_key.as_bytes())))
    }

    fn acquire(&self, exclusive: bool) -> Result<StoreLock<'_>> {
        let file = self
            .lock
            .lock()
            .map_err(|_| anyhow!("record store lock poisoned"))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&*file)
        } else {
            FileExt::lock_shared(&*file)
        };
        locked.with_context(|| format!("failed to lock {}", self.root.join(LOCK_FILE).display()))?;
        Ok(StoreLock { file })
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.records_dir)
            .with_context(|| format!("failed to create temp file in {}", self.records_dir.display()))?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to persist {}", path.display()))?;
        Ok(())
    }
}

impl RecordStore for FileRecordStore {
    fn upsert(&self, record: &EventRecord) -> Result<UpsertOutcome> {
        let mut bytes = serde_json::to_vec_pretty(record)?;
        bytes.push(b'\n');
        let path = self.document_path(&record.record_key);

        let _guard = self.acquire(true)?;
        let outcome = match fs::read(&path) {
            Ok(existing) if existing == bytes => return Ok(UpsertOutcome::Unchanged),
            Ok(_) => UpsertOutcome::Replaced,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => UpsertOutcome::Inserted,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        self.write_atomically(&path, &bytes)?;
        Ok(outcome)
    }

    fn scan(&self) -> Result<Vec<EventRecord>> {
        let _guard = self.acquire(false)?;
        let entries = fs::read_dir(&self.records_dir)
            .with_context(|| format!("failed to read {}", self.records_dir.display()))?;

        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|raw| serde_json::from_str::<EventRecord>(&raw).map_err(Into::into));
            match parsed {
                Ok(record) => out.push(record),
                Err(err) => warn::emit(WarnEvent {
                    code: "STORE_DOCUMENT_UNREADABLE",
                    stage: "store",
                    action: "scan",
                    target: &path.display().to_string(),
                    reason: "skip-document",
                    err: &format!("{err:#}"),
                }),
            }
        }
        Ok(out)
    }
}
