use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::baseline::{GlobalBaseline, MergeLogEntry, TeamOverride};
use crate::store::{
    check_version, push_bounded, validate_team_id, BaselineStore, StoreError,
    DEFAULT_MERGE_LOG_CAPACITY,
};

pub const DEFAULT_GLOBAL_PATH: &str = "baselines/global-baseline.json";
pub const DEFAULT_TEAMS_DIR: &str = "teams";
pub const MERGE_LOG_FILE: &str = "merge-log.json";
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(5);

const LEASE_POLL: Duration = Duration::from_millis(10);
/// A lease older than this belongs to a writer that died mid-save.
const STALE_LEASE_AGE: Duration = Duration::from_secs(60);

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Flat JSON layout: `<root>/baselines/global-baseline.json`,
/// `<root>/baselines/merge-log.json` and `<root>/teams/<team>_baselines.json`.
///
/// Every write holds a `<file>.lock` lease created with `create_new`, so
/// handles in different processes serialize on the same record. The lease is
/// released when the write finishes or its future is dropped.
#[derive(Debug)]
pub struct JsonFileStore {
    global_path: PathBuf,
    teams_dir: PathBuf,
    merge_log_path: PathBuf,
    lease_timeout: Duration,
    merge_log_capacity: usize,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::with_layout(root.join(DEFAULT_GLOBAL_PATH), root.join(DEFAULT_TEAMS_DIR))
    }

    pub fn with_layout(global_path: impl Into<PathBuf>, teams_dir: impl Into<PathBuf>) -> Self {
        let global_path = global_path.into();
        Self {
            merge_log_path: global_path.with_file_name(MERGE_LOG_FILE),
            global_path,
            teams_dir: teams_dir.into(),
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            merge_log_capacity: DEFAULT_MERGE_LOG_CAPACITY,
            write_lock: Mutex::new(()),
        }
    }

    /// Longest wait for another writer's lease before failing with
    /// [`StoreError::Locked`].
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    pub fn with_merge_log_capacity(mut self, capacity: usize) -> Self {
        self.merge_log_capacity = capacity;
        self
    }

    pub fn global_path(&self) -> &Path {
        &self.global_path
    }

    pub fn merge_log_path(&self) -> &Path {
        &self.merge_log_path
    }

    pub fn team_path(&self, team_id: &str) -> PathBuf {
        self.teams_dir.join(format!("{team_id}_baselines.json"))
    }

    /// Writes the first global baseline. Refuses to replace an existing one.
    pub async fn create_global(&self, baseline: &GlobalBaseline) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lease = acquire_lease(&self.global_path, self.lease_timeout).await?;
        if tokio::fs::try_exists(&self.global_path)
            .await
            .map_err(|source| io_error(&self.global_path, source))?
        {
            return Err(StoreError::AlreadyExists {
                record: "global baseline".to_string(),
                location: self.global_path.display().to_string(),
            });
        }
        write_atomic(&self.global_path, baseline).await?;
        info!(path = %self.global_path.display(), "global baseline created");
        Ok(())
    }
}

#[async_trait]
impl BaselineStore for JsonFileStore {
    async fn load_global(&self) -> Result<GlobalBaseline, StoreError> {
        let baseline: GlobalBaseline = read_json(&self.global_path, "global baseline").await?;
        info!(
            shm = baseline.shm,
            commits = baseline.commits_since_update,
            "global baseline loaded"
        );
        Ok(baseline)
    }

    async fn load_team(&self, team_id: &str) -> Result<TeamOverride, StoreError> {
        validate_team_id(team_id)?;
        let path = self.team_path(team_id);
        let team: TeamOverride = read_json(&path, &format!("team override {team_id}")).await?;
        debug!(team = team_id, "team override loaded");
        Ok(team)
    }

    async fn save_global(&self, baseline: &GlobalBaseline) -> Result<GlobalBaseline, StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lease = acquire_lease(&self.global_path, self.lease_timeout).await?;
        let found = match read_json::<GlobalBaseline>(&self.global_path, "global baseline").await
        {
            Ok(current) => Some(current.version),
            Err(StoreError::NotFound { .. }) => None,
            Err(err) => return Err(err),
        };
        check_version(baseline.version, found)?;

        let mut next = baseline.clone();
        next.version = baseline.version + 1;
        write_atomic(&self.global_path, &next).await?;
        debug!(path = %self.global_path.display(), version = next.version, "global baseline saved");
        Ok(next)
    }

    async fn save_team(&self, team: &TeamOverride) -> Result<(), StoreError> {
        validate_team_id(&team.team_id)?;
        let path = self.team_path(&team.team_id);
        let _guard = self.write_lock.lock().await;
        let _lease = acquire_lease(&path, self.lease_timeout).await?;
        write_atomic(&path, team).await
    }

    async fn append_merge_log(&self, entry: &MergeLogEntry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lease = acquire_lease(&self.merge_log_path, self.lease_timeout).await?;
        let mut log = self.load_merge_log().await?;
        push_bounded(&mut log, entry.clone(), self.merge_log_capacity);
        write_atomic(&self.merge_log_path, &log).await?;
        debug!(team = entry.team_id.as_str(), approved = entry.approved, entries = log.len(), "merge log appended");
        Ok(())
    }

    async fn load_merge_log(&self) -> Result<Vec<MergeLogEntry>, StoreError> {
        match read_json(&self.merge_log_path, "merge log").await {
            Ok(log) => Ok(log),
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

/// Deletes `path` on drop unless disarmed.
struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl RemoveOnDrop {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed removing file"),
        }
    }
}

fn sibling(path: &Path, name: impl FnOnce(&str) -> String) -> PathBuf {
    let file = path.file_name().and_then(|s| s.to_str()).unwrap_or("record");
    path.with_file_name(name(file))
}

fn lease_path(target: &Path) -> PathBuf {
    sibling(target, |file| format!("{file}.lock"))
}

/// Unique per process and per write, so concurrent writers never share a temp file.
fn temp_path(target: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    sibling(target, |file| format!(".{file}.tmp.{}.{seq}", std::process::id()))
}

/// Takes the writer lease for `target`, polling until `timeout` elapses.
async fn acquire_lease(target: &Path, timeout: Duration) -> Result<RemoveOnDrop, StoreError> {
    let path = lease_path(target);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| io_error(parent, source))?;
    }
    let started = Instant::now();
    loop {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => return Ok(RemoveOnDrop::new(path)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if lease_is_stale(&path).await {
                    warn!(path = %path.display(), "breaking stale writer lease");
                    if let Err(err) = tokio::fs::remove_file(&path).await {
                        if err.kind() != std::io::ErrorKind::NotFound {
                            return Err(io_error(&path, err));
                        }
                    }
                    continue;
                }
                if started.elapsed() >= timeout {
                    return Err(StoreError::Locked {
                        location: path.display().to_string(),
                    });
                }
                tokio::time::sleep(LEASE_POLL).await;
            }
            Err(err) => return Err(io_error(&path, err)),
        }
    }
}

async fn lease_is_stale(path: &Path) -> bool {
    match tokio::fs::metadata(path).await.and_then(|meta| meta.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age >= STALE_LEASE_AGE)
            .unwrap_or(false),
        Err(_) => false,
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path, record: &str) -> Result<T, StoreError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                record: record.to_string(),
                location: path.display().to_string(),
            })
        }
        Err(err) => return Err(io_error(path, err)),
    };
    serde_json::from_slice(&data).map_err(|source| StoreError::Parse {
        location: path.display().to_string(),
        source,
    })
}

/// Writes and syncs a private temp file, then renames it over the target so
/// readers never observe a partially written record.
async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|source| io_error(parent, source))?;
    let body = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Parse {
        location: path.display().to_string(),
        source,
    })?;

    let tmp = temp_path(path);
    let mut pending = RemoveOnDrop::new(tmp.clone());
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|source| io_error(&tmp, source))?;
    file.write_all(&body)
        .await
        .map_err(|source| io_error(&tmp, source))?;
    file.sync_all()
        .await
        .map_err(|source| io_error(&tmp, source))?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| io_error(path, source))?;
    pending.disarm();

    if let Ok(dir) = tokio::fs::File::open(parent).await {
        let _ = dir.sync_all().await;
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        location: path.display().to_string(),
        source,
    }
}
