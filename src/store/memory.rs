use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::baseline::{GlobalBaseline, MergeLogEntry, TeamOverride};
use crate::store::{
    check_version, push_bounded, validate_team_id, BaselineStore, StoreError,
    DEFAULT_MERGE_LOG_CAPACITY,
};

/// In-process store with the same version semantics as [`super::JsonFileStore`].
#[derive(Debug)]
pub struct MemoryStore {
    global: RwLock<Option<GlobalBaseline>>,
    teams: RwLock<HashMap<String, TeamOverride>>,
    merge_log: RwLock<Vec<MergeLogEntry>>,
    merge_log_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            global: RwLock::new(None),
            teams: RwLock::new(HashMap::new()),
            merge_log: RwLock::new(Vec::new()),
            merge_log_capacity: DEFAULT_MERGE_LOG_CAPACITY,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(baseline: GlobalBaseline) -> Self {
        Self {
            global: RwLock::new(Some(baseline)),
            ..Self::default()
        }
    }

    pub fn with_team(mut self, team: TeamOverride) -> Self {
        self.teams.get_mut().insert(team.team_id.clone(), team);
        self
    }

    pub fn with_merge_log_capacity(mut self, capacity: usize) -> Self {
        self.merge_log_capacity = capacity;
        self
    }
}

#[async_trait]
impl BaselineStore for MemoryStore {
    async fn load_global(&self) -> Result<GlobalBaseline, StoreError> {
        self.global
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::NotFound {
                record: "global baseline".to_string(),
                location: "memory".to_string(),
            })
    }

    async fn load_team(&self, team_id: &str) -> Result<TeamOverride, StoreError> {
        validate_team_id(team_id)?;
        self.teams
            .read()
            .await
            .get(team_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                record: format!("team override {team_id}"),
                location: "memory".to_string(),
            })
    }

    async fn save_global(&self, baseline: &GlobalBaseline) -> Result<GlobalBaseline, StoreError> {
        let mut guard = self.global.write().await;
        check_version(baseline.version, guard.as_ref().map(|current| current.version))?;
        let mut next = baseline.clone();
        next.version = baseline.version + 1;
        *guard = Some(next.clone());
        Ok(next)
    }

    async fn save_team(&self, team: &TeamOverride) -> Result<(), StoreError> {
        validate_team_id(&team.team_id)?;
        self.teams
            .write()
            .await
            .insert(team.team_id.clone(), team.clone());
        Ok(())
    }

    async fn append_merge_log(&self, entry: &MergeLogEntry) -> Result<(), StoreError> {
        let mut log = self.merge_log.write().await;
        push_bounded(&mut log, entry.clone(), self.merge_log_capacity);
        Ok(())
    }

    async fn load_merge_log(&self) -> Result<Vec<MergeLogEntry>, StoreError> {
        Ok(self.merge_log.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::fixtures::{global_baseline, ux_team};

    #[tokio::test]
    async fn empty_store_reports_not_found() {
        let store = MemoryStore::new();
        assert!(store.load_global().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn save_bumps_version_and_detects_stale_writers() {
        let store = MemoryStore::with_global(global_baseline()).with_team(ux_team());
        let loaded = store.load_global().await.expect("load");
        let saved = store.save_global(&loaded).await.expect("save");
        assert_eq!(saved.version, 1);
        assert!(store.save_global(&loaded).await.unwrap_err().is_retryable());
        assert_eq!(
            store.load_team("team-ux").await.expect("team").team_id,
            "team-ux"
        );
    }

    #[test]
    fn team_saves_replace_by_id() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let mut team = ux_team();
            store.save_team(&team).await.expect("save");
            team.commits_since_update = 7;
            store.save_team(&team).await.expect("resave");
            assert_eq!(store.load_team("team-ux").await.expect("load").commits_since_update, 7);
            assert!(matches!(
                store.load_team("../team-ux").await.unwrap_err(),
                StoreError::InvalidTeamId(_)
            ));
        });
    }

    #[tokio::test]
    async fn merge_log_is_bounded() {
        let store = MemoryStore::new().with_merge_log_capacity(2);
        assert!(store.load_merge_log().await.expect("empty log").is_empty());
        for team in ["team-ux", "team-backend", "team-qa"] {
            store
                .append_merge_log(&MergeLogEntry::new(team, false, "rejected"))
                .await
                .expect("append");
        }
        let log = store.load_merge_log().await.expect("log");
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].team_id, "team-backend");
    }
}
