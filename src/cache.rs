use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct LeagueMeta {
    pub name: String,
    pub image_path: Option<String>,
    pub sub_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SeasonInfo {
    pub league_id: i64,
    pub name: Option<String>,
    pub start_year: Option<i32>,
}

/// Run-scoped mapping from provider ids to metadata, shared across pipeline
/// stages to avoid refetching within one ingestion run. Passed explicitly,
/// never global; safe for concurrent read / insert-if-absent access.
#[derive(Default)]
pub struct RunCache {
    league_meta: Mutex<HashMap<i64, LeagueMeta>>,
    league_seasons: Mutex<HashMap<i64, Vec<i64>>>,
    season_info: Mutex<HashMap<i64, SeasonInfo>>,
    season_teams: Mutex<HashMap<i64, Vec<i64>>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_league(&self, league_id: i64, meta: LeagueMeta) {
        let mut guard = self.league_meta.lock().expect("league meta lock poisoned");
        guard.entry(league_id).or_insert(meta);
    }

    pub fn league_meta(&self, league_id: i64) -> Option<LeagueMeta> {
        let guard = self.league_meta.lock().expect("league meta lock poisoned");
        guard.get(&league_id).cloned()
    }

    pub fn league_ids(&self) -> Vec<i64> {
        let guard = self.league_meta.lock().expect("league meta lock poisoned");
        let mut ids: Vec<i64> = guard.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn add_season(&self, season_id: i64, info: SeasonInfo) {
        {
            let mut guard = self
                .league_seasons
                .lock()
                .expect("league seasons lock poisoned");
            let seasons = guard.entry(info.league_id).or_default();
            if !seasons.contains(&season_id) {
                seasons.push(season_id);
            }
        }
        let mut guard = self.season_info.lock().expect("season info lock poisoned");
        guard.entry(season_id).or_insert(info);
    }

    pub fn seasons_of(&self, league_id: i64) -> Vec<i64> {
        let guard = self
            .league_seasons
            .lock()
            .expect("league seasons lock poisoned");
        let mut seasons = guard.get(&league_id).cloned().unwrap_or_default();
        seasons.sort_unstable();
        seasons.dedup();
        seasons
    }

    pub fn season_info(&self, season_id: i64) -> Option<SeasonInfo> {
        let guard = self.season_info.lock().expect("season info lock poisoned");
        guard.get(&season_id).cloned()
    }

    pub fn all_season_ids(&self) -> Vec<i64> {
        let guard = self.season_info.lock().expect("season info lock poisoned");
        let mut ids: Vec<i64> = guard.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn record_season_teams(&self, season_id: i64, team_ids: Vec<i64>) {
        let mut guard = self.season_teams.lock().expect("season teams lock poisoned");
        guard.insert(season_id, team_ids);
    }

    pub fn season_teams(&self, season_id: i64) -> Option<Vec<i64>> {
        let guard = self.season_teams.lock().expect("season teams lock poisoned");
        guard.get(&season_id).cloned()
    }
}
