use std::path::PathBuf;

use anyhow::{Result, anyhow};

pub const DEFAULT_LEAGUE_NAMES: &[&str] = &[
    "Premier League",
    "La Liga",
    "Serie A",
    "Bundesliga",
    "Ligue 1",
];

// Provider league ids used as classification fallback when sub_type is
// missing from league metadata.
pub const EURO_LEAGUE_IDS: &[i64] = &[2, 5, 2286];
pub const DOMESTIC_CUP_LEAGUE_IDS: &[i64] = &[24, 27, 390, 570];

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: String,
    pub db_path: PathBuf,
    pub league_names: Vec<String>,
    pub euro_league_ids: Vec<i64>,
    pub domestic_cup_league_ids: Vec<i64>,
    pub season_year_min: i32,
    pub season_year_max: i32,
    pub max_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_base_url = require_env("FOOTBALL_API_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let api_token = require_env("FOOTBALL_API_TOKEN")?;

        let db_path = db_path_from_env();

        let league_names = std::env::var("FOOTBALL_LEAGUE_NAMES")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_LEAGUE_NAMES
                    .iter()
                    .map(|name| name.to_string())
                    .collect()
            });

        let euro_league_ids = ids_env_or_default("FOOTBALL_EURO_LEAGUE_IDS", EURO_LEAGUE_IDS);
        let domestic_cup_league_ids =
            ids_env_or_default("FOOTBALL_CUP_LEAGUE_IDS", DOMESTIC_CUP_LEAGUE_IDS);

        let season_year_min = int_env_or("SEASON_YEAR_MIN", 2017);
        let season_year_max = int_env_or("SEASON_YEAR_MAX", 2025);
        let max_retries = std::env::var("FETCH_MAX_RETRIES")
            .ok()
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(6)
            .clamp(1, 20);

        Ok(Self {
            api_base_url,
            api_token,
            db_path,
            league_names,
            euro_league_ids,
            domestic_cup_league_ids,
            season_year_min,
            season_year_max,
            max_retries,
        })
    }
}

/// Resolve the sqlite path without requiring the API credentials, for the
/// derive-only entry points.
pub fn db_path_from_env() -> PathBuf {
    std::env::var("FOOTBALL_DB_PATH")
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("matchday.sqlite"))
}

fn require_env(key: &str) -> Result<String> {
    let value = std::env::var(key).map_err(|_| anyhow!("{key} is missing from the environment"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("{key} is empty"));
    }
    Ok(value)
}

fn int_env_or(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn ids_env_or_default(key: &str, defaults: &[i64]) -> Vec<i64> {
    let Some(raw) = std::env::var(key).ok().filter(|r| !r.trim().is_empty()) else {
        return defaults.to_vec();
    };
    let ids = raw
        .split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .filter(|id| *id != 0)
        .collect::<Vec<_>>();
    if ids.is_empty() { defaults.to_vec() } else { ids }
}
