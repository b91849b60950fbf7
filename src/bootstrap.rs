use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{LeagueMeta, RunCache, SeasonInfo};
use crate::config::Config;
use crate::knockout;
use crate::normalize::{self, Competition, as_i64_any};
use crate::provider::ApiClient;
use crate::store::{
    self, FixtureRow, GroupRow, LeagueRow, SeasonRow, StageRow, TeamRow,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapSummary {
    pub leagues: usize,
    pub seasons: usize,
    pub teams: usize,
    pub domestic_fixtures: usize,
    pub europe_fixtures: usize,
    pub cup_fixtures: usize,
    pub ties: usize,
}

impl BootstrapSummary {
    pub fn rows_total(&self) -> usize {
        self.leagues
            + self.seasons
            + self.teams
            + self.domestic_fixtures
            + self.europe_fixtures
            + self.cup_fixtures
            + self.ties
    }
}

/// Full bootstrap: league resolution, seasons in the configured window,
/// teams, fixtures per competition variant, knockout winner backfill. Every
/// write is an upsert, so an aborted run is safe to re-run as-is.
pub fn run(client: &ApiClient, conn: &mut Connection, cfg: &Config) -> Result<BootstrapSummary> {
    let run_id = store::begin_ingest_run(conn, "bootstrap")?;
    let cache = RunCache::new();
    let mut summary = BootstrapSummary::default();
    match run_steps(client, conn, cfg, &cache, &mut summary) {
        Ok(()) => {
            store::finish_ingest_run(conn, run_id, summary.rows_total(), &[])?;
            println!(
                "[summary] {}",
                serde_json::to_string(&summary).unwrap_or_default()
            );
            Ok(summary)
        }
        Err(err) => {
            let _ = store::finish_ingest_run(
                conn,
                run_id,
                summary.rows_total(),
                &[format!("{err:#}")],
            );
            Err(err)
        }
    }
}

fn run_steps(
    client: &ApiClient,
    conn: &mut Connection,
    cfg: &Config,
    cache: &RunCache,
    summary: &mut BootstrapSummary,
) -> Result<()> {
    summary.leagues = ensure_leagues_by_name(client, conn, cache, &cfg.league_names)?;
    summary.seasons = upsert_seasons_for_cached_leagues(client, conn, cache, cfg)?;

    let states = client.states_map().context("fetch states map")?;

    summary.teams = upsert_teams_for_seasons(client, conn, cache)?;
    summary.domestic_fixtures = ingest_domestic_leagues(client, conn, cache, &states)?;

    // Top-flight team sets per start year, before the cup steps add their
    // own seasons to the cache.
    let year_to_teams = top_flight_teams_by_year(cache);

    summary.europe_fixtures = ingest_cup_seasons(
        client,
        conn,
        cache,
        cfg,
        &states,
        &cfg.euro_league_ids,
        Competition::Europe,
        None,
    )?;
    println!("[fixtures] international cups: upserted {}", summary.europe_fixtures);

    summary.cup_fixtures = ingest_cup_seasons(
        client,
        conn,
        cache,
        cfg,
        &states,
        &cfg.domestic_cup_league_ids,
        Competition::DomesticCup,
        Some(&year_to_teams),
    )?;
    println!("[fixtures] domestic cups (top-flight related): upserted {}", summary.cup_fixtures);

    summary.ties = knockout::backfill_all(conn)?;
    println!("[knockout_ties] backfilled: {}", summary.ties);

    Ok(())
}

/// Resolve league identities by name search, keeping the best-scoring
/// candidate per query.
fn ensure_leagues_by_name(
    client: &ApiClient,
    conn: &mut Connection,
    cache: &RunCache,
    names: &[String],
) -> Result<usize> {
    let mut rows = Vec::new();
    for name in names {
        let results = client
            .search_leagues(name)
            .with_context(|| format!("search leagues for {name:?}"))?;
        let Some(best) = pick_best_league(&results, name) else {
            continue;
        };
        let Some(league_id) = best.get("id").and_then(as_i64_any) else {
            continue;
        };
        let league_name = best
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(name)
            .to_string();
        let image_path = best
            .get("image_path")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let sub_type = best
            .get("sub_type")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        cache.insert_league(
            league_id,
            LeagueMeta {
                name: league_name.clone(),
                image_path: image_path.clone(),
                sub_type: sub_type.clone(),
            },
        );
        rows.push(LeagueRow {
            league_id,
            name: league_name,
            image_path,
            sub_type,
        });
    }
    let count = store::upsert_leagues(conn, &rows)?;
    println!("[leagues] upserted: {count}");
    Ok(count)
}

/// Exact/substring name match plus a domestic bonus and a play-off penalty;
/// first candidate wins among score ties.
fn pick_best_league<'a>(results: &'a [Value], query: &str) -> Option<&'a Value> {
    let q = query.to_lowercase();
    let mut best: Option<(i32, &Value)> = None;
    for candidate in results {
        let name = candidate
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();
        let league_type = candidate.get("type").and_then(|v| v.as_str()).unwrap_or("");
        let sub_type = candidate
            .get("sub_type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();
        let mut score = 0i32;
        if league_type == "league" {
            score += 2;
        }
        if name.contains(&q) {
            score += 3;
        }
        if sub_type == "domestic" {
            score += 2;
        }
        if sub_type.contains("play") {
            score -= 2;
        }
        match best {
            Some((best_score, _)) if best_score >= score => {}
            _ => best = Some((score, candidate)),
        }
    }
    best.map(|(_, candidate)| candidate)
}

fn ensure_league_by_id(
    client: &ApiClient,
    conn: &mut Connection,
    cache: &RunCache,
    league_id: i64,
) -> Result<()> {
    if cache.league_meta(league_id).is_some() {
        return Ok(());
    }
    let info = client.get_league(league_id)?;
    if info.is_null() {
        return Ok(());
    }
    let name = info
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Ok(());
    }
    let image_path = info
        .get("image_path")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let sub_type = info
        .get("sub_type")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    cache.insert_league(
        league_id,
        LeagueMeta {
            name: name.clone(),
            image_path: image_path.clone(),
            sub_type: sub_type.clone(),
        },
    );
    store::upsert_leagues(
        conn,
        &[LeagueRow {
            league_id,
            name,
            image_path,
            sub_type,
        }],
    )?;
    Ok(())
}

fn upsert_seasons_for_cached_leagues(
    client: &ApiClient,
    conn: &mut Connection,
    cache: &RunCache,
    cfg: &Config,
) -> Result<usize> {
    let mut rows = Vec::new();
    for league_id in cache.league_ids() {
        let league = client
            .get_league_with_seasons(league_id)
            .with_context(|| format!("fetch seasons of league {league_id}"))?;
        for season in normalize::as_list(league.get("seasons")) {
            let Some(year) = normalize::season_start_year(season) else {
                continue;
            };
            if year < cfg.season_year_min || year > cfg.season_year_max {
                continue;
            }
            let Some(season_id) = season.get("id").and_then(as_i64_any) else {
                continue;
            };
            let name = season
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            rows.push(SeasonRow {
                season_id,
                league_id,
                name: name.clone(),
                is_current: season
                    .get("is_current")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                starting_at: normalize::normalize_datetime_str(
                    season.get("starting_at").and_then(|v| v.as_str()),
                ),
                ending_at: normalize::normalize_datetime_str(
                    season.get("ending_at").and_then(|v| v.as_str()),
                ),
            });
            cache.add_season(
                season_id,
                SeasonInfo {
                    league_id,
                    name,
                    start_year: Some(year),
                },
            );
        }
    }
    let count = store::upsert_seasons(conn, &rows)?;
    println!("[seasons] upserted: {count}");
    Ok(count)
}

/// Team lists fetched per season in parallel; writes stay serial.
fn upsert_teams_for_seasons(
    client: &ApiClient,
    conn: &mut Connection,
    cache: &RunCache,
) -> Result<usize> {
    let season_ids = cache.all_season_ids();
    let fetched: Vec<Result<(i64, Vec<TeamRow>)>> = season_ids
        .par_iter()
        .map(|season_id| {
            let mut rows = Vec::new();
            for item in client.teams_by_season(*season_id) {
                let team = item.with_context(|| format!("fetch teams of season {season_id}"))?;
                let Some(team_id) = team.get("id").and_then(as_i64_any) else {
                    continue;
                };
                let Some(name) = team.get("name").and_then(|v| v.as_str()) else {
                    continue;
                };
                rows.push(TeamRow {
                    team_id,
                    name: name.to_string(),
                    short_code: team
                        .get("short_code")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    image_path: team
                        .get("image_path")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                });
            }
            Ok((*season_id, rows))
        })
        .collect();

    let mut total = 0usize;
    for result in fetched {
        let (season_id, rows) = result?;
        cache.record_season_teams(season_id, rows.iter().map(|r| r.team_id).collect());
        total += store::upsert_teams(conn, &rows)?;
        println!("[teams] season {season_id} upserted: {}", rows.len());
    }
    Ok(total)
}

/// Domestic leagues: season-filtered fixture feed for every cached season.
fn ingest_domestic_leagues(
    client: &ApiClient,
    conn: &mut Connection,
    cache: &RunCache,
    states: &HashMap<i64, String>,
) -> Result<usize> {
    let mut total = 0usize;
    let mut seen_teams = HashSet::new();
    for league_id in cache.league_ids() {
        let sub_type = cache.league_meta(league_id).and_then(|m| m.sub_type);
        let competition =
            normalize::classify_competition_for_league(league_id, sub_type.as_deref());
        for season_id in cache.seasons_of(league_id) {
            let mut fixture_rows = Vec::new();
            let mut team_rows = Vec::new();
            for item in client.fixtures_by_season(season_id) {
                let fx = item.with_context(|| format!("fetch fixtures of season {season_id}"))?;
                team_rows.extend(team_rows_from_participants(
                    normalize::as_list(fx.get("participants")),
                    &mut seen_teams,
                ));
                if let Some(row) =
                    fixture_row_from_value(&fx, season_id, league_id, competition, states)
                {
                    fixture_rows.push(row);
                }
            }
            store::upsert_teams(conn, &team_rows)?;
            total += store::upsert_fixtures(conn, &fixture_rows)?;
        }
    }
    println!("[fixtures] domestic leagues: upserted {total}");
    Ok(total)
}

/// Full per-season ingest for cup competitions: stage/group metadata,
/// season start/end backfill from fixture extremes, optional restriction to
/// fixtures touching an allowed team set per start year.
fn ingest_cup_seasons(
    client: &ApiClient,
    conn: &mut Connection,
    cache: &RunCache,
    cfg: &Config,
    states: &HashMap<i64, String>,
    league_ids: &[i64],
    competition: Competition,
    allowed_teams: Option<&HashMap<i32, HashSet<i64>>>,
) -> Result<usize> {
    let mut total = 0usize;
    let mut seen_teams = HashSet::new();
    for &league_id in league_ids {
        ensure_league_by_id(client, conn, cache, league_id)?;
        let league = client
            .get_league_with_seasons(league_id)
            .with_context(|| format!("fetch seasons of league {league_id}"))?;
        for season in normalize::as_list(league.get("seasons")) {
            let Some(year) = normalize::season_start_year(season) else {
                continue;
            };
            if year < cfg.season_year_min || year > cfg.season_year_max {
                continue;
            }
            let Some(season_id) = season.get("id").and_then(as_i64_any) else {
                continue;
            };
            let allowed = match allowed_teams {
                Some(by_year) => match by_year.get(&year) {
                    Some(teams) if !teams.is_empty() => Some(teams),
                    _ => continue,
                },
                None => None,
            };

            let fixtures: Vec<Value> = client
                .fixtures_by_season(season_id)
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("fetch fixtures of season {season_id}"))?;

            upsert_season_with_backfill(conn, cache, season, season_id, league_id, year, &fixtures)?;

            let mut stage_rows: Vec<StageRow> = Vec::new();
            let mut group_rows: Vec<GroupRow> = Vec::new();
            let mut team_rows = Vec::new();
            let mut fixture_rows = Vec::new();
            for fx in &fixtures {
                let participants = normalize::as_list(fx.get("participants"));
                if let Some(allowed) = allowed {
                    let touches_allowed = participants
                        .iter()
                        .filter_map(|p| p.get("id").and_then(as_i64_any))
                        .any(|id| allowed.contains(&id));
                    if !touches_allowed {
                        continue;
                    }
                }
                team_rows.extend(team_rows_from_participants(participants, &mut seen_teams));
                if let Some(stage) = stage_row_from_value(fx, league_id, season_id) {
                    stage_rows.push(stage);
                }
                if let Some(group) = group_row_from_value(fx, league_id, season_id) {
                    group_rows.push(group);
                }
                if let Some(row) =
                    fixture_row_from_value(fx, season_id, league_id, competition, states)
                {
                    fixture_rows.push(row);
                }
            }
            dedup_by_key(&mut stage_rows, |s| s.stage_id);
            dedup_by_key(&mut group_rows, |g| g.group_id);

            store::upsert_stages(conn, &stage_rows)?;
            store::upsert_stage_groups(conn, &group_rows)?;
            store::upsert_teams(conn, &team_rows)?;
            total += store::upsert_fixtures(conn, &fixture_rows)?;
        }
    }
    Ok(total)
}

/// Season start/end fall back to the min/max fixture kickoff when the
/// provider omits them.
fn upsert_season_with_backfill(
    conn: &mut Connection,
    cache: &RunCache,
    season: &Value,
    season_id: i64,
    league_id: i64,
    year: i32,
    fixtures: &[Value],
) -> Result<()> {
    let mut starting_at =
        normalize::normalize_datetime_str(season.get("starting_at").and_then(|v| v.as_str()));
    let mut ending_at =
        normalize::normalize_datetime_str(season.get("ending_at").and_then(|v| v.as_str()));
    if starting_at.is_none() || ending_at.is_none() {
        let mut kickoffs: Vec<String> = fixtures
            .iter()
            .filter_map(|fx| {
                normalize::normalize_datetime_str(fx.get("starting_at").and_then(|v| v.as_str()))
            })
            .collect();
        kickoffs.sort();
        starting_at = starting_at.or_else(|| kickoffs.first().cloned());
        ending_at = ending_at.or_else(|| kickoffs.last().cloned());
    }
    let name = season
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    store::upsert_seasons(
        conn,
        &[SeasonRow {
            season_id,
            league_id,
            name: name.clone(),
            is_current: season
                .get("is_current")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            starting_at,
            ending_at,
        }],
    )?;
    cache.add_season(
        season_id,
        SeasonInfo {
            league_id,
            name,
            start_year: Some(year),
        },
    );
    Ok(())
}

/// Teams seen in the cached top-flight seasons, keyed by start year. Used
/// to restrict domestic cup ingestion without refetching squad lists.
fn top_flight_teams_by_year(cache: &RunCache) -> HashMap<i32, HashSet<i64>> {
    let mut out: HashMap<i32, HashSet<i64>> = HashMap::new();
    for season_id in cache.all_season_ids() {
        let Some(info) = cache.season_info(season_id) else {
            continue;
        };
        let Some(year) = info.start_year else {
            continue;
        };
        let Some(team_ids) = cache.season_teams(season_id) else {
            continue;
        };
        out.entry(year).or_default().extend(team_ids);
    }
    out
}

/// Teams upserted opportunistically whenever encountered as participants.
fn team_rows_from_participants(
    participants: &[Value],
    seen: &mut HashSet<i64>,
) -> Vec<TeamRow> {
    let mut rows = Vec::new();
    for p in participants {
        let Some(team_id) = p.get("id").and_then(as_i64_any) else {
            continue;
        };
        if !seen.insert(team_id) {
            continue;
        }
        let name = p.get("name").and_then(|v| v.as_str()).unwrap_or("").trim();
        if name.is_empty() {
            continue;
        }
        rows.push(TeamRow {
            team_id,
            name: name.to_string(),
            short_code: p
                .get("short_code")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            image_path: p
                .get("image_path")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        });
    }
    rows
}

fn stage_row_from_value(fx: &Value, league_id: i64, season_id: i64) -> Option<StageRow> {
    let stage = fx.get("stage")?;
    let stage_id = stage.get("id").and_then(|v| v.as_i64())?;
    let type_id = stage.get("type_id").and_then(|v| v.as_i64())?;
    let name = stage.get("name").and_then(|v| v.as_str())?.trim();
    if name.is_empty() {
        return None;
    }
    Some(StageRow {
        stage_id,
        league_id,
        season_id,
        type_id,
        name: name.to_string(),
    })
}

fn group_row_from_value(fx: &Value, league_id: i64, season_id: i64) -> Option<GroupRow> {
    let group = fx.get("group")?;
    let group_id = group.get("id").and_then(|v| v.as_i64())?;
    let name = group.get("name").and_then(|v| v.as_str())?.trim();
    let stage_id = fx.get("stage").and_then(|s| s.get("id")).and_then(|v| v.as_i64())?;
    if name.is_empty() {
        return None;
    }
    Some(GroupRow {
        group_id,
        stage_id,
        league_id,
        season_id,
        name: name.to_string(),
    })
}

fn dedup_by_key<T, K: Ord + Copy>(rows: &mut Vec<T>, key: impl Fn(&T) -> K) {
    rows.sort_by_key(|r| key(r));
    rows.dedup_by_key(|r| key(r));
}

/// One canonical fixture row from a raw provider payload. Fixtures without
/// an id or a parseable kickoff are dropped rather than errored.
pub fn fixture_row_from_value(
    fx: &Value,
    season_id: i64,
    league_id: i64,
    competition: Competition,
    states: &HashMap<i64, String>,
) -> Option<FixtureRow> {
    let fixture_id = fx.get("id").and_then(as_i64_any)?;
    let starting_at =
        normalize::normalize_datetime_str(fx.get("starting_at").and_then(|v| v.as_str()))?;

    let participants = normalize::as_list(fx.get("participants"));
    let scores = normalize::as_list(fx.get("scores"));
    let (home_team_id, away_team_id) = normalize::resolve_home_away(participants, scores);

    let state_code = fx
        .get("state")
        .and_then(|s| s.get("code"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| {
            fx.get("state_id")
                .and_then(|v| v.as_i64())
                .and_then(|id| states.get(&id).cloned())
        });
    let status = normalize::classify_state(state_code.as_deref());

    let mut home_score = fx.get("home_score").and_then(|v| v.as_i64());
    let mut away_score = fx.get("away_score").and_then(|v| v.as_i64());
    if home_score.is_none() && away_score.is_none() {
        (home_score, away_score) = normalize::extract_scores(scores);
    }
    let (home_penalty_score, away_penalty_score) = normalize::extract_penalty_scores(scores);

    let stage = fx.get("stage");
    let group = fx.get("group");
    Some(FixtureRow {
        fixture_id,
        season_id,
        league_id,
        home_team_id,
        away_team_id,
        competition,
        round_name: normalize::round_name(fx),
        stage_type_id: stage.and_then(|s| s.get("type_id")).and_then(|v| v.as_i64()),
        stage_id: stage.and_then(|s| s.get("id")).and_then(|v| v.as_i64()),
        group_id: group.and_then(|g| g.get("id")).and_then(|v| v.as_i64()),
        leg_number: normalize::parse_leg(fx.get("leg")),
        status: status.as_str(),
        starting_at: Some(starting_at),
        home_score,
        away_score,
        home_penalty_score,
        away_penalty_score,
    })
}
