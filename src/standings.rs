use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use rusqlite::Connection;

use crate::knockout;
use crate::normalize::Competition;
use crate::store::{self, PastFixture, StandingRow};

pub const PHASE_LEAGUE: &str = "league";
pub const PHASE_GROUP: &str = "group";
pub const PHASE_LEAGUE_PHASE: &str = "league_phase";

const FORM_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub team_id: i64,
    pub position: i64,
    pub played: i64,
    pub won: i64,
    pub draw: i64,
    pub lost: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_diff: i64,
    pub points: i64,
    /// Trailing results, oldest to newest, at most five.
    pub form: Vec<char>,
}

#[derive(Default)]
struct Acc {
    played: i64,
    won: i64,
    draw: i64,
    lost: i64,
    goals_for: i64,
    goals_against: i64,
    points: i64,
    results: Vec<char>,
}

/// Ranked table over a chronological slice of completed fixtures.
/// Tie-break chain: points desc, goal difference desc, goals for desc,
/// team id asc (stable final tie-break).
pub fn compute_table(fixtures: &[PastFixture]) -> Vec<TableRow> {
    let mut acc: HashMap<i64, Acc> = HashMap::new();
    for fx in fixtures {
        let (hs, aws) = (fx.home_score, fx.away_score);
        for (team_id, gf, ga) in [
            (fx.home_team_id, hs, aws),
            (fx.away_team_id, aws, hs),
        ] {
            let entry = acc.entry(team_id).or_default();
            entry.played += 1;
            entry.goals_for += gf;
            entry.goals_against += ga;
            let result = if gf > ga {
                entry.won += 1;
                entry.points += 3;
                'W'
            } else if gf < ga {
                entry.lost += 1;
                'L'
            } else {
                entry.draw += 1;
                entry.points += 1;
                'D'
            };
            entry.results.push(result);
        }
    }

    let mut rows: Vec<TableRow> = acc
        .into_iter()
        .map(|(team_id, a)| {
            let start = a.results.len().saturating_sub(FORM_LEN);
            TableRow {
                team_id,
                position: 0,
                played: a.played,
                won: a.won,
                draw: a.draw,
                lost: a.lost,
                goals_for: a.goals_for,
                goals_against: a.goals_against,
                goal_diff: a.goals_for - a.goals_against,
                points: a.points,
                form: a.results[start..].to_vec(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_diff.cmp(&a.goal_diff))
            .then(b.goals_for.cmp(&a.goals_for))
            .then(a.team_id.cmp(&b.team_id))
    });
    for (idx, row) in rows.iter_mut().enumerate() {
        row.position = idx as i64 + 1;
    }
    rows
}

pub fn form_json(form: &[char]) -> String {
    let letters: Vec<String> = form.iter().map(|c| c.to_string()).collect();
    serde_json::to_string(&letters).unwrap_or_else(|_| "[]".to_string())
}

fn to_standing_row(
    league_id: i64,
    season_id: i64,
    phase: &str,
    group_name: &str,
    row: &TableRow,
) -> StandingRow {
    StandingRow {
        league_id,
        season_id,
        phase: phase.to_string(),
        group_name: group_name.to_string(),
        team_id: row.team_id,
        position: row.position,
        matches_played: row.played,
        won: row.won,
        draw: row.draw,
        lost: row.lost,
        goals_for: row.goals_for,
        goals_against: row.goals_against,
        goal_diff: row.goal_diff,
        points: row.points,
        last5_form: form_json(&row.form),
    }
}

/// Full recompute of the single league table for one season.
pub fn build_league_standings_for_season(
    conn: &mut Connection,
    league_id: i64,
    season_id: i64,
) -> Result<usize> {
    let fixtures =
        store::load_past_fixtures(conn, league_id, season_id, Some(Competition::League))?;
    let rows: Vec<StandingRow> = compute_table(&fixtures)
        .iter()
        .map(|t| to_standing_row(league_id, season_id, PHASE_LEAGUE, "", t))
        .collect();
    store::upsert_standings(conn, &rows)
}

/// Group-stage fixtures split per group label; fixtures in the same stage
/// type without a group form the non-grouped league phase.
pub fn build_phase_standings_for_season(
    conn: &mut Connection,
    league_id: i64,
    season_id: i64,
) -> Result<usize> {
    let grouped = store::load_group_stage_fixtures(conn, league_id, season_id)?;
    let mut groups: BTreeMap<String, Vec<PastFixture>> = BTreeMap::new();
    let mut league_phase: Vec<PastFixture> = Vec::new();
    for g in grouped {
        match g.group_id {
            None => league_phase.push(g.fixture),
            Some(gid) => {
                let name = if g.group_name.trim().is_empty() {
                    format!("Group {gid}")
                } else {
                    g.group_name.trim().to_string()
                };
                groups.entry(name).or_default().push(g.fixture);
            }
        }
    }

    let mut rows = Vec::new();
    for (name, fixtures) in &groups {
        for t in compute_table(fixtures) {
            rows.push(to_standing_row(league_id, season_id, PHASE_GROUP, name, &t));
        }
    }
    if !league_phase.is_empty() {
        for t in compute_table(&league_phase) {
            rows.push(to_standing_row(
                league_id,
                season_id,
                PHASE_LEAGUE_PHASE,
                "",
                &t,
            ));
        }
    }
    store::upsert_standings(conn, &rows)
}

/// Rebuild every standings table derivable from the persisted fixtures.
pub fn build_all(conn: &mut Connection) -> Result<usize> {
    let mut total = 0usize;
    for (league_id, season_id) in store::season_pairs_by_competition(conn, Competition::League)? {
        total += build_league_standings_for_season(conn, league_id, season_id)?;
    }
    for (league_id, season_id) in store::season_pairs_by_competition(conn, Competition::Europe)? {
        total += build_phase_standings_for_season(conn, league_id, season_id)?;
    }
    Ok(total)
}

/// Light refresh limited to seasons flagged current: league tables for
/// domestic leagues, phase tables for international cups, knockout ties for
/// both cup kinds.
pub fn refresh_current(conn: &mut Connection) -> Result<usize> {
    let mut total = 0usize;
    for season in store::current_seasons(conn)? {
        match store::league_competition(conn, season.league_id)? {
            Competition::League => {
                total +=
                    build_league_standings_for_season(conn, season.league_id, season.season_id)?;
            }
            Competition::Europe => {
                total +=
                    build_phase_standings_for_season(conn, season.league_id, season.season_id)?;
                total +=
                    knockout::build_ties_for_season(conn, season.league_id, season.season_id)?;
            }
            Competition::DomesticCup => {
                total +=
                    knockout::build_ties_for_season(conn, season.league_id, season.season_id)?;
            }
        }
    }
    Ok(total)
}

/// Positive when the team climbed with its latest result (7th -> 5th is +2).
pub fn rank_delta_since_last_match(
    conn: &Connection,
    league_id: i64,
    season_id: i64,
    team_id: i64,
) -> Result<(i64, &'static str)> {
    let Some(cutoff) = store::last_completed_fixture_time(conn, league_id, season_id, team_id)?
    else {
        return Ok((0, "-"));
    };
    let before = positions_asof(conn, league_id, season_id, &cutoff, false)?;
    let after = positions_asof(conn, league_id, season_id, &cutoff, true)?;
    let (Some(pos_before), Some(pos_after)) = (before.get(&team_id), after.get(&team_id)) else {
        return Ok((0, "-"));
    };
    let delta = pos_before - pos_after;
    let symbol = match delta.cmp(&0) {
        std::cmp::Ordering::Greater => "up",
        std::cmp::Ordering::Less => "down",
        std::cmp::Ordering::Equal => "-",
    };
    Ok((delta, symbol))
}

fn positions_asof(
    conn: &Connection,
    league_id: i64,
    season_id: i64,
    cutoff: &str,
    inclusive: bool,
) -> Result<HashMap<i64, i64>> {
    let fixtures =
        store::load_past_fixtures_until(conn, league_id, season_id, cutoff, inclusive)?;
    Ok(compute_table(&fixtures)
        .into_iter()
        .map(|row| (row.team_id, row.position))
        .collect())
}
