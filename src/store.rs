use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, Transaction, params};

use crate::normalize::{Competition, STAGE_TYPE_GROUP, classify_competition_for_league};

const UPSERT_CHUNK: usize = 500;

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS leagues (
            league_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            image_path TEXT NULL,
            sub_type TEXT NULL
        );
        CREATE TABLE IF NOT EXISTS seasons (
            season_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            name TEXT NULL,
            is_current INTEGER NOT NULL,
            starting_at TEXT NULL,
            ending_at TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_seasons_league ON seasons(league_id);
        CREATE TABLE IF NOT EXISTS teams (
            team_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            short_code TEXT NULL,
            image_path TEXT NULL
        );
        CREATE TABLE IF NOT EXISTS fixtures (
            fixture_id INTEGER PRIMARY KEY,
            season_id INTEGER NOT NULL,
            league_id INTEGER NOT NULL,
            home_team_id INTEGER NULL,
            away_team_id INTEGER NULL,
            competition_type TEXT NOT NULL,
            round_name TEXT NOT NULL,
            stage_type_id INTEGER NULL,
            stage_id INTEGER NULL,
            group_id INTEGER NULL,
            leg_number INTEGER NULL,
            status TEXT NOT NULL,
            starting_at TEXT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            home_penalty_score INTEGER NULL,
            away_penalty_score INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fixtures_league_season ON fixtures(league_id, season_id);
        CREATE INDEX IF NOT EXISTS idx_fixtures_status ON fixtures(status);
        CREATE INDEX IF NOT EXISTS idx_fixtures_starting_at ON fixtures(starting_at);
        CREATE TABLE IF NOT EXISTS stages (
            stage_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            season_id INTEGER NOT NULL,
            type_id INTEGER NOT NULL,
            name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS stage_groups (
            group_id INTEGER PRIMARY KEY,
            stage_id INTEGER NOT NULL,
            league_id INTEGER NOT NULL,
            season_id INTEGER NOT NULL,
            name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS standings (
            league_id INTEGER NOT NULL,
            season_id INTEGER NOT NULL,
            phase TEXT NOT NULL,
            group_name TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            matches_played INTEGER NOT NULL,
            won INTEGER NOT NULL,
            draw INTEGER NOT NULL,
            lost INTEGER NOT NULL,
            goals_for INTEGER NOT NULL,
            goals_against INTEGER NOT NULL,
            goal_diff INTEGER NOT NULL,
            points INTEGER NOT NULL,
            last5_form TEXT NOT NULL,
            PRIMARY KEY (league_id, season_id, phase, group_name, team_id)
        );
        CREATE TABLE IF NOT EXISTS knockout_ties (
            league_id INTEGER NOT NULL,
            season_id INTEGER NOT NULL,
            round_name TEXT NOT NULL,
            team1_id INTEGER NOT NULL,
            team2_id INTEGER NOT NULL,
            leg1_fixture_id INTEGER NULL,
            leg1_home_team_id INTEGER NULL,
            leg1_away_team_id INTEGER NULL,
            leg1_home_score INTEGER NULL,
            leg1_away_score INTEGER NULL,
            leg2_fixture_id INTEGER NULL,
            leg2_home_team_id INTEGER NULL,
            leg2_away_team_id INTEGER NULL,
            leg2_home_score INTEGER NULL,
            leg2_away_score INTEGER NULL,
            aggregate_team1 INTEGER NOT NULL,
            aggregate_team2 INTEGER NOT NULL,
            winner_team_id INTEGER NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (league_id, season_id, round_name, team1_id, team2_id)
        );
        CREATE TABLE IF NOT EXISTS points_pace (
            league_id INTEGER NOT NULL,
            season_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            round_no INTEGER NOT NULL,
            match_date TEXT NOT NULL,
            cumulative_points INTEGER NOT NULL,
            PRIMARY KEY (league_id, season_id, team_id, round_no)
        );
        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            step TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            rows_upserted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LeagueRow {
    pub league_id: i64,
    pub name: String,
    pub image_path: Option<String>,
    pub sub_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SeasonRow {
    pub season_id: i64,
    pub league_id: i64,
    pub name: Option<String>,
    pub is_current: bool,
    pub starting_at: Option<String>,
    pub ending_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TeamRow {
    pub team_id: i64,
    pub name: String,
    pub short_code: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FixtureRow {
    pub fixture_id: i64,
    pub season_id: i64,
    pub league_id: i64,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub competition: Competition,
    pub round_name: String,
    pub stage_type_id: Option<i64>,
    pub stage_id: Option<i64>,
    pub group_id: Option<i64>,
    pub leg_number: Option<i64>,
    pub status: &'static str,
    pub starting_at: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub home_penalty_score: Option<i64>,
    pub away_penalty_score: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StageRow {
    pub stage_id: i64,
    pub league_id: i64,
    pub season_id: i64,
    pub type_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub group_id: i64,
    pub stage_id: i64,
    pub league_id: i64,
    pub season_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StandingRow {
    pub league_id: i64,
    pub season_id: i64,
    pub phase: String,
    pub group_name: String,
    pub team_id: i64,
    pub position: i64,
    pub matches_played: i64,
    pub won: i64,
    pub draw: i64,
    pub lost: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_diff: i64,
    pub points: i64,
    pub last5_form: String,
}

#[derive(Debug, Clone)]
pub struct TieRow {
    pub league_id: i64,
    pub season_id: i64,
    pub round_name: String,
    pub team1_id: i64,
    pub team2_id: i64,
    pub leg1_fixture_id: Option<i64>,
    pub leg1_home_team_id: Option<i64>,
    pub leg1_away_team_id: Option<i64>,
    pub leg1_home_score: Option<i64>,
    pub leg1_away_score: Option<i64>,
    pub leg2_fixture_id: Option<i64>,
    pub leg2_home_team_id: Option<i64>,
    pub leg2_away_team_id: Option<i64>,
    pub leg2_home_score: Option<i64>,
    pub leg2_away_score: Option<i64>,
    pub aggregate_team1: i64,
    pub aggregate_team2: i64,
    pub winner_team_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PaceRow {
    pub league_id: i64,
    pub season_id: i64,
    pub team_id: i64,
    pub round_no: i64,
    pub match_date: String,
    pub cumulative_points: i64,
}

fn upsert_chunked<T>(
    conn: &mut Connection,
    rows: &[T],
    bind: impl Fn(&Transaction<'_>, &T) -> Result<()>,
) -> Result<usize> {
    let mut written = 0usize;
    for chunk in rows.chunks(UPSERT_CHUNK) {
        let tx = conn.transaction().context("begin upsert transaction")?;
        for row in chunk {
            bind(&tx, row)?;
            written += 1;
        }
        tx.commit().context("commit upsert transaction")?;
    }
    Ok(written)
}

pub fn upsert_leagues(conn: &mut Connection, rows: &[LeagueRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO leagues (league_id, name, image_path, sub_type)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(league_id) DO UPDATE SET
                name = excluded.name,
                image_path = excluded.image_path,
                sub_type = excluded.sub_type
            "#,
            params![r.league_id, r.name, r.image_path, r.sub_type],
        )
        .context("upsert league")?;
        Ok(())
    })
}

pub fn upsert_seasons(conn: &mut Connection, rows: &[SeasonRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO seasons (season_id, league_id, name, is_current, starting_at, ending_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(season_id) DO UPDATE SET
                league_id = excluded.league_id,
                name = excluded.name,
                is_current = excluded.is_current,
                starting_at = excluded.starting_at,
                ending_at = excluded.ending_at
            "#,
            params![
                r.season_id,
                r.league_id,
                r.name,
                r.is_current as i64,
                r.starting_at,
                r.ending_at
            ],
        )
        .context("upsert season")?;
        Ok(())
    })
}

pub fn upsert_teams(conn: &mut Connection, rows: &[TeamRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO teams (team_id, name, short_code, image_path)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(team_id) DO UPDATE SET
                name = excluded.name,
                short_code = excluded.short_code,
                image_path = excluded.image_path
            "#,
            params![r.team_id, r.name, r.short_code, r.image_path],
        )
        .context("upsert team")?;
        Ok(())
    })
}

pub fn upsert_fixtures(conn: &mut Connection, rows: &[FixtureRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO fixtures (
                fixture_id, season_id, league_id,
                home_team_id, away_team_id,
                competition_type, round_name, stage_type_id, stage_id, group_id,
                leg_number, status, starting_at,
                home_score, away_score, home_penalty_score, away_penalty_score
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(fixture_id) DO UPDATE SET
                season_id = excluded.season_id,
                league_id = excluded.league_id,
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                competition_type = excluded.competition_type,
                round_name = excluded.round_name,
                stage_type_id = excluded.stage_type_id,
                stage_id = excluded.stage_id,
                group_id = excluded.group_id,
                leg_number = excluded.leg_number,
                status = excluded.status,
                starting_at = excluded.starting_at,
                home_score = excluded.home_score,
                away_score = excluded.away_score,
                home_penalty_score = excluded.home_penalty_score,
                away_penalty_score = excluded.away_penalty_score
            "#,
            params![
                r.fixture_id,
                r.season_id,
                r.league_id,
                r.home_team_id,
                r.away_team_id,
                r.competition.as_str(),
                r.round_name,
                r.stage_type_id,
                r.stage_id,
                r.group_id,
                r.leg_number,
                r.status,
                r.starting_at,
                r.home_score,
                r.away_score,
                r.home_penalty_score,
                r.away_penalty_score
            ],
        )
        .context("upsert fixture")?;
        Ok(())
    })
}

pub fn upsert_stages(conn: &mut Connection, rows: &[StageRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO stages (stage_id, league_id, season_id, type_id, name)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(stage_id) DO UPDATE SET
                league_id = excluded.league_id,
                season_id = excluded.season_id,
                type_id = excluded.type_id,
                name = excluded.name
            "#,
            params![r.stage_id, r.league_id, r.season_id, r.type_id, r.name],
        )
        .context("upsert stage")?;
        Ok(())
    })
}

pub fn upsert_stage_groups(conn: &mut Connection, rows: &[GroupRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO stage_groups (group_id, stage_id, league_id, season_id, name)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(group_id) DO UPDATE SET
                stage_id = excluded.stage_id,
                league_id = excluded.league_id,
                season_id = excluded.season_id,
                name = excluded.name
            "#,
            params![r.group_id, r.stage_id, r.league_id, r.season_id, r.name],
        )
        .context("upsert stage group")?;
        Ok(())
    })
}

pub fn upsert_standings(conn: &mut Connection, rows: &[StandingRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO standings (
                league_id, season_id, phase, group_name, team_id, position,
                matches_played, won, draw, lost, goals_for, goals_against,
                goal_diff, points, last5_form
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(league_id, season_id, phase, group_name, team_id) DO UPDATE SET
                position = excluded.position,
                matches_played = excluded.matches_played,
                won = excluded.won,
                draw = excluded.draw,
                lost = excluded.lost,
                goals_for = excluded.goals_for,
                goals_against = excluded.goals_against,
                goal_diff = excluded.goal_diff,
                points = excluded.points,
                last5_form = excluded.last5_form
            "#,
            params![
                r.league_id,
                r.season_id,
                r.phase,
                r.group_name,
                r.team_id,
                r.position,
                r.matches_played,
                r.won,
                r.draw,
                r.lost,
                r.goals_for,
                r.goals_against,
                r.goal_diff,
                r.points,
                r.last5_form
            ],
        )
        .context("upsert standings row")?;
        Ok(())
    })
}

/// A decided winner is never overwritten: re-runs only fill a NULL.
pub fn upsert_knockout_ties(conn: &mut Connection, rows: &[TieRow]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO knockout_ties (
                league_id, season_id, round_name, team1_id, team2_id,
                leg1_fixture_id, leg1_home_team_id, leg1_away_team_id,
                leg1_home_score, leg1_away_score,
                leg2_fixture_id, leg2_home_team_id, leg2_away_team_id,
                leg2_home_score, leg2_away_score,
                aggregate_team1, aggregate_team2, winner_team_id, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(league_id, season_id, round_name, team1_id, team2_id) DO UPDATE SET
                leg1_fixture_id = excluded.leg1_fixture_id,
                leg1_home_team_id = excluded.leg1_home_team_id,
                leg1_away_team_id = excluded.leg1_away_team_id,
                leg1_home_score = excluded.leg1_home_score,
                leg1_away_score = excluded.leg1_away_score,
                leg2_fixture_id = excluded.leg2_fixture_id,
                leg2_home_team_id = excluded.leg2_home_team_id,
                leg2_away_team_id = excluded.leg2_away_team_id,
                leg2_home_score = excluded.leg2_home_score,
                leg2_away_score = excluded.leg2_away_score,
                aggregate_team1 = excluded.aggregate_team1,
                aggregate_team2 = excluded.aggregate_team2,
                winner_team_id = COALESCE(winner_team_id, excluded.winner_team_id),
                updated_at = excluded.updated_at
            "#,
            params![
                r.league_id,
                r.season_id,
                r.round_name,
                r.team1_id,
                r.team2_id,
                r.leg1_fixture_id,
                r.leg1_home_team_id,
                r.leg1_away_team_id,
                r.leg1_home_score,
                r.leg1_away_score,
                r.leg2_fixture_id,
                r.leg2_home_team_id,
                r.leg2_away_team_id,
                r.leg2_home_score,
                r.leg2_away_score,
                r.aggregate_team1,
                r.aggregate_team2,
                r.winner_team_id,
                now
            ],
        )
        .context("upsert knockout tie")?;
        Ok(())
    })
}

/// Reprocessing never regresses the cumulative value; the date follows the
/// latest computation.
pub fn upsert_points_pace(conn: &mut Connection, rows: &[PaceRow]) -> Result<usize> {
    upsert_chunked(conn, rows, |tx, r| {
        tx.execute(
            r#"
            INSERT INTO points_pace (
                league_id, season_id, team_id, round_no, match_date, cumulative_points
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(league_id, season_id, team_id, round_no) DO UPDATE SET
                match_date = excluded.match_date,
                cumulative_points = MAX(cumulative_points, excluded.cumulative_points)
            "#,
            params![
                r.league_id,
                r.season_id,
                r.team_id,
                r.round_no,
                r.match_date,
                r.cumulative_points
            ],
        )
        .context("upsert points pace row")?;
        Ok(())
    })
}

#[derive(Debug, Clone)]
pub struct PastFixture {
    pub fixture_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: i64,
    pub away_score: i64,
    pub home_penalty_score: Option<i64>,
    pub away_penalty_score: Option<i64>,
    pub round_name: String,
    pub leg_number: i64,
    pub starting_at: String,
}

fn past_fixture_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PastFixture> {
    Ok(PastFixture {
        fixture_id: row.get(0)?,
        home_team_id: row.get(1)?,
        away_team_id: row.get(2)?,
        home_score: row.get(3)?,
        away_score: row.get(4)?,
        home_penalty_score: row.get(5)?,
        away_penalty_score: row.get(6)?,
        round_name: row.get(7)?,
        leg_number: row.get(8)?,
        starting_at: row.get(9)?,
    })
}

const PAST_FIXTURE_COLUMNS: &str = r#"
    fixture_id, home_team_id, away_team_id, home_score, away_score,
    home_penalty_score, away_penalty_score, round_name,
    COALESCE(leg_number, 1), starting_at
"#;

/// Completed fixtures with resolved sides and a full score pair, oldest
/// first. Rows missing any required field are excluded, not errored.
pub fn load_past_fixtures(
    conn: &Connection,
    league_id: i64,
    season_id: i64,
    competition: Option<Competition>,
) -> Result<Vec<PastFixture>> {
    let mut sql = format!(
        r#"
        SELECT {PAST_FIXTURE_COLUMNS}
        FROM fixtures
        WHERE league_id = ?1 AND season_id = ?2
          AND status = 'past'
          AND home_team_id IS NOT NULL AND away_team_id IS NOT NULL
          AND home_score IS NOT NULL AND away_score IS NOT NULL
          AND starting_at IS NOT NULL
        "#
    );
    if let Some(comp) = competition {
        sql.push_str(&format!("  AND competition_type = '{}'\n", comp.as_str()));
    }
    sql.push_str("ORDER BY starting_at ASC, fixture_id ASC");

    let mut stmt = conn.prepare(&sql).context("prepare past fixtures query")?;
    let rows = stmt
        .query_map(params![league_id, season_id], |row| past_fixture_from_row(row))
        .context("query past fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode past fixture row")?);
    }
    Ok(out)
}

/// Same filter, cut off at a timestamp (used for as-of table recomputation).
pub fn load_past_fixtures_until(
    conn: &Connection,
    league_id: i64,
    season_id: i64,
    cutoff: &str,
    inclusive: bool,
) -> Result<Vec<PastFixture>> {
    let cmp = if inclusive { "<=" } else { "<" };
    let sql = format!(
        r#"
        SELECT {PAST_FIXTURE_COLUMNS}
        FROM fixtures
        WHERE league_id = ?1 AND season_id = ?2
          AND status = 'past'
          AND home_team_id IS NOT NULL AND away_team_id IS NOT NULL
          AND home_score IS NOT NULL AND away_score IS NOT NULL
          AND starting_at IS NOT NULL
          AND starting_at {cmp} ?3
        ORDER BY starting_at ASC, fixture_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare as-of fixtures query")?;
    let rows = stmt
        .query_map(params![league_id, season_id, cutoff], |row| {
            past_fixture_from_row(row)
        })
        .context("query as-of fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode as-of fixture row")?);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct GroupedFixture {
    pub fixture: PastFixture,
    pub group_id: Option<i64>,
    pub group_name: String,
}

/// Group-stage fixtures with their group label (empty when the fixture has
/// no group, i.e. a non-grouped league phase).
pub fn load_group_stage_fixtures(
    conn: &Connection,
    league_id: i64,
    season_id: i64,
) -> Result<Vec<GroupedFixture>> {
    let sql = format!(
        r#"
        SELECT
            f.fixture_id, f.home_team_id, f.away_team_id, f.home_score, f.away_score,
            f.home_penalty_score, f.away_penalty_score, f.round_name,
            COALESCE(f.leg_number, 1), f.starting_at,
            f.group_id, COALESCE(g.name, '')
        FROM fixtures f
        LEFT JOIN stage_groups g ON g.group_id = f.group_id
        WHERE f.league_id = ?1 AND f.season_id = ?2
          AND f.status = 'past'
          AND f.stage_type_id = {STAGE_TYPE_GROUP}
          AND f.home_team_id IS NOT NULL AND f.away_team_id IS NOT NULL
          AND f.home_score IS NOT NULL AND f.away_score IS NOT NULL
          AND f.starting_at IS NOT NULL
        ORDER BY f.starting_at ASC, f.fixture_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare group fixtures query")?;
    let rows = stmt
        .query_map(params![league_id, season_id], |row| {
            Ok(GroupedFixture {
                fixture: past_fixture_from_row(row)?,
                group_id: row.get(10)?,
                group_name: row.get(11)?,
            })
        })
        .context("query group fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode group fixture row")?);
    }
    Ok(out)
}

/// Distinct (league_id, season_id) pairs that have fixtures of the given
/// competition classification.
pub fn season_pairs_by_competition(
    conn: &Connection,
    competition: Competition,
) -> Result<Vec<(i64, i64)>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT league_id, season_id FROM fixtures
             WHERE competition_type = ?1
             ORDER BY league_id, season_id",
        )
        .context("prepare season pairs query")?;
    let rows = stmt
        .query_map(params![competition.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })
        .context("query season pairs")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season pair")?);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct SeasonMeta {
    pub season_id: i64,
    pub league_id: i64,
    pub name: Option<String>,
    pub starting_at: Option<String>,
    pub is_current: bool,
}

impl SeasonMeta {
    /// Start year from the season name form, else the timestamp prefix.
    pub fn start_year(&self) -> Option<i32> {
        if let Some(year) = self
            .name
            .as_deref()
            .and_then(crate::normalize::parse_season_start_year)
        {
            return Some(year);
        }
        let starting = self.starting_at.as_deref().unwrap_or("");
        if starting.len() >= 4 && starting[..4].chars().all(|c| c.is_ascii_digit()) {
            return starting[..4].parse().ok();
        }
        None
    }
}

pub fn seasons_for_league(conn: &Connection, league_id: i64) -> Result<Vec<SeasonMeta>> {
    let mut stmt = conn
        .prepare(
            "SELECT season_id, league_id, name, starting_at, is_current
             FROM seasons WHERE league_id = ?1 ORDER BY season_id",
        )
        .context("prepare seasons query")?;
    let rows = stmt
        .query_map(params![league_id], season_meta_from_row)
        .context("query seasons")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season row")?);
    }
    Ok(out)
}

pub fn current_seasons(conn: &Connection) -> Result<Vec<SeasonMeta>> {
    let mut stmt = conn
        .prepare(
            "SELECT season_id, league_id, name, starting_at, is_current
             FROM seasons WHERE is_current = 1 ORDER BY league_id, season_id",
        )
        .context("prepare current seasons query")?;
    let rows = stmt
        .query_map([], season_meta_from_row)
        .context("query current seasons")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode current season row")?);
    }
    Ok(out)
}

fn season_meta_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SeasonMeta> {
    Ok(SeasonMeta {
        season_id: row.get(0)?,
        league_id: row.get(1)?,
        name: row.get(2)?,
        starting_at: row.get(3)?,
        is_current: row.get::<_, i64>(4)? != 0,
    })
}

pub fn season_meta(conn: &Connection, season_id: i64) -> Result<Option<SeasonMeta>> {
    let mut stmt = conn
        .prepare(
            "SELECT season_id, league_id, name, starting_at, is_current
             FROM seasons WHERE season_id = ?1",
        )
        .context("prepare season meta query")?;
    let mut rows = stmt
        .query_map(params![season_id], season_meta_from_row)
        .context("query season meta")?;
    match rows.next() {
        Some(row) => Ok(Some(row.context("decode season meta")?)),
        None => Ok(None),
    }
}

/// Competition classification of a league from its stored sub_type, with
/// the static id-set fallback.
pub fn league_competition(conn: &Connection, league_id: i64) -> Result<Competition> {
    let sub_type: Option<String> = conn
        .query_row(
            "SELECT sub_type FROM leagues WHERE league_id = ?1",
            params![league_id],
            |row| row.get(0),
        )
        .unwrap_or(None);
    Ok(classify_competition_for_league(league_id, sub_type.as_deref()))
}

pub fn last_completed_fixture_time(
    conn: &Connection,
    league_id: i64,
    season_id: i64,
    team_id: i64,
) -> Result<Option<String>> {
    conn.query_row(
        "SELECT MAX(starting_at) FROM fixtures
         WHERE league_id = ?1 AND season_id = ?2 AND status = 'past'
           AND starting_at IS NOT NULL
           AND (home_team_id = ?3 OR away_team_id = ?3)",
        params![league_id, season_id, team_id],
        |row| row.get::<_, Option<String>>(0),
    )
    .context("query last completed fixture time")
}

pub fn begin_ingest_run(conn: &Connection, step: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO ingest_runs(step, started_at, finished_at, rows_upserted, errors_json)
         VALUES (?1, ?2, NULL, 0, '[]')",
        params![step, Utc::now().to_rfc3339()],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_ingest_run(
    conn: &Connection,
    run_id: i64,
    rows_upserted: usize,
    errors: &[String],
) -> Result<()> {
    let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, rows_upserted = ?2, errors_json = ?3
         WHERE run_id = ?4",
        params![Utc::now().to_rfc3339(), rows_upserted as i64, errors_json, run_id],
    )
    .context("update ingest run")?;
    Ok(())
}
