use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::normalize::Competition;
use crate::store::{self, PastFixture, TieRow};

/// Last season start year the away-goals rule applied to (retired for
/// 2021/22 onwards).
pub const AWAY_GOALS_FINAL_SEASON: i32 = 2020;

/// Map the varied upstream spellings of a knockout round onto one label, so
/// the same tie cannot surface twice under different names. Non-knockout
/// labels return None.
pub fn canonical_knockout_round(name: &str) -> Option<String> {
    let n = name.to_lowercase();
    if n.contains("round of 16") || n.contains("1/8") || n.contains("r16") {
        return Some("Round of 16".to_string());
    }
    if n.contains("quarter") || n.contains("qf") {
        return Some("Quarter-finals".to_string());
    }
    if n.contains("semi") || n.contains("sf") {
        return Some("Semi-finals".to_string());
    }
    if n.contains("knockout round") || n.contains("knockout play-off") {
        return Some("Knockout Round Play-offs".to_string());
    }
    if n.contains("final") {
        return Some("Final".to_string());
    }
    None
}

/// Group knockout fixtures into ties keyed by (canonical round, unordered
/// team pair), legs ordered by (start time, leg number, fixture id).
pub fn group_ties(fixtures: &[PastFixture]) -> Vec<(String, i64, i64, Vec<PastFixture>)> {
    let mut grouped: HashMap<(String, i64, i64), Vec<PastFixture>> = HashMap::new();
    for fx in fixtures {
        let Some(round) = canonical_knockout_round(&fx.round_name) else {
            continue;
        };
        let (t1, t2) = if fx.home_team_id < fx.away_team_id {
            (fx.home_team_id, fx.away_team_id)
        } else {
            (fx.away_team_id, fx.home_team_id)
        };
        grouped.entry((round, t1, t2)).or_default().push(fx.clone());
    }
    let mut out: Vec<(String, i64, i64, Vec<PastFixture>)> = grouped
        .into_iter()
        .map(|((round, t1, t2), mut legs)| {
            legs.sort_by(|a, b| {
                a.starting_at
                    .cmp(&b.starting_at)
                    .then(a.leg_number.cmp(&b.leg_number))
                    .then(a.fixture_id.cmp(&b.fixture_id))
            });
            (round, t1, t2, legs)
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    out
}

/// Winner chain, first decisive rule wins: aggregate score, away goals
/// (two-legged ties in gated competitions/seasons only), penalty shootout
/// from the last leg carrying one. Undecidable ties keep a null winner.
pub fn resolve_tie(
    round_name: &str,
    team1_id: i64,
    team2_id: i64,
    legs: &[PastFixture],
    away_goals_rule: bool,
    league_id: i64,
    season_id: i64,
) -> TieRow {
    let mut agg1 = 0i64;
    let mut agg2 = 0i64;
    let mut away1 = 0i64;
    let mut away2 = 0i64;
    let mut last_pen: Option<&PastFixture> = None;

    for leg in legs {
        let team1_home = leg.home_team_id == team1_id;
        let (g1, g2) = if team1_home {
            (leg.home_score, leg.away_score)
        } else {
            (leg.away_score, leg.home_score)
        };
        agg1 += g1;
        agg2 += g2;
        if team1_home {
            away2 += g2;
        } else {
            away1 += g1;
        }
        if leg.home_penalty_score.is_some() || leg.away_penalty_score.is_some() {
            last_pen = Some(leg);
        }
    }

    let mut winner = None;
    if agg1 != agg2 {
        winner = Some(if agg1 > agg2 { team1_id } else { team2_id });
    } else if away_goals_rule && legs.len() >= 2 && away1 != away2 {
        winner = Some(if away1 > away2 { team1_id } else { team2_id });
    } else if let Some(pen) = last_pen {
        let (p1, p2) = if pen.home_team_id == team1_id {
            (
                pen.home_penalty_score.unwrap_or(0),
                pen.away_penalty_score.unwrap_or(0),
            )
        } else {
            (
                pen.away_penalty_score.unwrap_or(0),
                pen.home_penalty_score.unwrap_or(0),
            )
        };
        if p1 != p2 {
            winner = Some(if p1 > p2 { team1_id } else { team2_id });
        }
    }

    let leg1 = legs.first();
    let leg2 = if legs.len() >= 2 { legs.last() } else { None };
    TieRow {
        league_id,
        season_id,
        round_name: round_name.to_string(),
        team1_id,
        team2_id,
        leg1_fixture_id: leg1.map(|l| l.fixture_id),
        leg1_home_team_id: leg1.map(|l| l.home_team_id),
        leg1_away_team_id: leg1.map(|l| l.away_team_id),
        leg1_home_score: leg1.map(|l| l.home_score),
        leg1_away_score: leg1.map(|l| l.away_score),
        leg2_fixture_id: leg2.map(|l| l.fixture_id),
        leg2_home_team_id: leg2.map(|l| l.home_team_id),
        leg2_away_team_id: leg2.map(|l| l.away_team_id),
        leg2_home_score: leg2.map(|l| l.home_score),
        leg2_away_score: leg2.map(|l| l.away_score),
        aggregate_team1: agg1,
        aggregate_team2: agg2,
        winner_team_id: winner,
    }
}

/// Resolve and upsert every tie for one season. Re-running only ever fills
/// winners that are still null (store-level guarantee).
pub fn build_ties_for_season(
    conn: &mut Connection,
    league_id: i64,
    season_id: i64,
) -> Result<usize> {
    let competition = store::league_competition(conn, league_id)?;
    let start_year = store::season_meta(conn, season_id)?.and_then(|meta| meta.start_year());
    let away_goals_rule = competition == Competition::Europe
        && start_year.is_some_and(|y| y <= AWAY_GOALS_FINAL_SEASON);

    let fixtures = store::load_past_fixtures(conn, league_id, season_id, None)?;
    let rows: Vec<TieRow> = group_ties(&fixtures)
        .iter()
        .map(|(round, t1, t2, legs)| {
            resolve_tie(round, *t1, *t2, legs, away_goals_rule, league_id, season_id)
        })
        .collect();
    store::upsert_knockout_ties(conn, &rows)
}

/// Final idempotent pass across every cup season in the store.
pub fn backfill_all(conn: &mut Connection) -> Result<usize> {
    let mut total = 0usize;
    for competition in [Competition::Europe, Competition::DomesticCup] {
        for (league_id, season_id) in store::season_pairs_by_competition(conn, competition)? {
            total += build_ties_for_season(conn, league_id, season_id)?;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::canonical_knockout_round;

    #[test]
    fn round_spellings_collapse_to_one_label() {
        for raw in ["Round of 16", "1/8-finals", "R16", "round of 16 1st leg"] {
            assert_eq!(canonical_knockout_round(raw).as_deref(), Some("Round of 16"), "{raw}");
        }
        for raw in ["Quarter-finals", "quarterfinal", "QF 2nd Leg"] {
            assert_eq!(
                canonical_knockout_round(raw).as_deref(),
                Some("Quarter-finals"),
                "{raw}"
            );
        }
        for raw in ["Semi-finals", "semifinal", "SF"] {
            assert_eq!(canonical_knockout_round(raw).as_deref(), Some("Semi-finals"), "{raw}");
        }
        assert_eq!(canonical_knockout_round("Final").as_deref(), Some("Final"));
        assert_eq!(
            canonical_knockout_round("Knockout Round Play-offs").as_deref(),
            Some("Knockout Round Play-offs")
        );
    }

    #[test]
    fn non_knockout_rounds_are_skipped() {
        for raw in ["Matchweek 7", "Group Stage", "Regular Season", "League Phase"] {
            assert_eq!(canonical_knockout_round(raw), None, "{raw}");
        }
    }
}
