use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::normalize::Competition;
use crate::store::{self, PaceRow, PastFixture};

/// First digit run embedded in a round label ("Matchweek 7" -> 7).
pub fn round_number_from_label(label: &str) -> Option<i64> {
    let digits: String = label
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() { None } else { digits.parse().ok() }
}

/// Points gained by (home, away) for one result.
pub fn points_for(home_score: i64, away_score: i64) -> (i64, i64) {
    match home_score.cmp(&away_score) {
        std::cmp::Ordering::Greater => (3, 0),
        std::cmp::Ordering::Less => (0, 3),
        std::cmp::Ordering::Equal => (1, 1),
    }
}

/// Cumulative points per team per round. Fixtures must be chronological;
/// labels without digits take their chronological ordinal as the round
/// number. Duplicate rounds for a team collapse to the latest-dated entry.
pub fn pace_rows(league_id: i64, season_id: i64, fixtures: &[PastFixture]) -> Vec<PaceRow> {
    let mut per_team: HashMap<i64, Vec<(i64, &str, i64)>> = HashMap::new();
    for (idx, fx) in fixtures.iter().enumerate() {
        let round_no = round_number_from_label(&fx.round_name).unwrap_or(idx as i64 + 1);
        let (home_gain, away_gain) = points_for(fx.home_score, fx.away_score);
        per_team
            .entry(fx.home_team_id)
            .or_default()
            .push((round_no, fx.starting_at.as_str(), home_gain));
        per_team
            .entry(fx.away_team_id)
            .or_default()
            .push((round_no, fx.starting_at.as_str(), away_gain));
    }

    let mut team_ids: Vec<i64> = per_team.keys().copied().collect();
    team_ids.sort_unstable();

    let mut out = Vec::new();
    for team_id in team_ids {
        let mut round_latest: HashMap<i64, (&str, i64)> = HashMap::new();
        for (round_no, date, gain) in &per_team[&team_id] {
            match round_latest.get(round_no) {
                Some((prev_date, _)) if *prev_date >= *date => {}
                _ => {
                    round_latest.insert(*round_no, (*date, *gain));
                }
            }
        }
        let mut rounds: Vec<i64> = round_latest.keys().copied().collect();
        rounds.sort_unstable();
        let mut cumulative = 0i64;
        for round_no in rounds {
            let (date, gain) = round_latest[&round_no];
            cumulative += gain;
            out.push(PaceRow {
                league_id,
                season_id,
                team_id,
                round_no,
                match_date: date.to_string(),
                cumulative_points: cumulative,
            });
        }
    }
    out
}

pub fn build_for_league_season(
    conn: &mut Connection,
    league_id: i64,
    season_id: i64,
) -> Result<usize> {
    let fixtures =
        store::load_past_fixtures(conn, league_id, season_id, Some(Competition::League))?;
    let rows = pace_rows(league_id, season_id, &fixtures);
    store::upsert_points_pace(conn, &rows)
}

/// Pace curves for every persisted league season.
pub fn build_all(conn: &mut Connection) -> Result<usize> {
    let mut total = 0usize;
    for (league_id, season_id) in store::season_pairs_by_competition(conn, Competition::League)? {
        total += build_for_league_season(conn, league_id, season_id)?;
    }
    Ok(total)
}

/// Light refresh of the latest season (by start year) per league.
pub fn refresh_current(conn: &mut Connection) -> Result<usize> {
    let pairs = store::season_pairs_by_competition(conn, Competition::League)?;
    let mut league_ids: Vec<i64> = pairs.iter().map(|(league_id, _)| *league_id).collect();
    league_ids.sort_unstable();
    league_ids.dedup();

    let mut total = 0usize;
    for league_id in league_ids {
        let seasons = store::seasons_for_league(conn, league_id)?;
        let latest = seasons
            .iter()
            .max_by_key(|s| (s.start_year().unwrap_or(i32::MIN), s.season_id));
        if let Some(season) = latest {
            total += build_for_league_season(conn, league_id, season.season_id)?;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::{points_for, round_number_from_label};

    #[test]
    fn digits_are_lifted_from_round_labels() {
        assert_eq!(round_number_from_label("Matchweek 7"), Some(7));
        assert_eq!(round_number_from_label("Round 12"), Some(12));
        assert_eq!(round_number_from_label("38"), Some(38));
        assert_eq!(round_number_from_label("Final"), None);
        assert_eq!(round_number_from_label(""), None);
    }

    #[test]
    fn league_points_split() {
        assert_eq!(points_for(2, 0), (3, 0));
        assert_eq!(points_for(0, 2), (0, 3));
        assert_eq!(points_for(1, 1), (1, 1));
    }
}
