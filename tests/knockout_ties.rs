use matchday_loader::knockout::{build_ties_for_season, group_ties, resolve_tie};
use matchday_loader::normalize::Competition;
use matchday_loader::store::{self, FixtureRow, LeagueRow, PastFixture, SeasonRow, TieRow};

fn leg(
    id: i64,
    home: i64,
    away: i64,
    hs: i64,
    aws: i64,
    leg_number: i64,
    at: &str,
) -> PastFixture {
    PastFixture {
        fixture_id: id,
        home_team_id: home,
        away_team_id: away,
        home_score: hs,
        away_score: aws,
        home_penalty_score: None,
        away_penalty_score: None,
        round_name: "Semi-finals".to_string(),
        leg_number,
        starting_at: at.to_string(),
    }
}

#[test]
fn aggregate_score_decides_when_unequal() {
    let legs = vec![
        leg(1, 1, 2, 2, 1, 1, "2021-04-27 20:00:00"),
        leg(2, 2, 1, 1, 1, 2, "2021-05-04 20:00:00"),
    ];
    let tie = resolve_tie("Semi-finals", 1, 2, &legs, true, 2, 100);
    assert_eq!(tie.aggregate_team1, 3);
    assert_eq!(tie.aggregate_team2, 2);
    assert_eq!(tie.winner_team_id, Some(1));
    assert_ne!(tie.aggregate_team1, tie.aggregate_team2);
}

#[test]
fn away_goals_break_equal_aggregate_in_gated_seasons() {
    // Leg 1: team 1 at home wins 2-1; leg 2: team 2 at home wins 1-0.
    // Aggregate 2-2; team 1 scored 0 away, team 2 scored 1 away.
    let legs = vec![
        leg(1, 1, 2, 2, 1, 1, "2019-04-30 20:00:00"),
        leg(2, 2, 1, 1, 0, 2, "2019-05-07 20:00:00"),
    ];
    let tie = resolve_tie("Semi-finals", 1, 2, &legs, true, 2, 100);
    assert_eq!(tie.aggregate_team1, 2);
    assert_eq!(tie.aggregate_team2, 2);
    assert_eq!(tie.winner_team_id, Some(2));
}

#[test]
fn away_goals_do_not_apply_when_rule_is_off() {
    let legs = vec![
        leg(1, 1, 2, 2, 1, 1, "2022-04-26 20:00:00"),
        leg(2, 2, 1, 1, 0, 2, "2022-05-03 20:00:00"),
    ];
    let tie = resolve_tie("Semi-finals", 1, 2, &legs, false, 2, 100);
    assert_eq!(tie.winner_team_id, None);
}

#[test]
fn penalties_decide_after_equal_aggregate_and_away_goals() {
    let first = leg(1, 1, 2, 1, 1, 1, "2022-04-26 20:00:00");
    let mut second = leg(2, 2, 1, 2, 2, 2, "2022-05-03 20:00:00");
    second.home_penalty_score = Some(4);
    second.away_penalty_score = Some(5);
    let legs = vec![first, second];
    // Second leg: team 2 at home scored 4 in the shootout, team 1 away
    // scored 5.
    let tie = resolve_tie("Semi-finals", 1, 2, &legs, false, 2, 100);
    assert_eq!(tie.aggregate_team1, tie.aggregate_team2);
    assert_eq!(tie.winner_team_id, Some(1));
}

#[test]
fn undecidable_tie_keeps_null_winner() {
    let legs = vec![
        leg(1, 1, 2, 1, 1, 1, "2022-04-26 20:00:00"),
        leg(2, 2, 1, 0, 0, 2, "2022-05-03 20:00:00"),
    ];
    let tie = resolve_tie("Semi-finals", 1, 2, &legs, false, 2, 100);
    assert_eq!(tie.winner_team_id, None);
}

#[test]
fn round_label_variants_group_into_one_tie() {
    let mut first = leg(1, 1, 2, 1, 0, 1, "2021-02-16 20:00:00");
    first.round_name = "R16".to_string();
    let mut second = leg(2, 2, 1, 0, 0, 2, "2021-03-09 20:00:00");
    second.round_name = "round of 16".to_string();
    let mut league_game = leg(3, 1, 2, 2, 2, 1, "2021-01-12 20:00:00");
    league_game.round_name = "Matchweek 20".to_string();

    let ties = group_ties(&[first, second, league_game]);
    assert_eq!(ties.len(), 1);
    let (round, t1, t2, legs) = &ties[0];
    assert_eq!(round, "Round of 16");
    assert_eq!((*t1, *t2), (1, 2));
    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].fixture_id, 1);
    assert_eq!(legs[1].fixture_id, 2);
}

fn cup_fixture(
    id: i64,
    season_id: i64,
    home: i64,
    away: i64,
    hs: i64,
    aws: i64,
    leg_no: i64,
    at: &str,
) -> FixtureRow {
    FixtureRow {
        fixture_id: id,
        season_id,
        league_id: 2,
        home_team_id: Some(home),
        away_team_id: Some(away),
        competition: Competition::Europe,
        round_name: "Semi-finals".to_string(),
        stage_type_id: Some(224),
        stage_id: None,
        group_id: None,
        leg_number: Some(leg_no),
        status: "past",
        starting_at: Some(at.to_string()),
        home_score: Some(hs),
        away_score: Some(aws),
        home_penalty_score: None,
        away_penalty_score: None,
    }
}

fn seed_cup_season(conn: &mut rusqlite::Connection, season_id: i64, season_name: &str) {
    store::upsert_leagues(
        conn,
        &[LeagueRow {
            league_id: 2,
            name: "Champions Cup".to_string(),
            image_path: None,
            sub_type: Some("cup_international".to_string()),
        }],
    )
    .unwrap();
    store::upsert_seasons(
        conn,
        &[SeasonRow {
            season_id,
            league_id: 2,
            name: Some(season_name.to_string()),
            is_current: false,
            starting_at: None,
            ending_at: None,
        }],
    )
    .unwrap();
}

#[test]
fn away_goals_gate_follows_competition_and_season_year() {
    let mut conn = store::open_in_memory().unwrap();
    seed_cup_season(&mut conn, 100, "2019/20");
    // Aggregate 2-2; team 1 scored 0 away, team 2 scored 1 away.
    store::upsert_fixtures(
        &mut conn,
        &[
            cup_fixture(1, 100, 1, 2, 2, 1, 1, "2019-04-30 20:00:00"),
            cup_fixture(2, 100, 2, 1, 1, 0, 2, "2019-05-07 20:00:00"),
        ],
    )
    .unwrap();

    let written = build_ties_for_season(&mut conn, 2, 100).unwrap();
    assert_eq!(written, 1);
    let winner: Option<i64> = conn
        .query_row(
            "SELECT winner_team_id FROM knockout_ties WHERE season_id = 100",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(winner, Some(2));
}

#[test]
fn away_goals_are_retired_for_later_seasons() {
    let mut conn = store::open_in_memory().unwrap();
    seed_cup_season(&mut conn, 200, "2022/23");
    store::upsert_fixtures(
        &mut conn,
        &[
            cup_fixture(1, 200, 1, 2, 2, 1, 1, "2023-04-25 20:00:00"),
            cup_fixture(2, 200, 2, 1, 1, 0, 2, "2023-05-02 20:00:00"),
        ],
    )
    .unwrap();

    build_ties_for_season(&mut conn, 2, 200).unwrap();
    let winner: Option<i64> = conn
        .query_row(
            "SELECT winner_team_id FROM knockout_ties WHERE season_id = 200",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(winner, None);
}

#[test]
fn decided_winner_survives_a_rerun_that_would_null_it() {
    let mut conn = store::open_in_memory().unwrap();
    let decided = TieRow {
        league_id: 2,
        season_id: 100,
        round_name: "Final".to_string(),
        team1_id: 1,
        team2_id: 2,
        leg1_fixture_id: Some(10),
        leg1_home_team_id: Some(1),
        leg1_away_team_id: Some(2),
        leg1_home_score: Some(1),
        leg1_away_score: Some(0),
        leg2_fixture_id: None,
        leg2_home_team_id: None,
        leg2_away_team_id: None,
        leg2_home_score: None,
        leg2_away_score: None,
        aggregate_team1: 1,
        aggregate_team2: 0,
        winner_team_id: Some(1),
    };
    store::upsert_knockout_ties(&mut conn, &[decided.clone()]).unwrap();

    // A reprocessing pass over partial data computes no winner but fresher
    // aggregates; the decided winner must not be cleared.
    let mut partial = decided;
    partial.winner_team_id = None;
    partial.aggregate_team1 = 0;
    partial.aggregate_team2 = 0;
    store::upsert_knockout_ties(&mut conn, &[partial]).unwrap();

    let (winner, agg1): (Option<i64>, i64) = conn
        .query_row(
            "SELECT winner_team_id, aggregate_team1 FROM knockout_ties
             WHERE league_id = 2 AND season_id = 100 AND round_name = 'Final'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(winner, Some(1));
    assert_eq!(agg1, 0);
}

#[test]
fn null_winner_is_filled_once_resolution_succeeds() {
    let mut conn = store::open_in_memory().unwrap();
    let mut row = TieRow {
        league_id: 2,
        season_id: 100,
        round_name: "Final".to_string(),
        team1_id: 1,
        team2_id: 2,
        leg1_fixture_id: Some(10),
        leg1_home_team_id: Some(1),
        leg1_away_team_id: Some(2),
        leg1_home_score: Some(0),
        leg1_away_score: Some(0),
        leg2_fixture_id: None,
        leg2_home_team_id: None,
        leg2_away_team_id: None,
        leg2_home_score: None,
        leg2_away_score: None,
        aggregate_team1: 0,
        aggregate_team2: 0,
        winner_team_id: None,
    };
    store::upsert_knockout_ties(&mut conn, &[row.clone()]).unwrap();

    row.winner_team_id = Some(2);
    store::upsert_knockout_ties(&mut conn, &[row]).unwrap();

    let winner: Option<i64> = conn
        .query_row(
            "SELECT winner_team_id FROM knockout_ties
             WHERE league_id = 2 AND season_id = 100 AND round_name = 'Final'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(winner, Some(2));
}
