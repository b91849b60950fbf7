use matchday_loader::normalize::Competition;
use matchday_loader::standings::{self, compute_table};
use matchday_loader::store::{self, FixtureRow, GroupRow, PastFixture};

fn fx(id: i64, home: i64, away: i64, hs: i64, aws: i64, at: &str) -> PastFixture {
    PastFixture {
        fixture_id: id,
        home_team_id: home,
        away_team_id: away,
        home_score: hs,
        away_score: aws,
        home_penalty_score: None,
        away_penalty_score: None,
        round_name: format!("Matchweek {id}"),
        leg_number: 1,
        starting_at: at.to_string(),
    }
}

#[test]
fn points_and_goal_diff_identities_hold() {
    let fixtures = vec![
        fx(1, 1, 2, 2, 0, "2023-08-12 15:00:00"),
        fx(2, 2, 3, 1, 1, "2023-08-19 15:00:00"),
        fx(3, 3, 1, 0, 3, "2023-08-26 15:00:00"),
        fx(4, 1, 3, 2, 2, "2023-09-02 15:00:00"),
    ];
    let table = compute_table(&fixtures);
    for row in &table {
        assert_eq!(row.points, 3 * row.won + row.draw);
        assert_eq!(row.goal_diff, row.goals_for - row.goals_against);
        assert_eq!(row.played, row.won + row.draw + row.lost);
    }
    let team1 = table.iter().find(|r| r.team_id == 1).unwrap();
    assert_eq!(team1.points, 7);
    assert_eq!(team1.goals_for, 7);
    assert_eq!(team1.goals_against, 2);
}

#[test]
fn tie_break_chain_points_gd_gf_then_id() {
    // Teams 1 and 2 finish level on points; team 1 has the better goal
    // difference. Teams 3 and 4 are level on points and goal difference;
    // team 4 has more goals for. Teams 5 and 6 are identical; lower id
    // first.
    let fixtures = vec![
        fx(1, 1, 9, 4, 0, "2023-08-01 15:00:00"),
        fx(2, 2, 9, 1, 0, "2023-08-02 15:00:00"),
        fx(3, 3, 8, 1, 0, "2023-08-03 15:00:00"),
        fx(4, 4, 8, 2, 1, "2023-08-04 15:00:00"),
        fx(5, 5, 7, 0, 0, "2023-08-05 15:00:00"),
        fx(6, 6, 7, 0, 0, "2023-08-06 15:00:00"),
    ];
    let table = compute_table(&fixtures);
    let order: Vec<i64> = table.iter().map(|r| r.team_id).collect();
    let pos1 = order.iter().position(|t| *t == 1).unwrap();
    let pos2 = order.iter().position(|t| *t == 2).unwrap();
    assert!(pos1 < pos2, "better goal difference ranks higher: {order:?}");
    let pos3 = order.iter().position(|t| *t == 3).unwrap();
    let pos4 = order.iter().position(|t| *t == 4).unwrap();
    assert!(pos4 < pos3, "more goals for ranks higher: {order:?}");
    let pos5 = order.iter().position(|t| *t == 5).unwrap();
    let pos6 = order.iter().position(|t| *t == 6).unwrap();
    assert!(pos5 < pos6, "team id breaks the final tie: {order:?}");

    for (idx, row) in table.iter().enumerate() {
        assert_eq!(row.position, idx as i64 + 1);
    }
}

#[test]
fn recompute_on_identical_input_is_identical() {
    let fixtures = vec![
        fx(1, 1, 2, 2, 0, "2023-08-12 15:00:00"),
        fx(2, 2, 3, 1, 1, "2023-08-19 15:00:00"),
        fx(3, 3, 1, 0, 3, "2023-08-26 15:00:00"),
    ];
    assert_eq!(compute_table(&fixtures), compute_table(&fixtures));
}

fn past_league_fixture_row(id: i64, home: i64, away: i64, hs: i64, aws: i64, at: &str) -> FixtureRow {
    FixtureRow {
        fixture_id: id,
        season_id: 500,
        league_id: 8,
        home_team_id: Some(home),
        away_team_id: Some(away),
        competition: Competition::League,
        round_name: format!("Matchweek {id}"),
        stage_type_id: None,
        stage_id: None,
        group_id: None,
        leg_number: None,
        status: "past",
        starting_at: Some(at.to_string()),
        home_score: Some(hs),
        away_score: Some(aws),
        home_penalty_score: None,
        away_penalty_score: None,
    }
}

#[test]
fn standings_build_writes_ranked_rows_and_rank_delta_moves() {
    let mut conn = store::open_in_memory().unwrap();
    // Three teams. Before team 3's last match it has lost twice and sits
    // third; winning the final game big lifts it past team 2.
    let rows = vec![
        past_league_fixture_row(1, 1, 3, 2, 0, "2023-08-12 15:00:00"),
        past_league_fixture_row(2, 2, 3, 1, 0, "2023-08-19 15:00:00"),
        past_league_fixture_row(3, 1, 2, 3, 0, "2023-08-26 15:00:00"),
        past_league_fixture_row(4, 3, 2, 4, 0, "2023-09-02 15:00:00"),
    ];
    store::upsert_fixtures(&mut conn, &rows).unwrap();

    let written = standings::build_league_standings_for_season(&mut conn, 8, 500).unwrap();
    assert_eq!(written, 3);

    let (pos, points): (i64, i64) = conn
        .query_row(
            "SELECT position, points FROM standings
             WHERE league_id = 8 AND season_id = 500 AND phase = 'league' AND team_id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(pos, 1);
    assert_eq!(points, 6);

    let (delta, symbol) = standings::rank_delta_since_last_match(&conn, 8, 500, 3).unwrap();
    assert_eq!(delta, 1);
    assert_eq!(symbol, "up");

    // Idempotence at the store level: a second build leaves the same rows.
    let rewritten = standings::build_league_standings_for_season(&mut conn, 8, 500).unwrap();
    assert_eq!(rewritten, 3);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM standings", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 3);
}

fn europe_fixture_row(
    id: i64,
    home: i64,
    away: i64,
    hs: i64,
    aws: i64,
    group_id: Option<i64>,
    at: &str,
) -> FixtureRow {
    FixtureRow {
        fixture_id: id,
        season_id: 100,
        league_id: 2,
        home_team_id: Some(home),
        away_team_id: Some(away),
        competition: Competition::Europe,
        round_name: format!("Round {id}"),
        stage_type_id: Some(223),
        stage_id: Some(7),
        group_id,
        leg_number: None,
        status: "past",
        starting_at: Some(at.to_string()),
        home_score: Some(hs),
        away_score: Some(aws),
        home_penalty_score: None,
        away_penalty_score: None,
    }
}

#[test]
fn group_stage_splits_into_group_and_league_phase_tables() {
    let mut conn = store::open_in_memory().unwrap();
    store::upsert_stage_groups(
        &mut conn,
        &[GroupRow {
            group_id: 71,
            stage_id: 7,
            league_id: 2,
            season_id: 100,
            name: "Group A".to_string(),
        }],
    )
    .unwrap();
    let rows = vec![
        // Grouped fixtures land in a per-group table...
        europe_fixture_row(1, 1, 2, 2, 0, Some(71), "2023-09-19 20:00:00"),
        europe_fixture_row(2, 2, 1, 1, 1, Some(71), "2023-10-03 20:00:00"),
        // ...fixtures in the same stage type without a group form the
        // non-grouped league phase.
        europe_fixture_row(3, 3, 4, 1, 1, None, "2023-09-20 20:00:00"),
    ];
    store::upsert_fixtures(&mut conn, &rows).unwrap();

    let written = standings::build_phase_standings_for_season(&mut conn, 2, 100).unwrap();
    assert_eq!(written, 4);

    let (pos, points, form): (i64, i64, String) = conn
        .query_row(
            "SELECT position, points, last5_form FROM standings
             WHERE league_id = 2 AND season_id = 100
               AND phase = 'group' AND group_name = 'Group A' AND team_id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(pos, 1);
    assert_eq!(points, 4);
    assert_eq!(form, r#"["W","D"]"#);

    let league_phase_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM standings
             WHERE league_id = 2 AND season_id = 100 AND phase = 'league_phase'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(league_phase_rows, 2);
}

#[test]
fn fixtures_without_scores_are_silently_excluded() {
    let mut conn = store::open_in_memory().unwrap();
    let mut rows = vec![past_league_fixture_row(1, 1, 2, 2, 0, "2023-08-12 15:00:00")];
    let mut unscored = past_league_fixture_row(2, 1, 2, 0, 0, "2023-08-19 15:00:00");
    unscored.home_score = None;
    unscored.away_score = None;
    rows.push(unscored);
    store::upsert_fixtures(&mut conn, &rows).unwrap();

    let loaded = store::load_past_fixtures(&conn, 8, 500, Some(Competition::League)).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].fixture_id, 1);
}
