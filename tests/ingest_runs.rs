use matchday_loader::store;

#[test]
fn finished_runs_record_counts_and_errors() {
    let conn = store::open_in_memory().unwrap();
    let run_id = store::begin_ingest_run(&conn, "bootstrap").unwrap();
    store::finish_ingest_run(&conn, run_id, 42, &["fetch seasons of league 2 failed".to_string()])
        .unwrap();

    let (step, started_at, finished_at, rows, errors): (String, String, Option<String>, i64, String) =
        conn.query_row(
            "SELECT step, started_at, finished_at, rows_upserted, errors_json
             FROM ingest_runs WHERE run_id = ?1",
            [run_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .unwrap();

    assert_eq!(step, "bootstrap");
    assert_eq!(rows, 42);
    let finished_at = finished_at.expect("finished_at should be set");
    assert!(started_at <= finished_at);
    assert_eq!(errors, r#"["fetch seasons of league 2 failed"]"#);
}

#[test]
fn an_aborted_run_keeps_its_partial_count() {
    let conn = store::open_in_memory().unwrap();
    let first = store::begin_ingest_run(&conn, "bootstrap").unwrap();
    let second = store::begin_ingest_run(&conn, "bootstrap").unwrap();
    assert_ne!(first, second);

    // Only the first run finishes; the second stays open with zero rows,
    // which is how a crash mid-step reads afterwards.
    store::finish_ingest_run(&conn, first, 7, &[]).unwrap();

    let open_runs: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM ingest_runs WHERE finished_at IS NULL",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(open_runs, 1);

    let (rows, errors): (i64, String) = conn
        .query_row(
            "SELECT rows_upserted, errors_json FROM ingest_runs WHERE run_id = ?1",
            [first],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(rows, 7);
    assert_eq!(errors, "[]");
}
