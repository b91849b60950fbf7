use std::path::PathBuf;

use anyhow::{Result, anyhow};

use matchday_loader::{config, knockout, standings, store};

const USAGE: &str = "Usage:
  standings [--db <path>] build
  standings [--db <path>] refresh-current
  standings [--db <path>] delta <league_id> <season_id> <team_id>";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let (db_arg, args) = split_db_arg(&raw_args);
    let db_path = db_arg.unwrap_or_else(config::db_path_from_env);
    let mut conn = store::open_db(&db_path)?;

    match args.first().map(String::as_str) {
        Some("build") => {
            let standings_rows = standings::build_all(&mut conn)?;
            let tie_rows = knockout::backfill_all(&mut conn)?;
            println!("Standings build done");
            println!("Standings rows: {standings_rows}");
            println!("Knockout ties: {tie_rows}");
        }
        Some("refresh-current") => {
            let rows = standings::refresh_current(&mut conn)?;
            println!("Standings refresh-current done");
            println!("Rows: {rows}");
        }
        Some("delta") if args.len() == 4 => {
            let league_id: i64 = args[1].parse()?;
            let season_id: i64 = args[2].parse()?;
            let team_id: i64 = args[3].parse()?;
            let (delta, symbol) =
                standings::rank_delta_since_last_match(&conn, league_id, season_id, team_id)?;
            println!(
                "team {team_id} @ league {league_id} season {season_id}: delta={delta} {symbol}"
            );
        }
        _ => return Err(anyhow!("{USAGE}")),
    }

    Ok(())
}

fn split_db_arg(args: &[String]) -> (Option<PathBuf>, Vec<String>) {
    let mut db_path = None;
    let mut rest = Vec::new();
    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];
        if let Some(path) = arg.strip_prefix("--db=") {
            if !path.trim().is_empty() {
                db_path = Some(PathBuf::from(path.trim()));
            }
        } else if arg == "--db" {
            if let Some(next) = args.get(idx + 1) {
                if !next.trim().is_empty() {
                    db_path = Some(PathBuf::from(next));
                }
                idx += 1;
            }
        } else {
            rest.push(arg.clone());
        }
        idx += 1;
    }
    (db_path, rest)
}
