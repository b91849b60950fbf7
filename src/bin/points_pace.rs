use std::path::PathBuf;

use anyhow::{Result, anyhow};

use matchday_loader::{config, points_pace, store};

const USAGE: &str = "Usage:
  points_pace [--db <path>] build
  points_pace [--db <path>] refresh-current";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let (db_arg, args) = split_db_arg(&raw_args);
    let db_path = db_arg.unwrap_or_else(config::db_path_from_env);
    let mut conn = store::open_db(&db_path)?;

    match args.first().map(String::as_str) {
        Some("build") => {
            let rows = points_pace::build_all(&mut conn)?;
            println!("Points pace build done");
            println!("Rows: {rows}");
        }
        Some("refresh-current") => {
            let rows = points_pace::refresh_current(&mut conn)?;
            println!("Points pace refresh-current done");
            println!("Rows: {rows}");
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
