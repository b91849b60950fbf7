use anyhow::Result;

use matchday_loader::bootstrap;
use matchday_loader::config::Config;
use matchday_loader::provider::ApiClient;
use matchday_loader::store;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::from_env()?;
    let client = ApiClient::new(&cfg);
    let mut conn = store::open_db(&cfg.db_path)?;

    let summary = bootstrap::run(&client, &mut conn, &cfg)?;

    println!("Bootstrap complete");
    println!("DB: {}", cfg.db_path.display());
    println!("Leagues: {}", summary.leagues);
    println!("Seasons: {}", summary.seasons);
    println!("Teams: {}", summary.teams);
    println!(
        "Fixtures: domestic={} europe={} cups={}",
        summary.domestic_fixtures, summary.europe_fixtures, summary.cup_fixtures
    );
    println!("Knockout ties: {}", summary.ties);
    println!("Rows total: {}", summary.rows_total());

    Ok(())
}
