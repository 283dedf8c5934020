//! Print a server's leaderboard
//!
//! Usage:
//!   show_ranking <ServerName> [limit]

use dotenv::dotenv;
use killfeed::pipeline::{
    config::PipelineConfig,
    db::{ScoreStore, SqliteScoreStore},
    types::ScoreRow,
};
use std::env;
use std::process;

fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <ServerName> [limit]", args[0]);
        process::exit(1);
    }

    let limit = match args.get(2).map(|s| s.parse::<usize>()) {
        Some(Ok(n)) if n > 0 => Some(n),
        Some(_) => {
            eprintln!("❌ limit must be a positive integer");
            process::exit(1);
        }
        None => None,
    };

    if let Err(e) = run(&args[1], limit) {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn run(server_name: &str, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env()?;
    let source = config
        .find_source(server_name)
        .ok_or_else(|| format!("unknown server '{}'", server_name))?;

    let store = SqliteScoreStore::open(&config.ranking_db_path)?;
    let rows = store.top(&source.name, limit.unwrap_or(config.ranking_limit))?;

    println!("🏆 {} ranking", source.name);
    if rows.is_empty() {
        println!("   (no kills recorded yet)");
        return Ok(());
    }

    println!(
        "{:>4}  {:<24} {:>6} {:>6} {:>6} {:>6}",
        "#", "Player", "Score", "Kills", "Deaths", "K/D"
    );
    for (i, row) in rows.iter().enumerate() {
        println!(
            "{:>4}  {:<24} {:>6} {:>6} {:>6} {:>6}",
            i + 1,
            row.player_name,
            row.score,
            row.kills,
            row.deaths,
            kd_ratio(row)
        );
    }
    Ok(())
}

fn kd_ratio(row: &ScoreRow) -> String {
    if row.deaths == 0 {
        format!("{}", row.kills)
    } else {
        format!("{:.2}", row.kills as f64 / row.deaths as f64)
    }
}
