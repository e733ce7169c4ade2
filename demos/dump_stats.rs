// Dump a project's sync checkpoint and daily task stats as JSON.
//
// Usage: cargo run --example dump_stats -- PROJECT_ID [DB_PATH]
//   DB_PATH  default: ./data/stats.db

use statsync::db;
use statsync::stats_repo::StatsRepo;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(project_id) = args.get(1) else {
        anyhow::bail!("usage: dump_stats PROJECT_ID [DB_PATH]");
    };
    let path = args.get(2).map(String::as_str).unwrap_or("./data/stats.db");

    let pool = db::connect(path, 1).await?;
    let repo = StatsRepo::new(pool);
    let checkpoint = repo.get_checkpoint(project_id).await?;
    let daily = repo.get_daily_task_stats(project_id).await?;

    let out = serde_json::json!({
        "checkpoint": checkpoint,
        "daily": daily,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
