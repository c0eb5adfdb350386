use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

use githubsky_poster::config;
use githubsky_poster::database::Database;
use githubsky_poster::runner::{build_jobs, load_manifest, RunSummary};
use githubsky_poster::uploader::{BskyClient, Dispatcher};

#[derive(Parser, Debug)]
#[command(name = "githubsky-poster")]
#[command(about = "Posts each linked account's daily GitHub commit count to Bluesky", long_about = None)]
#[command(version)]
struct Args {
    /// JSON manifest of accounts, commit counts and rendered images
    manifest: PathBuf,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // load_config logs, so the logger starts first at Info and takes the
    // configured level once it is known.
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    if !rust_log_set {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = config::load_config(args.config.as_deref()).context("Failed to load config")?;
    if !rust_log_set {
        log::set_max_level(config.level_filter());
    }

    log::info!("Starting githubsky-poster");

    let database_url = config.resolve_database_url()?;
    let db = Arc::new(
        Database::connect(&database_url)
            .await
            .context("Failed to open database")?,
    );

    let entries = load_manifest(&args.manifest)
        .await
        .with_context(|| format!("Failed to read manifest {}", args.manifest.display()))?;
    let jobs = build_jobs(&db, entries).await?;

    let client = BskyClient::new(Duration::from_secs(config.request_timeout_secs))?;
    let dispatcher = Dispatcher::new(
        Arc::new(client),
        db.clone(),
        db.clone(),
        config.post_settings(),
    );

    let outcomes = dispatcher.run_all(jobs).await;
    let summary = RunSummary::from_outcomes(&outcomes);

    log::info!("Run finished: {}", summary);
    println!("{}", summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_manifest_and_config() {
        let args =
            Args::try_parse_from(["githubsky-poster", "run.json", "--config", "conf.json"]).unwrap();
        assert_eq!(args.manifest, PathBuf::from("run.json"));
        assert_eq!(args.config, Some(PathBuf::from("conf.json")));
    }

    #[test]
    fn test_args_require_manifest() {
        assert!(Args::try_parse_from(["githubsky-poster"]).is_err());
        assert!(Args::try_parse_from(["githubsky-poster", "a.json", "b.json"]).is_err());
    }

    #[test]
    fn test_args_help_is_not_a_manifest() {
        let err = Args::try_parse_from(["githubsky-poster", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
