use anyhow::Result;
use std::sync::Arc;

mod admission;
mod cache;
mod cli;
mod db;
mod errors;
mod facade;
mod metadata;
mod models;
mod name;
mod reconciler;
mod repository;
mod version;
mod worker;

use cache::InfoCache;
use cli::Command;
use db::SqliteDbController;
use facade::Registry;
use models::RepositoryDescriptor;
use repository::LocalGitResolver;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let opt = cli::parse_args();

    log::info!("Opening catalog at `{}`", opt.db_path.display());
    let db = Arc::new(SqliteDbController::open(&opt.db_path)?);
    let cache = Arc::new(InfoCache::new());
    let resolver = Arc::new(LocalGitResolver::new(opt.download_url()));
    let registry = Arc::new(Registry::new(db, cache, resolver));

    if matches!(opt.command, Command::Sweep) {
        spawn_periodic_sweep(registry.clone(), opt.poll_interval_secs);
    }

    run_command(&registry, opt.command).await
}

/// Drives the catalog-wide sweep off an external timer.
fn spawn_periodic_sweep(registry: Arc<Registry>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = registry.check_for_new_versions().await {
                log::warn!("periodic sweep failed: {}", e);
            }
        }
    });
}

async fn run_command(registry: &Registry, command: Command) -> Result<()> {
    match command {
        Command::Add { url, owner } => {
            let pkg = registry
                .add_package(RepositoryDescriptor::Git { url }, &owner)
                .await?;
            println!("added `{}` (owned by `{}`)", pkg.name, pkg.owner);
        }
        Command::Remove { name, owner } => {
            registry.remove_package(&name, &owner).await?;
            println!("removed `{}`", name);
        }
        Command::Info { name, with_errors } => {
            let view = registry.get_package_info(&name, with_errors).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Search { keywords } => {
            let results = registry.search_packages(&keywords).await?;
            for view in results {
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }
        Command::Categories { name, categories } => {
            registry.set_package_categories(&name, &categories).await?;
            println!("set categories for `{}`: {:?}", name, categories);
        }
        Command::Update { name } => {
            registry.trigger_package_update(&name).await;
            println!("enqueued `{}`", name);
        }
        Command::Sweep => {
            registry.check_for_new_versions().await?;
            println!("swept the catalog; running in the background, press Ctrl-C to exit");
            tokio::signal::ctrl_c().await?;
        }
    }
    Ok(())
}
