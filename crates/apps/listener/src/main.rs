use app_state::load_app_settings;
use clap::Parser;
use color_eyre::Result;
use common_services::database::get_db_pool;
use common_services::object_store::S3ObjectStore;
use common_services::startup::retry_startup;
use listener::backfill::backfill_bucket;
use listener::listener::start_listening;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Enqueue every object already in the bucket, then exit.
    #[clap(long, default_value_t = false, action)]
    backfill: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let settings = load_app_settings()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.logging.level.parse().unwrap_or(Level::INFO))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let pool = retry_startup(&settings.startup, "database", || {
        get_db_pool(&settings.database, true)
    })
    .await?;

    if args.backfill {
        let store = S3ObjectStore::new(&settings.object_store);
        backfill_bucket(&pool, &settings, &store).await?;
        return Ok(());
    }

    start_listening(pool, settings).await;
    Ok(())
}
