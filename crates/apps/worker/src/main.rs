use app_state::load_app_settings;
use clap::Parser;
use color_eyre::Result;
use common_services::database::get_db_pool;
use common_services::startup::retry_startup;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use worker::worker::create_worker;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Exit once the queue is empty instead of polling forever.
    #[clap(long, default_value_t = false, action)]
    once: bool,
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
    create_worker(pool, settings, args.once).await?;

    Ok(())
}
