use clap::Parser;
use claimstone::{jwks, settings, storage, web};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "claimstone",
    version,
    about = "Group health insurance claims administration backend"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;

    // seed the permission catalog, standard roles and bootstrap admin
    storage::seed_rbac(&db, &settings.auth.bootstrap_admin_password).await?;

    // init signing keys (generate if missing)
    let jwks_mgr = jwks::JwksManager::new(settings.keys.clone()).await?;

    // start web server
    web::serve(settings, db, jwks_mgr).await?;
    Ok(())
}
