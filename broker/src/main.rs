use anyhow::Context;
use anyhow::Result;
use broker::cli::Opts;
use broker::db;
use broker::logger;
use broker::ports::noop::EchoCopyRenderer;
use broker::ports::noop::EmptySlotProvider;
use broker::ports::noop::LoggingNotifier;
use broker::ports::noop::NullMirrorSink;
use broker::ports::noop::StubCheckoutSessionCreator;
use broker::routes;
use broker::routes::AppState;
use broker::scheduler::SweeperScheduler;
use broker::settings::Settings;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::metadata::LevelFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::read();

    let log_level = match opts.app_env {
        broker::cli::AppEnv::Production => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    logger::init_tracing(log_level, opts.json)?;

    let data_dir = opts.data_dir()?;
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).context("could not create data dir")?;
    }

    let settings = Settings::new(&data_dir, opts.app_env).await;
    let sweeper_schedule = settings.sweeper_schedule.clone();
    let settings = Arc::new(RwLock::new(settings));

    let pool = db::init_pool(&opts.database).context("failed to build database pool")?;
    {
        let mut conn = pool.get().context("failed to get a connection for migrations")?;
        broker::run_migration(&mut conn);
    }

    let notifier = Arc::new(LoggingNotifier);

    let sweeper = SweeperScheduler::new(pool.clone(), notifier.clone(), settings.clone()).await?;
    sweeper.add_sweep_job(&sweeper_schedule).await?;
    sweeper.start().await?;

    let state = Arc::new(AppState {
        pool,
        settings,
        app_env: opts.app_env,
        whatsapp_app_secret: opts.whatsapp_app_secret.clone(),
        whatsapp_verify_token: opts.whatsapp_verify_token.clone(),
        stripe_webhook_secret: opts.stripe_webhook_secret.clone(),
        admin_api_key: opts.admin_api_key.clone(),
        notifier,
        renderer: Arc::new(EchoCopyRenderer),
        checkout_creator: Arc::new(StubCheckoutSessionCreator),
        mirror_sink: Arc::new(NullMirrorSink),
        slot_provider: Arc::new(EmptySlotProvider),
    });

    let app = routes::router(state);

    tracing::info!(address = %opts.http_address, "starting broker");
    axum::Server::bind(&opts.http_address)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server failed")?;

    Ok(())
}
