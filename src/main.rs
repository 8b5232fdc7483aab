use std::{net::SocketAddr, process, sync::Arc, time::Duration};

use folio::{
    application::{
        analytics::AnalyticsService,
        auth::AuthService,
        blogs::{BlogService, LISTING_CACHE_NAME, ListingCache},
        cdn::{CdnPurger, CdnService},
        error::AppError,
    },
    cache::{CacheConfig, Clock, OsRandom, SystemClock, TokenStore, spawn_sweeper},
    config,
    infra::{
        cdn::CloudflarePurger,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_database(&settings).await?;
    PostgresRepositories::run_migrations(&pool).await?;
    info!(target: "folio::migrate", "Migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_database(&settings).await?;
    PostgresRepositories::run_migrations(&pool).await?;
    let repositories = Arc::new(PostgresRepositories::new(pool));

    let cache_config = CacheConfig::from(&settings.cache);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let listing = Arc::new(ListingCache::new(
        LISTING_CACHE_NAME,
        Arc::clone(&clock),
        cache_config.max_wait_rounds,
    ));
    let tokens = Arc::new(TokenStore::new(
        cache_config.token_policy(),
        clock,
        Arc::new(OsRandom),
    ));

    let purger = match settings.cdn.as_ref() {
        Some(cdn) => Some(Arc::new(CloudflarePurger::new(cdn)?) as Arc<dyn CdnPurger>),
        None => {
            info!(target: "folio::serve", "CDN purging disabled");
            None
        }
    };

    let state = ApiState {
        blogs: Arc::new(BlogService::new(
            repositories.clone(),
            repositories.clone(),
            Arc::clone(&listing),
            cache_config.listing_ttl,
        )),
        auth: Arc::new(AuthService::new(
            settings.auth.sudo_key.as_deref(),
            Arc::clone(&tokens),
        )),
        analytics: Arc::new(AnalyticsService::new(repositories.clone())),
        cdn: Arc::new(CdnService::new(purger)),
        health: repositories,
    };

    if settings.auth.sudo_key.is_none() {
        warn!(
            target: "folio::serve",
            "No sudo key configured; admin routes will refuse every request"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweepers = [
        spawn_sweeper(
            listing,
            cache_config.listing_sweep_interval,
            shutdown_rx.clone(),
        ),
        spawn_sweeper(tokens, cache_config.token_sweep_interval, shutdown_rx.clone()),
    ];

    let result = serve_http(&settings, state, shutdown_tx, shutdown_rx).await;

    for sweeper in sweepers {
        if let Err(err) = sweeper.await {
            warn!(target: "folio::serve", error = %err, "sweeper task ended abnormally");
        }
    }

    result
}

async fn connect_database(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await?;
    Ok(pool)
}

async fn serve_http(
    settings: &config::Settings,
    state: ApiState,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(target: "folio::serve", addr = %settings.server.addr, "Listening");

    let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
        let mut stop = shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop.wait_for(|stopping| *stopping).await;
        })
        .await
    });

    let finished_early = tokio::select! {
        joined = &mut server => Some(joined),
        _ = shutdown_signal() => None,
    };

    // Sweepers and the server both watch this flag.
    let _ = shutdown_tx.send(true);

    let joined = match finished_early {
        Some(joined) => joined,
        None => {
            info!(target: "folio::serve", "Shutdown requested, draining connections");
            match drain(server, settings.server.graceful_shutdown).await {
                Some(joined) => joined,
                None => return Ok(()),
            }
        }
    };

    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn drain(
    server: JoinHandle<std::io::Result<()>>,
    grace: Duration,
) -> Option<Result<std::io::Result<()>, tokio::task::JoinError>> {
    let abort = server.abort_handle();
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => Some(joined),
        Err(_) => {
            warn!(
                target: "folio::serve",
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
            abort.abort();
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "folio::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "folio::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
