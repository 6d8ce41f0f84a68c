use actix_web::{middleware, web, App, HttpServer};
use docshelf::{
    Config, MarkdownRenderer, SnapshotStore, SyncOrchestrator, SyncTrigger, SyncWorker,
    TreeWatcher,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;

mod handlers;

/// Shared application state
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub trigger: SyncTrigger,
    pub webhook_secret: Option<String>,
    pub webhook_header: String,
}

fn to_io_error(e: docshelf::DocShelfError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
}

/// Ask for a sync every `interval`, starting one interval after startup.
fn spawn_refresh_ticker(trigger: SyncTrigger, interval: Duration) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            log::debug!("Periodic refresh");
            trigger.request_sync();
        }
    });
}

fn start_watcher(config: &Config, trigger: SyncTrigger) -> Option<TreeWatcher> {
    if !config.repository_dir.is_dir() {
        log::warn!(
            "Not watching {}: it is not a directory yet",
            config.repository_dir.display()
        );
        return None;
    }
    match TreeWatcher::start(&config.repository_dir, config.watch_debounce(), move || {
        trigger.request_sync();
    }) {
        Ok(watcher) => {
            log::info!("Watching {} for changes", config.repository_dir.display());
            Some(watcher)
        }
        Err(e) => {
            log::error!("Failed to watch {}: {e}", config.repository_dir.display());
            None
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init();
    log::info!("Starting docshelf server");

    let config = Config::load().map_err(to_io_error)?;
    match &config.remote_url {
        Some(remote) => log::info!(
            "Mirroring {remote} into {}",
            config.repository_dir.display()
        ),
        None => log::info!("Serving local tree at {}", config.repository_dir.display()),
    }
    if config.webhook_secret.is_none() {
        log::warn!("No webhook secret configured, webhook requests will be refused");
    }

    let store = Arc::new(SnapshotStore::new());
    let orchestrator = Arc::new(SyncOrchestrator::new(
        config.source(),
        config.fetcher(),
        MarkdownRenderer::new(),
        Arc::clone(&store),
    ));
    let worker = SyncWorker::start(orchestrator, config.cooldown()).map_err(to_io_error)?;
    let trigger = worker.trigger();

    if config.sync_on_start {
        trigger.request_sync();
    }
    if let Some(interval) = config.refresh_interval() {
        log::info!("Refreshing every {interval:?}");
        spawn_refresh_ticker(trigger.clone(), interval);
    }
    let _watcher = if config.watch {
        start_watcher(&config, trigger.clone())
    } else {
        None
    };

    let state = web::Data::new(AppState {
        store,
        trigger,
        webhook_secret: config.webhook_secret.clone(),
        webhook_header: config.webhook_header.clone(),
    });

    let cors_origins = config.cors_allowed_origins.clone();
    if cors_origins.is_empty() {
        log::info!("Allowing cross-origin requests from any origin");
    }

    let host = config.host.clone();
    let port = config.port;
    log::info!("Listening on {host}:{port}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(handlers::cors(&cors_origins))
            .wrap(middleware::Compress::default())
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    log::info!("Shutting down sync worker");
    worker.shutdown();
    Ok(())
}
