//! tune-lobby binary entrypoint: one lobby daemon per player, wiring REST, SSE,
//! the session store and the music catalog.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

use tune_lobby::{
    config::AppConfig,
    dao::session_store::{MemorySessionStore, SessionStore},
    routes,
    services::{
        catalog::{CatalogService, static_catalog::StaticCatalog},
        storage_supervisor,
    },
    state::{AppState, Identity, SharedState},
};

const DEFAULT_CATALOG_FILE: &str = "config/catalog.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let identity = load_identity()?;
    let catalog = build_catalog()?;
    info!(uid = %identity.uid, display_name = %identity.display_name, "acting as player");

    let app_state = AppState::new(config, identity, catalog);
    spawn_session_store(app_state.clone())?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Player identity handed over by the auth front-end through the environment.
fn load_identity() -> anyhow::Result<Identity> {
    let uid = env::var("PLAYER_UID").context("PLAYER_UID must be set")?;
    let display_name = env::var("PLAYER_NAME").unwrap_or_else(|_| uid.clone());
    let photo_url = env::var("PLAYER_PHOTO_URL")
        .ok()
        .filter(|url| !url.is_empty());

    let identity = Identity {
        uid,
        display_name,
        photo_url,
    };
    identity.validate().context("invalid player identity")?;
    Ok(identity)
}

/// Web catalog when `CATALOG_BASE_URL` is set, otherwise playlists from a local file.
fn build_catalog() -> anyhow::Result<Arc<dyn CatalogService>> {
    #[cfg(feature = "web-catalog")]
    {
        use tune_lobby::services::catalog::web::WebCatalog;

        if let Ok(base_url) = env::var("CATALOG_BASE_URL") {
            let token = env::var("CATALOG_TOKEN").ok();
            let catalog = WebCatalog::new(&base_url, token).context("building web catalog")?;
            info!(%base_url, "using web catalog");
            return Ok(Arc::new(catalog));
        }
    }

    let path = env::var_os("CATALOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_FILE));
    match StaticCatalog::from_file(&path) {
        Ok(catalog) => Ok(Arc::new(catalog)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "no catalog available; playlists cannot be resolved");
            Ok(Arc::new(StaticCatalog::default()))
        }
    }
}

/// Start the storage supervisor for the backend named by `STORE_BACKEND`.
fn spawn_session_store(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".into());
    match backend.as_str() {
        "memory" => {
            let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok(store) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use tune_lobby::dao::session_store::mongodb::{MongoConfig, MongoSessionStore};

            let uri =
                env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").ok();
            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                    let store: Arc<dyn SessionStore> =
                        Arc::new(MongoSessionStore::connect(config).await?);
                    Ok(store)
                }
            }));
        }
        other => bail!("unsupported STORE_BACKEND `{other}`"),
    }
    info!(%backend, "session store supervisor started");
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; only Ctrl+C stops the server");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
