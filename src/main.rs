extern crate dotenvy;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod form;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod schema;
pub mod session;

#[cfg(test)]
mod testing;

use cache::PageCache;
use config::Config;
use dashboard::Dashboard;
use db::{ClinicStore, PgStore, ReadingStore};
use repository::ReadingRepository;
use session::{SessionAccessor, SupabaseAuth};

// Database connection pool type
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Shared by every worker; cloned handles all point at the same page cache.
pub struct AppState {
    pub readings: ReadingRepository,
    pub dashboard: Dashboard,
    pub session: SessionAccessor,
    pub pages: Arc<PageCache>,
}

impl AppState {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        clinic: Arc<dyn ClinicStore>,
        session: SessionAccessor,
    ) -> Self {
        let pages = Arc::new(PageCache::new());
        let readings = ReadingRepository::new(readings, pages.clone());
        let dashboard = Dashboard::new(clinic, readings.clone());
        Self {
            readings,
            dashboard,
            session,
            pages,
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;

    // create db connection pool
    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
        .context("Failed to create pool")?;

    let store = Arc::new(PgStore::new(pool));
    let auth = Arc::new(SupabaseAuth::new(&config.supabase_url, &config.supabase_anon_key)?);
    let session = SessionAccessor::new(auth, store.clone(), &config.session_cookie);
    let state = web::Data::new(AppState::new(store.clone(), store, session));

    tracing::info!(
        addr = %config.bind_addr,
        port = config.port,
        "vitals v{} listening",
        env!("CARGO_PKG_VERSION")
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(handlers::routes)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
