//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::SipProvisioner;
use crate::config::Settings;
use crate::infrastructure::cache::{self, RosterCache};
use crate::infrastructure::database;
use crate::infrastructure::repositories::{PgScopeAuthorizer, PgTelephonyRepository};
use crate::presentation::http::routes;
use crate::presentation::websocket::{CallRegistry, Gateway, GroupRouter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: ConnectionManager,
    pub gateway: Arc<Gateway>,
    pub router: Arc<GroupRouter>,
    pub calls: Arc<CallRegistry>,
    pub provisioner: SipProvisioner,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Create database pool
        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        database::run_migrations(&db).await?;
        tracing::info!("Database migrations applied");

        // Create Redis connection
        let redis = cache::create_redis_client(&settings.redis).await?;
        let roster = RosterCache::new(redis.clone());

        // Wire the real-time distribution components
        let gateway = Arc::new(Gateway::new());
        let authorizer = Arc::new(PgScopeAuthorizer::new(db.clone(), roster));
        let group_router = Arc::new(GroupRouter::new(gateway.clone(), authorizer));
        let calls = CallRegistry::new(
            gateway.clone(),
            Duration::from_secs(settings.call.negotiation_timeout_secs),
        );

        // Telephony provisioning
        let telephony = Arc::new(PgTelephonyRepository::new(db.clone()));
        let provisioner = SipProvisioner::new(telephony, settings.sip.max_contacts);

        crate::presentation::http::handlers::health::init_server_start();

        let state = AppState {
            db,
            redis,
            gateway,
            router: group_router,
            calls,
            provisioner,
            settings: Arc::new(settings.clone()),
        };

        let router = routes::create_router(state);

        // Bind to address
        let addr: SocketAddr = settings.server_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
