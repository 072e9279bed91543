//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::services::ChatServiceImpl;
use crate::config::{Settings, StorageBackend};
use crate::domain::{MembershipRepository, MessageRepository};
use crate::infrastructure::database;
use crate::infrastructure::memory::InMemoryChatStore;
use crate::infrastructure::repositories::{PgMembershipRepository, PgMessageRepository};
use crate::presentation::http::handlers::health;
use crate::presentation::http::routes;
use crate::presentation::websocket::{Gateway, GatewayConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub settings: Arc<Settings>,
    /// Looked up by the readiness check of the in-memory backend
    pub membership: Arc<dyn MembershipRepository>,
    /// Present only with the postgres backend
    pub db: Option<PgPool>,
}

/// Implementations of the persistence and membership contracts.
#[derive(Clone)]
pub struct Storage {
    pub messages: Arc<dyn MessageRepository>,
    pub membership: Arc<dyn MembershipRepository>,
    pub db: Option<PgPool>,
}

impl Storage {
    /// Open the backend selected by `storage.backend`
    pub async fn connect(settings: &Settings) -> Result<Self> {
        match settings.storage.backend {
            StorageBackend::Postgres => {
                let db = database::create_pool(&settings.database).await?;
                tracing::info!("Database connection pool created");

                if settings.database.run_migrations {
                    database::run_migrations(&db).await?;
                    tracing::info!("Database migrations applied");
                }

                Ok(Self {
                    messages: Arc::new(PgMessageRepository::new(db.clone())),
                    membership: Arc::new(PgMembershipRepository::new(db.clone())),
                    db: Some(db),
                })
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; messages are lost on restart");
                Ok(Self::in_memory(Arc::new(InMemoryChatStore::new())))
            }
        }
    }

    /// Storage backed by an existing in-memory store
    pub fn in_memory(store: Arc<InMemoryChatStore>) -> Self {
        Self {
            messages: store.clone(),
            membership: store,
            db: None,
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let storage = Storage::connect(&settings).await?;
        Self::build_with_storage(settings, storage).await
    }

    /// Build the application around already-opened storage
    pub async fn build_with_storage(settings: Settings, storage: Storage) -> Result<Self> {
        health::init_server_start();

        let chat = Arc::new(ChatServiceImpl::new(
            storage.messages,
            Arc::clone(&storage.membership),
            settings.dispatch.enforce_membership,
        ));

        // Create WebSocket gateway
        let gateway = Arc::new(Gateway::new(chat, GatewayConfig::from(&settings)));
        tracing::info!(
            presence_mode = ?settings.presence.mode,
            enforce_membership = settings.dispatch.enforce_membership,
            "Gateway ready"
        );

        let addr = settings.server_addr();

        // Create app state
        let state = AppState {
            gateway,
            settings: Arc::new(settings),
            membership: storage.membership,
            db: storage.db,
        };

        let router = routes::create_router(state);

        // Bind to address
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self { listener, router })
    }

    /// Run the server until Ctrl-C
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler, run until the process is killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
