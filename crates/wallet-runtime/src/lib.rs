//! # Taler Wallet Runtime
//!
//! Wires the wallet engine, the relay service, the backend client and the
//! wallet model together, and implements the CLI commands on top.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then `WALLET_*` environment overrides)
//! 2. Create the storage directory
//! 3. Start the engine behind the relay service (sends `init`)
//! 4. Connect a client and build the wallet model
//!
//! ```text
//! WalletModel ──► WalletBackendApi ──► ServiceHandle ──► BackendService ──► engine
//!      ▲                 │                                     │
//!      └── event bus ◄───┴─────────────── tunnelHttp ──────────┘
//! ```

pub mod commands;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use wallet_backend::{
    BackendService, EngineConnector, ProcessEngine, ServiceHandle, WalletBackendApi, WalletConfig,
};
use wallet_bus::InMemoryEventBus;
use wallet_model::WalletModel;

/// A running wallet: engine, relay, client and model.
pub struct WalletRuntime {
    config: WalletConfig,
    service: ServiceHandle,
    api: Arc<WalletBackendApi>,
    model: WalletModel,
}

impl WalletRuntime {
    /// Start the engine process named in `config`.
    pub async fn start(mut config: WalletConfig) -> Result<Self> {
        let storage_dir = config.engine.storage_dir.clone();
        std::fs::create_dir_all(&storage_dir)
            .with_context(|| format!("Failed to create storage directory {}", storage_dir.display()))?;
        // The engine runs inside the storage directory, so every path handed
        // to it must be absolute.
        config.engine.storage_dir = std::fs::canonicalize(&storage_dir)
            .with_context(|| format!("Failed to resolve {}", storage_dir.display()))?;

        let engine = Arc::new(ProcessEngine::from_config(&config.engine));
        Self::start_with_engine(engine, config).await
    }

    /// Start on top of any engine connector.
    pub async fn start_with_engine(engine: Arc<dyn EngineConnector>, config: WalletConfig) -> Result<Self> {
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus.capacity));
        let service = BackendService::spawn(engine, &config.engine, Arc::clone(&bus))
            .await
            .with_context(|| format!("Failed to start wallet engine '{}'", config.engine.command))?;

        let api = WalletBackendApi::start(Arc::new(service.clone()), bus, config.bridge.clone());
        let model = WalletModel::new(Arc::clone(&api));
        info!(storage = %config.engine.storage_dir.display(), "Wallet runtime started");

        Ok(Self {
            config,
            service,
            api,
            model,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<WalletBackendApi> {
        &self.api
    }

    pub fn model(&self) -> &WalletModel {
        &self.model
    }

    /// Stop the client first so outstanding calls fail cleanly, then the
    /// relay and the engine.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.model.shutdown().await;
        self.service.stop().await;
        info!("Shutdown complete");
    }
}

/// Load configuration from `path` (or defaults) and the environment.
pub fn load_config(path: Option<&Path>) -> Result<WalletConfig> {
    let mut config = match path {
        Some(path) => WalletConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => WalletConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid WALLET_* environment override")?;
    Ok(config)
}
