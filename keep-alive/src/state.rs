use crate::config::Config;
use crate::postgrest::PostgrestStore;
use crate::store::SentinelStore;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What the handler has to ping with.
pub enum StoreSlot {
    Ready(Arc<dyn SentinelStore>),
    // Database URL or service key is missing.
    Unconfigured,
    // Secrets are present but unusable (bad URL, key with control characters).
    // Every ping answers with this message instead of the process refusing to start.
    Broken(String),
}

pub struct AppState {
    pub store: StoreSlot,
}

impl AppState {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
            debug!("Database request timeout: {}s", secs);
        }
        if let Some(secs) = cfg.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
            debug!("Database connect timeout: {}s", secs);
        }
        let client = builder.build()?;

        let state = match cfg.credentials() {
            Some((url, key)) => match PostgrestStore::new(client, url, cfg.table_name(), key) {
                Ok(store) => {
                    info!("Pinging table '{}' at {}", cfg.table_name(), store.endpoint());
                    AppState::with_store(Arc::new(store))
                }
                Err(e) => {
                    error!("Unusable database configuration: {}", e);
                    AppState::broken(e.to_string())
                }
            },
            None => {
                warn!("Database URL or service key not configured; pings will fail");
                AppState::unconfigured()
            }
        };

        Ok(state)
    }

    pub fn with_store(store: Arc<dyn SentinelStore>) -> Self {
        AppState {
            store: StoreSlot::Ready(store),
        }
    }

    pub fn unconfigured() -> Self {
        AppState {
            store: StoreSlot::Unconfigured,
        }
    }

    pub fn broken(message: String) -> Self {
        AppState {
            store: StoreSlot::Broken(message),
        }
    }
}
