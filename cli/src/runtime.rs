//! Shared command setup: settings file, database connection, schema.

use crate::commands::GlobalArgs;
use anyhow::{Context, Result};
use ojs_core::SyncStore;
use std::sync::Arc;
use storage::PgStore;
use sync::SyncSettings;
use tracing::debug;

pub struct App {
    pub store: Arc<dyn SyncStore>,
    pub settings: SyncSettings,
}

impl App {
    pub async fn connect(global: &GlobalArgs) -> Result<Self> {
        let settings = match &global.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                SyncSettings::from_toml_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => SyncSettings::default(),
        };

        let database_url = global
            .database_url
            .as_deref()
            .context("no database URL; pass --database-url or set DATABASE_URL")?;
        let store = PgStore::connect(database_url)
            .await
            .context("failed to connect to the database")?;
        store
            .initialize_schema()
            .await
            .context("failed to initialize the database schema")?;
        debug!("Database connection established");

        Ok(Self {
            store: Arc::new(store),
            settings,
        })
    }
}
