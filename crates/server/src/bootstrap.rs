use std::sync::Arc;

use axum::Router;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use parley_core::audit::{AuditEvent, AuditSink};
use parley_core::config::{AppConfig, ConfigError, LoadOptions, StoreBackend};
use parley_core::domain::ChannelId;
use parley_db::{
    connect, migrations, ContentStore, FlatFileContentStore, SqliteContentStore,
};
use parley_slack::{
    DirectoryError, NoopNotifier, NoopThreadDirectory, OutboundNotifier, SlackThreadDirectory,
    ThreadDirectory,
};

use crate::relay::RelayService;
use crate::{content, health, leads, relay};

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn ContentStore>,
    pub relay: Arc<RelayService>,
    pub notifier: Arc<dyn OutboundNotifier>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("thread directory client failed to initialize: {0}")]
    Directory(#[source] DirectoryError),
}

/// Audit events land in the structured log stream alongside everything else.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            session_id = event.session_id.as_ref().map(|id| id.as_str()).unwrap_or("unknown"),
            thread_id = event.thread_id.as_deref().unwrap_or("unknown"),
            correlation_id = %event.correlation_id,
            "audit event"
        );
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let store: Arc<dyn ContentStore> = match config.store.backend {
        StoreBackend::Sqlite => {
            let pool = connect(&config.store).await.map_err(BootstrapError::DatabaseConnect)?;
            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.store_ready",
                backend = "sqlite",
                "content store connected and migrated"
            );
            Arc::new(SqliteContentStore::new(pool))
        }
        StoreBackend::Flatfile => {
            info!(
                event_name = "system.bootstrap.store_ready",
                backend = "flatfile",
                data_dir = %config.store.data_dir,
                "content store directory selected"
            );
            Arc::new(FlatFileContentStore::new(&config.store.data_dir))
        }
    };

    let (directory, notifier): (Arc<dyn ThreadDirectory>, Arc<dyn OutboundNotifier>) =
        match config.chat.bot_token.as_ref() {
            Some(bot_token) => {
                let client = Arc::new(
                    SlackThreadDirectory::new(bot_token.expose_secret().to_string().into())
                        .map_err(BootstrapError::Directory)?,
                );
                (client.clone(), client)
            }
            None => {
                info!(
                    event_name = "system.bootstrap.chat_disabled",
                    "no chat credentials; relay endpoints will answer not-configured"
                );
                (Arc::new(NoopThreadDirectory), Arc::new(NoopNotifier))
            }
        };

    let relay = Arc::new(RelayService::new(
        config.chat.signing_secret.clone(),
        config.chat.channel_id.clone().map(ChannelId),
        directory,
        Arc::new(TracingAuditSink),
    ));

    Ok(Application { config, store, relay, notifier })
}

impl Application {
    /// One router carrying every HTTP surface.
    pub fn router(&self) -> Router {
        let chat_configured = self.config.chat.is_configured();
        Router::new()
            .merge(relay::router(self.relay.clone()))
            .merge(leads::router(
                self.notifier.clone(),
                self.config.leads_channel().map(|id| ChannelId(id.to_string())),
            ))
            .merge(content::router(self.store.clone(), self.config.admin.password.clone()))
            .merge(health::router(self.store.clone(), chat_configured))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use parley_core::config::{ConfigOverrides, LoadOptions, StoreBackend};

    use super::bootstrap;

    #[tokio::test]
    async fn sqlite_bootstrap_migrates_and_answers_ping() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed");

        app.store.ping().await.expect("migrated store should answer ping");
        assert!(!app.relay.is_configured(), "chat should be off without credentials");
    }

    #[tokio::test]
    async fn flatfile_bootstrap_needs_no_database() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                store_backend: Some(StoreBackend::Flatfile),
                data_dir: Some(dir.path().display().to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed");

        app.store.ping().await.expect("data dir should be writable");
        let router = app.router();
        drop(router);
    }
}
