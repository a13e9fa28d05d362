//! Process-wide service wiring.
//!
//! One `DataAccess` handle and one sender are constructed at startup and
//! shared by every run. `shutdown` releases the data store explicitly.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use leasekeep_infra::{AppConfig, InMemoryDataAccess, LogOnlySender, PgDataAccess, WhatsAppSender};
use leasekeep_reminders::{
    DataAccess, MessageSender, ReminderRunner, RunObserver, RunnerConfig, TracingObserver,
};

pub struct AppServices {
    data: Arc<dyn DataAccess>,
    runner: Arc<ReminderRunner>,
}

impl AppServices {
    pub fn new(
        data: Arc<dyn DataAccess>,
        sender: Arc<dyn MessageSender>,
        observer: Arc<dyn RunObserver>,
        config: RunnerConfig,
    ) -> Self {
        let runner = Arc::new(ReminderRunner::new(data.clone(), sender, observer, config));
        Self { data, runner }
    }

    pub fn runner(&self) -> Arc<ReminderRunner> {
        self.runner.clone()
    }

    /// Release the data store. Call once, after the last run.
    pub async fn shutdown(&self) {
        self.data.close().await;
        info!("data store closed");
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let data: Arc<dyn DataAccess> = match config.database_url.as_deref() {
        Some(url) => Arc::new(
            PgDataAccess::connect(url, config.reminder_log_enabled)
                .await
                .context("failed to connect to Postgres")?,
        ),
        None => {
            warn!("DATABASE_URL not set; using empty in-memory store");
            if config.reminder_log_enabled {
                Arc::new(InMemoryDataAccess::with_marker())
            } else {
                Arc::new(InMemoryDataAccess::new())
            }
        }
    };

    let sender: Arc<dyn MessageSender> = match &config.whatsapp {
        Some(wa) => Arc::new(
            WhatsAppSender::new(wa, config.send_timeout).context("failed to build WhatsApp client")?,
        ),
        None => {
            warn!("WhatsApp credentials not set; messages will only be logged");
            Arc::new(LogOnlySender::new())
        }
    };

    Ok(AppServices::new(
        data,
        sender,
        Arc::new(TracingObserver),
        config.runner_config(),
    ))
}
