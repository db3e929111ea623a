use crate::errors::{Error, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use tracing::info;

pub const DEFAULT_DATABASE_URL: &str = "https://mcei-5810e-default-rtdb.firebaseio.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NotifierKind {
    /// Log notifications
    Console,
    /// POST notifications to --webhook-url
    Webhook,
}

/// Live dashboard for the greenhouse ESP32 telemetry
#[derive(Debug, Clone, Parser)]
#[command(name = "greenhouse-dashboard", version, about)]
pub struct Config {
    /// Base URL of the real-time database
    #[arg(long, env = "FIREBASE_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Database auth token or secret, sent as the `auth` query parameter
    #[arg(long, env = "FIREBASE_AUTH", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Path of the full sensor/actuator/threshold document
    #[arg(long, env = "DATA_PATH", default_value = "invernadero/datos")]
    pub data_path: String,

    /// Path of the last-reading summary document
    #[arg(long, env = "READING_PATH", default_value = "invernadero/ultima_lectura")]
    pub reading_path: String,

    /// Do not blink changed sensor cards
    #[arg(long, env = "NO_HIGHLIGHT")]
    pub no_highlight: bool,

    /// Send a notification whenever an actuator turns on or off
    #[arg(long, env = "NOTIFY_ACTUATORS")]
    pub notify_actuators: bool,

    #[arg(long, env = "NOTIFIER", value_enum, default_value_t = NotifierKind::Console)]
    pub notifier: NotifierKind,

    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Serve /metrics and /api/v1/state on this address
    #[arg(long, env = "HTTP_ADDR")]
    pub http_addr: Option<SocketAddr>,

    /// Do not print the dashboard to stdout
    #[arg(long, env = "QUIET")]
    pub quiet: bool,
}

impl Config {
    pub fn highlight(&self) -> bool {
        !self.no_highlight
    }

    pub fn validate(self) -> Result<Self> {
        info!("--- Checking configuration ---");
        info!("Database: {}", self.database_url);
        info!("Data path: {}", self.data_path);
        info!("Reading path: {}", self.reading_path);

        if !(self.database_url.starts_with("https://") || self.database_url.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "database URL must be http(s): {}",
                self.database_url
            )));
        }

        if self.data_path.trim_matches('/').is_empty() || self.reading_path.trim_matches('/').is_empty()
        {
            return Err(Error::Config("subscription paths cannot be empty".to_string()));
        }

        if self.notify_actuators
            && self.notifier == NotifierKind::Webhook
            && self.webhook_url.is_none()
        {
            return Err(Error::Config(
                "--notifier webhook requires --webhook-url".to_string(),
            ));
        }

        Ok(self)
    }
}
