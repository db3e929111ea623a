use crate::errors::{Error, Result};
use crate::metrics::{NOTIFICATIONS_FAILED_TOTAL, NOTIFICATIONS_SENT_TOTAL};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const ACTUATOR_CHANNEL_ID: &str = "actuadores";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
}

/// Delivery channel, for platforms that group notifications into channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub importance: Importance,
    pub vibration_pattern: Vec<u64>,
    pub light_color: String,
}

impl ChannelSpec {
    pub fn actuators() -> Self {
        Self {
            id: ACTUATOR_CHANNEL_ID.to_string(),
            name: "Actuadores".to_string(),
            importance: Importance::High,
            vibration_pattern: vec![0, 250, 250, 250],
            light_color: "#007AFF".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub sound: bool,
    pub priority: Importance,
}

/// Host notification API.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    fn requires_channels(&self) -> bool {
        false
    }

    async fn create_channel(&self, _channel: &ChannelSpec) -> Result<()> {
        Ok(())
    }

    async fn permission_status(&self) -> Result<PermissionStatus>;

    async fn request_permission(&self) -> Result<PermissionStatus>;

    /// Posts the notification immediately and returns its identifier.
    async fn post(&self, content: &NotificationContent) -> Result<String>;
}

#[async_trait]
impl<P: NotificationPlatform + ?Sized> NotificationPlatform for Box<P> {
    fn requires_channels(&self) -> bool {
        (**self).requires_channels()
    }

    async fn create_channel(&self, channel: &ChannelSpec) -> Result<()> {
        (**self).create_channel(channel).await
    }

    async fn permission_status(&self) -> Result<PermissionStatus> {
        (**self).permission_status().await
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        (**self).request_permission().await
    }

    async fn post(&self, content: &NotificationContent) -> Result<String> {
        (**self).post(content).await
    }
}

/// Permission-gated notification dispatcher.
pub struct NotificationService<P> {
    platform: P,
    permissions_granted: bool,
}

impl<P: NotificationPlatform> NotificationService<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            permissions_granted: false,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn permissions_granted(&self) -> bool {
        self.permissions_granted
    }

    /// Asks the platform for permission and remembers the outcome.
    ///
    /// Creates the actuator channel first on platforms that need one. A
    /// denial is not an error: it is logged and reported as `false`.
    pub async fn request_permissions(&mut self) -> Result<bool> {
        if self.platform.requires_channels() {
            self.platform.create_channel(&ChannelSpec::actuators()).await?;
        }

        let mut status = self.platform.permission_status().await?;
        if status != PermissionStatus::Granted {
            status = self.platform.request_permission().await?;
        }

        self.permissions_granted = status == PermissionStatus::Granted;
        if !self.permissions_granted {
            warn!("Notification permission was not granted");
        }

        Ok(self.permissions_granted)
    }

    /// Fires a notification right away. Returns `None` without touching the
    /// platform when permission has not been granted, and `None` when the
    /// platform fails to post.
    pub async fn schedule_notification(
        &self,
        title: &str,
        body: &str,
        data: Option<Value>,
    ) -> Option<String> {
        if !self.permissions_granted {
            warn!("Cannot send notifications without permission");
            NOTIFICATIONS_FAILED_TOTAL.inc();
            return None;
        }

        let content = NotificationContent {
            title: title.to_string(),
            body: body.to_string(),
            data,
            sound: true,
            priority: Importance::High,
        };

        match self.platform.post(&content).await {
            Ok(id) => {
                debug!("Posted notification {}", id);
                NOTIFICATIONS_SENT_TOTAL.inc();
                Some(id)
            }
            Err(e) => {
                error!("Failed to post notification: {}", e);
                NOTIFICATIONS_FAILED_TOTAL.inc();
                None
            }
        }
    }

    pub async fn send_actuator_notification(&self, actuator: &str, state: bool) {
        let (title, body) = actuator_message(actuator, state);
        let data = json!({
            "actuador": actuator,
            "estado": state,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        self.schedule_notification(&title, &body, Some(data)).await;
    }
}

/// Title and body announcing an actuator state change.
pub fn actuator_message(actuator: &str, state: bool) -> (String, String) {
    let emoji = actuator_emoji(actuator);
    let (upper, lower) = if state {
        ("ACTIVADO", "activado")
    } else {
        ("DESACTIVADO", "desactivado")
    };

    let title = format!("{} {} {}", emoji, capitalize(actuator), upper);
    let body = format!("El {} ha sido {}", actuator, lower);
    (title, body)
}

fn actuator_emoji(actuator: &str) -> &'static str {
    match actuator.to_lowercase().as_str() {
        "bomba" => "💧",
        "ventilador" => "🌬️",
        "luz" => "💡",
        _ => "⚙️",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Writes notifications to the log. Always permitted.
#[derive(Debug, Default)]
pub struct ConsolePlatform;

#[async_trait]
impl NotificationPlatform for ConsolePlatform {
    async fn permission_status(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn post(&self, content: &NotificationContent) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        info!(id = %id, body = %content.body, "🔔 {}", content.title);
        Ok(id)
    }
}

/// POSTs notifications as JSON to an HTTP endpoint.
#[derive(Debug)]
pub struct WebhookPlatform {
    http: reqwest::Client,
    url: Option<String>,
}

impl WebhookPlatform {
    pub fn new(url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, url })
    }

    fn status(&self) -> PermissionStatus {
        if self.url.is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }
}

#[async_trait]
impl NotificationPlatform for WebhookPlatform {
    async fn permission_status(&self) -> Result<PermissionStatus> {
        Ok(self.status())
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        Ok(self.status())
    }

    async fn post(&self, content: &NotificationContent) -> Result<String> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Notification("no webhook URL configured".to_string()))?;

        let id = uuid::Uuid::new_v4().to_string();
        self.http
            .post(url)
            .json(&json!({ "id": id, "notification": content }))
            .send()
            .await?
            .error_for_status()?;

        Ok(id)
    }
}
