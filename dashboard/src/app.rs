use crate::actuators::ActuatorChange;
use crate::config::{Config, NotifierKind};
use crate::notifications::{
    ConsolePlatform, NotificationPlatform, NotificationService, WebhookPlatform,
};
use crate::render::render;
use crate::rest;
use crate::rtdb::StoreClient;
use crate::state::DashboardState;
use crate::subscriber::{self, SnapshotSubscriber};
use std::io::{IsTerminal, Write};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Notifier = NotificationService<Box<dyn NotificationPlatform>>;

const NOTIFY_QUEUE_CAPACITY: usize = 32;

/// Mounts the dashboard, runs it until `shutdown` fires, then unmounts it.
pub async fn run(config: Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let client = StoreClient::new(&config.database_url, config.auth_token.clone())?;
    let notifier = build_notifier(&config).await?.map(spawn_notifier);

    let (state_tx, state_rx) = watch::channel(DashboardState::new());
    let server = match config.http_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("HTTP server listening on {}", addr);
            let app = rest::create_router(state_rx);
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!("HTTP server error: {}", e);
                }
            }))
        }
        None => None,
    };

    let view = TextView {
        quiet: config.quiet,
        data_path: config.data_path.clone(),
    };
    let mut subscriber = SnapshotSubscriber::new(config.highlight(), config.notify_actuators);
    let mut mounted = subscriber::mount(&client, &config.data_path, &config.reading_path);
    view.draw(subscriber.state());

    loop {
        let deadline = subscriber.highlight_deadline();

        let redraw = tokio::select! {
            Some(event) = mounted.primary_rx.recv() => {
                let update = subscriber.on_primary(event, Instant::now());
                if let Some((queue, _)) = notifier.as_ref() {
                    for change in update.actuator_changes {
                        if let Err(e) = queue.try_send(change) {
                            warn!("Dropping actuator notification: {}", e);
                        }
                    }
                }
                update.redraw
            }
            Some(event) = mounted.secondary_rx.recv() => subscriber.on_secondary(event),
            _ = wait_for(deadline) => subscriber.on_tick(Instant::now()),
            _ = shutdown.cancelled() => break,
        };

        if redraw {
            view.draw(subscriber.state());
            state_tx.send_replace(subscriber.state().clone());
        }
    }

    mounted.unmount().await;
    subscriber.reset();
    state_tx.send_replace(subscriber.state().clone());

    if let Some((queue, worker)) = notifier {
        drop(queue);
        let _ = worker.await;
    }

    if let Some(server) = server {
        server.abort();
    }

    Ok(())
}

async fn build_notifier(config: &Config) -> anyhow::Result<Option<Notifier>> {
    if !config.notify_actuators {
        return Ok(None);
    }

    let platform: Box<dyn NotificationPlatform> = match config.notifier {
        NotifierKind::Console => Box::new(ConsolePlatform),
        NotifierKind::Webhook => Box::new(WebhookPlatform::new(config.webhook_url.clone())?),
    };

    let mut service = NotificationService::new(platform);
    match service.request_permissions().await {
        Ok(true) => info!("Actuator notifications enabled ({:?})", config.notifier),
        Ok(false) => warn!("Actuator notifications will be suppressed"),
        Err(e) => warn!("Could not request notification permission: {}", e),
    }

    Ok(Some(service))
}

/// Delivers actuator notifications off the event loop, in order.
fn spawn_notifier(notifier: Notifier) -> (mpsc::Sender<ActuatorChange>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ActuatorChange>(NOTIFY_QUEUE_CAPACITY);
    let worker = tokio::spawn(async move {
        while let Some(change) = rx.recv().await {
            notifier
                .send_actuator_notification(change.actuator.key(), change.active)
                .await;
        }
    });
    (tx, worker)
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

struct TextView {
    quiet: bool,
    data_path: String,
}

impl TextView {
    fn draw(&self, state: &DashboardState) {
        if self.quiet {
            return;
        }

        let frame = render(state, &self.data_path);
        let mut stdout = std::io::stdout().lock();
        let clear = if stdout.is_terminal() { "\x1b[2J\x1b[H" } else { "" };
        if let Err(e) = write!(stdout, "{}{}", clear, frame).and_then(|_| stdout.flush()) {
            warn!("Failed to draw dashboard: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{Error, Result};
    use crate::model::Actuator;
    use crate::notifications::{NotificationContent, PermissionStatus};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Holds every post until the test opens the gate.
    struct GatedPlatform {
        gate: Arc<Semaphore>,
        posted: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationPlatform for GatedPlatform {
        async fn permission_status(&self) -> Result<PermissionStatus> {
            Ok(PermissionStatus::Granted)
        }

        async fn request_permission(&self) -> Result<PermissionStatus> {
            Ok(PermissionStatus::Granted)
        }

        async fn post(&self, content: &NotificationContent) -> Result<String> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| Error::Notification(e.to_string()))?;
            self.posted.lock().unwrap().push(content.title.clone());
            Ok(content.title.clone())
        }
    }

    #[tokio::test]
    async fn test_slow_notifications_do_not_block_queueing() {
        let gate = Arc::new(Semaphore::new(0));
        let posted = Arc::new(Mutex::new(Vec::new()));
        let platform: Box<dyn NotificationPlatform> = Box::new(GatedPlatform {
            gate: gate.clone(),
            posted: posted.clone(),
        });
        let mut service = NotificationService::new(platform);
        assert!(service.request_permissions().await.unwrap());

        let (queue, worker) = spawn_notifier(service);
        for (actuator, active) in [
            (Actuator::Pump, true),
            (Actuator::Fan, true),
            (Actuator::Light, false),
        ] {
            queue.try_send(ActuatorChange { actuator, active }).unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(posted.lock().unwrap().is_empty());

        gate.add_permits(3);
        drop(queue);
        worker.await.unwrap();

        assert_eq!(
            *posted.lock().unwrap(),
            vec![
                "💧 Bomba ACTIVADO".to_string(),
                "🌬️ Ventilador ACTIVADO".to_string(),
                "💡 Luz DESACTIVADO".to_string(),
            ]
        );
    }
}
