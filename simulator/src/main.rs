mod telemetry;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use clap::Parser;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use telemetry::GreenhouseDevice;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Local stand-in for the greenhouse's real-time database
#[derive(Debug, Parser)]
#[command(name = "greenhouse-simulator", version, about)]
struct Args {
    #[arg(long, env = "SIM_ADDR", default_value = "127.0.0.1:9000")]
    addr: SocketAddr,

    /// Milliseconds between device readings
    #[arg(long, env = "SIM_INTERVAL_MS", default_value_t = 2000)]
    interval_ms: u64,

    #[arg(long, env = "DATA_PATH", default_value = "invernadero/datos")]
    data_path: String,

    #[arg(long, env = "READING_PATH", default_value = "invernadero/ultima_lectura")]
    reading_path: String,
}

/// One device write: both documents as they stand after a reading.
#[derive(Debug, Clone, Default)]
struct Frame {
    datos: Value,
    ultima_lectura: Value,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting greenhouse simulator");
    info!(
        "Serving {} and {} on {}, interval {}ms",
        args.data_path, args.reading_path, args.addr, args.interval_ms
    );

    let mut device = GreenhouseDevice::new();
    let (tx, rx) = watch::channel(frame(&device));

    let interval = Duration::from_millis(args.interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut readings = 0u64;
        loop {
            ticker.tick().await;
            {
                let mut rng = rand::thread_rng();
                device.step(&mut rng);
            }
            tx.send_replace(frame(&device));

            readings += 1;
            if readings % 100 == 0 {
                info!("Published {} readings", readings);
            }
        }
    });

    let app = Router::new()
        .route(&route(&args.data_path), get(stream_datos))
        .route(&route(&args.reading_path), get(stream_ultima_lectura))
        .with_state(rx);

    let listener = match tokio::net::TcpListener::bind(args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", args.addr, e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }
}

fn route(path: &str) -> String {
    format!("/{}.json", path.trim_matches('/'))
}

fn datos(frame: &Frame) -> &Value {
    &frame.datos
}

fn ultima_lectura(frame: &Frame) -> &Value {
    &frame.ultima_lectura
}

fn frame(device: &GreenhouseDevice) -> Frame {
    Frame {
        datos: serde_json::to_value(device.datos()).unwrap_or(Value::Null),
        ultima_lectura: serde_json::to_value(device.ultima_lectura()).unwrap_or(Value::Null),
    }
}

async fn stream_datos(
    State(rx): State<watch::Receiver<Frame>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Client subscribed to data");
    Sse::new(document_stream(rx, datos, true)).keep_alive(KeepAlive::default())
}

async fn stream_ultima_lectura(
    State(rx): State<watch::Receiver<Frame>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Client subscribed to last reading");
    Sse::new(document_stream(rx, ultima_lectura, false)).keep_alive(KeepAlive::default())
}

/// Full `put` of the document, then one event per device reading: a root
/// `patch` when `incremental`, a full `put` otherwise.
fn document_stream(
    mut rx: watch::Receiver<Frame>,
    pick: fn(&Frame) -> &Value,
    incremental: bool,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = store_event("put", pick(&rx.borrow_and_update()));

    let updates = stream::unfold(rx, move |mut rx| async move {
        rx.changed().await.ok()?;
        let event = {
            let frame = rx.borrow_and_update();
            let kind = if incremental { "patch" } else { "put" };
            store_event(kind, pick(&frame))
        };
        Some((Ok(event), rx))
    });

    stream::once(async move { Ok(initial) }).chain(updates)
}

fn store_event(kind: &str, data: &Value) -> Event {
    Event::default()
        .event(kind)
        .data(json!({ "path": "/", "data": data }).to_string())
}
