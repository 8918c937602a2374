//! Warden Daemon
//!
//! Reads runner inputs as newline-delimited JSON on stdin and manages one
//! position against the stub gateway.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p wardend < inputs.ndjson
//!
//! # Start with custom protection
//! WARDEN_STOP_DISTANCE=1% WARDEN_PROTECTION_MODE=resting cargo run -p wardend
//! ```
//!
//! # Environment Variables
//!
//! - `WARDEN_ENV`: Environment (test, development, production)
//! - `WARDEN_SYMBOL`: Instrument (default: BTCUSDT)
//! - `WARDEN_STUB_PRICE`: Stub fill price (default: 100)
//! - `WARDEN_STOP_DISTANCE`, `WARDEN_TAKE_DISTANCE`: Protective distances
//! - `WARDEN_PROTECTION_MODE`: `polled` or `resting` (default: polled)
//! - `WARDEN_EXPOSURE_CAP`: Maximum position volume per direction

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use warden_engine::Engine;
use warden_exec::{Executor, IntentJournal, StubGateway};
use wardend::{Config, DaemonEvent, EventBus, StrategyRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("wardend=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        symbol = %config.symbol,
        protection_mode = ?config.risk.protection_mode,
        "Warden Daemon"
    );

    let (gateway, updates) = StubGateway::with_updates(config.stub.fill_price);
    let gateway = Arc::new(gateway);
    let executor = Executor::new(gateway.clone(), Arc::new(IntentJournal::new()));
    let engine = Engine::new(config.symbol.clone(), config.risk.clone())?;
    let event_bus = Arc::new(EventBus::new(config.channel_capacity));

    // Event log
    let mut events = event_bus.subscribe();
    let event_log = tokio::spawn(async move {
        while let Some(received) = events.recv().await {
            match received {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to encode event"),
                },
                Err(e) => warn!(error = %e, "Event log fell behind"),
            }
        }
    });

    let (tx, rx) = mpsc::channel(config.channel_capacity);

    // Stdin reader
    let stdin_tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match DaemonEvent::from_json_line(&line) {
                    Ok(input) => {
                        if stdin_tx.send(input).await.is_err() {
                            break;
                        }
                    },
                    Err(e) => warn!(error = %e, "Skipping input line"),
                },
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    break;
                },
            }
        }
        let _ = stdin_tx.send(DaemonEvent::Shutdown).await;
    });

    // Ctrl-C
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = tx.send(DaemonEvent::Shutdown).await;
        }
    });

    // The stub sees every bar and quote so it fills at market prices and
    // triggers resting stops and targets
    let runner =
        StrategyRunner::new(engine, executor, updates, event_bus).with_market_data(gateway);
    let engine = runner.run(rx).await?;

    // The runner held the last bus handle; flush what it published
    if let Err(e) = event_log.await {
        warn!(error = %e, "Event log task failed");
    }

    info!(
        state = engine.state().name(),
        consecutive_losses = engine.sizing().state().consecutive_losses,
        "Warden Daemon stopped"
    );

    Ok(())
}
