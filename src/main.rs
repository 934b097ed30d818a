//! Order book depth aggregator entry point.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use time::macros::format_description;
use time::UtcOffset;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use depth_aggregator::api::{self, AppState};
use depth_aggregator::config::Config;
use depth_aggregator::exchange::venue_sources;
use depth_aggregator::live::{CostReport, LiveRefreshController};
use depth_aggregator::metrics;
use depth_aggregator::orderbook::OrderBookAggregator;
use depth_aggregator::stream::{ConnectionEvent, StreamingConnection};
use depth_aggregator::utils::{spawn_signal_listener, ShutdownToken};

/// Multi-venue BTC order book depth aggregator.
#[derive(Parser, Debug)]
#[command(name = "depth-aggregator")]
#[command(about = "Aggregate exchange order books and estimate execution cost")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh once and print buy cost and sell proceeds (default).
    Cost {
        /// Quantity to price (defaults to DEFAULT_QUANTITY).
        #[arg(short, long)]
        quantity: Option<Decimal>,
    },

    /// Refresh continuously and redraw the estimate.
    Live {
        /// Milliseconds between refreshes (defaults to REFRESH_INTERVAL_MS).
        #[arg(short, long)]
        interval: Option<u64>,

        /// Quantity to price (defaults to DEFAULT_QUANTITY).
        #[arg(short, long)]
        quantity: Option<Decimal>,

        /// HTTP server port for health/metrics (defaults to API_PORT, off if unset).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Connect a streaming connection and print its events (diagnostic).
    StreamTest {
        /// ws:// or wss:// endpoint.
        #[arg(short, long)]
        uri: String,

        /// Message sent after every successful handshake.
        #[arg(long)]
        subscribe: Option<String>,

        /// How long to listen.
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("depth_aggregator=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Handle subcommands
    match args.command {
        Some(Command::Cost { quantity }) => cmd_cost(quantity).await,
        Some(Command::Live {
            interval,
            quantity,
            port,
        }) => cmd_live(interval, quantity, port).await,
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::StreamTest {
            uri,
            subscribe,
            seconds,
        }) => cmd_stream_test(uri, subscribe, seconds).await,
        None => cmd_cost(None).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().context("Configuration load failed")?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}

fn build_aggregator(config: &Config) -> anyhow::Result<OrderBookAggregator> {
    let mut aggregator = OrderBookAggregator::with_policy(config.fetch_policy);
    for source in venue_sources(config)? {
        aggregator.add_source(source);
    }
    Ok(aggregator)
}

/// Refresh once and print the estimate.
async fn cmd_cost(quantity: Option<Decimal>) -> anyhow::Result<()> {
    let config = load_config()?;
    metrics::init_metrics();

    let quantity = quantity.unwrap_or(config.default_quantity);
    let mut aggregator = build_aggregator(&config)?;

    aggregator.refresh().await?;
    let estimate = aggregator.compute_cost(quantity)?;

    println!("Buy cost ({} BTC): ${:.2}", quantity, estimate.buy_cost);
    println!("Sell proceeds ({} BTC): ${:.2}", quantity, estimate.sell_proceeds);

    Ok(())
}

/// Run the live refresh loop until Ctrl+C.
async fn cmd_live(
    interval: Option<u64>,
    quantity: Option<Decimal>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let config = load_config()?;

    let interval = interval
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.refresh_interval());
    let quantity = quantity.unwrap_or(config.default_quantity);

    let shutdown = ShutdownToken::new();
    let _signals = spawn_signal_listener(shutdown.clone());

    let mut controller =
        LiveRefreshController::new(build_aggregator(&config)?, quantity, shutdown.clone());

    match port.or(config.api_port) {
        Some(port) => {
            let handle = metrics::install_recorder()?;
            let state = AppState::new(controller.subscribe(), Some(handle));
            let token = shutdown.clone();

            // Spawn HTTP server
            tokio::spawn(async move {
                if let Err(e) = api::serve(state, port, token).await {
                    error!(error = %e, "HTTP server failed");
                }
            });
        }
        None => metrics::init_metrics(),
    }

    let reports = controller.subscribe();
    controller.start(interval)?;

    render_reports(reports, &shutdown).await;

    controller.stop().await?;
    info!("Live session finished");
    Ok(())
}

async fn render_reports(mut reports: watch::Receiver<Option<CostReport>>, shutdown: &ShutdownToken) {
    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    render(&report);
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

fn render(report: &CostReport) {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let stamp = report
        .updated_at
        .to_offset(offset)
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| report.updated_at.to_string());

    // Clear screen, cursor home
    print!("\x1B[2J\x1B[1;1H");
    println!("Last update: {}", stamp);
    println!();
    println!("Buy cost ({} BTC): ${:.2}", report.quantity, report.buy_cost);
    println!("Sell proceeds ({} BTC): ${:.2}", report.quantity, report.sell_proceeds);
    if let (Some(bid), Some(ask)) = (report.best_bid, report.best_ask) {
        println!("Best bid / ask: ${} / ${}", bid, ask);
    }
    println!(
        "Merged entries: {} bids, {} asks",
        report.bid_entries, report.ask_entries
    );
    println!();
    println!("Press Ctrl+C to exit");
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DEPTH AGGREGATOR - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Show configuration summary
    let stream = config.stream_config();
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Refresh Interval: {}ms", config.refresh_interval_ms);
    println!("  Default Quantity: {} BTC", config.default_quantity);
    println!("  Fetch Policy: {}", config.fetch_policy);
    println!("  HTTP Timeout: {}ms", config.http_timeout_ms);
    println!("  Coinbase: {}", config.coinbase_url);
    println!("  Gemini: {}", config.gemini_url);
    println!("  Kraken: {} ({})", config.kraken_url, config.kraken_pair);
    println!(
        "  Stream Reconnect: {} attempts every {}ms ({})",
        stream.max_reconnect_attempts,
        config.ws_reconnect_interval_ms,
        if stream.auto_reconnect { "Enabled" } else { "Disabled" }
    );
    match config.api_port {
        Some(port) => println!("  API Port: {}", port),
        None => println!("  API Port: Disabled"),
    }
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Connect to a streaming endpoint and print events.
async fn cmd_stream_test(uri: String, subscribe: Option<String>, seconds: u64) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DEPTH AGGREGATOR - STREAM TEST");
    println!("======================================================================");

    let config = load_config()?;
    metrics::init_metrics();

    let shutdown = ShutdownToken::new();
    let _signals = spawn_signal_listener(shutdown.clone());

    let (mut connection, mut events) = StreamingConnection::new(config.stream_config());
    connection.connect(&uri)?;
    println!("Connecting to {} for {}s...", uri, seconds);

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut message_count = 0u64;

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                ConnectionEvent::Connected => {
                    println!("  Connected");
                    if let Some(message) = &subscribe {
                        if connection.send(message.as_str()) {
                            println!("  Sent: {}", message);
                        }
                    }
                }
                ConnectionEvent::Message(text) => {
                    message_count += 1;
                    println!("  [{}] {}", message_count, text);
                }
                ConnectionEvent::Error(e) => println!("  Error: {}", e),
                ConnectionEvent::Reconnecting { attempt, max_attempts } => {
                    println!("  Reconnecting ({}/{})...", attempt, max_attempts);
                }
                ConnectionEvent::ReconnectExhausted { attempts } => {
                    println!("  Gave up after {} attempts", attempts);
                    break;
                }
                ConnectionEvent::Disconnected => {
                    println!("  Disconnected");
                    break;
                }
            },
            _ = &mut deadline => break,
            _ = shutdown.cancelled() => break,
        }
    }

    connection.close().await;

    println!("======================================================================");
    println!("STREAM TEST COMPLETE");
    println!("  Messages received: {}", message_count);
    println!("  Final state: {}", connection.state());
    println!("======================================================================");

    Ok(())
}
