use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use sockprobe::config::{LoggingConfig, SockprobeConfig};
use sockprobe::encoding::Encoding;
use sockprobe::loadtest::LoadTestConfig;
use sockprobe::notify::Notification;

#[derive(Parser)]
#[command(
    name = "sockprobe",
    about = "Multi-connection TCP client diagnostics and synthetic load generator",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "SOCKPROBE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control API
    Serve {
        /// Bind address (overrides api.listen_address)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Connect, send one message, and print what comes back
    Send {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: u16,

        /// Message text, interpreted according to --encoding
        #[arg(long)]
        message: String,

        /// utf8, ascii, binary (latin1), hex, base64, utf16le
        #[arg(long, default_value = "utf8")]
        encoding: Encoding,

        /// How long to wait for responses
        #[arg(long, default_value = "1000")]
        wait_ms: u64,
    },

    /// Open connections and broadcast random payloads on a timer
    LoadTest {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: u16,

        /// Number of parallel connections
        #[arg(long, default_value = "1")]
        connections: u32,

        /// Milliseconds between messages
        #[arg(long)]
        interval: Option<u64>,

        /// Characters per message
        #[arg(long)]
        length: Option<usize>,

        /// Characters to sample from
        #[arg(long)]
        charset: Option<String>,

        #[arg(long)]
        encoding: Option<Encoding>,

        /// Test duration
        #[arg(long, default_value = "10")]
        duration_secs: u64,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SockprobeConfig::load(path)?,
        None => SockprobeConfig::load_or_default(),
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.listen_address = bind;
            }
            tracing::info!(bind = %config.api.listen_address, "Starting sockprobe control API");
            sockprobe::serve(&config).await?;
        }
        Commands::Send {
            host,
            port,
            message,
            encoding,
            wait_ms,
        } => {
            run_send(&config, &host, port, &message, encoding, wait_ms).await?;
        }
        Commands::LoadTest {
            host,
            port,
            connections,
            interval,
            length,
            charset,
            encoding,
            duration_secs,
        } => {
            let defaults = config.load_test.clone();
            let load_config = LoadTestConfig {
                interval_ms: interval.unwrap_or(defaults.interval_ms),
                random_length: length.unwrap_or(defaults.random_length),
                charset: charset.unwrap_or(defaults.charset),
                encoding: encoding.unwrap_or(defaults.encoding),
            };
            run_load_test(&config, &host, port, connections, load_config, duration_secs).await?;
        }
    }

    Ok(())
}

async fn run_send(
    config: &SockprobeConfig,
    host: &str,
    port: u16,
    message: &str,
    encoding: Encoding,
    wait_ms: u64,
) -> Result<()> {
    let state = sockprobe::app_state(config);
    let mut events = state.notifier.subscribe();

    let id = state
        .manager
        .connect(host, port)
        .await
        .context("connect failed")?;
    println!("Connected to {}:{} as {}", host, port, id);

    state
        .manager
        .send(message, encoding, Some(id.as_str()))
        .await
        .context("send failed")?;
    println!("Sent ({}): {}", encoding, message);

    let deadline = tokio::time::sleep(Duration::from_millis(wait_ms));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(Notification::Data { payload, .. }) => {
                    println!("Received ({}): {}", encoding, encoding.decode(&payload));
                }
                Ok(Notification::Disconnected { .. }) => {
                    println!("Server closed the connection");
                    break;
                }
                Ok(Notification::Error { message, .. }) => {
                    eprintln!("Error: {}", message);
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    state.manager.disconnect(None).await;
    Ok(())
}

async fn run_load_test(
    config: &SockprobeConfig,
    host: &str,
    port: u16,
    connections: u32,
    load_config: LoadTestConfig,
    duration_secs: u64,
) -> Result<()> {
    let state = sockprobe::app_state(config);
    let mut events = state.notifier.subscribe();

    for _ in 0..connections.max(1) {
        if let Err(e) = state.manager.connect(host, port).await {
            tracing::warn!(error = %e, "connection attempt failed");
        }
    }
    let opened = state.manager.connection_count().await;
    if opened == 0 {
        anyhow::bail!("could not open any connection to {}:{}", host, port);
    }

    println!(
        "Running load test against {}:{} for {}s ({} connections, {}ms interval, {} chars)...",
        host, port, duration_secs, opened, load_config.interval_ms, load_config.random_length
    );
    state
        .load_generator
        .start(load_config)
        .await
        .context("failed to start load test")?;

    let mut messages_sent: u64 = 0;
    let mut bytes_received: usize = 0;
    let mut errors: u64 = 0;

    let deadline = tokio::time::sleep(Duration::from_secs(duration_secs));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(Notification::LoadTestMessageSent { .. }) => messages_sent += 1,
                Ok(Notification::Data { payload, .. }) => bytes_received += payload.len(),
                Ok(Notification::Error { message, connection_id }) => {
                    errors += 1;
                    tracing::warn!(?connection_id, %message, "error during load test");
                }
                Ok(Notification::LoadTestStopped) => {
                    println!("All connections lost, load test stopped early");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    state.load_generator.stop().await;
    let remaining = state.manager.connection_count().await;
    state.manager.disconnect(None).await;

    println!("\n=== sockprobe Load Test Summary ===");
    println!("{:<20} : {}", "Connections opened", opened);
    println!("{:<20} : {}", "Connections at end", remaining);
    println!("{:<20} : {}", "Messages sent", messages_sent);
    println!("{:<20} : {}", "Bytes received", bytes_received);
    println!("{:<20} : {}", "Errors", errors);
    println!("===================================\n");

    Ok(())
}
