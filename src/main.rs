use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camlink::capture::{FramePool, TestPattern};
use camlink::config::{self, AppConfig};
use camlink::pipeline::FramePipeline;
use camlink::stream::{FrameReceiver, StreamingClient, TcpConnector};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// camlink command line arguments
#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(version, about = "Stream camera frames as JPEG over TCP", long_about = None)]
struct CliArgs {
    /// Configuration file (default: $CAMLINK_CONFIG)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream the built-in test pattern to a receiver
    Send {
        /// Receiver host (overrides config)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Receiver port (overrides config)
        #[arg(short = 'p', long, value_name = "PORT")]
        port: Option<u16>,

        /// Maximum frames per second (overrides config)
        #[arg(long, value_name = "FPS")]
        max_fps: Option<u32>,

        /// JPEG quality 1-100 (overrides config)
        #[arg(short = 'q', long, value_name = "QUALITY")]
        quality: Option<u8>,

        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        duration_secs: Option<u64>,
    },

    /// Accept frames from senders
    Receive {
        /// Listen address (overrides config)
        #[arg(long, value_name = "ADDRESS")]
        listen: Option<String>,

        /// Write the newest frame to DIR/latest.jpg (overrides config)
        #[arg(short = 'o', long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose, args.json_logs);

    tracing::info!("Starting camlink v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(get_config_path);
    let mut config = config::load_or_default(config_path.as_deref()).await?;

    match args.command {
        Command::Send {
            host,
            port,
            max_fps,
            quality,
            duration_secs,
        } => {
            // Apply CLI argument overrides to config (only if explicitly specified)
            if let Some(host) = host {
                config.stream.host = host;
            }
            if let Some(port) = port {
                config.stream.port = port;
            }
            if let Some(max_fps) = max_fps {
                config.video.max_fps = max_fps;
            }
            if let Some(quality) = quality {
                config.video.quality = quality;
            }
            config.validate()?;
            run_send(config, duration_secs.map(Duration::from_secs)).await
        }
        Command::Receive { listen, output_dir } => {
            if let Some(listen) = listen {
                config.receiver.listen = listen;
            }
            if output_dir.is_some() {
                config.receiver.output_dir = output_dir;
            }
            config.validate()?;
            run_receive(config).await
        }
    }
}

/// Run the test pattern through the pipeline until Ctrl-C or `duration`
async fn run_send(config: AppConfig, duration: Option<Duration>) -> anyhow::Result<()> {
    let pool = FramePool::new(config.capture.max_images);

    let connector = TcpConnector::new(config.stream.host.clone(), config.stream.port)
        .with_connect_timeout(config.stream.connect_timeout());
    let client = StreamingClient::new(connector, config.stream.reconnect_interval());
    let pipeline = Arc::new(FramePipeline::new(
        Arc::new(pool.clone()),
        client,
        config.video.pipeline_config(),
    ));

    // Weak, so the pool's listener does not keep the pipeline alive
    let weak = Arc::downgrade(&pipeline);
    pool.set_listener(Arc::new(move || {
        if let Some(pipeline) = weak.upgrade() {
            pipeline.notify_frame_available();
        }
    }));
    pipeline.start();

    let cancel = CancellationToken::new();
    let producer =
        TestPattern::new(config.capture.pattern_config()).spawn(pool.clone(), cancel.clone())?;

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut report = tokio::time::interval(Duration::from_secs(10));
    report.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = &mut deadline => {
                tracing::info!("Duration elapsed");
                break;
            }
            _ = report.tick() => {
                let stats = pipeline.stats();
                tracing::info!(
                    state = %pipeline.client().state(),
                    sent = stats.frames_sent,
                    dropped = stats.frames_dropped,
                    rate_limited = stats.rate_limited,
                    "Streaming"
                );
            }
        }
    }

    pipeline.stop().await;
    cancel.cancel();
    match tokio::task::spawn_blocking(move || producer.join()).await? {
        Ok(frames) => tracing::info!("Test pattern produced {} frames", frames),
        Err(_) => tracing::error!("Test pattern thread panicked"),
    }

    let client = pipeline.client().stats();
    tracing::info!(
        "Sent {} frames ({} bytes) over {} connection attempts",
        client.frames_sent,
        client.bytes_sent,
        client.connect_attempts
    );
    Ok(())
}

/// Accept frames until Ctrl-C
async fn run_receive(config: AppConfig) -> anyhow::Result<()> {
    let receiver = Arc::new(
        FrameReceiver::bind(&config.receiver.listen, config.receiver.max_frame_bytes).await?,
    );
    let mut frames = receiver.subscribe();

    let output_dir = config.receiver.output_dir.clone();
    if let Some(dir) = &output_dir {
        tokio::fs::create_dir_all(dir).await?;
        tracing::info!("Writing latest frame to {}", dir.join("latest.jpg").display());
    }

    let cancel = CancellationToken::new();
    let server = {
        let receiver = receiver.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { receiver.run(cancel).await })
    };

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Shutdown signal received");
                break;
            }
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if let Some(dir) = &output_dir {
                        if let Err(e) = write_latest(dir, &frame.data).await {
                            tracing::warn!("Failed to write frame {}: {}", frame.sequence, e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    cancel.cancel();
    server.await??;

    let stats = receiver.stats();
    tracing::info!(
        "Received {} frames ({} bytes) from {} connections",
        stats.frames,
        stats.bytes,
        stats.connections
    );
    Ok(())
}

/// Replace `dir/latest.jpg` atomically
async fn write_latest(dir: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = dir.join("latest.jpg.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, dir.join("latest.jpg")).await
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "camlink=error",
        LogLevel::Warn => "camlink=warn",
        LogLevel::Info => "camlink=info",
        LogLevel::Verbose => "camlink=debug",
        LogLevel::Debug => "camlink=debug,tokio=debug",
        LogLevel::Trace => "camlink=trace,tokio=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Configuration file from the environment, if set
fn get_config_path() -> Option<PathBuf> {
    std::env::var_os("CAMLINK_CONFIG").map(PathBuf::from)
}
