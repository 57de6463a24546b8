/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Live boards and candle feeds running until shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use livefeed_adapter::{Interval, MarketStream, SessionEvent, SnapshotClient};
use livefeed_chart::{
    ChartConfig, FeedCoordinator, KlineSource, LogSink, MarketBoard, SeriesConfig,
};

#[derive(Parser, Debug)]
#[command(name = "livefeed-chart", version, about = "Live market board and candle feed runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Chart only this market (replaces the configured series)
    #[arg(long = "market", value_name = "MARKET")]
    market: Option<String>,
    /// Interval for --market
    #[arg(long = "interval", value_name = "INTERVAL", default_value = "1m")]
    interval: Interval,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = ?args.config_path,
        dry_run = args.dry_run,
        "starting livefeed-chart"
    );

    let mut config = load_config(args.config_path.as_ref())?;
    if let Some(market) = args.market.clone() {
        config.series = vec![SeriesConfig {
            market,
            interval: args.interval,
        }];
    }
    config.validate().context("validate config")?;
    info!(series_count = config.series.len(), "configuration loaded");

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let client = SnapshotClient::with_config_and_base_url(config.client_config(), &config.api_base_url)
        .context("build snapshot client")?;
    let stream = Arc::new(MarketStream::new(config.stream_url.clone()));
    spawn_event_logger(&stream, shutdown.clone());

    let mut boards = Vec::new();
    for market in config.markets() {
        let board = MarketBoard::new(market.clone());
        seed_board(&client, &board).await;
        let listeners = board
            .attach(&stream)
            .with_context(|| format!("attach board market={market}"))?;
        boards.push((board, listeners));
    }

    stream.open().context("open market stream")?;

    let source: Arc<dyn KlineSource> = Arc::new(client.clone());
    let sink = Arc::new(LogSink::new());
    let mut feeds = Vec::new();
    for series in &config.series {
        let feed = FeedCoordinator::with_shutdown(
            source.clone(),
            sink.clone(),
            config.poll_interval(),
            shutdown.child_token(),
        );
        // Snapshot failures are recoverable; keep the rest of the runner going.
        if let Err(err) = feed.activate(&series.market, series.interval).await {
            warn!(market = %series.market, interval = %series.interval, error = %err, "series activation failed");
        }
        feeds.push(feed);
    }
    info!(feeds = feeds.len(), boards = boards.len(), "feeds started");

    shutdown.cancelled().await;
    info!("shutdown signal received");

    for feed in &feeds {
        feed.shutdown().await;
    }
    for (board, listeners) in &boards {
        board.detach(&stream, listeners);
        info!(
            market = board.market(),
            trades = board.trades().len(),
            has_depth = board.depth().is_some(),
            "board detached"
        );
    }
    stream.close();

    let stats = stream.router_stats();
    info!(
        frames = stats.frames,
        decoded = stats.decoded,
        dispatched = stats.dispatched,
        dropped = stats.dropped,
        listener_panics = stats.listener_panics,
        "market stream shutdown complete"
    );

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<ChartConfig> {
    let Some(path) = path else {
        return Ok(ChartConfig::default());
    };
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    ChartConfig::from_file(path_str).context("load config")
}

/// Depth and recent trades come from REST first so the board is not empty until the
/// first stream frame.
async fn seed_board(client: &SnapshotClient, board: &MarketBoard) {
    match client.get_depth(board.market()).await {
        Ok(depth) => board.set_depth(depth),
        Err(err) => warn!(market = board.market(), error = %err, "depth snapshot failed"),
    }
    match client.get_trades(board.market()).await {
        Ok(trades) => board.seed_trades(&trades),
        Err(err) => warn!(market = board.market(), error = %err, "trades snapshot failed"),
    }
}

fn spawn_event_logger(stream: &MarketStream, shutdown: CancellationToken) {
    let mut events = stream.events();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(SessionEvent::Opened) => info!("market stream open"),
                    Ok(SessionEvent::Closed) => warn!("market stream closed; restart to reconnect"),
                    Ok(SessionEvent::Error(error)) => warn!(error = %error, "market stream error"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "market stream events lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
