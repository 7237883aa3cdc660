use bithumb_stream::bithumb::FeedKind;
use bithumb_stream::{PriceStreamClient, StreamConfig, StreamEvent};
use tracing_subscriber::EnvFilter;

const DEFAULT_SYMBOLS: &str = "BTC_KRW,ETH_KRW";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let (symbols, feed) = parse_args(&args);

    // Logs go to stderr; stdout carries the quote lines
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter())
        .init();

    let mut config = StreamConfig::from_env()?;
    if let Some(feed) = feed {
        config.feed = feed;
    }

    tracing::info!(url = %config.url, feed = %config.feed, "Starting price stream");

    let client = PriceStreamClient::new(config);
    let mut subscription = client.connect(&symbols)?;
    let mut events = client.events();

    loop {
        tokio::select! {
            update = subscription.recv() => match update {
                Some(Ok(quote)) => {
                    let volume = quote.volume.map(|v| v.to_string()).unwrap_or_default();
                    println!("{}\t{}\t{}\t{}", quote.timestamp.to_rfc3339(), quote.symbol, quote.price, volume);
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Price stream failed");
                    client.shutdown().await;
                    return Err(e.into());
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(StreamEvent::StateChanged(state)) => tracing::info!(state = %state, "Connection status"),
                Ok(StreamEvent::MalformedMessage { reason }) => tracing::debug!(reason = %reason, "Malformed message dropped"),
                Ok(StreamEvent::ServerStatus { status, message }) => {
                    tracing::warn!(status = %status, message = %message, "Server status")
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event receiver lagged")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::error!("Failed to listen for shutdown signal: {}", err);
                }
                tracing::info!("Received shutdown signal (Ctrl+C)");
                break;
            }
        }
    }

    subscription.cancel();
    client.shutdown().await;
    tracing::info!("Price stream stopped");
    Ok(())
}

/// Parse command-line arguments
fn parse_args(args: &[String]) -> (Vec<String>, Option<FeedKind>) {
    let mut symbols = DEFAULT_SYMBOLS.to_string();
    let mut feed = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--symbols" | "-s" => {
                if i + 1 < args.len() {
                    symbols = args[i + 1].clone();
                    i += 1;
                }
            }
            "--feed" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(kind) => feed = Some(kind),
                        Err(e) => {
                            eprintln!("{}", e);
                            print_usage();
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let symbols = symbols
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    (symbols, feed)
}

/// Log filter from `RUST_LOG`, INFO when unset or invalid
fn log_filter() -> EnvFilter {
    log_filter_from(std::env::var("RUST_LOG").ok().as_deref())
}

fn log_filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Print usage information
fn print_usage() {
    println!("bithumb-stream - live cryptocurrency prices from the Bithumb public WebSocket");
    println!();
    println!("USAGE:");
    println!("    bithumb-stream [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -s, --symbols <LIST>   Comma-separated symbols (default: {})", DEFAULT_SYMBOLS);
    println!("    --feed <FEED>          Push channel: transaction or ticker (default: transaction)");
    println!("    --help, -h             Print this help message");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    BITHUMB_WS_URL                     WebSocket endpoint (default: wss://pubwss.bithumb.com/pub/ws)");
    println!("    PRICE_STREAM_FEED                  transaction or ticker");
    println!("    PRICE_STREAM_RECONNECT_BASE_MS     First reconnect delay (default: 1000)");
    println!("    PRICE_STREAM_RECONNECT_MAX_MS      Reconnect delay cap (default: 30000)");
    println!("    PRICE_STREAM_RECONNECT_JITTER      Jitter fraction 0.0-1.0 (default: 0.1)");
    println!("    PRICE_STREAM_MAX_RECONNECTS        Reconnects before giving up (default: unlimited)");
    println!("    PRICE_STREAM_QUEUE_CAPACITY        Per-subscriber queue size (default: 256)");
    println!("    PRICE_STREAM_OVERFLOW              drop-oldest or drop-newest (default: drop-oldest)");
    println!("    PRICE_STREAM_CONNECT_TIMEOUT_SECS  Connect attempt timeout (default: 10)");
    println!("    RUST_LOG                           Logging level (default: info)");
    println!();
    println!("EXAMPLES:");
    println!("    # Stream BTC and XRP trades");
    println!("    bithumb-stream --symbols BTC_KRW,XRP_KRW");
    println!();
    println!("    # Stream the 24h ticker instead of trades");
    println!("    bithumb-stream --feed ticker");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter_from(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter_from(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_rust_log_overrides_level() {
        assert_eq!(log_filter_from(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter_from(Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_parse_args_symbols_and_feed() {
        let args: Vec<String> = ["bithumb-stream", "-s", "btc_krw, XRP_KRW,", "--feed", "ticker"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (symbols, feed) = parse_args(&args);
        assert_eq!(symbols, vec!["btc_krw".to_string(), "XRP_KRW".to_string()]);
        assert_eq!(feed, Some(FeedKind::Ticker));
    }
}
