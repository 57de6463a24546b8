/*
[INPUT]:  Stream URL and a market to watch
[OUTPUT]: Real-time depth/trade updates printed to stdout
[POS]:    Examples - WebSocket stream handling
[UPDATE]: When WebSocket API changes
*/

use livefeed_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: Live market stream
///
/// Subscribing before `open` is fine: messages are queued and flushed in order
/// once the connection is up.
#[tokio::main]
async fn main() {
    println!("=== Livefeed Stream Example ===\n");

    let stream = MarketStream::new(DEFAULT_STREAM_URL);
    let market = "SOL_USDC";

    stream.register_depth(market, |depth| {
        println!("depth: {} bids / {} asks", depth.bids.len(), depth.asks.len());
    });
    stream.register_trade(market, |trade| {
        println!("trade: {} @ {} ({:?})", trade.quantity, trade.price, trade.side);
    });

    stream.subscribe(&Room::depth(market));
    stream.subscribe(&Room::trade(market));

    if let Err(e) = stream.open() {
        eprintln!("Failed to open stream: {}", e);
        return;
    }
    println!("✓ Stream opening ({})", DEFAULT_STREAM_URL);

    sleep(Duration::from_secs(10)).await;

    stream.unsubscribe(&Room::depth(market));
    stream.unsubscribe(&Room::trade(market));
    sleep(Duration::from_millis(200)).await;
    stream.close();

    let stats = stream.router_stats();
    println!(
        "\n✓ Stream example complete ({} frames, {} dispatched)",
        stats.frames, stats.dispatched
    );
}
