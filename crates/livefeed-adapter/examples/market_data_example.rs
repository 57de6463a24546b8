/*
[INPUT]:  Market identifier (e.g., "SOL_USDC")
[OUTPUT]: Snapshot market data (tickers, depth, trades, klines)
[POS]:    Examples - public snapshot queries
[UPDATE]: When adding new snapshot endpoints
*/

use livefeed_adapter::*;

/// Example: Query snapshot market data from the REST API
#[tokio::main]
async fn main() {
    println!("=== Livefeed Snapshot Example ===\n");

    let client = match SnapshotClient::new() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };
    println!("✓ HTTP client created ({})\n", client.base_url());

    let market = "SOL_USDC";

    println!("Querying tickers...");
    match client.get_tickers().await {
        Ok(tickers) => println!("✓ {} markets listed", tickers.len()),
        Err(e) => println!("✗ Error: {}", e),
    }

    println!("\nQuerying depth for {}...", market);
    match client.get_depth(market).await {
        Ok(depth) => println!("✓ Depth: {} bids / {} asks", depth.bids.len(), depth.asks.len()),
        Err(e) => println!("✗ Error: {}", e),
    }

    println!("\nQuerying recent trades for {}...", market);
    match client.get_trades(market).await {
        Ok(trades) => println!("✓ {} trades", trades.len()),
        Err(e) => println!("✗ Error: {}", e),
    }

    let end_ms = chrono::Utc::now().timestamp_millis();
    let interval = Interval::OneHour;
    let start_ms = end_ms - interval.lookback().as_millis() as i64;
    println!("\nQuerying {} klines for {}...", interval, market);
    match client.get_klines(market, interval, start_ms, end_ms).await {
        Ok(records) => println!("✓ {} bars", records.len()),
        Err(e) => println!("✗ Error: {}", e),
    }

    println!("\n✓ Snapshot example complete");
}
