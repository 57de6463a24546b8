/*
[INPUT]:  Market identifiers, intervals and time windows
[OUTPUT]: Snapshot data (klines, depth, trades, tickers)
[POS]:    HTTP layer - public market data endpoints (no auth required)
[UPDATE]: When adding new public endpoints or changing response format
*/

use reqwest::Method;

use crate::http::{FeedError, Result, SnapshotClient};
use crate::types::{
    ApiResponse, DepthBook, DepthResponse, Interval, MarketTicker, RawBarRecord, TradeRecord,
};

impl SnapshotClient {
    /// Get kline/candlestick history
    ///
    /// GET /klines?market={market}&interval={interval}&startTime={start}&endTime={end}
    pub async fn get_klines(
        &self,
        market: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawBarRecord>> {
        let builder = self.request(Method::GET, "/klines")?.query(&[
            ("market", market.to_string()),
            ("interval", interval.as_str().to_string()),
            ("startTime", start_ms.to_string()),
            ("endTime", end_ms.to_string()),
        ]);
        let response: ApiResponse<Vec<RawBarRecord>> = self.send_json(builder).await?;
        unwrap_api_response(response, "Failed to fetch klines")
    }

    /// Query order book depth
    ///
    /// GET /depth?market={market}
    pub async fn get_depth(&self, market: &str) -> Result<DepthBook> {
        let builder = self
            .request(Method::GET, "/depth")?
            .query(&[("market", market)]);
        let response: DepthResponse = self.send_json(builder).await?;
        Ok(response.into_book())
    }

    /// Get recent trades
    ///
    /// GET /trades?market={market}
    pub async fn get_trades(&self, market: &str) -> Result<Vec<TradeRecord>> {
        let builder = self
            .request(Method::GET, "/trades")?
            .query(&[("market", market)]);
        let response: ApiResponse<Vec<TradeRecord>> = self.send_json(builder).await?;
        unwrap_api_response(response, "Failed to fetch trades")
    }

    /// List all markets
    ///
    /// GET /market/markets
    pub async fn get_tickers(&self) -> Result<Vec<MarketTicker>> {
        let builder = self.request(Method::GET, "/market/markets")?;
        self.send_json(builder).await
    }

    /// Find the listing for one market; trailing `_` in the market name is ignored
    pub async fn get_ticker(&self, market: &str) -> Result<MarketTicker> {
        let wanted = market.trim_end_matches('_');
        self.get_tickers()
            .await?
            .into_iter()
            .find(|ticker| ticker.base_asset == wanted)
            .ok_or_else(|| FeedError::NotFound(format!("No ticker found for {market}")))
    }
}

fn unwrap_api_response<T>(response: ApiResponse<T>, fallback: &str) -> Result<T> {
    if !response.success {
        return Err(FeedError::Api {
            code: 0,
            message: response.error.unwrap_or_else(|| fallback.to_string()),
        });
    }
    response
        .data
        .ok_or_else(|| FeedError::InvalidResponse(format!("{fallback}: missing data")))
}
