/*!
[Polygon](https://polygon.io/)-specific data fetching code
*/
use super::{clean_bars, Bar, DataError, MarketData};
use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

/// The Polygon REST API root
pub const POLYGON_API: &str = "https://api.polygon.io";

/// The date format Polygon expects in aggregate requests
pub const POLYGON_DATE: &str = "%Y-%m-%d";

/// One aggregate bar, as returned by Polygon
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct Aggregate {
    /// Start of the aggregate window, in milliseconds since the Unix epoch
    pub t: i64,
    /// The volume traded
    pub v: f64,
    /// The opening price
    pub o: f64,
    /// The closing price
    pub c: f64,
    /// The high price
    pub h: f64,
    /// The low price
    pub l: f64,
    /// The volume weighted average price
    #[serde(default)]
    pub vw: Option<f64>,
    /// The number of trades
    #[serde(default)]
    pub n: Option<f64>,
}

impl Aggregate {
    /// Convert an aggregate to a daily bar, dating it by its UTC calendar day
    pub fn to_bar(&self) -> Option<Bar> {
        let date = DateTime::from_timestamp_millis(self.t)?.date_naive();
        Some(Bar {
            date,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
        })
    }
}

/// A page of an aggregates response
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatesResponse {
    /// The response status, `OK` or `DELAYED` on success
    pub status: String,
    /// The aggregates on this page
    #[serde(default)]
    pub results: Vec<Aggregate>,
    /// The URL of the next page, if any
    #[serde(default)]
    pub next_url: Option<String>,
    /// The error message, if the request failed
    #[serde(default)]
    pub error: Option<String>,
}

impl AggregatesResponse {
    /// Turn an error status into a `DataError`
    pub fn check(self) -> Result<AggregatesResponse, DataError> {
        if self.status == "ERROR" || self.status == "NOT_AUTHORIZED" {
            let message = self.error.clone().unwrap_or_else(|| self.status.clone());
            return Err(DataError::Api(message));
        }
        Ok(self)
    }
}

/// A blocking client for Polygon's daily aggregates endpoint
#[derive(Clone)]
pub struct PolygonClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PolygonClient {
    /// Create a client using the given API key
    pub fn new(api_key: impl Into<String>) -> PolygonClient {
        PolygonClient {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: POLYGON_API.to_string(),
        }
    }
    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> PolygonClient {
        self.base_url = base_url.into();
        self
    }
    /// The first page URL for a symbol's daily aggregates over an inclusive date range
    pub fn aggregates_url(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol,
            from.format(POLYGON_DATE),
            to.format(POLYGON_DATE)
        )
    }

    fn page(&self, url: &str, first: bool) -> Result<AggregatesResponse, DataError> {
        let mut request = self.client.get(url).query(&[("apiKey", self.api_key.as_str())]);
        if first {
            request = request.query(&[("adjusted", "true"), ("sort", "asc"), ("limit", "50000")]);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return Err(DataError::Api(format!("{}: {}", status, body)));
        }
        response.json::<AggregatesResponse>()?.check()
    }
}

impl MarketData for PolygonClient {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError> {
        // Polygon ranges are inclusive, ours are not
        let last = end.pred_opt().unwrap_or(end);
        let mut url = self.aggregates_url(symbol, start, last);
        let mut first = true;
        let mut bars = Vec::new();
        loop {
            let page = self.page(&url, first)?;
            debug!("{}: fetched {} aggregates", symbol, page.results.len());
            for aggregate in &page.results {
                let bar = aggregate.to_bar().ok_or_else(|| {
                    DataError::Parse(format!("timestamp out of range: {}", aggregate.t))
                })?;
                bars.push(bar);
            }
            match page.next_url {
                Some(next) => {
                    url = next;
                    first = false;
                }
                None => break,
            }
        }
        let bars = clean_bars(bars, start, end);
        if bars.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "ticker": "AAPL",
        "queryCount": 2,
        "resultsCount": 2,
        "adjusted": true,
        "results": [
            {"v": 135647456.0, "vw": 74.6099, "o": 74.06, "c": 75.0875, "h": 75.15, "l": 73.7975, "t": 1577941200000, "n": 1},
            {"v": 146535512.0, "vw": 74.7026, "o": 74.2875, "c": 74.3575, "h": 75.145, "l": 74.125, "t": 1578027600000, "n": 1}
        ],
        "status": "OK",
        "request_id": "6a7e466379af0a71039d60cc78e72282",
        "next_url": "https://api.polygon.io/v2/aggs/ticker/AAPL/range/1/day/cursor"
    }"#;

    #[test]
    fn aggregates_become_bars() {
        let page: AggregatesResponse = serde_json::from_str(PAGE).unwrap();
        let page = page.check().unwrap();
        assert_eq!(page.results.len(), 2);
        assert!(page.next_url.is_some());
        let bar = page.results[0].to_bar().unwrap();
        assert_eq!(bar.date, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        assert_eq!(bar.close, 75.0875);
        assert_eq!(bar.volume, 135647456.0);
    }

    #[test]
    fn error_status_is_reported() {
        let page: AggregatesResponse =
            serde_json::from_str(r#"{"status": "ERROR", "error": "Unknown API Key"}"#).unwrap();
        match page.check() {
            Err(DataError::Api(message)) => assert_eq!(message, "Unknown API Key"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn urls_use_inclusive_dates() {
        let client = PolygonClient::new("key").with_base_url("http://localhost");
        let from = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            client.aggregates_url("AAPL", from, to),
            "http://localhost/v2/aggs/ticker/AAPL/range/1/day/2010-01-01/2024-01-01"
        );
    }
}
