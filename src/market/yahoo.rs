use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use chrono_tz::{America::New_York, Tz};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::data::{PriceFrame, CLOSE, HIGH, LOW, OPEN, VOLUME};
use crate::market::{FetchError, FetchRequest, MarketDataSource};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = concat!("extrema-finder/", env!("CARGO_PKG_VERSION"));

/// Daily bars from the Yahoo Finance chart endpoint, fetched synchronously.
pub struct YahooClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl YahooClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        })
    }

    /// Point the client at another chart endpoint, e.g. a mirror or proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn describe(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("request timed out after {}s", self.timeout.as_secs_f64())
        } else {
            err.to_string()
        }
    }
}

impl MarketDataSource for YahooClient {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError> {
        // Bars are stamped at exchange-local midnight, which is the previous
        // UTC day east of Greenwich; the date filter trims the extra day.
        let period_start = request
            .start
            .checked_sub_days(Days::new(1))
            .unwrap_or(request.start);
        // The provider treats the upper bound as exclusive.
        let period_end = request
            .end
            .checked_add_days(Days::new(1))
            .unwrap_or(request.end);
        let url = format!("{}/{}", self.base_url, request.ticker);
        info!(%request, "fetching daily bars");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", unix_midnight(period_start).to_string()),
                ("period2", unix_midnight(period_end).to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .map_err(|err| FetchError::data_fetch(request, self.describe(&err)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::no_data(request));
        }
        if !status.is_success() {
            return Err(FetchError::data_fetch(
                request,
                format!("provider answered with HTTP {status}"),
            ));
        }

        let payload: ChartResponse = response
            .json()
            .map_err(|err| FetchError::data_fetch(request, self.describe(&err)))?;
        let frame = frame_from_chart(request, payload)?;
        debug!(rows = frame.len(), "decoded chart payload");
        Ok(frame)
    }
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    exchange_timezone_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Flatten the per-symbol chart payload into date-keyed columns.
fn frame_from_chart(
    request: &FetchRequest,
    payload: ChartResponse,
) -> Result<PriceFrame, FetchError> {
    if let Some(error) = payload.chart.error {
        let reason = error.description.unwrap_or_else(|| error.code.clone());
        return if error.code.eq_ignore_ascii_case("not found") {
            Err(FetchError::no_data(request))
        } else {
            Err(FetchError::data_fetch(request, reason))
        };
    }

    let results = payload.chart.result.unwrap_or_default();
    let Some(result) = pick_result(results, &request.ticker) else {
        return Err(FetchError::no_data(request));
    };

    let tz: Tz = match result.meta.exchange_timezone_name.as_deref() {
        Some(name) => name.parse().unwrap_or_else(|_| {
            warn!(timezone = name, "unknown exchange timezone; assuming New York");
            New_York
        }),
        None => New_York,
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let series = [
        &quote.open,
        &quote.high,
        &quote.low,
        &quote.close,
        &quote.volume,
    ];

    // Later rows win when two timestamps land on the same trading date.
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (idx, &ts) in result.timestamp.iter().enumerate() {
        let Some(utc) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };
        let date = utc.with_timezone(&tz).date_naive();
        if date < request.start || date > request.end {
            continue;
        }
        let values = series
            .iter()
            .map(|column| column.get(idx).copied().flatten().unwrap_or(f64::NAN))
            .collect();
        by_date.insert(date, values);
    }

    if by_date.is_empty() {
        return Err(FetchError::no_data(request));
    }

    let names: Vec<String> = [OPEN, HIGH, LOW, CLOSE, VOLUME]
        .iter()
        .map(|name| name.to_string())
        .collect();
    PriceFrame::from_rows(&names, by_date.into_iter().collect())
        .map_err(|err| FetchError::data_fetch(request, err))
}

fn pick_result(results: Vec<ChartResult>, ticker: &str) -> Option<ChartResult> {
    let mut fallback = None;
    for result in results {
        if result.meta.symbol.eq_ignore_ascii_case(ticker) {
            return Some(result);
        }
        fallback.get_or_insert(result);
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    fn request() -> FetchRequest {
        FetchRequest::new(
            "BLK",
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
        )
    }

    fn parse(body: &str) -> Result<PriceFrame, FetchError> {
        let payload: ChartResponse = serde_json::from_str(body).unwrap();
        frame_from_chart(&request(), payload)
    }

    #[test]
    fn flattens_quotes_into_named_columns() {
        // 13:30 UTC is the New York open on each of these days.
        let body = r#"{"chart":{"result":[{
            "meta":{"symbol":"BLK","exchangeTimezoneName":"America/New_York"},
            "timestamp":[1717421400,1717507800,1717594200],
            "indicators":{"quote":[{
                "open":[770.0,771.5,772.0],
                "high":[775.25,776.0,780.0],
                "low":[765.0,null,768.5],
                "close":[772.0,774.0,779.0],
                "volume":[500100,410000,380500]
            }]}
        }],"error":null}}"#;

        let frame = parse(body).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.first_date(), NaiveDate::from_ymd_opt(2024, 6, 3));
        assert_eq!(frame.last_date(), NaiveDate::from_ymd_opt(2024, 6, 5));
        assert_eq!(frame.value(HIGH, 2), Some(780.0));
        assert_eq!(frame.value(VOLUME, 0), Some(500100.0));
        assert!(frame.value(LOW, 1).unwrap().is_nan());
    }

    #[test]
    fn prefers_the_requested_symbol() {
        let body = r#"{"chart":{"result":[
            {"meta":{"symbol":"SPY"},"timestamp":[1717421400],
             "indicators":{"quote":[{"high":[1.0],"low":[1.0]}]}},
            {"meta":{"symbol":"blk"},"timestamp":[1717421400],
             "indicators":{"quote":[{"high":[2.0],"low":[2.0]}]}}
        ],"error":null}}"#;

        let frame = parse(body).unwrap();
        assert_eq!(frame.value(HIGH, 0), Some(2.0));
        assert!(frame.value(OPEN, 0).unwrap().is_nan());
    }

    #[test]
    fn empty_result_is_no_data() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"BLK"},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(matches!(parse(body), Err(FetchError::NoData { .. })));

        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(parse(body), Err(FetchError::NoData { .. })));
    }

    #[test]
    fn provider_errors_become_fetch_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input - interval=1x is not supported"}}}"#;
        match parse(body) {
            Err(FetchError::DataFetch { ticker, reason }) => {
                assert_eq!(ticker, "BLK");
                assert!(reason.contains("interval"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rows_outside_the_window_are_dropped() {
        // 2024-06-07 13:30 UTC falls after the requested end date.
        let body = r#"{"chart":{"result":[{
            "meta":{"symbol":"BLK","exchangeTimezoneName":"America/New_York"},
            "timestamp":[1717421400,1717767000],
            "indicators":{"quote":[{"high":[10.0,11.0],"low":[9.0,10.0]}]}
        }],"error":null}}"#;

        let frame = parse(body).unwrap();
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn bars_stamped_before_utc_midnight_keep_their_local_date() {
        // 2024-06-02 15:00 UTC is midnight on 2024-06-03 in Tokyo.
        let body = r#"{"chart":{"result":[{
            "meta":{"symbol":"BLK","exchangeTimezoneName":"Asia/Tokyo"},
            "timestamp":[1717254000,1717340400],
            "indicators":{"quote":[{"high":[10.0,11.0],"low":[9.0,10.0]}]}
        }],"error":null}}"#;

        let frame = parse(body).unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.first_date(), NaiveDate::from_ymd_opt(2024, 6, 3));
        assert_eq!(frame.value(HIGH, 0), Some(11.0));
    }

    /// Answer one connection with `response` and hand back the request line.
    fn serve_once(response: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut header = String::new();
            while reader.read_line(&mut header).unwrap() > 2 {
                header.clear();
            }
            let mut stream = stream;
            stream.write_all(response.as_bytes()).unwrap();
            tx.send(request_line).unwrap();
        });
        (base_url, rx)
    }

    fn client_for(base_url: &str, timeout: Duration) -> YahooClient {
        YahooClient::new(timeout).unwrap().with_base_url(base_url)
    }

    #[test]
    fn not_found_status_is_no_data() {
        let (base_url, requests) =
            serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let client = client_for(&base_url, Duration::from_secs(5));

        let err = client.fetch(&request()).unwrap_err();
        assert!(matches!(err, FetchError::NoData { .. }), "{err:?}");

        // One day either side of the window: 2024-06-02 and 2024-06-06 at 00:00 UTC.
        let request_line = requests.recv().unwrap();
        assert!(request_line.starts_with("GET /BLK?"), "{request_line}");
        assert!(request_line.contains("period1=1717286400"), "{request_line}");
        assert!(request_line.contains("period2=1717632000"), "{request_line}");
        assert!(request_line.contains("interval=1d"), "{request_line}");
    }

    #[test]
    fn server_errors_are_fetch_errors() {
        let (base_url, _requests) = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let client = client_for(&base_url, Duration::from_secs(5));

        match client.fetch(&request()) {
            Err(FetchError::DataFetch { ticker, reason }) => {
                assert_eq!(ticker, "BLK");
                assert!(reason.contains("500"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn stalled_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(2));
        });
        let client = client_for(&base_url, Duration::from_millis(200));

        match client.fetch(&request()) {
            Err(FetchError::DataFetch { reason, .. }) => {
                assert!(reason.contains("timed out"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
