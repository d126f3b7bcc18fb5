use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};
use ts_core::{
    Bar, CotCommodity, CotData, CotEntry, CotReport, CotReportData, PriceData, SeasonalEntry,
    SpreadInfo, SpreadsData,
};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed feed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("refresh requested too soon, retry in {retry_in_ms} ms")]
    TooSoon { retry_in_ms: i64 },
}

/// Symbol -> seasonal overlay entry.
pub type SeasonalityData = HashMap<String, SeasonalEntry>;

// ---------- contract decoding ------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawBar {
    date: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

impl RawBar {
    fn into_bar(self) -> Option<Bar> {
        let volume = self
            .volume
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v.round() as u64)
            .unwrap_or(0);
        Some(Bar::new(
            self.date?,
            finite(self.open)?,
            finite(self.high)?,
            finite(self.low)?,
            finite(self.close)?,
            volume,
        ))
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Decodes `price_history.json` (symbol -> bars). Incomplete bars are
/// dropped, the rest sorted ascending by date.
pub fn decode_prices(json: &str) -> Result<PriceData, FeedError> {
    let raw: HashMap<String, Option<Vec<Option<RawBar>>>> = serde_json::from_str(json)?;
    let mut out = PriceData::with_capacity(raw.len());
    for (symbol, rows) in raw {
        let rows = rows.unwrap_or_default();
        let total = rows.len();
        let mut bars: Vec<Bar> = rows.into_iter().flatten().filter_map(RawBar::into_bar).collect();
        if bars.len() < total {
            warn!(%symbol, dropped = total - bars.len(), "dropping incomplete price bars");
        }
        let inconsistent = bars.iter().filter(|b| !b.is_consistent()).count();
        if inconsistent > 0 {
            debug!(%symbol, inconsistent, "bars with high/low outside the body");
        }
        bars.sort_by(|a, b| a.date.cmp(&b.date));
        out.insert(symbol, bars);
    }
    Ok(out)
}

/// Detaches `field` from a JSON object, `Null` when absent.
fn take_field(body: &mut Value, field: &str) -> Value {
    body.as_object_mut()
        .and_then(|map| map.remove(field))
        .unwrap_or(Value::Null)
}

/// Decodes one record, logging and skipping it when it does not fit `T`.
fn record<T: DeserializeOwned>(body: Value, key: &str, what: &'static str) -> Option<T> {
    match serde_json::from_value(body) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, what, %err, "dropping unreadable record");
            None
        }
    }
}

/// Decodes every row of a JSON array on its own; rows that do not fit `T`
/// (null, missing required fields, wrong types) are dropped.
fn rows<T: DeserializeOwned>(items: Value, key: &str, what: &'static str) -> Vec<T> {
    let Value::Array(items) = items else {
        return Vec::new();
    };
    let total = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect();
    if kept.len() < total {
        warn!(key, what, dropped = total - kept.len(), "dropping unreadable rows");
    }
    kept
}

/// Decodes `seasonality.json` (symbol -> entry), each series sorted by day.
pub fn decode_seasonality(json: &str) -> Result<SeasonalityData, FeedError> {
    let raw: HashMap<String, Value> = serde_json::from_str(json)?;
    let mut data = SeasonalityData::with_capacity(raw.len());
    for (symbol, mut body) in raw {
        let series = take_field(&mut body, "series");
        let Some(mut entry) = record::<SeasonalEntry>(body, &symbol, "seasonal entry") else {
            continue;
        };
        if let Value::Object(series) = series {
            for (label, points) in series {
                entry.series.insert(label, rows(points, &symbol, "seasonal points"));
            }
        }
        if entry.symbol.is_empty() {
            entry.symbol = symbol.clone();
        }
        entry.sort_series();
        data.insert(symbol, entry);
    }
    Ok(data)
}

fn decode_cot_report(mut body: Value, symbol: &str) -> Option<CotReportData> {
    if body.is_null() {
        return None;
    }
    let history = take_field(&mut body, "history");
    let latest = take_field(&mut body, "latest");
    let mut report: CotReportData = record(body, symbol, "cot report")?;
    report.history = rows(history, symbol, "cot history");
    report.history.sort_by(|a, b| a.date.cmp(&b.date));
    report.latest = serde_json::from_value::<Option<CotEntry>>(latest).ok().flatten();
    Some(report)
}

/// Decodes `cot.json`. Rows without a date are dropped; every history is
/// sorted ascending by date.
pub fn decode_cot(json: &str) -> Result<CotData, FeedError> {
    let mut root: Value = serde_json::from_str(json)?;
    let commodities = take_field(&mut root, "commodities");
    let mut data: CotData = serde_json::from_value(root)?;
    let Value::Object(commodities) = commodities else {
        return Ok(data);
    };
    for (symbol, mut body) in commodities {
        let legacy = take_field(&mut body, "legacy");
        let disaggregated = take_field(&mut body, "disaggregated");
        let Some(mut commodity) = record::<CotCommodity>(body, &symbol, "cot commodity") else {
            continue;
        };
        commodity.legacy = decode_cot_report(legacy, &symbol);
        commodity.disaggregated = decode_cot_report(disaggregated, &symbol);
        data.commodities.insert(symbol, commodity);
    }
    Ok(data)
}

/// Decodes `spreads.json`. History points without a date are dropped.
pub fn decode_spreads(json: &str) -> Result<SpreadsData, FeedError> {
    let mut root: Value = serde_json::from_str(json)?;
    let spreads = take_field(&mut root, "spreads");
    let mut data: SpreadsData = serde_json::from_value(root)?;
    let Value::Object(spreads) = spreads else {
        return Ok(data);
    };
    for (key, mut body) in spreads {
        let history = take_field(&mut body, "history");
        let Some(mut spread) = record::<SpreadInfo>(body, &key, "spread") else {
            continue;
        };
        spread.history = rows(history, &key, "spread history");
        spread.history.sort_by(|a, b| a.date.cmp(&b.date));
        data.spreads.insert(key, spread);
    }
    Ok(data)
}

// ---------- event delivery ---------------------------------------------------

#[derive(Debug, Clone)]
pub enum DataEvent {
    /// Full price history snapshot.
    Prices(PriceData),
    Seasonality(SeasonalityData),
    Cot(CotData),
    Spreads(SpreadsData),
    /// Drop everything.
    Reset,
}

/// Consumer interface for feed events.
pub trait DataSink {
    fn on_event(&mut self, event: DataEvent);
}

/// Immutable bar history shared between the store and chart views.
pub type SharedBars = Rc<[Bar]>;
pub type SharedPrices = HashMap<String, SharedBars>;

/// Latest decoded payloads. Every accepted event replaces the affected
/// payloads with fresh `Rc`s, so views can detect new data by pointer.
#[derive(Debug, Default)]
pub struct DashboardStore {
    prices: Rc<SharedPrices>,
    seasonality: HashMap<String, Rc<SeasonalEntry>>,
    cot: HashMap<(String, CotReport), Rc<[CotEntry]>>,
    spreads: HashMap<String, Rc<SpreadInfo>>,
    generated_at: Option<String>,
    revision: u64,
}

impl DashboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped once per applied event.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn prices(&self) -> Rc<SharedPrices> {
        Rc::clone(&self.prices)
    }

    pub fn bars(&self, symbol: &str) -> Option<SharedBars> {
        self.prices.get(symbol).cloned()
    }

    pub fn seasonal(&self, symbol: &str) -> Option<Rc<SeasonalEntry>> {
        self.seasonality.get(symbol).cloned()
    }

    pub fn cot_history(&self, symbol: &str, report: CotReport) -> Option<Rc<[CotEntry]>> {
        self.cot.get(&(symbol.to_string(), report)).cloned()
    }

    pub fn cot_generated_at(&self) -> Option<&str> {
        self.generated_at.as_deref()
    }

    pub fn spread(&self, key: &str) -> Option<Rc<SpreadInfo>> {
        self.spreads.get(key).cloned()
    }

    pub fn spread_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.spreads.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl DataSink for DashboardStore {
    fn on_event(&mut self, event: DataEvent) {
        match event {
            DataEvent::Prices(prices) => {
                debug!(symbols = prices.len(), "price history replaced");
                let shared = prices
                    .into_iter()
                    .map(|(symbol, bars)| (symbol, SharedBars::from(bars)))
                    .collect();
                self.prices = Rc::new(shared);
            }
            DataEvent::Seasonality(data) => {
                debug!(symbols = data.len(), "seasonality replaced");
                self.seasonality = data.into_iter().map(|(k, v)| (k, Rc::new(v))).collect();
            }
            DataEvent::Cot(data) => {
                debug!(commodities = data.commodities.len(), "cot replaced");
                self.cot.clear();
                for (symbol, commodity) in data.commodities {
                    let reports = [
                        (CotReport::Legacy, commodity.legacy),
                        (CotReport::Disaggregated, commodity.disaggregated),
                    ];
                    for (report, body) in reports {
                        if let Some(body) = body {
                            self.cot
                                .insert((symbol.clone(), report), Rc::from(body.history));
                        }
                    }
                }
                self.generated_at = data.generated_at;
            }
            DataEvent::Spreads(data) => {
                debug!(spreads = data.spreads.len(), "spreads replaced");
                self.spreads = data
                    .spreads
                    .into_iter()
                    .map(|(k, v)| (k, Rc::new(v)))
                    .collect();
            }
            DataEvent::Reset => {
                debug!("dashboard store reset");
                let revision = self.revision;
                *self = Self::default();
                self.revision = revision;
            }
        }
        self.revision += 1;
    }
}

// ---------- refresh guard ----------------------------------------------------

/// Minimum spacing between portfolio refresh requests.
pub const DEFAULT_MIN_REFRESH_INTERVAL_MS: i64 = 60_000;

/// Process-wide last-refresh timestamp with a minimum-interval rule. Starts
/// at the epoch, so the first call with a wall-clock time always passes.
#[derive(Debug)]
pub struct RefreshGuard {
    last_ms: AtomicI64,
    min_interval_ms: i64,
}

impl RefreshGuard {
    pub const fn new(min_interval_ms: i64) -> Self {
        Self {
            last_ms: AtomicI64::new(0),
            min_interval_ms,
        }
    }

    pub fn min_interval_ms(&self) -> i64 {
        self.min_interval_ms
    }

    pub fn last_refresh_ms(&self) -> i64 {
        self.last_ms.load(Ordering::Acquire)
    }

    /// Records `now_ms` as the latest refresh, or rejects it inside the interval.
    pub fn try_begin(&self, now_ms: i64) -> Result<(), FeedError> {
        let mut last = self.last_ms.load(Ordering::Acquire);
        loop {
            let elapsed = now_ms - last;
            if elapsed < self.min_interval_ms {
                let retry_in_ms = self.min_interval_ms - elapsed;
                debug!(retry_in_ms, "refresh skipped");
                return Err(FeedError::TooSoon { retry_in_ms });
            }
            match self
                .last_ms
                .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => last = actual,
            }
        }
    }

    /// Back to the epoch.
    pub fn reset(&self) {
        self.last_ms.store(0, Ordering::Release);
    }
}

pub static PORTFOLIO_REFRESH: RefreshGuard = RefreshGuard::new(DEFAULT_MIN_REFRESH_INTERVAL_MS);
