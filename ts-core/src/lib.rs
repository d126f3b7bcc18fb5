use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Backing-store scale applied to every chart canvas.
pub const HIDPI_SCALE: f64 = 2.0;

// ---------- price bars -------------------------------------------------------

/// One OHLCV bar as produced by the price pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// ISO date (`YYYY-MM-DD`).
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, deserialize_with = "volume_or_zero")]
    pub volume: u64,
}

impl Bar {
    pub fn new(
        date: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            date: date.into(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Candle colour key: flat bars count as up.
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }

    /// `low <= min(open, close) <= max(open, close) <= high`.
    pub fn is_consistent(&self) -> bool {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        self.low <= body_low && body_high <= self.high
    }

    /// Intrabar change in percent, `None` when the open is zero.
    pub fn change_pct(&self) -> Option<f64> {
        if self.open == 0.0 {
            None
        } else {
            Some((self.close - self.open) / self.open * 100.0)
        }
    }

    /// `MM-DD` tail of the date, falls back to the whole string.
    pub fn short_date(&self) -> &str {
        self.date.get(5..).unwrap_or(&self.date)
    }
}

fn volume_or_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.round() as u64)
        .unwrap_or(0))
}

/// Symbol -> ascending bar history.
pub type PriceData = HashMap<String, Vec<Bar>>;

/// The last `n` items of `items` (all of them when shorter).
pub fn trailing_window<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

// ---------- seasonality ------------------------------------------------------

pub const CURRENT_LABEL: &str = "current";
pub const AVERAGE_LABEL: &str = "average";

/// How a year label is treated by the seasonal overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearKind {
    Past,
    Average,
    Current,
}

impl YearKind {
    pub fn of(label: &str) -> Self {
        match label {
            CURRENT_LABEL => YearKind::Current,
            AVERAGE_LABEL => YearKind::Average,
            _ => YearKind::Past,
        }
    }

    pub fn is_emphasis(&self) -> bool {
        !matches!(self, YearKind::Past)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonPoint {
    /// Day within the calendar year.
    pub day: u16,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

impl SeasonPoint {
    pub fn new(day: u16, close: f64) -> Self {
        Self {
            day,
            close: Some(close),
            date: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonalEntry {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub years: Vec<String>,
    #[serde(default)]
    pub series: HashMap<String, Vec<SeasonPoint>>,
}

impl SeasonalEntry {
    pub fn series_for(&self, label: &str) -> Option<&[SeasonPoint]> {
        self.series.get(label).map(Vec::as_slice)
    }

    /// Restores the ascending-by-day ordering of every series.
    pub fn sort_series(&mut self) {
        for points in self.series.values_mut() {
            points.sort_by_key(|p| p.day);
        }
    }
}

// ---------- COT positioning --------------------------------------------------

/// One weekly Commitment of Traders row. Stored `*_net` fields in the feed
/// are ignored; net positions are always derived from long and short.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CotEntry {
    pub date: String,
    #[serde(default, deserialize_with = "count")]
    pub open_interest: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub comm_long: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub comm_short: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub noncomm_long: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub noncomm_short: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub managed_money_long: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub managed_money_short: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub producer_long: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub producer_short: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub swap_long: Option<i64>,
    #[serde(default, deserialize_with = "count")]
    pub swap_short: Option<i64>,
}

impl CotEntry {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            ..Self::default()
        }
    }

    /// Builder used mostly by fixtures.
    pub fn with_position(mut self, category: TraderCategory, long: i64, short: i64) -> Self {
        let (l, s) = match category {
            TraderCategory::Commercial => (&mut self.comm_long, &mut self.comm_short),
            TraderCategory::NonCommercial => (&mut self.noncomm_long, &mut self.noncomm_short),
            TraderCategory::ManagedMoney => {
                (&mut self.managed_money_long, &mut self.managed_money_short)
            }
            TraderCategory::Producer => (&mut self.producer_long, &mut self.producer_short),
            TraderCategory::SwapDealer => (&mut self.swap_long, &mut self.swap_short),
        };
        *l = Some(long);
        *s = Some(short);
        self
    }
}

// Counts occasionally arrive as floats (`1234.0`).
fn count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| v.is_finite()).map(|v| v.round() as i64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraderCategory {
    Commercial,
    NonCommercial,
    ManagedMoney,
    Producer,
    SwapDealer,
}

impl TraderCategory {
    pub fn label(&self) -> &'static str {
        match self {
            TraderCategory::Commercial => "Commercial Net",
            TraderCategory::NonCommercial => "Non-Comm Net",
            TraderCategory::ManagedMoney => "Managed Money",
            TraderCategory::Producer => "Producer",
            TraderCategory::SwapDealer => "Swap Dealers",
        }
    }

    pub fn long(&self, entry: &CotEntry) -> Option<i64> {
        match self {
            TraderCategory::Commercial => entry.comm_long,
            TraderCategory::NonCommercial => entry.noncomm_long,
            TraderCategory::ManagedMoney => entry.managed_money_long,
            TraderCategory::Producer => entry.producer_long,
            TraderCategory::SwapDealer => entry.swap_long,
        }
    }

    pub fn short(&self, entry: &CotEntry) -> Option<i64> {
        match self {
            TraderCategory::Commercial => entry.comm_short,
            TraderCategory::NonCommercial => entry.noncomm_short,
            TraderCategory::ManagedMoney => entry.managed_money_short,
            TraderCategory::Producer => entry.producer_short,
            TraderCategory::SwapDealer => entry.swap_short,
        }
    }

    /// `long - short`, or `None` when either side was not reported.
    pub fn net(&self, entry: &CotEntry) -> Option<i64> {
        Some(self.long(entry)? - self.short(entry)?)
    }
}

/// Which CFTC report a COT history comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CotReport {
    Legacy,
    Disaggregated,
}

impl CotReport {
    pub fn categories(&self) -> &'static [TraderCategory] {
        match self {
            CotReport::Legacy => &[TraderCategory::Commercial, TraderCategory::NonCommercial],
            CotReport::Disaggregated => &[
                TraderCategory::ManagedMoney,
                TraderCategory::Producer,
                TraderCategory::SwapDealer,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown COT report type: {0}")]
pub struct ParseCotReportError(pub String);

impl FromStr for CotReport {
    type Err = ParseCotReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "legacy_futures" => Ok(CotReport::Legacy),
            "disaggregated" | "disagg" | "disaggregated_futures" => Ok(CotReport::Disaggregated),
            other => Err(ParseCotReportError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CotReportData {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub latest: Option<CotEntry>,
    #[serde(default)]
    pub history: Vec<CotEntry>,
    #[serde(default)]
    pub weeks: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CotCommodity {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub legacy: Option<CotReportData>,
    #[serde(default)]
    pub disaggregated: Option<CotReportData>,
}

impl CotCommodity {
    pub fn report(&self, report: CotReport) -> Option<&CotReportData> {
        match report {
            CotReport::Legacy => self.legacy.as_ref(),
            CotReport::Disaggregated => self.disaggregated.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CotData {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub commodities: HashMap<String, CotCommodity>,
}

// ---------- spreads ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadPoint {
    pub date: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Regime label assigned by the spread pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpreadRegime {
    #[default]
    Normal,
    Extreme,
    /// Spread wider than usual.
    Dissonance,
    /// Spread tighter than usual.
    Compression,
    Unknown,
}

impl SpreadRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpreadRegime::Normal => "NORMAL",
            SpreadRegime::Extreme => "EXTREMO",
            SpreadRegime::Dissonance => "DISSONÂNCIA",
            SpreadRegime::Compression => "COMPRESSÃO",
            SpreadRegime::Unknown => "UNKNOWN",
        }
    }
}

impl From<&str> for SpreadRegime {
    fn from(raw: &str) -> Self {
        let folded: String = raw
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| match c {
                'Â' | 'Á' | 'À' | 'Ã' => 'A',
                'Ç' => 'C',
                'Õ' | 'Ó' | 'Ô' => 'O',
                other => other,
            })
            .collect();
        match folded.as_str() {
            "NORMAL" => SpreadRegime::Normal,
            "EXTREMO" | "EXTREME" => SpreadRegime::Extreme,
            "DISSONANCIA" | "DISSONANCE" => SpreadRegime::Dissonance,
            "COMPRESSAO" | "COMPRESSION" => SpreadRegime::Compression,
            _ => SpreadRegime::Unknown,
        }
    }
}

impl From<String> for SpreadRegime {
    fn from(raw: String) -> Self {
        SpreadRegime::from(raw.as_str())
    }
}

impl From<SpreadRegime> for String {
    fn from(regime: SpreadRegime) -> Self {
        regime.as_str().to_string()
    }
}

impl fmt::Display for SpreadRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpreadInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub zscore_1y: Option<f64>,
    #[serde(default)]
    pub percentile: Option<f64>,
    #[serde(default)]
    pub regime: SpreadRegime,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub trend_pct: Option<f64>,
    #[serde(default)]
    pub history: Vec<SpreadPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpreadsData {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub spreads: HashMap<String, SpreadInfo>,
}

// ---------- viewport ---------------------------------------------------------

/// Logical (CSS pixel) size of a chart surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            pixel_ratio: HIDPI_SCALE,
        }
    }

    pub fn with_pixel_ratio(mut self, ratio: f64) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    /// Physical size of the backing store in device pixels.
    pub fn backing_size(&self) -> (u32, u32) {
        let w = (self.width.max(0.0) * self.pixel_ratio).round();
        let h = (self.height.max(0.0) * self.pixel_ratio).round();
        (w as u32, h as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_bar(date: &str, open: f64, close: f64) -> Bar {
        Bar::new(date, open, open.max(close) + 1.0, open.min(close) - 1.0, close, 10)
    }

    #[test]
    fn bar_volume_defaults_to_zero() {
        let bar: Bar = serde_json::from_str(
            r#"{"date":"2024-01-01","open":1,"high":2,"low":0.5,"close":1.5}"#,
        )
        .unwrap();
        assert_eq!(bar.volume, 0);

        let bar: Bar = serde_json::from_str(
            r#"{"date":"2024-01-01","open":1,"high":2,"low":0.5,"close":1.5,"volume":null}"#,
        )
        .unwrap();
        assert_eq!(bar.volume, 0);

        let bar: Bar = serde_json::from_str(
            r#"{"date":"2024-01-01","open":1,"high":2,"low":0.5,"close":1.5,"volume":1200.0}"#,
        )
        .unwrap();
        assert_eq!(bar.volume, 1200);
    }

    #[test]
    fn bar_direction_and_change() {
        let up = mk_bar("2024-01-01", 100.0, 103.0);
        let flat = mk_bar("2024-01-02", 100.0, 100.0);
        let down = mk_bar("2024-01-03", 100.0, 95.0);
        assert!(up.is_up());
        assert!(flat.is_up());
        assert!(!down.is_up());
        assert_eq!(down.change_pct(), Some(-5.0));
        assert!(up.is_consistent());
        assert_eq!(up.short_date(), "01-01");

        let zero_open = Bar::new("x", 0.0, 1.0, 0.0, 1.0, 0);
        assert_eq!(zero_open.change_pct(), None);
        assert_eq!(zero_open.short_date(), "x");
    }

    #[test]
    fn inconsistent_bar_detected() {
        let bar = Bar::new("2024-01-01", 100.0, 99.0, 98.0, 101.0, 0);
        assert!(!bar.is_consistent());
    }

    #[test]
    fn trailing_window_clamps() {
        let items = [1, 2, 3, 4, 5];
        assert_eq!(trailing_window(&items, 2), &[4, 5]);
        assert_eq!(trailing_window(&items, 10), &items);
        assert!(trailing_window(&items, 0).is_empty());
    }

    #[test]
    fn cot_net_is_derived_and_null_propagates() {
        let entry: CotEntry = serde_json::from_str(
            r#"{"date":"2024-01-02","comm_long":1000,"comm_short":1500,"comm_net":999,
                "noncomm_long":null,"noncomm_short":20}"#,
        )
        .unwrap();
        assert_eq!(TraderCategory::Commercial.net(&entry), Some(-500));
        assert_eq!(TraderCategory::NonCommercial.net(&entry), None);
        assert_eq!(TraderCategory::ManagedMoney.net(&entry), None);
    }

    #[test]
    fn cot_counts_accept_floats() {
        let entry: CotEntry =
            serde_json::from_str(r#"{"date":"d","swap_long":10.0,"swap_short":2.4}"#).unwrap();
        assert_eq!(TraderCategory::SwapDealer.net(&entry), Some(8));
    }

    #[test]
    fn report_categories_and_parse() {
        assert_eq!(CotReport::Legacy.categories().len(), 2);
        assert_eq!(
            CotReport::Disaggregated.categories(),
            &[
                TraderCategory::ManagedMoney,
                TraderCategory::Producer,
                TraderCategory::SwapDealer
            ]
        );
        assert_eq!("Disagg".parse::<CotReport>(), Ok(CotReport::Disaggregated));
        assert!("weekly".parse::<CotReport>().is_err());
    }

    #[test]
    fn seasonal_entry_sorts_and_classifies() {
        let mut entry: SeasonalEntry = serde_json::from_str(
            r#"{"symbol":"ZC","years":["2023","current","average"],
                "series":{"2023":[{"day":5,"close":2.0},{"day":1,"close":1.0}],
                          "current":[{"day":1,"close":null}]}}"#,
        )
        .unwrap();
        entry.sort_series();
        let days: Vec<u16> = entry.series_for("2023").unwrap().iter().map(|p| p.day).collect();
        assert_eq!(days, vec![1, 5]);
        assert!(entry.series_for("average").is_none());
        assert_eq!(entry.series_for("current").unwrap()[0].close, None);
        assert_eq!(YearKind::of("current"), YearKind::Current);
        assert_eq!(YearKind::of("average"), YearKind::Average);
        assert!(!YearKind::of("2021").is_emphasis());
    }

    #[test]
    fn spread_regime_parses_accented_labels() {
        assert_eq!(SpreadRegime::from("EXTREMO"), SpreadRegime::Extreme);
        assert_eq!(SpreadRegime::from("DISSONÂNCIA"), SpreadRegime::Dissonance);
        assert_eq!(SpreadRegime::from("compressao"), SpreadRegime::Compression);
        assert_eq!(SpreadRegime::from("??"), SpreadRegime::Unknown);

        let info: SpreadInfo = serde_json::from_str(
            r#"{"name":"Soy crush","regime":"COMPRESSÃO","history":[{"date":"2024-01-01","value":null}]}"#,
        )
        .unwrap();
        assert_eq!(info.regime, SpreadRegime::Compression);
        assert_eq!(info.history[0].value, None);
    }

    #[test]
    fn viewport_backing_size_doubles() {
        let vp = Viewport::new(640.5, 480.0);
        assert_eq!(vp.backing_size(), (1281, 960));
        assert!(!vp.is_empty());
        assert!(Viewport::new(0.0, 10.0).is_empty());
    }
}
