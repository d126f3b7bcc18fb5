use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, str::FromStr};
use thiserror::Error;
use ts_core::SpreadRegime;

/// Supported indicator kinds.
///
/// Outputs:
/// - Sma/Ema: single line (overlay)
/// - Rsi: single line (separate pane)
/// - Bbands: mid/upper/lower (overlay)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Bbands,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown indicator kind")]
pub struct ParseIndicatorKindError;

impl FromStr for IndicatorKind {
    type Err = ParseIndicatorKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalized(s).as_str() {
            "sma" | "ma" | "simple_ma" => Ok(IndicatorKind::Sma),
            "ema" => Ok(IndicatorKind::Ema),
            "rsi" => Ok(IndicatorKind::Rsi),
            "bbands" | "bb" | "bollinger" | "bollinger_bands" => Ok(IndicatorKind::Bbands),
            _ => Err(ParseIndicatorKindError),
        }
    }
}

/// Where to draw the indicator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Overlay,
    SeparatePane,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown output kind")]
pub struct ParseOutputKindError;

impl FromStr for OutputKind {
    type Err = ParseOutputKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalized(s).as_str() {
            "overlay" | "main" | "price" => Ok(OutputKind::Overlay),
            "pane" | "panel" | "separate" | "separate_pane" => Ok(OutputKind::SeparatePane),
            _ => Err(ParseOutputKindError),
        }
    }
}

/// Parameters for supported indicators. All of them run over close prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndicatorParams {
    /// Simple moving average over `period`.
    Sma { period: usize },
    /// Exponential moving average with `k = 2 / (period + 1)`.
    Ema { period: usize },
    /// Relative Strength Index (Wilder) of `period`.
    Rsi { period: usize },
    /// Bollinger Bands: middle SMA, upper/lower by `stddev` population deviations.
    Bbands { period: usize, stddev: f64 },
}

impl IndicatorParams {
    pub fn kind(&self) -> IndicatorKind {
        match self {
            IndicatorParams::Sma { .. } => IndicatorKind::Sma,
            IndicatorParams::Ema { .. } => IndicatorKind::Ema,
            IndicatorParams::Rsi { .. } => IndicatorKind::Rsi,
            IndicatorParams::Bbands { .. } => IndicatorKind::Bbands,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinePattern {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: String,
    pub width: f64,
    pub pattern: LinePattern,
}

impl LineStyle {
    pub fn new(color: impl Into<String>, width: f64, pattern: LinePattern) -> Self {
        Self {
            color: color.into(),
            width,
            pattern,
        }
    }
}

/// Config for an indicator instance (but no runtime state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub kind: IndicatorKind,
    pub params: IndicatorParams,
    pub output: OutputKind,
    /// Legend text.
    pub label: String,
    pub line_styles: Vec<LineStyle>,
}

impl IndicatorConfig {
    pub fn with_default_styles(params: IndicatorParams, output: OutputKind) -> Self {
        let kind = params.kind();
        let dim = indicator_output_dimension(kind);
        let line_styles = default_line_styles(kind, dim);
        let label = default_label(&params);
        Self {
            kind,
            params,
            output,
            label,
            line_styles,
        }
    }

    pub fn with_line_styles(mut self, styles: Vec<LineStyle>) -> Self {
        self.line_styles = styles;
        self
    }

    /// Runs the indicator over `values`, one column per output line.
    pub fn compute(&self, values: &[f64]) -> Vec<Vec<f64>> {
        create_engine(&self.params).apply_history(values)
    }

    /// Style of output line `idx`, falling back to the last declared one.
    pub fn style(&self, idx: usize) -> Option<&LineStyle> {
        self.line_styles.get(idx).or_else(|| self.line_styles.last())
    }
}

/// Moving-average overlays drawn on the price chart by default.
pub fn price_overlays() -> Vec<IndicatorConfig> {
    vec![
        IndicatorConfig::with_default_styles(
            IndicatorParams::Bbands {
                period: 20,
                stddev: 2.0,
            },
            OutputKind::Overlay,
        ),
        IndicatorConfig::with_default_styles(IndicatorParams::Ema { period: 9 }, OutputKind::Overlay)
            .with_line_styles(vec![LineStyle::new("#06b6d4", 1.5, LinePattern::Solid)]),
        IndicatorConfig::with_default_styles(IndicatorParams::Sma { period: 21 }, OutputKind::Overlay)
            .with_line_styles(vec![LineStyle::new("#fbbf24", 1.0, LinePattern::Solid)]),
        IndicatorConfig::with_default_styles(IndicatorParams::Sma { period: 50 }, OutputKind::Overlay)
            .with_line_styles(vec![LineStyle::new("#a78bfa", 1.0, LinePattern::Solid)]),
        IndicatorConfig::with_default_styles(
            IndicatorParams::Sma { period: 200 },
            OutputKind::Overlay,
        )
        .with_line_styles(vec![LineStyle::new("#ef4444", 1.0, LinePattern::Dashed)]),
    ]
}

/// Indicator computation engine – stateful, incremental.
pub trait IndicatorEngine {
    fn output_dimension(&self) -> usize;
    fn reset(&mut self);

    /// Feeds one value, returns one sample per output line (NaN when undefined).
    fn apply_incremental(&mut self, value: f64) -> Vec<f64>;

    /// Runs a whole series from a clean state; result is column-major.
    fn apply_history(&mut self, values: &[f64]) -> Vec<Vec<f64>> {
        self.reset();
        let dim = self.output_dimension();
        let mut out = vec![Vec::with_capacity(values.len()); dim];
        for &v in values {
            let sample = self.apply_incremental(v);
            for (column, x) in out.iter_mut().zip(sample) {
                column.push(x);
            }
        }
        out
    }
}

// ---------- pure indicator functions -----------------------------------------

/// Exponential moving average; `out[0] == series[0]`, no warm-up gap.
pub fn ema(series: &[f64], period: usize) -> Vec<f64> {
    single_column(&mut EmaEngine::new(period), series)
}

/// Simple moving average; NaN for the first `period - 1` indices.
pub fn sma(series: &[f64], period: usize) -> Vec<f64> {
    single_column(&mut SmaEngine::new(period), series)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bollinger {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger bands around `sma(series, period)`, population standard deviation.
pub fn bollinger(series: &[f64], period: usize, multiplier: f64) -> Bollinger {
    let mut columns = BbandsEngine::new(period, multiplier)
        .apply_history(series)
        .into_iter();
    let middle = columns.next().unwrap_or_default();
    let upper = columns.next().unwrap_or_default();
    let lower = columns.next().unwrap_or_default();
    Bollinger {
        upper,
        middle,
        lower,
    }
}

/// Wilder RSI. Indices `0..period` hold the neutral 50 while gains and losses
/// accumulate; this warm-up is intentional and must not be "fixed".
pub fn rsi(series: &[f64], period: usize) -> Vec<f64> {
    single_column(&mut RsiEngine::new(period), series)
}

fn single_column(engine: &mut dyn IndicatorEngine, series: &[f64]) -> Vec<f64> {
    engine
        .apply_history(series)
        .into_iter()
        .next()
        .unwrap_or_default()
}

// ---------- individual indicator engines -------------------------------------

/// Trailing window shared by SMA and Bollinger so both produce the same mean.
struct Window {
    period: usize,
    values: VecDeque<f64>,
}

impl Window {
    fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::with_capacity(period),
        }
    }

    fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    fn full(&self) -> bool {
        self.period > 0 && self.values.len() == self.period
    }

    fn mean(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.period as f64
    }
}

struct SmaEngine {
    window: Window,
}

impl SmaEngine {
    fn new(period: usize) -> Self {
        Self {
            window: Window::new(period),
        }
    }
}

impl IndicatorEngine for SmaEngine {
    fn output_dimension(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.window.values.clear();
    }

    fn apply_incremental(&mut self, value: f64) -> Vec<f64> {
        self.window.push(value);
        if self.window.full() {
            vec![self.window.mean()]
        } else {
            vec![f64::NAN]
        }
    }
}

struct EmaEngine {
    k: f64,
    prev: Option<f64>,
}

impl EmaEngine {
    fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            k: 2.0 / (period as f64 + 1.0),
            prev: None,
        }
    }
}

impl IndicatorEngine for EmaEngine {
    fn output_dimension(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.prev = None;
    }

    fn apply_incremental(&mut self, value: f64) -> Vec<f64> {
        let next = match self.prev {
            Some(prev) => value * self.k + prev * (1.0 - self.k),
            None => value,
        };
        self.prev = Some(next);
        vec![next]
    }
}

struct RsiEngine {
    period: usize,
    index: usize,
    prev: Option<f64>,
    gain: f64,
    loss: f64,
}

impl RsiEngine {
    fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            index: 0,
            prev: None,
            gain: 0.0,
            loss: 0.0,
        }
    }

    fn value(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        }
    }
}

impl IndicatorEngine for RsiEngine {
    fn output_dimension(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.index = 0;
        self.prev = None;
        self.gain = 0.0;
        self.loss = 0.0;
    }

    fn apply_incremental(&mut self, value: f64) -> Vec<f64> {
        let i = self.index;
        self.index += 1;
        let Some(prev) = self.prev.replace(value) else {
            return vec![50.0];
        };
        let change = value - prev;
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        let p = self.period as f64;

        if i < self.period {
            // Accumulating raw sums.
            self.gain += gain;
            self.loss += loss;
            vec![50.0]
        } else if i == self.period {
            self.gain = (self.gain + gain) / p;
            self.loss = (self.loss + loss) / p;
            vec![Self::value(self.gain, self.loss)]
        } else {
            self.gain = (self.gain * (p - 1.0) + gain) / p;
            self.loss = (self.loss * (p - 1.0) + loss) / p;
            vec![Self::value(self.gain, self.loss)]
        }
    }
}

struct BbandsEngine {
    window: Window,
    multiplier: f64,
}

impl BbandsEngine {
    fn new(period: usize, multiplier: f64) -> Self {
        Self {
            window: Window::new(period),
            multiplier,
        }
    }
}

impl IndicatorEngine for BbandsEngine {
    fn output_dimension(&self) -> usize {
        3
    }

    fn reset(&mut self) {
        self.window.values.clear();
    }

    fn apply_incremental(&mut self, value: f64) -> Vec<f64> {
        self.window.push(value);
        if !self.window.full() {
            return vec![f64::NAN; 3];
        }
        let mid = self.window.mean();
        let n = self.window.period as f64;
        let var = self
            .window
            .values
            .iter()
            .map(|v| (v - mid) * (v - mid))
            .sum::<f64>()
            / n;
        let dev = self.multiplier * var.sqrt();
        vec![mid, mid + dev, mid - dev]
    }
}

// ---------- factory & defaults -----------------------------------------------

fn indicator_output_dimension(kind: IndicatorKind) -> usize {
    match kind {
        IndicatorKind::Bbands => 3,
        _ => 1,
    }
}

fn default_label(params: &IndicatorParams) -> String {
    match params {
        IndicatorParams::Sma { period } => format!("MA{period}"),
        IndicatorParams::Ema { period } => format!("EMA{period}"),
        IndicatorParams::Rsi { period } => format!("RSI{period}"),
        IndicatorParams::Bbands { .. } => "BB".to_string(),
    }
}

fn default_line_styles(kind: IndicatorKind, dim: usize) -> Vec<LineStyle> {
    let mut out = Vec::with_capacity(dim);
    match kind {
        IndicatorKind::Sma => out.push(LineStyle::new("#fbbf24", 1.0, LinePattern::Solid)),
        IndicatorKind::Ema => out.push(LineStyle::new("#06b6d4", 1.5, LinePattern::Solid)),
        IndicatorKind::Rsi => out.push(LineStyle::new("#f59e0b", 1.5, LinePattern::Solid)),
        IndicatorKind::Bbands => {
            // Middle line plus the ribbon tint used for upper/lower.
            out.push(LineStyle::new("rgba(148,163,184,.4)", 1.0, LinePattern::Solid));
            out.push(LineStyle::new("rgba(148,163,184,.18)", 1.0, LinePattern::Solid));
            out.push(LineStyle::new("rgba(148,163,184,.18)", 1.0, LinePattern::Solid));
        }
    }

    while out.len() < dim {
        let last = out
            .last()
            .cloned()
            .unwrap_or_else(|| LineStyle::new("#ffffff", 1.0, LinePattern::Solid));
        out.push(last);
    }

    out.truncate(dim);
    out
}

fn create_engine(params: &IndicatorParams) -> Box<dyn IndicatorEngine> {
    match *params {
        IndicatorParams::Sma { period } => Box::new(SmaEngine::new(period)),
        IndicatorParams::Ema { period } => Box::new(EmaEngine::new(period)),
        IndicatorParams::Rsi { period } => Box::new(RsiEngine::new(period)),
        IndicatorParams::Bbands { period, stddev } => Box::new(BbandsEngine::new(period, stddev)),
    }
}

pub fn default_output_for(kind: IndicatorKind) -> OutputKind {
    match kind {
        IndicatorKind::Rsi => OutputKind::SeparatePane,
        _ => OutputKind::Overlay,
    }
}

fn normalized(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

// ---------- display metrics --------------------------------------------------

/// Percent change from `from` to `to`, `None` when `from` is zero.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || !from.is_finite() || !to.is_finite() {
        None
    } else {
        Some((to - from) / from * 100.0)
    }
}

/// Producer margin over cost of production, in percent of cost.
pub fn margin_pct(price: f64, cost: f64) -> Option<f64> {
    pct_change(cost, price)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginBand {
    Strong,
    Moderate,
    Tight,
    Loss,
}

impl MarginBand {
    pub fn of(margin: f64) -> Self {
        if margin > 20.0 {
            MarginBand::Strong
        } else if margin > 10.0 {
            MarginBand::Moderate
        } else if margin > 0.0 {
            MarginBand::Tight
        } else {
            MarginBand::Loss
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            MarginBand::Strong => "#10b981",
            MarginBand::Moderate => "#22c55e",
            MarginBand::Tight => "#fbbf24",
            MarginBand::Loss => "#ef4444",
        }
    }
}

/// Margin bar length in percent of the track, capped at 60.
pub fn margin_bar_width(margin: f64) -> f64 {
    margin.abs().min(60.0)
}

/// Spread alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Ok,
    Attention,
    Alert,
}

impl AlertLevel {
    /// Missing z-score or percentile never triggers a level on its own.
    pub fn classify(regime: SpreadRegime, zscore: Option<f64>, percentile: Option<f64>) -> Self {
        let z = zscore.map(f64::abs).unwrap_or(0.0);
        let (hi, lo) = match percentile {
            Some(p) => (p, p),
            None => (50.0, 50.0),
        };
        if regime == SpreadRegime::Extreme || z >= 2.0 || hi >= 95.0 || lo <= 5.0 {
            AlertLevel::Alert
        } else if regime != SpreadRegime::Normal || z >= 1.3 || hi >= 90.0 || lo <= 10.0 {
            AlertLevel::Attention
        } else {
            AlertLevel::Ok
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AlertLevel::Ok => "#22c55e",
            AlertLevel::Attention => "#f59e0b",
            AlertLevel::Alert => "#ef4444",
        }
    }
}

/// RSI band used to colour the readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiZone {
    Overbought,
    Neutral,
    Oversold,
}

impl RsiZone {
    pub const OVERBOUGHT: f64 = 70.0;
    pub const OVERSOLD: f64 = 30.0;

    pub fn of(value: f64) -> Self {
        if value > Self::OVERBOUGHT {
            RsiZone::Overbought
        } else if value < Self::OVERSOLD {
            RsiZone::Oversold
        } else {
            RsiZone::Neutral
        }
    }
}
