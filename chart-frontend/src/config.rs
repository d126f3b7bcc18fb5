//! Per-chart layout settings. Every field has a default, so a partial JSON
//! document (or `{}`) is a valid configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ta_engine::{price_overlays, IndicatorConfig};
use thiserror::Error;
use ts_core::{CotReport, HIDPI_SCALE};

use crate::mapper::Padding;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid chart settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
}

/// The chart types a canvas can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Price,
    Seasonal,
    Compare,
    Cot,
    Spread,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown chart kind: {0}")]
pub struct ParseChartKindError(pub String);

impl FromStr for ChartKind {
    type Err = ParseChartKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" | "candles" => Ok(ChartKind::Price),
            "seasonal" | "seasonality" => Ok(ChartKind::Seasonal),
            "compare" | "comparison" => Ok(ChartKind::Compare),
            "cot" => Ok(ChartKind::Cot),
            "spread" => Ok(ChartKind::Spread),
            _ => Err(ParseChartKindError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceChartConfig {
    /// Trailing bars shown (and fed to the indicators).
    pub visible: usize,
    pub height: f64,
    pub rsi_height: f64,
    pub rsi_period: usize,
    pub padding: Padding,
    pub overlays: Vec<IndicatorConfig>,
    /// Height of the volume histogram at the bottom of the price panel.
    pub volume_height: f64,
}

impl Default for PriceChartConfig {
    fn default() -> Self {
        Self {
            visible: 120,
            height: 480.0,
            rsi_height: 80.0,
            rsi_period: 14,
            padding: Padding::new(24.0, 16.0, 30.0, 55.0),
            overlays: price_overlays(),
            volume_height: 30.0,
        }
    }
}

impl PriceChartConfig {
    pub fn with_visible(mut self, visible: usize) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_overlays(mut self, overlays: Vec<IndicatorConfig>) -> Self {
        self.overlays = overlays;
        self
    }

    /// Height of the candle panel (RSI panel and its gap excluded).
    pub fn main_height(&self) -> f64 {
        self.height - self.rsi_height - 30.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalChartConfig {
    pub height: f64,
    pub padding: Padding,
}

impl Default for SeasonalChartConfig {
    fn default() -> Self {
        Self {
            height: 320.0,
            padding: Padding::new(30.0, 16.0, 30.0, 60.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareChartConfig {
    pub visible: usize,
    pub height: f64,
    pub max_symbols: usize,
    pub padding: Padding,
}

impl Default for CompareChartConfig {
    fn default() -> Self {
        Self {
            visible: 120,
            height: 320.0,
            max_symbols: 6,
            padding: Padding::new(24.0, 16.0, 30.0, 50.0),
        }
    }
}

impl CompareChartConfig {
    pub fn with_max_symbols(mut self, max: usize) -> Self {
        self.max_symbols = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CotChartConfig {
    /// Weekly reports shown.
    pub visible: usize,
    pub height: f64,
    pub report: CotReport,
    /// Right padding leaves room for the value badges.
    pub padding: Padding,
}

impl Default for CotChartConfig {
    fn default() -> Self {
        Self {
            visible: 109,
            height: 180.0,
            report: CotReport::Legacy,
            padding: Padding::new(14.0, 75.0, 24.0, 10.0),
        }
    }
}

impl CotChartConfig {
    pub fn with_report(mut self, report: CotReport) -> Self {
        self.report = report;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadChartConfig {
    pub width: f64,
    pub height: f64,
    pub inset: f64,
}

impl Default for SpreadChartConfig {
    fn default() -> Self {
        Self {
            width: 230.0,
            height: 60.0,
            inset: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSettings {
    pub pixel_ratio: f64,
    pub price: PriceChartConfig,
    pub seasonal: SeasonalChartConfig,
    pub compare: CompareChartConfig,
    pub cot: CotChartConfig,
    pub spread: SpreadChartConfig,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            pixel_ratio: HIDPI_SCALE,
            price: PriceChartConfig::default(),
            seasonal: SeasonalChartConfig::default(),
            compare: CompareChartConfig::default(),
            cot: CotChartConfig::default(),
            spread: SpreadChartConfig::default(),
        }
    }
}

impl ChartSettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("pixel_ratio", self.pixel_ratio),
            ("price.height", self.price.height),
            ("price.visible", self.price.visible as f64),
            ("seasonal.height", self.seasonal.height),
            ("compare.height", self.compare.height),
            ("compare.visible", self.compare.visible as f64),
            ("cot.height", self.cot.height),
            ("cot.visible", self.cot.visible as f64),
            ("spread.width", self.spread.width),
            ("spread.height", self.spread.height),
        ];
        for (field, value) in checks {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { field });
            }
        }
        if self.price.main_height() <= 0.0 {
            return Err(ConfigError::NotPositive {
                field: "price.height - price.rsi_height",
            });
        }
        Ok(())
    }
}
