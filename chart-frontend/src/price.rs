//! Candlestick chart with moving-average overlays, a Bollinger ribbon, a
//! volume histogram and an RSI sub-panel.

use ta_engine::{rsi, IndicatorKind, LinePattern, LineStyle, RsiZone};
use tracing::trace;
use ts_core::{closes, trailing_window, Bar, Viewport};

use crate::config::PriceChartConfig;
use crate::format::{fixed, group_thousands, signed_pct};
use crate::mapper::{CoordinateMapper, ValueDomain, DOMAIN_MARGIN};
use crate::surface::{Fill, Rect, RendererBackend, Stroke, TextAlign, TextStyle};
use crate::theme;
use crate::view::{ChartRenderer, Hover};

const GRID_DIVISIONS: usize = 4;
const DATE_LABELS: usize = 8;
/// Gap between the candle panel and the RSI panel.
const RSI_GAP: f64 = 10.0;
const TOOLTIP_WIDTH: f64 = 150.0;
const TOOLTIP_HEIGHT: f64 = 102.0;

pub(crate) fn stroke_for(style: &LineStyle) -> Stroke {
    let stroke = Stroke::solid(style.color.as_str(), style.width);
    match style.pattern {
        LinePattern::Solid => stroke,
        LinePattern::Dashed => stroke.dashed(4.0, 4.0),
        LinePattern::Dotted => stroke.dashed(1.0, 3.0),
    }
}

/// One overlay line over the visible window; NaN marks warm-up.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLine {
    pub label: String,
    pub style: LineStyle,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandRibbon {
    pub label: String,
    pub fill: String,
    pub legend: String,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Everything computed for one frame, before any drawing.
#[derive(Debug, Clone)]
pub struct PriceLayout<'a> {
    pub bars: &'a [Bar],
    pub main: CoordinateMapper,
    pub bar_width: f64,
    pub lines: Vec<OverlayLine>,
    pub ribbons: Vec<BandRibbon>,
    pub rsi: Vec<f64>,
    pub rsi_top: f64,
    pub rsi_height: f64,
    pub max_volume: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleGeometry {
    pub x: f64,
    pub wick_top: f64,
    pub wick_bottom: f64,
    pub body: Rect,
    pub up: bool,
}

impl PriceLayout<'_> {
    pub fn candles(&self) -> Vec<CandleGeometry> {
        self.bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let x = self.main.index_to_x(i);
                let y_open = self.main.value_to_y(bar.open);
                let y_close = self.main.value_to_y(bar.close);
                let top = y_open.min(y_close);
                let height = (y_open - y_close).abs().max(1.0);
                CandleGeometry {
                    x,
                    wick_top: self.main.value_to_y(bar.high),
                    wick_bottom: self.main.value_to_y(bar.low),
                    body: Rect::new(x - self.bar_width / 2.0, top, self.bar_width, height),
                    up: bar.is_up(),
                }
            })
            .collect()
    }

    pub fn rsi_to_y(&self, v: f64) -> f64 {
        self.rsi_top + self.rsi_height * (1.0 - v / 100.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceChart {
    config: PriceChartConfig,
}

impl PriceChart {
    pub fn new(config: PriceChartConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriceChartConfig {
        &self.config
    }

    /// `None` when there is nothing to plot.
    pub fn layout<'a>(&self, bars: &'a [Bar], viewport: &Viewport) -> Option<PriceLayout<'a>> {
        let bars = trailing_window(bars, self.config.visible);
        if bars.is_empty() {
            return None;
        }
        let domain = ValueDomain::from_values(bars.iter().flat_map(|b| [b.high, b.low]))?
            .padded(DOMAIN_MARGIN);
        let main = CoordinateMapper::new(
            viewport.width,
            self.config.main_height(),
            self.config.padding,
            domain,
            bars.len(),
        );
        let close = closes(bars);

        let mut lines = Vec::new();
        let mut ribbons = Vec::new();
        for overlay in &self.config.overlays {
            let mut columns = overlay.compute(&close);
            match overlay.kind {
                IndicatorKind::Bbands if columns.len() == 3 => {
                    let lower = columns.pop().unwrap_or_default();
                    let upper = columns.pop().unwrap_or_default();
                    ribbons.push(BandRibbon {
                        label: overlay.label.clone(),
                        fill: overlay.style(1).map(|s| s.color.clone()).unwrap_or_default(),
                        legend: overlay.style(0).map(|s| s.color.clone()).unwrap_or_default(),
                        upper,
                        lower,
                    });
                }
                IndicatorKind::Sma | IndicatorKind::Ema => {
                    let (Some(values), Some(style)) = (columns.into_iter().next(), overlay.style(0))
                    else {
                        continue;
                    };
                    lines.push(OverlayLine {
                        label: overlay.label.clone(),
                        style: style.clone(),
                        values,
                    });
                }
                // RSI has its own panel.
                _ => trace!(label = %overlay.label, "overlay not drawn on price panel"),
            }
        }

        let rsi_height = (self.config.rsi_height - 2.0 * RSI_GAP).max(0.0);
        Some(PriceLayout {
            bars,
            bar_width: (main.slot_width() - 1.0).max(2.0),
            main,
            lines,
            ribbons,
            rsi: rsi(&close, self.config.rsi_period),
            rsi_top: self.config.main_height() + RSI_GAP,
            rsi_height,
            max_volume: bars.iter().map(|b| b.volume).max().unwrap_or(0),
        })
    }

    fn draw_grid(&self, layout: &PriceLayout<'_>, out: &mut dyn RendererBackend) {
        let m = &layout.main;
        let levels = m.domain.levels(GRID_DIVISIONS);
        let segments: Vec<_> = levels
            .iter()
            .map(|v| {
                let y = m.value_to_y(*v);
                (m.left, y, m.right(), y)
            })
            .collect();
        out.draw_segments(&segments, &Stroke::solid(theme::GRID, 1.0));
        let label = TextStyle::new(theme::TEXT_MUTED, 10.0).align(TextAlign::Right);
        for v in levels {
            out.draw_text(&fixed(v, 2), m.left - 6.0, m.value_to_y(v) + 3.0, &label);
        }
    }

    fn draw_overlays(&self, layout: &PriceLayout<'_>, out: &mut dyn RendererBackend) {
        let m = &layout.main;
        for ribbon in &layout.ribbons {
            let upper = ribbon
                .upper
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, v)| (m.index_to_x(i), m.value_to_y(*v)));
            let lower: Vec<_> = ribbon
                .lower
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, v)| (m.index_to_x(i), m.value_to_y(*v)))
                .collect();
            let polygon: Vec<_> = upper.chain(lower.into_iter().rev()).collect();
            out.fill_path(&polygon, &Fill::new(ribbon.fill.as_str()));
        }
        for line in &layout.lines {
            let points: Vec<_> = line
                .values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, v)| (m.index_to_x(i), m.value_to_y(*v)))
                .collect();
            out.draw_polyline(&points, &stroke_for(&line.style));
        }
    }

    fn draw_candles(&self, layout: &PriceLayout<'_>, out: &mut dyn RendererBackend) {
        let candles = layout.candles();
        let wicks: Vec<_> = candles
            .iter()
            .map(|c| (c.x, c.wick_top, c.x, c.wick_bottom))
            .collect();
        out.draw_segments(&wicks, &Stroke::solid(theme::WICK, 1.0));
        let up = Fill::new(theme::CANDLE_UP);
        let down = Fill::new(theme::CANDLE_DOWN);
        for c in &candles {
            out.fill_rect(c.body, if c.up { &up } else { &down });
        }
    }

    fn draw_volume(&self, layout: &PriceLayout<'_>, out: &mut dyn RendererBackend) {
        if layout.max_volume == 0 {
            return;
        }
        let m = &layout.main;
        let base = m.bottom();
        let up = Fill::new(theme::CANDLE_UP).with_alpha(0.3);
        let down = Fill::new(theme::CANDLE_DOWN).with_alpha(0.3);
        for (i, bar) in layout.bars.iter().enumerate() {
            let h = bar.volume as f64 / layout.max_volume as f64 * self.config.volume_height;
            let rect = Rect::new(
                m.index_to_x(i) - layout.bar_width / 2.0,
                base - h,
                layout.bar_width,
                h,
            );
            out.fill_rect(rect, if bar.is_up() { &up } else { &down });
        }
    }

    fn draw_dates(&self, layout: &PriceLayout<'_>, out: &mut dyn RendererBackend) {
        let m = &layout.main;
        let step = layout.bars.len().div_ceil(DATE_LABELS).max(1);
        let style = TextStyle::new(theme::TEXT_MUTED, 9.0).align(TextAlign::Center);
        for (i, bar) in layout.bars.iter().enumerate().step_by(step) {
            out.draw_text(bar.short_date(), m.index_to_x(i), m.bottom() + 14.0, &style);
        }
    }

    fn draw_rsi(&self, layout: &PriceLayout<'_>, out: &mut dyn RendererBackend) {
        if layout.rsi_height <= 0.0 {
            return;
        }
        let m = &layout.main;
        let (top, h) = (layout.rsi_top, layout.rsi_height);
        out.fill_rect(Rect::new(m.left, top, m.plot_width, h), &Fill::new(theme::PANEL_ALT));
        let zone = h * (1.0 - RsiZone::OVERBOUGHT / 100.0);
        out.fill_rect(
            Rect::new(m.left, top, m.plot_width, zone),
            &Fill::new(theme::RSI_OVERBOUGHT).with_alpha(0.3),
        );
        out.fill_rect(
            Rect::new(m.left, layout.rsi_to_y(RsiZone::OVERSOLD), m.plot_width, zone),
            &Fill::new(theme::RSI_OVERSOLD).with_alpha(0.3),
        );
        let mid = layout.rsi_to_y(50.0);
        out.draw_segments(
            &[(m.left, mid, m.right(), mid)],
            &Stroke::solid(theme::REFERENCE_LINE, 1.0).dashed(4.0, 4.0),
        );

        let points: Vec<_> = layout
            .rsi
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, v)| (m.index_to_x(i), layout.rsi_to_y(*v)))
            .collect();
        out.draw_polyline(&points, &Stroke::solid(theme::RSI_LINE, 1.5));

        let label = TextStyle::new(theme::TEXT_MUTED, 9.0).align(TextAlign::Right);
        for level in [RsiZone::OVERBOUGHT, 50.0, RsiZone::OVERSOLD] {
            out.draw_text(
                &fixed(level, 0),
                m.left - 4.0,
                layout.rsi_to_y(level) + 3.0,
                &label,
            );
        }

        if let Some(last) = layout.rsi.last().filter(|v| v.is_finite()) {
            let color = match RsiZone::of(*last) {
                RsiZone::Overbought => theme::RED,
                RsiZone::Oversold => theme::GREEN,
                RsiZone::Neutral => theme::RSI_LINE,
            };
            out.draw_text(
                &format!("RSI: {}", fixed(*last, 1)),
                m.left + 5.0,
                top + 12.0,
                &TextStyle::new(color, 11.0).bold(),
            );
        }
    }

    fn draw_legend(&self, layout: &PriceLayout<'_>, out: &mut dyn RendererBackend) {
        let entries = layout
            .lines
            .iter()
            .map(|l| (l.label.as_str(), l.style.color.as_str()))
            .chain(
                layout
                    .ribbons
                    .iter()
                    .map(|r| (r.label.as_str(), r.legend.as_str())),
            );
        let mut x = layout.main.left;
        for (label, color) in entries {
            out.fill_rect(Rect::new(x, 8.0, 16.0, 2.0), &Fill::new(color));
            out.draw_text(label, x + 20.0, 12.0, &TextStyle::new(color, 9.0));
            x += 60.0;
        }
    }

    fn draw_hover(
        &self,
        layout: &PriceLayout<'_>,
        viewport: &Viewport,
        hover: Hover,
        out: &mut dyn RendererBackend,
    ) {
        let Some(bar) = layout.bars.get(hover.index) else {
            return;
        };
        let m = &layout.main;
        let x = m.index_to_x(hover.index);
        let y = hover.y.clamp(m.top, m.bottom());
        let bottom = if layout.rsi_height > 0.0 {
            layout.rsi_top + layout.rsi_height
        } else {
            m.bottom()
        };
        out.draw_segments(
            &[(x, m.top, x, bottom), (m.left, y, m.right(), y)],
            &Stroke::solid(theme::CROSSHAIR, 1.0).dashed(3.0, 3.0),
        );

        let tx = (x + 10.0)
            .min(viewport.width - TOOLTIP_WIDTH - 10.0)
            .max(self.config.padding.left);
        let ty = m.top;
        let rect = Rect::new(tx, ty, TOOLTIP_WIDTH, TOOLTIP_HEIGHT);
        out.fill_rect(rect, &Fill::new(theme::TOOLTIP_BG));
        out.stroke_rect(rect, &Stroke::solid(theme::BORDER, 1.0));

        let row = TextStyle::new(theme::TEXT, 10.0);
        out.draw_text(&bar.date, tx + 8.0, ty + 16.0, &row.clone().bold());
        let close_color = if bar.is_up() { theme::GREEN } else { theme::RED };
        let rows = [
            (format!("O: {}", fixed(bar.open, 2)), theme::TEXT),
            (format!("H: {}", fixed(bar.high, 2)), theme::TEXT),
            (format!("L: {}", fixed(bar.low, 2)), theme::TEXT),
            (format!("C: {}", fixed(bar.close, 2)), close_color),
            (format!("Vol: {}", group_thousands(bar.volume)), theme::TEXT_DIM),
        ];
        let mut row_y = ty + 30.0;
        for (text, color) in rows {
            out.draw_text(&text, tx + 8.0, row_y, &TextStyle::new(color, 10.0));
            row_y += 13.0;
        }
        if let Some(pct) = bar.change_pct() {
            let color = if pct >= 0.0 { theme::GREEN } else { theme::RED };
            out.draw_text(&signed_pct(pct), tx + 8.0, row_y, &TextStyle::new(color, 10.0).bold());
        }
    }
}

impl ChartRenderer for PriceChart {
    type Data = [Bar];

    fn height(&self) -> f64 {
        self.config.height
    }

    fn render(
        &self,
        bars: &[Bar],
        viewport: &Viewport,
        hover: Option<Hover>,
        out: &mut dyn RendererBackend,
    ) {
        let Some(layout) = self.layout(bars, viewport) else {
            return;
        };
        out.begin_frame(viewport, theme::BG);
        self.draw_grid(&layout, out);
        self.draw_overlays(&layout, out);
        self.draw_candles(&layout, out);
        self.draw_volume(&layout, out);
        self.draw_dates(&layout, out);
        self.draw_rsi(&layout, out);
        self.draw_legend(&layout, out);
        if let Some(hover) = hover {
            self.draw_hover(&layout, viewport, hover, out);
        }
    }

    fn hit_test(&self, bars: &[Bar], viewport: &Viewport, x: f64) -> Option<usize> {
        let count = bars.len().min(self.config.visible);
        CoordinateMapper::new(
            viewport.width,
            self.config.main_height(),
            self.config.padding,
            ValueDomain::new(0.0, 1.0),
            count,
        )
        .x_to_index(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DisplayList, DrawCommand};
    use ta_engine::{IndicatorConfig, IndicatorParams, OutputKind};

    fn two_up_bars() -> Vec<Bar> {
        vec![
            Bar::new("2024-01-01", 100.0, 105.0, 99.0, 103.0, 1000),
            Bar::new("2024-01-02", 103.0, 107.0, 102.0, 106.0, 1200),
        ]
    }

    fn sma2_chart() -> PriceChart {
        PriceChart::new(PriceChartConfig::default().with_overlays(vec![
            IndicatorConfig::with_default_styles(IndicatorParams::Sma { period: 2 }, OutputKind::Overlay),
        ]))
    }

    fn viewport() -> Viewport {
        Viewport::new(400.0, 480.0)
    }

    #[test]
    fn two_bar_scenario() {
        let bars = two_up_bars();
        let chart = PriceChart::new(sma2_chart().config().clone().with_visible(2));
        let layout = chart.layout(&bars, &viewport()).unwrap();
        let candles = layout.candles();
        assert_eq!(candles.len(), 2);
        assert!(candles.iter().all(|c| c.up));
        assert!(candles.iter().all(|c| c.body.h >= 1.0));
        assert!(layout.lines[0].values[0].is_nan());
        assert_eq!(layout.lines[0].values[1], 104.5);
        // Flat RSI warm-up.
        assert!(layout.rsi.iter().all(|v| *v == 50.0));
    }

    #[test]
    fn long_warmup_line_is_not_drawn() {
        let bars = two_up_bars();
        let chart = PriceChart::default();
        let mut out = DisplayList::new();
        chart.render(&bars, &viewport(), None, &mut out);
        // EMA9 and RSI are defined from the first bar; the MAs and BB are not.
        let widths: Vec<f64> = out.polylines().map(|(_, s)| s.width).collect();
        assert_eq!(widths, vec![1.5, 1.5]);
        assert!(!out
            .commands()
            .iter()
            .any(|c| matches!(c, DrawCommand::FillPath { .. })));
        assert!(out.texts().any(|t| t == "MA200"));
    }

    #[test]
    fn empty_input_draws_nothing() {
        let mut out = DisplayList::new();
        PriceChart::default().render(&[], &viewport(), None, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn zero_volume_skips_histogram() {
        let bars: Vec<_> = two_up_bars()
            .into_iter()
            .map(|mut b| {
                b.volume = 0;
                b
            })
            .collect();
        let mut out = DisplayList::new();
        sma2_chart().render(&bars, &viewport(), None, &mut out);
        let translucent = out
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::FillRect { fill, .. } if fill.alpha == 0.3 && fill.color != theme::RSI_OVERBOUGHT && fill.color != theme::RSI_OVERSOLD))
            .count();
        assert_eq!(translucent, 0);

        let mut with_volume = DisplayList::new();
        sma2_chart().render(&two_up_bars(), &viewport(), None, &mut with_volume);
        assert!(with_volume.len() > out.len());
    }

    #[test]
    fn only_visible_window_is_drawn() {
        let bars: Vec<_> = (0..200)
            .map(|i| {
                let c = 100.0 + i as f64;
                Bar::new(format!("2024-01-{i:03}"), c, c + 1.0, c - 1.0, c, 10)
            })
            .collect();
        let chart = PriceChart::new(PriceChartConfig::default().with_visible(50));
        let layout = chart.layout(&bars, &viewport()).unwrap();
        assert_eq!(layout.bars.len(), 50);
        assert_eq!(layout.bars[0].close, 250.0);
        // Indicators only see the window: MA200 has no values.
        let ma200 = layout.lines.iter().find(|l| l.label == "MA200").unwrap();
        assert!(ma200.values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn hover_draws_tooltip_with_intrabar_change() {
        let bars = two_up_bars();
        let chart = sma2_chart();
        let vp = viewport();
        let layout = chart.layout(&bars, &vp).unwrap();
        let x = layout.main.index_to_x(1);
        assert_eq!(chart.hit_test(&bars, &vp, x), Some(1));
        assert_eq!(chart.hit_test(&bars, &vp, 1.0), None);

        let mut out = DisplayList::new();
        chart.render(
            &bars,
            &vp,
            Some(Hover {
                index: 1,
                x,
                y: 100.0,
            }),
            &mut out,
        );
        assert!(out.texts().any(|t| t == "2024-01-02"));
        assert!(out.texts().any(|t| t == "C: 106.00"));
        assert!(out.texts().any(|t| t == "Vol: 1,200"));
        // (106 - 103) / 103
        assert!(out.texts().any(|t| t == "+2.91%"));
    }

    #[test]
    fn volume_is_painted_over_candles() {
        let mut out = DisplayList::new();
        sma2_chart().render(&two_up_bars(), &viewport(), None, &mut out);
        let commands = out.commands();
        let wicks = commands
            .iter()
            .position(|c| matches!(c, DrawCommand::Segments { stroke, .. } if stroke.color == theme::WICK))
            .unwrap();
        let last_body = commands
            .iter()
            .rposition(|c| matches!(c, DrawCommand::FillRect { fill, .. } if fill.color == theme::CANDLE_UP && fill.alpha == 1.0))
            .unwrap();
        let first_volume = commands
            .iter()
            .position(|c| matches!(c, DrawCommand::FillRect { fill, .. } if fill.color == theme::CANDLE_UP && fill.alpha == 0.3))
            .unwrap();
        assert!(wicks < last_body);
        assert!(first_volume > last_body);
        let date = out.position_of_text("01-01").unwrap();
        assert!(date > first_volume);
    }

    #[test]
    fn tooltip_stays_inside_narrow_viewport() {
        let bars = two_up_bars();
        let chart = sma2_chart();
        let vp = Viewport::new(120.0, 480.0);
        let layout = chart.layout(&bars, &vp).unwrap();
        let hover = Hover {
            index: 1,
            x: layout.main.index_to_x(1),
            y: 100.0,
        };
        let mut out = DisplayList::new();
        chart.render(&bars, &vp, Some(hover), &mut out);
        let tooltip = out
            .commands()
            .iter()
            .find_map(|c| match c {
                DrawCommand::FillRect { rect, fill } if fill.color == theme::TOOLTIP_BG => Some(*rect),
                _ => None,
            })
            .unwrap();
        assert_eq!(tooltip.x, chart.config().padding.left);
    }

    #[test]
    fn rendering_is_deterministic() {
        let bars = two_up_bars();
        let chart = PriceChart::default();
        let (mut a, mut b) = (DisplayList::new(), DisplayList::new());
        chart.render(&bars, &viewport(), None, &mut a);
        chart.render(&bars, &viewport(), None, &mut b);
        assert_eq!(a, b);
        assert!(matches!(a.commands()[0], DrawCommand::BeginFrame { .. }));
    }
}
