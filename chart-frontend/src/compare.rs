//! Base-100 comparison of several symbols over the same trailing window.

use std::rc::Rc;

use data_feed::SharedPrices;
use tracing::debug;
use ts_core::{trailing_window, Bar, Viewport};

use crate::config::CompareChartConfig;
use crate::format::fixed;
use crate::mapper::{CoordinateMapper, ValueDomain, DOMAIN_MARGIN};
use crate::surface::{Fill, Rect, RendererBackend, Stroke, TextAlign, TextStyle};
use crate::theme;
use crate::view::{ChartRenderer, Hover};

const BASE: f64 = 100.0;

/// Selected symbols, in selection order, plus the price table to read them from.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub symbols: Vec<String>,
    pub prices: Rc<SharedPrices>,
}

impl Comparison {
    pub fn new(symbols: Vec<String>, prices: Rc<SharedPrices>) -> Self {
        Self { symbols, prices }
    }
}

/// Closes rebased so the first one is exactly 100. `None` when the window is
/// empty or starts at zero.
pub fn rebase(bars: &[Bar]) -> Option<Vec<f64>> {
    let base = bars.first()?.close;
    if base == 0.0 || !base.is_finite() {
        return None;
    }
    Some(bars.iter().map(|b| b.close / base * BASE).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebasedSeries {
    pub symbol: String,
    pub color: &'static str,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CompareChart {
    config: CompareChartConfig,
}

impl CompareChart {
    pub fn new(config: CompareChartConfig) -> Self {
        Self { config }
    }

    /// Colours follow the selection index, so a skipped symbol leaves a gap
    /// in the palette rather than shifting later colours.
    pub fn series(&self, data: &Comparison) -> Vec<RebasedSeries> {
        if data.symbols.len() > self.config.max_symbols {
            debug!(
                selected = data.symbols.len(),
                max = self.config.max_symbols,
                "comparison selection truncated"
            );
        }
        data.symbols
            .iter()
            .take(self.config.max_symbols)
            .enumerate()
            .filter_map(|(i, symbol)| {
                let bars = data.prices.get(symbol)?;
                let Some(values) = rebase(trailing_window(bars, self.config.visible)) else {
                    debug!(%symbol, "symbol has no usable base close");
                    return None;
                };
                Some(RebasedSeries {
                    symbol: symbol.clone(),
                    color: theme::COMPARE_PALETTE[i % theme::COMPARE_PALETTE.len()],
                    values,
                })
            })
            .collect()
    }
}

impl ChartRenderer for CompareChart {
    type Data = Comparison;

    fn height(&self) -> f64 {
        self.config.height
    }

    fn render(
        &self,
        data: &Comparison,
        viewport: &Viewport,
        _hover: Option<Hover>,
        out: &mut dyn RendererBackend,
    ) {
        let series = self.series(data);
        let Some(domain) =
            ValueDomain::from_values(series.iter().flat_map(|s| s.values.iter().copied()))
        else {
            return;
        };
        let domain = domain.padded(DOMAIN_MARGIN);
        let m = CoordinateMapper::new(
            viewport.width,
            self.config.height,
            self.config.padding,
            domain,
            0,
        );

        out.begin_frame(viewport, theme::BG);
        let levels = domain.levels(4);
        let grid: Vec<_> = levels
            .iter()
            .map(|v| {
                let y = m.value_to_y(*v);
                (m.left, y, m.right(), y)
            })
            .collect();
        out.draw_segments(&grid, &Stroke::solid(theme::GRID, 1.0));
        let label = TextStyle::new(theme::TEXT_MUTED, 10.0).align(TextAlign::Right);
        for v in levels {
            out.draw_text(&fixed(v, 0), m.left - 6.0, m.value_to_y(v) + 4.0, &label);
        }
        if domain.straddles(BASE) {
            let y = m.value_to_y(BASE);
            out.draw_segments(
                &[(m.left, y, m.right(), y)],
                &Stroke::solid(theme::REFERENCE_LINE, 1.0).dashed(4.0, 4.0),
            );
        }

        for s in &series {
            // Each series spans the full width over its own length.
            let own = m.with_count(s.values.len());
            let points: Vec<_> = s
                .values
                .iter()
                .enumerate()
                .map(|(i, v)| (own.edge_index_to_x(i), own.value_to_y(*v)))
                .collect();
            out.draw_polyline(&points, &Stroke::solid(s.color, 2.0));
        }

        let mut x = m.left;
        for s in &series {
            out.fill_rect(Rect::new(x, 8.0, 14.0, 3.0), &Fill::new(s.color));
            out.draw_text(&s.symbol, x + 18.0, 12.0, &TextStyle::new(s.color, 10.0));
            x += 55.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::DisplayList;
    use data_feed::SharedBars;

    fn bars(closes: &[f64]) -> SharedBars {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::new(format!("2024-02-{:02}", i + 1), *c, *c, *c, *c, 0))
            .collect::<Vec<_>>()
            .into()
    }

    fn comparison(symbols: &[&str]) -> Comparison {
        let mut prices = SharedPrices::new();
        prices.insert("ZC".into(), bars(&[450.0, 459.0, 441.0]));
        prices.insert("ZS".into(), bars(&[1200.0, 1260.0]));
        prices.insert("KE".into(), bars(&[0.0, 600.0]));
        Comparison::new(
            symbols.iter().map(|s| s.to_string()).collect(),
            Rc::new(prices),
        )
    }

    #[test]
    fn first_point_is_exactly_one_hundred() {
        let series = CompareChart::default().series(&comparison(&["ZC", "ZS"]));
        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|s| s.values[0] == 100.0));
        assert!((series[0].values[1] - 102.0).abs() < 1e-9);
        assert!((series[1].values[1] - 105.0).abs() < 1e-9);
    }

    #[test]
    fn zero_base_and_unknown_symbols_are_skipped() {
        let series = CompareChart::default().series(&comparison(&["KE", "XX", "ZS"]));
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].symbol, "ZS");
        // Third selection keeps the third colour.
        assert_eq!(series[0].color, theme::COMPARE_PALETTE[2]);
    }

    #[test]
    fn selection_is_capped() {
        let chart = CompareChart::new(CompareChartConfig::default().with_max_symbols(1));
        let series = chart.series(&comparison(&["ZC", "ZS"]));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn base_reference_line_is_dashed() {
        let vp = Viewport::new(500.0, 320.0);
        let mut out = DisplayList::new();
        CompareChart::default().render(&comparison(&["ZC", "ZS"]), &vp, None, &mut out);
        let dashed = out.commands().iter().any(|c| {
            matches!(c, crate::surface::DrawCommand::Segments { stroke, .. } if stroke.dash == Some([4.0, 4.0]))
        });
        assert!(dashed);
        assert_eq!(out.polylines().count(), 2);
        assert!(out.texts().any(|t| t == "ZS"));
    }

    #[test]
    fn series_of_different_lengths_share_both_edges() {
        let chart = CompareChart::default();
        let vp = Viewport::new(500.0, 320.0);
        let mut out = DisplayList::new();
        chart.render(&comparison(&["ZC", "ZS"]), &vp, None, &mut out);

        let lines: Vec<_> = out.polylines().map(|(points, _)| points).collect();
        let (zc, zs) = (lines[0], lines[1]);
        assert_eq!((zc.len(), zs.len()), (3, 2));
        assert_eq!(zc[0].0, zs[0].0);
        assert_eq!(zc[2].0, zs[1].0);
        assert_eq!(zc[0].0, chart.config.padding.left);
        assert_eq!(zc[2].0, vp.width - chart.config.padding.right);
    }

    #[test]
    fn nothing_selected_draws_nothing() {
        let mut out = DisplayList::new();
        CompareChart::default().render(&comparison(&[]), &Viewport::new(500.0, 320.0), None, &mut out);
        assert!(out.is_empty());
    }
}
