//! Commitment of Traders net positioning, one line per trader category.

use ts_core::{trailing_window, CotEntry, CotReport, TraderCategory, Viewport};

use crate::config::CotChartConfig;
use crate::format::signed_abbrev;
use crate::mapper::{CoordinateMapper, ValueDomain, DOMAIN_MARGIN};
use crate::surface::{circle_path, Fill, Rect, RendererBackend, Stroke, TextAlign, TextStyle};
use crate::theme;
use crate::view::{ChartRenderer, Hover};

const TOOLTIP_WIDTH: f64 = 160.0;
const BADGE_MIN_WIDTH: f64 = 48.0;

pub fn category_color(category: TraderCategory) -> &'static str {
    match category {
        TraderCategory::Commercial => theme::RED,
        TraderCategory::NonCommercial => theme::BLUE,
        TraderCategory::ManagedMoney => theme::GREEN,
        TraderCategory::Producer => theme::AMBER,
        TraderCategory::SwapDealer => theme::PURPLE,
    }
}

/// Net (long - short) per entry; `None` where either side is missing.
pub fn net_series(history: &[CotEntry], category: TraderCategory) -> Vec<Option<f64>> {
    history
        .iter()
        .map(|e| category.net(e).map(|v| v as f64))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetLine {
    pub category: TraderCategory,
    pub color: &'static str,
    pub nets: Vec<Option<f64>>,
}

impl NetLine {
    pub fn last_defined(&self) -> Option<f64> {
        self.nets.iter().rev().find_map(|v| *v)
    }
}

#[derive(Debug, Clone)]
pub struct CotLayout<'a> {
    pub entries: &'a [CotEntry],
    pub lines: Vec<NetLine>,
    pub mapper: CoordinateMapper,
    /// Drawn when the value domain straddles zero.
    pub zero_line: bool,
    /// Base of the area fills.
    pub baseline_y: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CotChart {
    config: CotChartConfig,
}

impl CotChart {
    pub fn new(config: CotChartConfig) -> Self {
        Self { config }
    }

    pub fn report(&self) -> CotReport {
        self.config.report
    }

    pub fn layout<'a>(&self, history: &'a [CotEntry], viewport: &Viewport) -> Option<CotLayout<'a>> {
        let entries = trailing_window(history, self.config.visible);
        if entries.is_empty() {
            return None;
        }
        let lines: Vec<_> = self
            .config
            .report
            .categories()
            .iter()
            .map(|&category| NetLine {
                category,
                color: category_color(category),
                nets: net_series(entries, category),
            })
            .collect();
        let domain =
            ValueDomain::from_values(lines.iter().flat_map(|l| l.nets.iter().flatten().copied()))?
                .padded(DOMAIN_MARGIN);
        let mapper = CoordinateMapper::new(
            viewport.width,
            self.config.height,
            self.config.padding,
            domain,
            entries.len(),
        );
        Some(CotLayout {
            entries,
            lines,
            zero_line: domain.straddles(0.0),
            baseline_y: mapper.value_to_y(domain.clamp(0.0)),
            mapper,
        })
    }

    fn draw_scale(&self, layout: &CotLayout<'_>, out: &mut dyn RendererBackend) {
        let m = &layout.mapper;
        let grid: Vec<_> = m
            .domain
            .levels(4)
            .into_iter()
            .map(|v| {
                let y = m.value_to_y(v);
                (m.left, y, m.right(), y)
            })
            .collect();
        out.draw_segments(&grid, &Stroke::solid("rgba(148,163,184,.08)", 0.5));
        if layout.zero_line {
            let y = m.value_to_y(0.0);
            out.draw_segments(
                &[(m.left, y, m.right(), y)],
                &Stroke::solid(theme::REFERENCE_LINE, 0.8).dashed(4.0, 3.0),
            );
        }
    }

    fn draw_lines(&self, layout: &CotLayout<'_>, out: &mut dyn RendererBackend) {
        let m = &layout.mapper;
        for line in &layout.lines {
            let points: Vec<_> = line
                .nets
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|v| (m.index_to_x(i), m.value_to_y(v))))
                .collect();
            let (Some(first), Some(last)) = (points.first(), points.last()) else {
                continue;
            };
            let mut area = Vec::with_capacity(points.len() + 2);
            area.push((first.0, layout.baseline_y));
            area.extend_from_slice(&points);
            area.push((last.0, layout.baseline_y));
            out.fill_path(&area, &Fill::new(theme::tint(line.color, 0.08)));
            out.draw_polyline(&points, &Stroke::solid(line.color, 1.8));

            if let Some(value) = line.last_defined() {
                self.draw_badge(m, line.color, value, out);
            }
        }
    }

    fn draw_badge(
        &self,
        m: &CoordinateMapper,
        color: &str,
        value: f64,
        out: &mut dyn RendererBackend,
    ) {
        let text = signed_abbrev(value, 0);
        let style = TextStyle::new("#fff", 9.0).bold();
        let y = m.value_to_y(value);
        let x = m.right() + 4.0;
        let width = (style.measure(&text) + 12.0).max(BADGE_MIN_WIDTH);
        let fill = Fill::new(color);
        out.fill_rect(Rect::new(x, y - 8.0, width, 16.0), &fill);
        out.fill_path(&[(x, y), (m.right(), y - 4.0), (m.right(), y + 4.0)], &fill);
        out.draw_text(&text, x + 4.0, y + 3.0, &style);
    }

    fn draw_hover(&self, layout: &CotLayout<'_>, hover: Hover, out: &mut dyn RendererBackend) {
        let Some(entry) = layout.entries.get(hover.index) else {
            return;
        };
        let m = &layout.mapper;
        let n = layout.entries.len();
        let x = m.index_to_x(hover.index);
        let y = hover.y.clamp(m.top, m.bottom());
        out.draw_segments(
            &[(x, m.top, x, m.bottom()), (m.left, y, m.right(), y)],
            &Stroke::solid(theme::CROSSHAIR, 1.0).dashed(3.0, 3.0),
        );
        for line in &layout.lines {
            if let Some(v) = line.nets[hover.index] {
                out.fill_path(&circle_path(x, m.value_to_y(v), 3.5), &Fill::new(line.color));
            }
        }

        let tx = if hover.index > n / 2 {
            x - TOOLTIP_WIDTH - 10.0
        } else {
            x + 10.0
        };
        let ty = m.top + 2.0;
        let rect = Rect::new(tx, ty, TOOLTIP_WIDTH, 14.0 + layout.lines.len() as f64 * 14.0 + 4.0);
        out.fill_rect(rect, &Fill::new(theme::TOOLTIP_BG));
        out.stroke_rect(rect, &Stroke::solid(theme::REFERENCE_LINE, 0.5));
        out.draw_text(
            &entry.date,
            tx + 6.0,
            m.top + 14.0,
            &TextStyle::new(theme::TEXT_DIM, 9.0).bold(),
        );
        for (row, line) in layout.lines.iter().enumerate() {
            let value = line.nets[hover.index]
                .map(|v| signed_abbrev(v, 1))
                .unwrap_or_else(|| "n/a".to_string());
            out.draw_text(
                &format!("\u{25CF} {}: {}", line.category.label(), value),
                tx + 6.0,
                m.top + 14.0 + 14.0 * (row + 1) as f64,
                &TextStyle::new(line.color, 8.0),
            );
        }
    }

    fn draw_dates(&self, layout: &CotLayout<'_>, out: &mut dyn RendererBackend) {
        let m = &layout.mapper;
        let n = layout.entries.len();
        let step = (n / 8).max(1);
        let style = TextStyle::new(theme::TEXT_MUTED, 8.0).align(TextAlign::Center);
        for (i, entry) in layout.entries.iter().enumerate() {
            if i % step == 0 || i == n - 1 {
                let label = entry.date.get(2..7).unwrap_or(&entry.date);
                out.draw_text(label, m.index_to_x(i), m.bottom() + 12.0, &style);
            }
        }
    }

    fn draw_legend(&self, layout: &CotLayout<'_>, out: &mut dyn RendererBackend) {
        let style = TextStyle::new(theme::TEXT_DIM, 8.0);
        let mut x = layout.mapper.left + 4.0;
        for line in &layout.lines {
            let label = line.category.label();
            out.fill_rect(Rect::new(x, 2.0, 8.0, 8.0), &Fill::new(line.color));
            out.draw_text(label, x + 11.0, 10.0, &style);
            x += style.measure(label) + 22.0;
        }
    }
}

impl ChartRenderer for CotChart {
    type Data = [CotEntry];

    fn height(&self) -> f64 {
        self.config.height
    }

    fn render(
        &self,
        history: &[CotEntry],
        viewport: &Viewport,
        hover: Option<Hover>,
        out: &mut dyn RendererBackend,
    ) {
        let Some(layout) = self.layout(history, viewport) else {
            return;
        };
        out.begin_frame(viewport, theme::BG);
        self.draw_scale(&layout, out);
        self.draw_lines(&layout, out);
        if let Some(hover) = hover {
            self.draw_hover(&layout, hover, out);
        }
        self.draw_dates(&layout, out);
        self.draw_legend(&layout, out);
    }

    fn hit_test(&self, history: &[CotEntry], viewport: &Viewport, x: f64) -> Option<usize> {
        CoordinateMapper::new(
            viewport.width,
            self.config.height,
            self.config.padding,
            ValueDomain::new(0.0, 1.0),
            history.len().min(self.config.visible),
        )
        .x_to_index(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DisplayList, DrawCommand};

    fn legacy(rows: &[(&str, i64, i64)]) -> Vec<CotEntry> {
        rows.iter()
            .map(|(date, long, short)| {
                CotEntry::new(*date).with_position(TraderCategory::Commercial, *long, *short)
            })
            .collect()
    }

    fn vp() -> Viewport {
        Viewport::new(600.0, 180.0)
    }

    #[test]
    fn zero_line_when_nets_cross_zero() {
        let history = legacy(&[("2024-01-02", 1000, 1500), ("2024-01-09", 1200, 1100)]);
        let chart = CotChart::default();
        let layout = chart.layout(&history, &vp()).unwrap();
        assert_eq!(layout.lines[0].nets, vec![Some(-500.0), Some(100.0)]);
        // Non-commercial has no data at all.
        assert!(layout.lines[1].nets.iter().all(Option::is_none));
        assert!(layout.zero_line);

        let mut out = DisplayList::new();
        chart.render(&history, &vp(), None, &mut out);
        let zero = out.commands().iter().any(|c| {
            matches!(c, DrawCommand::Segments { stroke, .. } if stroke.dash == Some([4.0, 3.0]))
        });
        assert!(zero);
        assert!(out.texts().any(|t| t == "+100"));
        assert_eq!(out.polylines().count(), 1);
    }

    #[test]
    fn all_positive_nets_have_no_zero_line() {
        let history = legacy(&[("2024-01-02", 3000, 1000), ("2024-01-09", 4000, 1000)]);
        let layout = CotChart::default().layout(&history, &vp()).unwrap();
        assert!(!layout.zero_line);
        // Area fills sit on the bottom of the domain.
        assert_eq!(layout.baseline_y, layout.mapper.bottom());
    }

    #[test]
    fn hover_tooltip_lists_every_category() {
        let mut history = legacy(&[("2024-01-02", 13000, 1000), ("2024-01-09", 12000, 1000)]);
        history[1] = history[1]
            .clone()
            .with_position(TraderCategory::NonCommercial, 500, 2000);
        let chart = CotChart::default();
        let layout = chart.layout(&history, &vp()).unwrap();
        let x = layout.mapper.index_to_x(0);
        assert_eq!(chart.hit_test(&history, &vp(), x), Some(0));

        let mut out = DisplayList::new();
        chart.render(
            &history,
            &vp(),
            Some(Hover {
                index: 0,
                x,
                y: 50.0,
            }),
            &mut out,
        );
        assert!(out.texts().any(|t| t == "\u{25CF} Commercial Net: +12.0K"));
        assert!(out.texts().any(|t| t == "\u{25CF} Non-Comm Net: n/a"));
        assert!(out.texts().any(|t| t == "2024-01-02"));
    }

    #[test]
    fn window_keeps_latest_reports() {
        let rows: Vec<_> = (0..150)
            .map(|i| (format!("2021-{i:03}"), 100 + i, 100))
            .collect();
        let history: Vec<_> = rows
            .iter()
            .map(|(d, l, s)| CotEntry::new(d.as_str()).with_position(TraderCategory::Commercial, *l, *s))
            .collect();
        let layout = CotChart::default().layout(&history, &vp()).unwrap();
        assert_eq!(layout.entries.len(), 109);
        assert_eq!(layout.lines[0].nets[0], Some(41.0));
    }

    #[test]
    fn disaggregated_uses_three_categories() {
        let history = vec![CotEntry::new("2024-01-02")
            .with_position(TraderCategory::ManagedMoney, 10, 5)
            .with_position(TraderCategory::Producer, 1, 8)];
        let chart = CotChart::new(CotChartConfig::default().with_report(CotReport::Disaggregated));
        let layout = chart.layout(&history, &vp()).unwrap();
        let labels: Vec<_> = layout.lines.iter().map(|l| l.category.label()).collect();
        assert_eq!(labels, vec!["Managed Money", "Producer", "Swap Dealers"]);
    }

    #[test]
    fn empty_or_null_history_draws_nothing() {
        let mut out = DisplayList::new();
        let chart = CotChart::default();
        chart.render(&[], &vp(), None, &mut out);
        assert!(out.is_empty());
        chart.render(&[CotEntry::new("2024-01-02")], &vp(), None, &mut out);
        assert!(out.is_empty());
    }
}
