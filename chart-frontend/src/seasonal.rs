//! Seasonal overlay: one line per year on a shared day-of-year axis.

use ts_core::{SeasonalEntry, Viewport, YearKind, AVERAGE_LABEL};

use crate::config::SeasonalChartConfig;
use crate::format::fixed;
use crate::mapper::{CoordinateMapper, ValueDomain, DOMAIN_MARGIN};
use crate::surface::{Fill, Rect, RendererBackend, Stroke, TextAlign, TextStyle};
use crate::theme;
use crate::view::{ChartRenderer, Hover};

const DAYS_IN_YEAR: f64 = 365.0;
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Past years first, then the average, then the current year on top.
/// The average is drawn whenever its series exists; other labels must be listed.
pub fn draw_order(entry: &SeasonalEntry) -> Vec<&str> {
    let mut order: Vec<&str> = entry
        .years
        .iter()
        .map(String::as_str)
        .filter(|y| YearKind::of(y) == YearKind::Past)
        .collect();
    if entry.series.contains_key(AVERAGE_LABEL) {
        order.push(AVERAGE_LABEL);
    }
    order.extend(
        entry
            .years
            .iter()
            .map(String::as_str)
            .filter(|y| YearKind::of(y) == YearKind::Current),
    );
    order
}

pub fn year_stroke(label: &str) -> Stroke {
    let color = theme::season_color(label);
    match YearKind::of(label) {
        YearKind::Current => Stroke::solid(color, 2.5),
        YearKind::Average => Stroke::solid(color, 2.0).dashed(6.0, 4.0),
        YearKind::Past => Stroke::solid(color, 1.0).with_alpha(0.35),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeasonalChart {
    config: SeasonalChartConfig,
}

impl SeasonalChart {
    pub fn new(config: SeasonalChartConfig) -> Self {
        Self { config }
    }

    fn mapper(&self, entry: &SeasonalEntry, viewport: &Viewport) -> Option<CoordinateMapper> {
        let values = draw_order(entry)
            .into_iter()
            .filter_map(|label| entry.series_for(label))
            .flatten()
            .filter_map(|p| p.close);
        let domain = ValueDomain::from_values(values)?.padded(DOMAIN_MARGIN);
        Some(CoordinateMapper::new(
            viewport.width,
            self.config.height,
            self.config.padding,
            domain,
            0,
        ))
    }

    fn day_to_x(m: &CoordinateMapper, day: f64) -> f64 {
        m.fraction_to_x(day.min(DAYS_IN_YEAR) / DAYS_IN_YEAR)
    }

    fn draw_axes(&self, m: &CoordinateMapper, out: &mut dyn RendererBackend) {
        let levels = m.domain.levels(4);
        let grid: Vec<_> = levels
            .iter()
            .map(|v| {
                let y = m.value_to_y(*v);
                (m.left, y, m.right(), y)
            })
            .collect();
        out.draw_segments(&grid, &Stroke::solid(theme::GRID, 1.0));

        let values = TextStyle::new(theme::TEXT_MUTED, 10.0).align(TextAlign::Right);
        for v in levels {
            out.draw_text(&fixed(v, 0), m.left - 6.0, m.value_to_y(v) + 4.0, &values);
        }
        let months = TextStyle::new(theme::TEXT_MUTED, 9.0).align(TextAlign::Center);
        for (i, name) in MONTHS.iter().enumerate() {
            let day = i as f64 * 30.4 + 15.0;
            out.draw_text(name, Self::day_to_x(m, day), m.bottom() + 14.0, &months);
        }
    }

    fn draw_legend(&self, entry: &SeasonalEntry, out: &mut dyn RendererBackend) {
        let label = TextStyle::new(theme::TEXT_MUTED, 9.0);
        let mut x = self.config.padding.left;
        for year in &entry.years {
            let kind = YearKind::of(year);
            let (w, h) = match kind {
                YearKind::Past => (14.0, 3.0),
                YearKind::Average => (20.0, 2.0),
                YearKind::Current => (20.0, 3.0),
            };
            out.fill_rect(Rect::new(x, 10.0, w, h), &Fill::new(theme::season_color(year)));
            out.draw_text(year, x + w + 4.0, 14.0, &label);
            x += 60.0;
        }
    }
}

impl ChartRenderer for SeasonalChart {
    type Data = SeasonalEntry;

    fn height(&self) -> f64 {
        self.config.height
    }

    fn render(
        &self,
        entry: &SeasonalEntry,
        viewport: &Viewport,
        _hover: Option<Hover>,
        out: &mut dyn RendererBackend,
    ) {
        let Some(m) = self.mapper(entry, viewport) else {
            return;
        };
        out.begin_frame(viewport, theme::BG);
        self.draw_axes(&m, out);
        for label in draw_order(entry) {
            let Some(series) = entry.series_for(label) else {
                continue;
            };
            let points: Vec<_> = series
                .iter()
                .filter_map(|p| {
                    let close = p.close.filter(|c| c.is_finite())?;
                    Some((Self::day_to_x(&m, f64::from(p.day)), m.value_to_y(close)))
                })
                .collect();
            out.draw_polyline(&points, &year_stroke(label));
        }
        self.draw_legend(entry, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::DisplayList;
    use ts_core::SeasonPoint;

    fn entry(years: &[&str]) -> SeasonalEntry {
        let mut e = SeasonalEntry {
            symbol: "ZC".into(),
            years: years.iter().map(|y| y.to_string()).collect(),
            ..Default::default()
        };
        for (i, y) in years.iter().enumerate() {
            let base = 400.0 + i as f64 * 10.0;
            e.series.insert(
                y.to_string(),
                vec![
                    SeasonPoint::new(1, base),
                    SeasonPoint::new(180, base + 5.0),
                    SeasonPoint::new(366, base - 5.0),
                ],
            );
        }
        e
    }

    #[test]
    fn current_is_drawn_last_and_heaviest() {
        let e = entry(&["current", "2022", "average", "2023"]);
        assert_eq!(draw_order(&e), vec!["2022", "2023", "average", "current"]);

        let mut out = DisplayList::new();
        SeasonalChart::default().render(&e, &Viewport::new(600.0, 320.0), None, &mut out);
        let widths: Vec<f64> = out.polylines().map(|(_, s)| s.width).collect();
        assert_eq!(widths, vec![1.0, 1.0, 2.0, 2.5]);
        let (_, avg) = out.polylines().nth(2).unwrap();
        assert_eq!(avg.dash, Some([6.0, 4.0]));
    }

    #[test]
    fn shorter_current_year_is_drawn_on_top() {
        let mut e = entry(&["2023", "average", "current"]);
        e.series.get_mut("current").unwrap().truncate(2);

        let mut out = DisplayList::new();
        SeasonalChart::default().render(&e, &Viewport::new(600.0, 320.0), None, &mut out);
        let lines: Vec<_> = out.polylines().collect();
        assert_eq!(lines.len(), 3);
        let (points, stroke) = lines[2];
        assert_eq!(points.len(), 2);
        assert_eq!(stroke.color, theme::season_color("current"));
        assert_eq!(stroke.width, 2.5);
    }

    #[test]
    fn missing_series_and_null_closes_are_skipped() {
        let mut e = entry(&["2021", "current"]);
        e.years.push("2020".into());
        e.series.get_mut("2021").unwrap()[1].close = None;

        let mut out = DisplayList::new();
        SeasonalChart::default().render(&e, &Viewport::new(600.0, 320.0), None, &mut out);
        let lines: Vec<_> = out.polylines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0.len(), 2);
        assert!(out.texts().any(|t| t == "2020"));
    }

    #[test]
    fn days_past_year_end_are_clamped() {
        let e = entry(&["current"]);
        let chart = SeasonalChart::default();
        let vp = Viewport::new(600.0, 320.0);
        let mut out = DisplayList::new();
        chart.render(&e, &vp, None, &mut out);
        let (points, _) = out.polylines().next().unwrap();
        let right = vp.width - chart.config.padding.right;
        assert_eq!(points.last().unwrap().0, right);
    }

    #[test]
    fn nothing_to_plot_draws_nothing() {
        let mut out = DisplayList::new();
        SeasonalChart::default().render(
            &SeasonalEntry::default(),
            &Viewport::new(600.0, 320.0),
            None,
            &mut out,
        );
        assert!(out.is_empty());
    }
}
