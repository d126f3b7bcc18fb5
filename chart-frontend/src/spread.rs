//! Fixed-size sparkline for one spread's history.

use ts_core::{SpreadInfo, SpreadRegime, Viewport};

use crate::config::SpreadChartConfig;
use crate::mapper::{CoordinateMapper, Padding, ValueDomain};
use crate::surface::{circle_path, Fill, RendererBackend, Stroke, TextAlign, TextStyle};
use crate::theme;
use crate::view::{ChartRenderer, Hover};

const RISING: &str = "#10b981";

pub fn regime_color(regime: SpreadRegime) -> &'static str {
    match regime {
        SpreadRegime::Extreme => theme::RED,
        SpreadRegime::Normal => theme::BLUE,
        _ => theme::AMBER,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpreadChart {
    config: SpreadChartConfig,
}

impl SpreadChart {
    pub fn new(config: SpreadChartConfig) -> Self {
        Self { config }
    }

    /// The sparkline ignores the container width.
    pub fn viewport(&self, pixel_ratio: f64) -> Viewport {
        Viewport::new(self.config.width, self.config.height).with_pixel_ratio(pixel_ratio)
    }
}

impl ChartRenderer for SpreadChart {
    type Data = SpreadInfo;

    fn height(&self) -> f64 {
        self.config.height
    }

    fn render(
        &self,
        spread: &SpreadInfo,
        viewport: &Viewport,
        _hover: Option<Hover>,
        out: &mut dyn RendererBackend,
    ) {
        let values: Vec<f64> = spread
            .history
            .iter()
            .filter_map(|p| p.value)
            .filter(|v| v.is_finite())
            .collect();
        let Some(domain) = ValueDomain::from_values(values.iter().copied()) else {
            return;
        };
        let vp = self.viewport(viewport.pixel_ratio);
        let m = CoordinateMapper::new(
            vp.width,
            vp.height,
            Padding::uniform(self.config.inset),
            domain,
            values.len(),
        );
        let color = regime_color(spread.regime);
        let points: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (m.edge_index_to_x(i), m.value_to_y(*v)))
            .collect();

        out.begin_frame(&vp, "transparent");
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            let mut area = points.clone();
            area.push((last.0, vp.height));
            area.push((first.0, vp.height));
            out.fill_path(&area, &Fill::new(theme::tint(color, 0.19)));
            out.draw_polyline(&points, &Stroke::solid(color, 2.0));
            out.fill_path(&circle_path(last.0, last.1, 4.0), &Fill::new(color));
        }

        if let (Some(first), Some(last)) = (values.first(), values.last()) {
            let (arrow, arrow_color) = if last > first {
                ("\u{25B2}", RISING)
            } else {
                ("\u{25BC}", theme::RED)
            };
            out.draw_text(
                arrow,
                vp.width - 2.0,
                14.0,
                &TextStyle::new(arrow_color, 14.0).bold().align(TextAlign::Right),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DisplayList, DrawCommand};
    use ts_core::SpreadPoint;

    fn spread(values: &[Option<f64>], regime: SpreadRegime) -> SpreadInfo {
        SpreadInfo {
            name: "Soy crush".into(),
            regime,
            history: values
                .iter()
                .enumerate()
                .map(|(i, v)| SpreadPoint {
                    date: format!("2024-03-{:02}", i + 1),
                    value: *v,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn rising_extreme_spread() {
        let s = spread(&[Some(1.0), None, Some(3.0), Some(2.0)], SpreadRegime::Extreme);
        let mut out = DisplayList::new();
        SpreadChart::default().render(&s, &Viewport::new(900.0, 400.0), None, &mut out);

        assert!(matches!(
            &out.commands()[0],
            DrawCommand::BeginFrame { width, height, .. } if *width == 230.0 && *height == 60.0
        ));
        let (points, stroke) = out.polylines().next().unwrap();
        assert_eq!(stroke.color, theme::RED);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].0, 5.0);
        assert_eq!(points[2].0, 225.0);
        // Max value on the top inset.
        assert_eq!(points[1].1, 5.0);
        assert_eq!(out.texts().collect::<Vec<_>>(), vec!["\u{25B2}"]);
    }

    #[test]
    fn single_point_is_centred() {
        let s = spread(&[Some(7.0)], SpreadRegime::Compression);
        let mut out = DisplayList::new();
        SpreadChart::default().render(&s, &Viewport::new(230.0, 60.0), None, &mut out);
        // A lone point has no line, only the end dot and a falling arrow.
        assert_eq!(out.polylines().count(), 0);
        assert_eq!(out.texts().collect::<Vec<_>>(), vec!["\u{25BC}"]);
    }

    #[test]
    fn colours_by_regime() {
        assert_eq!(regime_color(SpreadRegime::Normal), theme::BLUE);
        assert_eq!(regime_color(SpreadRegime::Dissonance), theme::AMBER);
        assert_eq!(regime_color(SpreadRegime::Unknown), theme::AMBER);
    }

    #[test]
    fn empty_history_draws_nothing() {
        let mut out = DisplayList::new();
        SpreadChart::default().render(
            &spread(&[None], SpreadRegime::Normal),
            &Viewport::new(230.0, 60.0),
            None,
            &mut out,
        );
        assert!(out.is_empty());
    }
}
