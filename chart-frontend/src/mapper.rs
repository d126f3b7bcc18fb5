//! Value/index <-> pixel transforms shared by all charts.

use serde::{Deserialize, Serialize};

/// Fraction of the data range added above and below a value domain.
pub const DOMAIN_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Padding {
    pub const fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub const fn uniform(v: f64) -> Self {
        Self::new(v, v, v, v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueDomain {
    pub min: f64,
    pub max: f64,
}

impl ValueDomain {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Extremes over the finite values, `None` when there are none.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<Self>, v| match acc {
                None => Some(Self::new(v, v)),
                Some(d) => Some(Self::new(d.min.min(v), d.max.max(v))),
            })
    }

    /// `max - min`, or 1 for an empty or degenerate domain.
    pub fn span(&self) -> f64 {
        let s = self.max - self.min;
        if s > 0.0 && s.is_finite() {
            s
        } else {
            1.0
        }
    }

    pub fn padded(&self, margin: f64) -> Self {
        let pad = self.span() * margin;
        Self::new(self.min - pad, self.max + pad)
    }

    /// Strictly inside, endpoints excluded.
    pub fn straddles(&self, v: f64) -> bool {
        self.min < v && v < self.max
    }

    pub fn clamp(&self, v: f64) -> f64 {
        v.max(self.min).min(self.max)
    }

    /// `divisions + 1` evenly spaced levels from `max` down to `min`.
    pub fn levels(&self, divisions: usize) -> Vec<f64> {
        let divisions = divisions.max(1);
        let step = (self.max - self.min) / divisions as f64;
        (0..=divisions).map(|i| self.max - step * i as f64).collect()
    }
}

/// Pure mapping between data space and one rectangular plot band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    pub left: f64,
    pub top: f64,
    pub plot_width: f64,
    pub plot_height: f64,
    pub domain: ValueDomain,
    /// Number of evenly spaced index slots.
    pub count: usize,
}

impl CoordinateMapper {
    /// Plot band of a `width` x `height` panel inset by `padding`.
    pub fn new(
        width: f64,
        height: f64,
        padding: Padding,
        domain: ValueDomain,
        count: usize,
    ) -> Self {
        Self {
            left: padding.left,
            top: padding.top,
            plot_width: (width - padding.left - padding.right).max(0.0),
            plot_height: (height - padding.top - padding.bottom).max(0.0),
            domain,
            count,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn right(&self) -> f64 {
        self.left + self.plot_width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.plot_height
    }

    /// Larger values map to smaller y.
    pub fn value_to_y(&self, v: f64) -> f64 {
        let d = &self.domain;
        self.top + (1.0 - (v - d.min) / d.span()) * self.plot_height
    }

    pub fn y_to_value(&self, y: f64) -> f64 {
        let d = &self.domain;
        if self.plot_height <= 0.0 {
            return d.min;
        }
        d.min + (1.0 - (y - self.top) / self.plot_height) * d.span()
    }

    /// Horizontal room per index.
    pub fn slot_width(&self) -> f64 {
        if self.count == 0 {
            self.plot_width
        } else {
            self.plot_width / self.count as f64
        }
    }

    /// Centre of slot `i`; the half-slot offset keeps the ends unclipped.
    pub fn index_to_x(&self, i: usize) -> f64 {
        self.left + (i as f64 + 0.5) * self.slot_width()
    }

    /// Slot under `x` by floor division, `None` outside the plotted range.
    pub fn x_to_index(&self, x: f64) -> Option<usize> {
        let slot = self.slot_width();
        if self.count == 0 || slot <= 0.0 {
            return None;
        }
        let rel = (x - self.left) / slot;
        if !rel.is_finite() || rel < 0.0 {
            return None;
        }
        let i = rel.floor() as usize;
        (i < self.count).then_some(i)
    }

    /// First point on the left edge, last on the right edge.
    pub fn edge_index_to_x(&self, i: usize) -> f64 {
        if self.count <= 1 {
            self.left + self.plot_width / 2.0
        } else {
            self.left + i as f64 * self.plot_width / (self.count - 1) as f64
        }
    }

    /// `f` in `[0, 1]` across the plot width.
    pub fn fraction_to_x(&self, f: f64) -> f64 {
        self.left + f * self.plot_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapper(min: f64, max: f64, count: usize) -> CoordinateMapper {
        CoordinateMapper::new(
            200.0,
            120.0,
            Padding::new(10.0, 10.0, 10.0, 40.0),
            ValueDomain::new(min, max),
            count,
        )
    }

    #[test]
    fn domain_from_values_skips_nan() {
        let d = ValueDomain::from_values([3.0, f64::NAN, -1.0, 7.0]).unwrap();
        assert_eq!(d, ValueDomain::new(-1.0, 7.0));
        assert!(ValueDomain::from_values([f64::NAN]).is_none());
        assert!(ValueDomain::from_values(Vec::<f64>::new()).is_none());
    }

    #[test]
    fn padding_adds_five_percent() {
        let d = ValueDomain::new(100.0, 200.0).padded(DOMAIN_MARGIN);
        assert_eq!(d, ValueDomain::new(95.0, 205.0));
    }

    #[test]
    fn degenerate_domain_uses_unit_width() {
        let d = ValueDomain::new(5.0, 5.0);
        assert_eq!(d.span(), 1.0);
        let padded = d.padded(DOMAIN_MARGIN);
        assert!((padded.max - padded.min - 0.1).abs() < 1e-12);

        let m = mapper(5.0, 5.0, 1);
        assert!(m.value_to_y(5.0).is_finite());
    }

    #[test]
    fn value_axis_endpoints() {
        let m = mapper(0.0, 10.0, 4);
        assert_eq!(m.value_to_y(10.0), 10.0);
        assert_eq!(m.value_to_y(0.0), 110.0);
        assert_eq!(m.bottom(), 110.0);
    }

    #[test]
    fn index_axis_and_hit_testing() {
        let m = mapper(0.0, 1.0, 4);
        // plot width 150, slot 37.5
        assert_eq!(m.index_to_x(0), 40.0 + 18.75);
        assert_eq!(m.x_to_index(40.0), Some(0));
        assert_eq!(m.x_to_index(40.0 + 37.5 * 3.99), Some(3));
        assert_eq!(m.x_to_index(39.9), None);
        assert_eq!(m.x_to_index(190.0), None);
        assert_eq!(mapper(0.0, 1.0, 0).x_to_index(50.0), None);
    }

    #[test]
    fn edge_mapping_handles_single_point() {
        let m = mapper(0.0, 1.0, 1);
        assert_eq!(m.edge_index_to_x(0), 40.0 + 75.0);
        let m = m.with_count(3);
        assert_eq!(m.edge_index_to_x(0), 40.0);
        assert_eq!(m.edge_index_to_x(2), 190.0);
    }

    #[test]
    fn levels_run_top_down() {
        assert_eq!(
            ValueDomain::new(0.0, 8.0).levels(4),
            vec![8.0, 6.0, 4.0, 2.0, 0.0]
        );
    }

    proptest! {
        #[test]
        fn y_round_trips(min in -1e6f64..1e6, width in 1e-3f64..1e6, t in 0.0f64..=1.0) {
            let m = mapper(min, min + width, 10);
            let v = min + t * width;
            let back = m.y_to_value(m.value_to_y(v));
            prop_assert!((back - v).abs() <= 1e-6 * (1.0 + v.abs().max(width)));
        }

        #[test]
        fn value_to_y_is_decreasing(min in -1e3f64..1e3, width in 1e-2f64..1e3, a in 0.0f64..1.0, b in 0.0f64..1.0) {
            prop_assume!(b - a > 1e-6);
            let m = mapper(min, min + width, 10);
            prop_assert!(m.value_to_y(min + a * width) > m.value_to_y(min + b * width));
        }

        #[test]
        fn hit_test_inverts_centres(count in 1usize..300) {
            let m = mapper(0.0, 1.0, count);
            for i in 0..count {
                prop_assert_eq!(m.x_to_index(m.index_to_x(i)), Some(i));
            }
        }
    }
}
