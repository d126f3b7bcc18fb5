//! Canvas charts for the commodity dashboard.
//!
//! Every chart is a pure [`ChartRenderer`] drawing onto a [`RendererBackend`]:
//! the browser canvas on wasm32, or a [`DisplayList`] recorder anywhere else.
//! [`ChartView`] owns the data reference, viewport and hover state around a
//! renderer and redraws only when one of them changes.

pub mod compare;
pub mod config;
pub mod cot;
pub mod format;
pub mod mapper;
pub mod price;
pub mod seasonal;
pub mod spread;
pub mod surface;
pub mod theme;
pub mod view;

#[cfg(target_arch = "wasm32")]
pub mod canvas;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use compare::{CompareChart, Comparison};
pub use config::{ChartKind, ChartSettings, ConfigError};
pub use cot::CotChart;
pub use mapper::{CoordinateMapper, Padding, ValueDomain};
pub use price::PriceChart;
pub use seasonal::SeasonalChart;
pub use spread::SpreadChart;
pub use surface::{DisplayList, DrawCommand, RendererBackend};
pub use view::{ChartRenderer, ChartView, Hover, HoverCell, MountedChart, ResizeEvents, Subscription};

#[cfg(target_arch = "wasm32")]
pub use web::DashboardChart;
