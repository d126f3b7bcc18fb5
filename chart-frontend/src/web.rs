//! JS-facing chart handle: one canvas, one chart kind, fed with the
//! dashboard's JSON payloads.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use data_feed::{
    decode_cot, decode_prices, decode_seasonality, decode_spreads, DashboardStore, DataEvent,
    DataSink,
};
use tracing::debug;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, MouseEvent};

use crate::canvas::{observe_element_width, CanvasBackend, WidthObserver};
use crate::compare::{CompareChart, Comparison};
use crate::config::{ChartKind, ChartSettings};
use crate::cot::CotChart;
use crate::price::PriceChart;
use crate::seasonal::SeasonalChart;
use crate::spread::SpreadChart;
use crate::view::{ChartView, MountedChart, ResizeEvents};

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

enum Mounted {
    Price(MountedChart<PriceChart, CanvasBackend>),
    Seasonal(MountedChart<SeasonalChart, CanvasBackend>),
    Compare(MountedChart<CompareChart, CanvasBackend>),
    Cot(MountedChart<CotChart, CanvasBackend>),
    Spread(MountedChart<SpreadChart, CanvasBackend>),
}

impl Mounted {
    fn mount(
        kind: ChartKind,
        settings: &ChartSettings,
        width: f64,
        backend: CanvasBackend,
        events: &ResizeEvents,
    ) -> Self {
        let ratio = settings.pixel_ratio;
        match kind {
            ChartKind::Price => Mounted::Price(MountedChart::mount(
                ChartView::new(PriceChart::new(settings.price.clone()), width, ratio),
                backend,
                events,
            )),
            ChartKind::Seasonal => Mounted::Seasonal(MountedChart::mount(
                ChartView::new(SeasonalChart::new(settings.seasonal.clone()), width, ratio),
                backend,
                events,
            )),
            ChartKind::Compare => Mounted::Compare(MountedChart::mount(
                ChartView::new(CompareChart::new(settings.compare.clone()), width, ratio),
                backend,
                events,
            )),
            ChartKind::Cot => Mounted::Cot(MountedChart::mount(
                ChartView::new(CotChart::new(settings.cot.clone()), width, ratio),
                backend,
                events,
            )),
            ChartKind::Spread => Mounted::Spread(MountedChart::mount(
                ChartView::new(SpreadChart::new(settings.spread.clone()), width, ratio),
                backend,
                events,
            )),
        }
    }

    fn pointer_move(&self, x: f64, y: f64) {
        match self {
            Mounted::Price(c) => c.pointer_move(x, y),
            Mounted::Seasonal(c) => c.pointer_move(x, y),
            Mounted::Compare(c) => c.pointer_move(x, y),
            Mounted::Cot(c) => c.pointer_move(x, y),
            Mounted::Spread(c) => c.pointer_move(x, y),
        }
    }

    fn pointer_leave(&self) {
        match self {
            Mounted::Price(c) => c.pointer_leave(),
            Mounted::Seasonal(c) => c.pointer_leave(),
            Mounted::Compare(c) => c.pointer_leave(),
            Mounted::Cot(c) => c.pointer_leave(),
            Mounted::Spread(c) => c.pointer_leave(),
        }
    }
}

struct HandleInner {
    store: DashboardStore,
    chart: Mounted,
    /// Symbol for price/seasonal/COT charts, spread key for sparklines.
    key: String,
    selection: Vec<String>,
}

impl HandleInner {
    /// Hands the current store payload for this chart to its view.
    fn refresh(&self) {
        match &self.chart {
            Mounted::Price(c) => {
                if let Some(bars) = self.store.bars(&self.key) {
                    c.set_data(bars);
                }
            }
            Mounted::Seasonal(c) => {
                if let Some(entry) = self.store.seasonal(&self.key) {
                    c.set_data(entry);
                }
            }
            Mounted::Compare(c) => {
                c.set_data(Rc::new(Comparison::new(
                    self.selection.clone(),
                    self.store.prices(),
                )));
            }
            Mounted::Cot(c) => {
                let report = c.view().chart().report();
                if let Some(history) = self.store.cot_history(&self.key, report) {
                    c.set_data(history);
                }
            }
            Mounted::Spread(c) => {
                if let Some(spread) = self.store.spread(&self.key) {
                    c.set_data(spread);
                }
            }
        }
    }

    fn apply(&mut self, event: DataEvent) {
        self.store.on_event(event);
        self.refresh();
    }
}

type MouseListener = Closure<dyn FnMut(MouseEvent)>;

/// Public chart handle for JS.
#[wasm_bindgen]
pub struct DashboardChart {
    inner: Rc<RefCell<HandleInner>>,
    canvas: HtmlCanvasElement,
    observer: Option<WidthObserver>,
    listeners: Vec<(&'static str, MouseListener)>,
}

#[wasm_bindgen]
impl DashboardChart {
    /// `kind` is one of `price`, `seasonal`, `compare`, `cot`, `spread`;
    /// `settings_json` may be `{}`.
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: &str, kind: &str, settings_json: &str) -> Result<DashboardChart, JsValue> {
        let kind: ChartKind = kind.parse().map_err(js_err)?;
        let settings = ChartSettings::from_json(settings_json).map_err(js_err)?;

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let canvas = document
            .get_element_by_id(canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas not found"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;
        let container = canvas.parent_element().unwrap_or_else(|| canvas.clone().into());
        let width = f64::from(container.client_width());

        let events = ResizeEvents::new();
        let backend = CanvasBackend::new(canvas.clone())?;
        let chart = Mounted::mount(kind, &settings, width, backend, &events);
        let inner = Rc::new(RefCell::new(HandleInner {
            store: DashboardStore::new(),
            chart,
            key: String::new(),
            selection: Vec::new(),
        }));
        let observer = observe_element_width(&container, events)?;
        debug!(?kind, width, "dashboard chart mounted");

        let mut handle = DashboardChart {
            inner,
            canvas,
            observer: Some(observer),
            listeners: Vec::new(),
        };
        handle.attach_pointer()?;
        Ok(handle)
    }

    /// Symbol (or spread key) this chart shows.
    pub fn set_symbol(&self, key: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.key = key.to_string();
        inner.refresh();
    }

    /// Symbols for the comparison chart, in selection order.
    pub fn set_selection(&self, symbols: Vec<String>) {
        let mut inner = self.inner.borrow_mut();
        inner.selection = symbols;
        inner.refresh();
    }

    pub fn load_prices(&self, json: &str) -> Result<(), JsValue> {
        let prices = decode_prices(json).map_err(js_err)?;
        self.inner.borrow_mut().apply(DataEvent::Prices(prices));
        Ok(())
    }

    pub fn load_seasonality(&self, json: &str) -> Result<(), JsValue> {
        let data = decode_seasonality(json).map_err(js_err)?;
        self.inner.borrow_mut().apply(DataEvent::Seasonality(data));
        Ok(())
    }

    pub fn load_cot(&self, json: &str) -> Result<(), JsValue> {
        let data = decode_cot(json).map_err(js_err)?;
        self.inner.borrow_mut().apply(DataEvent::Cot(data));
        Ok(())
    }

    pub fn load_spreads(&self, json: &str) -> Result<(), JsValue> {
        let data = decode_spreads(json).map_err(js_err)?;
        self.inner.borrow_mut().apply(DataEvent::Spreads(data));
        Ok(())
    }

    /// Stops resize observation and pointer tracking.
    pub fn destroy(&mut self) {
        self.detach();
    }
}

impl DashboardChart {
    fn attach_pointer(&mut self) -> Result<(), JsValue> {
        let weak: Weak<RefCell<HandleInner>> = Rc::downgrade(&self.inner);
        let canvas = self.canvas.clone();
        let on_move = Closure::<dyn FnMut(MouseEvent)>::wrap(Box::new(move |event: MouseEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let rect = canvas.get_bounding_client_rect();
            let x = f64::from(event.client_x()) - rect.left();
            let y = f64::from(event.client_y()) - rect.top();
            inner.borrow().chart.pointer_move(x, y);
        }));

        let weak: Weak<RefCell<HandleInner>> = Rc::downgrade(&self.inner);
        let on_leave = Closure::<dyn FnMut(MouseEvent)>::wrap(Box::new(move |_: MouseEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.borrow().chart.pointer_leave();
            }
        }));

        for (name, listener) in [("mousemove", on_move), ("mouseleave", on_leave)] {
            self.canvas
                .add_event_listener_with_callback(name, listener.as_ref().unchecked_ref())?;
            self.listeners.push((name, listener));
        }
        Ok(())
    }

    fn detach(&mut self) {
        self.observer.take();
        for (name, listener) in self.listeners.drain(..) {
            let _ = self
                .canvas
                .remove_event_listener_with_callback(name, listener.as_ref().unchecked_ref());
        }
    }
}

impl Drop for DashboardChart {
    fn drop(&mut self) {
        self.detach();
    }
}
