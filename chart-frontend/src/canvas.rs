//! Browser canvas backend and container-width observation.

use js_sys::Array;
use tracing::warn;
use ts_core::Viewport;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    CanvasRenderingContext2d, Element, HtmlCanvasElement, ResizeObserver, ResizeObserverEntry,
};

use crate::surface::{Fill, Rect, RendererBackend, Stroke, TextStyle};
use crate::view::ResizeEvents;

pub struct CanvasBackend {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

impl CanvasBackend {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, JsValue> {
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("no 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        Ok(Self { canvas, ctx })
    }

    fn apply_stroke(&self, stroke: &Stroke) {
        self.ctx.set_stroke_style_str(&stroke.color);
        self.ctx.set_line_width(stroke.width);
        self.ctx.set_global_alpha(stroke.alpha);
        let dash = match stroke.dash {
            Some([on, off]) => Array::of2(&JsValue::from_f64(on), &JsValue::from_f64(off)),
            None => Array::new(),
        };
        if let Err(err) = self.ctx.set_line_dash(&dash) {
            warn!(?err, "set_line_dash failed");
        }
    }

    fn reset_state(&self) {
        self.ctx.set_global_alpha(1.0);
        let _ = self.ctx.set_line_dash(&Array::new());
    }

    fn trace_path(&self, points: &[(f64, f64)]) {
        self.ctx.begin_path();
        let mut iter = points.iter();
        if let Some(&(x, y)) = iter.next() {
            self.ctx.move_to(x, y);
        }
        for &(x, y) in iter {
            self.ctx.line_to(x, y);
        }
    }
}

impl RendererBackend for CanvasBackend {
    fn begin_frame(&mut self, viewport: &Viewport, clear_color: &str) {
        let (w, h) = viewport.backing_size();
        self.canvas.set_width(w);
        self.canvas.set_height(h);
        let style = self.canvas.style();
        let _ = style.set_property("width", &format!("{}px", viewport.width));
        let _ = style.set_property("height", &format!("{}px", viewport.height));
        // Resizing the backing store resets the context state.
        let ratio = viewport.pixel_ratio;
        if let Err(err) = self.ctx.set_transform(ratio, 0.0, 0.0, ratio, 0.0, 0.0) {
            warn!(?err, "set_transform failed");
        }
        self.ctx.clear_rect(0.0, 0.0, viewport.width, viewport.height);
        if clear_color != "transparent" {
            self.ctx.set_fill_style_str(clear_color);
            self.ctx.fill_rect(0.0, 0.0, viewport.width, viewport.height);
        }
    }

    fn draw_segments(&mut self, segments: &[(f64, f64, f64, f64)], stroke: &Stroke) {
        if segments.is_empty() {
            return;
        }
        self.apply_stroke(stroke);
        self.ctx.begin_path();
        for &(x0, y0, x1, y1) in segments {
            self.ctx.move_to(x0, y0);
            self.ctx.line_to(x1, y1);
        }
        self.ctx.stroke();
        self.reset_state();
    }

    fn draw_polyline(&mut self, points: &[(f64, f64)], stroke: &Stroke) {
        if points.len() < 2 {
            return;
        }
        self.apply_stroke(stroke);
        self.trace_path(points);
        self.ctx.stroke();
        self.reset_state();
    }

    fn fill_path(&mut self, points: &[(f64, f64)], fill: &Fill) {
        if points.len() < 3 {
            return;
        }
        self.ctx.set_fill_style_str(&fill.color);
        self.ctx.set_global_alpha(fill.alpha);
        self.trace_path(points);
        self.ctx.close_path();
        self.ctx.fill();
        self.reset_state();
    }

    fn fill_rect(&mut self, rect: Rect, fill: &Fill) {
        self.ctx.set_fill_style_str(&fill.color);
        self.ctx.set_global_alpha(fill.alpha);
        self.ctx.fill_rect(rect.x, rect.y, rect.w, rect.h);
        self.reset_state();
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke) {
        self.apply_stroke(stroke);
        self.ctx.stroke_rect(rect.x, rect.y, rect.w, rect.h);
        self.reset_state();
    }

    fn draw_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle) {
        self.ctx.set_fill_style_str(&style.color);
        self.ctx.set_font(&style.font());
        self.ctx.set_text_align(style.align.as_str());
        let _ = self.ctx.fill_text(text, x, y);
    }
}

/// Keeps a `ResizeObserver` alive; disconnects on drop.
pub struct WidthObserver {
    observer: ResizeObserver,
    _callback: Closure<dyn FnMut(Array)>,
}

impl Drop for WidthObserver {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

/// Emits the floored content width of `element` on `events` whenever it
/// changes to a positive value.
pub fn observe_element_width(
    element: &Element,
    events: ResizeEvents,
) -> Result<WidthObserver, JsValue> {
    let callback = Closure::<dyn FnMut(Array)>::new(move |entries: Array| {
        let Ok(entry) = entries.get(0).dyn_into::<ResizeObserverEntry>() else {
            return;
        };
        let width = entry.content_rect().width();
        if width > 0.0 {
            events.emit(width.floor());
        }
    });
    let observer = ResizeObserver::new(callback.as_ref().unchecked_ref())?;
    observer.observe(element);
    Ok(WidthObserver {
        observer,
        _callback: callback,
    })
}
