//! Chart views: data reference, viewport and hover state around a renderer,
//! plus the viewport-resize event source they subscribe to.

use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};
use ts_core::Viewport;

use crate::surface::RendererBackend;

/// Pointer position resolved to a plotted index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hover {
    pub index: usize,
    pub x: f64,
    pub y: f64,
}

/// A chart type: pure rendering of `Data` onto a surface.
pub trait ChartRenderer {
    type Data: ?Sized;

    /// Fixed CSS height of this chart type.
    fn height(&self) -> f64;

    /// Draws one frame. Empty input draws nothing at all.
    fn render(
        &self,
        data: &Self::Data,
        viewport: &Viewport,
        hover: Option<Hover>,
        out: &mut dyn RendererBackend,
    );

    /// Plotted index under `x`, if the chart supports hovering.
    fn hit_test(&self, _data: &Self::Data, _viewport: &Viewport, _x: f64) -> Option<usize> {
        None
    }
}

/// Single-slot hover state owned by one view.
#[derive(Debug, Default)]
pub struct HoverCell {
    slot: Cell<Option<Hover>>,
}

impl HoverCell {
    pub fn get(&self) -> Option<Hover> {
        self.slot.get()
    }

    /// Stores `hover`, returns whether it differs from the previous value.
    pub fn set(&self, hover: Option<Hover>) -> bool {
        self.slot.replace(hover) != hover
    }

    pub fn clear(&self) -> bool {
        self.set(None)
    }
}

pub struct ChartView<C: ChartRenderer> {
    chart: C,
    data: Option<Rc<C::Data>>,
    viewport: Viewport,
    hover: HoverCell,
    dirty: bool,
    frames: u64,
}

impl<C: ChartRenderer> ChartView<C> {
    pub fn new(chart: C, width: f64, pixel_ratio: f64) -> Self {
        let viewport = Viewport::new(width.floor(), chart.height()).with_pixel_ratio(pixel_ratio);
        Self {
            chart,
            data: None,
            viewport,
            hover: HoverCell::default(),
            dirty: true,
            frames: 0,
        }
    }

    pub fn chart(&self) -> &C {
        &self.chart
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn hover(&self) -> Option<Hover> {
        self.hover.get()
    }

    /// Frames drawn so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// New data is detected by reference; the same `Rc` again is a no-op.
    pub fn set_data(&mut self, data: Rc<C::Data>) -> bool {
        if let Some(current) = &self.data {
            if Rc::ptr_eq(current, &data) {
                return false;
            }
        }
        self.data = Some(data);
        self.hover.clear();
        self.dirty = true;
        true
    }

    /// Widths are floored; zero or negative widths are ignored.
    pub fn resize(&mut self, width: f64) -> bool {
        let width = width.floor();
        if !(width > 0.0) || width == self.viewport.width {
            return false;
        }
        debug!(width, "chart resized");
        self.viewport.width = width;
        self.dirty = true;
        true
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) -> bool {
        let index = self
            .data
            .as_deref()
            .and_then(|data| self.chart.hit_test(data, &self.viewport, x));
        let hover = index.map(|index| Hover { index, x, y });
        let changed = self.hover.set(hover);
        if changed {
            trace!(?hover, "hover changed");
            self.dirty = true;
        }
        changed
    }

    pub fn pointer_leave(&mut self) -> bool {
        let changed = self.hover.clear();
        if changed {
            self.dirty = true;
        }
        changed
    }

    pub fn render(&mut self, out: &mut dyn RendererBackend) {
        self.dirty = false;
        if let Some(data) = &self.data {
            self.chart
                .render(data, &self.viewport, self.hover.get(), out);
            self.frames += 1;
        }
    }

    /// Draws only when data, size or hover changed since the last frame.
    pub fn render_if_dirty(&mut self, out: &mut dyn RendererBackend) -> bool {
        if !self.dirty {
            return false;
        }
        self.render(out);
        true
    }
}

// ---------- viewport resize events -------------------------------------------

type ResizeCallback = Box<dyn FnMut(f64)>;

#[derive(Default)]
struct ResizeHub {
    next_id: u32,
    subscribers: Vec<(u32, ResizeCallback)>,
    emit_depth: u32,
    /// Dropped while their callback was taken out for an emit.
    cancelled: Vec<u32>,
}

impl ResizeHub {
    /// Returns the removed callback so it can be dropped outside the borrow.
    fn unsubscribe(&mut self, id: u32) -> Option<ResizeCallback> {
        if let Some(pos) = self.subscribers.iter().position(|(s, _)| *s == id) {
            return Some(self.subscribers.remove(pos).1);
        }
        if self.emit_depth > 0 {
            self.cancelled.push(id);
        }
        None
    }
}

/// "Viewport width changed" event source.
#[derive(Clone, Default)]
pub struct ResizeEvents {
    hub: Rc<RefCell<ResizeHub>>,
}

impl ResizeEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl FnMut(f64) + 'static) -> Subscription {
        let mut hub = self.hub.borrow_mut();
        let id = hub.next_id;
        hub.next_id = hub.next_id.wrapping_add(1);
        hub.subscribers.push((id, Box::new(callback)));
        debug!(id, "resize subscription added");
        Subscription {
            id,
            hub: Rc::downgrade(&self.hub),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.borrow().subscribers.len()
    }

    pub fn emit(&self, width: f64) {
        let mut active = {
            let mut hub = self.hub.borrow_mut();
            hub.emit_depth += 1;
            std::mem::take(&mut hub.subscribers)
        };
        for (id, callback) in active.iter_mut() {
            if self.hub.borrow().cancelled.contains(id) {
                continue;
            }
            callback(width);
        }
        let mut hub = self.hub.borrow_mut();
        hub.emit_depth -= 1;
        let (mut keep, cancelled): (Vec<_>, Vec<_>) = active
            .into_iter()
            .partition(|(id, _)| !hub.cancelled.contains(id));
        // Subscribed while emitting.
        keep.append(&mut hub.subscribers);
        hub.subscribers = keep;
        if hub.emit_depth == 0 {
            hub.cancelled.clear();
        }
        drop(hub);
        drop(cancelled);
    }
}

/// Unsubscribes on drop.
pub struct Subscription {
    id: u32,
    hub: Weak<RefCell<ResizeHub>>,
}

impl Subscription {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let removed = hub.borrow_mut().unsubscribe(self.id);
            drop(removed);
            debug!(id = self.id, "resize subscription released");
        }
    }
}

/// A view bound to its output surface and to a resize source for as long
/// as it lives.
pub struct MountedChart<C, B>
where
    C: ChartRenderer + 'static,
    C::Data: 'static,
    B: RendererBackend + 'static,
{
    view: Rc<RefCell<ChartView<C>>>,
    backend: Rc<RefCell<B>>,
    _resize: Subscription,
}

impl<C, B> MountedChart<C, B>
where
    C: ChartRenderer + 'static,
    C::Data: 'static,
    B: RendererBackend + 'static,
{
    pub fn mount(view: ChartView<C>, backend: B, events: &ResizeEvents) -> Self {
        let view = Rc::new(RefCell::new(view));
        let backend = Rc::new(RefCell::new(backend));
        let weak_view = Rc::downgrade(&view);
        let weak_backend = Rc::downgrade(&backend);
        let subscription = events.subscribe(move |width| {
            let (Some(view), Some(backend)) = (weak_view.upgrade(), weak_backend.upgrade()) else {
                return;
            };
            let mut view = view.borrow_mut();
            if view.resize(width) {
                view.render_if_dirty(&mut *backend.borrow_mut());
            }
        });
        view.borrow_mut().render(&mut *backend.borrow_mut());
        Self {
            view,
            backend,
            _resize: subscription,
        }
    }

    pub fn set_data(&self, data: Rc<C::Data>) {
        let mut view = self.view.borrow_mut();
        if view.set_data(data) {
            view.render_if_dirty(&mut *self.backend.borrow_mut());
        }
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        let mut view = self.view.borrow_mut();
        if view.pointer_move(x, y) {
            view.render_if_dirty(&mut *self.backend.borrow_mut());
        }
    }

    pub fn pointer_leave(&self) {
        let mut view = self.view.borrow_mut();
        if view.pointer_leave() {
            view.render_if_dirty(&mut *self.backend.borrow_mut());
        }
    }

    pub fn view(&self) -> Ref<'_, ChartView<C>> {
        self.view.borrow()
    }

    pub fn backend(&self) -> Ref<'_, B> {
        self.backend.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DisplayList, Fill, Rect};

    /// Draws one bar per value; hit-tests by 10px slots.
    struct Bars;

    impl ChartRenderer for Bars {
        type Data = [f64];

        fn height(&self) -> f64 {
            50.0
        }

        fn render(
            &self,
            data: &[f64],
            viewport: &Viewport,
            hover: Option<Hover>,
            out: &mut dyn RendererBackend,
        ) {
            if data.is_empty() {
                return;
            }
            out.begin_frame(viewport, "#000");
            for (i, v) in data.iter().enumerate() {
                let color = if hover.map(|h| h.index) == Some(i) { "#fff" } else { "#888" };
                out.fill_rect(Rect::new(i as f64 * 10.0, 0.0, 10.0, *v), &Fill::new(color));
            }
        }

        fn hit_test(&self, data: &[f64], _viewport: &Viewport, x: f64) -> Option<usize> {
            let i = (x / 10.0).floor();
            (i >= 0.0 && (i as usize) < data.len()).then_some(i as usize)
        }
    }

    #[test]
    fn hover_cell_reports_changes() {
        let cell = HoverCell::default();
        let h = Hover {
            index: 1,
            x: 0.0,
            y: 0.0,
        };
        assert!(cell.set(Some(h)));
        assert!(!cell.set(Some(h)));
        assert!(cell.clear());
        assert!(!cell.clear());
    }

    #[test]
    fn same_reference_does_not_rerender() {
        let data: Rc<[f64]> = Rc::from(vec![1.0, 2.0]);
        let mut view = ChartView::new(Bars, 100.0, 2.0);
        let mut out = DisplayList::new();
        assert!(view.set_data(Rc::clone(&data)));
        assert!(view.render_if_dirty(&mut out));
        assert!(!view.set_data(Rc::clone(&data)));
        assert!(!view.render_if_dirty(&mut out));
        assert_eq!(view.frames(), 1);

        let copy: Rc<[f64]> = Rc::from(vec![1.0, 2.0]);
        assert!(view.set_data(copy));
        assert!(view.render_if_dirty(&mut out));
        assert_eq!(view.frames(), 2);
    }

    #[test]
    fn hover_outside_data_is_no_hover() {
        let mut view = ChartView::new(Bars, 100.0, 2.0);
        assert!(!view.pointer_move(5.0, 5.0));
        view.set_data(Rc::from(vec![1.0, 2.0]));
        assert!(view.pointer_move(15.0, 5.0));
        assert_eq!(view.hover().map(|h| h.index), Some(1));
        assert!(view.pointer_move(95.0, 5.0));
        assert_eq!(view.hover(), None);
        assert!(view.pointer_move(5.0, 5.0));
        assert!(view.pointer_leave());
        assert_eq!(view.hover(), None);
    }

    #[test]
    fn resize_ignores_zero_and_repeats() {
        let mut view = ChartView::new(Bars, 100.0, 2.0);
        assert!(!view.resize(0.0));
        assert!(!view.resize(100.7));
        assert!(view.resize(320.4));
        assert_eq!(view.viewport().width, 320.0);
        assert_eq!(view.viewport().height, 50.0);
    }

    #[test]
    fn identical_frames_are_identical() {
        let data: Rc<[f64]> = Rc::from(vec![3.0, 1.0, 2.0]);
        let mut view = ChartView::new(Bars, 100.0, 2.0);
        view.set_data(data);
        let (mut a, mut b) = (DisplayList::new(), DisplayList::new());
        view.render(&mut a);
        view.render(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn mounted_chart_follows_resizes_until_dropped() {
        let events = ResizeEvents::new();
        let mounted = MountedChart::mount(ChartView::new(Bars, 100.0, 2.0), DisplayList::new(), &events);
        assert_eq!(events.subscriber_count(), 1);
        // No data yet: nothing drawn.
        assert!(mounted.backend().is_empty());

        mounted.set_data(Rc::from(vec![1.0]));
        assert_eq!(mounted.view().frames(), 1);

        events.emit(250.0);
        assert_eq!(mounted.view().viewport().width, 250.0);
        assert_eq!(mounted.view().frames(), 2);

        events.emit(250.0);
        assert_eq!(mounted.view().frames(), 2);

        mounted.pointer_move(5.0, 1.0);
        assert_eq!(mounted.view().frames(), 3);
        mounted.pointer_leave();
        assert_eq!(mounted.view().frames(), 4);

        drop(mounted);
        assert_eq!(events.subscriber_count(), 0);
        events.emit(300.0);
    }

    #[test]
    fn dropped_subscription_never_fires_even_mid_emit() {
        let events = ResizeEvents::new();
        let fired = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let killer = {
            let victim = Rc::clone(&victim);
            events.subscribe(move |_| {
                victim.borrow_mut().take();
            })
        };
        let counter = Rc::clone(&fired);
        *victim.borrow_mut() = Some(events.subscribe(move |_| counter.set(counter.get() + 1)));

        events.emit(100.0);
        assert_eq!(fired.get(), 0);
        assert_eq!(events.subscriber_count(), 1);

        drop(killer);
        assert_eq!(events.subscriber_count(), 0);
    }

    #[test]
    fn subscribing_during_emit_is_kept() {
        let events = ResizeEvents::new();
        let late: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));
        let _first = {
            let events = events.clone();
            let late = Rc::clone(&late);
            events.clone().subscribe(move |_| {
                if late.borrow().is_empty() {
                    late.borrow_mut().push(events.subscribe(|_| {}));
                }
            })
        };
        events.emit(10.0);
        assert_eq!(events.subscriber_count(), 2);
    }
}
