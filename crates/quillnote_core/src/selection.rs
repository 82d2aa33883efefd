//! Context-gesture selection tracking.
//!
//! # Responsibility
//! - Turn context gestures (right-click/long-press) into selection snapshots.
//! - Scope each tracker's registration to the lifetime of its editing surface.
//!
//! # Invariants
//! - Each gesture fully replaces the previous snapshot; there is no debouncing.
//! - A tracker receives gestures only while its `MountedTracker` guard lives.
//! - Single-threaded: the hub and trackers are `Rc`-based and never cross threads.

use log::debug;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Screen coordinates of the gesture that captured a selection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub text: String,
    pub anchor: ScreenPoint,
}

/// A context-invoking pointer gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextGesture {
    pub x: f64,
    pub y: f64,
}

/// Whether the platform context menu should still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultMenu {
    Suppress,
    Allow,
}

/// Platform text selection, read at gesture time.
pub trait SelectionSource {
    fn selected_text(&self) -> Option<String>;
}

/// Holds the latest selection snapshot of one editing surface.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    snapshot: RefCell<Option<SelectionSnapshot>>,
}

impl SelectionTracker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn snapshot(&self) -> Option<SelectionSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Explicit dismissal, e.g. click-away or a finished assist action.
    pub fn clear_selection(&self) {
        self.snapshot.replace(None);
    }

    fn handle(&self, text: Option<&str>, gesture: ContextGesture) -> DefaultMenu {
        match text.filter(|text| !text.is_empty()) {
            Some(text) => {
                self.snapshot.replace(Some(SelectionSnapshot {
                    text: text.to_string(),
                    anchor: ScreenPoint {
                        x: gesture.x,
                        y: gesture.y,
                    },
                }));
                DefaultMenu::Suppress
            }
            None => {
                self.clear_selection();
                DefaultMenu::Allow
            }
        }
    }
}

struct HubInner {
    source: Box<dyn SelectionSource>,
    trackers: RefCell<Vec<(u64, Weak<SelectionTracker>)>>,
    next_id: Cell<u64>,
}

/// Process-wide context-gesture observer.
pub struct ContextMenuHub {
    inner: Rc<HubInner>,
}

impl ContextMenuHub {
    pub fn new(source: Box<dyn SelectionSource>) -> Self {
        Self {
            inner: Rc::new(HubInner {
                source,
                trackers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Registers `tracker` until the returned guard is dropped.
    pub fn mount(&self, tracker: &Rc<SelectionTracker>) -> MountedTracker {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .trackers
            .borrow_mut()
            .push((id, Rc::downgrade(tracker)));
        debug!("event=selection_mount module=selection status=ok listener_id={id}");
        MountedTracker {
            hub: Rc::downgrade(&self.inner),
            id,
            tracker: Rc::clone(tracker),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.trackers.borrow().len()
    }

    /// Delivers a gesture to every mounted tracker.
    pub fn dispatch(&self, gesture: ContextGesture) -> DefaultMenu {
        let text = self.inner.source.selected_text();
        let trackers: Vec<Rc<SelectionTracker>> = {
            let mut registry = self.inner.trackers.borrow_mut();
            registry.retain(|(_, tracker)| tracker.strong_count() > 0);
            registry
                .iter()
                .filter_map(|(_, tracker)| tracker.upgrade())
                .collect()
        };

        let mut outcome = DefaultMenu::Allow;
        for tracker in trackers {
            if tracker.handle(text.as_deref(), gesture) == DefaultMenu::Suppress {
                outcome = DefaultMenu::Suppress;
            }
        }
        outcome
    }
}

/// Registration guard; dropping it deregisters the tracker.
pub struct MountedTracker {
    hub: Weak<HubInner>,
    id: u64,
    tracker: Rc<SelectionTracker>,
}

impl MountedTracker {
    pub fn tracker(&self) -> &SelectionTracker {
        &self.tracker
    }
}

impl Drop for MountedTracker {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.trackers
                .borrow_mut()
                .retain(|(id, _)| *id != self.id);
            debug!(
                "event=selection_unmount module=selection status=ok listener_id={}",
                self.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ContextGesture, ContextMenuHub, DefaultMenu, ScreenPoint, SelectionSource,
        SelectionTracker,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct FakeSelection(Rc<RefCell<Option<String>>>);

    impl SelectionSource for FakeSelection {
        fn selected_text(&self) -> Option<String> {
            self.0.borrow().clone()
        }
    }

    fn gesture(x: f64, y: f64) -> ContextGesture {
        ContextGesture { x, y }
    }

    #[test]
    fn captures_selection_and_suppresses_menu() {
        let selection = FakeSelection::default();
        let hub = ContextMenuHub::new(Box::new(selection.clone()));
        let tracker = SelectionTracker::new();
        let mounted = hub.mount(&tracker);

        selection.0.replace(Some("it was good".to_string()));
        assert_eq!(hub.dispatch(gesture(12.0, 34.0)), DefaultMenu::Suppress);
        let snapshot = mounted.tracker().snapshot().expect("snapshot");
        assert_eq!(snapshot.text, "it was good");
        assert_eq!(snapshot.anchor, ScreenPoint { x: 12.0, y: 34.0 });

        selection.0.replace(None);
        assert_eq!(hub.dispatch(gesture(1.0, 1.0)), DefaultMenu::Allow);
        assert!(tracker.snapshot().is_none());
    }

    #[test]
    fn clear_selection_drops_snapshot() {
        let selection = FakeSelection(Rc::new(RefCell::new(Some("x".to_string()))));
        let hub = ContextMenuHub::new(Box::new(selection));
        let tracker = SelectionTracker::new();
        let _mounted = hub.mount(&tracker);
        hub.dispatch(gesture(0.0, 0.0));
        tracker.clear_selection();
        assert!(tracker.snapshot().is_none());
    }

    #[test]
    fn unmounted_tracker_stops_receiving_gestures() {
        let selection = FakeSelection(Rc::new(RefCell::new(Some("x".to_string()))));
        let hub = ContextMenuHub::new(Box::new(selection));
        let tracker = SelectionTracker::new();
        let mounted = hub.mount(&tracker);
        assert_eq!(hub.listener_count(), 1);
        drop(mounted);
        assert_eq!(hub.listener_count(), 0);

        assert_eq!(hub.dispatch(gesture(0.0, 0.0)), DefaultMenu::Allow);
        assert!(tracker.snapshot().is_none());
    }
}
