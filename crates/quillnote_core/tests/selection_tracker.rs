use quillnote_core::selection::{
    ContextGesture, ContextMenuHub, DefaultMenu, SelectionSource, SelectionTracker,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Platform selection the test can change between gestures.
#[derive(Clone, Default)]
struct SharedSelection(Rc<RefCell<Option<String>>>);

impl SharedSelection {
    fn select(&self, text: &str) {
        self.0.replace(Some(text.to_string()));
    }

    fn clear(&self) {
        self.0.replace(None);
    }
}

impl SelectionSource for SharedSelection {
    fn selected_text(&self) -> Option<String> {
        self.0.borrow().clone()
    }
}

#[test]
fn each_gesture_replaces_the_previous_snapshot() {
    let platform = SharedSelection::default();
    let hub = ContextMenuHub::new(Box::new(platform.clone()));
    let tracker = SelectionTracker::new();
    let _mounted = hub.mount(&tracker);

    platform.select("first words");
    assert_eq!(
        hub.dispatch(ContextGesture { x: 10.0, y: 20.0 }),
        DefaultMenu::Suppress
    );
    platform.select("second");
    hub.dispatch(ContextGesture { x: 30.0, y: 40.0 });

    let snapshot = tracker.snapshot().expect("snapshot");
    assert_eq!(snapshot.text, "second");
    assert_eq!((snapshot.anchor.x, snapshot.anchor.y), (30.0, 40.0));

    platform.clear();
    assert_eq!(
        hub.dispatch(ContextGesture { x: 0.0, y: 0.0 }),
        DefaultMenu::Allow
    );
    assert!(tracker.snapshot().is_none());
}

#[test]
fn unmounted_surfaces_stop_receiving_gestures() {
    let platform = SharedSelection::default();
    let hub = ContextMenuHub::new(Box::new(platform.clone()));
    let left = SelectionTracker::new();
    let right = SelectionTracker::new();
    let left_guard = hub.mount(&left);
    let right_guard = hub.mount(&right);
    assert_eq!(hub.listener_count(), 2);

    drop(left_guard);
    assert_eq!(hub.listener_count(), 1);

    platform.select("only right");
    hub.dispatch(ContextGesture { x: 1.0, y: 1.0 });
    assert!(left.snapshot().is_none());
    assert_eq!(
        right_guard.tracker().snapshot().map(|snapshot| snapshot.text),
        Some("only right".to_string())
    );

    right_guard.tracker().clear_selection();
    assert!(right.snapshot().is_none());
}

#[test]
fn dropping_the_hub_first_does_not_break_guards() {
    let platform = SharedSelection::default();
    let hub = ContextMenuHub::new(Box::new(platform));
    let tracker = SelectionTracker::new();
    let guard = hub.mount(&tracker);
    drop(hub);
    drop(guard);
    assert!(tracker.snapshot().is_none());
}
