//! Touch input routing
//!
//! Platform touch events are converted into [`TouchEvent`]s and forwarded to
//! a single [`TouchListener`]. Coordinates are shifted by a modifier so that,
//! by default, (0, 0) is the centre of the screen and y grows upward. A
//! modifier set explicitly is kept across screen resizes until reset.

/// Phase of a touch event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    /// A pointer touched the screen
    Down,
    /// A pointer moved
    Move,
    /// A pointer left the screen or the gesture was cancelled
    Up,
}

/// A single pointer event in raw screen coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    /// Platform pointer id, stable for the gesture
    pub pointer_id: u32,
    /// Horizontal position in pixels from the left edge
    pub x: f32,
    /// Vertical position in pixels from the top edge
    pub y: f32,
    /// Phase of the event
    pub phase: TouchPhase,
}

impl TouchEvent {
    /// Create an event
    pub fn new(pointer_id: u32, x: f32, y: f32, phase: TouchPhase) -> Self {
        Self { pointer_id, x, y, phase }
    }
}

/// Receives transformed touch events
///
/// Called on whichever thread dispatches input, usually the platform UI
/// thread. Work that touches the scene should go through the update queue.
pub trait TouchListener: Send {
    /// A pointer went down
    fn on_touch_down(&mut self, _pointer_id: u32, _x: f32, _y: f32) {}

    /// A pointer moved
    fn on_touch_move(&mut self, _pointer_id: u32, _x: f32, _y: f32) {}

    /// A pointer went up
    fn on_touch_up(&mut self, _pointer_id: u32, _x: f32, _y: f32) {}
}

/// Routes touch events to the registered listener
#[derive(Default)]
pub struct TouchDispatcher {
    listener: Option<Box<dyn TouchListener>>,
    modifier: (f32, f32),
    screen: (u32, u32),
    custom_modifier: bool,
}

impl TouchDispatcher {
    /// Create a dispatcher with no listener and a zero modifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listener
    pub fn set_listener(&mut self, listener: Box<dyn TouchListener>) {
        self.listener = Some(listener);
    }

    /// Remove the listener; later events are dropped
    pub fn clear_listener(&mut self) -> Option<Box<dyn TouchListener>> {
        self.listener.take()
    }

    /// Check whether a listener is registered
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Set the point that becomes the origin; later resizes keep it
    pub fn set_modifier(&mut self, x: f32, y: f32) {
        self.modifier = (x, y);
        self.custom_modifier = true;
    }

    /// Drop a custom modifier and centre the origin on the last known screen
    pub fn reset_modifier(&mut self) {
        self.custom_modifier = false;
        self.centre();
    }

    /// Current coordinate modifier
    pub fn modifier(&self) -> (f32, f32) {
        self.modifier
    }

    /// Check whether the modifier was set explicitly
    pub fn has_custom_modifier(&self) -> bool {
        self.custom_modifier
    }

    /// Record the screen size, centring the origin unless a custom modifier is set
    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen = (width, height);
        if self.custom_modifier {
            log::debug!("Keeping custom touch modifier {:?} on resize", self.modifier);
            return;
        }
        self.centre();
    }

    fn centre(&mut self) {
        let (width, height) = self.screen;
        self.modifier = (width as f32 / 2.0, height as f32 / 2.0);
    }

    /// Map raw screen coordinates into listener coordinates
    pub fn transform(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.modifier.0, self.modifier.1 - y)
    }

    /// Forward an event; returns false when no listener is registered
    pub fn dispatch(&mut self, event: TouchEvent) -> bool {
        let (x, y) = self.transform(event.x, event.y);
        let Some(listener) = self.listener.as_mut() else {
            return false;
        };

        match event.phase {
            TouchPhase::Down => listener.on_touch_down(event.pointer_id, x, y),
            TouchPhase::Move => listener.on_touch_move(event.pointer_id, x, y),
            TouchPhase::Up => listener.on_touch_up(event.pointer_id, x, y),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(TouchPhase, u32, f32, f32)>>>;

    struct Recorder(Seen);

    impl TouchListener for Recorder {
        fn on_touch_down(&mut self, pointer_id: u32, x: f32, y: f32) {
            self.0.lock().unwrap().push((TouchPhase::Down, pointer_id, x, y));
        }

        fn on_touch_up(&mut self, pointer_id: u32, x: f32, y: f32) {
            self.0.lock().unwrap().push((TouchPhase::Up, pointer_id, x, y));
        }
    }

    #[test]
    fn test_screen_centre_is_origin() {
        let mut dispatcher = TouchDispatcher::new();
        dispatcher.set_screen_size(800, 600);

        let (x, y) = dispatcher.transform(400.0, 300.0);
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 0.0);

        // Top-left corner lands left and up.
        let (x, y) = dispatcher.transform(0.0, 0.0);
        assert_relative_eq!(x, -400.0);
        assert_relative_eq!(y, 300.0);
    }

    #[test]
    fn test_custom_modifier_survives_resize() {
        let mut dispatcher = TouchDispatcher::new();
        dispatcher.set_screen_size(800, 600);
        dispatcher.set_modifier(0.0, 600.0);
        assert!(dispatcher.has_custom_modifier());

        dispatcher.set_screen_size(1024, 768);
        let (x, y) = dispatcher.modifier();
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 600.0);

        // Resetting centres on the latest size.
        dispatcher.reset_modifier();
        assert!(!dispatcher.has_custom_modifier());
        let (x, y) = dispatcher.modifier();
        assert_relative_eq!(x, 512.0);
        assert_relative_eq!(y, 384.0);

        dispatcher.set_screen_size(640, 480);
        let (x, y) = dispatcher.transform(320.0, 240.0);
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 0.0);
    }

    #[test]
    fn test_dispatch_routes_by_phase() {
        let seen: Seen = Arc::default();
        let mut dispatcher = TouchDispatcher::new();
        assert!(!dispatcher.dispatch(TouchEvent::new(0, 1.0, 1.0, TouchPhase::Down)));

        dispatcher.set_listener(Box::new(Recorder(seen.clone())));
        dispatcher.set_modifier(10.0, 20.0);
        assert!(dispatcher.dispatch(TouchEvent::new(3, 15.0, 5.0, TouchPhase::Down)));
        assert!(dispatcher.dispatch(TouchEvent::new(3, 16.0, 5.0, TouchPhase::Move)));
        assert!(dispatcher.dispatch(TouchEvent::new(3, 17.0, 5.0, TouchPhase::Up)));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (TouchPhase::Down, 3, 5.0, 15.0));
        assert_eq!(seen[1], (TouchPhase::Up, 3, 7.0, 15.0));
    }
}
