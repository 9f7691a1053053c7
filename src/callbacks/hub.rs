//! Typed listener registry.
//!
//! One [`CallbackHub`] per endpoint (client or server) holds nine listener
//! lists, one per event kind. Listeners are appended, never removed, and
//! invoked synchronously on the raising task in registration order. A
//! panicking listener is caught and logged so the rest of the list still
//! runs.
//!
//! The hub is `Send + Sync` and shared via `Arc`; events may be raised
//! concurrently from several connection tasks, so listeners handle their own
//! synchronization.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::core::PngData;
use crate::transport::{CompositeParts, Frame};

/// One listener list; panic-isolating raise shared by every event kind.
struct Listeners<F: ?Sized> {
    kind: &'static str,
    handlers: Mutex<Vec<Arc<F>>>,
}

impl<F: ?Sized> Listeners<F> {
    fn new(kind: &'static str) -> Self {
        Self { kind, handlers: Mutex::new(Vec::new()) }
    }

    fn add(&self, handler: Arc<F>) {
        self.lock().push(handler);
    }

    fn snapshot(&self) -> Vec<Arc<F>> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<F>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke every registered handler in order, isolating panics.
    fn raise(&self, mut invoke: impl FnMut(&F)) {
        for handler in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| invoke(&handler))).is_err() {
                warn!(kind = self.kind, "listener panicked, continuing with remaining listeners");
            }
        }
    }
}

/// Per-endpoint registry of typed payload listeners.
pub struct CallbackHub {
    first_message: Listeners<dyn Fn(&str) + Send + Sync>,
    binary: Listeners<dyn Fn(&Frame) + Send + Sync>,
    text: Listeners<dyn Fn(&str, &Frame) + Send + Sync>,
    image: Listeners<dyn Fn(&PngData, &Frame) + Send + Sync>,
    text_and_image: Listeners<dyn Fn(&str, &PngData, &Frame) + Send + Sync>,
    complex: Listeners<dyn Fn(&CompositeParts, &Frame) + Send + Sync>,
    log_message: Listeners<dyn Fn(&str) + Send + Sync>,
    packet_frame: Listeners<dyn Fn(&Frame, &Frame) + Send + Sync>,
    requirement: Listeners<dyn Fn(&CompositeParts, &Frame) + Send + Sync>,
}

impl CallbackHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            first_message: Listeners::new("first_message"),
            binary: Listeners::new("binary"),
            text: Listeners::new("text"),
            image: Listeners::new("image"),
            text_and_image: Listeners::new("text_and_image"),
            complex: Listeners::new("complex"),
            log_message: Listeners::new("log_message"),
            packet_frame: Listeners::new("packet_frame"),
            requirement: Listeners::new("requirement"),
        }
    }

    /// Listen for the server greeting, raised once per connection.
    pub fn add_first_message_listener(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.first_message.add(Arc::new(f));
    }

    /// Listen for raw binary frames (including unknown payload tags).
    pub fn add_binary_listener(&self, f: impl Fn(&Frame) + Send + Sync + 'static) {
        self.binary.add(Arc::new(f));
    }

    /// Listen for plain text frames.
    pub fn add_text_listener(&self, f: impl Fn(&str, &Frame) + Send + Sync + 'static) {
        self.text.add(Arc::new(f));
    }

    /// Listen for PNG image frames.
    pub fn add_image_listener(&self, f: impl Fn(&PngData, &Frame) + Send + Sync + 'static) {
        self.image.add(Arc::new(f));
    }

    /// Listen for combined text + image frames.
    pub fn add_text_and_image_listener(
        &self,
        f: impl Fn(&str, &PngData, &Frame) + Send + Sync + 'static,
    ) {
        self.text_and_image.add(Arc::new(f));
    }

    /// Listen for composite (`Complex`) frames.
    pub fn add_complex_listener(
        &self,
        f: impl Fn(&CompositeParts, &Frame) + Send + Sync + 'static,
    ) {
        self.complex.add(Arc::new(f));
    }

    /// Listen for log strings published by the endpoint.
    pub fn add_log_message_listener(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.log_message.add(Arc::new(f));
    }

    /// Listen for embedded-frame payloads; receives (child, carrier).
    pub fn add_packet_frame_listener(&self, f: impl Fn(&Frame, &Frame) + Send + Sync + 'static) {
        self.packet_frame.add(Arc::new(f));
    }

    /// Listen for `Requirement` frames.
    pub fn add_requirement_listener(
        &self,
        f: impl Fn(&CompositeParts, &Frame) + Send + Sync + 'static,
    ) {
        self.requirement.add(Arc::new(f));
    }

    /// Raise the greeting event.
    pub fn raise_first_message(&self, message: &str) {
        self.first_message.raise(|f| f(message));
    }

    /// Raise the binary event.
    pub fn raise_binary(&self, frame: &Frame) {
        self.binary.raise(|f| f(frame));
    }

    /// Raise the text event.
    pub fn raise_text(&self, message: &str, frame: &Frame) {
        self.text.raise(|f| f(message, frame));
    }

    /// Raise the image event.
    pub fn raise_image(&self, image: &PngData, frame: &Frame) {
        self.image.raise(|f| f(image, frame));
    }

    /// Raise the text + image event.
    pub fn raise_text_and_image(&self, message: &str, image: &PngData, frame: &Frame) {
        self.text_and_image.raise(|f| f(message, image, frame));
    }

    /// Raise the composite event.
    pub fn raise_complex(&self, parts: &CompositeParts, frame: &Frame) {
        self.complex.raise(|f| f(parts, frame));
    }

    /// Publish a log string to the log sink.
    pub fn raise_log_message(&self, message: &str) {
        self.log_message.raise(|f| f(message));
    }

    /// Raise the embedded-frame event.
    pub fn raise_packet_frame(&self, child: &Frame, carrier: &Frame) {
        self.packet_frame.raise(|f| f(child, carrier));
    }

    /// Raise the requirement event.
    pub fn raise_requirement(&self, parts: &CompositeParts, frame: &Frame) {
        self.requirement.raise(|f| f(parts, frame));
    }
}

impl Default for CallbackHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHub").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_listeners_run_in_registration_order() {
        let hub = CallbackHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            hub.add_log_message_listener(move |_| order.lock().unwrap().push(tag));
        }

        hub.raise_log_message("go");
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_the_rest() {
        let hub = CallbackHub::new();
        let reached = Arc::new(AtomicUsize::new(0));

        hub.add_text_listener(|_, _| panic!("boom"));
        let reached_clone = Arc::clone(&reached);
        hub.add_text_listener(move |_, _| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
        });

        let frame = Frame::text("still delivered");
        hub.raise_text("still delivered", &frame);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_arguments_reach_listeners() {
        let hub = CallbackHub::new();
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = Arc::clone(&seen);
        hub.add_text_listener(move |message, frame| {
            *seen_clone.lock().unwrap() = Some((message.to_owned(), frame.src_user_id));
        });

        let frame = Frame::text("hi").with_source(1, 42);
        hub.raise_text("hi", &frame);
        assert_eq!(*seen.lock().unwrap(), Some(("hi".to_owned(), 42)));
    }

    #[test]
    fn test_raise_with_no_listeners_is_a_no_op() {
        let hub = CallbackHub::new();
        hub.raise_binary(&Frame::binary(vec![1]));
        hub.raise_first_message("welcome");
    }
}
