use std::sync::Mutex;

use wiredispatch::{ResponseSink, message::Response};

/// [`ResponseSink`] keeping every delivered response.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Response>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Responses delivered so far, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn delivered(&self) -> Vec<Response> { self.delivered.lock().expect("sink lock").clone() }
}

impl ResponseSink for RecordingSink {
    fn deliver(&self, response: Response) {
        self.delivered.lock().expect("sink lock").push(response);
    }
}
