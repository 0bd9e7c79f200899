//! Mock construction helpers

use specvis_rs::capture::{CaptureSink, CaptureSource};
use specvis_rs::Result;
use std::sync::{Arc, Mutex};

/// Capture source driven by hand: blocks are pushed from the test thread.
#[derive(Clone, Default)]
pub struct ManualCapture {
    sink: Arc<Mutex<Option<CaptureSink>>>,
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl ManualCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a block to the sink, if started. Returns whether it was delivered.
    pub fn push(&self, block: &[u8]) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink(block);
                true
            }
            None => false,
        }
    }

    /// Lifecycle calls received so far
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl CaptureSource for ManualCapture {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        *self.sink.lock().unwrap() = Some(sink);
        self.events.lock().unwrap().push("start");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        *self.sink.lock().unwrap() = None;
        self.events.lock().unwrap().push("stop");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        *self.sink.lock().unwrap() = None;
        self.events.lock().unwrap().push("release");
        Ok(())
    }
}
