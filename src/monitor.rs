//! Decode progress notifications.
//!
//! Delivery is synchronous and in scan order, on the thread running the
//! decode. There is no queue between the decoder and a monitor; a slow
//! monitor slows the scan.

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::ensemble::EnsemblePackage;

/// Observer interface for decode progress.
///
/// All hooks default to no-ops so implementations override only what they
/// care about. Return values are never consumed by the decoder.
pub trait DecodeMonitor {
    /// A frame passed checksum validation.
    fn good_frame(&mut self) {}

    /// A frame failed checksum validation and was discarded.
    fn bad_frame(&mut self) {}

    /// A validated frame was decoded; carries the raw bytes and the decoded
    /// ensemble.
    fn ensemble(&mut self, _package: &EnsemblePackage) {}

    /// The whole source has been scanned. Fired once per decode call.
    fn complete(&mut self) {}
}

/// A decode notification as a value, for callers that prefer draining a
/// channel over implementing [DecodeMonitor].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    GoodFrame,
    BadFrame,
    Ensemble(EnsemblePackage),
    Complete,
}

/// Monitor that forwards every notification into a channel.
///
/// The receiver half is handed back at construction; drain it after the
/// decode call (or concurrently from another thread).
pub struct EventCollector {
    tx: Sender<DecodeEvent>,
}

impl EventCollector {
    #[must_use]
    pub fn new() -> (Self, Receiver<DecodeEvent>) {
        let (tx, rx) = unbounded();
        (EventCollector { tx }, rx)
    }
}

impl DecodeMonitor for EventCollector {
    fn good_frame(&mut self) {
        let _ = self.tx.send(DecodeEvent::GoodFrame);
    }

    fn bad_frame(&mut self) {
        let _ = self.tx.send(DecodeEvent::BadFrame);
    }

    fn ensemble(&mut self, package: &EnsemblePackage) {
        let _ = self.tx.send(DecodeEvent::Ensemble(package.clone()));
    }

    fn complete(&mut self) {
        let _ = self.tx.send(DecodeEvent::Complete);
    }
}

/// Zero or more monitors fired together, in registration order.
#[derive(Default)]
pub struct MonitorSet {
    monitors: Vec<Box<dyn DecodeMonitor>>,
}

impl MonitorSet {
    pub fn push(&mut self, monitor: Box<dyn DecodeMonitor>) {
        self.monitors.push(monitor);
    }

    pub(crate) fn good_frame(&mut self) {
        for monitor in &mut self.monitors {
            monitor.good_frame();
        }
    }

    pub(crate) fn bad_frame(&mut self) {
        for monitor in &mut self.monitors {
            monitor.bad_frame();
        }
    }

    pub(crate) fn ensemble(&mut self, package: &EnsemblePackage) {
        for monitor in &mut self.monitors {
            monitor.ensemble(package);
        }
    }

    pub(crate) fn complete(&mut self) {
        for monitor in &mut self.monitors {
            monitor.complete();
        }
    }
}

impl From<Vec<Box<dyn DecodeMonitor>>> for MonitorSet {
    fn from(monitors: Vec<Box<dyn DecodeMonitor>>) -> Self {
        MonitorSet { monitors }
    }
}
