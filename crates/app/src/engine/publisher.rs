//! Fan-out of per-tick telemetry to any number of stream subscribers.

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{trace, warn};

use crate::engine::{data::SharedSnapshot, schema::TelemetryFrame};

pub(crate) const SUBSCRIBER_QUEUE_CAPACITY: usize = 8;

/// One published tick: the structured record and its bincode encoding.
#[derive(Debug)]
pub(crate) struct TelemetryMessage {
    pub(crate) frame: TelemetryFrame,
    pub(crate) encoded: Vec<u8>,
}

#[derive(Default)]
struct State {
    subscribers: Vec<Sender<Arc<TelemetryMessage>>>,
    latest: Option<SharedSnapshot>,
}

#[derive(Default)]
pub(crate) struct Publisher {
    state: Mutex<State>,
}

impl Publisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self) -> Receiver<Arc<TelemetryMessage>> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_QUEUE_CAPACITY);
        self.lock().subscribers.push(tx);
        rx
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub(crate) fn latest(&self) -> Option<SharedSnapshot> {
        self.lock().latest.clone()
    }

    /// Offer `snapshot` to every subscriber without blocking. Full queues drop
    /// the frame for that subscriber; closed ones are removed.
    pub(crate) fn publish(&self, snapshot: SharedSnapshot) {
        let frame = TelemetryFrame::from(snapshot.as_ref());
        let encoded = match frame.to_bincode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("failed to encode telemetry frame {}: {err}", frame.frame_number);
                Vec::new()
            }
        };
        let message = Arc::new(TelemetryMessage { frame, encoded });

        let mut state = self.lock();
        state.latest = Some(snapshot);
        state.subscribers.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics::counter!("juggler_telemetry_dropped_total").increment(1);
                trace!("telemetry subscriber lagging; frame dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
