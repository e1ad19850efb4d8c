//! Notification Dispatcher
//!
//! The only component that receives value-change events from the transport.
//! Transports may call [`NotificationDispatcher::on_value_changed`] from any
//! thread, including while the session is being torn down.
//!
//! The lifecycle read lock is held for the whole of an event, so once the
//! session has written `Terminated` no event can still reach the sink. The
//! sink mutex serializes events so each completes before the next starts.

use crate::domain::models::{Measurement, SessionState};
use crate::domain::output::OutputSink;
use crate::infrastructure::bluetooth::protocol;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Lifecycle flag shared between the session (writer) and the dispatcher
pub type SharedState = Arc<RwLock<SessionState>>;

pub fn read_state(state: &RwLock<SessionState>) -> RwLockReadGuard<'_, SessionState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

/// What happened to a single event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchOutcome {
    /// Session was not listening
    Dropped,
    /// Payload was not a measurement frame
    Ignored,
    /// Measurement reached the sink (even if the sink then failed)
    Emitted(Measurement),
}

pub struct NotificationDispatcher {
    state: SharedState,
    sink: Mutex<Box<dyn OutputSink>>,
    emit_budget: Duration,
}

impl NotificationDispatcher {
    pub fn new(state: SharedState, sink: Box<dyn OutputSink>, emit_budget: Duration) -> Self {
        Self {
            state,
            sink: Mutex::new(sink),
            emit_budget,
        }
    }

    /// Handle a raw characteristic value. Never fails.
    pub fn on_value_changed(&self, raw: &[u8]) -> DispatchOutcome {
        let state = read_state(&self.state);
        if *state != SessionState::Listening {
            trace!("Dropping {} byte event while {:?}", raw.len(), *state);
            return DispatchOutcome::Dropped;
        }

        let measurement = match protocol::decode_measurement(raw) {
            Ok(m) => m,
            Err(e) => {
                debug!("Ignoring frame {:02X?}: {}", raw, e);
                return DispatchOutcome::Ignored;
            }
        };

        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        if let Err(e) = sink.emit(measurement) {
            warn!("Output failed for {} m: {:#}", measurement.meters(), e);
        }

        let elapsed = started.elapsed();
        if elapsed > self.emit_budget {
            warn!(
                "{} sink took {:?} (budget {:?})",
                sink.name(),
                elapsed,
                self.emit_budget
            );
        }

        drop(sink);
        drop(state);
        DispatchOutcome::Emitted(measurement)
    }
}
