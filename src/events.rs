//! Discovery event publication and the per-cycle completion barrier.
//!
//! Every discovery cycle brackets each method with a start and an end
//! event. An external readiness daemon blocks on the end events, so even
//! disabled methods and failure paths must publish their pair; a missing
//! end deadlocks boot.

use crate::method::{DiscoveryMethod, MethodSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Polling interval while waiting for a discovery cycle to complete.
const DISCOVERY_POLL_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPhase {
    Start,
    End,
}

/// One discovery event, identified on the bus by its subclass string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscoveryEvent {
    pub method: DiscoveryMethod,
    pub phase: EventPhase,
}

impl DiscoveryEvent {
    pub fn subclass(&self) -> &'static str {
        match (self.method, self.phase) {
            (DiscoveryMethod::Static, EventPhase::Start) => "ESC_ISCSI_STATIC_START",
            (DiscoveryMethod::Static, EventPhase::End) => "ESC_ISCSI_STATIC_END",
            (DiscoveryMethod::SendTargets, EventPhase::Start) => "ESC_ISCSI_SEND_TARGETS_START",
            (DiscoveryMethod::SendTargets, EventPhase::End) => "ESC_ISCSI_SEND_TARGETS_END",
            (DiscoveryMethod::Slp, EventPhase::Start) => "ESC_ISCSI_SLP_START",
            (DiscoveryMethod::Slp, EventPhase::End) => "ESC_ISCSI_SLP_END",
            (DiscoveryMethod::Isns, EventPhase::Start) => "ESC_ISCSI_ISNS_START",
            (DiscoveryMethod::Isns, EventPhase::End) => "ESC_ISCSI_ISNS_END",
        }
    }
}

/// Outbound port for discovery events; the OS service bus sits behind it.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DiscoveryEvent);
}

/// Sink that only logs each subclass. Stands in for the service bus when
/// none is attached.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: DiscoveryEvent) {
        log::info!("discovery event {}", event.subclass());
    }
}

struct BarrierState {
    ends: MethodSet,
    in_progress: bool,
}

/// Tracks which methods have published their end event this cycle.
pub struct EventBarrier {
    state: Mutex<BarrierState>,
    sink: Arc<dyn EventSink>,
}

impl EventBarrier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                ends: MethodSet::EMPTY,
                in_progress: false,
            }),
            sink,
        }
    }

    /// Publish one event. A start event marks a cycle in progress without
    /// touching the bitset; an end event sets the method's bit, and the
    /// last end of a cycle clears the in-progress flag.
    pub fn publish(&self, method: DiscoveryMethod, phase: EventPhase) {
        {
            let mut state = self.state.lock().unwrap();
            match phase {
                EventPhase::Start => state.in_progress = true,
                EventPhase::End => {
                    state.ends.insert(method);
                    if state.ends == MethodSet::ALL {
                        state.in_progress = false;
                    }
                }
            }
        }
        self.sink.publish(DiscoveryEvent { method, phase });
    }

    /// Reset the cycle bookkeeping before waking workers.
    pub(crate) fn begin_cycle(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_progress = true;
        state.ends = MethodSet::EMPTY;
    }

    /// Block until every method has published its end event this cycle.
    pub(crate) fn wait_complete(&self) {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if state.ends == MethodSet::ALL {
                    state.in_progress = false;
                    return;
                }
            }
            thread::sleep(DISCOVERY_POLL_DELAY);
        }
    }

    pub fn in_progress(&self) -> bool {
        self.state.lock().unwrap().in_progress
    }
}
