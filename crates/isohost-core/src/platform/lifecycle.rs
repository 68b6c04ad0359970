//! Lifecycle bus
//!
//! The platform announces four phases. Each phase is delivered at most once
//! per bus; handlers subscribe per phase and get an explicit
//! [`Subscription`] handle to release.

use crate::Result;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Platform lifecycle phases, in firing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecyclePhase {
    /// Before the platform initializes; configuration may still be changed
    PreInit,
    /// The platform is initialized and can read its database
    Init,
    /// The host is serving requests
    PostStart,
    /// The host is shutting down
    Finalize,
}

impl LifecyclePhase {
    /// All phases in order
    pub const ALL: [LifecyclePhase; 4] = [
        LifecyclePhase::PreInit,
        LifecyclePhase::Init,
        LifecyclePhase::PostStart,
        LifecyclePhase::Finalize,
    ];
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::PreInit => write!(f, "PreInit"),
            LifecyclePhase::Init => write!(f, "Init"),
            LifecyclePhase::PostStart => write!(f, "PostStart"),
            LifecyclePhase::Finalize => write!(f, "Finalize"),
        }
    }
}

/// Receives lifecycle notifications
pub trait LifecycleHandler: Send + Sync {
    /// Called once when `phase` fires
    fn on_phase(&self, phase: LifecyclePhase) -> Result<()>;
}

/// Handle returned by [`LifecycleBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the subscription impossible to release"]
pub struct Subscription {
    phase: LifecyclePhase,
    id: u64,
}

impl Subscription {
    /// Phase this subscription listens to
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    handlers: BTreeMap<LifecyclePhase, Vec<(u64, Arc<dyn LifecycleHandler>)>>,
    fired: HashSet<LifecyclePhase>,
}

/// Delivers lifecycle phases to subscribed handlers
#[derive(Default)]
pub struct LifecycleBus {
    state: Mutex<BusState>,
}

impl LifecycleBus {
    /// Empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `phase`
    pub fn subscribe(
        &self,
        phase: LifecyclePhase,
        handler: Arc<dyn LifecycleHandler>,
    ) -> Subscription {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.handlers.entry(phase).or_default().push((id, handler));
        Subscription { phase, id }
    }

    /// Stop delivery to a subscription; returns whether it was still active
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut state = self.state.lock();
        match state.handlers.get_mut(&subscription.phase) {
            Some(handlers) => {
                let before = handlers.len();
                handlers.retain(|(id, _)| *id != subscription.id);
                handlers.len() != before
            }
            None => false,
        }
    }

    /// Fire `phase`
    ///
    /// A phase fires at most once; later calls are no-ops. Handlers run in
    /// subscription order outside the bus lock and the first error stops
    /// delivery.
    pub fn fire(&self, phase: LifecyclePhase) -> Result<()> {
        let handlers: Vec<Arc<dyn LifecycleHandler>> = {
            let mut state = self.state.lock();
            if !state.fired.insert(phase) {
                tracing::debug!("Lifecycle phase {} already fired", phase);
                return Ok(());
            }
            state
                .handlers
                .get(&phase)
                .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        tracing::debug!("Firing {} to {} handler(s)", phase, handlers.len());
        for handler in handlers {
            handler.on_phase(phase)?;
        }
        Ok(())
    }

    /// Whether `phase` has fired
    pub fn has_fired(&self, phase: LifecyclePhase) -> bool {
        self.state.lock().fired.contains(&phase)
    }

    /// Number of active subscriptions for `phase`
    pub fn subscriber_count(&self, phase: LifecyclePhase) -> usize {
        self.state
            .lock()
            .handlers
            .get(&phase)
            .map_or(0, Vec::len)
    }
}
