//! # Lifecycle Controller
//!
//! Dispatcher state machine:
//!
//! ```text
//! Idle --start--> Running --stop--> Draining --drain complete--> Stopped
//! ```
//!
//! Any other transition fails with [`EventError::InvalidLifecycleTransition`];
//! calling `start` twice or `stop` before `start` is an error, not a no-op.
//! `Stopped` is terminal: a stopped dispatcher cannot be restarted.
//!
//! [`LifecycleController`] owns the consumer task: `start` spawns it and
//! resolves once the loop is active, `stop` signals it and resolves once the
//! drain is complete.

use crate::dispatch::engine::{DispatchEngine, DrainReport};
use crate::error::{EventError, Result};
use crate::events::types::PublishedEvent;
use crate::logging::log_lifecycle_transition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::error;

/// Dispatcher lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Initial state; handlers may be registered, publishing is rejected
    #[default]
    Idle,
    /// Consumer loop is active and publishes are accepted
    Running,
    /// Stop requested; queued and in-flight events are being finished
    Draining,
    /// Drain complete
    Stopped,
}

impl DispatcherState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Check if publishes are accepted in this state
    pub fn is_accepting(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Apply an action, returning the next state if the transition is allowed
    pub fn next(self, action: LifecycleAction) -> Option<Self> {
        match (self, action) {
            (Self::Idle, LifecycleAction::Start) => Some(Self::Running),
            (Self::Running, LifecycleAction::Stop) => Some(Self::Draining),
            (Self::Draining, LifecycleAction::DrainComplete) => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for DispatcherState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "draining" => Ok(Self::Draining),
            "stopped" => Ok(Self::Stopped),
            _ => Err(format!("Invalid dispatcher state: {s}")),
        }
    }
}

/// Actions that drive lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    Start,
    Stop,
    DrainComplete,
}

impl LifecycleAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::DrainComplete => "complete drain of",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_type())
    }
}

/// Shared, observable dispatcher state
#[derive(Debug)]
pub struct LifecycleState {
    state: watch::Sender<DispatcherState>,
}

impl LifecycleState {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DispatcherState::Idle);
        Self { state }
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Atomically apply an action, returning the new state
    pub fn apply(&self, action: LifecycleAction) -> Result<DispatcherState> {
        let mut outcome = None;
        self.state.send_if_modified(|state| match state.next(action) {
            Some(next) => {
                outcome = Some(Ok((*state, next)));
                *state = next;
                true
            }
            None => {
                outcome = Some(Err(EventError::InvalidLifecycleTransition {
                    from: *state,
                    action,
                }));
                false
            }
        });

        match outcome {
            Some(Ok((from, to))) => {
                log_lifecycle_transition(&from.to_string(), &to.to_string(), None);
                Ok(to)
            }
            Some(Err(err)) => Err(err),
            None => Err(EventError::InvalidLifecycleTransition {
                from: self.state(),
                action,
            }),
        }
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

enum ConsumerSlot {
    /// Not started; holds what the consumer loop needs
    Pending {
        engine: Arc<DispatchEngine>,
        queue: mpsc::UnboundedReceiver<PublishedEvent>,
    },
    Running {
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<DrainReport>,
    },
    Finished,
}

/// Drives the lifecycle state machine and owns the consumer task
pub struct LifecycleController {
    state: LifecycleState,
    consumer: Mutex<ConsumerSlot>,
}

impl LifecycleController {
    pub(crate) fn new(
        engine: Arc<DispatchEngine>,
        queue: mpsc::UnboundedReceiver<PublishedEvent>,
    ) -> Self {
        Self {
            state: LifecycleState::new(),
            consumer: Mutex::new(ConsumerSlot::Pending { engine, queue }),
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Spawn the consumer loop; resolves once it is active
    pub async fn start(&self) -> Result<()> {
        let mut consumer = self.consumer.lock().await;
        self.state.apply(LifecycleAction::Start)?;

        let ConsumerSlot::Pending { engine, queue } =
            std::mem::replace(&mut *consumer, ConsumerSlot::Finished)
        else {
            return Err(EventError::InvalidLifecycleTransition {
                from: self.state(),
                action: LifecycleAction::Start,
            });
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(engine.run(queue, shutdown_rx, ready_tx));

        if ready_rx.await.is_err() {
            error!("Consumer loop exited before signalling readiness");
        }

        *consumer = ConsumerSlot::Running {
            shutdown: shutdown_tx,
            handle,
        };
        Ok(())
    }

    /// Stop accepting publishes and drain; resolves once the drain is complete
    pub async fn stop(&self) -> Result<DrainReport> {
        let mut consumer = self.consumer.lock().await;
        self.state.apply(LifecycleAction::Stop)?;

        let report = match std::mem::replace(&mut *consumer, ConsumerSlot::Finished) {
            ConsumerSlot::Running { shutdown, handle } => {
                let _ = shutdown.send(());
                match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(error = %e, "Consumer loop terminated abnormally");
                        DrainReport::default()
                    }
                }
            }
            _ => DrainReport::default(),
        };

        self.state.apply(LifecycleAction::DrainComplete)?;
        Ok(report)
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
