//! # Event Application
//!
//! [`EventApp`] wires the registry, publisher, dispatch engine, and lifecycle
//! controller into one context object. Handles are cheap to clone and share
//! the same dispatcher.
//!
//! ## Usage
//!
//! ```rust
//! use papa_events::{EventApp, HandlerArgs, HandlerSignature, Payload};
//! use serde_json::json;
//!
//! # async fn example() -> papa_events::Result<()> {
//! let app = EventApp::new();
//!
//! app.on_event(["user.created"], "send_welcome_email").handler_fn(
//!     HandlerSignature::new().text("event_name").payload("event"),
//!     |args: HandlerArgs| async move {
//!         let name = args.payload().get("name").cloned();
//!         tracing::info!(event_name = ?args.text("event_name"), ?name, "welcome");
//!         Ok(())
//!     },
//! )?;
//!
//! app.start().await?;
//! app.new_event("user.created", Payload::try_from(json!({"name": "test user"}))?)
//!     .await?;
//! app.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::DispatcherConfig;
use crate::dispatch::dead_letter::DeadLetterStore;
use crate::dispatch::engine::{DispatchEngine, DrainReport};
use crate::dispatch::handler::{EventHandler, FnHandler, HandlerArgs, HandlerError};
use crate::dispatch::lifecycle::{DispatcherState, LifecycleController};
use crate::error::{EventError, Result};
use crate::events::payload::Payload;
use crate::events::publisher::EventPublisher;
use crate::events::types::{DeadLetter, DispatchOutcome, EventId};
use crate::registry::handler_registry::{HandlerRegistry, RegistryStats};
use crate::registry::pattern::RoutingPattern;
use crate::registry::signature::HandlerSignature;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// In-process event application
#[derive(Clone)]
pub struct EventApp {
    inner: Arc<AppInner>,
}

struct AppInner {
    config: DispatcherConfig,
    registry: Arc<HandlerRegistry>,
    publisher: EventPublisher,
    outcomes: broadcast::Sender<DispatchOutcome>,
    dead_letters: Arc<DeadLetterStore>,
    engine: Arc<DispatchEngine>,
    lifecycle: LifecycleController,
}

/// Point-in-time view of the dispatcher
#[derive(Debug, Clone)]
pub struct AppStats {
    pub state: DispatcherState,
    pub registry: RegistryStats,
    pub in_flight: usize,
    pub dead_letters: usize,
}

impl EventApp {
    /// Create an application with default configuration
    pub fn new() -> Self {
        Self::build(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create an application configured from `PAPA_EVENTS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::with_config(DispatcherConfig::from_env()?)
    }

    fn build(config: DispatcherConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let (outcomes, _) = broadcast::channel(config.outcome_buffer);
        let dead_letters = Arc::new(DeadLetterStore::new(config.dead_letter_capacity));
        let engine = Arc::new(DispatchEngine::new(
            Arc::clone(&registry),
            &config,
            outcomes.clone(),
            Arc::clone(&dead_letters),
        ));

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let lifecycle = LifecycleController::new(Arc::clone(&engine), queue_rx);
        let publisher = EventPublisher::new(queue_tx, lifecycle.subscribe());

        Self {
            inner: Arc::new(AppInner {
                config,
                registry,
                publisher,
                outcomes,
                dead_letters,
                engine,
                lifecycle,
            }),
        }
    }

    /// Begin a registration for a use case under one or more routing patterns
    pub fn on_event<I, S>(&self, patterns: I, use_case: impl Into<String>) -> Registration<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Registration {
            app: self,
            patterns: patterns.into_iter().map(Into::into).collect(),
            use_case: use_case.into(),
            retries: None,
        }
    }

    /// Publish an event; resolves once it is accepted into the queue
    pub async fn new_event(&self, routing_key: &str, payload: Payload) -> Result<EventId> {
        self.inner.publisher.publish(routing_key, payload)
    }

    /// Serialize a model and publish it as the event payload
    pub async fn new_event_model<T: Serialize + ?Sized>(
        &self,
        routing_key: &str,
        model: &T,
    ) -> Result<EventId> {
        self.inner.publisher.publish_model(routing_key, model)
    }

    /// Cloneable publishing handle for producers that should not own the app
    pub fn publisher(&self) -> EventPublisher {
        self.inner.publisher.clone()
    }

    pub async fn start(&self) -> Result<()> {
        self.inner.lifecycle.start().await
    }

    /// Stop accepting events and drain within `drain_timeout`
    pub async fn stop(&self) -> Result<DrainReport> {
        self.inner.lifecycle.stop().await
    }

    pub fn state(&self) -> DispatcherState {
        self.inner.lifecycle.state()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Receive a [`DispatchOutcome`] for every handler invocation from now on
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<DispatchOutcome> {
        self.inner.outcomes.subscribe()
    }

    /// Dead letters recorded for a use case, oldest first
    pub fn dead_letters(&self, use_case: &str) -> Vec<DeadLetter> {
        self.inner.dead_letters.get(use_case)
    }

    pub fn take_dead_letters(&self, use_case: &str) -> Vec<DeadLetter> {
        self.inner.dead_letters.take(use_case)
    }

    pub fn stats(&self) -> AppStats {
        AppStats {
            state: self.state(),
            registry: self.inner.registry.stats(),
            in_flight: self.inner.engine.in_flight(),
            dead_letters: self.inner.dead_letters.total(),
        }
    }
}

impl Default for EventApp {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventApp")
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

/// Pending handler registration created by [`EventApp::on_event`]
#[must_use = "a registration does nothing until a handler is supplied"]
pub struct Registration<'a> {
    app: &'a EventApp,
    patterns: Vec<String>,
    use_case: String,
    retries: Option<u32>,
}

impl Registration<'_> {
    /// Additional attempts for a failed invocation; overrides the configured default
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Validate and register a handler, returning it unchanged
    pub fn handler<H: EventHandler>(self, handler: H) -> Result<Arc<H>> {
        self.handler_arc(Arc::new(handler))
    }

    pub fn handler_arc<H: EventHandler>(self, handler: Arc<H>) -> Result<Arc<H>> {
        let patterns = self
            .patterns
            .iter()
            .map(|pattern| {
                RoutingPattern::new(pattern.as_str()).map_err(|source| EventError::InvalidPattern {
                    use_case: self.use_case.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let plan = handler
            .signature()
            .inspect()
            .map_err(|source| EventError::InvalidSignature {
                use_case: self.use_case.clone(),
                source,
            })?;

        let retries = self.retries.unwrap_or(self.app.inner.config.retries);
        let shared: Arc<dyn EventHandler> = handler.clone();
        self.app
            .inner
            .registry
            .register(patterns, &self.use_case, shared, plan, retries)?;

        Ok(handler)
    }

    /// Register an async closure with an explicit signature
    pub fn handler_fn<F, Fut>(self, signature: HandlerSignature, func: F) -> Result<Arc<FnHandler<F>>>
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.handler(FnHandler::new(signature, func))
    }
}
