//! # Handler Registry
//!
//! Thread-safe store of handler registrations keyed by use-case identifier,
//! with a derived index from routing pattern to the use cases bound to it.
//!
//! ## Key Features
//!
//! - **Conflict detection**: a use case can be registered once; a second
//!   registration fails instead of overwriting the first
//! - **Consistent index**: the entry map and the pattern index are updated
//!   under one write lock
//! - **Read-heavy access**: `lookup` takes a shared lock, so registration may
//!   interleave with dispatch
//!
//! ## Usage
//!
//! ```rust
//! use papa_events::registry::{HandlerRegistry, HandlerSignature, RoutingPattern};
//! use papa_events::dispatch::{FnHandler, HandlerError};
//! use std::sync::Arc;
//!
//! let registry = HandlerRegistry::new();
//! let signature = HandlerSignature::new().text("event_name").payload("event");
//! let plan = signature.inspect().unwrap();
//! let handler = Arc::new(FnHandler::new(signature, |_args| async { Ok::<(), HandlerError>(()) }));
//!
//! registry
//!     .register(vec![RoutingPattern::new("user.*").unwrap()], "welcome_email", handler, plan, 0)
//!     .unwrap();
//!
//! assert_eq!(registry.lookup("user.created").len(), 1);
//! assert!(registry.lookup("email.sended").is_empty());
//! ```

use crate::dispatch::handler::EventHandler;
use crate::error::{EventError, Result};
use crate::logging::log_registry_operation;
use crate::registry::pattern::RoutingPattern;
use crate::registry::signature::BindingPlan;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Immutable handler registration
pub struct HandlerEntry {
    use_case: String,
    patterns: Vec<RoutingPattern>,
    handler: Arc<dyn EventHandler>,
    plan: BindingPlan,
    retries: u32,
    registered_at: DateTime<Utc>,
}

impl HandlerEntry {
    pub fn use_case(&self) -> &str {
        &self.use_case
    }

    pub fn patterns(&self) -> &[RoutingPattern] {
        &self.patterns
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub fn plan(&self) -> &BindingPlan {
        &self.plan
    }

    /// Additional attempts after a failed invocation
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Whether any of this entry's patterns matches the routing key
    pub fn matches(&self, routing_key: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(routing_key))
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("use_case", &self.use_case)
            .field("patterns", &self.patterns)
            .field("handler", &self.handler.handler_name())
            .field("plan", &self.plan)
            .field("retries", &self.retries)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    /// Map of use case to registration
    entries: HashMap<String, Arc<HandlerEntry>>,
    /// Map of routing pattern to use cases bound to it
    pattern_index: HashMap<RoutingPattern, BTreeSet<String>>,
    /// Indexed patterns with wildcard segments, each listed once
    wildcard_patterns: Vec<RoutingPattern>,
}

/// Registry of event handlers
#[derive(Default)]
pub struct HandlerRegistry {
    state: RwLock<RegistryState>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a use case under one or more routing patterns
    ///
    /// Fails with [`EventError::DuplicateRegistration`] if the use case is
    /// already registered; nothing is stored on failure.
    pub fn register(
        &self,
        patterns: Vec<RoutingPattern>,
        use_case: &str,
        handler: Arc<dyn EventHandler>,
        plan: BindingPlan,
        retries: u32,
    ) -> Result<Arc<HandlerEntry>> {
        if use_case.is_empty() {
            return Err(EventError::InvalidRegistration {
                use_case: use_case.to_string(),
                reason: "use case identifier must not be empty".to_string(),
            });
        }
        if patterns.is_empty() {
            return Err(EventError::InvalidRegistration {
                use_case: use_case.to_string(),
                reason: "at least one routing pattern is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let patterns: Vec<RoutingPattern> = patterns
            .into_iter()
            .filter(|pattern| seen.insert(pattern.clone()))
            .collect();

        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.entries.contains_key(use_case) {
            return Err(EventError::DuplicateRegistration {
                use_case: use_case.to_string(),
            });
        }

        let entry = Arc::new(HandlerEntry {
            use_case: use_case.to_string(),
            patterns,
            handler,
            plan,
            retries,
            registered_at: Utc::now(),
        });

        for pattern in &entry.patterns {
            match state.pattern_index.entry(pattern.clone()) {
                Entry::Occupied(mut indexed) => {
                    indexed.get_mut().insert(use_case.to_string());
                }
                Entry::Vacant(slot) => {
                    if pattern.is_wildcard() {
                        state.wildcard_patterns.push(pattern.clone());
                    }
                    slot.insert(BTreeSet::from([use_case.to_string()]));
                }
            }
        }
        state
            .entries
            .insert(use_case.to_string(), Arc::clone(&entry));
        drop(guard);

        let patterns = entry
            .patterns
            .iter()
            .map(RoutingPattern::as_str)
            .collect::<Vec<_>>()
            .join(",");
        log_registry_operation("register", use_case, Some(&patterns), "success", None);

        Ok(entry)
    }

    /// Every registration with at least one pattern matching the routing key
    ///
    /// Each matching use case appears once, however many of its patterns match.
    pub fn lookup(&self, routing_key: &str) -> Vec<Arc<HandlerEntry>> {
        let state = self.state.read();
        let mut matched_use_cases = BTreeSet::new();

        // Exact matches first
        if let Some(use_cases) = state.pattern_index.get(routing_key) {
            matched_use_cases.extend(use_cases.iter());
        }

        for pattern in &state.wildcard_patterns {
            if pattern.matches(routing_key) {
                if let Some(use_cases) = state.pattern_index.get(pattern) {
                    matched_use_cases.extend(use_cases.iter());
                }
            }
        }

        let matched: Vec<Arc<HandlerEntry>> = matched_use_cases
            .into_iter()
            .filter_map(|use_case| state.entries.get(use_case).cloned())
            .collect();

        debug!(
            routing_key = routing_key,
            matched = matched.len(),
            "Looked up handlers"
        );

        matched
    }

    pub fn get(&self, use_case: &str) -> Option<Arc<HandlerEntry>> {
        self.state.read().entries.get(use_case).cloned()
    }

    pub fn contains(&self, use_case: &str) -> bool {
        self.state.read().entries.contains_key(use_case)
    }

    /// Registered use cases, sorted
    pub fn use_cases(&self) -> Vec<String> {
        let mut use_cases: Vec<String> = self.state.read().entries.keys().cloned().collect();
        use_cases.sort();
        use_cases
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            total_handlers: state.entries.len(),
            total_patterns: state.pattern_index.len(),
            wildcard_patterns: state.wildcard_patterns.len(),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("use_cases", &self.use_cases())
            .finish()
    }
}

/// Statistics about registered handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_handlers: usize,
    pub total_patterns: usize,
    pub wildcard_patterns: usize,
}
