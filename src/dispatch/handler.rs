//! # Event Handlers
//!
//! The handler trait, the arguments a handler is invoked with, and the
//! handler-side error type.
//!
//! A handler declares its parameters once through [`EventHandler::signature`].
//! At dispatch time the engine binds the event onto those parameters according
//! to the registration's [`BindingPlan`] and passes the result as [`HandlerArgs`].

use crate::events::payload::{Payload, PayloadError};
use crate::events::types::PublishedEvent;
use crate::registry::signature::{BindingPlan, HandlerSignature};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Asynchronous event handler
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Declared parameters, inspected once at registration
    fn signature(&self) -> HandlerSignature;

    /// Handle one event
    async fn handle(&self, args: HandlerArgs) -> Result<(), HandlerError>;

    /// Handler name for identification in logs
    fn handler_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A bound argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue<'a> {
    Payload(&'a Payload),
    Text(&'a str),
}

/// Arguments bound from a published event according to a binding plan
#[derive(Debug, Clone)]
pub struct HandlerArgs {
    payload_param: String,
    payload: Payload,
    routing_key: Option<(String, String)>,
}

impl HandlerArgs {
    /// Bind an event onto a handler's declared parameters
    pub fn bind(plan: &BindingPlan, event: &PublishedEvent) -> Self {
        Self {
            payload_param: plan.payload_param().to_string(),
            payload: event.payload.clone(),
            routing_key: plan
                .routing_key_param()
                .map(|param| (param.to_string(), event.routing_key.clone())),
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_param(&self) -> &str {
        &self.payload_param
    }

    /// Decode the payload into the handler's model
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(self.payload.decode()?)
    }

    /// Routing key the event was published under, if the handler declared a
    /// text parameter for it
    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_ref().map(|(_, key)| key.as_str())
    }

    pub fn routing_key_param(&self) -> Option<&str> {
        self.routing_key.as_ref().map(|(param, _)| param.as_str())
    }

    /// Text argument bound to the named parameter
    pub fn text(&self, name: &str) -> Option<&str> {
        match &self.routing_key {
            Some((param, key)) if param == name => Some(key),
            _ => None,
        }
    }

    /// Argument bound to the named parameter
    pub fn get(&self, name: &str) -> Option<ArgValue<'_>> {
        if name == self.payload_param {
            return Some(ArgValue::Payload(&self.payload));
        }
        self.text(name).map(ArgValue::Text)
    }

    /// Bound parameter names in declaration-independent order (payload first)
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.payload_param.as_str()];
        if let Some(param) = self.routing_key_param() {
            names.push(param);
        }
        names
    }
}

/// Handler failures, contained by the dispatch engine
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The payload could not be decoded into the handler's model; never retried
    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(anyhow::anyhow!("{message}"))
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

impl From<PayloadError> for HandlerError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Decode { .. } => Self::Decode(err.to_string()),
            other => Self::Failed(other.into()),
        }
    }
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    signature: HandlerSignature,
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    pub fn new(signature: HandlerSignature, func: F) -> Self {
        Self { signature, func }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn signature(&self) -> HandlerSignature {
        self.signature.clone()
    }

    async fn handle(&self, args: HandlerArgs) -> Result<(), HandlerError> {
        (self.func)(args).await
    }
}
