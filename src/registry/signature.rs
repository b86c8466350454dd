//! # Signature Inspector
//!
//! Handlers declare their parameters as a [`HandlerSignature`]; the inspector
//! turns that declaration into a [`BindingPlan`] once, at registration time.
//!
//! Rules:
//!
//! - exactly one payload-typed parameter,
//! - at most one text-typed parameter, which receives the routing key the
//!   event was published under (bound by its declared name),
//! - no parameter of any other type.

use thiserror::Error;

/// Declared type of a handler parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// Validated structured event payload
    Payload,
    /// Textual value
    Text,
    /// Anything else; the dispatcher has no value to bind to it
    Other(String),
}

/// A single declared handler parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
}

/// Ordered parameter declaration of a handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSignature {
    params: Vec<Param>,
}

impl HandlerSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a payload-typed parameter
    pub fn payload(self, name: impl Into<String>) -> Self {
        self.param(name, ParamType::Payload)
    }

    /// Declare a text-typed parameter
    pub fn text(self, name: impl Into<String>) -> Self {
        self.param(name, ParamType::Text)
    }

    /// Declare a parameter of some other type
    pub fn other(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.param(name, ParamType::Other(type_name.into()))
    }

    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Derive the binding plan for this signature
    pub fn inspect(&self) -> Result<BindingPlan, SignatureError> {
        inspect(self)
    }
}

/// Which parameter receives which part of a published event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPlan {
    payload_param: String,
    routing_key_param: Option<String>,
}

impl BindingPlan {
    pub fn payload_param(&self) -> &str {
        &self.payload_param
    }

    pub fn routing_key_param(&self) -> Option<&str> {
        self.routing_key_param.as_deref()
    }

    /// Number of arguments a bound call receives
    pub fn arity(&self) -> usize {
        1 + usize::from(self.routing_key_param.is_some())
    }
}

/// Classify a handler's parameters into a binding plan
pub fn inspect(signature: &HandlerSignature) -> Result<BindingPlan, SignatureError> {
    let mut payload_params = Vec::new();
    let mut text_params = Vec::new();
    let mut unsupported = None;

    for (index, param) in signature.params.iter().enumerate() {
        if signature.params[..index]
            .iter()
            .any(|earlier| earlier.name == param.name)
        {
            return Err(SignatureError::DuplicateParam {
                name: param.name.clone(),
            });
        }

        match &param.ty {
            ParamType::Payload => payload_params.push(param.name.clone()),
            ParamType::Text => text_params.push(param.name.clone()),
            ParamType::Other(type_name) => {
                unsupported.get_or_insert_with(|| SignatureError::UnsupportedParam {
                    name: param.name.clone(),
                    type_name: type_name.clone(),
                });
            }
        }
    }

    let payload_param = match payload_params.len() {
        0 => return Err(SignatureError::MissingPayloadParam),
        1 => payload_params.remove(0),
        _ => return Err(SignatureError::AmbiguousPayloadParam(payload_params)),
    };

    if text_params.len() > 1 {
        return Err(SignatureError::MultipleTextParams(text_params));
    }

    if let Some(err) = unsupported {
        return Err(err);
    }

    Ok(BindingPlan {
        payload_param,
        routing_key_param: text_params.pop(),
    })
}

/// Reasons a handler signature cannot be bound
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("You need one payload-typed function param")]
    MissingPayloadParam,

    #[error("Ambiguous payload binding: only one payload-typed function param allowed, found {0:?}")]
    AmbiguousPayloadParam(Vec<String>),

    #[error("You can only have one string-typed parameter for event name, found {0:?}")]
    MultipleTextParams(Vec<String>),

    #[error("Unsupported parameter '{name}' of type {type_name}")]
    UnsupportedParam { name: String, type_name: String },

    #[error("Parameter '{name}' is declared more than once")]
    DuplicateParam { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_payload_only() {
        let plan = inspect(&HandlerSignature::new().payload("event")).unwrap();

        assert_eq!(plan.payload_param(), "event");
        assert_eq!(plan.routing_key_param(), None);
        assert_eq!(plan.arity(), 1);
    }

    #[test]
    fn test_text_param_bound_by_name() {
        for name in ["event_name", "routing_key", "event_type"] {
            let plan = HandlerSignature::new()
                .text(name)
                .payload("event")
                .inspect()
                .unwrap();
            assert_eq!(plan.routing_key_param(), Some(name));
            assert_eq!(plan.arity(), 2);
        }
    }

    #[test]
    fn test_no_params() {
        let err = inspect(&HandlerSignature::new()).unwrap_err();
        assert_eq!(err, SignatureError::MissingPayloadParam);
        assert_eq!(err.to_string(), "You need one payload-typed function param");
    }

    #[test]
    fn test_wrong_param_type() {
        let err = inspect(&HandlerSignature::new().other("num", "int")).unwrap_err();
        assert_eq!(err, SignatureError::MissingPayloadParam);

        let err = inspect(&HandlerSignature::new().payload("event").other("num", "int"))
            .unwrap_err();
        assert_eq!(
            err,
            SignatureError::UnsupportedParam {
                name: "num".to_string(),
                type_name: "int".to_string(),
            }
        );
    }

    #[test]
    fn test_text_only_is_missing_payload() {
        let err = inspect(&HandlerSignature::new().text("event_name")).unwrap_err();
        assert_eq!(err, SignatureError::MissingPayloadParam);
    }

    #[test]
    fn test_two_payload_params() {
        let err = inspect(&HandlerSignature::new().payload("a").payload("b")).unwrap_err();
        assert_eq!(
            err,
            SignatureError::AmbiguousPayloadParam(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_multiple_text_params() {
        let err = inspect(
            &HandlerSignature::new()
                .text("event_name")
                .text("routing_key")
                .payload("event"),
        )
        .unwrap_err();

        assert!(err
            .to_string()
            .starts_with("You can only have one string-typed parameter for event name"));
    }

    #[test]
    fn test_duplicate_param_name() {
        let err = inspect(&HandlerSignature::new().text("event").payload("event")).unwrap_err();
        assert!(matches!(err, SignatureError::DuplicateParam { .. }));
    }

    fn arb_param_type() -> impl Strategy<Value = ParamType> {
        prop_oneof![
            Just(ParamType::Payload),
            Just(ParamType::Text),
            "[a-z]{1,6}".prop_map(ParamType::Other),
        ]
    }

    proptest! {
        #[test]
        fn inspection_accepts_exactly_valid_signatures(types in prop::collection::vec(arb_param_type(), 0..5)) {
            let signature = types
                .iter()
                .enumerate()
                .fold(HandlerSignature::new(), |sig, (i, ty)| sig.param(format!("p{i}"), ty.clone()));

            let payloads = types.iter().filter(|t| **t == ParamType::Payload).count();
            let texts = types.iter().filter(|t| **t == ParamType::Text).count();
            let others = types.len() - payloads - texts;
            let valid = payloads == 1 && texts <= 1 && others == 0;

            prop_assert_eq!(inspect(&signature).is_ok(), valid);
        }
    }
}
