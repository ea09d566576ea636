//! Handler and method descriptors, built once at startup.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ErrorCode, GatewayError};
use crate::handler::{Handler, ScopedHandler};
use crate::Result;

/// Path pattern that admits calls from any path.
pub const ANY_PATH: &str = "*";

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Any,
    List(Box<ParamType>),
}

impl ParamType {
    /// A list of `element`.
    pub fn list(element: ParamType) -> Self {
        Self::List(Box::new(element))
    }

    /// Element type if this is a collection.
    pub fn element(&self) -> Option<&ParamType> {
        match self {
            Self::List(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Boolean => f.write_str("boolean"),
            Self::Object => f.write_str("object"),
            Self::Any => f.write_str("any"),
            Self::List(inner) => write!(f, "list<{}>", inner),
        }
    }
}

/// Validation rule attached to a parameter.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Present and not only whitespace.
    NotBlank,
    /// Character count of a string or element count of a list.
    Length { min: Option<usize>, max: Option<usize> },
    /// Numeric bounds, inclusive.
    Range { min: Option<f64>, max: Option<f64> },
    /// String must match the whole pattern.
    Pattern(Regex),
    /// String must look like an email address.
    Email,
}

impl Constraint {
    /// Build a pattern constraint anchored at both ends.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(&format!("^(?:{})$", pattern))
            .map(Self::Pattern)
            .map_err(|e| GatewayError::Registration(e.to_string()))
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub constraints: Vec<Constraint>,
}

impl ParamSpec {
    /// An optional parameter.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            constraints: Vec::new(),
        }
    }

    /// Mark the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a validation rule.
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Whether the parameter is a collection.
    pub fn is_collection(&self) -> bool {
        self.ty.element().is_some()
    }
}

/// One callable method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ParamSpec>,
    /// Run the validator before invoking.
    pub validate: bool,
    /// Calls must arrive encrypted when encryption is enforced.
    pub encrypt: bool,
    /// Code reported for validation failures.
    pub failure_code: ErrorCode,
}

impl MethodDescriptor {
    /// A method with no parameters that expects encrypted calls.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            validate: false,
            encrypt: true,
            failure_code: ErrorCode::ValidationFailed,
        }
    }

    /// Append a parameter.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Enable validation.
    pub fn validated(mut self) -> Self {
        self.validate = true;
        self
    }

    /// Accept plain calls even when encryption is enforced.
    pub fn unencrypted(mut self) -> Self {
        self.encrypt = false;
        self
    }

    /// Override the code reported on validation failure.
    pub fn failure_code(mut self, code: ErrorCode) -> Self {
        self.failure_code = code;
        self
    }

    /// Parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the method takes no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Creates a fresh handler instance per call.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// A handler group under a namespace and action.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub namespace: String,
    pub action: String,
    pub paths: Vec<String>,
    pub requires_session: bool,
    pub methods: Vec<MethodDescriptor>,
    factory: HandlerFactory,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("namespace", &self.namespace)
            .field("action", &self.action)
            .field("paths", &self.paths)
            .field("requires_session", &self.requires_session)
            .field("methods", &self.methods.iter().map(|m| &m.name).collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerDescriptor {
    /// Create a descriptor whose instances come from `factory`.
    pub fn new<F>(namespace: impl Into<String>, action: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Handler> + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.into(),
            action: action.into(),
            paths: Vec::new(),
            requires_session: false,
            methods: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    /// Allow calls arriving on paths starting with `path`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Allow calls from any path.
    pub fn any_path(self) -> Self {
        self.path(ANY_PATH)
    }

    /// Require an active HTTP session.
    pub fn requires_session(mut self) -> Self {
        self.requires_session = true;
        self
    }

    /// Add a method.
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Find a method by exact name.
    pub fn find_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Whether a call arriving on `source_path` may reach this handler.
    ///
    /// A declared path matches at the start of `source_path`, or just after
    /// its first character so that `api` matches `/api`.
    pub fn allows_path(&self, source_path: &str) -> bool {
        self.paths.iter().any(|path| {
            path == ANY_PATH
                || source_path.starts_with(path.as_str())
                || source_path
                    .get(1..)
                    .map_or(false, |rest| rest.starts_with(path.as_str()))
        })
    }

    /// Create a scoped handler instance.
    pub fn acquire(&self) -> ScopedHandler {
        ScopedHandler::new((self.factory)())
    }
}

/// Read-only table of registered handlers.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerDescriptor>,
    index: HashMap<(String, String), usize>,
}

impl HandlerRegistry {
    /// Start building a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Look up a handler by exact namespace and action.
    pub fn resolve(&self, namespace: &str, action: &str) -> Option<&HandlerDescriptor> {
        self.index
            .get(&(namespace.to_string(), action.to_string()))
            .map(|&i| &self.handlers[i])
    }

    /// All handlers in registration order.
    pub fn handlers(&self) -> &[HandlerDescriptor] {
        &self.handlers
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collects descriptors and checks them once.
#[derive(Debug, Default)]
pub struct HandlerRegistryBuilder {
    handlers: Vec<HandlerDescriptor>,
}

impl HandlerRegistryBuilder {
    /// Add a handler.
    pub fn register(mut self, handler: HandlerDescriptor) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build the registry.
    ///
    /// Fails on duplicate (namespace, action) pairs, duplicate method names
    /// within a handler, and handlers with no allowed path.
    pub fn build(self) -> Result<HandlerRegistry> {
        let mut errors = Vec::new();
        let mut index = HashMap::new();

        for (i, handler) in self.handlers.iter().enumerate() {
            let key = (handler.namespace.clone(), handler.action.clone());
            if index.insert(key, i).is_some() {
                errors.push(format!(
                    "duplicate handler {}.{}",
                    handler.namespace, handler.action
                ));
            }
            if handler.paths.is_empty() {
                errors.push(format!(
                    "handler {}.{} declares no paths",
                    handler.namespace, handler.action
                ));
            }

            let mut names = HashSet::new();
            for method in &handler.methods {
                if !names.insert(method.name.as_str()) {
                    errors.push(format!(
                        "duplicate method {}.{}.{}",
                        handler.namespace, handler.action, method.name
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(GatewayError::Registration(errors.join("; ")));
        }

        for handler in &self.handlers {
            debug!(
                "Registered {}.{} ({} methods)",
                handler.namespace,
                handler.action,
                handler.methods.len()
            );
        }

        Ok(HandlerRegistry {
            handlers: self.handlers,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Arguments, CallContext, Reply};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn invoke(&mut self, _method: &str, _args: Arguments, _ctx: &CallContext) -> Result<Reply> {
            Ok(Reply::Empty)
        }
    }

    fn noop(namespace: &str, action: &str) -> HandlerDescriptor {
        HandlerDescriptor::new(namespace, action, || Box::new(Noop) as Box<dyn Handler>)
    }

    #[test]
    fn test_resolve_exact() {
        let registry = HandlerRegistry::builder()
            .register(noop("N", "Demo").any_path().method(MethodDescriptor::new("hello")))
            .build()
            .unwrap();

        assert!(registry.resolve("N", "Demo").is_some());
        assert!(registry.resolve("N", "demo").is_none());
        assert!(registry.resolve("M", "Demo").is_none());

        let handler = registry.resolve("N", "Demo").unwrap();
        assert!(handler.find_method("hello").is_some());
        assert!(handler.find_method("Hello").is_none());
    }

    #[test]
    fn test_path_matching() {
        let handler = noop("N", "A").path("api");
        assert!(handler.allows_path("/api"));
        assert!(handler.allows_path("api/v1"));
        assert!(!handler.allows_path("/socket"));
        assert!(!handler.allows_path("//api"));

        assert!(noop("N", "A").any_path().allows_path("/anything"));
        assert!(!noop("N", "A").allows_path("/api"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = HandlerRegistry::builder()
            .register(noop("N", "A").any_path())
            .register(noop("N", "A").any_path())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate handler N.A"));

        let err = HandlerRegistry::builder()
            .register(
                noop("N", "B")
                    .any_path()
                    .method(MethodDescriptor::new("m"))
                    .method(MethodDescriptor::new("m")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate method N.B.m"));
    }

    #[test]
    fn test_handler_without_paths_rejected() {
        let err = HandlerRegistry::builder()
            .register(noop("N", "A"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declares no paths"));
    }

    #[test]
    fn test_method_builder() {
        let method = MethodDescriptor::new("save")
            .param(ParamSpec::new("name", ParamType::String).required())
            .param(ParamSpec::new("tags", ParamType::list(ParamType::String)))
            .validated()
            .unencrypted();
        assert_eq!(method.len(), 2);
        assert!(method.params[0].required);
        assert!(method.params[1].is_collection());
        assert!(method.validate);
        assert!(!method.encrypt);
        assert_eq!(method.failure_code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_pattern_is_anchored() {
        let Constraint::Pattern(re) = Constraint::pattern("[a-z]+").unwrap() else {
            panic!("expected pattern");
        };
        assert!(re.is_match("abc"));
        assert!(!re.is_match("abc1"));
        assert!(Constraint::pattern("(").is_err());
    }
}
