//! Typed pattern sets and the per-worker handler registry.
//!
//! A worker declares its operations with [`define_patterns!`] and builds a
//! [`PatternRegistry`] through [`PatternRegistryBuilder`]. `build()` refuses to
//! produce a registry while any declared pattern lacks a handler, so the
//! runtime `UnknownPattern` reply only ever fires for callers speaking a
//! different version of the pattern set.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{DomainError, MeshError, Result};

/// What a handler produces: a payload or a business failure
pub type HandlerResult = std::result::Result<serde_json::Value, DomainError>;

/// A closed set of message patterns exposed by one worker
pub trait Pattern: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every variant, used for the startup exhaustiveness check
    const ALL: &'static [Self];

    /// Wire key, e.g. `"center.create"`
    fn as_str(&self) -> &'static str;

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == key)
    }
}

/// Declare a pattern enum and its wire keys.
///
/// ```rust
/// centermesh::define_patterns! {
///     pub enum CenterPattern {
///         Create => "center.create",
///         Get => "center.get",
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_patterns {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $key:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $crate::pattern::Pattern for $name {
            const ALL: &'static [Self] = &[$( Self::$variant ),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $key ),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::pattern::Pattern::as_str(self))
            }
        }
    };
}

/// Trait for implementing pattern handlers
#[async_trait]
pub trait PatternHandler: Send + Sync {
    /// Handle the payload of one request envelope
    async fn handle(&self, payload: serde_json::Value) -> HandlerResult;

    /// Get handler name for debugging
    fn name(&self) -> &'static str {
        "PatternHandler"
    }
}

/// Handler over raw JSON payloads
pub struct FunctionHandler<F> {
    handler: F,
}

impl<F> FunctionHandler<F> {
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> PatternHandler for FunctionHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, payload: serde_json::Value) -> HandlerResult {
        (self.handler)(payload).await
    }

    fn name(&self) -> &'static str {
        "FunctionHandler"
    }
}

/// Handler that decodes its payload into `T` and encodes its result.
///
/// A payload that does not decode is answered with an `Invalid` domain error.
pub struct JsonHandler<F, T> {
    handler: F,
    _payload: PhantomData<fn(T)>,
}

impl<F, T> JsonHandler<F, T> {
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, T, R> PatternHandler for JsonHandler<F, T>
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<R, DomainError>> + Send,
    T: DeserializeOwned + Send,
    R: Serialize,
{
    async fn handle(&self, payload: serde_json::Value) -> HandlerResult {
        let input: T = serde_json::from_value(payload)
            .map_err(|e| DomainError::invalid(format!("Invalid payload: {}", e)))?;
        let output = (self.handler)(input).await?;
        serde_json::to_value(output)
            .map_err(|e| DomainError::new("Internal", format!("Unserializable result: {}", e)))
    }

    fn name(&self) -> &'static str {
        "JsonHandler"
    }
}

/// Read-only pattern -> handler table of one worker
#[derive(Clone)]
pub struct PatternRegistry {
    handlers: HashMap<&'static str, Arc<dyn PatternHandler>>,
}

impl PatternRegistry {
    pub fn builder<P: Pattern>() -> PatternRegistryBuilder<P> {
        PatternRegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    pub fn get(&self, pattern: &str) -> Option<Arc<dyn PatternHandler>> {
        self.handlers.get(pattern).cloned()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.handlers.contains_key(pattern)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut patterns: Vec<_> = self.patterns().collect();
        patterns.sort_unstable();
        f.debug_struct("PatternRegistry")
            .field("patterns", &patterns)
            .finish()
    }
}

/// Collects handlers for every variant of `P`
pub struct PatternRegistryBuilder<P: Pattern> {
    handlers: HashMap<P, Arc<dyn PatternHandler>>,
}

impl<P: Pattern> PatternRegistryBuilder<P> {
    /// Register an RPC handler for a specific pattern
    pub fn handler<H>(mut self, pattern: P, handler: H) -> Self
    where
        H: PatternHandler + 'static,
    {
        if self.handlers.insert(pattern, Arc::new(handler)).is_some() {
            warn!("Replacing handler for pattern: {}", pattern.as_str());
        }
        self
    }

    /// Register a function over raw JSON payloads
    pub fn function<F, Fut>(self, pattern: P, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler(pattern, FunctionHandler::new(handler))
    }

    /// Register a function over a typed payload
    pub fn json<F, Fut, T, R>(self, pattern: P, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, DomainError>> + Send + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
    {
        self.handler(pattern, JsonHandler::new(handler))
    }

    /// Freeze the table, failing if a wire key repeats or any declared
    /// pattern has no handler
    pub fn build(self) -> Result<PatternRegistry> {
        let mut keys = HashSet::new();
        if let Some(pattern) = P::ALL.iter().find(|p| !keys.insert(p.as_str())) {
            return Err(MeshError::DuplicatePattern {
                pattern: pattern.as_str().to_string(),
            });
        }

        let missing: Vec<String> = P::ALL
            .iter()
            .filter(|p| !self.handlers.contains_key(p))
            .map(|p| p.as_str().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MeshError::MissingHandlers { patterns: missing });
        }

        let handlers = self
            .handlers
            .into_iter()
            .map(|(pattern, handler)| {
                info!("Registered handler for pattern: {}", pattern.as_str());
                (pattern.as_str(), handler)
            })
            .collect();
        Ok(PatternRegistry { handlers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    define_patterns! {
        enum DemoPattern {
            Echo => "demo.echo",
            Add => "demo.add",
        }
    }

    #[derive(Deserialize)]
    struct AddRequest {
        a: i64,
        b: i64,
    }

    fn registry() -> PatternRegistry {
        PatternRegistry::builder::<DemoPattern>()
            .function(DemoPattern::Echo, |payload| async move { Ok(payload) })
            .json(DemoPattern::Add, |req: AddRequest| async move { Ok(req.a + req.b) })
            .build()
            .unwrap()
    }

    #[test]
    fn test_pattern_keys() {
        assert_eq!(DemoPattern::Echo.as_str(), "demo.echo");
        assert_eq!(DemoPattern::Add.to_string(), "demo.add");
        assert_eq!(DemoPattern::from_key("demo.add"), Some(DemoPattern::Add));
        assert_eq!(DemoPattern::from_key("demo.sub"), None);
        assert_eq!(DemoPattern::ALL.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_and_invoke() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("demo.echo"));
        assert!(registry.get("demo.sub").is_none());

        let add = registry.get("demo.add").unwrap();
        assert_eq!(add.handle(json!({"a": 2, "b": 3})).await, Ok(json!(5)));
        assert_eq!(add.name(), "JsonHandler");
    }

    #[tokio::test]
    async fn test_bad_payload_is_invalid_domain_error() {
        let registry = registry();
        let add = registry.get("demo.add").unwrap();

        let err = add.handle(json!("not an object")).await.unwrap_err();
        assert!(err.is(DomainError::INVALID));
    }

    #[test]
    fn test_build_rejects_missing_handlers() {
        let result = PatternRegistry::builder::<DemoPattern>()
            .function(DemoPattern::Echo, |payload| async move { Ok(payload) })
            .build();

        match result {
            Err(MeshError::MissingHandlers { patterns }) => assert_eq!(patterns, vec!["demo.add"]),
            other => panic!("expected missing handlers, got {:?}", other),
        }
    }

    define_patterns! {
        enum ClashingPattern {
            Create => "user.create",
            CreateAgain => "user.create",
        }
    }

    #[test]
    fn test_build_rejects_repeated_keys() {
        let result = PatternRegistry::builder::<ClashingPattern>()
            .function(ClashingPattern::Create, |payload| async move { Ok(payload) })
            .function(ClashingPattern::CreateAgain, |_| async move { Ok(json!("again")) })
            .build();

        match result {
            Err(MeshError::DuplicatePattern { pattern }) => assert_eq!(pattern, "user.create"),
            other => panic!("expected duplicate pattern, got {:?}", other),
        }
    }
}
