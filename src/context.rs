//! Per-schema and per-request execution state.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_graphql_parser::types::OperationType;
use async_graphql_value::Variables;
use fnv::FnvHashMap;
use tokio::sync::Semaphore;

use crate::{
    error::{PanicHandler, ServerError},
    registry::Registry,
    resolvers::Directive,
};

/// Schema/request data.
///
/// This is a type map, allowing you to store anything inside it.
#[derive(Default)]
pub struct Data(FnvHashMap<TypeId, Box<dyn Any + Sync + Send>>);

impl Data {
    /// Insert data.
    pub fn insert<D: Any + Send + Sync>(&mut self, data: D) {
        self.0.insert(TypeId::of::<D>(), Box::new(data));
    }

    pub(crate) fn get<D: Any + Send + Sync>(&self) -> Option<&D> {
        self.0.get(&TypeId::of::<D>()).and_then(|d| d.downcast_ref())
    }
}

impl Debug for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Data").finish()
    }
}

/// Cooperative cancellation for one request.
///
/// The engine checks the token before every resolver invocation; in-flight
/// resolvers are not interrupted but their results are discarded once the
/// token has fired.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<CancellationInner>);

#[derive(Default)]
struct CancellationInner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn cancel_with(&self, reason: impl Into<String>) {
        *self.0.reason.lock().unwrap() = Some(reason.into());
        self.0.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// The cause reported in the response when the token fired.
    pub fn cause(&self) -> String {
        self.0
            .reason
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "the operation was cancelled".to_string())
    }
}

impl Debug for CancellationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[doc(hidden)]
pub struct SchemaEnvInner {
    pub registry: Registry,
    pub data: Data,
    pub(crate) panic_handler: Arc<dyn PanicHandler>,
    pub(crate) directives: HashMap<String, Arc<dyn Directive>>,
}

#[doc(hidden)]
#[derive(Clone)]
pub struct SchemaEnv(pub(crate) Arc<SchemaEnvInner>);

impl Deref for SchemaEnv {
    type Target = SchemaEnvInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[doc(hidden)]
pub struct QueryEnvInner {
    pub variables: Variables,
    pub operation_name: Option<String>,
    pub operation_type: OperationType,
    pub ctx_data: Arc<Data>,
    pub cancellation: CancellationToken,
    pub(crate) errors: Mutex<Vec<ServerError>>,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) max_parallelism: usize,
}

#[doc(hidden)]
#[derive(Clone)]
pub struct QueryEnv(Arc<QueryEnvInner>);

impl Deref for QueryEnv {
    type Target = QueryEnvInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl QueryEnv {
    pub fn new(inner: QueryEnvInner) -> QueryEnv {
        QueryEnv(Arc::new(inner))
    }

    /// Report an error against the response.
    ///
    /// Errors surface in completion order and are never deduplicated, so
    /// concurrent siblings may interleave; callers must not rely on position.
    pub fn add_error(&self, error: ServerError) {
        self.errors.lock().unwrap().push(error);
    }

    pub fn take_errors(&self) -> Vec<ServerError> {
        std::mem::take(&mut *self.errors.lock().unwrap())
    }
}

/// Borrowed view over both environments, threaded through execution.
#[derive(Clone, Copy)]
pub(crate) struct ExecutionContext<'a> {
    pub schema_env: &'a SchemaEnv,
    pub query_env: &'a QueryEnv,
}

impl<'a> ExecutionContext<'a> {
    pub fn registry(&self) -> &'a Registry {
        &self.schema_env.0.registry
    }

    pub fn add_error(&self, error: ServerError) {
        self.query_env.add_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_lookup_is_typed() {
        struct Counter(u32);
        let mut data = Data::default();
        data.insert(Counter(7));
        assert_eq!(data.get::<Counter>().unwrap().0, 7);
        assert!(data.get::<String>().is_none());
    }

    #[test]
    fn cancellation_carries_a_cause() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel_with("deadline exceeded");
        assert!(token.is_cancelled());
        assert_eq!(token.cause(), "deadline exceeded");
    }

    #[test]
    fn cancellation_default_cause() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.cause(), "the operation was cancelled");
    }
}
