//! Resolver entries and the values they exchange.
//!
//! Every reachable schema field is bound to exactly one [`Resolver`] when the
//! schema is built. The engine never inspects resolver internals at
//! execution time; it just invokes the bound entry.

use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use async_graphql_value::{ConstValue, Name, Variables};
use futures_util::{future::BoxFuture, stream::BoxStream};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    context::{QueryEnv, SchemaEnv},
    error::{Error, Result},
    path::{PathSegment, ResponsePath},
};

pub type ResolverResult = Result<Value>;
pub type ResolverFuture = BoxFuture<'static, ResolverResult>;
/// The stream of events produced by a subscription root field.
pub type EventStream = BoxStream<'static, ResolverResult>;

type BoxSyncResolver = dyn Fn(&ResolverContext) -> ResolverResult + Send + Sync;
type BoxAsyncResolver = dyn Fn(ResolverContext) -> ResolverFuture + Send + Sync;
type BoxSubscriptionResolver = dyn Fn(ResolverContext) -> Result<EventStream> + Send + Sync;

/// How a schema field obtains its value.
#[derive(Clone)]
pub enum Resolver {
    /// Pass the parent resolver value through untouched. Some fields just
    /// hand their parent's data down to their children.
    Parent,
    /// Read the named key off the parent object.
    Property(String),
    /// A synchronous callable. Runs inline, never counts against the limiter.
    Sync(Arc<BoxSyncResolver>),
    /// A callable returning a future. May block on I/O, so each invocation
    /// takes a limiter permit first.
    Async(Arc<BoxAsyncResolver>),
    /// A callable producing the event stream for a subscription root field.
    Subscription(Arc<BoxSubscriptionResolver>),
    /// Marker for synthesized `__typename` entries; the value is fixed at
    /// field-collection time.
    Typename,
}

impl Resolver {
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(&ResolverContext) -> ResolverResult + Send + Sync + 'static,
    {
        Resolver::Sync(Arc::new(f))
    }

    pub fn async_fn<F>(f: F) -> Self
    where
        F: Fn(ResolverContext) -> ResolverFuture + Send + Sync + 'static,
    {
        Resolver::Async(Arc::new(f))
    }

    pub fn subscription_fn<F>(f: F) -> Self
    where
        F: Fn(ResolverContext) -> Result<EventStream> + Send + Sync + 'static,
    {
        Resolver::Subscription(Arc::new(f))
    }

    /// Whether invoking this entry may suspend.
    pub fn is_async(&self) -> bool {
        matches!(self, Resolver::Async(_))
    }
}

impl Debug for Resolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Parent => f.write_str("Parent"),
            Resolver::Property(key) => f.debug_tuple("Property").field(key).finish(),
            Resolver::Sync(_) => f.write_str("Sync(..)"),
            Resolver::Async(_) => f.write_str("Async(..)"),
            Resolver::Subscription(_) => f.write_str("Subscription(..)"),
            Resolver::Typename => f.write_str("Typename"),
        }
    }
}

/// A value passed between resolvers.
///
/// Holds the root of the JSON blob that produced it plus a path into that
/// blob, so taking a sub-view (for `Parent`/`Property` resolvers and list
/// elements) never clones the underlying data.
#[derive(Debug, Clone)]
pub struct ResolvedValue {
    data_root: Arc<Value>,
    data_path: Vec<PathSegment>,
}

impl ResolvedValue {
    pub fn new(value: Value) -> Self {
        Self {
            data_root: Arc::new(value),
            data_path: Vec::new(),
        }
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn data_resolved(&self) -> &Value {
        self.data_path.iter().fold(self.data_root.as_ref(), |value, segment| {
            match segment {
                PathSegment::Field(field) => value.get(field.as_str()),
                PathSegment::Index(index) => value.get(*index),
            }
            .expect("data_path to be validated before ResolvedValue construction")
        })
    }

    pub fn is_null(&self) -> bool {
        self.data_resolved().is_null()
    }

    /// Returns a new ResolvedValue pointing at the given field, assuming this
    /// is an object and the field exists.
    pub fn get_field(&self, name: &str) -> Option<ResolvedValue> {
        self.data_resolved().get(name)?;

        let mut data_path = self.data_path.clone();
        data_path.push(PathSegment::Field(name.to_string()));

        Some(ResolvedValue {
            data_root: Arc::clone(&self.data_root),
            data_path,
        })
    }

    /// Returns a new ResolvedValue pointing at the given index, assuming this
    /// is a list and the index exists.
    pub fn get_index(&self, index: usize) -> Option<ResolvedValue> {
        self.data_resolved().get(index)?;

        let mut data_path = self.data_path.clone();
        data_path.push(PathSegment::Index(index));

        Some(ResolvedValue {
            data_root: Arc::clone(&self.data_root),
            data_path,
        })
    }

    /// If this ResolvedValue is an array, returns an iterator of its items.
    pub fn item_iter(&self) -> Option<impl Iterator<Item = ResolvedValue> + '_> {
        match self.data_resolved() {
            Value::Array(array) => Some((0..array.len()).map(|index| {
                let mut data_path = self.data_path.clone();
                data_path.push(PathSegment::Index(index));

                ResolvedValue {
                    data_root: Arc::clone(&self.data_root),
                    data_path,
                }
            })),
            _ => None,
        }
    }

    /// Takes the inner value.
    ///
    /// If possible this avoids cloning, but if we're not the sole owner of
    /// the root it clones the viewed portion.
    pub fn take(mut self) -> Value {
        match Arc::try_unwrap(self.data_root) {
            Ok(value) => self.data_path.iter().fold(value, |mut value, segment| match segment {
                PathSegment::Field(field) => {
                    value.get_mut(field.as_str()).expect("data_path to be validated").take()
                }
                PathSegment::Index(index) => {
                    value.get_mut(*index).expect("data_path to be validated").take()
                }
            }),
            Err(arc) => {
                self.data_root = arc;
                self.data_resolved().clone()
            }
        }
    }
}

impl Default for ResolvedValue {
    fn default() -> Self {
        Self::null()
    }
}

/// A field requested below the one currently being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedField {
    pub name: String,
    pub alias: String,
}

/// Everything a resolver gets to see about the invocation.
///
/// Cheap to clone; owning variants of the request state are shared behind
/// `Arc`s so the context can move into spawned futures.
#[derive(Clone)]
pub struct ResolverContext {
    pub(crate) schema_env: SchemaEnv,
    pub(crate) query_env: QueryEnv,
    pub(crate) field_name: String,
    pub(crate) parent: ResolvedValue,
    pub(crate) arguments: Arc<IndexMap<Name, ConstValue>>,
    pub(crate) path: ResponsePath,
    pub(crate) selected: Arc<Vec<SelectedField>>,
}

impl ResolverContext {
    /// The arguments of the current field, coerced against their declared
    /// types.
    pub fn args(&self) -> &IndexMap<Name, ConstValue> {
        &self.arguments
    }

    /// Deserialize the named argument.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        match self.arg_opt(name)? {
            Some(value) => Ok(value),
            None => Err(Error::new(format!(
                "missing argument \"{name}\" on field \"{}\"",
                self.field_name
            ))),
        }
    }

    /// Deserialize the named argument if it was provided.
    pub fn arg_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let Some(value) = self.arguments.get(name) else {
            return Ok(None);
        };
        let json = value.clone().into_json()?;
        Ok(Some(serde_json::from_value(json)?))
    }

    /// The parent resolver value this field hangs off.
    pub fn parent(&self) -> &ResolvedValue {
        &self.parent
    }

    pub fn parent_value(&self) -> &Value {
        self.parent.data_resolved()
    }

    /// The schema field name being resolved.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The response path of the field being resolved.
    pub fn path(&self) -> &ResponsePath {
        &self.path
    }

    /// The fields selected below this one, in query order.
    pub fn selected_fields(&self) -> &[SelectedField] {
        &self.selected
    }

    pub fn variables(&self) -> &Variables {
        &self.query_env.variables
    }

    /// Gets the data of the given type, request data first, then schema data.
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the specified type data does not exist.
    pub fn data<D: Any + Send + Sync>(&self) -> Result<&D> {
        self.data_opt::<D>()
            .ok_or_else(|| Error::new(format!("Data `{}` does not exist.", std::any::type_name::<D>())))
    }

    /// Gets the data of the given type or `None` if it does not exist.
    pub fn data_opt<D: Any + Send + Sync>(&self) -> Option<&D> {
        self.query_env
            .ctx_data
            .get::<D>()
            .or_else(|| self.schema_env.data.get::<D>())
    }
}

impl Debug for ResolverContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverContext")
            .field("field_name", &self.field_name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Implementation of a schema field directive.
///
/// When a field definition carries a directive with a matching name, the
/// implementation gets to transform the resolved value before serialization.
pub trait Directive: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn resolve(
        &self,
        ctx: &ResolverContext,
        args: &IndexMap<Name, ConstValue>,
        value: Value,
    ) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_resolved_value_array() {
        let data = ResolvedValue::new(json!(["hello", "there"]));
        assert_eq!(data.get_index(0).unwrap().data_resolved(), &json!("hello"));
        assert_eq!(data.get_index(1).unwrap().data_resolved(), &json!("there"));
        assert!(data.get_index(2).is_none());

        assert!(data.get_field("1").is_none());

        assert_eq!(data.get_index(0).unwrap().take(), json!("hello"));

        assert_eq!(
            data.item_iter().unwrap().map(ResolvedValue::take).collect::<Vec<_>>(),
            vec![json!("hello"), json!("there")]
        );
    }

    #[test]
    fn test_resolved_value_object() {
        let data = ResolvedValue::new(json!({"a": "hello", "b": "there"}));
        assert_eq!(data.get_field("a").unwrap().data_resolved(), &json!("hello"));
        assert_eq!(data.get_field("b").unwrap().data_resolved(), &json!("there"));
        assert!(data.get_field("c").is_none());

        assert!(data.get_index(1).is_none());

        assert_eq!(data.get_field("a").unwrap().take(), json!("hello"));
    }

    #[test]
    fn test_resolved_value_scalar() {
        let data = ResolvedValue::new(json!(true));

        assert!(data.get_index(0).is_none());
        assert!(data.get_field("hello").is_none());

        assert_eq!(data.data_resolved(), &json!(true));
        assert_eq!(data.take(), json!(true));
    }
}
