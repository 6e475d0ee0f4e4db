//! A resolver-driven GraphQL execution engine.
//!
//! The engine consumes a schema written in the schema definition language,
//! binds every reachable field to a caller-supplied [`Resolver`] entry and
//! executes parsed operations against it: selection flattening (fragments,
//! `@skip`/`@include`, `__typename`), bounded concurrent field resolution,
//! spec-compliant non-null propagation and error paths, cancellation and
//! panic recovery.
//!
//! ```no_run
//! use graphql_engine::{Resolver, Schema};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::build("type Query { hello: String }")
//!     .resolver("Query", "hello", Resolver::sync_fn(|_| Ok("world".into())))
//!     .finish()?;
//!
//! let response = schema.execute("{ hello }").await;
//! assert_eq!(serde_json::to_string(&response)?, r#"{"data":{"hello":"world"}}"#);
//! # Ok(())
//! # }
//! ```
//!
//! Query parsing is delegated to [`async_graphql_parser`], re-exported as
//! [`parser`]; values and variables come from [`async_graphql_value`].

mod context;
mod error;
mod limits;
mod path;
mod registry;
mod request;
mod resolver_utils;
mod resolvers;
mod response;
mod schema;
mod selection;
mod trace;

pub use async_graphql_parser as parser;
pub use async_graphql_value::{ConstValue, Name, Number, Variables};

pub use context::{CancellationToken, Data, QueryEnv, SchemaEnv};
pub use error::{
    DefaultPanicHandler, Error, ErrorExtensionValues, Location, PanicHandler, Result, SchemaError,
    ServerError, ServerResult,
};
pub use path::{PathSegment, ResponsePath};
pub use registry::{
    EnumType, InputObjectType, InterfaceType, MetaDirective, MetaEnumValue, MetaField,
    MetaFieldType, MetaInputValue, MetaType, MetaTypeName, ObjectType, Registry, ScalarKind,
    ScalarType, TypeDiscriminator, UnionType,
};
pub use request::Request;
pub use resolvers::{
    Directive, EventStream, ResolvedValue, Resolver, ResolverContext, ResolverFuture,
    ResolverResult, SelectedField,
};
pub use response::Response;
pub use schema::{Schema, SchemaBuilder};
pub use selection::{Selection, SchemaField, TypeAssertion, TypenameField};
pub use trace::{RequestSpan, ResolverSpan, GRAPHQL_SPAN_NAME, RESOLVER_SPAN_NAME};
