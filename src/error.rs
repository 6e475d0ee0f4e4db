use std::{
    any::Any,
    collections::BTreeMap,
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

use async_graphql_parser::Pos;
use serde::Serialize;

use crate::path::PathSegment;

/// Alias for `Result<T, ServerError>`.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// An alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A source location inside the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl From<Pos> for Location {
    fn from(pos: Pos) -> Self {
        Self {
            line: pos.line,
            column: pos.column,
        }
    }
}

/// Values attached to an error under the `extensions` response key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorExtensionValues(pub(crate) BTreeMap<String, serde_json::Value>);

impl ErrorExtensionValues {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }
}

fn error_extensions_is_empty(values: &Option<ErrorExtensionValues>) -> bool {
    values.as_ref().map_or(true, |values| values.0.is_empty())
}

/// An error produced while resolving a field.
///
/// This is what resolvers return. The engine converts it into a
/// [`ServerError`] with the response position and path filled in.
#[derive(Clone, Serialize)]
pub struct Error {
    /// The error message.
    pub message: String,
    /// The source of the error, kept so callers can downcast the original
    /// resolver error out of the response.
    #[serde(skip)]
    pub source: Option<Arc<dyn Any + Send + Sync>>,
    /// Extensions to the error.
    #[serde(skip_serializing_if = "error_extensions_is_empty")]
    pub extensions: Option<ErrorExtensionValues>,
}

impl Error {
    /// Create an error from the given error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            extensions: None,
        }
    }

    /// Create an error with a type that implements `Display`, and it will also
    /// set the `source` of the error to this value.
    pub fn new_with_source(source: impl Display + Send + Sync + 'static) -> Self {
        Self {
            message: source.to_string(),
            source: Some(Arc::new(source)),
            extensions: None,
        }
    }

    /// Attach an extension value to the error.
    #[must_use]
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extensions
            .get_or_insert_with(Default::default)
            .set(name, value);
        self
    }

    /// Convert the error to a server error.
    #[must_use]
    pub fn into_server_error(self, pos: Pos) -> ServerError {
        ServerError {
            message: self.message,
            source: self.source,
            locations: vec![pos.into()],
            path: Vec::new(),
            extensions: self.extensions,
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("message", &self.message)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.message.eq(&other.message) && self.extensions.eq(&other.extensions)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::new(value.to_string())
    }
}

impl From<ServerError> for Error {
    fn from(value: ServerError) -> Self {
        Self {
            message: value.message,
            source: value.source,
            extensions: value.extensions,
        }
    }
}

/// An error that appears in the `errors` array of a response.
#[derive(Clone, Serialize)]
pub struct ServerError {
    /// The error message.
    pub message: String,
    /// The original resolver error, when there was one.
    #[serde(skip)]
    pub source: Option<Arc<dyn Any + Send + Sync>>,
    /// Where the error occurred in the query.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    /// The response path to the field that errored.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    /// Extensions to the error.
    #[serde(skip_serializing_if = "error_extensions_is_empty")]
    pub extensions: Option<ErrorExtensionValues>,
}

impl ServerError {
    pub fn new(message: impl Into<String>, pos: Option<Pos>) -> Self {
        Self {
            message: message.into(),
            source: None,
            locations: pos.map(|pos| vec![pos.into()]).unwrap_or_default(),
            path: Vec::new(),
            extensions: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Downcast the original resolver error, if any.
    pub fn source<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.source.as_ref().and_then(|err| err.downcast_ref())
    }
}

impl Debug for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerError")
            .field("message", &self.message)
            .field("locations", &self.locations)
            .field("path", &self.path)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ServerError {
    fn eq(&self, other: &Self) -> bool {
        self.message.eq(&other.message)
            && self.locations.eq(&other.locations)
            && self.path.eq(&other.path)
            && self.extensions.eq(&other.extensions)
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ServerError {}

impl From<Error> for ServerError {
    fn from(value: Error) -> Self {
        Self {
            message: value.message,
            source: value.source,
            locations: Vec::new(),
            path: Vec::new(),
            extensions: value.extensions,
        }
    }
}

/// Converts a panic payload into the error reported for the panicking field.
///
/// The default handler exposes string payloads verbatim. Installations that
/// consider panic messages sensitive can plug their own handler in via
/// [`SchemaBuilder::panic_handler`](crate::SchemaBuilder::panic_handler).
pub trait PanicHandler: Send + Sync + 'static {
    fn make_panic_error(&self, payload: &(dyn Any + Send)) -> Error;
}

pub struct DefaultPanicHandler;

impl PanicHandler for DefaultPanicHandler {
    fn make_panic_error(&self, payload: &(dyn Any + Send)) -> Error {
        let message = payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| payload.downcast_ref::<&str>().copied())
            .unwrap_or("internal system error");
        Error::new(format!("panic occurred: {message}"))
    }
}

/// An error raised while building a [`Schema`](crate::Schema).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// The schema definition language input did not parse.
    #[error("schema parse error: {0}")]
    Parse(String),

    /// A root operation type is missing or is not an object type.
    #[error("root operation {0:?} must be an OBJECT")]
    InvalidRootOperation(String),

    /// The mandatory query root is missing.
    #[error("root operation \"query\" must be defined")]
    MissingQueryRoot,

    /// A field of a reachable output type has no resolver bound to it.
    #[error("no resolver bound for {type_name}.{field_name}")]
    MissingResolver { type_name: String, field_name: String },

    /// A subscription root field was bound to a non-subscription resolver.
    #[error("{type_name}.{field_name} must be bound to a subscription resolver")]
    NotASubscriptionResolver { type_name: String, field_name: String },

    /// A subscription resolver was bound outside the subscription root.
    #[error("{type_name}.{field_name}: subscription resolvers are only valid on the subscription root")]
    MisplacedSubscriptionResolver { type_name: String, field_name: String },

    /// A resolver or discriminator was registered against an unknown type or field.
    #[error("unknown schema member: {0}")]
    UnknownMember(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_serializes_in_response_field_order() {
        let mut err = ServerError::new("boom", Some(Pos { line: 2, column: 7 }));
        err.path = vec![PathSegment::Field("user".into()), PathSegment::Index(0)];
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "boom",
                "locations": [{"line": 2, "column": 7}],
                "path": ["user", 0],
            })
        );
    }

    #[test]
    fn empty_extensions_are_omitted() {
        let err = ServerError::new("boom", None);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"message": "boom"}));
    }

    #[test]
    fn extension_values_survive_conversion() {
        let err = Error::new("denied").with_extension("code", "FORBIDDEN");
        let server_error = err.into_server_error(Pos::default());
        assert_eq!(
            server_error.extensions.unwrap().get("code"),
            Some(&serde_json::json!("FORBIDDEN"))
        );
    }

    #[test]
    fn default_panic_handler_exposes_string_payloads() {
        let handler = DefaultPanicHandler;
        let payload: Box<dyn Any + Send> = Box::new("kaboom".to_string());
        let err = handler.make_panic_error(payload.as_ref());
        assert_eq!(err.message, "panic occurred: kaboom");
    }
}
