use std::fmt::{self, Debug, Formatter};

use async_graphql_value::Variables;
use serde::{Deserialize, Serialize};

use crate::context::{CancellationToken, Data};

/// GraphQL request.
///
/// This can be deserialized from a structure of the query string, the
/// operation name and the variables. The names are all in `camelCase`
/// (e.g. `operationName`).
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The query source of the request.
    #[serde(default)]
    pub query: String,

    /// The operation name of the request.
    #[serde(default)]
    pub operation_name: Option<String>,

    /// The variables of the request.
    #[serde(default)]
    pub variables: Variables,

    /// The data of the request that resolvers can access through their
    /// context.
    ///
    /// **This data is only valid for this request**
    #[serde(skip)]
    pub data: Data,

    /// Cancels the request cooperatively; see
    /// [`CancellationToken`](crate::CancellationToken).
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

impl Request {
    /// Create a request object with query source.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Variables::default(),
            data: Data::default(),
            cancellation: CancellationToken::default(),
        }
    }

    /// Specify the operation name of the request.
    #[must_use]
    pub fn with_operation_name<T: Into<String>>(self, name: T) -> Self {
        Self {
            operation_name: Some(name.into()),
            ..self
        }
    }

    /// Specify the variables.
    #[must_use]
    pub fn variables(self, variables: Variables) -> Self {
        Self { variables, ..self }
    }

    /// Insert some data for this request.
    #[must_use]
    pub fn data<D: std::any::Any + Send + Sync>(mut self, data: D) -> Self {
        self.data.insert(data);
        self
    }

    /// Attach a cancellation token to the request.
    #[must_use]
    pub fn cancellation(self, cancellation: CancellationToken) -> Self {
        Self { cancellation, ..self }
    }
}

impl<T: Into<String>> From<T> for Request {
    fn from(query: T) -> Self {
        Self::new(query)
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("query", &self.query)
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request() {
        let request: Request = serde_json::from_value(serde_json::json!({
            "query": "{ a b c }"
        }))
        .unwrap();
        assert!(request.variables.is_empty());
        assert!(request.operation_name.is_none());
        assert_eq!(request.query, "{ a b c }");
    }

    #[test]
    fn test_request_with_operation_name() {
        let request: Request = serde_json::from_value(serde_json::json!({
            "query": "{ a b c }",
            "operationName": "a"
        }))
        .unwrap();
        assert_eq!(request.operation_name.as_deref(), Some("a"));
    }

    #[test]
    fn test_request_with_variables() {
        let request: Request = serde_json::from_value(serde_json::json!({
            "query": "{ a b c }",
            "variables": {
                "v1": 100,
                "v2": [1, 2, 3],
                "v3": "str",
            }
        }))
        .unwrap();
        assert_eq!(request.variables.len(), 3);
    }
}
