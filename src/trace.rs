//! Span builders for the request and per-resolver tracing.
//!
//! Diagnostics flow through the `tracing` ecosystem: subscribers are the
//! plug-in point for anything that wants to observe execution.

use tracing::{info_span, Span};

pub(crate) const GRAPHQL_TARGET: &str = "graphql_engine";

/// The name of the request span.
pub const GRAPHQL_SPAN_NAME: &str = "graphql";

/// The name of the span wrapping a single field resolution.
pub const RESOLVER_SPAN_NAME: &str = "resolver";

/// A span for one GraphQL request.
#[derive(Default)]
pub struct RequestSpan<'a> {
    operation_name: Option<&'a str>,
    operation_type: Option<&'a str>,
    document: Option<&'a str>,
}

impl<'a> RequestSpan<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the GraphQL document as an attribute of the span.
    pub fn with_document(mut self, document: impl Into<Option<&'a str>>) -> Self {
        self.document = document.into();
        self
    }

    /// Set the operation name as an attribute of the span.
    pub fn with_operation_name(mut self, operation_name: impl Into<Option<&'a str>>) -> Self {
        self.operation_name = operation_name.into();
        self
    }

    /// Set the operation type as an attribute of the span.
    pub fn with_operation_type(mut self, operation_type: impl Into<Option<&'a str>>) -> Self {
        self.operation_type = operation_type.into();
        self
    }

    /// Consume self and turn into a [Span].
    pub fn into_span(self) -> Span {
        info_span!(
            target: GRAPHQL_TARGET,
            GRAPHQL_SPAN_NAME,
            "gql.request.operation.name" = self.operation_name,
            "gql.request.operation.type" = self.operation_type,
            "gql.document" = self.document,
        )
    }
}

/// A span for a single field resolution.
pub struct ResolverSpan<'a> {
    label: &'a str,
}

impl<'a> ResolverSpan<'a> {
    pub fn new(label: &'a str) -> Self {
        Self { label }
    }

    pub fn into_span(self) -> Span {
        info_span!(
            target: GRAPHQL_TARGET,
            RESOLVER_SPAN_NAME,
            "gql.field" = self.label,
        )
    }
}
