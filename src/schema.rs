//! The schema façade: builder-time binding of resolvers and the `execute` /
//! `subscribe` entry points.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_graphql_parser::{
    parse_query,
    types::{DocumentOperations, ExecutableDocument, OperationDefinition, OperationType},
    Positioned,
};
use async_graphql_value::Variables;
use futures_util::{future, stream, stream::BoxStream, StreamExt};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::{
    context::{CancellationToken, Data, ExecutionContext, QueryEnv, QueryEnvInner, SchemaEnv, SchemaEnvInner},
    error::{DefaultPanicHandler, Error, PanicHandler, SchemaError, ServerError, ServerResult},
    limits,
    path::ResponsePath,
    registry::{build_registry, BindConfig, Registry, TypeDiscriminator},
    request::Request,
    resolver_utils::{self, resolve_container, resolve_output, resolved_to_null},
    resolvers::{ResolvedValue, Resolver, ResolverContext},
    response::Response,
    selection::{apply_operation, ApplyContext, SchemaField, Selection},
    trace::RequestSpan,
};

type IntrospectionFilter = Arc<dyn Fn(&Data) -> bool + Send + Sync>;

struct SchemaOptions {
    max_parallelism: usize,
    max_depth: usize,
    max_query_length: usize,
    subscribe_resolver_timeout: Option<Duration>,
    restrict_introspection: Option<IntrospectionFilter>,
}

/// A GraphQL schema with resolvers bound to every reachable field.
///
/// Cheap to clone; executing requests never mutates it.
#[derive(Clone)]
pub struct Schema {
    env: SchemaEnv,
    options: Arc<SchemaOptions>,
}

impl Schema {
    /// Start building a schema from its schema-definition-language source.
    pub fn build(sdl: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            sdl: sdl.into(),
            resolvers: HashMap::new(),
            discriminators: Vec::new(),
            introspection_schema: None,
            introspection_type: None,
            use_field_resolvers: false,
            use_string_descriptions: false,
            data: Data::default(),
            panic_handler: Arc::new(DefaultPanicHandler),
            directives: HashMap::new(),
            max_parallelism: 10,
            max_depth: 0,
            max_query_length: 0,
            subscribe_resolver_timeout: None,
            restrict_introspection: None,
        }
    }

    /// The resolved schema this instance executes against.
    pub fn registry(&self) -> &Registry {
        &self.env.registry
    }

    /// Executes the given query. If the request's cancellation token fires,
    /// no further resolvers are called and the cancellation cause is returned
    /// as the only error.
    pub async fn execute(&self, request: impl Into<Request>) -> Response {
        let Request {
            query,
            operation_name,
            mut variables,
            data,
            cancellation,
        } = request.into();

        if let Err(error) = limits::check_query_length(&query, self.options.max_query_length) {
            return Response::from_error(error);
        }
        let document = match parse_query(&query) {
            Ok(document) => document,
            Err(error) => return Response::from_error(parse_error(error)),
        };
        let (operation_name, operation) = match select_operation(&document, operation_name.as_deref()) {
            Ok(selected) => selected,
            Err(error) => return Response::from_error(error),
        };
        if let Err(error) = limits::check_depth(&document, &operation.node, self.options.max_depth) {
            return Response::from_error(error);
        }

        match operation.node.ty {
            // Subscriptions are not valid here; use subscribe() instead.
            OperationType::Subscription => {
                return Response::from_error(ServerError::new(
                    "subscriptions are not supported by execute, use subscribe",
                    None,
                ));
            }
            OperationType::Mutation if self.env.registry.mutation_type.is_none() => {
                return Response::from_error(ServerError::new(
                    "no mutations are offered by the schema",
                    None,
                ));
            }
            _ => {}
        }

        fill_variable_defaults(&mut variables, &operation.node);
        if let Err(error) = check_required_variables(&variables, &operation.node) {
            return Response::from_error(error);
        }

        let introspection_allowed = self.introspection_allowed(&data);

        let query_env = QueryEnv::new(QueryEnvInner {
            variables,
            operation_name: operation_name.clone(),
            operation_type: operation.node.ty,
            ctx_data: Arc::new(data),
            cancellation,
            errors: Mutex::new(Vec::new()),
            limiter: Arc::new(Semaphore::new(self.options.max_parallelism)),
            max_parallelism: self.options.max_parallelism,
        });

        let apply_ctx = ApplyContext {
            registry: &self.env.registry,
            variables: &query_env.variables,
            operation: &operation.node,
            fragments: &document.fragments,
            introspection_allowed,
        };
        let sels = match apply_operation(&apply_ctx) {
            Ok(sels) => sels,
            Err(error) => return Response::from_error(error),
        };
        let sel_refs: Vec<&Selection<'_>> = sels.iter().collect();

        let span = RequestSpan::new()
            .with_document(query.as_str())
            .with_operation_name(operation_name.as_deref())
            .with_operation_type(operation_type_str(operation.node.ty))
            .into_span();

        let ctx = ExecutionContext {
            schema_env: &self.env,
            query_env: &query_env,
        };
        let serially = operation.node.ty == OperationType::Mutation;
        let data = resolve_container(ctx, sel_refs, &ResolvedValue::null(), &ResponsePath::root(), serially)
            .instrument(span)
            .await;

        if query_env.cancellation.is_cancelled() {
            // Whatever partial output exists is discarded; the cancellation
            // cause is the whole response.
            return Response::from_error(ServerError::new(query_env.cancellation.cause(), None));
        }

        Response::new(data, query_env.take_errors())
    }

    /// Executes a subscription operation, yielding one [`Response`] per event
    /// produced by the root field's resolver.
    ///
    /// Request-level failures (parse errors, a non-subscription operation,
    /// a rejected root field) surface as a single-element stream.
    pub fn subscribe(&self, request: impl Into<Request>) -> BoxStream<'static, Response> {
        match self.start_subscription(request.into()) {
            Ok(stream) => stream,
            Err(response) => stream::once(future::ready(response)).boxed(),
        }
    }

    fn start_subscription(&self, request: Request) -> Result<BoxStream<'static, Response>, Response> {
        let Request {
            query,
            operation_name,
            mut variables,
            data,
            cancellation,
        } = request;

        limits::check_query_length(&query, self.options.max_query_length).map_err(Response::from_error)?;
        let document = parse_query(&query).map_err(|error| Response::from_error(parse_error(error)))?;
        let (operation_name, operation) =
            select_operation(&document, operation_name.as_deref()).map_err(Response::from_error)?;
        if operation.node.ty != OperationType::Subscription {
            return Err(Response::from_error(ServerError::new(
                "the operation is not a subscription, use execute",
                None,
            )));
        }
        limits::check_depth(&document, &operation.node, self.options.max_depth).map_err(Response::from_error)?;

        fill_variable_defaults(&mut variables, &operation.node);
        check_required_variables(&variables, &operation.node).map_err(Response::from_error)?;

        let introspection_allowed = self.introspection_allowed(&data);
        let data = Arc::new(data);

        let apply_ctx = ApplyContext {
            registry: &self.env.registry,
            variables: &variables,
            operation: &operation.node,
            fragments: &document.fragments,
            introspection_allowed,
        };
        let sels = apply_operation(&apply_ctx).map_err(Response::from_error)?;
        let root_field = subscription_root_field(&sels).map_err(Response::from_error)?;

        let Resolver::Subscription(subscribe_fn) = &root_field.field.resolver else {
            return Err(Response::from_error(ServerError::new(
                format!("{} is not bound to a subscription resolver", root_field.field.name),
                Some(root_field.pos),
            )));
        };

        let query_env = QueryEnv::new(QueryEnvInner {
            variables: variables.clone(),
            operation_name: operation_name.clone(),
            operation_type: OperationType::Subscription,
            ctx_data: data.clone(),
            cancellation: cancellation.clone(),
            errors: Mutex::new(Vec::new()),
            limiter: Arc::new(Semaphore::new(self.options.max_parallelism)),
            max_parallelism: self.options.max_parallelism,
        });

        let path = ResponsePath::root().child_field(root_field.alias.clone());
        let sel_refs: Vec<&Selection<'_>> = root_field.sels.iter().collect();
        let rctx = ResolverContext {
            schema_env: self.env.clone(),
            query_env,
            field_name: root_field.field.name.clone(),
            parent: ResolvedValue::null(),
            arguments: root_field.arguments.clone(),
            path: path.clone(),
            selected: Arc::new(resolver_utils::selected_fields_of(&sel_refs)),
        };

        let events = (subscribe_fn.as_ref())(rctx).map_err(|error| {
            Response::from_error(error.into_server_error(root_field.pos).with_path(path.to_vec()))
        })?;

        let session = Arc::new(SubscriptionSession {
            env: self.env.clone(),
            options: self.options.clone(),
            query,
            operation_name,
            variables,
            data,
            cancellation,
            introspection_allowed,
        });

        Ok(events
            .then(move |event| {
                let session = session.clone();
                async move { session.execute_event(event).await }
            })
            .boxed())
    }

    fn introspection_allowed(&self, data: &Data) -> bool {
        match &self.options.restrict_introspection {
            None => true,
            Some(filter) => filter(data),
        }
    }
}

/// One live subscription. Events re-derive the selection tree from the
/// stored query so the stream owns no borrows.
struct SubscriptionSession {
    env: SchemaEnv,
    options: Arc<SchemaOptions>,
    query: String,
    operation_name: Option<String>,
    variables: Variables,
    data: Arc<Data>,
    cancellation: CancellationToken,
    introspection_allowed: bool,
}

impl SubscriptionSession {
    async fn execute_event(&self, event: Result<serde_json::Value, Error>) -> Response {
        if self.cancellation.is_cancelled() {
            return Response::from_error(ServerError::new(self.cancellation.cause(), None));
        }

        let document = match parse_query(&self.query) {
            Ok(document) => document,
            Err(error) => return Response::from_error(parse_error(error)),
        };
        let (operation_name, operation) = match select_operation(&document, self.operation_name.as_deref()) {
            Ok(selected) => selected,
            Err(error) => return Response::from_error(error),
        };
        let apply_ctx = ApplyContext {
            registry: &self.env.registry,
            variables: &self.variables,
            operation: &operation.node,
            fragments: &document.fragments,
            introspection_allowed: self.introspection_allowed,
        };
        let sels = match apply_operation(&apply_ctx) {
            Ok(sels) => sels,
            Err(error) => return Response::from_error(error),
        };
        let root_field = match subscription_root_field(&sels) {
            Ok(field) => field,
            Err(error) => return Response::from_error(error),
        };
        let path = ResponsePath::root().child_field(root_field.alias.clone());

        let event_value = match event {
            Ok(value) => ResolvedValue::new(value),
            Err(error) => {
                return Response::from_error(
                    error.into_server_error(root_field.pos).with_path(path.to_vec()),
                );
            }
        };

        let query_env = QueryEnv::new(QueryEnvInner {
            variables: self.variables.clone(),
            operation_name: operation_name.clone(),
            operation_type: OperationType::Subscription,
            ctx_data: self.data.clone(),
            cancellation: self.cancellation.clone(),
            errors: Mutex::new(Vec::new()),
            limiter: Arc::new(Semaphore::new(self.options.max_parallelism)),
            max_parallelism: self.options.max_parallelism,
        });
        let ctx = ExecutionContext {
            schema_env: &self.env,
            query_env: &query_env,
        };
        let sel_refs: Vec<&Selection<'_>> = root_field.sels.iter().collect();

        let resolve = resolve_output(
            ctx,
            &sel_refs,
            root_field.field.ty.as_str(),
            event_value,
            &path,
            root_field.pos,
        );
        // Each event resolver gets its own timeout window.
        let field_bytes = match self.options.subscribe_resolver_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, resolve).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    return Response::from_error(
                        ServerError::new(
                            format!("subscription resolver for \"{}\" timed out", root_field.alias),
                            Some(root_field.pos),
                        )
                        .with_path(path.to_vec()),
                    );
                }
            },
            None => resolve.await,
        };

        if self.cancellation.is_cancelled() {
            return Response::from_error(ServerError::new(self.cancellation.cause(), None));
        }

        let data = if root_field.field.ty.is_non_null() && resolved_to_null(&field_bytes) {
            b"null".to_vec()
        } else {
            let mut data = Vec::with_capacity(field_bytes.len() + root_field.alias.len() + 4);
            data.push(b'{');
            serde_json::to_writer(&mut data, root_field.alias.as_str())
                .expect("writing to a Vec cannot fail");
            data.push(b':');
            data.extend_from_slice(&field_bytes);
            data.push(b'}');
            data
        };

        Response::new(data, query_env.take_errors())
    }
}

fn subscription_root_field<'a, 'b>(sels: &'a [Selection<'b>]) -> ServerResult<&'a SchemaField<'b>> {
    match sels {
        [Selection::Field(field)] => Ok(field),
        _ => Err(ServerError::new(
            "subscriptions must select exactly one root field",
            None,
        )),
    }
}

fn select_operation<'a>(
    document: &'a ExecutableDocument,
    operation_name: Option<&str>,
) -> ServerResult<(Option<String>, &'a Positioned<OperationDefinition>)> {
    match operation_name {
        Some(name) => match &document.operations {
            DocumentOperations::Multiple(operations) => operations
                .get_key_value(name)
                .map(|(name, operation)| (Some(name.to_string()), operation))
                .ok_or_else(|| ServerError::new(format!("no operation with name {name:?}"), None)),
            DocumentOperations::Single(_) => {
                Err(ServerError::new(format!("no operation with name {name:?}"), None))
            }
        },
        None => match &document.operations {
            DocumentOperations::Single(operation) => Ok((None, operation)),
            DocumentOperations::Multiple(operations) if operations.len() == 1 => {
                let (name, operation) = operations.iter().next().expect("len checked above");
                Ok((Some(name.to_string()), operation))
            }
            DocumentOperations::Multiple(_) => Err(ServerError::new(
                "more than one operation in the document and no operation name given",
                None,
            )),
        },
    }
}

/// Fill in variables with the defaults from the operation.
fn fill_variable_defaults(variables: &mut Variables, operation: &OperationDefinition) {
    for definition in &operation.variable_definitions {
        if variables.get(definition.node.name.node.as_str()).is_none() {
            if let Some(default) = definition.node.default_value() {
                variables.insert(definition.node.name.node.clone(), default.clone());
            }
        }
    }
}

fn check_required_variables(variables: &Variables, operation: &OperationDefinition) -> ServerResult<()> {
    for definition in &operation.variable_definitions {
        let ty = definition.node.var_type.node.to_string();
        if ty.ends_with('!') && variables.get(definition.node.name.node.as_str()).is_none() {
            return Err(ServerError::new(
                format!(
                    "Variable {} of required type {ty} was not provided.",
                    definition.node.name.node
                ),
                Some(definition.node.name.pos),
            ));
        }
    }
    Ok(())
}

fn parse_error(error: async_graphql_parser::Error) -> ServerError {
    let mut server_error = ServerError::new(error.to_string(), None);
    server_error.locations = error.positions().map(Into::into).collect();
    server_error
}

fn operation_type_str(ty: OperationType) -> &'static str {
    match ty {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    }
}

/// Builder for [`Schema`]; collects resolver bindings and options, then binds
/// everything in [`finish`](Self::finish).
pub struct SchemaBuilder {
    sdl: String,
    resolvers: HashMap<(String, String), Resolver>,
    discriminators: Vec<(String, String, TypeDiscriminator)>,
    introspection_schema: Option<Resolver>,
    introspection_type: Option<Resolver>,
    use_field_resolvers: bool,
    use_string_descriptions: bool,
    data: Data,
    panic_handler: Arc<dyn PanicHandler>,
    directives: HashMap<String, Arc<dyn crate::resolvers::Directive>>,
    max_parallelism: usize,
    max_depth: usize,
    max_query_length: usize,
    subscribe_resolver_timeout: Option<Duration>,
    restrict_introspection: Option<IntrospectionFilter>,
}

impl SchemaBuilder {
    /// Bind a resolver to a schema field. Every reachable output field must
    /// end up bound, either explicitly or through
    /// [`use_field_resolvers`](Self::use_field_resolvers).
    #[must_use]
    pub fn resolver(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: Resolver,
    ) -> Self {
        self.resolvers.insert((type_name.into(), field_name.into()), resolver);
        self
    }

    /// Register a runtime type discriminator for a member of a union or
    /// interface, used when values do not carry `__typename`.
    #[must_use]
    pub fn discriminator(
        mut self,
        abstract_type: impl Into<String>,
        member: impl Into<String>,
        discriminator: TypeDiscriminator,
    ) -> Self {
        self.discriminators
            .push((abstract_type.into(), member.into(), discriminator));
        self
    }

    /// Route `__schema` / `__type` to the given resolvers. Introspection data
    /// generation lives outside the engine; without this, introspection
    /// fields report that they are unavailable.
    #[must_use]
    pub fn introspection_resolvers(mut self, schema: Resolver, ty: Resolver) -> Self {
        self.introspection_schema = Some(schema);
        self.introspection_type = Some(ty);
        self
    }

    /// Bind fields without an explicit resolver to the property of the same
    /// name on the parent value.
    #[must_use]
    pub fn use_field_resolvers(mut self) -> Self {
        self.use_field_resolvers = true;
        self
    }

    /// Keep `"""`-style string descriptions from the schema source in the
    /// registry. When off, descriptions are dropped; the legacy
    /// comments-as-descriptions syntax is not supported either way.
    #[must_use]
    pub fn use_string_descriptions(mut self) -> Self {
        self.use_string_descriptions = true;
        self
    }

    /// Insert data available to every request of this schema.
    #[must_use]
    pub fn data<D: std::any::Any + Send + Sync>(mut self, data: D) -> Self {
        self.data.insert(data);
        self
    }

    /// Customize how resolver panics turn into response errors.
    #[must_use]
    pub fn panic_handler(mut self, handler: impl PanicHandler) -> Self {
        self.panic_handler = Arc::new(handler);
        self
    }

    /// Register the implementation of a schema field directive.
    #[must_use]
    pub fn directive(mut self, directive: impl crate::resolvers::Directive) -> Self {
        self.directives
            .insert(directive.name().to_string(), Arc::new(directive));
        self
    }

    /// The maximum number of resolvers per request allowed to run in
    /// parallel. The default is 10.
    #[must_use]
    pub fn max_parallelism(mut self, n: usize) -> Self {
        self.max_parallelism = n.max(1);
        self
    }

    /// The maximum field nesting depth in a query. The default is 0 which
    /// disables max depth checking.
    #[must_use]
    pub fn max_depth(mut self, n: usize) -> Self {
        self.max_depth = n;
        self
    }

    /// The maximum allowed query length in bytes. The default is 0 which
    /// disables max length checking.
    #[must_use]
    pub fn max_query_length(mut self, n: usize) -> Self {
        self.max_query_length = n;
        self
    }

    /// The amount of time a single subscribe-message resolver may take before
    /// it times out and an error is returned to the subscriber.
    #[must_use]
    pub fn subscribe_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_resolver_timeout = Some(timeout);
        self
    }

    /// Gate `__schema` / `__type` behind a predicate over the request data;
    /// introspection stays enabled when no filter is installed. Combined
    /// with [`disable_introspection`](Self::disable_introspection), the
    /// option added last takes precedence.
    #[must_use]
    pub fn restrict_introspection(
        mut self,
        filter: impl Fn(&Data) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.restrict_introspection = Some(Arc::new(filter));
        self
    }

    /// Shorthand for a [`restrict_introspection`](Self::restrict_introspection)
    /// filter that always denies. The option added last takes precedence.
    #[must_use]
    pub fn disable_introspection(self) -> Self {
        self.restrict_introspection(|_| false)
    }

    /// Parse the schema source and bind every field to its resolver entry.
    pub fn finish(self) -> Result<Schema, SchemaError> {
        let registry = build_registry(
            &self.sdl,
            BindConfig {
                resolvers: self.resolvers,
                discriminators: self.discriminators,
                introspection_schema: self.introspection_schema,
                introspection_type: self.introspection_type,
                use_field_resolvers: self.use_field_resolvers,
                use_string_descriptions: self.use_string_descriptions,
            },
        )?;

        Ok(Schema {
            env: SchemaEnv(Arc::new(SchemaEnvInner {
                registry,
                data: self.data,
                panic_handler: self.panic_handler,
                directives: self.directives,
            })),
            options: Arc::new(SchemaOptions {
                max_parallelism: self.max_parallelism,
                max_depth: self.max_depth,
                max_query_length: self.max_query_length,
                subscribe_resolver_timeout: self.subscribe_resolver_timeout,
                restrict_introspection: self.restrict_introspection,
            }),
        })
    }
}
