//! Execution of a single scheduled field: limiter, cancellation, panic
//! recovery, the resolver call itself and the hand-off to serialization.

use std::sync::Arc;

use futures_util::FutureExt;
use tracing::Instrument;

use crate::{
    context::ExecutionContext,
    error::{Error, ServerError},
    path::ResponsePath,
    resolvers::{ResolvedValue, Resolver, ResolverContext},
    trace::ResolverSpan,
};

use super::{output::resolve_output, selected_fields_of, FieldToExec, NULL};

pub(crate) async fn resolve_field<'a>(
    ctx: ExecutionContext<'a>,
    field: &FieldToExec<'a>,
    parent_path: &ResponsePath,
) -> Vec<u8> {
    let path = parent_path.child_field(field.alias);
    let span = ResolverSpan::new(&field.meta.trace_label).into_span();

    async {
        match invoke_resolver(ctx, field, &path).await {
            Ok(value) => {
                resolve_output(ctx, &field.sels, field.meta.ty.as_str(), value, &path, field.pos).await
            }
            Err(error) => {
                // A failed resolver reads as a null field, with the error
                // recorded on the response.
                ctx.add_error(error);
                NULL.to_vec()
            }
        }
    }
    .instrument(span)
    .await
}

async fn invoke_resolver<'a>(
    ctx: ExecutionContext<'a>,
    field: &FieldToExec<'a>,
    path: &ResponsePath,
) -> Result<ResolvedValue, ServerError> {
    if let Some(fixed) = &field.fixed_result {
        return Ok(ResolvedValue::new(fixed.clone()));
    }

    if ctx.query_env.cancellation.is_cancelled() {
        return Err(cancellation_error(ctx, field, path));
    }

    // Only invocations that may suspend take a permit. The permit covers the
    // resolver call alone, not the subtree, so deep trees cannot starve the
    // limiter.
    let permit = if field.meta.resolver.is_async() {
        let permit = ctx
            .query_env
            .limiter
            .clone()
            .acquire_owned()
            .await
            .expect("the limiter is never closed");
        // The token may have fired while this field waited for a permit.
        if ctx.query_env.cancellation.is_cancelled() {
            return Err(cancellation_error(ctx, field, path));
        }
        Some(permit)
    } else {
        None
    };

    let rctx = ResolverContext {
        schema_env: ctx.schema_env.clone(),
        query_env: ctx.query_env.clone(),
        field_name: field.meta.name.clone(),
        parent: field.parent.clone(),
        arguments: field.arguments.clone(),
        path: path.clone(),
        selected: Arc::new(selected_fields_of(&field.sels)),
    };

    let outcome = std::panic::AssertUnwindSafe(run_entry(&field.meta.resolver, &rctx))
        .catch_unwind()
        .await;

    drop(permit);

    let value = match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            return Err(error.into_server_error(field.pos).with_path(path.to_vec()));
        }
        Err(payload) => {
            tracing::error!(
                target: crate::trace::GRAPHQL_TARGET,
                path = %path,
                field = %field.meta.trace_label,
                "resolver panicked"
            );
            let error = ctx.schema_env.panic_handler.make_panic_error(payload.as_ref());
            return Err(error.into_server_error(field.pos).with_path(path.to_vec()));
        }
    };

    apply_field_directives(ctx, field, &rctx, value)
        .map_err(|error| error.into_server_error(field.pos).with_path(path.to_vec()))
}

async fn run_entry(resolver: &Resolver, rctx: &ResolverContext) -> Result<ResolvedValue, Error> {
    match resolver {
        // Some fields just hand their parent's data down to their children.
        Resolver::Parent => Ok(rctx.parent.clone()),
        Resolver::Property(key) => Ok(rctx.parent.get_field(key).unwrap_or_default()),
        Resolver::Sync(resolve) => (resolve.as_ref())(rctx).map(ResolvedValue::new),
        Resolver::Async(resolve) => (resolve.as_ref())(rctx.clone()).await.map(ResolvedValue::new),
        Resolver::Typename => Err(Error::new("internal: __typename entries carry a fixed result")),
        Resolver::Subscription(_) => Err(Error::new(
            "subscription fields can only be executed through subscribe",
        )),
    }
}

fn apply_field_directives(
    ctx: ExecutionContext<'_>,
    field: &FieldToExec<'_>,
    rctx: &ResolverContext,
    value: ResolvedValue,
) -> Result<ResolvedValue, Error> {
    let applicable = field
        .meta
        .directives
        .iter()
        .filter_map(|directive| {
            ctx.schema_env
                .directives
                .get(&directive.name)
                .map(|implementation| (directive, implementation))
        })
        .collect::<Vec<_>>();
    if applicable.is_empty() {
        return Ok(value);
    }

    let mut json = value.take();
    for (directive, implementation) in applicable {
        json = implementation.resolve(rctx, &directive.args, json)?;
    }
    Ok(ResolvedValue::new(json))
}

fn cancellation_error(
    ctx: ExecutionContext<'_>,
    field: &FieldToExec<'_>,
    path: &ResponsePath,
) -> ServerError {
    ServerError::new(ctx.query_env.cancellation.cause(), Some(field.pos)).with_path(path.to_vec())
}
