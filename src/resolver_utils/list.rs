//! Execution of list-typed values, element order preserving.

use std::sync::Arc;

use async_graphql_parser::Pos;
use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::{
    context::ExecutionContext,
    error::ServerError,
    path::ResponsePath,
    registry::MetaTypeName,
    resolvers::ResolvedValue,
    selection::{has_async_selection_refs, Selection},
};

use super::{output::resolve_output, resolved_to_null, NULL};

pub(crate) async fn resolve_list<'a>(
    ctx: ExecutionContext<'a>,
    sels: &[&'a Selection<'a>],
    inner_ty: &str,
    value: ResolvedValue,
    path: &ResponsePath,
    pos: Pos,
) -> Vec<u8> {
    let Some(items) = value.item_iter() else {
        ctx.add_error(
            ServerError::new(
                format!(
                    "Encountered a {} where we expected a list",
                    json_kind_str(value.data_resolved())
                ),
                Some(pos),
            )
            .with_path(path.to_vec()),
        );
        return NULL.to_vec();
    };
    let items: Vec<ResolvedValue> = items.collect();

    let buffers: Vec<Vec<u8>> = if has_async_selection_refs(sels) && items.len() > 1 {
        // Element subtrees run concurrently but bounded, so large lists don't
        // fan out one task per element at once. The bound is a fresh
        // semaphore with the limiter's capacity; the shared limiter itself
        // keeps gating the resolver calls inside each subtree.
        let subtree_limiter = Arc::new(Semaphore::new(ctx.query_env.max_parallelism));
        join_all(items.into_iter().enumerate().map(|(index, item)| {
            let subtree_limiter = subtree_limiter.clone();
            let item_path = path.child_index(index);
            async move {
                let _permit = subtree_limiter
                    .acquire()
                    .await
                    .expect("the element limiter is never closed");
                resolve_output(ctx, sels, inner_ty, item, &item_path, pos).await
            }
        }))
        .await
    } else {
        let mut buffers = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let item_path = path.child_index(index);
            buffers.push(resolve_output(ctx, sels, inner_ty, item, &item_path, pos).await);
        }
        buffers
    };

    let inner_non_null = matches!(MetaTypeName::create(inner_ty), MetaTypeName::NonNull(_));

    let mut out = Vec::new();
    out.push(b'[');
    for (i, buffer) in buffers.iter().enumerate() {
        // If the list wraps a non-null type and one of the elements resolved
        // to null, the entire list resolves to null.
        if inner_non_null && resolved_to_null(buffer) {
            return NULL.to_vec();
        }

        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(buffer);
    }
    out.push(b']');
    out
}

fn json_kind_str(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}
