//! Execution of a selection set against one composite value.

use std::collections::HashMap;

use async_recursion::async_recursion;
use futures_util::future::join_all;

use crate::{
    context::ExecutionContext, path::ResponsePath, resolvers::ResolvedValue,
    selection::{has_async_selection_refs, Selection},
};

use super::{collect_fields, field::resolve_field, resolved_to_null, FieldToExec, NULL};

/// Resolves every field collected for this selection set and assembles the
/// object output.
///
/// `serially` is set for mutation roots only: those fields run strictly in
/// declaration order, each completing its whole subtree before the next
/// starts. Everywhere else fields run concurrently as soon as anything in
/// the set is asynchronous.
#[async_recursion]
pub(crate) async fn resolve_container<'a>(
    ctx: ExecutionContext<'a>,
    sels: Vec<&'a Selection<'a>>,
    parent: &ResolvedValue,
    path: &ResponsePath,
    serially: bool,
) -> Vec<u8> {
    let mut fields: Vec<FieldToExec<'a>> = Vec::new();
    collect_fields(ctx, sels, parent, &mut fields, &mut HashMap::new());

    let run_concurrently = !serially
        && fields
            .iter()
            .any(|field| field.meta.resolver.is_async() || has_async_selection_refs(&field.sels));

    let buffers: Vec<Vec<u8>> = if run_concurrently {
        join_all(fields.iter().map(|field| resolve_field(ctx, field, path))).await
    } else {
        let mut buffers = Vec::with_capacity(fields.len());
        for field in &fields {
            buffers.push(resolve_field(ctx, field, path).await);
        }
        buffers
    };

    let mut out = Vec::new();
    out.push(b'{');
    for (i, (field, buffer)) in fields.iter().zip(&buffers).enumerate() {
        // If a non-nullable child resolved to null, an error was already
        // recorded for it and the null propagates to this whole object.
        if field.meta.ty.is_non_null() && resolved_to_null(buffer) {
            return NULL.to_vec();
        }

        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut out, field.alias).expect("writing to a Vec cannot fail");
        out.push(b':');
        out.extend_from_slice(buffer);
    }
    out.push(b'}');
    out
}
