//! Serialization of a resolved value under its declared type: unwraps
//! non-null, descends into composites and lists, emits scalars and enums.

use async_graphql_parser::Pos;
use async_recursion::async_recursion;

use crate::{
    context::ExecutionContext,
    error::ServerError,
    path::ResponsePath,
    registry::{EnumType, MetaType, MetaTypeName},
    resolvers::ResolvedValue,
    selection::Selection,
};

use super::{container::resolve_container, list::resolve_list, NULL};

#[async_recursion]
pub(crate) async fn resolve_output<'a>(
    ctx: ExecutionContext<'a>,
    sels: &[&'a Selection<'a>],
    ty: &str,
    value: ResolvedValue,
    path: &ResponsePath,
    pos: Pos,
) -> Vec<u8> {
    let (ty, non_null) = match MetaTypeName::create(ty) {
        MetaTypeName::NonNull(inner) => (inner, true),
        _ => (ty, false),
    };

    if value.is_null() {
        // A null under a non-null type is an error here; where the null ends
        // up in the response is the enclosing scopes' concern.
        if non_null {
            ctx.add_error(
                ServerError::new(format!("got a null value for non-null type \"{ty}\""), Some(pos))
                    .with_path(path.to_vec()),
            );
        }
        return NULL.to_vec();
    }

    if let MetaTypeName::List(inner) = MetaTypeName::create(ty) {
        return resolve_list(ctx, sels, inner, value, path, pos).await;
    }

    let Some(meta) = ctx.registry().lookup_type(ty) else {
        ctx.add_error(
            ServerError::new(format!("Unknown type \"{ty}\"."), Some(pos)).with_path(path.to_vec()),
        );
        return NULL.to_vec();
    };

    match meta {
        MetaType::Object(_) | MetaType::Interface(_) | MetaType::Union(_) => {
            resolve_container(ctx, sels.to_vec(), &value, path, false).await
        }
        MetaType::Enum(enum_type) => serialize_enum(ctx, enum_type, &value, path, pos),
        MetaType::Scalar(_) => {
            serde_json::to_vec(value.data_resolved()).expect("JSON values always serialize")
        }
        MetaType::InputObject(_) => {
            ctx.add_error(
                ServerError::new(format!("\"{ty}\" is an input type, not an output type"), Some(pos))
                    .with_path(path.to_vec()),
            );
            NULL.to_vec()
        }
    }
}

fn serialize_enum(
    ctx: ExecutionContext<'_>,
    enum_type: &EnumType,
    value: &ResolvedValue,
    path: &ResponsePath,
    pos: Pos,
) -> Vec<u8> {
    match value.data_resolved() {
        serde_json::Value::String(name) if enum_type.values.contains_key(name) => {
            serde_json::to_vec(name).expect("JSON strings always serialize")
        }
        other => {
            ctx.add_error(
                ServerError::new(
                    format!("Invalid value {other} for enum \"{}\".", enum_type.name),
                    Some(pos),
                )
                .with_path(path.to_vec()),
            );
            NULL.to_vec()
        }
    }
}
