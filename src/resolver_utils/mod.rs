//! The execution scheduler: walks the flattened selection tree against
//! resolver values, producing JSON bytes per field.
//!
//! Each field writes into its own buffer so that non-null propagation can
//! discard a subtree by replacing the enclosing buffer with `null`.

use std::{collections::HashMap, sync::Arc};

use async_graphql_parser::Pos;
use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    context::ExecutionContext,
    registry::{MetaField, MetaType},
    resolvers::{ResolvedValue, SelectedField},
    selection::Selection,
};

mod container;
mod field;
mod list;
mod output;

pub(crate) use container::resolve_container;
pub(crate) use output::resolve_output;

pub(crate) const NULL: &[u8] = b"null";

pub(crate) fn resolved_to_null(buffer: &[u8]) -> bool {
    buffer == NULL
}

/// A response key scheduled for execution, with every selection sharing the
/// key merged into it.
pub(crate) struct FieldToExec<'a> {
    pub meta: &'a MetaField,
    pub alias: &'a str,
    pub arguments: Arc<IndexMap<Name, ConstValue>>,
    pub pos: Pos,
    /// Set for synthesized `__typename` entries; skips the resolver call.
    pub fixed_result: Option<Value>,
    pub sels: Vec<&'a Selection<'a>>,
    pub parent: ResolvedValue,
}

/// Walks the selection list for one composite value, merging selections by
/// response key (first occurrence fixes the position) and descending into
/// type assertions that match the runtime value.
pub(crate) fn collect_fields<'a>(
    ctx: ExecutionContext<'a>,
    sels: impl IntoIterator<Item = &'a Selection<'a>>,
    parent: &ResolvedValue,
    fields: &mut Vec<FieldToExec<'a>>,
    index_by_alias: &mut HashMap<&'a str, usize>,
) {
    for sel in sels {
        match sel {
            Selection::Field(field) => {
                let index = match index_by_alias.get(field.alias.as_str()) {
                    Some(&index) => index,
                    None => {
                        fields.push(FieldToExec {
                            meta: field.field,
                            alias: &field.alias,
                            arguments: field.arguments.clone(),
                            pos: field.pos,
                            fixed_result: None,
                            sels: Vec::new(),
                            parent: parent.clone(),
                        });
                        index_by_alias.insert(&field.alias, fields.len() - 1);
                        fields.len() - 1
                    }
                };
                fields[index].sels.extend(field.sels.iter());
            }
            Selection::Typename(typename) => {
                if index_by_alias.contains_key(typename.alias.as_str()) {
                    continue;
                }
                let type_name = match typename.enclosing {
                    MetaType::Interface(_) | MetaType::Union(_) => ctx
                        .registry()
                        .concrete_type_name(typename.enclosing, parent.data_resolved())
                        .unwrap_or(""),
                    other => other.name(),
                };
                fields.push(FieldToExec {
                    meta: &ctx.registry().typename_field,
                    alias: &typename.alias,
                    arguments: Arc::new(IndexMap::new()),
                    pos: typename.pos,
                    fixed_result: Some(Value::String(type_name.to_string())),
                    sels: Vec::new(),
                    parent: parent.clone(),
                });
                index_by_alias.insert(&typename.alias, fields.len() - 1);
            }
            Selection::TypeAssertion(assertion) => {
                if ctx.registry().type_condition_matches(
                    assertion.enclosing,
                    assertion.target,
                    parent.data_resolved(),
                ) {
                    collect_fields(ctx, assertion.sels.iter(), parent, fields, index_by_alias);
                }
            }
        }
    }
}

/// Flat view of the fields selected below a selection list, handed to
/// resolvers through their context.
pub(crate) fn selected_fields_of(sels: &[&Selection<'_>]) -> Vec<SelectedField> {
    let mut out = Vec::new();
    for sel in sels {
        push_selected(sel, &mut out);
    }
    out
}

fn push_selected(sel: &Selection<'_>, out: &mut Vec<SelectedField>) {
    match sel {
        Selection::Field(field) => out.push(SelectedField {
            name: field.field.name.clone(),
            alias: field.alias.clone(),
        }),
        Selection::Typename(typename) => out.push(SelectedField {
            name: "__typename".to_string(),
            alias: typename.alias.clone(),
        }),
        Selection::TypeAssertion(assertion) => {
            for sel in &assertion.sels {
                push_selected(sel, out);
            }
        }
    }
}
