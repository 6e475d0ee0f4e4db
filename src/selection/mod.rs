//! Folds an operation, its fragments and directives into a flat selection
//! tree of schema fields, `__typename` markers and type assertions.
//!
//! The flattened list preserves the textual order of the source operation.
//! Selections sharing a response key are *not* merged here; merging happens
//! at field-collection time so that type assertions can be evaluated against
//! the runtime value.

use std::{collections::HashMap, sync::Arc};

use async_graphql_parser::{
    types::{
        self as ast, FragmentDefinition, OperationDefinition, SelectionSet, TypeCondition,
    },
    Pos, Positioned,
};
use async_graphql_value::{ConstValue, Name, Variables};
use indexmap::IndexMap;

use crate::{
    error::{ServerError, ServerResult},
    registry::{MetaField, MetaType, Registry},
};

mod input;

pub(crate) use input::resolve_input;

/// A field of the schema requested by the operation.
#[derive(Debug)]
pub struct SchemaField<'a> {
    pub field: &'a MetaField,
    /// The response key this field's value appears under.
    pub alias: String,
    pub arguments: Arc<IndexMap<Name, ConstValue>>,
    pub sels: Vec<Selection<'a>>,
    pub pos: Pos,
}

/// A `__typename` request against the enclosing type.
#[derive(Debug)]
pub struct TypenameField<'a> {
    pub enclosing: &'a MetaType,
    pub alias: String,
    pub pos: Pos,
}

/// "If the runtime value satisfies `target`, descend into `sels`."
#[derive(Debug)]
pub struct TypeAssertion<'a> {
    pub enclosing: &'a MetaType,
    pub target: &'a MetaType,
    pub sels: Vec<Selection<'a>>,
    pub pos: Pos,
}

#[derive(Debug)]
pub enum Selection<'a> {
    Field(SchemaField<'a>),
    Typename(TypenameField<'a>),
    TypeAssertion(TypeAssertion<'a>),
}

pub(crate) struct ApplyContext<'a> {
    pub registry: &'a Registry,
    pub variables: &'a Variables,
    pub operation: &'a OperationDefinition,
    pub fragments: &'a HashMap<Name, Positioned<FragmentDefinition>>,
    pub introspection_allowed: bool,
}

/// Flattens the operation's selection set against its root type.
pub(crate) fn apply_operation<'a>(ctx: &ApplyContext<'a>) -> ServerResult<Vec<Selection<'a>>> {
    let root = ctx.registry.root_type(ctx.operation.ty).ok_or_else(|| {
        ServerError::new(
            format!("the schema does not support {} operations", ctx.operation.ty),
            None,
        )
    })?;
    let mut visited_fragments = Vec::new();
    apply_selection_set(ctx, root, &ctx.operation.selection_set.node, &mut visited_fragments)
}

fn apply_selection_set<'a>(
    ctx: &ApplyContext<'a>,
    enclosing: &'a MetaType,
    selection_set: &'a SelectionSet,
    visited_fragments: &mut Vec<&'a str>,
) -> ServerResult<Vec<Selection<'a>>> {
    let mut sels = Vec::new();
    for item in &selection_set.items {
        match &item.node {
            ast::Selection::Field(field) => {
                if !directives_allow(ctx, &field.node.directives)? {
                    continue;
                }
                let name = field.node.name.node.as_str();
                let alias = field.node.response_key().node.to_string();

                if name == "__typename" {
                    sels.push(Selection::Typename(TypenameField {
                        enclosing,
                        alias,
                        pos: field.pos,
                    }));
                    continue;
                }
                // Everything else double-underscored is introspection and is
                // silently omitted when the request's policy denies it.
                if name.starts_with("__") && !ctx.introspection_allowed {
                    continue;
                }

                let meta = enclosing.field(name).ok_or_else(|| {
                    ServerError::new(
                        format!("Could not find a field named {name} on {}", enclosing.name()),
                        Some(field.node.name.pos),
                    )
                })?;
                let arguments = resolve_arguments(ctx, meta, &field.node)?;

                let sub = &field.node.selection_set.node;
                let inner = if sub.items.is_empty() {
                    Vec::new()
                } else {
                    let target = ctx.registry.lookup_type(meta.ty.named_type()).ok_or_else(|| {
                        ServerError::new(
                            format!("Unknown type \"{}\".", meta.ty.named_type()),
                            Some(field.pos),
                        )
                    })?;
                    if target.is_composite() {
                        apply_selection_set(ctx, target, sub, visited_fragments)?
                    } else {
                        // Selections under a leaf type belong to whatever
                        // produced the blob (the introspection resolvers
                        // return pre-shaped JSON); nothing to fold here.
                        Vec::new()
                    }
                };

                sels.push(Selection::Field(SchemaField {
                    field: meta,
                    alias,
                    arguments: Arc::new(arguments),
                    sels: inner,
                    pos: field.pos,
                }));
            }
            ast::Selection::FragmentSpread(spread) => {
                if !directives_allow(ctx, &spread.node.directives)? {
                    continue;
                }
                let name = spread.node.fragment_name.node.as_str();
                if visited_fragments.contains(&name) {
                    return Err(ServerError::new(
                        format!("Cannot spread fragment \"{name}\" within itself."),
                        Some(spread.pos),
                    ));
                }
                let fragment = ctx.fragments.get(name).ok_or_else(|| {
                    ServerError::new(format!("Unknown fragment \"{name}\"."), Some(spread.pos))
                })?;
                visited_fragments.push(name);
                let applied = apply_fragment(
                    ctx,
                    enclosing,
                    Some(&fragment.node.type_condition.node),
                    &fragment.node.selection_set.node,
                    spread.pos,
                    visited_fragments,
                )?;
                visited_fragments.pop();
                sels.extend(applied);
            }
            ast::Selection::InlineFragment(inline) => {
                if !directives_allow(ctx, &inline.node.directives)? {
                    continue;
                }
                let applied = apply_fragment(
                    ctx,
                    enclosing,
                    inline.node.type_condition.as_ref().map(|cond| &cond.node),
                    &inline.node.selection_set.node,
                    inline.pos,
                    visited_fragments,
                )?;
                sels.extend(applied);
            }
        }
    }
    Ok(sels)
}

fn apply_fragment<'a>(
    ctx: &ApplyContext<'a>,
    enclosing: &'a MetaType,
    condition: Option<&'a TypeCondition>,
    selection_set: &'a SelectionSet,
    pos: Pos,
    visited_fragments: &mut Vec<&'a str>,
) -> ServerResult<Vec<Selection<'a>>> {
    match condition {
        // A fragment on the enclosing type itself is inlined; anything else
        // becomes a runtime type assertion.
        None => apply_selection_set(ctx, enclosing, selection_set, visited_fragments),
        Some(condition) if condition.on.node.as_str() == enclosing.name() => {
            apply_selection_set(ctx, enclosing, selection_set, visited_fragments)
        }
        Some(condition) => {
            let target = ctx.registry.lookup_type(condition.on.node.as_str()).ok_or_else(|| {
                ServerError::new(format!("Unknown type \"{}\".", condition.on.node), Some(pos))
            })?;
            let sels = apply_selection_set(ctx, target, selection_set, visited_fragments)?;
            Ok(vec![Selection::TypeAssertion(TypeAssertion {
                enclosing,
                target,
                sels,
                pos,
            })])
        }
    }
}

/// Evaluates `@skip` / `@include` against variables and literals. Returns
/// `false` when the carrying selection must be dropped.
fn directives_allow(
    ctx: &ApplyContext<'_>,
    directives: &[Positioned<ast::Directive>],
) -> ServerResult<bool> {
    for directive in directives {
        let name = directive.node.name.node.as_str();
        let drop_when = match name {
            "skip" => true,
            "include" => false,
            _ => continue,
        };
        let argument = directive.node.get_argument("if").ok_or_else(|| {
            ServerError::new(
                format!("Directive @{name} is missing its \"if\" argument."),
                Some(directive.pos),
            )
        })?;
        let value = argument
            .node
            .clone()
            .into_const_with(|variable| var_value(ctx, &variable, argument.pos))?;
        match value {
            ConstValue::Boolean(value) => {
                if value == drop_when {
                    return Ok(false);
                }
            }
            other => {
                return Err(ServerError::new(
                    format!("The \"if\" argument of @{name} must be a Boolean, found {other}."),
                    Some(argument.pos),
                ));
            }
        }
    }
    Ok(true)
}

fn var_value(ctx: &ApplyContext<'_>, name: &str, pos: Pos) -> ServerResult<ConstValue> {
    ctx.operation
        .variable_definitions
        .iter()
        .find(|def| def.node.name.node.as_str() == name)
        .and_then(|def| {
            ctx.variables
                .get(def.node.name.node.as_str())
                .or_else(|| def.node.default_value())
        })
        .cloned()
        .ok_or_else(|| ServerError::new(format!("Variable {name} is not defined."), Some(pos)))
}

fn resolve_arguments(
    ctx: &ApplyContext<'_>,
    meta: &MetaField,
    field: &ast::Field,
) -> ServerResult<IndexMap<Name, ConstValue>> {
    let mut arguments = IndexMap::with_capacity(meta.args.len());
    for meta_input in meta.args.values() {
        let provided = field
            .arguments
            .iter()
            .find(|(name, _)| name.node.as_str() == meta_input.name)
            .map(|(_, value)| value);
        let (pos, value) = match provided {
            Some(value) => (
                value.pos,
                Some(
                    value
                        .node
                        .clone()
                        .into_const_with(|variable| var_value(ctx, &variable, value.pos))?,
                ),
            ),
            None => (field.name.pos, None),
        };
        if let Some(value) = resolve_input(ctx.registry, pos, &meta_input.name, meta_input, value)? {
            arguments.insert(Name::new(&meta_input.name), value);
        }
    }
    Ok(arguments)
}

fn selection_is_async(sel: &Selection<'_>) -> bool {
    match sel {
        Selection::Field(field) => field.field.resolver.is_async() || has_async_selections(&field.sels),
        Selection::Typename(_) => false,
        Selection::TypeAssertion(assertion) => has_async_selections(&assertion.sels),
    }
}

pub(crate) fn has_async_selections(sels: &[Selection<'_>]) -> bool {
    sels.iter().any(selection_is_async)
}

pub(crate) fn has_async_selection_refs(sels: &[&Selection<'_>]) -> bool {
    sels.iter().any(|sel| selection_is_async(sel))
}

#[cfg(test)]
mod tests {
    use async_graphql_parser::parse_query;
    use async_graphql_parser::types::DocumentOperations;

    use super::*;
    use crate::registry::{build_registry, BindConfig};

    fn apply(registry: &Registry, query: &str, variables: Variables) -> ServerResult<Vec<String>> {
        let doc = parse_query(query).unwrap();
        let operation = match &doc.operations {
            DocumentOperations::Single(operation) => &operation.node,
            DocumentOperations::Multiple(_) => unreachable!(),
        };
        let ctx = ApplyContext {
            registry,
            variables: &variables,
            operation,
            fragments: &doc.fragments,
            introspection_allowed: true,
        };
        Ok(apply_operation(&ctx)?
            .iter()
            .map(|sel| match sel {
                Selection::Field(field) => field.alias.clone(),
                Selection::Typename(field) => field.alias.clone(),
                Selection::TypeAssertion(assertion) => format!("... on {}", assertion.target.name()),
            })
            .collect())
    }

    fn registry() -> Registry {
        build_registry(
            r#"
            type Query {
                hero: Character
                hello: String
                version: String
            }
            interface Character {
                name: String
            }
            type Droid implements Character {
                name: String
                primaryFunction: String
            }
            "#,
            BindConfig::lenient(),
        )
        .unwrap()
    }

    #[test]
    fn textual_order_is_preserved() {
        let registry = registry();
        let keys = apply(&registry, "{ version hello renamed: hello }", Variables::default()).unwrap();
        assert_eq!(keys, vec!["version", "hello", "renamed"]);
    }

    #[test]
    fn skip_and_include_from_variables() {
        let registry = registry();
        let variables: Variables =
            serde_json::from_value(serde_json::json!({"yes": true, "no": false})).unwrap();
        let keys = apply(
            &registry,
            r#"query ($yes: Boolean!, $no: Boolean!) {
                hello @skip(if: $yes)
                version @include(if: $yes)
                hero @include(if: $no)
            }"#,
            variables,
        )
        .unwrap();
        assert_eq!(keys, vec!["version"]);
    }

    #[test]
    fn fragment_on_enclosing_type_is_inlined() {
        let registry = registry();
        let keys = apply(
            &registry,
            "{ ...QueryBits } fragment QueryBits on Query { hello version }",
            Variables::default(),
        )
        .unwrap();
        assert_eq!(keys, vec!["hello", "version"]);
    }

    #[test]
    fn fragment_on_other_type_becomes_assertion() {
        let registry = registry();
        let doc = parse_query("{ hero { ... on Droid { primaryFunction } } }").unwrap();
        let operation = match &doc.operations {
            DocumentOperations::Single(operation) => &operation.node,
            DocumentOperations::Multiple(_) => unreachable!(),
        };
        let variables = Variables::default();
        let ctx = ApplyContext {
            registry: &registry,
            variables: &variables,
            operation,
            fragments: &doc.fragments,
            introspection_allowed: true,
        };
        let sels = apply_operation(&ctx).unwrap();
        let Selection::Field(hero) = &sels[0] else { panic!("expected field") };
        assert!(matches!(&hero.sels[0], Selection::TypeAssertion(assertion) if assertion.target.name() == "Droid"));
    }

    #[test]
    fn self_referential_fragments_are_rejected() {
        let registry = registry();
        let err = apply(
            &registry,
            "{ ...Loop } fragment Loop on Query { hello ...Loop }",
            Variables::default(),
        )
        .unwrap_err();
        assert!(err.message.contains("within itself"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let registry = registry();
        let err = apply(&registry, "{ nope }", Variables::default()).unwrap_err();
        assert!(err.message.contains("Could not find a field named nope"));
    }
}
