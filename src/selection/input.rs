//! Coercion of provided argument values against their declared input types.

use std::borrow::{Borrow, Cow};

use async_graphql_parser::Pos;
use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;

use crate::{
    error::{Error, ServerResult},
    registry::{MetaInputValue, MetaType, MetaTypeName, Registry},
};

pub(crate) fn resolve_input(
    registry: &Registry,
    error_pos: Pos,
    arg_name: &str,
    meta_input_value: &MetaInputValue,
    value: Option<ConstValue>,
) -> ServerResult<Option<ConstValue>> {
    resolve_maybe_absent_input(
        ResolveContext {
            registry,
            path: PathNode::new(arg_name),
            ty: Cow::Borrowed(meta_input_value.ty.as_str()),
            allow_list_coercion: true,
            default_value: meta_input_value.default_value.as_ref(),
        },
        value,
    )
    .map_err(|err| err.into_server_error(error_pos))
}

#[derive(Clone, Copy)]
struct PathNode<'a> {
    name: &'a str,
    previous: Option<&'a PathNode<'a>>,
}

impl<'a> PathNode<'a> {
    fn new(name: &'a str) -> PathNode<'a> {
        PathNode { name, previous: None }
    }

    fn with(&'a self, name: &'a str) -> PathNode<'a> {
        PathNode {
            name,
            previous: Some(self),
        }
    }

    #[allow(clippy::wrong_self_convention)]
    fn into_vec(&self) -> Vec<String> {
        let mut previous = self.previous.map(PathNode::into_vec).unwrap_or_default();
        previous.push(self.name.to_string());
        previous
    }
}

#[derive(Clone)]
struct ResolveContext<'a> {
    registry: &'a Registry,
    path: PathNode<'a>,
    /// Expected GraphQL type
    ty: Cow<'a, str>,
    /// Whether we allow list coercion at this point:
    /// https://spec.graphql.org/October2021/#sec-List.Input-Coercion
    /// Most of the time this will be true except for:
    /// ty: [[Int]]  value: [1, 2, 3] => Error: Incorrect item value
    allow_list_coercion: bool,
    default_value: Option<&'a ConstValue>,
}

impl<'a> ResolveContext<'a> {
    fn with_input(&'a self, path: &'a str, input: &'a MetaInputValue) -> ResolveContext<'a> {
        ResolveContext {
            registry: self.registry,
            path: self.path.with(path),
            ty: Cow::Borrowed(input.ty.as_str()),
            allow_list_coercion: true,
            default_value: input.default_value.as_ref(),
        }
    }

    fn input_error(self, expected: &str) -> Error {
        Error::new(format!("{expected} for {}", self.path.into_vec().join(".")))
    }
}

fn resolve_maybe_absent_input(
    rctx: ResolveContext<'_>,
    value: Option<ConstValue>,
) -> Result<Option<ConstValue>, Error> {
    match value.or_else(|| rctx.default_value.cloned()) {
        Some(value) => resolve_present_input(rctx, value).map(Some),
        None => matches!(MetaTypeName::create(rctx.ty.borrow()), MetaTypeName::NonNull(_))
            .then_some(Err(rctx.input_error("Unexpected null value")))
            .transpose(),
    }
}

fn resolve_present_input(rctx: ResolveContext<'_>, value: ConstValue) -> Result<ConstValue, Error> {
    match MetaTypeName::create(rctx.ty.borrow()) {
        MetaTypeName::NonNull(type_name) => {
            if matches!(value, ConstValue::Null) {
                return Err(rctx.input_error("Unexpected null value"));
            }
            resolve_present_input(
                ResolveContext {
                    ty: Cow::Borrowed(type_name),
                    ..rctx
                },
                value,
            )
        }
        MetaTypeName::List(type_name) => {
            if matches!(value, ConstValue::Null) {
                return Ok(value);
            }
            if let ConstValue::List(list) = value {
                let rctx = ResolveContext {
                    ty: Cow::Borrowed(type_name),
                    allow_list_coercion: list.len() <= 1,
                    default_value: None,
                    ..rctx
                };
                let mut arr = Vec::new();
                for (idx, element) in list.into_iter().enumerate() {
                    let path = idx.to_string();
                    let rctx = ResolveContext {
                        path: rctx.path.with(&path),
                        ..rctx.clone()
                    };
                    arr.push(resolve_present_input(rctx, element)?);
                }
                Ok(ConstValue::List(arr))
            } else if rctx.allow_list_coercion {
                Ok(ConstValue::List(vec![resolve_present_input(
                    ResolveContext {
                        ty: Cow::Borrowed(type_name),
                        allow_list_coercion: true,
                        default_value: None,
                        ..rctx
                    },
                    value,
                )?]))
            } else {
                Err(rctx.input_error("Expected a List"))
            }
        }
        MetaTypeName::Named(type_name) => {
            if matches!(value, ConstValue::Null) {
                return Ok(value);
            }
            match rctx.registry.lookup_type(type_name) {
                Some(MetaType::InputObject(input_object)) => {
                    if let ConstValue::Object(mut fields) = value {
                        let mut map = IndexMap::with_capacity(fields.len());
                        for meta_input_value in input_object.input_fields.values() {
                            if let Some(field_value) = resolve_maybe_absent_input(
                                rctx.with_input(&meta_input_value.name, meta_input_value),
                                fields.shift_remove(meta_input_value.name.as_str()),
                            )? {
                                map.insert(Name::new(&meta_input_value.name), field_value);
                            }
                        }
                        Ok(ConstValue::Object(map))
                    } else {
                        Err(rctx.input_error("Expected an Object"))
                    }
                }
                Some(MetaType::Enum(enum_type)) => {
                    let str_value = match &value {
                        ConstValue::Enum(name) => name.as_str(),
                        ConstValue::String(string) => string.as_str(),
                        _ => {
                            return Err(rctx.input_error(&format!("Expected an enum, not a {value}")));
                        }
                    };
                    if enum_type.values.contains_key(str_value) {
                        Ok(ConstValue::Enum(Name::new(str_value)))
                    } else {
                        Err(rctx.input_error(&format!("Unknown enum value: {str_value}")))
                    }
                }
                Some(MetaType::Scalar(_)) => Ok(value),
                _ => Err(rctx
                    .clone()
                    .input_error(&format!("Internal Error: Unsupported input type {type_name}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_graphql_value::ConstValue;

    use super::*;
    use crate::registry::MetaInputValue;

    fn input(ty: &str) -> MetaInputValue {
        MetaInputValue {
            name: "arg".to_string(),
            description: None,
            ty: ty.into(),
            default_value: None,
        }
    }

    fn registry() -> Registry {
        crate::registry::build_registry("type Query { ok: Boolean }", crate::registry::BindConfig::lenient()).unwrap()
    }

    #[test]
    fn missing_non_null_input_is_rejected() {
        let registry = registry();
        let err = resolve_input(&registry, Pos::default(), "id", &input("ID!"), None).unwrap_err();
        assert!(err.message.contains("Unexpected null value"));

        let ok = resolve_input(&registry, Pos::default(), "id", &input("ID"), None).unwrap();
        assert!(ok.is_none());
    }

    fn number(value: i32) -> ConstValue {
        ConstValue::Number(serde_json::Number::from(value))
    }

    #[test]
    fn single_values_coerce_into_lists() {
        let registry = registry();
        let value = resolve_input(&registry, Pos::default(), "ids", &input("[Int]"), Some(number(1)))
            .unwrap()
            .unwrap();
        assert_eq!(value, ConstValue::List(vec![number(1)]));
    }

    #[test]
    fn defaults_fill_absent_values() {
        let registry = registry();
        let mut meta = input("Int");
        meta.default_value = Some(number(42));
        let value = resolve_input(&registry, Pos::default(), "limit", &meta, None)
            .unwrap()
            .unwrap();
        assert_eq!(value, number(42));
    }
}
