//! The resolved schema: named types, fields and the resolver bound to each
//! field. Built once by [`SchemaBuilder::finish`](crate::SchemaBuilder::finish)
//! and immutable afterwards.

use async_graphql_parser::types::OperationType;
use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;

use crate::resolvers::Resolver;

mod builder;
mod discriminator;

pub(crate) use builder::{build_registry, BindConfig};
pub use discriminator::{ScalarKind, TypeDiscriminator};

/// A GraphQL type reference as written in the schema, e.g. `[Int!]!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaFieldType(String);

impl MetaFieldType {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The innermost named type, with all list and non-null wrappers stripped.
    pub fn named_type(&self) -> &str {
        let mut ty = self.0.as_str();
        loop {
            match MetaTypeName::create(ty) {
                MetaTypeName::NonNull(inner) | MetaTypeName::List(inner) => ty = inner,
                MetaTypeName::Named(name) => return name,
            }
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(MetaTypeName::create(&self.0), MetaTypeName::NonNull(_))
    }

    pub fn is_list(&self) -> bool {
        let ty = match MetaTypeName::create(&self.0) {
            MetaTypeName::NonNull(inner) => inner,
            _ => self.0.as_str(),
        };
        matches!(MetaTypeName::create(ty), MetaTypeName::List(_))
    }
}

impl From<&str> for MetaFieldType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MetaFieldType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for MetaFieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unwrapping step of a type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaTypeName<'a> {
    NonNull(&'a str),
    List(&'a str),
    Named(&'a str),
}

impl<'a> MetaTypeName<'a> {
    pub fn create(ty: &'a str) -> Self {
        if let Some(inner) = ty.strip_suffix('!') {
            MetaTypeName::NonNull(inner)
        } else if ty.starts_with('[') && ty.ends_with(']') {
            MetaTypeName::List(&ty[1..ty.len() - 1])
        } else {
            MetaTypeName::Named(ty)
        }
    }
}

/// A directive applied to a field definition in the schema, e.g.
/// `@lowercase` on `name: String @lowercase`.
#[derive(Debug, Clone)]
pub struct MetaDirective {
    pub name: String,
    pub args: IndexMap<Name, ConstValue>,
}

#[derive(Debug, Clone)]
pub struct MetaField {
    pub name: String,
    pub description: Option<String>,
    pub args: IndexMap<String, MetaInputValue>,
    pub ty: MetaFieldType,
    pub resolver: Resolver,
    /// Label used for the field's tracing span.
    pub trace_label: String,
    pub deprecation: Option<String>,
    pub directives: Vec<MetaDirective>,
}

#[derive(Debug, Clone)]
pub struct MetaInputValue {
    pub name: String,
    pub description: Option<String>,
    pub ty: MetaFieldType,
    pub default_value: Option<ConstValue>,
}

#[derive(Debug, Clone)]
pub struct MetaEnumValue {
    pub name: String,
    pub description: Option<String>,
    pub deprecation: Option<String>,
}

#[derive(Debug)]
pub struct ObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, MetaField>,
    pub implements: Vec<String>,
}

#[derive(Debug)]
pub struct InterfaceType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, MetaField>,
    /// Object types implementing this interface, lexically ordered so that
    /// runtime discrimination is deterministic.
    pub possible_types: Vec<String>,
    pub(crate) discriminators: Vec<(String, TypeDiscriminator)>,
}

#[derive(Debug)]
pub struct UnionType {
    pub name: String,
    pub description: Option<String>,
    /// Member types, lexically ordered so that runtime discrimination is
    /// deterministic.
    pub possible_types: Vec<String>,
    pub(crate) discriminators: Vec<(String, TypeDiscriminator)>,
}

#[derive(Debug)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub values: IndexMap<String, MetaEnumValue>,
}

#[derive(Debug)]
pub struct ScalarType {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct InputObjectType {
    pub name: String,
    pub description: Option<String>,
    pub input_fields: IndexMap<String, MetaInputValue>,
}

#[derive(Debug)]
pub enum MetaType {
    Object(ObjectType),
    Interface(InterfaceType),
    Union(UnionType),
    Enum(EnumType),
    Scalar(ScalarType),
    InputObject(InputObjectType),
}

impl MetaType {
    pub fn name(&self) -> &str {
        match self {
            MetaType::Object(inner) => &inner.name,
            MetaType::Interface(inner) => &inner.name,
            MetaType::Union(inner) => &inner.name,
            MetaType::Enum(inner) => &inner.name,
            MetaType::Scalar(inner) => &inner.name,
            MetaType::InputObject(inner) => &inner.name,
        }
    }

    pub fn field(&self, name: &str) -> Option<&MetaField> {
        match self {
            MetaType::Object(inner) => inner.fields.get(name),
            MetaType::Interface(inner) => inner.fields.get(name),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            MetaType::Object(_) | MetaType::Interface(_) | MetaType::Union(_)
        )
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, MetaType::Interface(_) | MetaType::Union(_))
    }

    fn possible_types(&self) -> Option<&[String]> {
        match self {
            MetaType::Interface(inner) => Some(&inner.possible_types),
            MetaType::Union(inner) => Some(&inner.possible_types),
            _ => None,
        }
    }

    fn discriminators(&self) -> &[(String, TypeDiscriminator)] {
        match self {
            MetaType::Interface(inner) => &inner.discriminators,
            MetaType::Union(inner) => &inner.discriminators,
            _ => &[],
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    pub types: IndexMap<String, MetaType>,
    pub query_type: String,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    /// Synthesized `__typename` entries resolve through this field.
    pub(crate) typename_field: MetaField,
}

impl Registry {
    pub fn lookup_type(&self, name: &str) -> Option<&MetaType> {
        self.types.get(name)
    }

    pub fn root_type(&self, operation_type: OperationType) -> Option<&MetaType> {
        let name = match operation_type {
            OperationType::Query => Some(self.query_type.as_str()),
            OperationType::Mutation => self.mutation_type.as_deref(),
            OperationType::Subscription => self.subscription_type.as_deref(),
        }?;
        self.types.get(name)
    }

    /// Determines the concrete object type a runtime value represents within
    /// an abstract (interface or union) type.
    ///
    /// A `__typename` property naming a possible type always wins. After
    /// that, discriminators run in lexical order of the member type name,
    /// fallbacks last. A single possible type needs no discrimination.
    pub fn concrete_type_name<'a>(
        &'a self,
        ty: &'a MetaType,
        value: &serde_json::Value,
    ) -> Option<&'a str> {
        let possible = match ty.possible_types() {
            Some(possible) => possible,
            None => return Some(ty.name()),
        };

        if let Some(serde_json::Value::String(type_name)) = value.get("__typename") {
            if let Some(name) = possible.iter().find(|name| *name == type_name) {
                return Some(name);
            }
        }

        let discriminators = ty.discriminators();
        for (name, discriminator) in discriminators {
            if !matches!(discriminator, TypeDiscriminator::Fallback) && discriminator.matches(value) {
                return Some(name);
            }
        }
        for (name, discriminator) in discriminators {
            if matches!(discriminator, TypeDiscriminator::Fallback) {
                return Some(name);
            }
        }

        if possible.len() == 1 {
            return Some(&possible[0]);
        }
        None
    }

    /// Does `value`, seen as an instance of `enclosing`, satisfy a fragment
    /// condition on `target`?
    pub fn type_condition_matches(
        &self,
        enclosing: &MetaType,
        target: &MetaType,
        value: &serde_json::Value,
    ) -> bool {
        let concrete = match self.concrete_type_name(enclosing, value) {
            Some(concrete) => concrete,
            None => return false,
        };

        match target {
            MetaType::Object(object) => object.name == concrete,
            MetaType::Interface(interface) => {
                interface.possible_types.iter().any(|name| name == concrete)
            }
            MetaType::Union(union) => union.possible_types.iter().any(|name| name == concrete),
            _ => false,
        }
    }
}
