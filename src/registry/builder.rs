//! Builds the [`Registry`] out of a schema definition and the registered
//! resolver entries. Runs once when the schema is built; execution never
//! touches the schema language again.

use std::collections::HashMap;

use async_graphql_parser::{
    parse_schema,
    types::{self as ast, TypeKind, TypeSystemDefinition},
};
use async_graphql_value::ConstValue;
use indexmap::IndexMap;

use super::{
    EnumType, InputObjectType, InterfaceType, MetaDirective, MetaEnumValue, MetaField,
    MetaInputValue, MetaType, ObjectType, Registry, ScalarType, TypeDiscriminator, UnionType,
};
use crate::{
    error::{Error, SchemaError},
    resolvers::Resolver,
};

const BUILTIN_SCALARS: &[&str] = &["Int", "Float", "String", "Boolean", "ID"];

pub(crate) struct BindConfig {
    pub resolvers: HashMap<(String, String), Resolver>,
    pub discriminators: Vec<(String, String, TypeDiscriminator)>,
    pub introspection_schema: Option<Resolver>,
    pub introspection_type: Option<Resolver>,
    pub use_field_resolvers: bool,
    pub use_string_descriptions: bool,
}

impl BindConfig {
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
            discriminators: Vec::new(),
            introspection_schema: None,
            introspection_type: None,
            use_field_resolvers: false,
            use_string_descriptions: false,
        }
    }

    /// Binding that falls back to property access everywhere; used by unit
    /// tests that only care about the schema shape.
    #[cfg(test)]
    pub fn lenient() -> Self {
        Self {
            use_field_resolvers: true,
            ..Self::new()
        }
    }
}

pub(crate) fn build_registry(sdl: &str, mut config: BindConfig) -> Result<Registry, SchemaError> {
    let document = parse_schema(sdl).map_err(|err| SchemaError::Parse(err.to_string()))?;

    let mut types = IndexMap::new();
    let mut roots: (Option<String>, Option<String>, Option<String>) = (None, None, None);

    for definition in &document.definitions {
        match definition {
            TypeSystemDefinition::Schema(schema) => {
                roots.0 = schema.node.query.as_ref().map(|name| name.node.to_string());
                roots.1 = schema.node.mutation.as_ref().map(|name| name.node.to_string());
                roots.2 = schema.node.subscription.as_ref().map(|name| name.node.to_string());
            }
            TypeSystemDefinition::Type(ty) => {
                let meta = build_type(&ty.node, &config)?;
                types.insert(meta.name().to_string(), meta);
            }
            TypeSystemDefinition::Directive(_) => {}
        }
    }

    for scalar in BUILTIN_SCALARS {
        if !types.contains_key(*scalar) {
            types.insert(
                scalar.to_string(),
                MetaType::Scalar(ScalarType {
                    name: scalar.to_string(),
                    description: None,
                }),
            );
        }
    }

    let query_type = roots.0.unwrap_or_else(|| "Query".to_string());
    let mutation_type = roots
        .1
        .or_else(|| types.contains_key("Mutation").then(|| "Mutation".to_string()));
    let subscription_type = roots
        .2
        .or_else(|| types.contains_key("Subscription").then(|| "Subscription".to_string()));

    validate_root(&types, &query_type, true)?;
    if let Some(name) = &mutation_type {
        validate_root(&types, name, false)?;
    }
    if let Some(name) = &subscription_type {
        validate_root(&types, name, false)?;
    }

    fill_possible_types(&mut types);
    attach_discriminators(&mut types, std::mem::take(&mut config.discriminators))?;

    let mut registry = Registry {
        types,
        query_type,
        mutation_type,
        subscription_type,
        typename_field: typename_field(),
    };

    bind_resolvers(&mut registry, &mut config)?;
    inject_introspection_fields(&mut registry, config)?;

    Ok(registry)
}

fn validate_root(
    types: &IndexMap<String, MetaType>,
    name: &str,
    mandatory: bool,
) -> Result<(), SchemaError> {
    match types.get(name) {
        Some(MetaType::Object(_)) => Ok(()),
        Some(_) => Err(SchemaError::InvalidRootOperation(name.to_string())),
        None if mandatory => Err(SchemaError::MissingQueryRoot),
        None => Err(SchemaError::InvalidRootOperation(name.to_string())),
    }
}

fn build_type(ty: &ast::TypeDefinition, config: &BindConfig) -> Result<MetaType, SchemaError> {
    let name = ty.name.node.to_string();
    let description = description_of(&ty.description, config);
    Ok(match &ty.kind {
        TypeKind::Scalar => MetaType::Scalar(ScalarType { name, description }),
        TypeKind::Object(object) => MetaType::Object(ObjectType {
            fields: build_fields(&name, &object.fields, config),
            implements: object
                .implements
                .iter()
                .map(|interface| interface.node.to_string())
                .collect(),
            name,
            description,
        }),
        TypeKind::Interface(interface) => MetaType::Interface(InterfaceType {
            fields: build_fields(&name, &interface.fields, config),
            possible_types: Vec::new(),
            discriminators: Vec::new(),
            name,
            description,
        }),
        TypeKind::Union(union) => MetaType::Union(UnionType {
            possible_types: {
                let mut members: Vec<_> =
                    union.members.iter().map(|member| member.node.to_string()).collect();
                members.sort();
                members
            },
            discriminators: Vec::new(),
            name,
            description,
        }),
        TypeKind::Enum(enum_type) => MetaType::Enum(EnumType {
            values: enum_type
                .values
                .iter()
                .map(|value| {
                    let value_name = value.node.value.node.to_string();
                    (
                        value_name.clone(),
                        MetaEnumValue {
                            name: value_name,
                            description: description_of(&value.node.description, config),
                            deprecation: deprecation_of(&value.node.directives),
                        },
                    )
                })
                .collect(),
            name,
            description,
        }),
        TypeKind::InputObject(input_object) => MetaType::InputObject(InputObjectType {
            input_fields: input_object
                .fields
                .iter()
                .map(|field| {
                    let input = build_input_value(&field.node, config);
                    (input.name.clone(), input)
                })
                .collect(),
            name,
            description,
        }),
    })
}

fn build_fields(
    type_name: &str,
    fields: &[async_graphql_parser::Positioned<ast::FieldDefinition>],
    config: &BindConfig,
) -> IndexMap<String, MetaField> {
    fields
        .iter()
        .map(|field| {
            let field_name = field.node.name.node.to_string();
            let meta = MetaField {
                description: description_of(&field.node.description, config),
                args: field
                    .node
                    .arguments
                    .iter()
                    .map(|argument| {
                        let input = build_input_value(&argument.node, config);
                        (input.name.clone(), input)
                    })
                    .collect(),
                ty: field.node.ty.node.to_string().into(),
                // Bound for real in bind_resolvers; Parent is the placeholder.
                resolver: Resolver::Parent,
                trace_label: format!("GraphQL field: {type_name}.{field_name}"),
                deprecation: deprecation_of(&field.node.directives),
                directives: other_directives(&field.node.directives),
                name: field_name.clone(),
            };
            (field_name, meta)
        })
        .collect()
}

fn build_input_value(input: &ast::InputValueDefinition, config: &BindConfig) -> MetaInputValue {
    MetaInputValue {
        name: input.name.node.to_string(),
        description: description_of(&input.description, config),
        ty: input.ty.node.to_string().into(),
        default_value: input.default_value.as_ref().map(|value| value.node.clone()),
    }
}

fn description_of(
    description: &Option<async_graphql_parser::Positioned<String>>,
    config: &BindConfig,
) -> Option<String> {
    // Descriptions are only kept when string descriptions are enabled; the
    // pre-2018 comment syntax is not recoverable from the parsed document.
    config
        .use_string_descriptions
        .then(|| description.as_ref().map(|description| description.node.clone()))
        .flatten()
}

fn deprecation_of(
    directives: &[async_graphql_parser::Positioned<ast::ConstDirective>],
) -> Option<String> {
    directives
        .iter()
        .find(|directive| directive.node.name.node.as_str() == "deprecated")
        .map(|directive| {
            directive
                .node
                .get_argument("reason")
                .and_then(|value| match &value.node {
                    ConstValue::String(reason) => Some(reason.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "No longer supported".to_string())
        })
}

fn other_directives(
    directives: &[async_graphql_parser::Positioned<ast::ConstDirective>],
) -> Vec<MetaDirective> {
    directives
        .iter()
        .filter(|directive| directive.node.name.node.as_str() != "deprecated")
        .map(|directive| MetaDirective {
            name: directive.node.name.node.to_string(),
            args: directive
                .node
                .arguments
                .iter()
                .map(|(name, value)| (name.node.clone(), value.node.clone()))
                .collect(),
        })
        .collect()
}

fn fill_possible_types(types: &mut IndexMap<String, MetaType>) {
    let mut by_interface: HashMap<String, Vec<String>> = HashMap::new();
    for ty in types.values() {
        if let MetaType::Object(object) = ty {
            for interface in &object.implements {
                by_interface
                    .entry(interface.clone())
                    .or_default()
                    .push(object.name.clone());
            }
        }
    }
    for ty in types.values_mut() {
        if let MetaType::Interface(interface) = ty {
            let mut possible = by_interface.remove(&interface.name).unwrap_or_default();
            possible.sort();
            interface.possible_types = possible;
        }
    }
}

fn attach_discriminators(
    types: &mut IndexMap<String, MetaType>,
    discriminators: Vec<(String, String, TypeDiscriminator)>,
) -> Result<(), SchemaError> {
    for (abstract_name, member, discriminator) in discriminators {
        let slot = match types.get_mut(&abstract_name) {
            Some(MetaType::Union(union)) if union.possible_types.contains(&member) => {
                &mut union.discriminators
            }
            Some(MetaType::Interface(interface)) if interface.possible_types.contains(&member) => {
                &mut interface.discriminators
            }
            _ => return Err(SchemaError::UnknownMember(format!("{abstract_name}.{member}"))),
        };
        slot.push((member, discriminator));
    }
    // Deterministic evaluation order: lexical by member name. Fallbacks are
    // consulted last regardless of position (see Registry::concrete_type_name).
    for ty in types.values_mut() {
        let slot = match ty {
            MetaType::Union(union) => &mut union.discriminators,
            MetaType::Interface(interface) => &mut interface.discriminators,
            _ => continue,
        };
        slot.sort_by(|(a, _), (b, _)| a.cmp(b));
    }
    Ok(())
}

fn bind_resolvers(registry: &mut Registry, config: &mut BindConfig) -> Result<(), SchemaError> {
    let subscription_root = registry.subscription_type.clone();

    for ty in registry.types.values_mut() {
        let (type_name, fields, is_subscription_root) = match ty {
            MetaType::Object(object) => (
                object.name.clone(),
                &mut object.fields,
                Some(object.name.as_str()) == subscription_root.as_deref(),
            ),
            MetaType::Interface(interface) => (interface.name.clone(), &mut interface.fields, false),
            _ => continue,
        };

        for field in fields.values_mut() {
            let key = (type_name.clone(), field.name.clone());
            match config.resolvers.remove(&key) {
                Some(resolver) => {
                    match (&resolver, is_subscription_root) {
                        (Resolver::Subscription(_), false) => {
                            return Err(SchemaError::MisplacedSubscriptionResolver {
                                type_name: key.0,
                                field_name: key.1,
                            });
                        }
                        (Resolver::Subscription(_), true) => {}
                        (_, true) => {
                            return Err(SchemaError::NotASubscriptionResolver {
                                type_name: key.0,
                                field_name: key.1,
                            });
                        }
                        (_, false) => {}
                    }
                    field.resolver = resolver;
                }
                None if config.use_field_resolvers && !is_subscription_root => {
                    field.resolver = Resolver::Property(field.name.clone());
                }
                None => {
                    return Err(SchemaError::MissingResolver {
                        type_name: key.0,
                        field_name: key.1,
                    });
                }
            }
        }
    }

    if let Some((type_name, field_name)) = config.resolvers.keys().next() {
        return Err(SchemaError::UnknownMember(format!("{type_name}.{field_name}")));
    }

    Ok(())
}

/// Adds `__schema` / `__type` to the query root, routed to the registered
/// introspection resolver. Introspection data generation itself lives outside
/// the engine; without a registered resolver the fields report that they are
/// unavailable.
fn inject_introspection_fields(registry: &mut Registry, config: BindConfig) -> Result<(), SchemaError> {
    for scalar in ["__Schema", "__Type"] {
        registry.types.insert(
            scalar.to_string(),
            MetaType::Scalar(ScalarType {
                name: scalar.to_string(),
                description: None,
            }),
        );
    }

    let query_type = registry.query_type.clone();
    let Some(MetaType::Object(query_root)) = registry.types.get_mut(&query_type) else {
        return Err(SchemaError::MissingQueryRoot);
    };

    query_root.fields.insert(
        "__schema".to_string(),
        MetaField {
            name: "__schema".to_string(),
            description: None,
            args: IndexMap::new(),
            ty: "__Schema!".into(),
            resolver: config
                .introspection_schema
                .unwrap_or_else(unavailable_introspection_resolver),
            trace_label: format!("GraphQL field: {query_type}.__schema"),
            deprecation: None,
            directives: Vec::new(),
        },
    );
    query_root.fields.insert(
        "__type".to_string(),
        MetaField {
            name: "__type".to_string(),
            description: None,
            args: [(
                "name".to_string(),
                MetaInputValue {
                    name: "name".to_string(),
                    description: None,
                    ty: "String!".into(),
                    default_value: None,
                },
            )]
            .into_iter()
            .collect(),
            ty: "__Type".into(),
            resolver: config
                .introspection_type
                .unwrap_or_else(unavailable_introspection_resolver),
            trace_label: format!("GraphQL field: {query_type}.__type"),
            deprecation: None,
            directives: Vec::new(),
        },
    );

    Ok(())
}

fn unavailable_introspection_resolver() -> Resolver {
    Resolver::sync_fn(|_| Err(Error::new("introspection is not available")))
}

fn typename_field() -> MetaField {
    MetaField {
        name: "__typename".to_string(),
        description: None,
        args: IndexMap::new(),
        ty: "String!".into(),
        resolver: Resolver::Typename,
        trace_label: "GraphQL field: __typename".to_string(),
        deprecation: None,
        directives: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SDL: &str = r#"
        schema { query: TheQuery }
        type TheQuery {
            pet: Pet
            greeting(name: String! = "you"): String
        }
        union Pet = Dog | Cat
        type Dog { barks: Boolean }
        type Cat { meows: Boolean }
    "#;

    #[test]
    fn roots_follow_the_schema_definition() {
        let registry = build_registry(SDL, BindConfig::lenient()).unwrap();
        assert_eq!(registry.query_type, "TheQuery");
        assert!(registry.mutation_type.is_none());
        assert!(registry.lookup_type("TheQuery").is_some());
    }

    #[test]
    fn union_members_are_lexically_ordered() {
        let registry = build_registry(SDL, BindConfig::lenient()).unwrap();
        let Some(MetaType::Union(pet)) = registry.lookup_type("Pet") else {
            panic!("expected a union");
        };
        assert_eq!(pet.possible_types, vec!["Cat", "Dog"]);
    }

    #[test]
    fn missing_resolvers_fail_the_build_when_strict() {
        let err = build_registry(SDL, BindConfig::new()).unwrap_err();
        assert!(matches!(err, SchemaError::MissingResolver { .. }));
    }

    #[test]
    fn missing_query_root_is_rejected() {
        let err = build_registry("type Mutation { x: Int }", BindConfig::lenient()).unwrap_err();
        assert!(matches!(err, SchemaError::MissingQueryRoot));
    }

    #[test]
    fn interface_possible_types_are_filled() {
        let registry = build_registry(
            r#"
            type Query { node: Node }
            interface Node { id: ID }
            type User implements Node { id: ID }
            type Post implements Node { id: ID }
            "#,
            BindConfig::lenient(),
        )
        .unwrap();
        let Some(MetaType::Interface(node)) = registry.lookup_type("Node") else {
            panic!("expected an interface");
        };
        assert_eq!(node.possible_types, vec!["Post", "User"]);
    }

    #[test]
    fn discrimination_prefers_typename_then_discriminators() {
        let mut config = BindConfig::lenient();
        config.discriminators = vec![
            ("Pet".to_string(), "Dog".to_string(), TypeDiscriminator::FieldPresent("barks".into())),
            ("Pet".to_string(), "Cat".to_string(), TypeDiscriminator::FieldPresent("meows".into())),
        ];
        let registry = build_registry(SDL, config).unwrap();
        let pet = registry.lookup_type("Pet").unwrap();

        assert_eq!(
            registry.concrete_type_name(pet, &json!({"__typename": "Cat"})),
            Some("Cat")
        );
        assert_eq!(
            registry.concrete_type_name(pet, &json!({"barks": true})),
            Some("Dog")
        );
        assert_eq!(registry.concrete_type_name(pet, &json!({"wings": 2})), None);
    }

    #[test]
    fn unknown_resolver_registrations_are_reported() {
        let mut config = BindConfig::lenient();
        config
            .resolvers
            .insert(("TheQuery".to_string(), "nope".to_string()), Resolver::Parent);
        let err = build_registry(SDL, config).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownMember(member) if member == "TheQuery.nope"));
    }

    #[test]
    fn introspection_fields_are_injected() {
        let registry = build_registry(SDL, BindConfig::lenient()).unwrap();
        let root = registry.lookup_type("TheQuery").unwrap();
        assert!(root.field("__schema").is_some());
        assert!(root.field("__type").is_some());
    }
}
