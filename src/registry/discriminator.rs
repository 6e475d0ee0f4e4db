use serde_json::Value;

/// Specifies how to determine which possible type an abstract (union or
/// interface) value represents when the value does not carry `__typename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDiscriminator {
    /// If the named field is present then this is the correct type.
    FieldPresent(String),
    /// This is the correct type if the given field has one of the provided values.
    FieldHasValue(String, Vec<Value>),
    /// This is the correct type if the value is of a particular scalar kind.
    IsAScalar(ScalarKind),
    /// Fall back on this type if no others match.
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
}

impl TypeDiscriminator {
    /// Checks if the provided data matches this discriminator.
    pub fn matches(&self, data: &Value) -> bool {
        match (self, data) {
            (TypeDiscriminator::Fallback, _) => return true,
            (TypeDiscriminator::IsAScalar(ScalarKind::Boolean), Value::Bool(_)) => return true,
            (TypeDiscriminator::IsAScalar(ScalarKind::String), Value::String(_)) => return true,
            (TypeDiscriminator::IsAScalar(ScalarKind::Number), Value::Number(_)) => return true,
            (TypeDiscriminator::IsAScalar(_), _) => return false,
            _ => {}
        }

        let Value::Object(object) = data else {
            // The other discriminators only support objects.
            return false;
        };

        match self {
            TypeDiscriminator::FieldPresent(field) => object.contains_key(field),
            TypeDiscriminator::FieldHasValue(field, expected_values) => {
                let Some(actual_value) = object.get(field) else {
                    return false;
                };

                expected_values
                    .iter()
                    .any(|expected_value| expected_value == actual_value)
            }
            TypeDiscriminator::Fallback | TypeDiscriminator::IsAScalar(_) => {
                unreachable!()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_field_present() {
        let discriminator = TypeDiscriminator::FieldPresent("myField".into());

        assert!(discriminator.matches(&json!({ "myField": "whatevs"})));
        assert!(!discriminator.matches(&json!({ "otherField": "whatevs"})));
    }

    #[test]
    fn test_field_has_value() {
        let discriminator = TypeDiscriminator::FieldHasValue("myField".into(), vec![json!("one"), json!(true)]);

        assert!(discriminator.matches(&json!({ "myField": "one"})));
        assert!(discriminator.matches(&json!({ "myField": true })));
        assert!(!discriminator.matches(&json!({ "myField": false })));
        assert!(!discriminator.matches(&json!({ "myField": "two" })));
        assert!(!discriminator.matches(&json!({ "otherField": "one"})));
    }

    #[test]
    fn test_scalar_kinds() {
        let discriminator = TypeDiscriminator::IsAScalar(ScalarKind::Number);

        assert!(discriminator.matches(&json!(1)));
        assert!(!discriminator.matches(&json!("1")));
        assert!(!discriminator.matches(&json!({ "a": 1 })));
    }

    #[test]
    fn test_fallback() {
        let discriminator = TypeDiscriminator::Fallback;

        assert!(discriminator.matches(&json!({ "myField": "one"})));
        assert!(discriminator.matches(&json!(false)));
    }
}
