use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// A segment of a response path, either an object key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{name}"),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Path from the response root to the field currently being resolved.
///
/// Extending the path shares the prefix with the parent, so sibling fields
/// resolving concurrently append segments without copying each other's
/// prefixes. The path is only flattened when it gets attached to an error.
#[derive(Debug, Clone, Default)]
pub struct ResponsePath(Option<Arc<PathNode>>);

#[derive(Debug)]
struct PathNode {
    parent: Option<Arc<PathNode>>,
    segment: PathSegment,
}

impl ResponsePath {
    pub fn root() -> Self {
        Self(None)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    #[must_use]
    pub fn child_field(&self, name: impl Into<String>) -> Self {
        self.child(PathSegment::Field(name.into()))
    }

    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    fn child(&self, segment: PathSegment) -> Self {
        Self(Some(Arc::new(PathNode {
            parent: self.0.clone(),
            segment,
        })))
    }

    /// Flattens the path into root-first order.
    pub fn to_vec(&self) -> Vec<PathSegment> {
        let mut segments = Vec::new();
        let mut current = self.0.as_deref();
        while let Some(node) = current {
            segments.push(node.segment.clone());
            current = node.parent.as_deref();
        }
        segments.reverse();
        segments
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.to_vec().iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_prefixes() {
        let root = ResponsePath::root();
        let user = root.child_field("user");
        let name = user.child_field("name");
        let friend = user.child_field("friends").child_index(2);

        assert_eq!(root.to_vec(), vec![]);
        assert_eq!(
            name.to_vec(),
            vec![
                PathSegment::Field("user".into()),
                PathSegment::Field("name".into())
            ]
        );
        assert_eq!(
            friend.to_vec(),
            vec![
                PathSegment::Field("user".into()),
                PathSegment::Field("friends".into()),
                PathSegment::Index(2)
            ]
        );
    }

    #[test]
    fn segments_serialize_untagged() {
        let path = ResponsePath::root().child_field("items").child_index(1);
        assert_eq!(
            serde_json::to_value(path.to_vec()).unwrap(),
            serde_json::json!(["items", 1])
        );
    }

    #[test]
    fn display_joins_segments() {
        let path = ResponsePath::root().child_field("a").child_index(0).child_field("b");
        assert_eq!(path.to_string(), "a.0.b");
    }
}
