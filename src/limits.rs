//! Pre-execution guards over the raw query and the parsed operation.

use async_graphql_parser::types::{ExecutableDocument, OperationDefinition, Selection, SelectionSet};

use crate::error::{ServerError, ServerResult};

/// Rejects raw query strings longer than `max_length` bytes. Zero disables
/// the check.
pub(crate) fn check_query_length(query: &str, max_length: usize) -> ServerResult<()> {
    if max_length > 0 && query.len() > max_length {
        return Err(ServerError::new(
            format!(
                "query length {} exceeds the maximum allowed query length of {max_length} bytes",
                query.len()
            ),
            None,
        ));
    }
    Ok(())
}

/// Rejects operations nesting fields deeper than `max_depth`. Zero disables
/// the check. Fragment spreads count at the depth they are spread at.
pub(crate) fn check_depth(
    document: &ExecutableDocument,
    operation: &OperationDefinition,
    max_depth: usize,
) -> ServerResult<()> {
    if max_depth == 0 {
        return Ok(());
    }
    let mut visited_fragments = Vec::new();
    let depth = selection_set_depth(document, &operation.selection_set.node, &mut visited_fragments);
    if depth > max_depth {
        return Err(ServerError::new(
            format!("the query exceeds the maximum depth of {max_depth}"),
            None,
        ));
    }
    Ok(())
}

fn selection_set_depth<'a>(
    document: &'a ExecutableDocument,
    selection_set: &'a SelectionSet,
    visited_fragments: &mut Vec<&'a str>,
) -> usize {
    selection_set
        .items
        .iter()
        .map(|item| match &item.node {
            Selection::Field(field) => {
                1 + selection_set_depth(document, &field.node.selection_set.node, visited_fragments)
            }
            Selection::InlineFragment(inline) => {
                selection_set_depth(document, &inline.node.selection_set.node, visited_fragments)
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.node.fragment_name.node.as_str();
                if visited_fragments.contains(&name) {
                    return 0;
                }
                match document.fragments.get(name) {
                    Some(fragment) => {
                        visited_fragments.push(name);
                        let depth = selection_set_depth(
                            document,
                            &fragment.node.selection_set.node,
                            visited_fragments,
                        );
                        visited_fragments.pop();
                        depth
                    }
                    None => 0,
                }
            }
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use async_graphql_parser::parse_query;
    use async_graphql_parser::types::DocumentOperations;

    use super::*;

    fn depth_of(query: &str) -> usize {
        let document = parse_query(query).unwrap();
        let DocumentOperations::Single(operation) = &document.operations else {
            unreachable!()
        };
        let mut visited = Vec::new();
        selection_set_depth(&document, &operation.node.selection_set.node, &mut visited)
    }

    #[test]
    fn depth_counts_nested_fields() {
        assert_eq!(depth_of("{ a }"), 1);
        assert_eq!(depth_of("{ a { b { c } } d }"), 3);
    }

    #[test]
    fn fragments_count_at_their_spread_depth() {
        assert_eq!(depth_of("{ a { ...F } } fragment F on T { b { c } }"), 3);
        assert_eq!(depth_of("{ ... on T { a } }"), 1);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let document = parse_query("{ a { b { c } } }").unwrap();
        let DocumentOperations::Single(operation) = &document.operations else {
            unreachable!()
        };
        assert!(check_depth(&document, &operation.node, 3).is_ok());
        let err = check_depth(&document, &operation.node, 2).unwrap_err();
        assert!(err.message.contains("maximum depth of 2"));
    }

    #[test]
    fn query_length_limit_is_enforced() {
        assert!(check_query_length("{ a }", 0).is_ok());
        assert!(check_query_length("{ a }", 5).is_ok());
        let err = check_query_length("{ aaaa }", 5).unwrap_err();
        assert!(err.message.contains("maximum allowed query length"));
    }
}
