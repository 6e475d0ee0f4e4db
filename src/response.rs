use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::ServerError;

/// A GraphQL response, ready to be JSON-encoded.
///
/// `data` holds the already-serialized response bytes; it is absent when a
/// terminal error prevented execution. Errors are intentionally serialized
/// before `data`, following the spec's recommended field order.
#[derive(Debug, Default, Serialize)]
pub struct Response {
    /// The errors that occurred, in completion order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ServerError>,

    /// The serialized response data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,

    /// Extensions to the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, serde_json::Value>>,
}

impl Response {
    pub(crate) fn new(data: Vec<u8>, errors: Vec<ServerError>) -> Self {
        let data = String::from_utf8(data)
            .ok()
            .and_then(|json| RawValue::from_string(json).ok());
        Self {
            errors,
            data,
            extensions: None,
        }
    }

    /// A response carrying only errors, no data.
    pub fn from_errors(errors: Vec<ServerError>) -> Self {
        Self {
            errors,
            data: None,
            extensions: None,
        }
    }

    pub fn from_error(error: ServerError) -> Self {
        Self::from_errors(vec![error])
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Parses `data` back into a JSON value. Mostly useful for consumers that
    /// post-process responses (and for tests); serialization does not pay for
    /// this round-trip.
    pub fn data_json(&self) -> Option<serde_json::Value> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_str(data.get()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_serialize_before_data() {
        let response = Response::new(
            b"{\"a\":1}".to_vec(),
            vec![ServerError::new("boom", None)],
        );
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"errors":[{"message":"boom"}],"data":{"a":1}}"#);
    }

    #[test]
    fn empty_errors_are_omitted() {
        let response = Response::new(b"{\"a\":1}".to_vec(), Vec::new());
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"data":{"a":1}}"#);
        assert!(response.is_ok());
    }

    #[test]
    fn data_round_trips_through_data_json() {
        let response = Response::new(b"{\"hello\":\"world\"}".to_vec(), Vec::new());
        assert_eq!(
            response.data_json().unwrap(),
            serde_json::json!({"hello": "world"})
        );
    }
}
