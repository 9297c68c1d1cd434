//! The Runtime Dictionary: a bounded per-method history of successful
//! responses, consulted by the Data Generator to satisfy consumer
//! parameters from values observed in earlier producer outputs.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::request::Response;

const FIFO_LENGTH: usize = 20;

#[derive(Default)]
pub struct RuntimeDictionary {
    responses: HashMap<String, VecDeque<Response>>,
    /// Keyed by (method, attribute_path).
    values: HashMap<(String, String), VecDeque<Value>>,
}

impl RuntimeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a response. Responses with status >= 300 are rejected, per
    /// the runtime dictionary's "only learn from success" contract.
    pub fn add_response(&mut self, response: Response) {
        if response.status_code >= 300 {
            return;
        }
        let method = response.method.clone();

        let mut leaves = Vec::new();
        flatten_into("", &response.body, &mut leaves);
        for (path, value) in leaves {
            let slot = self
                .values
                .entry((method.clone(), path))
                .or_insert_with(|| VecDeque::with_capacity(FIFO_LENGTH));
            if slot.len() == FIFO_LENGTH {
                slot.pop_front();
            }
            slot.push_back(value);
        }

        let slot = self
            .responses
            .entry(method)
            .or_insert_with(|| VecDeque::with_capacity(FIFO_LENGTH));
        if slot.len() == FIFO_LENGTH {
            slot.pop_front();
        }
        slot.push_back(response);
    }

    /// Returns the most recently observed value for `(method, attribute_path)`,
    /// if any producer has ever returned one.
    pub fn latest_value(&self, method: &str, attribute_path: &str) -> Option<&Value> {
        self.values
            .get(&(method.to_string(), attribute_path.to_string()))
            .and_then(|v| v.back())
    }

    pub fn has_succeeded(&self, method: &str) -> bool {
        self.responses.get(method).is_some_and(|d| !d.is_empty())
    }

    pub fn known_methods(&self) -> impl Iterator<Item = &String> {
        self.responses.keys()
    }
}

/// Recurses into a response body, collecting `(dotted.path, value)` pairs
/// for every leaf (i.e. non-object) value, mirroring the dotted attribute
/// paths `schema_to_attribute` assigns to response attributes.
fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, v, out);
            }
        }
        other => out.push((prefix.to_string(), other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response(method: &str, body: Value) -> Response {
        Response {
            status_code: 200,
            method: method.to_string(),
            body,
            set_cookies: Vec::new(),
        }
    }

    #[test]
    fn rejects_non_success_responses() {
        let mut dict = RuntimeDictionary::new();
        let mut bad = ok_response("createPet", serde_json::json!({"id": 1}));
        bad.status_code = 500;
        dict.add_response(bad);
        assert!(!dict.has_succeeded("createPet"));
        assert!(dict.latest_value("createPet", "id").is_none());
    }

    #[test]
    fn records_body_fields_for_lookup() {
        let mut dict = RuntimeDictionary::new();
        dict.add_response(ok_response("createPet", serde_json::json!({"id": 42})));
        assert_eq!(dict.latest_value("createPet", "id"), Some(&Value::from(42)));
    }

    #[test]
    fn records_nested_object_fields_by_dotted_path() {
        let mut dict = RuntimeDictionary::new();
        dict.add_response(ok_response(
            "createPet",
            serde_json::json!({"id": 42, "owner": {"name": "alice"}}),
        ));
        assert_eq!(
            dict.latest_value("createPet", "owner.name"),
            Some(&Value::from("alice"))
        );
    }

    #[test]
    fn fifo_bounded_at_twenty() {
        let mut dict = RuntimeDictionary::new();
        for i in 0..30 {
            dict.add_response(ok_response("createPet", serde_json::json!({"id": i})));
        }
        assert_eq!(dict.responses.get("createPet").unwrap().len(), FIFO_LENGTH);
        assert_eq!(dict.latest_value("createPet", "id"), Some(&Value::from(29)));
    }
}
