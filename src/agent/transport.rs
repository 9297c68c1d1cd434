//! The LLM transport contract: a text-in/text-out channel, opaque to the
//! rest of the core. Prompt construction and result-line parsing live here;
//! the wire format of the actual network call is this module's concern
//! alone.

use anyhow::Result;

use crate::datagen::FILE_PLACEHOLDER;
use crate::sequence::Sequence;
use crate::spec::Method;

pub const INIT_PROMPT: &str =
    "You are an experienced RESTful API tester helping to write test cases.";

/// Implemented by whatever actually talks to the model. Returns the model's
/// reply text and, if the transport maintains server-side conversation
/// state, an updated conversation handle to pass to the next call.
pub trait LlmTransport {
    fn send(&self, prompt: &str, conversation_id: Option<&str>) -> Result<(String, Option<String>)>;
}

/// Calls a configured HTTP endpoint expecting `{"prompt", "conversation_id"}`
/// in and `{"text", "conversation_id"}` out. Any text-completion HTTP
/// service can sit behind this as long as it honors that shape.
pub struct HttpTransport {
    pub endpoint: String,
    pub client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(endpoint: String) -> Self {
        HttpTransport {
            endpoint,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl LlmTransport for HttpTransport {
    fn send(&self, prompt: &str, conversation_id: Option<&str>) -> Result<(String, Option<String>)> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            prompt: &'a str,
            conversation_id: Option<&'a str>,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            text: String,
            conversation_id: Option<String>,
        }
        let resp: Resp = self
            .client
            .post(&self.endpoint)
            .json(&Req { prompt, conversation_id })
            .send()?
            .json()?;
        Ok((resp.text, resp.conversation_id))
    }
}

fn describe_method(m: &Method) -> String {
    format!(
        "{}: {}: {} ({}) ({})",
        m.operation_id,
        m.verb,
        m.path,
        m.summary.clone().unwrap_or_default(),
        m.description.clone().unwrap_or_default()
    )
}

/// Mirrors the original ChatGPT agent's sequence-generation prompt: a plain
/// list of operations followed by an instruction to propose `TEST_CASE:`
/// lines chaining operation ids together.
pub fn sequence_generation_prompt(methods: &[Method]) -> String {
    let mut prompt = String::from(
        "You are given a list of RESTful APIs in the format `operation_id: method: path (summary)`. \
         Find dependencies between parameters across operations and propose test cases that call \
         multiple operations in a valid order. Each test case must be on its own line formatted as \
         `TEST_CASE: op_a -> op_b -> op_c`. Propose more than 20 test cases.\n\nThe APIs are:\n",
    );
    for m in methods {
        prompt.push_str(&describe_method(m));
        prompt.push('\n');
    }
    prompt
}

/// Chunk size for plain-instance generation requests, kept small enough to
/// respect a typical LLM's context window.
pub const PLAIN_INSTANCE_CHUNK: usize = 6;

pub fn plain_instance_prompt(methods: &[Method]) -> String {
    let mut prompt = String::from(
        "For each of the following RESTful API operations, propose one JSON request body instance \
         that satisfies its schema. Respond with one line per operation formatted as \
         `REQUEST_INSTANCE: <operation_id> <json>`. For any field that takes a file upload, use the \
         literal string \"<FILE>\" as its value instead of real file content.\n\nThe APIs are:\n",
    );
    for m in methods {
        prompt.push_str(&describe_method(m));
        prompt.push('\n');
    }
    prompt
}

/// Parses `TEST_CASE: a -> b -> c` lines into Sequences, resolving operation
/// ids against the known method list and silently dropping unknown ids
/// rather than failing the whole batch.
pub fn parse_sequences(text: &str, methods: &[Method]) -> Vec<Sequence> {
    let known: std::collections::HashSet<&str> =
        methods.iter().map(|m| m.operation_id.as_str()).collect();

    text.lines()
        .filter_map(|line| line.strip_prefix("TEST_CASE:"))
        .filter_map(|rest| {
            let ops: Vec<String> = rest
                .split("->")
                .map(|s| s.trim().to_string())
                .filter(|s| known.contains(s.as_str()))
                .collect();
            let sequence = Sequence {
                methods: ops,
                dependencies: Vec::new(),
            };
            if sequence.is_empty() || !sequence.is_valid() {
                None
            } else {
                Some(sequence)
            }
        })
        .collect()
}

/// Parses `REQUEST_INSTANCE: <operation_id> {...}` lines into
/// `(operation_id, json)` pairs, dropping lines whose operation id is
/// unknown or whose payload fails to parse. Replaces the agent's `<FILE>`
/// file placeholder token with the Data Generator's own file sentinel, so a
/// proposed instance with a file field dispatches the same bundled asset a
/// freshly generated one would.
pub fn parse_plain_instances(text: &str, methods: &[Method]) -> Vec<(String, serde_json::Value)> {
    let known: std::collections::HashSet<&str> =
        methods.iter().map(|m| m.operation_id.as_str()).collect();

    text.lines()
        .filter_map(|line| line.strip_prefix("REQUEST_INSTANCE:"))
        .filter_map(|rest| {
            let rest = rest.trim();
            let (operation_id, json_part) = rest.split_once(char::is_whitespace)?;
            if !known.contains(operation_id) {
                return None;
            }
            let mut value: serde_json::Value = serde_json::from_str(json_part.trim()).ok()?;
            substitute_file_placeholders(&mut value);
            Some((operation_id.to_string(), value))
        })
        .collect()
}

fn substitute_file_placeholders(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) if s == "<FILE>" => *s = FILE_PLACEHOLDER.to_string(),
        serde_json::Value::Array(items) => items.iter_mut().for_each(substitute_file_placeholders),
        serde_json::Value::Object(map) => map.values_mut().for_each(substitute_file_placeholders),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Verb;

    fn method(id: &str) -> Method {
        Method {
            operation_id: id.to_string(),
            verb: Verb::Get,
            path: format!("/{id}"),
            summary: None,
            description: None,
            parameters: Vec::new(),
            response_attributes: Vec::new(),
        }
    }

    #[test]
    fn parses_test_case_lines_and_drops_unknown_ids() {
        let methods = vec![method("addPet"), method("getPetById")];
        let text = "TEST_CASE: addPet -> getPetById\nTEST_CASE: bogus -> alsoBogus\n";
        let sequences = parse_sequences(text, &methods);
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].methods, vec!["addPet", "getPetById"]);
    }

    #[test]
    fn parses_request_instance_json_and_drops_unknown_operations() {
        let methods = vec![method("addPet")];
        let text = "REQUEST_INSTANCE: addPet {\"id\": 1}\nREQUEST_INSTANCE: bogusOp {\"id\": 2}\nnoise\n";
        let instances = parse_plain_instances(text, &methods);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].0, "addPet");
        assert_eq!(instances[0].1, serde_json::json!({"id": 1}));
    }

    #[test]
    fn substitutes_the_agent_file_token_with_the_data_generator_sentinel() {
        let methods = vec![method("addPet")];
        let text = "REQUEST_INSTANCE: addPet {\"photo\": \"<FILE>\"}\n";
        let instances = parse_plain_instances(text, &methods);
        assert_eq!(
            instances[0].1,
            serde_json::json!({"photo": crate::datagen::FILE_PLACEHOLDER})
        );
    }
}
