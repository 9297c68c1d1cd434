//! The Sequence Converter / Executor: turns a Sequence into a chain of live
//! HTTP requests, feeding observations back into the Runtime Dictionary and
//! rewarding the ParameterDependencies consulted along the way.

use std::time::Duration;

use serde_json::Value;

use crate::analysis::AnalysisSink;
use crate::configuration::ViolationProbabilities;
use crate::datagen::{DataGenerator, DictionaryLookup, GeneratedValue};
use crate::request::{self, ParamValue};
use crate::runtime_dict::RuntimeDictionary;
use crate::sequence::Sequence;
use crate::spec::{ParameterLocation, Specification};

pub struct SequenceConverter<'a> {
    pub spec: &'a Specification,
    pub base_url: String,
    pub timeout: Duration,
    pub violation_probabilities: ViolationProbabilities,
}

impl<'a> SequenceConverter<'a> {
    /// Executes every method of `sequence` in order, over a freshly created
    /// HTTP session. A failure at one method never aborts the remainder of
    /// the sequence.
    pub fn convert(
        &self,
        sequence: &mut Sequence,
        runtime_dictionary: &mut RuntimeDictionary,
        analysis: &mut AnalysisSink,
    ) {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building an HTTP client should never fail");

        for (index, operation_id) in sequence.methods.iter().enumerate() {
            let Some(method) = self.spec.find(operation_id) else {
                log::warn!("sequence references unknown operation {operation_id}");
                continue;
            };

            let candidates = producer_candidates(sequence, index);
            let mut generator = DataGenerator::new(
                self.violation_probabilities,
                Some(DictionaryLookup {
                    runtime_dictionary,
                    producer_candidates: &candidates,
                }),
            );

            let mut params = Vec::new();
            let mut body_value: Option<Value> = None;
            for p in &method.parameters {
                match generator.generate(&p.root) {
                    GeneratedValue::Skip => continue,
                    GeneratedValue::Value(v) => {
                        if matches!(p.location, ParameterLocation::Body | ParameterLocation::FormData) {
                            body_value = Some(v);
                        } else {
                            params.push(ParamValue {
                                name: p.name.clone(),
                                location: p.location,
                                value: v,
                            });
                        }
                    }
                }
            }

            let response = request::execute(
                &client,
                &self.base_url,
                method,
                &params,
                body_value.as_ref(),
                self.timeout,
            );

            analysis.on_response(operation_id, &response);

            let reward = if response.is_success() { 1.0 } else { -1.0 };
            for dep in sequence
                .dependencies
                .iter_mut()
                .filter(|d| d.consumer_index == index)
            {
                for inner in dep.dependencies.iter_mut() {
                    if generator
                        .consulted
                        .iter()
                        .any(|(_, path)| *path == inner.producer_attribute_path)
                    {
                        inner.update(reward);
                    }
                }
            }

            runtime_dictionary.add_response(response);
        }
    }

    /// Dispatches a single LLM-proposed request body as a standalone call,
    /// generating its non-body parameters the usual way. Used for Agent
    /// `GeneratePlainInstance` results, which augment parameter instance
    /// generation independently of sequence construction.
    pub fn convert_plain_instance(
        &self,
        operation_id: &str,
        body: Value,
        runtime_dictionary: &mut RuntimeDictionary,
        analysis: &mut AnalysisSink,
    ) {
        let Some(method) = self.spec.find(operation_id) else {
            log::warn!("agent proposed a plain instance for unknown operation {operation_id}");
            return;
        };

        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building an HTTP client should never fail");

        let mut generator = DataGenerator::new(self.violation_probabilities, None);
        let mut params = Vec::new();
        for p in &method.parameters {
            if matches!(
                p.location,
                ParameterLocation::Body | ParameterLocation::FormData | ParameterLocation::Files
            ) {
                continue;
            }
            if let GeneratedValue::Value(v) = generator.generate(&p.root) {
                params.push(ParamValue {
                    name: p.name.clone(),
                    location: p.location,
                    value: v,
                });
            }
        }

        let response = request::execute(&client, &self.base_url, method, &params, Some(&body), self.timeout);
        analysis.on_response(operation_id, &response);
        runtime_dictionary.add_response(response);
    }
}

/// Candidate (producer method, producer attribute path) pairs a consumer at
/// `index` may draw from, derived from the sequence's own dependency
/// annotations (methods earlier in this same sequence only).
fn producer_candidates(sequence: &Sequence, index: usize) -> Vec<(String, String, String)> {
    sequence
        .dependencies
        .iter()
        .filter(|d| d.consumer_index == index)
        .flat_map(|d| {
            let producer = sequence.methods[d.producer_index].clone();
            d.dependencies.iter().map(move |dep| {
                (
                    producer.clone(),
                    dep.producer_attribute_path.clone(),
                    dep.consumer_attribute_path.clone(),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisSink;
    use crate::spec::{AttributeType, Method, Parameter, ParameterAttribute, ParameterLocation, Verb};

    #[test]
    fn single_get_populates_runtime_dictionary() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/pet/7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7}"#)
            .create();

        let method = Method {
            operation_id: "getPet".to_string(),
            verb: Verb::Get,
            path: "/pet/{petId}".to_string(),
            summary: None,
            description: None,
            parameters: vec![Parameter {
                name: "petId".to_string(),
                location: ParameterLocation::Path,
                required: true,
                root: {
                    let mut attr =
                        ParameterAttribute::leaf("petId", "petId", AttributeType::Integer);
                    attr.required = true;
                    attr.facets.minimum = Some(7);
                    attr.facets.maximum = Some(7);
                    attr
                },
            }],
            response_attributes: vec![ParameterAttribute::leaf("id", "id", AttributeType::Integer)],
        };
        let spec = Specification {
            base_url: Some(server.url()),
            methods: vec![method],
        };
        let converter = SequenceConverter {
            spec: &spec,
            base_url: server.url(),
            timeout: Duration::from_secs(5),
            violation_probabilities: ViolationProbabilities {
                min_max_value: 1.0,
                enum_number: 0.0,
                ..ViolationProbabilities::default()
            },
        };
        let mut dict = RuntimeDictionary::new();
        let mut analysis = AnalysisSink::new();
        let mut sequence = Sequence::single("getPet");
        converter.convert(&mut sequence, &mut dict, &mut analysis);

        assert!(dict.has_succeeded("getPet"));
        assert_eq!(dict.latest_value("getPet", "id"), Some(&Value::from(7)));
    }

    #[test]
    fn plain_instance_dispatches_the_supplied_body() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/pet")
            .match_body(mockito::Matcher::Json(serde_json::json!({"name": "fido"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 1}"#)
            .create();

        let method = Method {
            operation_id: "createPet".to_string(),
            verb: Verb::Post,
            path: "/pet".to_string(),
            summary: None,
            description: None,
            parameters: vec![Parameter {
                name: "body".to_string(),
                location: ParameterLocation::Body,
                required: true,
                root: ParameterAttribute::leaf("body", "body", AttributeType::Object),
            }],
            response_attributes: vec![ParameterAttribute::leaf("id", "id", AttributeType::Integer)],
        };
        let spec = Specification {
            base_url: Some(server.url()),
            methods: vec![method],
        };
        let converter = SequenceConverter {
            spec: &spec,
            base_url: server.url(),
            timeout: Duration::from_secs(5),
            violation_probabilities: ViolationProbabilities::default(),
        };
        let mut dict = RuntimeDictionary::new();
        let mut analysis = AnalysisSink::new();
        converter.convert_plain_instance(
            "createPet",
            serde_json::json!({"name": "fido"}),
            &mut dict,
            &mut analysis,
        );

        assert!(dict.has_succeeded("createPet"));
        assert_eq!(dict.latest_value("createPet", "id"), Some(&Value::from(1)));
    }
}
