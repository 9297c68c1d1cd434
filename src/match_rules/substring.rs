//! The reference match rule: a consumer input is satisfiable by a producer
//! output if one attribute name is a case-insensitive substring of the other.

use crate::sequence::ParameterDependency;
use crate::spec::{AttributeType, Method, ParameterLocation};

use super::MatchRule;

pub struct SubstringRule;

fn leaf_attribute_names(method: &Method, producer: bool) -> Vec<(String, String)> {
    // (attribute_name, attribute_path) pairs.
    let mut out = Vec::new();
    if producer {
        for attr in &method.response_attributes {
            for a in attr.iter_all() {
                if !matches!(a.attribute_type, AttributeType::Object | AttributeType::Array) {
                    out.push((a.attribute_name.clone(), a.attribute_path.clone()));
                }
            }
        }
        // POST inputs double as outputs: a client-chosen id can be echoed
        // back by a later call even if the server never returns it.
        if matches!(method.verb, crate::spec::Verb::Post) {
            for p in &method.parameters {
                for a in p.root.iter_all() {
                    if !matches!(a.attribute_type, AttributeType::Object | AttributeType::Array) {
                        out.push((a.attribute_name.clone(), a.attribute_path.clone()));
                    }
                }
            }
        }
    } else {
        for p in method.required_parameters() {
            if matches!(
                p.location,
                ParameterLocation::Path | ParameterLocation::Query | ParameterLocation::Body | ParameterLocation::Files
            ) {
                for a in p.root.iter_all() {
                    if !matches!(a.attribute_type, AttributeType::Object | AttributeType::Array) {
                        out.push((a.attribute_name.clone(), a.attribute_path.clone()));
                    }
                }
            }
        }
    }
    out
}

fn substring_match(a: &str, b: &str) -> bool {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

impl MatchRule for SubstringRule {
    fn has_dependency(&self, producer: &Method, consumer: &Method) -> bool {
        !self.build_dependencies(producer, consumer).is_empty()
    }

    fn build_dependencies(&self, producer: &Method, consumer: &Method) -> Vec<ParameterDependency> {
        let outputs = leaf_attribute_names(producer, true);
        let inputs = leaf_attribute_names(consumer, false);
        let mut deps = Vec::new();
        for (in_name, in_path) in &inputs {
            if let Some((_out_name, out_path)) = outputs
                .iter()
                .find(|(out_name, _)| substring_match(out_name, in_name))
            {
                deps.push(ParameterDependency::new(
                    "substring",
                    &producer.operation_id,
                    &consumer.operation_id,
                    out_path,
                    in_path,
                ));
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitive_substring() {
        assert!(substring_match("PetId", "id"));
        assert!(substring_match("id", "petId"));
        assert!(!substring_match("name", "status"));
    }
}
