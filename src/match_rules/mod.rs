//! The Match-Rule Engine: pluggable predicates that decide whether one
//! operation's response can satisfy another operation's parameters.

pub mod substring;

pub use substring::SubstringRule;

use crate::spec::Method;
use crate::sequence::ParameterDependency;

/// Capability set implemented by every match rule. Rules are consulted in
/// declared priority order; the first one that reports a dependency wins for
/// a given (producer, consumer) pair.
pub trait MatchRule {
    fn has_dependency(&self, producer: &Method, consumer: &Method) -> bool;
    fn build_dependencies(&self, producer: &Method, consumer: &Method) -> Vec<ParameterDependency>;
}

/// The ordered list of rules tried for every operation pair.
pub struct MatchRuleEngine {
    rules: Vec<Box<dyn MatchRule>>,
}

impl Default for MatchRuleEngine {
    fn default() -> Self {
        MatchRuleEngine {
            rules: vec![Box::new(SubstringRule)],
        }
    }
}

impl MatchRuleEngine {
    pub fn new(rules: Vec<Box<dyn MatchRule>>) -> Self {
        MatchRuleEngine { rules }
    }

    /// Returns the dependencies produced by the first matching rule, if any.
    pub fn dependencies_for(&self, producer: &Method, consumer: &Method) -> Vec<ParameterDependency> {
        for rule in &self.rules {
            if rule.has_dependency(producer, consumer) {
                let deps = rule.build_dependencies(producer, consumer);
                if !deps.is_empty() {
                    return deps;
                }
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AttributeType, Parameter, ParameterAttribute, ParameterLocation, Verb};

    struct NeverMatches;
    impl MatchRule for NeverMatches {
        fn has_dependency(&self, _producer: &Method, _consumer: &Method) -> bool {
            false
        }
        fn build_dependencies(&self, _producer: &Method, _consumer: &Method) -> Vec<ParameterDependency> {
            Vec::new()
        }
    }

    fn method(op_id: &str) -> Method {
        Method {
            operation_id: op_id.to_string(),
            verb: Verb::Get,
            path: format!("/{op_id}"),
            summary: None,
            description: None,
            parameters: vec![Parameter {
                name: "id".to_string(),
                location: ParameterLocation::Path,
                required: true,
                root: ParameterAttribute::leaf("id", "id", AttributeType::Integer),
            }],
            response_attributes: vec![ParameterAttribute::leaf("id", "id", AttributeType::Integer)],
        }
    }

    #[test]
    fn custom_rule_set_falls_through_when_no_rule_matches() {
        let engine = MatchRuleEngine::new(vec![Box::new(NeverMatches)]);
        let deps = engine.dependencies_for(&method("producer"), &method("consumer"));
        assert!(deps.is_empty());
    }

    #[test]
    fn default_rule_set_uses_the_substring_rule() {
        let engine = MatchRuleEngine::default();
        let deps = engine.dependencies_for(&method("producer"), &method("consumer"));
        assert_eq!(deps.len(), 1);
    }
}
