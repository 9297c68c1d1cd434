//! The Operation Dependency Graph: a directed multigraph over Methods whose
//! edges carry the ParameterDependencies that justify calling one operation
//! after another.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::match_rules::MatchRuleEngine;
use crate::sequence::{InContextParameterDependency, ParameterDependency, Sequence};
use crate::spec::{Method, Specification};

#[derive(Clone, Debug)]
pub struct Edge {
    pub dependencies: Vec<ParameterDependency>,
}

pub struct OperationDependencyGraph {
    graph: DiGraph<String, Edge>,
    index_of: std::collections::HashMap<String, NodeIndex>,
}

impl OperationDependencyGraph {
    /// Builds the graph: one node per Method, at most one edge per ordered
    /// (producer, consumer) pair, populated by the match-rule engine.
    pub fn build(spec: &Specification, engine: &MatchRuleEngine) -> Self {
        let mut graph = DiGraph::new();
        let mut index_of = std::collections::HashMap::new();
        for m in &spec.methods {
            let idx = graph.add_node(m.operation_id.clone());
            index_of.insert(m.operation_id.clone(), idx);
        }

        for producer in &spec.methods {
            for consumer in &spec.methods {
                if producer.operation_id == consumer.operation_id {
                    continue;
                }
                let deps = engine.dependencies_for(producer, consumer);
                if deps.is_empty() {
                    continue;
                }
                let from = index_of[&producer.operation_id];
                let to = index_of[&consumer.operation_id];
                graph.add_edge(from, to, Edge { dependencies: deps });
            }
        }

        OperationDependencyGraph { graph, index_of }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn operation_id(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }

    fn outgoing(&self, idx: NodeIndex) -> Vec<(NodeIndex, &Edge)> {
        self.graph
            .edges(idx)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Union of every DFS-derived sequence rooted at a producer, plus the
    /// trivial single-method sequence for every operation.
    pub fn generate_sequences(&self, methods: &[Method]) -> Vec<Sequence> {
        let mut sequences = Vec::new();

        for m in methods {
            sequences.push(Sequence::single(&m.operation_id));
        }

        for &root in self.index_of.values() {
            let mut seq = Sequence::default();
            self.dfs(root, &mut seq, &mut sequences);
        }

        let mut seen = std::collections::HashSet::new();
        sequences.retain(|s| seen.insert(s.methods.clone()));
        sequences
    }

    /// Cycle-safe DFS: a method already present in the in-progress sequence
    /// is appended once more but never recursed into again, so termination
    /// is guaranteed for any finite graph.
    fn dfs(&self, node: NodeIndex, current: &mut Sequence, out: &mut Vec<Sequence>) {
        let op = self.operation_id(node).to_string();
        current.push(&op);
        let producer_index = current.len() - 1;

        let neighbors = self.outgoing(node);
        if neighbors.is_empty() {
            out.push(current.clone());
            current.methods.pop();
            return;
        }

        for (next, edge) in neighbors {
            let next_op = self.operation_id(next).to_string();
            if current.methods.contains(&next_op) {
                out.push(current.clone());
                continue;
            }

            let consumer_index = producer_index + 1;
            if !edge.dependencies.is_empty() {
                current.dependencies.push(InContextParameterDependency {
                    producer_index,
                    consumer_index,
                    dependencies: edge.dependencies.clone(),
                });
            }
            self.dfs(next, current, out);
            current
                .dependencies
                .retain(|d| d.consumer_index != consumer_index);
        }
        current.methods.pop();
    }

    pub fn edge_between(&self, producer: &str, consumer: &str) -> Option<&Edge> {
        let from = *self.index_of.get(producer)?;
        let to = *self.index_of.get(consumer)?;
        self.graph
            .edges(from)
            .find(|e| e.target() == to)
            .map(|e| e.weight())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AttributeType, Method, Parameter, ParameterAttribute, ParameterLocation, Specification, Verb};

    fn method_with_id_param(op_id: &str, verb: Verb, param_name: &str) -> Method {
        Method {
            operation_id: op_id.to_string(),
            verb,
            path: format!("/{op_id}"),
            summary: None,
            description: None,
            parameters: vec![Parameter {
                name: param_name.to_string(),
                location: ParameterLocation::Path,
                required: true,
                root: ParameterAttribute::leaf(param_name, param_name, AttributeType::Integer),
            }],
            response_attributes: vec![ParameterAttribute::leaf("id", "id", AttributeType::Integer)],
        }
    }

    #[test]
    fn single_method_has_no_edges_but_one_sequence() {
        let spec = Specification {
            base_url: None,
            methods: vec![method_with_id_param("getPet", Verb::Get, "petId")],
        };
        let engine = MatchRuleEngine::default();
        let odg = OperationDependencyGraph::build(&spec, &engine);
        assert_eq!(odg.edge_count(), 0);
        let sequences = odg.generate_sequences(&spec.methods);
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].methods, vec!["getPet".to_string()]);
    }

    #[test]
    fn edge_between_exposes_the_matched_dependency() {
        let spec = Specification {
            base_url: None,
            methods: vec![
                method_with_id_param("opA", Verb::Get, "id"),
                method_with_id_param("opB", Verb::Get, "id"),
            ],
        };
        let engine = MatchRuleEngine::default();
        let odg = OperationDependencyGraph::build(&spec, &engine);
        let edge = odg.edge_between("opA", "opB").expect("edge should exist");
        assert_eq!(edge.dependencies[0].producer, "opA");
        assert_eq!(edge.dependencies[0].consumer, "opB");
        assert!(odg.edge_between("opB", "opB").is_none());
    }

    #[test]
    fn cycle_is_not_recursed_into_twice() {
        let spec = Specification {
            base_url: None,
            methods: vec![
                method_with_id_param("opA", Verb::Get, "id"),
                method_with_id_param("opB", Verb::Get, "id"),
            ],
        };
        let engine = MatchRuleEngine::default();
        let odg = OperationDependencyGraph::build(&spec, &engine);
        assert_eq!(odg.edge_count(), 2);
        let sequences = odg.generate_sequences(&spec.methods);
        assert!(sequences
            .iter()
            .any(|s| s.methods == vec!["opA".to_string(), "opB".to_string()]));
        assert!(sequences
            .iter()
            .any(|s| s.methods == vec!["opB".to_string(), "opA".to_string()]));
        assert!(!sequences
            .iter()
            .any(|s| s.methods == vec!["opA".to_string(), "opB".to_string(), "opA".to_string()]));
    }
}
