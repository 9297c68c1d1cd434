//! Sequences: ordered Method call chains annotated with the parameter
//! dependencies that justify chaining one call after another.
//!
//! Methods are identified by `operation_id` rather than by reference or index
//! handle, so a `Sequence` can outlive any one borrow of the `Specification`
//! it was built from.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A producer-to-consumer link between two attribute paths, with an online
/// average "usefulness" score updated after every execution that consults it.
///
/// `Q` starts at 5 and is nudged towards +1 (successful call) or -1 (failed
/// call) by a running average: `Q_new = Q_old + (reward - Q_old) / N_new`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterDependency {
    pub id: u64,
    pub rule: String,
    pub producer: String,
    pub consumer: String,
    pub producer_attribute_path: String,
    pub consumer_attribute_path: String,
    pub n: u64,
    pub q: f64,
}

static NEXT_DEPENDENCY_ID: AtomicU64 = AtomicU64::new(1);

impl ParameterDependency {
    pub fn new(
        rule: &str,
        producer: &str,
        consumer: &str,
        producer_attribute_path: &str,
        consumer_attribute_path: &str,
    ) -> Self {
        ParameterDependency {
            id: NEXT_DEPENDENCY_ID.fetch_add(1, Ordering::Relaxed),
            rule: rule.to_string(),
            producer: producer.to_string(),
            consumer: consumer.to_string(),
            producer_attribute_path: producer_attribute_path.to_string(),
            consumer_attribute_path: consumer_attribute_path.to_string(),
            n: 0,
            q: 5.0,
        }
    }

    /// Online average reward update. `reward` is +1.0 for a successful call
    /// (status 2xx) that consulted this dependency, -1.0 otherwise.
    pub fn update(&mut self, reward: f64) {
        self.n += 1;
        self.q += (reward - self.q) / self.n as f64;
    }
}

/// An edge annotation placing a non-empty list of dependencies in the
/// context of one sequence: each dependency applies between the call at
/// `producer_index` and the call at `consumer_index` within that specific
/// sequence. A producer/consumer pair can be linked by more than one
/// matched attribute, so the full list from the ODG edge is kept, not just
/// the first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InContextParameterDependency {
    pub producer_index: usize,
    pub consumer_index: usize,
    pub dependencies: Vec<ParameterDependency>,
}

/// An ordered call chain plus the dependencies that justify consecutive
/// calls reusing each other's values.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Sequence {
    pub methods: Vec<String>,
    pub dependencies: Vec<InContextParameterDependency>,
}

impl Sequence {
    pub fn single(operation_id: &str) -> Self {
        Sequence {
            methods: vec![operation_id.to_string()],
            dependencies: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Every invariant from the spec holds: producer_index < consumer_index,
    /// and both are within range of the method list.
    pub fn is_valid(&self) -> bool {
        self.dependencies.iter().all(|d| {
            d.producer_index < d.consumer_index && d.consumer_index < self.methods.len()
        })
    }

    pub fn push(&mut self, operation_id: &str) {
        self.methods.push(operation_id.to_string());
    }
}
