//! The Fuzzer driver: setup, warm-up, then a time-budgeted fuzz loop over
//! the sequence set, merging LLM agent results at iteration boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agent::transport::PLAIN_INSTANCE_CHUNK;
use crate::agent::{Agent, AgentResult, Command};
use crate::analysis::AnalysisSink;
use crate::configuration::Configuration;
use crate::executor::SequenceConverter;
use crate::match_rules::MatchRuleEngine;
use crate::odg::OperationDependencyGraph;
use crate::runtime_dict::RuntimeDictionary;
use crate::sequence::Sequence;
use crate::spec::Specification;

pub struct Fuzzer {
    spec: Specification,
    odg: OperationDependencyGraph,
    sequences: Vec<Sequence>,
    runtime_dictionary: RuntimeDictionary,
    analysis: AnalysisSink,
    agent: Option<Agent>,
}

impl Fuzzer {
    pub fn setup(spec: Specification, agent: Option<Agent>) -> Self {
        let engine = MatchRuleEngine::default();
        let odg = OperationDependencyGraph::build(&spec, &engine);
        let sequences = odg.generate_sequences(&spec.methods);
        log::info!(
            "built dependency graph: {} operations, {} edges, {} candidate sequences",
            odg.node_count(),
            odg.edge_count(),
            sequences.len()
        );

        if let Some(agent) = &agent {
            agent.submit(Command::Initialize);
            for chunk in spec.methods.chunks(PLAIN_INSTANCE_CHUNK) {
                agent.submit(Command::GeneratePlainInstance {
                    methods: chunk.to_vec(),
                });
            }
        }

        Fuzzer {
            spec,
            odg,
            sequences,
            runtime_dictionary: RuntimeDictionary::new(),
            analysis: AnalysisSink::new(),
            agent,
        }
    }

    fn converter(spec: &Specification) -> SequenceConverter<'_> {
        let config = Configuration::get();
        SequenceConverter {
            spec,
            base_url: spec.base_url.clone().unwrap_or_else(|| config.url.clone()),
            timeout: Duration::from_millis(config.request_timeout_ms),
            violation_probabilities: config.violation_probabilities,
        }
    }

    /// Runs the single-method sequence set `times` times so the Runtime
    /// Dictionary is non-empty before dependency-driven sequences execute.
    pub fn warm_up(&mut self, times: u32) {
        let single_method: Vec<Sequence> = self
            .spec
            .methods
            .iter()
            .map(|m| Sequence::single(&m.operation_id))
            .collect();
        let converter = Self::converter(&self.spec);
        for round in 0..times {
            log::debug!("warm-up round {}/{}", round + 1, times);
            for seq in &single_method {
                let mut seq = seq.clone();
                converter.convert(&mut seq, &mut self.runtime_dictionary, &mut self.analysis);
            }
        }
    }

    /// Runs fuzz iterations until `time_budget` elapses. Each iteration runs
    /// every known sequence once, then drains any Agent results accumulated
    /// since the previous iteration and folds new sequences into the set.
    pub fn fuzz(&mut self, time_budget: Duration) {
        let deadline = Instant::now() + time_budget;
        let all_ids: Vec<String> = self.spec.methods.iter().map(|m| m.operation_id.clone()).collect();
        let mut iteration = 0u64;

        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let cancelled = Arc::clone(&cancelled);
            if let Err(e) = ctrlc::set_handler(move || {
                log::warn!("ctrl-c received, finishing the current iteration then stopping");
                cancelled.store(true, Ordering::SeqCst);
            }) {
                log::warn!("could not install ctrl-c handler: {e}");
            }
        }
        let cancelled = |now: Instant| now >= deadline || cancelled.load(Ordering::SeqCst);

        while !cancelled(Instant::now()) {
            iteration += 1;
            let converter = Self::converter(&self.spec);
            for seq in &mut self.sequences {
                if cancelled(Instant::now()) {
                    break;
                }
                converter.convert(seq, &mut self.runtime_dictionary, &mut self.analysis);
            }

            if let Some(agent) = &self.agent {
                for result in agent.drain() {
                    match result {
                        AgentResult::Sequences(mut new_sequences) => {
                            log::info!("agent proposed {} new sequences", new_sequences.len());
                            self.sequences.append(&mut new_sequences);
                        }
                        AgentResult::PlainInstances(instances) => {
                            log::info!("agent proposed {} plain instance(s)", instances.len());
                            for (operation_id, body) in instances {
                                converter.convert_plain_instance(
                                    &operation_id,
                                    body,
                                    &mut self.runtime_dictionary,
                                    &mut self.analysis,
                                );
                            }
                        }
                        AgentResult::Initialized => log::info!("agent initialized"),
                        AgentResult::Failed(e) => log::warn!("agent command failed: {e}"),
                    }
                }
                agent.submit(Command::GenerateSequence {
                    methods: self.spec.methods.clone(),
                });
            }

            log::info!("iteration {iteration} complete");
            log::debug!(
                "runtime dictionary has observed {} method(s) with successful responses",
                self.runtime_dictionary.known_methods().count()
            );
            self.analysis.on_iteration_end(&all_ids);
        }
    }

    /// Writes the run's final analysis summary to `path`.
    pub fn write_summary(&self, path: &std::path::Path) -> std::io::Result<()> {
        let all_ids: Vec<String> = self.spec.methods.iter().map(|m| m.operation_id.clone()).collect();
        self.analysis.write_summary(&all_ids, path)
    }

    pub fn odg(&self) -> &OperationDependencyGraph {
        &self.odg
    }
}
