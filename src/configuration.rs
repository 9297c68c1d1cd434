//! Layered configuration: CLI flags (via `clap`) merged over an optional YAML
//! config file, exposed as a single validated, immutable `Configuration`
//! behind a process-wide singleton.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lazy_static::lazy_static;
use serde::Deserialize;

/// A stateful black-box fuzzer for RESTful services described by an
/// OpenAPI/Swagger document.
#[derive(Parser, Debug, Clone)]
#[command(name = "morestfuzz", version, about)]
pub struct Cli {
    /// Path to the OpenAPI/Swagger document (JSON or YAML).
    #[arg(long = "yaml-path", value_name = "FILE")]
    pub yaml_path: Option<PathBuf>,

    /// Base URL of the target server, e.g. http://localhost:8080.
    #[arg(long)]
    pub url: Option<String>,

    /// Optional YAML file supplying any of these options; CLI flags win on conflict.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Total wall-clock seconds to fuzz once warm-up completes.
    #[arg(long = "time-budget")]
    pub time_budget: Option<u64>,

    /// Number of warm-up passes over the single-method sequence set.
    #[arg(long = "warm-up-times")]
    pub warm_up_times: Option<u32>,

    /// Per-request timeout in milliseconds.
    #[arg(long = "request-timeout-ms")]
    pub request_timeout_ms: Option<u64>,

    /// Enables the LLM agent bridge for sequence and instance generation.
    #[arg(long)]
    pub llm_agent: bool,

    /// Directory logs and the run summary are written to.
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Log verbosity: trace, debug, info, warn, error.
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

/// Options mergeable from a YAML file, mirroring [`Cli`] minus the flags
/// that only make sense on a command line (help/version).
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct PartialConfiguration {
    pub yaml_path: Option<PathBuf>,
    pub url: Option<String>,
    pub time_budget: Option<u64>,
    pub warm_up_times: Option<u32>,
    pub request_timeout_ms: Option<u64>,
    pub llm_agent: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub violation_probabilities: Option<ViolationProbabilities>,
}

impl Cli {
    fn into_partial(self) -> PartialConfiguration {
        PartialConfiguration {
            yaml_path: self.yaml_path,
            url: self.url,
            time_budget: self.time_budget,
            warm_up_times: self.warm_up_times,
            request_timeout_ms: self.request_timeout_ms,
            llm_agent: self.llm_agent.then_some(true),
            output_dir: self.output_dir,
            log_level: self.log_level,
            violation_probabilities: None,
        }
    }
}

/// Calibrated probabilities the Data Generator uses to decide when to
/// synthesize a schema-violating value rather than a compliant one. Defaults
/// follow the original implementation's informal tuning; every field can be
/// overridden from the config file.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct ViolationProbabilities {
    pub string_violation: f64,
    pub enum_violation: f64,
    pub enum_number: f64,
    pub min_max_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Probability the Data Generator first tries to satisfy a parameter
    /// from the Runtime Dictionary before falling back to random synthesis.
    pub dict_use: f64,
}

impl Default for ViolationProbabilities {
    fn default() -> Self {
        ViolationProbabilities {
            string_violation: 0.1,
            enum_violation: 0.1,
            enum_number: 0.05,
            min_max_value: 0.9,
            min_value: 0.7,
            max_value: 0.7,
            dict_use: 0.5,
        }
    }
}

/// The final, validated configuration the rest of the fuzzer reads from.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub yaml_path: PathBuf,
    pub url: String,
    pub time_budget: u64,
    pub warm_up_times: u32,
    pub request_timeout_ms: u64,
    pub llm_agent: bool,
    pub output_dir: PathBuf,
    pub log_level: String,
    pub violation_probabilities: ViolationProbabilities,
}

impl TryFrom<PartialConfiguration> for Configuration {
    type Error = anyhow::Error;

    fn try_from(p: PartialConfiguration) -> Result<Self> {
        Ok(Configuration {
            yaml_path: p
                .yaml_path
                .context("--yaml-path (or config file's yaml_path) is required")?,
            url: p.url.context("--url (or config file's url) is required")?,
            time_budget: p.time_budget.unwrap_or(600),
            warm_up_times: p.warm_up_times.unwrap_or(5),
            request_timeout_ms: p.request_timeout_ms.unwrap_or(30_000),
            llm_agent: p.llm_agent.unwrap_or(false),
            output_dir: p.output_dir.unwrap_or_else(|| PathBuf::from("output")),
            log_level: p.log_level.unwrap_or_else(|| "info".to_string()),
            violation_probabilities: p.violation_probabilities.unwrap_or_default(),
        })
    }
}

impl PartialConfiguration {
    /// CLI flags merged over an optional YAML config file. CLI values win.
    pub fn get() -> Result<Self> {
        let cli = Cli::parse();
        let mut merged = if let Some(path) = &cli.config {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            PartialConfiguration::default()
        };

        let from_cli = cli.into_partial();
        merged.yaml_path = from_cli.yaml_path.or(merged.yaml_path);
        merged.url = from_cli.url.or(merged.url);
        merged.time_budget = from_cli.time_budget.or(merged.time_budget);
        merged.warm_up_times = from_cli.warm_up_times.or(merged.warm_up_times);
        merged.request_timeout_ms = from_cli.request_timeout_ms.or(merged.request_timeout_ms);
        merged.llm_agent = from_cli.llm_agent.or(merged.llm_agent);
        merged.output_dir = from_cli.output_dir.or(merged.output_dir);
        merged.log_level = from_cli.log_level.or(merged.log_level);
        Ok(merged)
    }
}

lazy_static! {
    static ref CONFIGURATION: Result<Configuration, String> =
        PartialConfiguration::get()
            .and_then(Configuration::try_from)
            .map_err(|e| format!("{e:#}"));
}

impl Configuration {
    /// The process-wide configuration, parsed from argv and any `--config`
    /// file on first access. Panics with the full error chain on failure,
    /// since a misconfigured run cannot proceed at all.
    pub fn get() -> &'static Configuration {
        match &*CONFIGURATION {
            Ok(c) => c,
            Err(e) => panic!("invalid configuration: {e}"),
        }
    }
}
