mod agent;
mod analysis;
mod configuration;
mod datagen;
mod executor;
mod fuzzer;
mod match_rules;
mod odg;
mod request;
mod runtime_dict;
mod sequence;
mod spec;

use std::io::Write;
use std::time::Duration;

use anyhow::Result;

use agent::{transport::HttpTransport, Agent};
use configuration::Configuration;
use fuzzer::Fuzzer;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// Writes every log line to stderr and a per-run log file, so the file
/// under `log/<timestamp>.log` carries the same record a terminal would.
struct Tee {
    file: std::fs::File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

fn run() -> Result<()> {
    let config = Configuration::get();
    let run_timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

    std::fs::create_dir_all("log")?;
    let log_path = std::path::Path::new("log").join(format!("{run_timestamp}.log"));
    let log_file = std::fs::File::create(&log_path)?;

    let mut builder = env_logger::Builder::from_default_env();
    builder.parse_filters(&config.log_level);
    builder.target(env_logger::Target::Pipe(Box::new(Tee { file: log_file })));
    builder.init();

    let run_output_dir = config.output_dir.join(&run_timestamp);
    std::fs::create_dir_all(&run_output_dir)?;

    let specification = spec::load::load_specification(&config.yaml_path)?;
    log::info!(
        "loaded specification: {} operations from {}",
        specification.methods.len(),
        config.yaml_path.display()
    );

    let agent = if config.llm_agent {
        Some(Agent::start(Box::new(HttpTransport::new(format!("{}/agent", config.url)))))
    } else {
        None
    };

    let mut fuzzer = Fuzzer::setup(specification, agent);
    log::debug!(
        "operation dependency graph: {} nodes, {} edges",
        fuzzer.odg().node_count(),
        fuzzer.odg().edge_count()
    );
    fuzzer.warm_up(config.warm_up_times);
    fuzzer.fuzz(Duration::from_secs(config.time_budget));

    let summary_path = run_output_dir.join("summary.txt");
    if let Err(e) = fuzzer.write_summary(&summary_path) {
        log::warn!("failed to write run summary to {}: {e}", summary_path.display());
    }

    Ok(())
}
