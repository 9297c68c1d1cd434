//! The Analysis Sink: aggregates per-status-code counters and per-method
//! success/failure sets across the whole run, and logs a summary at every
//! iteration boundary.

use std::collections::{HashMap, HashSet};

use crate::request::Response;

#[derive(Default)]
pub struct AnalysisSink {
    status_code_count: HashMap<u32, u64>,
    success_methods: HashSet<String>,
    failed_methods: HashSet<String>,
    total_success: u64,
    total_requests: u64,
}

impl AnalysisSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_response(&mut self, operation_id: &str, response: &Response) {
        *self.status_code_count.entry(response.status_code).or_insert(0) += 1;
        self.total_requests += 1;

        if response.is_success() {
            self.total_success += 1;
            self.success_methods.insert(operation_id.to_string());
        }
        if (500..600).contains(&response.status_code) {
            self.failed_methods.insert(operation_id.to_string());
        }
        if !response.set_cookies.is_empty() {
            log::debug!(
                "{operation_id}: response set {} cookie(s)",
                response.set_cookies.len()
            );
        }
    }

    /// Logs a summary of the run so far: success/failure rates per method,
    /// the status-code histogram, and which methods have neither succeeded
    /// nor failed yet.
    pub fn on_iteration_end(&self, all_operation_ids: &[String]) {
        for line in self.summary_lines(all_operation_ids) {
            log::info!("{line}");
        }
    }

    /// Writes the same summary `on_iteration_end` logs to a file, for the
    /// run's output directory artifact.
    pub fn write_summary(&self, all_operation_ids: &[String], path: &std::path::Path) -> std::io::Result<()> {
        let text = self.summary_lines(all_operation_ids).join("\n") + "\n";
        std::fs::write(path, text)
    }

    fn summary_lines(&self, all_operation_ids: &[String]) -> Vec<String> {
        let total_methods = all_operation_ids.len().max(1) as f64;
        let mut lines = vec![
            format!(
                "method success rate: {:.2} ({} / {})",
                self.success_methods.len() as f64 / total_methods,
                self.success_methods.len(),
                total_methods as u64
            ),
            format!(
                "method failure rate: {:.2} ({} / {})",
                self.failed_methods.len() as f64 / total_methods,
                self.failed_methods.len(),
                total_methods as u64
            ),
        ];
        if self.total_requests > 0 {
            lines.push(format!(
                "overall 2xx rate: {:.2} ({} / {})",
                self.total_success as f64 / self.total_requests as f64,
                self.total_success,
                self.total_requests
            ));
        }
        for (status, count) in &self.status_code_count {
            lines.push(format!(
                "status {status} count: {count}, rate: {:.2}",
                *count as f64 / self.total_requests.max(1) as f64
            ));
        }

        let untouched: Vec<&String> = all_operation_ids
            .iter()
            .filter(|m| !self.success_methods.contains(*m) && !self.failed_methods.contains(*m))
            .collect();
        lines.push(format!("methods neither succeeded nor failed: {}", untouched.len()));
        for m in untouched {
            lines.push(format!("method {m} is neither success nor failed"));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u32) -> Response {
        Response {
            status_code: status,
            method: "op".to_string(),
            body: serde_json::Value::Null,
            set_cookies: Vec::new(),
        }
    }

    #[test]
    fn tracks_success_and_failure_sets() {
        let mut sink = AnalysisSink::new();
        sink.on_response("createPet", &resp(200));
        sink.on_response("deletePet", &resp(500));
        assert_eq!(sink.total_success, 1);
        assert!(sink.success_methods.contains("createPet"));
        assert!(sink.failed_methods.contains("deletePet"));
    }

    #[test]
    fn writes_summary_to_disk() {
        let mut sink = AnalysisSink::new();
        sink.on_response("createPet", &resp(200));
        let path = std::env::temp_dir().join("morestfuzz_analysis_summary_test.txt");
        sink.write_summary(&["createPet".to_string()], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("method success rate"));
        std::fs::remove_file(&path).ok();
    }
}
