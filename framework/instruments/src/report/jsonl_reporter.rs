use std::path::PathBuf;

use anyhow::Context;
use chain_tunnel_summary_model::{append_run_summary, RunSummary};

use crate::report::ReportSink;

/// Appends each run summary as a single JSON line.
#[derive(Debug)]
pub struct JsonlReporter {
    path: PathBuf,
}

impl JsonlReporter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReportSink for JsonlReporter {
    fn report(&self, summary: &RunSummary) -> anyhow::Result<()> {
        append_run_summary(summary, self.path.clone())
            .with_context(|| format!("Failed to append run summary to {}", self.path.display()))?;
        log::info!(
            "Run summary {} written to {}",
            summary.fingerprint(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_tunnel_summary_model::load_summary_runs;

    #[test]
    fn appends_one_line_per_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("summaries.jsonl");
        let reporter = JsonlReporter::new(path.clone());

        for run_id in ["a", "b"] {
            let summary = RunSummary::new(
                run_id.to_string(),
                "weighted_query_soak".to_string(),
                0,
                Default::default(),
                "0.1.0".to_string(),
            );
            reporter.report(&summary)?;
        }

        let runs = load_summary_runs(path)?;
        assert_eq!(2, runs.len());
        assert_eq!("b", runs[1].run_id);
        Ok(())
    }
}
