mod jsonl_reporter;
mod table_reporter;

use std::path::PathBuf;

use chain_tunnel_summary_model::RunSummary;

pub use jsonl_reporter::JsonlReporter;
pub use table_reporter::TableReporter;

/// Receives the final aggregate of a run, to print or persist it.
pub trait ReportSink: Send + Sync {
    fn report(&self, summary: &RunSummary) -> anyhow::Result<()>;
}

/// Discards the summary. Useful in tests and when another process collects results.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ReportSink for NoopReporter {
    fn report(&self, _summary: &RunSummary) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct ReportConfig {
    table: bool,
    jsonl_path: Option<PathBuf>,
    sinks: Vec<Box<dyn ReportSink>>,
}

impl ReportConfig {
    pub fn enable_table(mut self) -> Self {
        self.table = true;
        self
    }

    pub fn enable_jsonl(mut self, path: PathBuf) -> Self {
        self.jsonl_path = Some(path);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn init(self) -> Reporter {
        let mut sinks = self.sinks;
        if self.table {
            sinks.push(Box::new(TableReporter));
        }
        if let Some(path) = self.jsonl_path {
            sinks.push(Box::new(JsonlReporter::new(path)));
        }

        Reporter { sinks }
    }
}

/// Fans the final summary out to every configured sink.
pub struct Reporter {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl Reporter {
    pub fn noop() -> Self {
        Self { sinks: Vec::new() }
    }

    /// A failing sink is logged and does not stop the others.
    pub fn finalize(&self, summary: &RunSummary) {
        for sink in &self.sinks {
            if let Err(e) = sink.report(summary) {
                log::error!("Failed to report run summary: {:?}", e);
            }
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
