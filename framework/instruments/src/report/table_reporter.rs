mod endpoints_table;

use chain_tunnel_summary_model::RunSummary;
use tabled::settings::Style;
use tabled::Table;

use crate::report::table_reporter::endpoints_table::{AnomalyRow, EndpointRow, PatternRow};
use crate::report::ReportSink;

/// Prints the run summary as tables at the end of the run.
#[derive(Debug, Default)]
pub struct TableReporter;

impl TableReporter {
    fn print_summary_of_endpoints(&self, summary: &RunSummary) {
        println!("\nSummary of requests");
        let rows = summary
            .endpoints
            .iter()
            .map(|(endpoint, stats)| EndpointRow {
                endpoint: endpoint.clone(),
                count: stats.count,
                errors: stats.errors,
                error_rate: stats.error_rate,
                avg_ms: stats.average_latency,
                p50_ms: stats.p50_latency,
                p95_ms: stats.p95_latency,
                max_ms: stats.max_latency,
                rate_limited: stats.rate_limit_hits,
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");

        println!(
            "{} requests ({} ok, {} failed) in {:.2}s, error rate {:.2}%, average latency {}ms, {} rate limited",
            summary.requests.total,
            summary.requests.successful,
            summary.requests.failed,
            summary.duration_ms as f64 / 1000.0,
            summary.error_rate,
            summary.average_latency,
            summary.rate_limit.total_hits,
        );
    }

    fn print_summary_of_patterns(&self, summary: &RunSummary) {
        if summary.patterns_by_endpoint.is_empty() {
            return;
        }

        println!("\nResponse shapes");
        let rows = summary
            .patterns_by_endpoint
            .iter()
            .map(|(endpoint, patterns)| PatternRow {
                endpoint: endpoint.clone(),
                shapes: patterns.len(),
                dominant_count: patterns.first().map(|p| p.count).unwrap_or_default(),
                anomalies: summary
                    .anomalies
                    .iter()
                    .filter(|a| &a.endpoint == endpoint)
                    .count(),
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");

        if !summary.anomalies.is_empty() {
            println!("\nAnomalous response shapes");
            let rows = summary
                .anomalies
                .iter()
                .map(|a| AnomalyRow {
                    endpoint: a.endpoint.clone(),
                    count: a.count,
                    dominant_count: a.dominant_count,
                    shape: a.key.clone(),
                })
                .collect::<Vec<_>>();

            let mut table = Table::new(rows);
            table.with(Style::modern());
            println!("{table}");
        }
    }
}

impl ReportSink for TableReporter {
    fn report(&self, summary: &RunSummary) -> anyhow::Result<()> {
        self.print_summary_of_endpoints(summary);
        self.print_summary_of_patterns(summary);
        Ok(())
    }
}
