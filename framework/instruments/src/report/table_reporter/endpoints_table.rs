use tabled::Tabled;

#[derive(Tabled)]
pub struct EndpointRow {
    pub endpoint: String,
    pub count: u64,
    pub errors: u64,
    #[tabled(display = "float2")]
    pub error_rate: f64,
    pub avg_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
    pub rate_limited: u64,
}

#[derive(Tabled)]
pub struct PatternRow {
    pub endpoint: String,
    pub shapes: usize,
    pub dominant_count: u64,
    pub anomalies: usize,
}

#[derive(Tabled)]
pub struct AnomalyRow {
    pub endpoint: String,
    pub count: u64,
    pub dominant_count: u64,
    pub shape: String,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}
