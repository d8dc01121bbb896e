use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};

struct ColonyMetrics {
    iterations: Counter<u64>,
    provider_failures: Counter<u64>,
    citations: Counter<u64>,
    run_duration_ms: Histogram<f64>,
}

static METRICS: OnceCell<ColonyMetrics> = OnceCell::new();

fn handles() -> &'static ColonyMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("colony");
        ColonyMetrics {
            iterations: meter
                .u64_counter("colony_iterations_total")
                .with_description("Explore/critique iterations by outcome")
                .init(),
            provider_failures: meter
                .u64_counter("colony_provider_failures_total")
                .with_description("Source provider failures absorbed as empty results")
                .init(),
            citations: meter
                .u64_counter("colony_citations_total")
                .with_description("Citations checked by verification status")
                .init(),
            run_duration_ms: meter
                .f64_histogram("colony_run_duration_ms")
                .with_description("End-to-end run duration in milliseconds")
                .init(),
        }
    })
}

/// Record one explore/critique iteration (no-op if no provider installed).
pub fn record_iteration(outcome: &str, depth: u32) {
    handles().iterations.add(
        1,
        &[
            KeyValue::new("outcome", outcome.to_string()),
            KeyValue::new("depth", depth as i64),
        ],
    );
}

pub fn record_provider_failure(provider: &str, class: &str) {
    handles().provider_failures.add(
        1,
        &[
            KeyValue::new("provider", provider.to_string()),
            KeyValue::new("class", class.to_string()),
        ],
    );
}

pub fn record_citation(status: &str) {
    handles()
        .citations
        .add(1, &[KeyValue::new("status", status.to_string())]);
}

pub fn record_run(duration_ms: u64, iterations: usize) {
    handles().run_duration_ms.record(
        duration_ms as f64,
        &[KeyValue::new("iterations", iterations as i64)],
    );
}
