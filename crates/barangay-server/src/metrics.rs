use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::error::MutationStage;

const REJECTION_STAGES: [MutationStage; 7] = [
    MutationStage::Received,
    MutationStage::Authorized,
    MutationStage::Validated,
    MutationStage::Derived,
    MutationStage::Persisted,
    MutationStage::Audited,
    MutationStage::Committed,
];

#[derive(Debug, Default)]
pub struct Metrics {
    request_total: AtomicU64,
    request_success: AtomicU64,
    request_error: AtomicU64,
    mutations_committed: AtomicU64,
    rejections: [AtomicU64; 7],
    authorization_denials: AtomicU64,
    consistency_violations: AtomicU64,
    reference_data_refreshes: AtomicU64,
}

fn stage_index(stage: MutationStage) -> usize {
    REJECTION_STAGES
        .iter()
        .position(|s| *s == stage)
        .unwrap_or(0)
}

fn push_counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name} {value}");
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.request_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.request_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.request_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.mutations_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, stage: MutationStage) {
        self.rejections[stage_index(stage)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denial(&self) {
        self.authorization_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consistency_violation(&self) {
        self.consistency_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.reference_data_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_total(&self) -> u64 {
        self.request_total.load(Ordering::Relaxed)
    }

    pub fn request_success(&self) -> u64 {
        self.request_success.load(Ordering::Relaxed)
    }

    pub fn request_error(&self) -> u64 {
        self.request_error.load(Ordering::Relaxed)
    }

    pub fn mutations_committed(&self) -> u64 {
        self.mutations_committed.load(Ordering::Relaxed)
    }

    pub fn rejections(&self, stage: MutationStage) -> u64 {
        self.rejections[stage_index(stage)].load(Ordering::Relaxed)
    }

    pub fn authorization_denials(&self) -> u64 {
        self.authorization_denials.load(Ordering::Relaxed)
    }

    pub fn consistency_violations(&self) -> u64 {
        self.consistency_violations.load(Ordering::Relaxed)
    }

    pub fn reference_data_refreshes(&self) -> u64 {
        self.reference_data_refreshes.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        push_counter(
            &mut output,
            "barangay_requests_total",
            "Total number of requests.",
            self.request_total(),
        );
        push_counter(
            &mut output,
            "barangay_requests_success_total",
            "Total successful requests.",
            self.request_success(),
        );
        push_counter(
            &mut output,
            "barangay_requests_error_total",
            "Total failed requests.",
            self.request_error(),
        );
        push_counter(
            &mut output,
            "barangay_mutations_committed_total",
            "Mutations committed with their audit record.",
            self.mutations_committed(),
        );

        output.push_str(
            "# HELP barangay_mutations_rejected_total Mutations rolled back, by the stage they failed to reach.\n",
        );
        output.push_str("# TYPE barangay_mutations_rejected_total counter\n");
        for stage in REJECTION_STAGES {
            let _ = writeln!(
                output,
                "barangay_mutations_rejected_total{{stage=\"{stage}\"}} {}",
                self.rejections(stage)
            );
        }

        push_counter(
            &mut output,
            "barangay_authorization_denials_total",
            "Requests denied by the access policy.",
            self.authorization_denials(),
        );
        push_counter(
            &mut output,
            "barangay_consistency_violations_total",
            "Stored derived values that differed from recomputation.",
            self.consistency_violations(),
        );
        push_counter(
            &mut output,
            "barangay_reference_data_refreshes_total",
            "Geographic reference data swaps.",
            self.reference_data_refreshes(),
        );
        output
    }
}

pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.render_prometheus(),
    )
}
