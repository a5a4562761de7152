//! Credit ledger metrics for Prometheus.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, register_int_counter, register_int_counter_vec};

/// Credits removed by successful debits
static CREDITS_DEBITED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("stickerctl_credits_debited_total", "Total credits removed by successful debits")
        .expect("Failed to register stickerctl_credits_debited_total metric")
});

/// Credits added by approved top-ups
static CREDITS_GRANTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("stickerctl_credits_granted_total", "Total credits added by approved top-up requests")
        .expect("Failed to register stickerctl_credits_granted_total metric")
});

/// Debits refused because the balance did not cover them
static DEBIT_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("stickerctl_debit_rejections_total", "Total debits refused for insufficient balance")
        .expect("Failed to register stickerctl_debit_rejections_total metric")
});

/// Top-up request lifecycle events, labelled `requested`, `approved` or `rejected`
static TOP_UP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("stickerctl_top_up_requests_total", "Top-up request lifecycle events", &["event"])
        .expect("Failed to register stickerctl_top_up_requests_total metric")
});

/// Generation attempts by outcome: `charged`, `rejected`, `provider_failed` or `unbilled`
static GENERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("stickerctl_generations_total", "Billable generation outcomes", &["outcome"])
        .expect("Failed to register stickerctl_generations_total metric")
});

pub fn record_debit(amount: i64) {
    CREDITS_DEBITED.inc_by(amount.max(0) as u64);
}

pub fn record_debit_rejected() {
    DEBIT_REJECTIONS.inc();
}

pub fn record_top_up(event: &str) {
    TOP_UP_REQUESTS.with_label_values(&[event]).inc();
}

pub fn record_credit_granted(amount: i64) {
    CREDITS_GRANTED.inc_by(amount.max(0) as u64);
}

pub fn record_generation(outcome: &str) {
    GENERATIONS.with_label_values(&[outcome]).inc();
}
