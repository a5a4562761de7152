//! Prometheus metrics.
//!
//! Counters register themselves with the default registry on first use; [`render`] encodes
//! everything registered so far in the text exposition format for `/metrics`.

pub mod credits;

use prometheus::{Encoder, TextEncoder};

/// Encode all registered metrics in the Prometheus text format
pub fn render() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
