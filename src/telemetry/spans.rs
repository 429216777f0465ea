//! Span utilities for tick tracing.

use tracing::{info_span, Span};

/// Extension trait for recording an outcome on a span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the span wrapping one scheduler tick.
pub struct TickSpan;

impl TickSpan {
    /// `status` and `error.message` are filled in by
    /// [`SpanExt::record_result`]; `elapsed_ms` after the tick.
    pub fn new(loop_name: &str, batch_size: usize) -> Span {
        info_span!(
            "tick",
            loop_name = %loop_name,
            batch_size = batch_size,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        )
    }
}
