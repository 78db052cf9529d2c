//! Operator-facing reporting.
//!
//! Components never print directly. They are handed a [`Reporter`] at
//! construction and send status lines, warnings and prompts through it.
//! Diagnostics meant for developers go to `tracing` instead.

use std::io;
use std::sync::Arc;

/// Interactive surface towards the operator.
pub trait Reporter: Send + Sync {
    /// Informational status line.
    fn info(&self, message: &str);

    /// Something the operator should pay attention to.
    fn warn(&self, message: &str);

    /// Ask a question and return the raw answer line.
    fn prompt(&self, question: &str) -> io::Result<String>;
}

/// Shared reporter handle.
pub type SharedReporter = Arc<dyn Reporter>;

/// Reporter that forwards everything to `tracing` and answers every prompt
/// with an empty line.
///
/// Useful for non-interactive embedding: an overwrite prompt is then always
/// declined.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn prompt(&self, question: &str) -> io::Result<String> {
        tracing::warn!("{} (non-interactive, declining)", question);
        Ok(String::new())
    }
}
