//! Reporter that records operator output.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::report::Reporter;

/// Records info lines, warnings and prompts, and answers prompts from a
/// queue. An empty queue answers with an empty line.
#[derive(Default)]
pub struct CapturingReporter {
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    answers: Mutex<VecDeque<String>>,
}

impl CapturingReporter {
    /// Create a reporter with no queued answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reporter with no queued answers.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a reporter answering prompts with `answers`, in order.
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Info lines so far.
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    /// Warnings so far.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    /// Prompts so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// True if any info line or warning contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.infos().iter().any(|l| l.contains(needle))
            || self.warnings().iter().any(|l| l.contains(needle))
    }
}

impl Reporter for CapturingReporter {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn prompt(&self, question: &str) -> io::Result<String> {
        self.prompts.lock().unwrap().push(question.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or_default())
    }
}
