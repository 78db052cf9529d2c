//! Terminal implementation of the operator reporting interface.

use std::io::{self, Write};
use std::sync::Mutex;

use indicatif::ProgressBar;
use tkey_sign_lib::report::Reporter;

use crate::ui;

/// Reports to the terminal. While a spinner runs, lines are printed above
/// it.
#[derive(Default)]
pub struct ConsoleReporter {
    progress: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a spinner until [`ConsoleReporter::finish`] is called.
    pub fn start(&self, message: &str) {
        let pb = ui::spinner(message);
        if let Some(old) = self.lock().replace(pb) {
            old.finish_and_clear();
        }
    }

    /// Remove the spinner, if any.
    pub fn finish(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        // A poisoned lock only means a print panicked; the spinner is still usable.
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn print(&self, f: impl FnOnce()) {
        match self.lock().as_ref() {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        self.print(|| ui::info(message));
    }

    fn warn(&self, message: &str) {
        self.print(|| ui::warning(message));
    }

    fn prompt(&self, question: &str) -> io::Result<String> {
        self.finish();
        eprint!("{} ", question);
        io::stderr().flush()?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        Ok(answer)
    }
}
