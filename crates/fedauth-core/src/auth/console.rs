use std::io::{self, Write};

/// Sink for the human-facing lines printed during authentication.
pub trait Console: Send + Sync {
    fn print(&self, message: &str);
}

impl<F> Console for F
where
    F: Fn(&str) + Send + Sync,
{
    fn print(&self, message: &str) {
        self(message)
    }
}

/// Writes to standard error so stdout stays free for credential output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrConsole;

impl Console for StderrConsole {
    fn print(&self, message: &str) {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{message}");
    }
}
