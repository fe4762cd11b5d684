use tracing::{info, warn};

/// Best-effort completion notice. Delivery is fire-and-forget: a failed
/// notification is logged and swallowed, never allowed to block or fail
/// the pipeline.
pub trait Notifier {
    fn notify(&self, message: &str);
}

/// Default sink: the operator log. Stands in for a chat webhook in
/// environments where none is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("notification: {}", message);
    }
}

/// Appends notices to a file, one per line. Useful for sandbox runs where
/// an external sink would be noise.
pub struct FileNotifier {
    path: std::path::PathBuf,
}

impl FileNotifier {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Notifier for FileNotifier {
    fn notify(&self, message: &str) {
        use std::io::Write;
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{message}"));
        if let Err(e) = result {
            warn!("Failed to deliver notification to {}: {}", self.path.display(), e);
        }
    }
}

/// Discards every notice. Used when notifications are disabled.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _message: &str) {}
}
