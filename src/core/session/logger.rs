//! Scan log sink: catalog rows mirrored to tracing.

use crate::core::catalog::{CatalogStore, Component, LogLevel, ScanLogEntry};
use crate::error::ErrorDetail;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Writes ScanLogEntry rows for one session.
///
/// Every entry also goes to `tracing`. A failed catalog write is reported
/// there at error level and otherwise ignored; logging never stops a scan.
#[derive(Clone)]
pub struct SessionLogger {
    store: Arc<dyn CatalogStore>,
    session_id: String,
}

impl SessionLogger {
    pub fn new(store: Arc<dyn CatalogStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log(&self, entry: ScanLogEntry) {
        mirror(&entry);

        if let Err(e) = self.store.append_log(&entry) {
            error!(
                session_id = %entry.session_id,
                component = entry.component.as_str(),
                error = %e,
                "Could not write scan log entry: {}",
                entry.message
            );
        }
    }

    pub fn info(&self, component: Component, message: impl Into<String>) {
        self.log(ScanLogEntry::new(
            &self.session_id,
            LogLevel::Info,
            component,
            message,
        ));
    }

    pub fn debug(&self, component: Component, message: impl Into<String>, path: &Path) {
        self.log(
            ScanLogEntry::new(&self.session_id, LogLevel::Debug, component, message)
                .with_path(path),
        );
    }

    pub fn warning(&self, component: Component, message: impl Into<String>, detail: ErrorDetail) {
        self.log(
            ScanLogEntry::new(&self.session_id, LogLevel::Warning, component, message)
                .with_detail(detail),
        );
    }

    pub fn error(&self, component: Component, message: impl Into<String>, detail: ErrorDetail) {
        self.log(
            ScanLogEntry::new(&self.session_id, LogLevel::Error, component, message)
                .with_detail(detail),
        );
    }
}

fn mirror(entry: &ScanLogEntry) {
    let path = entry
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let component = entry.component.as_str();

    match entry.level {
        LogLevel::Debug => {
            debug!(session_id = %entry.session_id, component, path = %path, "{}", entry.message)
        }
        LogLevel::Info => {
            info!(session_id = %entry.session_id, component, path = %path, "{}", entry.message)
        }
        LogLevel::Warning => {
            warn!(session_id = %entry.session_id, component, path = %path, "{}", entry.message)
        }
        LogLevel::Error => {
            error!(session_id = %entry.session_id, component, path = %path, "{}", entry.message)
        }
    }
}
