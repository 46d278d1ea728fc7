//! Per-request disk capture for offline analysis.
//!
//! When enabled, each proxied request writes three pretty-printed JSON files
//! into a date-stamped subdirectory: the original request, the translated
//! response, and a metadata record.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct AuditMetadata {
    pub request_id: String,
    pub backend: String,
    pub original_model: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    root: PathBuf,
    enabled: bool,
}

impl AuditLog {
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            root: root.into(),
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Capture one request/response exchange. A no-op when disabled.
    pub fn record(
        &self,
        request: &serde_json::Value,
        response: Option<&serde_json::Value>,
        metadata: &AuditMetadata,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let now = Local::now();
        let date_dir = self.root.join(now.format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&date_dir)?;

        let base = format!(
            "{}_{}",
            now.format("%H-%M-%S-%3f"),
            metadata.request_id
        );

        write_json(&date_dir.join(format!("{base}_request.json")), request)?;
        if let Some(response) = response {
            write_json(&date_dir.join(format!("{base}_response.json")), response)?;
        }
        write_json(
            &date_dir.join(format!("{base}_metadata.json")),
            &serde_json::to_value(metadata)?,
        )?;

        Ok(())
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value)?;
    std::fs::write(path, pretty)?;
    Ok(())
}

/// Request ids for audit filenames: timestamp-based like `req_20250131120000123`.
pub fn fresh_request_id() -> String {
    format!("req_{}", Local::now().format("%Y%m%d%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> AuditMetadata {
        AuditMetadata {
            request_id: "req_test".to_string(),
            backend: "grok".to_string(),
            original_model: "claude-sonnet-4-20250514".to_string(),
            duration_ms: 12.5,
        }
    }

    #[test]
    fn record_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), true);

        audit
            .record(
                &serde_json::json!({"model": "m"}),
                Some(&serde_json::json!({"type": "message"})),
                &metadata(),
            )
            .unwrap();

        let date_dir = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let mut names: Vec<String> = std::fs::read_dir(&date_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(names.len(), 3);
        assert!(names[0].ends_with("_metadata.json"));
        assert!(names[1].ends_with("_request.json"));
        assert!(names[2].ends_with("_response.json"));
    }

    #[test]
    fn missing_response_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), true);
        audit
            .record(&serde_json::json!({}), None, &metadata())
            .unwrap();

        let date_dir = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        assert_eq!(std::fs::read_dir(&date_dir).unwrap().count(), 2);
    }

    #[test]
    fn disabled_audit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), false);
        audit
            .record(&serde_json::json!({}), None, &metadata())
            .unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn request_ids_carry_the_prefix() {
        assert!(fresh_request_id().starts_with("req_"));
    }
}
