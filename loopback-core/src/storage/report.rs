use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::LoopbackError;
use crate::models::session_report::SessionReport;

/// Path of the JSON sidecar for an exported artifact: `{path}.report.json`.
pub fn report_path(artifact_path: &Path) -> PathBuf {
    artifact_path.with_extension("report.json")
}

/// Write the session report as a JSON sidecar next to `artifact_path`.
pub fn write_report(report: &SessionReport, artifact_path: &Path) -> Result<PathBuf, LoopbackError> {
    let path = report_path(artifact_path);
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| LoopbackError::Storage(format!("failed to serialize report: {}", e)))?;
    fs::write(&path, json)
        .map_err(|e| LoopbackError::Storage(format!("failed to write report: {}", e)))?;
    Ok(path)
}

/// Read the session report sidecar of `artifact_path`.
pub fn read_report(artifact_path: &Path) -> Result<SessionReport, LoopbackError> {
    let path = report_path(artifact_path);
    let json = fs::read_to_string(&path)
        .map_err(|e| LoopbackError::Storage(format!("failed to read report: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| LoopbackError::Storage(format!("failed to parse report: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::{AudioFormat, LoopbackDiagnostics, SamplerStats};

    fn temp_artifact(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("loopback-report-{}-{}", std::process::id(), name))
    }

    #[test]
    fn sidecar_path() {
        assert_eq!(
            report_path(Path::new("/tmp/frame.ppm")),
            PathBuf::from("/tmp/frame.report.json")
        );
    }

    #[test]
    fn write_then_read() {
        let artifact = temp_artifact("frame.ppm");
        let diagnostics = LoopbackDiagnostics {
            read_cycles: 3,
            bytes_forwarded: 1920,
            ..Default::default()
        };
        let stats = SamplerStats {
            delivered: 10,
            forwarded: 2,
            dropped: 8,
        };
        let report = SessionReport::new(
            chrono::Utc::now(),
            1.5,
            AudioFormat::VOICE,
            &diagnostics,
            stats,
            Some("transient I/O error: overrun".into()),
        );

        let path = write_report(&report, &artifact).unwrap();
        let loaded = read_report(&artifact).unwrap();

        assert_eq!(loaded, report);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_report_is_storage_error() {
        let err = read_report(&temp_artifact("absent.ppm")).unwrap_err();
        assert!(matches!(err, LoopbackError::Storage(_)));
    }
}
