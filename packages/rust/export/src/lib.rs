//! CSV report writer.
//!
//! The whole report is encoded in memory, hashed, written to a hidden temp
//! file next to the target, and renamed into place. A failed run therefore
//! never leaves a partial report behind.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use accessreport_shared::{AccessReportError, Result};

/// Outcome of a successful write.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Final path of the report.
    pub path: PathBuf,
    /// Data rows written (header excluded).
    pub rows: usize,
    /// SHA-256 of the file contents, lowercase hex.
    pub sha256: String,
    pub size_bytes: usize,
}

/// Encode `headers` and `rows` as CSV.
///
/// Every row must have exactly as many cells as there are headers.
pub fn encode_csv(headers: &[&str], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(headers)
        .map_err(|e| AccessReportError::Csv(e.to_string()))?;

    for (i, row) in rows.iter().enumerate() {
        if row.len() != headers.len() {
            return Err(AccessReportError::validation(format!(
                "row {i} has {} cells, expected {}",
                row.len(),
                headers.len()
            )));
        }
        writer
            .write_record(row)
            .map_err(|e| AccessReportError::Csv(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| AccessReportError::Csv(e.to_string()))
}

/// Write a CSV report to `output_dir/file_name` atomically.
#[instrument(skip_all, fields(dir = %output_dir.display(), file = file_name, rows = rows.len()))]
pub fn write_csv(
    output_dir: &Path,
    file_name: &str,
    headers: &[&str],
    rows: &[Vec<String>],
) -> Result<ExportSummary> {
    let bytes = encode_csv(headers, rows)?;

    std::fs::create_dir_all(output_dir).map_err(|e| AccessReportError::io(output_dir, e))?;

    let target = output_dir.join(file_name);
    let temp = output_dir.join(format!(".{file_name}.tmp"));

    // Write to temp file first, then atomic rename
    TempFile::write(temp, &bytes)?.persist(&target)?;

    let summary = ExportSummary {
        path: target,
        rows: rows.len(),
        sha256: compute_hash(&bytes),
        size_bytes: bytes.len(),
    };

    info!(
        path = %summary.path.display(),
        rows = summary.rows,
        sha256 = %summary.sha256,
        "report written"
    );

    Ok(summary)
}

/// A temp file next to the report. Removed on drop unless renamed into place.
struct TempFile {
    path: PathBuf,
    persisted: bool,
}

impl TempFile {
    fn write(path: PathBuf, bytes: &[u8]) -> Result<Self> {
        let temp = Self {
            path,
            persisted: false,
        };
        let mut file = File::create(&temp.path).map_err(|e| AccessReportError::io(&temp.path, e))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| AccessReportError::io(&temp.path, e))?;
        Ok(temp)
    }

    fn persist(mut self, target: &Path) -> Result<()> {
        std::fs::rename(&self.path, target).map_err(|e| AccessReportError::io(target, e))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("accessreport-{tag}-{}", uuid::Uuid::now_v7()))
    }

    fn sample_rows() -> Vec<Vec<String>> {
        vec![
            vec!["a-1".into(), "Ada Lovelace".into(), "Admins, Developers".into()],
            vec!["a-2".into(), "Grace \"Amazing\" Hopper".into(), String::new()],
        ]
    }

    #[test]
    fn encode_quotes_embedded_delimiters() {
        let bytes = encode_csv(&["accountId", "displayName", "groups"], &sample_rows()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "accountId,displayName,groups");
        assert_eq!(lines[1], "a-1,Ada Lovelace,\"Admins, Developers\"");
        assert_eq!(lines[2], "a-2,\"Grace \"\"Amazing\"\" Hopper\",");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn header_only_when_no_rows() {
        let bytes = encode_csv(&["accountId", "group"], &[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "accountId,group\n");
    }

    #[test]
    fn row_width_mismatch_is_rejected() {
        let rows = vec![vec!["only-one".to_string()]];
        let err = encode_csv(&["a", "b"], &rows).unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn write_is_atomic_and_hashed() {
        let dir = temp_dir("write");
        let headers = ["accountId", "displayName", "groups"];

        let first = write_csv(&dir, "jira_users.csv", &headers, &sample_rows()).unwrap();
        assert_eq!(first.rows, 2);
        assert_eq!(first.sha256.len(), 64);
        assert!(first.path.exists());
        assert!(!dir.join(".jira_users.csv.tmp").exists());

        let second = write_csv(&dir, "jira_users.csv", &headers, &sample_rows()).unwrap();
        assert_eq!(first.sha256, second.sha256);

        let on_disk = std::fs::read(&second.path).unwrap();
        assert_eq!(on_disk.len(), second.size_bytes);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn temp_file_is_removed_unless_persisted() {
        let dir = temp_dir("temp-file");
        std::fs::create_dir_all(&dir).unwrap();
        let temp = dir.join(".report.csv.tmp");

        let written = TempFile::write(temp.clone(), b"a,b\n").unwrap();
        assert!(temp.exists());
        drop(written);
        assert!(!temp.exists());

        let target = dir.join("report.csv");
        TempFile::write(temp.clone(), b"a,b\n")
            .unwrap()
            .persist(&target)
            .unwrap();
        assert!(!temp.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"a,b\n");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_rename_cleans_up_temp_file() {
        let dir = temp_dir("rename");
        // A directory at the target path makes the rename fail.
        std::fs::create_dir_all(dir.join("jira_users.csv").join("occupied")).unwrap();

        let err = write_csv(&dir, "jira_users.csv", &["a"], &[vec!["1".into()]]).unwrap_err();
        assert!(matches!(err, AccessReportError::Io { .. }));
        assert!(!dir.join(".jira_users.csv.tmp").exists());
        assert!(dir.join("jira_users.csv").is_dir());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_encode_leaves_no_file() {
        let dir = temp_dir("fail");
        let rows = vec![vec!["x".to_string()]];
        assert!(write_csv(&dir, "confluence_users.csv", &["a", "b"], &rows).is_err());
        assert!(!dir.join("confluence_users.csv").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
