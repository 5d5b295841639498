//! CLI Integration Tests
//!
//! Runs the `reklam-uploadr` binary against temporary configs and a mock backend.

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_config(dir: &Path, base_url: &str, extra: &str) -> PathBuf {
        let config_path = dir.join("config.yaml");
        let content = format!(
            "api:\n  base_url: \"{}\"\n  timeout_seconds: 5\n{}",
            base_url, extra
        );
        std::fs::write(&config_path, content).unwrap();
        config_path
    }

    fn write_files(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let file_path = dir.join(format!("scan-{}.png", i));
                std::fs::write(&file_path, vec![0u8; 256]).unwrap();
                file_path
            })
            .collect()
    }

    fn command(config: &Path) -> Command {
        let mut cmd = Command::cargo_bin("reklam-uploadr").unwrap();
        cmd.env_remove("RUST_LOG")
            .arg("--config")
            .arg(config)
            .arg("--log-level")
            .arg("warn");
        cmd
    }

    #[test]
    fn test_help_lists_owner_flags() {
        Command::cargo_bin("reklam-uploadr")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--ref-type"))
            .stdout(predicate::str::contains("--ref-id"));
    }

    #[test]
    fn test_missing_config_fails() {
        let dir = TempDir::new().unwrap();
        let files = write_files(dir.path(), 1);

        command(&dir.path().join("missing.yaml"))
            .args(["--ref-type", "job", "--ref-id", "1"])
            .args(&files)
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to load configuration"));
    }

    #[test]
    fn test_unknown_ref_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "http://127.0.0.1:9", "");
        let files = write_files(dir.path(), 1);

        command(&config)
            .args(["--ref-type", "invoice", "--ref-id", "1"])
            .args(&files)
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown ref_type"));
    }

    #[test]
    fn test_too_many_files_exits_with_rejection() {
        let dir = TempDir::new().unwrap();
        // Nothing listens here; a rejected batch never connects
        let config = write_config(dir.path(), "http://127.0.0.1:9", "");
        let files = write_files(dir.path(), 11);

        command(&config)
            .args(["--ref-type", "job", "--ref-id", "1"])
            .args(&files)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("too many files"));
    }

    #[test]
    fn test_too_many_files_rejected_before_reading_them() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "http://127.0.0.1:9", "");
        // None of these exist; reading any of them would fail with "failed to read"
        let files: Vec<PathBuf> = (0..11)
            .map(|i| dir.path().join(format!("missing-{}.png", i)))
            .collect();

        command(&config)
            .args(["--ref-type", "job", "--ref-id", "1"])
            .args(&files)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("too many files"))
            .stderr(predicate::str::contains("failed to read").not());
    }

    #[test]
    fn test_disabled_uploads_exit_with_rejection() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            dir.path(),
            "http://127.0.0.1:9",
            "upload:\n  disabled: true\n",
        );
        let files = write_files(dir.path(), 1);

        command(&config)
            .args(["--ref-type", "user", "--ref-id", "u-3"])
            .args(&files)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("uploads are disabled"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_successful_batch_prints_summary() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/upload-url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "upload_url": format!("{}/storage/object", mock_server.uri()),
                    "object_key": "job/9/object",
                    "folder_path": "job/9"
                }
            })))
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/storage/object"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files/link"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), &mock_server.uri(), "");
        let files = write_files(dir.path(), 2);

        let assert = tokio::task::spawn_blocking(move || {
            command(&config)
                .args(["--ref-type", "job", "--ref-id", "9", "--print-metrics"])
                .args(&files)
                .assert()
        })
        .await
        .unwrap();

        assert
            .success()
            .stdout(predicate::str::contains("2 uploaded, 0 failed"))
            .stdout(predicate::str::contains("reklam_upload_batches_total"));
    }
}
