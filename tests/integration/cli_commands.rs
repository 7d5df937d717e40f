//! Binary-level checks of the three subcommands

use assert_cmd::Command;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ISOLATED_ENV: &[&str] = &[
    "API_KEYS",
    "API_KEY",
    "DATA_DIR",
    "STATE_DIR",
    "RETAIN_DAYS",
    "WEBHOOK_URL",
    "METRICS_ADDR",
    "COINALYZE_BASE",
    "COINALYZE_TIMEOUT",
    "LOG_FORMAT",
];

fn exporter() -> Command {
    let mut cmd = Command::cargo_bin("coinalyze-exporter").unwrap();
    for var in ISOLATED_ENV {
        cmd.env_remove(var);
    }
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_help_lists_subcommands() {
    let output = exporter().arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for command in ["export", "prune", "status"] {
        assert!(text.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_status_on_empty_state() {
    let dir = TempDir::new().unwrap();
    let output = exporter()
        .args(["--output-format", "json", "status"])
        .arg("--state-dir")
        .arg(dir.path().join("state"))
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["ledgers"], json!([]));
}

#[test]
fn test_prune_removes_expired_partition() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let old = data.join("BTCUSDT_PERP.A/1hour/20240101");
    let recent = data.join("BTCUSDT_PERP.A/1hour/20240110");
    std::fs::create_dir_all(&old).unwrap();
    std::fs::create_dir_all(&recent).unwrap();

    let output = exporter()
        .arg("--data-dir")
        .arg(&data)
        .args([
            "--output-format",
            "json",
            "prune",
            "--retain-days",
            "3",
            "--today",
            "2024-01-12",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["removed"], json!(1));
    assert!(!old.exists());
    assert!(recent.exists());
}

#[test]
fn test_export_without_credentials_fails() {
    let dir = TempDir::new().unwrap();
    exporter()
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .args(["export", "--symbols", "BTCUSDT_PERP.A", "--start", "2024-01-01"])
        .assert()
        .failure();
}

#[test]
fn test_export_rejects_reversed_range() {
    let dir = TempDir::new().unwrap();
    exporter()
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .args([
            "export",
            "--symbols",
            "BTCUSDT_PERP.A",
            "--start",
            "2024-01-05",
            "--end",
            "2024-01-01",
            "--api-key",
            "k",
        ])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_then_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/open-interest-history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "history": [{"t": 1704067200, "o": 1.0}]
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let base_url = format!("{}/v1", server.uri());
    let webhook = format!("{}/hook", server.uri());

    let export = tokio::task::spawn_blocking({
        let data = data.clone();
        move || {
            exporter()
                .arg("--data-dir")
                .arg(&data)
                .args([
                    "--output-format",
                    "json",
                    "export",
                    "--symbols",
                    "BTCUSDT_PERP.A",
                    "--intervals",
                    "1h",
                    "--start",
                    "2024-01-01",
                    "--end",
                    "2024-01-02",
                    "--categories",
                    "oi",
                    "--api-key",
                    "secret",
                    "--pacing-ms",
                    "0",
                    "--base-url",
                    &base_url,
                    "--webhook-url",
                    &webhook,
                ])
                .output()
                .unwrap()
        }
    })
    .await
    .unwrap();

    assert!(
        export.status.success(),
        "{}",
        String::from_utf8_lossy(&export.stderr)
    );
    let summary = stdout_json(&export);
    assert_eq!(summary["done"], json!(2));
    assert_eq!(summary["failed"], json!(0));
    assert_eq!(summary["units"], json!(2));
    assert!(data
        .join("BTCUSDT_PERP.A/1hour/20240102/oi.json")
        .exists());

    let status = tokio::task::spawn_blocking({
        let data = data.clone();
        move || {
            exporter()
                .arg("--data-dir")
                .arg(&data)
                .args(["--output-format", "json", "status"])
                .output()
                .unwrap()
        }
    })
    .await
    .unwrap();

    assert!(status.status.success());
    let ledgers = stdout_json(&status)["ledgers"].clone();
    assert_eq!(
        ledgers,
        json!([{"symbol": "BTCUSDT_PERP.A", "interval": "1hour", "ok": 2, "failed": 0}])
    );
}
