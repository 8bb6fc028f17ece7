//! Integration tests for CLI commands

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const CLUSTER: &str = "https://10.0.0.1:6443";

/// Run tether with a config and session cache isolated in `home`
fn tether(home: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tether"))
        .args(args)
        .env("TETHER_CONFIG", home.join("config.yml"))
        .env("TETHER_SESSION_DIR", home.join("sessions"))
        .env("TETHER_CLUSTER", CLUSTER)
        .env_remove("TETHER_MANAGER_URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute tether")
}

fn write_session(home: &Path) {
    let dir = home.join("sessions");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("10.0.0.1_6443.json"),
        r#"{"sessionId": "abc", "clusterHost": "https://10.0.0.1:6443"}"#,
    )
    .unwrap();
}

mod basic_commands {
    use super::*;

    #[test]
    fn test_help() {
        let home = TempDir::new().unwrap();
        let output = tether(home.path(), &["--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("helm"));
        assert!(stdout.contains("intercept"));
        assert!(stdout.contains("leave"));
        assert!(stdout.contains("list"));
    }

    #[test]
    fn test_version() {
        let home = TempDir::new().unwrap();
        let output = tether(home.path(), &["--version"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_helm_help() {
        let home = TempDir::new().unwrap();
        let output = tether(home.path(), &["helm", "--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("install"));
        assert!(stdout.contains("upgrade"));
        assert!(stdout.contains("uninstall"));
    }

    #[test]
    fn test_unknown_command() {
        let home = TempDir::new().unwrap();
        let output = tether(home.path(), &["nonexistent"]);

        assert_eq!(output.status.code(), Some(2));
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn test_list_without_session() {
        let home = TempDir::new().unwrap();
        let output = tether(home.path(), &["list"]);

        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Not connected to the traffic manager"));
    }

    #[test]
    fn test_intercept_without_session() {
        let home = TempDir::new().unwrap();
        let output = tether(home.path(), &["intercept", "web", "--port", "8080"]);

        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_invalid_config() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("config.yml"), "timeouts: [1, 2").unwrap();

        let output = tether(home.path(), &["list"]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Invalid configuration"));
    }

    #[test]
    fn test_invalid_values_json() {
        let home = TempDir::new().unwrap();
        let output = tether(home.path(), &["helm", "install", "--values-json", "{not json"]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("unable to parse values JSON"));
    }

    #[test]
    fn test_unreachable_manager() {
        let home = TempDir::new().unwrap();
        write_session(home.path());

        let output = tether(
            home.path(),
            &["leave", "web", "--manager-url", "http://127.0.0.1:1"],
        );

        assert_eq!(output.status.code(), Some(6));
    }
}

mod intercepts {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn manager() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "traffic-manager",
                "version": "2.5.0"
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_list_intercepts() {
        let server = manager().await;
        Mock::given(method("GET"))
            .and(path("/sessions/abc/intercepts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "spec": {
                        "name": "web",
                        "workload": "web",
                        "mechanism": "tcp",
                        "targetHost": "127.0.0.1",
                        "targetPort": 8080
                    },
                    "previewDomain": "web-abc.preview.tether.dev"
                }
            ])))
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        write_session(home.path());
        let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_tether"))
            .args(["list", "--manager-url", &server.uri()])
            .env("TETHER_CONFIG", home.path().join("config.yml"))
            .env("TETHER_SESSION_DIR", home.path().join("sessions"))
            .env("TETHER_CLUSTER", CLUSTER)
            .output()
            .await
            .unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("web"));
        assert!(stdout.contains("redirecting them to 127.0.0.1:8080"));
        assert!(stdout.contains("https://web-abc.preview.tether.dev"));
    }

    #[tokio::test]
    async fn test_leave_unknown_intercept() {
        let server = manager().await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/abc/intercepts/ghost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "NOT_FOUND",
                "errorText": "ghost"
            })))
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        write_session(home.path());
        let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_tether"))
            .args(["leave", "ghost", "--manager-url", &server.uri()])
            .env("TETHER_CONFIG", home.path().join("config.yml"))
            .env("TETHER_SESSION_DIR", home.path().join("sessions"))
            .env("TETHER_CLUSTER", CLUSTER)
            .output()
            .await
            .unwrap();

        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("ghost"));
    }
}
