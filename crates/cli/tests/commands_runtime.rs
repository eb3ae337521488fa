use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use travo_cli::commands::{doctor, migrate, seed, sweep};

#[test]
fn migrate_returns_success_with_memory_database() {
    with_env(
        &[("TRAVO_DATABASE_URL", "sqlite::memory:"), ("TRAVO_DATABASE_MAX_CONNECTIONS", "1")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");

            let message = payload["message"].as_str().unwrap_or("");
            assert!(message.contains("applied 3 migration(s)"));
            assert!(message.contains("  - 0001 users"));
        },
    );
}

#[test]
fn migrate_returns_config_failure_for_unsupported_database_url() {
    with_env(&[("TRAVO_DATABASE_URL", "postgres://localhost/travo")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_deterministic_request_summary() {
    with_env(
        &[("TRAVO_DATABASE_URL", "sqlite::memory:"), ("TRAVO_DATABASE_MAX_CONNECTIONS", "1")],
        || {
            let result = seed::run();
            assert_eq!(result.exit_code, 0, "expected successful seed run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "seed");
            assert_eq!(payload["status"], "ok");

            let message = payload["message"].as_str().unwrap_or("");
            let pending_line =
                "  - seed-request-pending (Teacher request awaiting principal validation)";
            let accepted_line =
                "  - seed-request-accepted (Approved principal request carrying a live security code)";
            assert!(message.contains("7 users and 2 travel requests"));
            assert!(message.contains(pending_line));
            assert!(message.contains(accepted_line));
        },
    );
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(
        &[("TRAVO_DATABASE_URL", "sqlite::memory:"), ("TRAVO_DATABASE_MAX_CONNECTIONS", "1")],
        || {
            let first = seed::run();
            assert_eq!(first.exit_code, 0, "expected first seed invocation success");
            let first_payload = parse_payload(&first.output);
            assert_eq!(first_payload["status"], "ok");

            let second = seed::run();
            assert_eq!(second.exit_code, 0, "expected second seed invocation success");
            let second_payload = parse_payload(&second.output);
            assert_eq!(second_payload["status"], "ok");

            assert_eq!(first_payload["message"], second_payload["message"]);
        },
    );
}

#[test]
fn sweep_reports_zero_counts_on_fresh_database() {
    with_env(
        &[("TRAVO_DATABASE_URL", "sqlite::memory:"), ("TRAVO_DATABASE_MAX_CONNECTIONS", "1")],
        || {
            let result = sweep::run();
            assert_eq!(result.exit_code, 0, "expected successful sweep run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "sweep");
            assert_eq!(payload["status"], "ok");
            assert_eq!(
                payload["message"],
                "sweep completed: 0 security codes expired, 0 travel windows closed"
            );
        },
    );
}

#[test]
fn doctor_json_reports_pass_with_memory_database() {
    with_env(
        &[("TRAVO_DATABASE_URL", "sqlite::memory:"), ("TRAVO_DATABASE_MAX_CONNECTIONS", "1")],
        || {
            let output = doctor::run(true);
            let payload: Value =
                serde_json::from_str(&output).expect("doctor output should be valid JSON");

            assert_eq!(payload["overall_status"], "pass");
            let checks = payload["checks"].as_array().expect("checks array");
            assert_eq!(checks.len(), 3);
            assert!(checks.iter().all(|check| check["status"] == "pass"));
        },
    );
}

#[test]
fn doctor_skips_downstream_checks_when_config_invalid() {
    with_env(&[("TRAVO_SWEEPER_INTERVAL_HOURS", "0")], || {
        let output = doctor::run(true);
        let payload: Value =
            serde_json::from_str(&output).expect("doctor output should be valid JSON");

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert_eq!(checks[1]["status"], "skipped");
        assert_eq!(checks[2]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TRAVO_DATABASE_URL",
        "TRAVO_DATABASE_MAX_CONNECTIONS",
        "TRAVO_DATABASE_TIMEOUT_SECS",
        "TRAVO_SWEEPER_INTERVAL_HOURS",
        "TRAVO_POLICY_CODE_VALID_WORKING_DAYS_AFTER_START",
        "TRAVO_POLICY_CODE_REISSUE_WORKING_DAYS",
        "TRAVO_LOGGING_LEVEL",
        "TRAVO_LOGGING_FORMAT",
        "TRAVO_LOG_LEVEL",
        "TRAVO_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
