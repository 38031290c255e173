use super::{Settings, load_config};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.client.api_key, "");
    assert_eq!(settings.client.client_id, None);
    assert_eq!(
        settings.client.namespace_subject,
        "accounts.user.get_namespace"
    );
    assert_eq!(settings.resend.max_attempts, 3);
    assert_eq!(settings.resend.retry_delay_ms, 500);
    assert_eq!(settings.resend.message_gap_ms, 100);
    assert_eq!(settings.resend.max_failed_cycles, None);
    assert_eq!(settings.consumer.max_deliver, 3);
    assert_eq!(settings.history.fetch_expiry_ms, 5000);
    assert_eq!(settings.storage.path, None);
    assert_eq!(settings.telemetry.batch_size, 100);
    assert_eq!(settings.log_level, "info");
}

/// Run `f` with an empty temporary directory as the working directory.
fn in_temp_dir<F: FnOnce(&TempDir)>(f: F) {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");
    f(&tmp);
    env::set_current_dir(orig).expect("restore cwd");
}

#[test]
#[serial]
fn test_load_config_without_sources_uses_defaults() {
    in_temp_dir(|_| {
        let cfg = load_config().expect("load_config failed");
        assert_eq!(cfg, Settings::default());
    });
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    in_temp_dir(|_| {
        fs::create_dir_all("config").expect("create config dir");
        let toml = r#"
            log_level = "debug"

            [client]
            api_key = "file-key"
            request_timeout_ms = 1500

            [resend]
            max_attempts = 5
            max_failed_cycles = 2

            [storage]
            path = "queue_db"
        "#;
        fs::write("config/default.toml", toml).expect("write config file");

        let cfg = load_config().expect("load_config failed");
        assert_eq!(cfg.client.api_key, "file-key");
        assert_eq!(cfg.client.request_timeout_ms, 1500);
        assert_eq!(cfg.client.connect_timeout_ms, 5000);
        assert_eq!(cfg.resend.max_attempts, 5);
        assert_eq!(cfg.resend.max_failed_cycles, Some(2));
        assert_eq!(cfg.resend.retry_delay_ms, 500);
        assert_eq!(cfg.storage.path.as_deref(), Some("queue_db"));
        assert_eq!(cfg.log_level, "debug");
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    in_temp_dir(|_| {
        fs::create_dir_all("config").expect("create config dir");
        fs::write("config/default.toml", "[client]\napi_key = \"file-key\"\n")
            .expect("write config file");

        temp_env::with_vars(
            [
                ("RELAY_CLIENT__API_KEY", Some("env-key")),
                ("RELAY_TELEMETRY__BATCH_SIZE", Some("7")),
            ],
            || {
                let cfg = load_config().expect("load_config failed");
                assert_eq!(cfg.client.api_key, "env-key");
                assert_eq!(cfg.telemetry.batch_size, 7);
            },
        );
    });
}
