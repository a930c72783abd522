use std::io::Write as _;

use super::*;

fn load_toml(contents: &str) -> Result<Settings, LoadError> {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");

    let cli = CliArgs {
        config_file: Some(file.path().to_path_buf()),
        command: None,
    };
    load(&cli)
}

#[test]
fn defaults_are_applied() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.idempotency.ttl, DEFAULT_TTL);
    assert_eq!(settings.idempotency.supported_methods, ["POST", "PUT"]);
    assert_eq!(settings.idempotency.ignored_response_headers, ["x-request-id"]);
    assert!(settings.idempotency.request_matching_checks_enabled);
    assert_eq!(settings.idempotency.max_key_length, 255);
    assert_eq!(settings.idempotency.namespace, "idemgate");
    assert_eq!(settings.store.capacity.get(), 10_000);
    assert_eq!(settings.body.max_request_bytes, 1024 * 1024);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.idempotency.ttl_ms = Some(1_000);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        idempotency_ttl_ms: Some(5_000),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.idempotency.ttl, Duration::from_millis(5_000));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_max_key_length_disables_the_check() {
    let mut raw = RawSettings::default();
    raw.idempotency.max_key_length = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.idempotency.max_key_length, 0);
}

#[test]
fn negative_max_key_length_is_rejected() {
    let mut raw = RawSettings::default();
    raw.idempotency.max_key_length = Some(-1);

    let err = Settings::from_raw(raw).expect_err("negative length");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "idempotency.max_key_length",
            ..
        }
    ));
}

#[test]
fn zero_store_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.store.capacity = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(err, LoadError::Invalid { key: "store.capacity", .. }));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn config_file_values_are_loaded() {
    let settings = load_toml(
        r#"
        [idempotency]
        ttl_ms = 60000
        supported_methods = ["POST", "PATCH"]
        max_key_length = 64
        namespace = "orders"

        [store]
        capacity = 32
        "#,
    )
    .expect("valid settings");

    assert_eq!(settings.idempotency.ttl, Duration::from_secs(60));
    assert_eq!(settings.idempotency.supported_methods, ["POST", "PATCH"]);
    assert_eq!(settings.idempotency.max_key_length, 64);
    assert_eq!(settings.idempotency.namespace, "orders");
    assert_eq!(settings.store.capacity.get(), 32);
}

#[test]
fn negative_max_key_length_in_file_fails_load() {
    let err = load_toml("[idempotency]\nmax_key_length = -5\n").expect_err("negative length");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "idempotency.max_key_length",
            ..
        }
    ));
}

#[test]
fn non_integer_max_key_length_in_file_fails_load() {
    let err = load_toml("[idempotency]\nmax_key_length = \"long\"\n").expect_err("wrong type");
    assert!(matches!(err, LoadError::Build(_)));
}

#[test]
fn missing_config_file_fails_load() {
    let cli = CliArgs {
        config_file: Some("/nonexistent/idemgate.toml".into()),
        command: None,
    };
    assert!(matches!(load(&cli), Err(LoadError::Build(_))));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["idemgate"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "idemgate",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--idempotency-max-key-length",
        "-3",
        "--idempotency-request-matching",
        "false",
        "--store-capacity",
        "16",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.idempotency_max_key_length, Some(-3));
            assert_eq!(serve.overrides.idempotency_request_matching, Some(false));
            assert_eq!(serve.overrides.store_capacity, Some(16));
        }
    }
}
