use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.cache.backend = Some("redis".to_string());
    raw.cache.redis_url = Some("redis://from-file:6379".to_string());

    let overrides = RuntimeOverrides {
        log_level: Some("debug".to_string()),
        cache_backend: Some("memory".to_string()),
        ..Default::default()
    };

    raw.apply_runtime_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.namespace, "curio");
    assert_eq!(settings.cache.entry_ttl_seconds.get(), 3600);
    assert_eq!(settings.cache.lock_ttl_seconds.get(), 10);
    assert_eq!(settings.cache.lock_wait_ms, 200);
    assert_eq!(settings.cache.membership_ttl_seconds.get(), 1800);
    assert_eq!(settings.listing.default_limit.get(), 20);
    assert_eq!(settings.listing.max_limit.get(), 100);
    assert_eq!(settings.listing.timezone, Tz::UTC);
    assert_eq!(
        settings.listing.privileged_lock_default,
        PrivilegedLockDefault::Any
    );
    assert!(settings.database.statement_timeout.is_none());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = RuntimeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_runtime_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn redis_backend_requires_url() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());

    let err = Settings::from_raw(raw).expect_err("missing redis url");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.redis_url",
            ..
        }
    ));
}

#[test]
fn namespace_rejects_glob_characters() {
    let mut raw = RawSettings::default();
    raw.cache.namespace = Some("cu*rio".to_string());

    let err = Settings::from_raw(raw).expect_err("glob in namespace");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.namespace",
            ..
        }
    ));
}

#[test]
fn lock_wait_must_be_shorter_than_lock_ttl() {
    let mut raw = RawSettings::default();
    raw.cache.lock_ttl_seconds = Some(1);
    raw.cache.lock_wait_ms = Some(1000);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn listing_limits_are_validated() {
    let mut raw = RawSettings::default();
    raw.listing.default_limit = Some(50);
    raw.listing.max_limit = Some(10);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.listing.max_limit = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn listing_timezone_and_lock_default_parse() {
    let mut raw = RawSettings::default();
    raw.listing.timezone = Some("Asia/Tokyo".to_string());
    raw.listing.privileged_lock_default = Some("Unlocked".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.listing.timezone, Tz::Asia__Tokyo);
    assert_eq!(
        settings.listing.privileged_lock_default,
        PrivilegedLockDefault::Unlocked
    );

    let mut raw = RawSettings::default();
    raw.listing.timezone = Some("Mars/Olympus".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn parse_list_arguments() {
    let viewer = Uuid::new_v4();
    let viewer_arg = viewer.to_string();
    let args = CliArgs::parse_from([
        "curio",
        "list",
        "--role",
        "member",
        "--viewer-id",
        viewer_arg.as_str(),
        "--filter",
        r#"{"page":2}"#,
        "--log-level",
        "warn",
    ]);

    match args.command {
        Command::List(list) => {
            assert_eq!(list.role, "member");
            assert_eq!(list.viewer_id, Some(viewer));
            assert_eq!(list.filter.as_deref(), Some(r#"{"page":2}"#));
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert_eq!(args.overrides.log_level.as_deref(), Some("warn"));
}

#[test]
fn parse_invalidate_arguments() {
    let id = Uuid::new_v4();
    let id_arg = id.to_string();

    let args = CliArgs::parse_from(["curio", "invalidate", "user-groups", id_arg.as_str()]);
    match args.command {
        Command::Invalidate(InvalidateArgs {
            target: InvalidateTarget::UserGroups { id: parsed },
        }) => assert_eq!(parsed, id),
        other => panic!("unexpected command: {other:?}"),
    }

    let args = CliArgs::parse_from(["curio", "--cache-enabled", "false", "invalidate", "all"]);
    assert!(matches!(
        args.command,
        Command::Invalidate(InvalidateArgs {
            target: InvalidateTarget::All
        })
    ));
    assert_eq!(args.overrides.cache_enabled, Some(false));
}
