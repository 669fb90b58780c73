//! Tests for transport configuration.

use super::*;
use std::io::Write;

fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_config(extension: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// ============================================================================
// Defaults
// ============================================================================

mod defaults {
    use super::*;

    /// Verify a new configuration applies the documented defaults.
    #[test]
    fn test_new_uses_defaults() {
        let config = TransportConfig::new("localhost");

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 11300);
        assert_eq!(config.timeout, 10);
        assert_eq!(config.tube.as_str(), "default");
        assert_eq!(config.timeout_duration(), Duration::seconds(10));
    }

    /// Verify builder methods override defaults.
    #[test]
    fn test_builder_methods() {
        let config = TransportConfig::new("queue.internal")
            .with_port(11301)
            .with_timeout(3)
            .with_tube(TubeName::new("emails".to_string()).unwrap());

        assert_eq!(config.port, 11301);
        assert_eq!(config.timeout_duration(), Duration::seconds(3));
        assert_eq!(config.tube.as_str(), "emails");
    }

    /// Verify out-of-range timeouts are capped instead of overflowing.
    #[test]
    fn test_huge_timeout_duration_is_capped() {
        let config = TransportConfig::new("localhost").with_timeout(10_000_000_000_000_000);

        assert_eq!(
            config.timeout_duration(),
            Duration::seconds(i64::from(u32::MAX))
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Invalid { .. })
        ));
    }

    /// Verify the largest reservation timeout is still valid.
    #[test]
    fn test_max_timeout_is_valid() {
        let config = TransportConfig::new("localhost").with_timeout(MAX_TIMEOUT_SECONDS);

        assert!(config.validate().is_ok());
        assert_eq!(config.timeout_duration().num_seconds(), i64::from(u32::MAX));
    }
}

// ============================================================================
// Option Maps
// ============================================================================

mod from_options {
    use super::*;

    /// Verify all recognised options are applied.
    #[test]
    fn test_all_options() {
        let config = TransportConfig::from_options(&options(&[
            ("host", "10.0.0.5"),
            ("port", "11400"),
            ("timeout", "0"),
            ("tube", "reports"),
        ]))
        .unwrap();

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 11400);
        assert_eq!(config.timeout, 0);
        assert_eq!(config.tube.as_str(), "reports");
    }

    /// Verify host is the only required option.
    #[test]
    fn test_host_only() {
        let config = TransportConfig::from_options(&options(&[("host", "localhost")])).unwrap();

        assert_eq!(config, TransportConfig::new("localhost"));
    }

    /// Verify a missing host is reported.
    #[test]
    fn test_missing_host() {
        let result = TransportConfig::from_options(&options(&[("port", "11300")]));

        assert!(matches!(result, Err(ConfigurationError::Missing { key }) if key == "host"));
    }

    /// Verify non-numeric ports are rejected.
    #[test]
    fn test_invalid_port() {
        let result =
            TransportConfig::from_options(&options(&[("host", "localhost"), ("port", "eleven")]));

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    /// Verify port zero is rejected.
    #[test]
    fn test_zero_port() {
        let result = TransportConfig::from_options(&options(&[("host", "localhost"), ("port", "0")]));

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    /// Verify timeouts beyond the reservation range are rejected.
    #[test]
    fn test_timeout_out_of_range() {
        let result = TransportConfig::from_options(&options(&[
            ("host", "localhost"),
            ("timeout", "10000000000000000"),
        ]));

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    /// Verify invalid tube names are rejected.
    #[test]
    fn test_invalid_tube() {
        let result = TransportConfig::from_options(&options(&[
            ("host", "localhost"),
            ("tube", "has spaces"),
        ]));

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }
}

// ============================================================================
// DSN
// ============================================================================

mod from_dsn {
    use super::*;

    /// Verify host, port and query options are read from a DSN.
    #[test]
    fn test_full_dsn() {
        let config =
            TransportConfig::from_dsn("beanstalk://queue.local:11302?tube=emails&timeout=4")
                .unwrap();

        assert_eq!(config.host, "queue.local");
        assert_eq!(config.port, 11302);
        assert_eq!(config.timeout, 4);
        assert_eq!(config.tube.as_str(), "emails");
    }

    /// Verify a DSN without port falls back to the default port.
    #[test]
    fn test_dsn_default_port() {
        let config = TransportConfig::from_dsn("beanstalkd://localhost").unwrap();

        assert_eq!(config.port, 11300);
        assert_eq!(config.tube.as_str(), "default");
    }

    /// Verify unsupported schemes are rejected.
    #[test]
    fn test_wrong_scheme() {
        let result = TransportConfig::from_dsn("amqp://localhost:5672");

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    /// Verify unparseable DSNs are rejected.
    #[test]
    fn test_malformed_dsn() {
        let result = TransportConfig::from_dsn("not a dsn");

        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }
}

// ============================================================================
// Files and Environment
// ============================================================================

mod load {
    use super::*;

    /// Verify a TOML file is loaded with defaults for omitted keys.
    #[test]
    fn test_load_toml_file() {
        let file = write_config(".toml", "host = \"beanstalk.internal\"\ntube = \"jobs\"\n");

        let config =
            TransportConfig::load_layered(Some(file.path()), "BT_TEST_TOML", &HashMap::new()).unwrap();

        assert_eq!(config.host, "beanstalk.internal");
        assert_eq!(config.tube.as_str(), "jobs");
        assert_eq!(config.port, 11300);
        assert_eq!(config.timeout, 10);
    }

    /// Verify a JSON file is loaded.
    #[test]
    fn test_load_json_file() {
        let file = write_config(".json", r#"{"host": "127.0.0.1", "port": 11500, "timeout": 2}"#);

        let config =
            TransportConfig::load_layered(Some(file.path()), "BT_TEST_JSON", &HashMap::new()).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 11500);
        assert_eq!(config.timeout, 2);
    }

    /// Verify environment variables override file values.
    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(".toml", "host = \"from-file\"\nport = 11300\n");
        std::env::set_var("BT_TEST_ENV_HOST", "from-env");
        std::env::set_var("BT_TEST_ENV_PORT", "11999");

        let config = TransportConfig::load_layered(Some(file.path()), "BT_TEST_ENV", &HashMap::new());

        std::env::remove_var("BT_TEST_ENV_HOST");
        std::env::remove_var("BT_TEST_ENV_PORT");

        let config = config.unwrap();
        assert_eq!(config.host, "from-env");
        assert_eq!(config.port, 11999);
    }

    /// Verify loading without a host fails.
    #[test]
    fn test_load_without_host() {
        let file = write_config(".toml", "port = 11300\n");

        let result = TransportConfig::load_layered(Some(file.path()), "BT_TEST_NOHOST", &HashMap::new());

        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }

    /// Verify a missing file is an error when a path is given.
    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let result = TransportConfig::load_layered(Some(&path), "BT_TEST_ABSENT", &HashMap::new());

        assert!(result.is_err());
    }

    /// Verify explicit overrides win over file values.
    #[test]
    fn test_overrides_win() {
        let file = write_config(".toml", "host = \"from-file\"\ntube = \"jobs\"\n");

        let config = TransportConfig::load_layered(
            Some(file.path()),
            "BT_TEST_OVERRIDE",
            &options(&[("tube", "urgent"), ("timeout", "1")]),
        )
        .unwrap();

        assert_eq!(config.host, "from-file");
        assert_eq!(config.tube.as_str(), "urgent");
        assert_eq!(config.timeout, 1);
    }

    /// Verify overrides alone can supply a complete configuration.
    #[test]
    fn test_overrides_without_file() {
        let config = TransportConfig::load_layered(
            None,
            "BT_TEST_NOFILE",
            &options(&[("host", "localhost"), ("port", "11301")]),
        )
        .unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 11301);
    }

    /// Verify an out-of-range timeout from a file is rejected.
    #[test]
    fn test_load_timeout_out_of_range() {
        let file = write_config(".toml", "host = \"localhost\"\ntimeout = 10000000000000000\n");

        let result =
            TransportConfig::load_layered(Some(file.path()), "BT_TEST_BIGTIMEOUT", &HashMap::new());

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    /// Verify an invalid tube in a file is rejected.
    #[test]
    fn test_load_invalid_tube() {
        let file = write_config(".toml", "host = \"localhost\"\ntube = \"-bad\"\n");

        let result = TransportConfig::load_layered(Some(file.path()), "BT_TEST_BADTUBE", &HashMap::new());

        assert!(result.is_err());
    }
}
