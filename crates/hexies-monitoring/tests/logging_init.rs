use hexies_monitoring::{init_logging, MonitoringConfig};

#[test]
fn test_init_logging_installs_once() {
    let config = MonitoringConfig::new("hexies-test").with_filter("debug").with_json(true);

    assert!(init_logging(&config).is_ok());
    // A second global subscriber is refused.
    assert!(init_logging(&config).is_err());
}

#[test]
fn test_config_builder_overrides_defaults() {
    let config = MonitoringConfig::new("hexies-board").with_filter("hexies_core=trace");
    assert_eq!(config.service_name, "hexies-board");
    assert_eq!(config.log_filter, "hexies_core=trace");
    assert!(!config.enable_json_logging);
}
