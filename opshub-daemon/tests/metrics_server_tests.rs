//! Integration tests for metrics server functionality.

use opshub_core::config::MetricsConfig;
use opshub_daemon::metrics_server;
use serial_test::serial;

#[test]
#[serial]
fn test_install_metrics_recorder_succeeds_with_valid_config() {
    // Given: A valid metrics configuration
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19100, // Use non-standard port to avoid conflicts
    };

    // When: Installing the metrics recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should succeed
    assert!(
        result.is_ok(),
        "install_metrics_recorder should succeed with valid config: {:?}",
        result.err()
    );

    // And: A second install in the same process is rejected
    let second = MetricsConfig {
        port: 19101,
        ..config
    };
    assert!(metrics_server::install_metrics_recorder(&second).is_err());
}

#[test]
#[serial]
fn test_install_metrics_recorder_fails_with_invalid_address() {
    // Given: An invalid metrics configuration (invalid IP)
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "999.999.999.999".to_string(),
        port: 9100,
    };

    // When: Installing the metrics recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should fail before touching the global recorder
    let err = result.expect_err("install_metrics_recorder should fail with invalid address");
    assert!(err.to_string().contains("invalid metrics listen address"));
}
