//! File output goes through the global subscriber, so this binary
//! installs it exactly once.

use daedalus_telemetry::{
    init_logging, FileOutputConfig, LogLevel, LogOutput, LoggerConfig, RotatePolicy,
    TelemetryError,
};

#[test]
fn test_file_output_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("service.log");

    let config = LoggerConfig {
        level: LogLevel::Warn,
        outputs: vec![LogOutput::File],
        file_output: Some(FileOutputConfig {
            path: path.display().to_string(),
            rotate_policy: RotatePolicy::None,
            ..FileOutputConfig::default()
        }),
        ..LoggerConfig::default()
    };
    std::env::remove_var("RUST_LOG");
    init_logging(&config).unwrap();

    tracing::info!("filtered out");
    tracing::warn!(route = "/orders/:id", "breaker opened");

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let event: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(event["level"], "WARN");
    assert_eq!(event["fields"]["message"], "breaker opened");
    assert_eq!(event["fields"]["route"], "/orders/:id");

    let second = init_logging(&LoggerConfig::default());
    assert!(matches!(second, Err(TelemetryError::LoggingInit(_))));
}
