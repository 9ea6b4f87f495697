// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! File plus environment layering

use fleet_vision_capture::config::{CaptureConfig, ConfigError};
use fleet_vision_capture::recognition::RecognitionClient;
use fleet_vision_capture::vision::OutputFormat;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_file_round_trips_into_components() {
    let file = config_file(
        r#"
retry_on_validation_failure = true

[normalize]
max_width = 1280
max_height = 960
quality = 0.7
format = "png"
auto_rotate = false

[recognition]
endpoint = "https://ocr.fleet.example"
timeout_ms = 4000

[recognition.retry]
max_retries = 5
initial_delay_ms = 100

[recognition.mock]
enabled = true
delay_ms = 0
confidences = [0.45, 0.91]

[gate]
threshold = 0.85
max_retries = 4

[batch]
max_pages = 8
parallelism = 2
"#,
    );

    let config = CaptureConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.normalize.max_width, 1280);
    assert_eq!(config.normalize.format, OutputFormat::Png);
    assert!(!config.normalize.auto_rotate);
    assert_eq!(config.recognition.timeout_ms, 4000);
    assert_eq!(config.recognition.retry.max_retries, 5);
    assert_eq!(config.recognition.retry.max_delay_ms, 8_000);
    assert_eq!(config.gate.max_retries, 4);
    assert_eq!(config.batch.max_pages, 8);
    assert!(config.retry_on_validation_failure);

    let client = RecognitionClient::from_config(&config.recognition).unwrap();
    assert_eq!(client.transport_name(), "mock");
    assert_eq!(client.retry_policy().initial_delay_ms, 100);
}

#[test]
fn test_load_without_file_uses_defaults() {
    let config = CaptureConfig::load(None).unwrap();
    assert_eq!(config.batch.max_pages, 20);
    assert_eq!(config.gate.max_retries, 3);
}

#[test]
fn test_load_rejects_invalid_values() {
    let file = config_file("[gate]\nthreshold = 2.0\n");
    let err = CaptureConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { section: "gate", .. }));
    assert!(err.to_string().contains("gate"));

    let file = config_file("[batch]\nparallelism = 0\n");
    assert!(matches!(
        CaptureConfig::load(Some(file.path())),
        Err(ConfigError::Invalid { section: "batch", .. })
    ));
}

#[test]
fn test_unknown_format_is_a_parse_error() {
    let file = config_file("[normalize]\nformat = \"tiff\"\n");
    let err = CaptureConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn test_overrides_win_over_file() {
    let file = config_file("[gate]\nthreshold = 0.8\n[recognition]\ntimeout_ms = 1000\n");
    let mut config = CaptureConfig::from_file(file.path()).unwrap();
    config
        .apply_overrides(|var| match var {
            "CAPTURE_CONFIDENCE_THRESHOLD" => Some("0.93".to_string()),
            "CAPTURE_RETRY_ON_VALIDATION_FAILURE" => Some("true".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.gate.threshold, 0.93);
    assert_eq!(config.recognition.timeout_ms, 1000);
    assert!(config.retry_on_validation_failure);
    assert!(config.validate().is_ok());
}
