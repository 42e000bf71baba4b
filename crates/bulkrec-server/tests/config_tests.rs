//! Environment-driven pipeline configuration
//!
//! These tests mutate process environment, so they run serially.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serial_test::serial;
use std::env;
use std::time::Duration;

use bulkrec_server::ingest::{ApplyMode, PipelineConfig, StagingBackend};

const VARS: &[&str] = &[
    "INGEST_CHUNK_SIZE",
    "INGEST_ENCODINGS",
    "INGEST_STAGING_PREFIX",
    "INGEST_STAGING_BACKEND",
    "INGEST_APPLY_MODE",
    "INGEST_APPLY_URL",
    "INGEST_INTER_CHUNK_DELAY_MS",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_inline_memory_from_env() {
    clear_env();
    env::set_var("INGEST_CHUNK_SIZE", "250");
    env::set_var("INGEST_ENCODINGS", "utf-8, shift_jis");
    env::set_var("INGEST_STAGING_PREFIX", "/uploads/");
    env::set_var("INGEST_STAGING_BACKEND", "memory");
    env::set_var("INGEST_APPLY_MODE", "inline");
    env::set_var("INGEST_INTER_CHUNK_DELAY_MS", "0");

    let config = PipelineConfig::from_env().unwrap();

    assert_eq!(config.chunk_size, 250);
    assert_eq!(config.encodings, vec!["utf-8", "shift_jis"]);
    assert_eq!(config.staging_prefix, "uploads");
    assert_eq!(config.staging_backend, StagingBackend::Memory);
    assert_eq!(config.apply_mode, ApplyMode::Inline);
    assert_eq!(config.inter_chunk_delay(), Duration::ZERO);

    clear_env();
}

#[test]
#[serial]
fn test_unparseable_numbers_fall_back_to_defaults() {
    clear_env();
    env::set_var("INGEST_CHUNK_SIZE", "lots");
    env::set_var("INGEST_APPLY_MODE", "inline");

    let config = PipelineConfig::from_env().unwrap();
    assert_eq!(config.chunk_size, 8000);

    clear_env();
}

#[test]
#[serial]
fn test_remote_mode_without_url_is_rejected() {
    clear_env();
    env::set_var("INGEST_APPLY_MODE", "remote");

    let err = PipelineConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("INGEST_APPLY_URL"));

    env::set_var("INGEST_APPLY_URL", "http://apply.internal/api/v1/apply");
    assert!(PipelineConfig::from_env().is_ok());

    clear_env();
}

#[test]
#[serial]
fn test_zero_chunk_size_is_rejected() {
    clear_env();
    env::set_var("INGEST_CHUNK_SIZE", "0");
    env::set_var("INGEST_APPLY_MODE", "inline");

    assert!(PipelineConfig::from_env().is_err());

    clear_env();
}

#[test]
#[serial]
fn test_unknown_backend_is_rejected() {
    clear_env();
    env::set_var("INGEST_STAGING_BACKEND", "ftp");
    env::set_var("INGEST_APPLY_MODE", "inline");

    assert!(PipelineConfig::from_env().is_err());

    clear_env();
}
