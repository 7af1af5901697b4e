//! Configuration Loading Tests
//!
//! YAML files with environment expansion, option shape validation, and the
//! path from a config file to a working storage engine.

mod common;

use common::{file, request, FakeStore};
use s3_multer::config::{Config, ConfigError, ConfigLoader};
use s3_multer::options::StorageConfig;
use s3_multer::storage::{S3Storage, StorageEngine};
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_with_env_expansion() {
    std::env::set_var("S3_MULTER_TEST_BUCKET", "env-bucket");
    std::env::remove_var("S3_MULTER_TEST_REGION");

    let file = write_config(
        r#"
s3:
  region: "${S3_MULTER_TEST_REGION:-eu-central-1}"
  endpoint: "http://localhost:9000"
  force_path_style: true
upload:
  part_size: 10485760
storage:
  bucket: "${S3_MULTER_TEST_BUCKET}"
  acl: public-read
  content_type: auto
  metadata:
    source: config-test
"#,
    );

    let config = Config::load(file.path()).unwrap();
    std::env::remove_var("S3_MULTER_TEST_BUCKET");

    assert_eq!(config.s3.region, "eu-central-1");
    assert!(config.s3.force_path_style);
    assert_eq!(config.upload.part_size, 10 * 1024 * 1024);
    assert_eq!(config.storage.bucket, serde_json::json!("env-bucket"));
    assert!(config.metrics.enabled);

    let client = config.s3_client_config();
    assert_eq!(client.region, "eu-central-1");
    assert_eq!(client.endpoint.as_deref(), Some("http://localhost:9000"));
}

#[test]
fn test_missing_file() {
    let result = Config::load("/nonexistent/s3-multer.yaml");
    assert!(matches!(result, Err(ConfigError::IoError(_))));
}

#[test]
fn test_malformed_yaml() {
    let result = ConfigLoader::from_str("storage: [unclosed");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_number_bucket_rejected_before_use() {
    let result = ConfigLoader::from_str("storage:\n  bucket: 42\n");
    assert!(matches!(
        result,
        Err(ConfigError::InvalidOption {
            name: "bucket",
            expected: "string",
            found: "number"
        })
    ));
}

#[test]
fn test_missing_bucket_rejected() {
    let result = ConfigLoader::from_str("s3:\n  region: us-west-2\n");
    assert!(matches!(result, Err(ConfigError::MissingOption("bucket"))));
}

#[test]
fn test_part_size_below_minimum_rejected() {
    let result = ConfigLoader::from_str("upload:\n  part_size: 1024\nstorage:\n  bucket: b\n");
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[tokio::test]
async fn test_config_drives_storage_engine() {
    let config = ConfigLoader::from_str(
        r#"
storage:
  bucket: configured
  key: fixed/key.svg
  storage_class: ONEZONE_IA
  content_type: auto
  cache_control: "no-cache"
"#,
    )
    .unwrap();

    let store = Arc::new(FakeStore::new());
    let storage = S3Storage::new(
        StorageConfig::new(config.storage_options().unwrap()).unwrap(),
        store.clone(),
    );

    let outcome = storage
        .handle_file(
            &request("/"),
            file(
                "icon",
                "icon.bin",
                "application/octet-stream",
                &[b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>"],
            ),
        )
        .await
        .unwrap();

    let object = &outcome.objects()[0];
    assert_eq!(object.bucket, "configured");
    assert_eq!(object.key, "fixed/key.svg");
    assert_eq!(object.storage_class, "ONEZONE_IA");
    assert_eq!(object.content_type, "image/svg+xml");
    assert_eq!(
        store.put("fixed/key.svg").unwrap().cache_control.as_deref(),
        Some("no-cache")
    );
}
