//! Untyped option settings
//!
//! Options loaded from a configuration file arrive as YAML/JSON values. Each
//! one is checked against the shape its option expects; a mismatch (say, a
//! number for `bucket`) fails construction before any file is processed.

use super::{OptionValue, StorageOptions};
use crate::config::{ConfigError, StorageSettings};
use crate::detect::ContentTypeResolver;
use crate::s3::Metadata;
use serde_json::Value;

/// Literal types an option setting can hold.
pub trait FromSetting: Sized {
    /// Human readable shape, used in error messages.
    const EXPECTED: &'static str;

    fn from_setting(value: &Value) -> Option<Self>;
}

impl FromSetting for String {
    const EXPECTED: &'static str = "string";

    fn from_setting(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl FromSetting for Option<String> {
    const EXPECTED: &'static str = "string";

    fn from_setting(value: &Value) -> Option<Self> {
        value.as_str().map(|s| Some(s.to_owned()))
    }
}

impl FromSetting for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_setting(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSetting for Metadata {
    const EXPECTED: &'static str = "map of strings";

    fn from_setting(value: &Value) -> Option<Self> {
        value
            .as_object()?
            .iter()
            .map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
            .collect()
    }
}

/// Name of a value's JSON shape.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl<T: FromSetting> OptionValue<T> {
    /// Validate one untyped setting. `null` leaves the option unset.
    pub fn from_setting(name: &'static str, value: &Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(Self::Unset);
        }

        T::from_setting(value)
            .map(Self::Literal)
            .ok_or_else(|| ConfigError::InvalidOption {
                name,
                expected: T::EXPECTED,
                found: kind_of(value),
            })
    }
}

impl StorageOptions {
    /// Build options from untyped settings.
    ///
    /// `content_type: auto` selects content sniffing; any other string is a
    /// fixed content type.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, ConfigError> {
        let content_type = match &settings.content_type {
            Value::Null => None,
            Value::String(s) if s == "auto" => Some(ContentTypeResolver::auto()),
            Value::String(s) => Some(ContentTypeResolver::from(s.as_str())),
            other => {
                return Err(ConfigError::InvalidOption {
                    name: "content_type",
                    expected: "string",
                    found: kind_of(other),
                })
            }
        };

        Ok(Self {
            bucket: OptionValue::from_setting("bucket", &settings.bucket)?,
            key: OptionValue::from_setting("key", &settings.key)?,
            acl: OptionValue::from_setting("acl", &settings.acl)?,
            content_type,
            metadata: OptionValue::from_setting("metadata", &settings.metadata)?,
            cache_control: OptionValue::from_setting("cache_control", &settings.cache_control)?,
            should_transform: OptionValue::from_setting(
                "should_transform",
                &settings.should_transform,
            )?,
            transforms: Vec::new(),
            content_disposition: OptionValue::from_setting(
                "content_disposition",
                &settings.content_disposition,
            )?,
            content_encoding: OptionValue::from_setting(
                "content_encoding",
                &settings.content_encoding,
            )?,
            storage_class: OptionValue::from_setting("storage_class", &settings.storage_class)?,
            server_side_encryption: OptionValue::from_setting(
                "server_side_encryption",
                &settings.server_side_encryption,
            )?,
            sse_kms_key_id: OptionValue::from_setting("sse_kms_key_id", &settings.sse_kms_key_id)?,
        })
    }
}
