//! Worker configuration, loaded from environment variables.

use std::time::Duration;

use tracing::info;

use crate::workers::ConsumerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Everything the worker process needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    // Database
    pub database_url: String,

    // Queues
    pub redis_url: String,
    pub upload_queue: String,
    pub conversion_output_queue: String,
    pub conversion_job_queue: String,
    /// Consumer name inside the stream consumer group; keep it stable across
    /// restarts.
    pub consumer_name: String,
    pub queue_max_messages: usize,
    pub queue_wait: Duration,
    pub queue_retry_delay: Duration,

    // Object storage
    pub storage_bucket: String,
    pub storage_region: String,

    // Mail
    pub sendgrid_api_key: String,
    pub sendgrid_template_id: String,
}

impl WorkerConfig {
    /// Read the process environment, after loading `.env` unless
    /// `APP_ENV=production`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if std::env::var("APP_ENV").as_deref() != Ok("production") {
            dotenvy::dotenv().ok();
        }
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.log_summary();
        Ok(config)
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                None => Ok(default),
                Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
            }
        };

        let queue_max_messages = number("QUEUE_MAX_MESSAGES", 5)?;
        if queue_max_messages == 0 {
            return Err(ConfigError::Invalid {
                name: "QUEUE_MAX_MESSAGES",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            upload_queue: required("UPLOAD_QUEUE")?,
            conversion_output_queue: required("CONVERSION_OUTPUT_QUEUE")?,
            conversion_job_queue: required("CONVERSION_JOB_QUEUE")?,
            consumer_name: lookup("CONSUMER_NAME")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "frameshot-worker".to_string()),
            queue_max_messages: usize::try_from(queue_max_messages).unwrap_or(usize::MAX),
            queue_wait: Duration::from_secs(number("QUEUE_WAIT_SECS", 5)?),
            queue_retry_delay: Duration::from_secs(number("QUEUE_RETRY_SECS", 5)?),
            storage_bucket: required("STORAGE_BUCKET")?,
            storage_region: required("STORAGE_REGION")?,
            sendgrid_api_key: required("SENDGRID_API_KEY")?,
            sendgrid_template_id: required("SENDGRID_TEMPLATE_ID")?,
        })
    }

    /// Consumer settings for the queue called `name`.
    pub fn consumer_config(&self, name: &str) -> ConsumerConfig {
        ConsumerConfig::default()
            .with_name(name)
            .with_max_messages(self.queue_max_messages)
            .with_wait_time(self.queue_wait)
            .with_retry_delay(self.queue_retry_delay)
    }

    fn log_summary(&self) {
        info!(
            upload_queue = %self.upload_queue,
            conversion_output_queue = %self.conversion_output_queue,
            conversion_job_queue = %self.conversion_job_queue,
            consumer = %self.consumer_name,
            bucket = %self.storage_bucket,
            region = %self.storage_region,
            sendgrid_api_key = %preview(&self.sendgrid_api_key),
            "config loaded"
        );
    }
}

fn preview(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    format!("{shown}...({} chars)", secret.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, String> {
        [
            ("DATABASE_URL", "postgres://localhost/frameshot"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("UPLOAD_QUEUE", "frameshot:uploads"),
            ("CONVERSION_OUTPUT_QUEUE", "frameshot:conversion-output"),
            ("CONVERSION_JOB_QUEUE", "frameshot:conversion-jobs"),
            ("STORAGE_BUCKET", "frameshot"),
            ("STORAGE_REGION", "us-east-1"),
            ("SENDGRID_API_KEY", "SG.secret"),
            ("SENDGRID_TEMPLATE_ID", "d-123"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<WorkerConfig, ConfigError> {
        WorkerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_to_optional_settings() {
        let config = load(&base()).unwrap();
        assert_eq!(config.queue_max_messages, 5);
        assert_eq!(config.queue_wait, Duration::from_secs(5));
        assert_eq!(config.queue_retry_delay, Duration::from_secs(5));
        assert_eq!(config.consumer_name, "frameshot-worker");
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = base();
        vars.insert("QUEUE_MAX_MESSAGES", "10".into());
        vars.insert("QUEUE_WAIT_SECS", "20".into());
        vars.insert("QUEUE_RETRY_SECS", " 1 ".into());
        vars.insert("CONSUMER_NAME", "worker-a".into());

        let config = load(&vars).unwrap();
        let consumer = config.consumer_config("uploads");

        assert_eq!(consumer.name, "uploads");
        assert_eq!(consumer.max_messages, 10);
        assert_eq!(consumer.wait_time, Duration::from_secs(20));
        assert_eq!(consumer.retry_delay, Duration::from_secs(1));
        assert_eq!(config.consumer_name, "worker-a");
    }

    #[test]
    fn missing_or_blank_required_variable() {
        let mut vars = base();
        vars.remove("DATABASE_URL");
        assert_eq!(load(&vars), Err(ConfigError::Missing("DATABASE_URL")));

        let mut vars = base();
        vars.insert("SENDGRID_API_KEY", "  ".into());
        assert_eq!(load(&vars), Err(ConfigError::Missing("SENDGRID_API_KEY")));
    }

    #[test]
    fn unparsable_numbers_are_invalid() {
        let mut vars = base();
        vars.insert("QUEUE_WAIT_SECS", "five".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "QUEUE_WAIT_SECS", .. })
        ));

        let mut vars = base();
        vars.insert("QUEUE_MAX_MESSAGES", "0".into());
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn secret_preview_hides_the_value() {
        assert_eq!(preview("SG.abcdef"), "SG.a...(9 chars)");
    }
}
