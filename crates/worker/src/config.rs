use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use lookbook_core::error::CoreError;
use lookbook_gateway::GatewayConfig;
use lookbook_pipeline::config::{DEFAULT_GATEWAY_TIMEOUT, DEFAULT_MAX_CONCURRENCY};
use lookbook_pipeline::PipelineConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Pipeline(#[from] CoreError),
}

/// Where blobs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobBackend {
    S3 { bucket: String },
    Local { root: PathBuf },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                value: s.to_owned(),
                reason: "expected 'text' or 'json'".into(),
            }),
        }
    }
}

/// Worker configuration loaded from environment variables.
///
/// | Env Var                  | Default                   |
/// |--------------------------|---------------------------|
/// | `DATABASE_URL`           | required                  |
/// | `BLOB_BACKEND`           | `s3`                      |
/// | `IMAGE_BUCKET`           | required for `s3`         |
/// | `LOCAL_BLOB_ROOT`        | `./data`                  |
/// | `GATEWAY_URL`            | required                  |
/// | `GATEWAY_API_KEY`        | none                      |
/// | `IMAGE_MODEL_ID`         | `amazon.nova-canvas-v1:0` |
/// | `TEXT_MODEL_ID`          | `amazon.nova-pro-v1:0`    |
/// | `CLASSIFIER_MODEL_ID`    | `amazon.nova-pro-v1:0`    |
/// | `TRY_ON_MAX_CONCURRENCY` | `10`                      |
/// | `GATEWAY_TIMEOUT_SECS`   | `120`                     |
/// | `TEMPLATE_DIR`           | `./templates`             |
/// | `LOG_FORMAT`             | `text` (read in `main`)   |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub blobs: BlobBackend,
    pub gateway: GatewayConfig,
    pub pipeline: PipelineConfig,
    pub template_dir: PathBuf,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let database_url = required("DATABASE_URL")?;

        let backend = var("BLOB_BACKEND").unwrap_or_else(|| "s3".into());
        let blobs = match backend.to_ascii_lowercase().as_str() {
            "s3" => BlobBackend::S3 {
                bucket: required("IMAGE_BUCKET")?,
            },
            "local" => BlobBackend::Local {
                root: var("LOCAL_BLOB_ROOT")
                    .unwrap_or_else(|| "./data".into())
                    .into(),
            },
            _ => {
                return Err(ConfigError::Invalid {
                    name: "BLOB_BACKEND",
                    value: backend,
                    reason: "expected 's3' or 'local'".into(),
                })
            }
        };

        let timeout_secs = match var("GATEWAY_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u64>("GATEWAY_TIMEOUT_SECS", raw)?,
            None => DEFAULT_GATEWAY_TIMEOUT.as_secs(),
        };
        let timeout = Duration::from_secs(timeout_secs);

        let max_concurrency = match var("TRY_ON_MAX_CONCURRENCY") {
            Some(raw) => parse_number::<usize>("TRY_ON_MAX_CONCURRENCY", raw)?,
            None => DEFAULT_MAX_CONCURRENCY,
        };
        let pipeline = PipelineConfig::new(max_concurrency, timeout)?;

        let mut gateway = GatewayConfig::new(required("GATEWAY_URL")?);
        gateway.api_key = var("GATEWAY_API_KEY");
        if let Some(id) = var("IMAGE_MODEL_ID") {
            gateway.image_model_id = id;
        }
        if let Some(id) = var("TEXT_MODEL_ID") {
            gateway.text_model_id = id;
        }
        if let Some(id) = var("CLASSIFIER_MODEL_ID") {
            gateway.classifier_model_id = id;
        }
        // HTTP client timeout must exceed the per-call bound.
        gateway.request_timeout = timeout + Duration::from_secs(5);

        let template_dir = var("TEMPLATE_DIR")
            .unwrap_or_else(|| "./templates".into())
            .into();

        Ok(Self {
            database_url,
            blobs,
            gateway,
            pipeline,
            template_dir,
        })
    }
}

fn parse_number<T>(name: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value: raw,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/lookbook"),
        ("GATEWAY_URL", "http://runtime:8080"),
        ("IMAGE_BUCKET", "catalog-images"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(BASE).unwrap();
        assert_eq!(
            config.blobs,
            BlobBackend::S3 {
                bucket: "catalog-images".into()
            }
        );
        assert_eq!(config.pipeline.max_concurrency, 10);
        assert_eq!(config.pipeline.gateway_timeout, Duration::from_secs(120));
        assert_eq!(config.gateway.image_model_id, "amazon.nova-canvas-v1:0");
        assert_eq!(config.gateway.api_key, None);
        assert_eq!(config.template_dir, PathBuf::from("./templates"));
    }

    #[test]
    fn local_backend_does_not_need_a_bucket() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/lookbook"),
            ("GATEWAY_URL", "http://runtime:8080"),
            ("BLOB_BACKEND", "local"),
            ("LOCAL_BLOB_ROOT", "/var/lib/lookbook"),
        ])
        .unwrap();
        assert_eq!(
            config.blobs,
            BlobBackend::Local {
                root: PathBuf::from("/var/lib/lookbook")
            }
        );
    }

    #[test]
    fn missing_required_vars_are_reported() {
        assert_matches!(
            load(&[("GATEWAY_URL", "http://x")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
        assert_matches!(
            load(&[
                ("DATABASE_URL", "postgres://x"),
                ("GATEWAY_URL", "http://x"),
            ]),
            Err(ConfigError::Missing("IMAGE_BUCKET"))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("TRY_ON_MAX_CONCURRENCY", "3"),
            ("GATEWAY_TIMEOUT_SECS", "30"),
            ("TEXT_MODEL_ID", "writer"),
            ("GATEWAY_API_KEY", "secret"),
        ]);
        let config = load(&pairs).unwrap();
        assert_eq!(config.pipeline.max_concurrency, 3);
        assert_eq!(config.pipeline.gateway_timeout, Duration::from_secs(30));
        assert_eq!(config.gateway.text_model_id, "writer");
        assert_eq!(config.gateway.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut zero = BASE.to_vec();
        zero.push(("TRY_ON_MAX_CONCURRENCY", "0"));
        assert_matches!(load(&zero), Err(ConfigError::Pipeline(_)));

        let mut garbage = BASE.to_vec();
        garbage.push(("GATEWAY_TIMEOUT_SECS", "soon"));
        assert_matches!(
            load(&garbage),
            Err(ConfigError::Invalid {
                name: "GATEWAY_TIMEOUT_SECS",
                ..
            })
        );

        let mut backend = BASE.to_vec();
        backend.push(("BLOB_BACKEND", "ftp"));
        assert_matches!(load(&backend), Err(ConfigError::Invalid { .. }));
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
