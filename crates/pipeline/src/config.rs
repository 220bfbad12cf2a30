//! Tunables for the try-on and attribution stages.

use std::time::Duration;

use lookbook_core::error::CoreError;

/// Default ceiling on concurrently running try-on tasks.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default bound on a single gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(120);

/// Generation geometry used when the cloth image header cannot be read.
pub const FALLBACK_DIMENSIONS: (u32, u32) = (1024, 1024);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on parallel try-on tasks, whatever the batch size.
    pub max_concurrency: usize,
    /// Per-call gateway timeout. Expiry fails only the call it bounds.
    pub gateway_timeout: Duration,
    /// `(width, height)` for generated model images when the cloth image
    /// dimensions are unknown.
    pub fallback_dimensions: (u32, u32),
}

impl PipelineConfig {
    pub fn new(max_concurrency: usize, gateway_timeout: Duration) -> Result<Self, CoreError> {
        let config = Self {
            max_concurrency,
            gateway_timeout,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrency == 0 {
            return Err(CoreError::Validation(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.gateway_timeout.is_zero() {
            return Err(CoreError::Validation(
                "gateway_timeout must be greater than zero".into(),
            ));
        }
        let (width, height) = self.fallback_dimensions;
        if width == 0 || height == 0 {
            return Err(CoreError::Validation(
                "fallback dimensions must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            fallback_dimensions: FALLBACK_DIMENSIONS,
        }
    }
}
