//! Helpers shared by every gateway call site.

use std::future::Future;
use std::time::Duration;

use lookbook_core::gateway::GatewayError;
use rand::Rng;

/// Upper bound (inclusive) for generation seeds.
const MAX_SEED: u32 = 100_000_000;

/// Bound a gateway call by `limit`; expiry becomes [`GatewayError::Timeout`].
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| GatewayError::Timeout(limit))?
}

pub(crate) fn random_seed() -> u32 {
    rand::rng().random_range(0..=MAX_SEED)
}
