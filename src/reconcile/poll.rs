//! Bounded polling for asynchronous filesystem state changes

use crate::client::PollPolicy;
use crate::domain::model::{Filesystem, VOLUME_NOT_AVAILABLE};
use crate::domain::ports::StorageApi;
use crate::error::{Error, Result};
use crate::lookup;
use tracing::{debug, warn};

/// How a wait ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    /// The required status was observed
    Reached(Filesystem),
    /// The backing storage became unavailable; waiting stopped early
    Unavailable(Filesystem),
}

/// Fetch the filesystem until it reports `required_status`.
///
/// Sleeps `policy.interval` before each fetch. Stops early on
/// [`VOLUME_NOT_AVAILABLE`]; fails with [`Error::Timeout`] after
/// `policy.max_attempts` fetches without either.
pub async fn wait_for_filesystem_status(
    api: &dyn StorageApi,
    filesystem_id: &str,
    required_status: &str,
    policy: &PollPolicy,
) -> Result<PollResult> {
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        let fs = lookup::filesystem(api, filesystem_id).await?;
        debug!(
            "Filesystem {} status {} (attempt {}/{}, want {})",
            filesystem_id, fs.status, attempt, policy.max_attempts, required_status
        );

        if fs.status == required_status {
            return Ok(PollResult::Reached(fs));
        }
        if fs.status == VOLUME_NOT_AVAILABLE {
            warn!(
                "Filesystem {} reports {} while waiting for {}",
                filesystem_id, VOLUME_NOT_AVAILABLE, required_status
            );
            return Ok(PollResult::Unavailable(fs));
        }
    }

    Err(Error::Timeout {
        resource_id: filesystem_id.to_string(),
        required_status: required_status.to_string(),
        attempts: policy.max_attempts,
    })
}
