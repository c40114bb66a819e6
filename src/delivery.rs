//! Final hand-off of artifacts to the transport.

use std::fmt;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::artifact::Artifact;
use crate::session::RequesterId;
use crate::transport::{DeliveryAck, Transport, TransportError};

/// Delivers finished artifacts and always releases their storage afterwards.
#[derive(Clone)]
pub struct DeliveryGate {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for DeliveryGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryGate").finish_non_exhaustive()
    }
}

impl DeliveryGate {
    /// Creates a gate that delivers through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Sends `artifact` to the requester, then releases it.
    ///
    /// Release happens whether or not the transport accepted the file; a
    /// failed release is logged, never returned.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when delivery fails.
    #[instrument(skip(self, artifact), fields(requester = %requester, size_bytes = artifact.size_bytes()))]
    pub async fn deliver(
        &self,
        requester: &RequesterId,
        artifact: Artifact,
    ) -> Result<DeliveryAck, TransportError> {
        let result = self.transport.deliver_artifact(requester, &artifact).await;

        match &result {
            Ok(ack) => info!(reference = %ack.reference, "artifact accepted by transport"),
            Err(e) => warn!(error = %e, "transport rejected artifact"),
        }

        let path = artifact.path().to_path_buf();
        if let Err(e) = artifact.release().await {
            warn!(path = %path.display(), error = %e, "failed to release delivered artifact");
        }

        result
    }
}
