//! Notification dispatch.
//!
//! Delivery is a contentless POST to the configured endpoint; composing the
//! notification body belongs to the receiving side. Recovery for anything
//! left Waiting is the next successful response retriggering dispatch.

use gantry_core::{NotifStatus, Result};
use gantry_store::{Op, Store};
use tracing::{info, warn};

use crate::AppState;

/// Walk Waiting notifications and attempt delivery, marking each Sent or
/// Failed. Returns how many were delivered.
pub async fn dispatch_waiting(state: &AppState) -> Result<usize> {
    let waiting = state
        .store
        .waiting_notifications()
        .await
        .map_err(|e| gantry_core::Error::Internal(e.to_string()))?;

    let mut sent = 0;
    for not in waiting {
        let delivered = if not.config.endpoint.is_empty() {
            warn!(notification = %not.id, "no endpoint configured");
            false
        } else {
            match state.http.post(&not.config.endpoint).send().await {
                Ok(resp) if resp.status().is_success() => true,
                Ok(resp) => {
                    warn!(notification = %not.id, status = %resp.status(), "notification endpoint refused");
                    false
                }
                Err(e) => {
                    warn!(notification = %not.id, error = %e, "notification delivery failed");
                    false
                }
            }
        };

        let status = if delivered {
            sent += 1;
            NotifStatus::Sent
        } else {
            NotifStatus::Failed
        };

        // A lost status update is harmless; the record stays Waiting for a
        // later pass.
        if let Err(e) = state
            .store
            .run(vec![Op::SetNotificationStatus { id: not.id, status }])
            .await
        {
            warn!(notification = %not.id, error = %e, "could not update notification status");
        }
    }

    info!(sent, "notification dispatch pass done");
    Ok(sent)
}
