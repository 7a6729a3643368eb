//! The dispatcher loop.
//!
//! Polls the tracker for lease grants and pushes each leased attempt onto
//! its builder's queue over RPC. A grant that cannot be delivered after a
//! few tries is committed as dispatch-abandoned so the item completes with
//! a failed result instead of hanging.

use std::time::Duration;

use gantry_rpc::Client;
use gantry_rpc::wire::{DispatchResponse, LeaseGrant};
use tracing::{info, warn};

use crate::services::{ResponseService, TrackerService};

pub struct Dispatcher {
    tracker: TrackerService,
    response: ResponseService,
    interval: Duration,
    retries: u32,
}

impl Dispatcher {
    pub fn new(
        tracker: TrackerService,
        response: ResponseService,
        interval: Duration,
        retries: u32,
    ) -> Self {
        Self {
            tracker,
            response,
            interval,
            retries,
        }
    }

    /// Run forever, draining available grants each tick.
    pub async fn run(self) {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tick.tick().await;
            loop {
                match self.tracker.lease_pair().await {
                    Ok(Some(grant)) => self.dispatch(grant).await,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "lease poll failed");
                        break;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, grant: LeaseGrant) {
        let url = format!("{}/rpc/queue", grant.builder.url.trim_end_matches('/'));
        let client = Client::new(url);

        for attempt in 1..=self.retries {
            match client.call::<_, ()>("Queue.Push", &grant.work).await {
                Ok(()) => {
                    info!(work = %grant.work.work_id, builder = %grant.builder.id, "dispatched");
                    return;
                }
                Err(e) => {
                    warn!(work = %grant.work.work_id, try_number = attempt, error = %e, "push failed");
                }
            }
        }

        let abandoned = DispatchResponse {
            key: grant.work.work_id,
            work_rev: grant.work.work_rev,
            error: format!("dispatch gave up after {} tries", self.retries),
        };
        if let Err(e) = self.response.dispatch_error(abandoned).await {
            warn!(work = %grant.work.work_id, error = %e, "could not record dispatch error");
        }
    }
}
