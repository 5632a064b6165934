use crate::api::DeviceApi;
use crate::error::ApiError;
use crate::models::{DeviceId, SpeedTestResult};
use crate::store::{DeviceStore, Notice};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// User-triggered operations on a single device. Each one runs in the
/// background and reports back through a store notice.
#[derive(Clone)]
pub struct DeviceActions<A> {
    api: A,
    store: DeviceStore,
}

impl<A> DeviceActions<A>
where
    A: DeviceApi + Clone + Send + Sync + 'static,
{
    pub fn new(api: A, store: DeviceStore) -> Self {
        Self { api, store }
    }

    /// Returns `None` when another action is still running.
    pub fn run_speed_test(&self, device_id: DeviceId) -> Option<JoinHandle<()>> {
        if !self.store.try_begin_action() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            let result = this.api.run_speed_test(device_id).await;
            this.store.push_notice(speed_test_notice(device_id, result));
            this.store.end_action();
        }))
    }

    /// The local list only changes once the server confirms the delete and
    /// the follow-up refresh lands.
    pub fn delete_device(&self, device_id: DeviceId) -> Option<JoinHandle<()>> {
        if !self.store.try_begin_action() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            match this.api.delete_device(device_id).await {
                Ok(()) => {
                    info!(device_id, "device deleted");
                    this.store.request_refresh();
                }
                Err(e) => {
                    error!(device_id, "Failed to delete device: {}", e);
                    this.store
                        .push_notice(Notice::error("Delete failed", "Failed to delete device"));
                }
            }
            this.store.end_action();
        }))
    }
}

fn speed_test_notice(device_id: DeviceId, result: Result<SpeedTestResult, ApiError>) -> Notice {
    match result {
        Ok(SpeedTestResult { download, upload }) => {
            info!(device_id, download, upload, "speed test finished");
            Notice::info(
                "Speed test results",
                format!("Download: {download:.2} Mbps\nUpload: {upload:.2} Mbps"),
            )
        }
        Err(ApiError::Application(reason)) => {
            error!(device_id, "Speed test failed: {}", reason);
            Notice::error("Speed test failed", format!("Speed test failed: {reason}"))
        }
        Err(e) => {
            error!(device_id, "Failed to run speed test: {}", e);
            Notice::error("Speed test failed", "Failed to run speed test")
        }
    }
}
