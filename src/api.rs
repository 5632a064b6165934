use crate::config::ApiConfig;
use crate::error::{body_preview, ApiError, NetworkError};
use crate::models::{Device, DeviceId, MetricSample, SpeedTestResult, Timeframe};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

/// Operations the dashboard needs from the monitoring API.
pub trait DeviceApi {
    fn list_devices(&self) -> impl Future<Output = Result<Vec<Device>, ApiError>> + Send;
    fn get_metrics(
        &self,
        device_id: DeviceId,
        timeframe: Timeframe,
    ) -> impl Future<Output = Result<Vec<MetricSample>, ApiError>> + Send;
    fn run_speed_test(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<SpeedTestResult, ApiError>> + Send;
    fn delete_device(&self, device_id: DeviceId)
        -> impl Future<Output = Result<(), ApiError>> + Send;
}

// Implement DeviceApi for Arc<T> where T: DeviceApi
impl<T> DeviceApi for Arc<T>
where
    T: DeviceApi + Send + Sync,
{
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        self.as_ref().list_devices().await
    }

    async fn get_metrics(
        &self,
        device_id: DeviceId,
        timeframe: Timeframe,
    ) -> Result<Vec<MetricSample>, ApiError> {
        self.as_ref().get_metrics(device_id, timeframe).await
    }

    async fn run_speed_test(&self, device_id: DeviceId) -> Result<SpeedTestResult, ApiError> {
        self.as_ref().run_speed_test(device_id).await
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<(), ApiError> {
        self.as_ref().delete_device(device_id).await
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NetworkError::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(StatusCode, String), NetworkError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let contents = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(%status, bytes = contents.len(), "api response");
        Ok((status, contents))
    }

    fn transport_error(&self, err: reqwest::Error) -> NetworkError {
        if err.is_timeout() {
            NetworkError::Timeout(self.timeout)
        } else {
            NetworkError::Transport(err)
        }
    }

    fn ensure_success(status: StatusCode, contents: &str) -> Result<(), NetworkError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(NetworkError::Status {
                status,
                body_preview: body_preview(contents),
            })
        }
    }

    fn decode<T: DeserializeOwned>(contents: &str) -> Result<T, NetworkError> {
        serde_json::from_str(contents).map_err(|source| NetworkError::Decode {
            source,
            body_preview: body_preview(contents),
        })
    }
}

impl DeviceApi for ApiClient {
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        let request = self.client.get(self.url("/api/devices"));
        let (status, contents) = self.execute(request).await?;
        Self::ensure_success(status, &contents)?;
        Ok(Self::decode(&contents)?)
    }

    async fn get_metrics(
        &self,
        device_id: DeviceId,
        timeframe: Timeframe,
    ) -> Result<Vec<MetricSample>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/api/devices/{device_id}/metrics")))
            .query(&[("timeframe", timeframe.as_query())]);
        let (status, contents) = self.execute(request).await?;
        Self::ensure_success(status, &contents)?;
        MetricSample::list_from_json(&contents).map_err(|source| {
            ApiError::Network(NetworkError::Decode {
                source,
                body_preview: body_preview(&contents),
            })
        })
    }

    async fn run_speed_test(&self, device_id: DeviceId) -> Result<SpeedTestResult, ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/api/devices/{device_id}/speedtest")));
        let (status, contents) = self.execute(request).await?;

        // A failed test is reported as {"error": ...}, usually with a 500.
        if let Ok(payload) = serde_json::from_str::<ErrorPayload>(&contents) {
            return Err(ApiError::Application(payload.error));
        }
        Self::ensure_success(status, &contents)?;
        Ok(Self::decode(&contents)?)
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&format!("/api/devices/{device_id}")));
        let (status, contents) = self.execute(request).await?;
        Self::ensure_success(status, &contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.base_url(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn lists_devices() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/api/devices");
            then.status(200).json_body(json!([
                {
                    "id": 1,
                    "hostname": "lab-a",
                    "username": "ana",
                    "location": "Lab A",
                    "status": "online",
                    "connection_type": "WiFi",
                    "wifi_ssid": "CorpNet",
                    "signal_strength": "-45 dBm",
                    "last_seen": "2024-03-07T14:05:09+08:00"
                },
                {
                    "id": 2,
                    "hostname": "office-b",
                    "username": "ben",
                    "location": "Office",
                    "status": "offline",
                    "connection_type": "Ethernet",
                    "wifi_ssid": null,
                    "signal_strength": null,
                    "last_seen": "2024-03-07T13:00:00+08:00"
                }
            ]));
        });

        let devices = test_client(&server).list_devices().await.unwrap();

        m.assert();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].signal_strength, Some(-45.0));
        assert_eq!(devices[1].wifi_ssid, None);
    }

    #[tokio::test]
    async fn metrics_send_timeframe_query() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/api/devices/3/metrics")
                .query_param("timeframe", "day");
            then.status(200).json_body(json!([
                {"timestamp": "2024-03-07T10:30:00+08:00", "download_speed": 40.0, "latency": 31.0},
                {"timestamp": "2024-03-07T10:00:00+08:00", "download_speed": 55.0, "latency": 22.0}
            ]));
        });

        let samples = test_client(&server)
            .get_metrics(3, Timeframe::Day)
            .await
            .unwrap();

        m.assert();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].download_speed, Some(55.0));
    }

    #[tokio::test]
    async fn non_2xx_is_a_network_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/devices");
            then.status(503).body("maintenance");
        });

        match test_client(&server).list_devices().await {
            Err(ApiError::Network(NetworkError::Status {
                status,
                body_preview,
            })) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body_preview, "maintenance");
            }
            other => panic!("Expected Status error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/devices");
            then.status(200).body("<html>oops</html>");
        });

        let err = test_client(&server).list_devices().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(NetworkError::Decode { .. })));
    }

    #[tokio::test]
    async fn speed_test_success() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/api/devices/9/speedtest");
            then.status(200)
                .json_body(json!({"download": 94.2, "upload": 18.7}));
        });

        let result = test_client(&server).run_speed_test(9).await.unwrap();

        m.assert();
        assert_eq!(
            result,
            SpeedTestResult {
                download: 94.2,
                upload: 18.7
            }
        );
    }

    #[tokio::test]
    async fn speed_test_error_payload_is_application_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/api/devices/9/speedtest");
            then.status(500)
                .json_body(json!({"error": "No speedtest server reachable"}));
        });

        match test_client(&server).run_speed_test(9).await {
            Err(ApiError::Application(message)) => {
                assert_eq!(message, "No speedtest server reachable")
            }
            other => panic!("Expected Application error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_succeeds_on_2xx_and_fails_on_404() {
        let server = MockServer::start();
        let ok = server.mock(|when, then| {
            when.method(DELETE).path("/api/devices/4");
            then.status(200)
                .json_body(json!({"message": "Device deleted successfully"}));
        });
        let missing = server.mock(|when, then| {
            when.method(DELETE).path("/api/devices/5");
            then.status(404).json_body(json!({"error": "Device not found"}));
        });

        let client = test_client(&server);
        client.delete_device(4).await.unwrap();
        let err = client.delete_device(5).await.unwrap_err();

        ok.assert();
        missing.assert();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/devices");
            then.status(200)
                .delay(Duration::from_millis(800))
                .json_body(json!([]));
        });

        let client = ApiClient::new(&server.base_url(), Duration::from_millis(100)).unwrap();
        match client.list_devices().await {
            Err(ApiError::Network(NetworkError::Timeout(after))) => {
                assert_eq!(after, Duration::from_millis(100))
            }
            other => panic!("Expected Timeout error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:1/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:1");
        let err = client.list_devices().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(NetworkError::Transport(_))));
    }
}
