// Snapshot and health HTTP client
//
// Wraps `reqwest::Client` with backend URL construction and strict
// response handling: a snapshot either parses completely or fails as a
// unit — callers never see a partial sequence.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::reading::ReadingDto;
use crate::transport::TransportConfig;

/// HTTP client for the telemetry backend's request/response surface.
///
/// Two endpoints relative to the configured base URL: `latest` (full
/// snapshot of current readings) and `health` (coarse reachability
/// probe). The base URL carries any path prefix the deployment uses,
/// e.g. `https://host/api`.
pub struct TelemetryClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

impl TelemetryClient {
    /// Create a new client from a base URL and transport settings.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// The configured backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build a full URL for an endpoint under the base path.
    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut base = self.base_url.clone();
        // Url::join treats a non-slash-terminated path as a file and
        // would drop the last segment of the base.
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }
        Ok(base.join(path)?)
    }

    /// Fetch the full set of current device readings.
    ///
    /// One GET round trip. Succeeds only on a 2xx response whose body
    /// parses as a JSON array of readings; transport failure, a non-2xx
    /// status, or a parse failure all yield an error and no data.
    pub async fn fetch_latest(&self) -> Result<Vec<ReadingDto>, Error> {
        let url = self.endpoint("latest")?;
        debug!(%url, "GET latest snapshot");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Probe the backend health endpoint.
    ///
    /// Returns `Ok(true)` only for a 2xx response whose body is
    /// `{"status": "online"}`. Anything else is either `Ok(false)` (the
    /// backend answered but reports itself down) or an error (the
    /// backend didn't answer usably) — callers treat both as unreachable.
    pub async fn check_health(&self) -> Result<bool, Error> {
        let url = self.endpoint("health")?;
        debug!(%url, "GET health");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let health: HealthResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body,
            })?;

        Ok(health.status == "online")
    }
}
