use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::api_clients::client_trait::{JobRequest, SessionClient};
use crate::error::{AppError, AppResult};
use crate::models::RemoteJobStatus;

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(default)]
    status: Option<String>,
}

/// HTTP client for the headless session service.
///
/// `POST {base}/session` launches, `GET {base}/session/{id}` reports status
/// and `DELETE {base}/session/{id}` terminates.
pub struct HttpSessionClient {
    http_client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpSessionClient {
    pub fn new(base_url: &str, token: Option<String>) -> AppResult<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| AppError::ConfigError(format!("Invalid session API URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::ConfigError(format!("Session API URL cannot be a base: {}", base_url)));
        }

        Ok(Self {
            http_client: Client::new(),
            base_url,
            token,
        })
    }

    fn session_url(&self, job_id: Option<&str>) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::ConfigError(format!("Session API URL cannot be a base: {}", self.base_url)))?;
            segments.pop_if_empty().push("session");
            if let Some(id) = job_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Extract the session ID from a launch response body.
///
/// The service has answered with a JSON list of IDs, a JSON string and a bare
/// text ID depending on version.
pub(crate) fn parse_launch_response(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let id = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items.into_iter().find_map(|item| item.as_str().map(str::to_string)),
        Ok(Value::String(id)) => Some(id),
        Ok(Value::Object(map)) => map.get("id").and_then(Value::as_str).map(str::to_string),
        Ok(Value::Number(n)) => Some(n.to_string()),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    };

    id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Interpret a status response body; anything unrecognisable is `None`.
pub(crate) fn parse_status_response(body: &str) -> Option<RemoteJobStatus> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let raw = match serde_json::from_str::<SessionInfo>(trimmed) {
        Ok(info) => info.status?,
        Err(_) => match serde_json::from_str::<Vec<SessionInfo>>(trimmed) {
            Ok(mut infos) if !infos.is_empty() => infos.swap_remove(0).status?,
            _ => trimmed.to_string(),
        },
    };

    match raw.parse::<RemoteJobStatus>() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

#[async_trait]
impl SessionClient for HttpSessionClient {
    async fn submit_job(&self, request: &JobRequest) -> AppResult<String> {
        let url = self.session_url(None)?;

        let mut form: Vec<(&str, String)> = vec![
            ("name", request.name.clone()),
            ("image", request.image.clone()),
            ("kind", "headless".to_string()),
            ("cmd", request.command.clone()),
            ("args", request.args.join(" ")),
        ];
        if let Some(cores) = request.cores {
            form.push(("cores", cores.to_string()));
        }
        if let Some(ram) = request.ram_gb {
            form.push(("ram", ram.to_string()));
        }

        info!("Launching headless session '{}' with image {}", request.name, request.image);
        debug!("Session command: {} {}", request.command, request.args.join(" "));

        let response = self
            .authorize(self.http_client.post(url))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::HttpError(format!("Session launch request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::LaunchFailure(format!("Session service returned {}: {}", status, body.trim())));
        }

        parse_launch_response(&body)
            .ok_or_else(|| AppError::LaunchFailure(format!("No session ID returned for job '{}'", request.name)))
    }

    async fn poll_job(&self, job_id: &str) -> AppResult<Option<RemoteJobStatus>> {
        let url = self.session_url(Some(job_id))?;
        let response = self
            .authorize(self.http_client.get(url))
            .send()
            .await
            .map_err(|e| AppError::HttpError(format!("Session status request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Session {} not found", job_id);
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::HttpError(format!("Session service returned {}: {}", status, body.trim())));
        }

        Ok(parse_status_response(&body))
    }

    async fn terminate_job(&self, job_id: &str) -> AppResult<()> {
        let url = self.session_url(Some(job_id))?;
        let response = self
            .authorize(self.http_client.delete(url))
            .send()
            .await
            .map_err(|e| AppError::HttpError(format!("Session delete request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::HttpError(format!(
                "Failed to terminate session {}: {}",
                job_id,
                response.status()
            )));
        }
        info!("Terminated session {}", job_id);
        Ok(())
    }
}
