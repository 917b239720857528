use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{GroundingBackend, GroundingResponse};
use crate::config::get_env;
use crate::errors::{from_transport, ComputerUseError, ComputerUseResult};
use crate::models::content::image_mime_type;

pub const OSATLAS_HOST: &str = "https://maxiw-os-atlas.hf.space";
pub const OSATLAS_MODEL: &str = "OS-Copilot/OS-Atlas-Base-7B";

#[derive(Debug, Clone)]
pub struct OsAtlasConfig {
    pub host: String,
    pub model_id: String,
    pub hf_token: Option<String>,
    pub timeout: Duration,
}

impl OsAtlasConfig {
    pub fn from_env(timeout: Duration) -> ComputerUseResult<Self> {
        Ok(Self {
            host: get_env("OSATLAS_HOST", false, Some(OSATLAS_HOST.to_string()))?
                .unwrap_or_else(|| OSATLAS_HOST.to_string()),
            model_id: get_env("OSATLAS_MODEL", false, Some(OSATLAS_MODEL.to_string()))?
                .unwrap_or_else(|| OSATLAS_MODEL.to_string()),
            hf_token: get_env("HF_TOKEN", false, None)?.filter(|token| !token.is_empty()),
            timeout,
        })
    }
}

/// Grounding through the `run_example` endpoint of the OS-Atlas Gradio space.
pub struct OsAtlasBackend {
    client: Client,
    config: OsAtlasConfig,
}

impl OsAtlasBackend {
    pub fn new(config: OsAtlasConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        tracing::info!(host = %config.host, model = %config.model_id, "using OS-Atlas grounding");
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/gradio_api/{}", self.config.host.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.hf_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().unwrap_or_default();
                Err(anyhow!("Request failed: {} {}", status, body))
            }
        }
    }

    /// Upload the screenshot, returning the server-side path Gradio assigned to it.
    fn upload(&self, screenshot: &[u8]) -> Result<String> {
        let mime = image_mime_type(screenshot)?;
        let file_name = format!("screenshot.{}", mime.trim_start_matches("image/"));
        let part = Part::bytes(screenshot.to_vec())
            .file_name(file_name)
            .mime_str(mime)?;
        let form = Form::new().part("files", part);

        let response = self
            .authorize(self.client.post(self.url("upload")))
            .multipart(form)
            .send()?;
        let paths: Value = Self::check(response)?.json()?;
        paths
            .get(0)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Unexpected upload response: {}", paths))
    }

    fn submit(&self, path: &str, prompt: &str) -> Result<String> {
        let payload = json!({
            "data": [
                {"path": path, "meta": {"_type": "gradio.FileData"}},
                prompt,
                self.config.model_id,
            ]
        });
        let response = self
            .authorize(self.client.post(self.url("call/run_example")))
            .json(&payload)
            .send()?;
        let body: Value = Self::check(response)?.json()?;
        body["event_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No event id in response: {}", body))
    }

    fn result(&self, event_id: &str) -> Result<Value> {
        let url = self.url(&format!("call/run_example/{}", event_id));
        let response = self.authorize(self.client.get(url)).send()?;
        let stream = Self::check(response)?.text()?;
        parse_event_stream(&stream)
    }
}

/// Pull the payload of the `complete` event out of a Gradio event stream.
pub fn parse_event_stream(stream: &str) -> Result<Value> {
    let mut event = "";
    for line in stream.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            match event {
                "complete" => {
                    return serde_json::from_str(data.trim()).context("Malformed complete event");
                }
                "error" => return Err(anyhow!("Backend reported an error: {}", data.trim())),
                _ => {}
            }
        }
    }
    Err(anyhow!("Event stream ended without a result"))
}

/// The annotated image is a Gradio file object or, on older servers, a plain string.
fn image_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(file) => file
            .get("url")
            .or_else(|| file.get("path"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

impl GroundingBackend for OsAtlasBackend {
    fn name(&self) -> &str {
        "osatlas"
    }

    fn locate(&self, screenshot: &[u8], prompt: &str) -> ComputerUseResult<GroundingResponse> {
        let timeout = self.config.timeout.as_secs();
        let fail = |e: anyhow::Error| from_transport(e, "grounding", timeout, ComputerUseError::Grounding);

        let path = self.upload(screenshot).map_err(fail)?;
        let event_id = self.submit(&path, prompt).map_err(fail)?;
        tracing::debug!(event_id = %event_id, "waiting for grounding result");
        let data = self.result(&event_id).map_err(fail)?;

        let text = data
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| ComputerUseError::Grounding(format!("Unexpected result payload: {}", data)))?;

        Ok(GroundingResponse {
            text: text.to_string(),
            image_ref: data.get(2).and_then(image_ref),
        })
    }
}
