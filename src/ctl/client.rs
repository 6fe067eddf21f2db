//! HTTP client for a running host.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::ctl::RpcApi;
use crate::error::{Fault, RemoteFault};
use crate::models::{ProcessInfo, ProcessState};
use crate::services::NumprocsResult;

#[derive(Debug, Clone)]
pub struct GraceClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;
        Self::handle_response(path, response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        Self::handle_response(path, response).await
    }

    /// Faults come back as a JSON body on a non-2xx status.
    async fn handle_response<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .with_context(|| format!("Failed to parse response of {}", path));
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Fault>(&body) {
            Ok(fault) => Err(RemoteFault {
                path: path.to_string(),
                fault,
            }
            .into()),
            Err(_) => anyhow::bail!("{}: HTTP {}: {}", path, status, body),
        }
    }
}

impl RpcApi for GraceClient {
    async fn update_numprocs(&self, group: &str) -> Result<NumprocsResult> {
        self.post("/grace/UpdateNumprocs", &json!({ "group_name": group }))
            .await
    }

    async fn start_process(&self, identity: &str) -> Result<()> {
        let _: ProcessInfo = self
            .post("/supervisor/startProcess", &json!({ "name": identity }))
            .await?;
        Ok(())
    }

    async fn stop_process(&self, identity: &str) -> Result<()> {
        let _: ProcessInfo = self
            .post("/supervisor/stopProcess", &json!({ "name": identity }))
            .await?;
        Ok(())
    }

    async fn process_state(&self, identity: &str) -> Result<ProcessState> {
        let info: ProcessInfo = self
            .get(&format!("/supervisor/getProcessInfo/{}", identity))
            .await?;
        Ok(info.state)
    }

    async fn remove_process_from_group(&self, group: &str, process: &str) -> Result<()> {
        let _: bool = self
            .post(
                "/grace/removeProcessFromGroup",
                &json!({ "group_name": group, "process_name": process }),
            )
            .await?;
        Ok(())
    }
}
