use crate::proxmox::Proxmox;
use crate::proxmox::types::*;
use async_trait::async_trait;
use pvedeploy_common::prelude::{Error, ProxmoxError, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Concrete implementation of the `Proxmox` trait using `reqwest` crate.
///
/// Certificate verification is disabled: Proxmox nodes ship with
/// self-signed certificates, and the API token is the trust anchor here.
/// Idle connections are not kept, every request opens and closes its own
/// connection so a long-lived controller does not hold sockets open.
///
pub struct ProxmoxClient {
    client: OnceCell<Client>,
    url: String,
    api_token: SecretString,
}

impl ProxmoxClient {
    /// Creates a new instance of the Proxmox client.
    ///
    /// # Arguments
    ///
    /// * `url`: Base URL of the node, e.g. `https://pve.lan:8006`.
    /// * `api_token`: API token in the `user@realm!name=uuid` form.
    ///
    pub fn new(url: String, api_token: SecretString) -> Result<Self> {
        Ok(Self {
            client: OnceCell::new(),
            url: url.trim_end_matches('/').to_owned(),
            api_token,
        })
    }

    /// Lazily builds the `reqwest::Client` with the authorization header.
    ///
    async fn get_client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let header = format!("PVEAPIToken={}", self.api_token.expose_secret());
                let mut auth_header = HeaderValue::from_str(&header)?;
                auth_header.set_sensitive(true);

                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, auth_header);

                Client::builder()
                    .default_headers(headers)
                    .danger_accept_invalid_certs(true)
                    .use_rustls_tls()
                    .pool_max_idle_per_host(0)
                    .connect_timeout(Duration::from_secs(10))
                    .build()
                    .map_err(Error::from)
            })
            .await
    }

    /// Generic helper method to perform a request to the Proxmox API.
    ///
    /// Parameters are sent as a form for `POST` and as a query string
    /// otherwise, matching what the Proxmox endpoints expect.
    ///
    /// # Arguments
    ///
    /// * `method`: HTTP method to use for the request.
    /// * `path`: API endpoint path, starting with `/api2/json`.
    /// * `params`: Optional request parameters.
    /// * `error_var`: Operation to blame if the API call fails.
    ///
    /// # Returns
    ///
    /// Content of the `data` field, `None` if it was `null`.
    ///
    async fn make_request<P, D>(
        &self,
        method: Method,
        path: &str,
        params: Option<&P>,
        error_var: ProxmoxError,
    ) -> Result<Option<D>>
    where
        P: Serialize + ?Sized,
        D: DeserializeOwned,
    {
        let client = self.get_client().await?;
        let url = format!("{}{}", self.url, path);

        let mut request = client.request(method.clone(), &url);
        if let Some(params) = params {
            request = if method == Method::POST {
                request.form(params)
            } else {
                request.query(params)
            };
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::trace!(target: "proxmox", %method, path, %status, "Proxmox API call");

        if status != StatusCode::OK {
            return Err(Error::Proxmox(error_var, status, text));
        }

        serde_json::from_str::<Response<D>>(&text)
            .map(|response| response.data)
            .map_err(|error| Error::Protocol(error_var, error.to_string()))
    }

    async fn vm_action(
        &self,
        vm: &VmRef,
        action: &str,
        error_var: ProxmoxError,
    ) -> Result<Option<UniqueProcessId>> {
        let path = format!("/api2/json/nodes/{}/qemu/{}/status/{}", vm.node, vm.id, action);
        self.make_request(Method::POST, &path, None::<&()>, error_var)
            .await
    }
}

#[async_trait]
impl Proxmox for ProxmoxClient {
    async fn list_vms(&self, node: &str) -> Result<Vec<VmSummary>> {
        let path = format!("/api2/json/nodes/{}/qemu", node);
        let vms: Option<Vec<VmSummary>> = self
            .make_request(Method::GET, &path, None::<&()>, ProxmoxError::ListVms)
            .await?;
        Ok(vms.unwrap_or_default())
    }

    async fn vm_status(&self, vm: &VmRef) -> Result<String> {
        let path = format!("/api2/json/nodes/{}/qemu/{}/status/current", vm.node, vm.id);
        let payload: Option<StatusPayload> = self
            .make_request(Method::GET, &path, None::<&()>, ProxmoxError::Status)
            .await?;
        payload
            .map(|payload| payload.status)
            .ok_or_else(|| Error::Protocol(ProxmoxError::Status, "missing status".to_owned()))
    }

    async fn start(&self, vm: &VmRef) -> Result<Option<UniqueProcessId>> {
        self.vm_action(vm, "start", ProxmoxError::Start).await
    }

    async fn shutdown(&self, vm: &VmRef) -> Result<Option<UniqueProcessId>> {
        self.vm_action(vm, "shutdown", ProxmoxError::Shutdown).await
    }

    async fn stop(&self, vm: &VmRef) -> Result<Option<UniqueProcessId>> {
        self.vm_action(vm, "stop", ProxmoxError::Stop).await
    }

    async fn create(&self, node: &str, params: &CreateVm) -> Result<Option<UniqueProcessId>> {
        let path = format!("/api2/json/nodes/{}/qemu", node);
        self.make_request(Method::POST, &path, Some(params), ProxmoxError::Create)
            .await
    }

    async fn delete(&self, vm: &VmRef, params: &DeleteVm) -> Result<Option<UniqueProcessId>> {
        let path = format!("/api2/json/nodes/{}/qemu/{}", vm.node, vm.id);
        self.make_request(Method::DELETE, &path, Some(params), ProxmoxError::Delete)
            .await
    }

    async fn storage_content(&self, node: &str, storage: &str) -> Result<Vec<StorageContent>> {
        let path = format!("/api2/json/nodes/{}/storage/{}/content", node, storage);
        let content: Option<Vec<StorageContent>> = self
            .make_request(Method::GET, &path, None::<&()>, ProxmoxError::StorageContent)
            .await?;
        Ok(content.unwrap_or_default())
    }

    async fn download_url(
        &self,
        node: &str,
        storage: &str,
        params: &DownloadUrl,
    ) -> Result<Option<UniqueProcessId>> {
        let path = format!("/api2/json/nodes/{}/storage/{}/download-url", node, storage);
        self.make_request(Method::POST, &path, Some(params), ProxmoxError::DownloadUrl)
            .await
    }

    async fn task_status(&self, task: &TaskRef) -> Result<TaskStatus> {
        let path = format!("/api2/json/nodes/{}/tasks/{}/status", task.node, task.upid.encoded());
        let data: TaskResponse = self
            .make_request(Method::GET, &path, None::<&()>, ProxmoxError::Task)
            .await?
            .ok_or_else(|| Error::Protocol(ProxmoxError::Task, "missing task status".to_owned()))?;
        Ok(match (data.status, data.exit_status.as_deref()) {
            (Status::Running, _) => TaskStatus::Pending,
            (Status::Stopped, Some("OK")) => TaskStatus::Completed,
            (Status::Stopped, Some(exit_status)) => TaskStatus::Failed(exit_status.to_owned()),
            (Status::Stopped, None) => TaskStatus::Failed("Unexpected".to_owned()),
        })
    }

    async fn agent_interfaces(&self, vm: &VmRef) -> Result<Vec<NetworkInterface>> {
        let path = format!(
            "/api2/json/nodes/{}/qemu/{}/agent/network-get-interfaces",
            vm.node, vm.id
        );
        let payload: Option<AgentInterfaces> = self
            .make_request(Method::GET, &path, None::<&()>, ProxmoxError::Agent)
            .await?;
        Ok(payload.map(|payload| payload.result).unwrap_or_default())
    }
}
