use super::{
    ClientFactory, InstanceFilter, InstanceMigration, MigrateInstance, ProcessInstanceSummary,
    ProcessServerClient,
};
use crate::error::{AppError, Result};
use crate::models::{ClientCertificate, Credentials, ServerAuth, ServerConfig, ServerIdentity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SUCCESS: &str = "SUCCESS";

#[derive(Debug, Deserialize)]
struct ServiceResponse<T> {
    #[serde(rename = "type")]
    response_type: String,
    msg: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ServerInfoResult {
    #[serde(rename = "kie-server-info")]
    info: KieServerInfo,
}

#[derive(Debug, Deserialize)]
struct KieServerInfo {
    id: String,
    name: String,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainersResult {
    #[serde(rename = "kie-containers")]
    containers: ContainerList,
}

#[derive(Debug, Deserialize)]
struct ContainerList {
    #[serde(rename = "kie-container", default)]
    items: Vec<KieContainer>,
}

#[derive(Debug, Deserialize)]
struct KieContainer {
    #[serde(rename = "container-id")]
    container_id: String,
}

#[derive(Debug, Deserialize)]
struct ProcessDefinitionBody {
    #[serde(rename = "container-id")]
    container_id: String,
}

#[derive(Debug, Deserialize)]
struct ProcessDefinitionList {
    #[serde(rename = "processes", default)]
    definitions: Vec<ProcessDefinitionEntry>,
}

#[derive(Debug, Deserialize)]
struct ProcessDefinitionEntry {
    #[serde(rename = "process-id")]
    process_id: String,
}

#[derive(Debug, Deserialize)]
struct ProcessInstanceList {
    #[serde(rename = "process-instance", default)]
    instances: Vec<KieProcessInstance>,
}

#[derive(Debug, Deserialize)]
struct KieProcessInstance {
    #[serde(rename = "process-instance-id")]
    id: i64,
    #[serde(rename = "process-id")]
    process_id: String,
    #[serde(rename = "process-name")]
    process_name: Option<String>,
    #[serde(rename = "process-instance-state", alias = "state", default)]
    state: i32,
    initiator: Option<String>,
    #[serde(rename = "start-date")]
    start_date: Option<KieDate>,
}

#[derive(Debug, Deserialize)]
struct MigrationReportInstance {
    #[serde(rename = "migration-successful")]
    successful: bool,
    #[serde(rename = "migration-start")]
    start: Option<KieDate>,
    #[serde(rename = "migration-end")]
    end: Option<KieDate>,
    #[serde(rename = "migration-logs", default)]
    logs: Vec<String>,
}

/// Dates are serialized by the server as `{"java.util.Date": <epoch millis>}`.
#[derive(Debug, Deserialize)]
struct KieDate {
    #[serde(rename = "java.util.Date")]
    millis: i64,
}

impl KieDate {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.millis)
    }
}

/// Opens REST clients against KIE servers.
#[derive(Debug, Clone, Default)]
pub struct KieClientFactory;

impl KieClientFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClientFactory for KieClientFactory {
    async fn connect(
        &self,
        server: &ServerConfig,
        auth: &ServerAuth,
    ) -> Result<Arc<dyn ProcessServerClient>> {
        let client = KieServerClient::new(&server.host, auth)?;
        Ok(Arc::new(client))
    }
}

pub struct KieServerClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl KieServerClient {
    pub fn new(host: &str, auth: &ServerAuth) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(cert) = &auth.client_cert {
            builder = Self::with_client_cert(builder, cert)?;
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url: host.trim_end_matches('/').to_string(),
            credentials: auth.credentials.clone(),
        })
    }

    fn with_client_cert(
        builder: reqwest::ClientBuilder,
        cert: &ClientCertificate,
    ) -> Result<reqwest::ClientBuilder> {
        let identity = reqwest::Identity::from_pem(&cert.identity_pem).map_err(|e| {
            AppError::Configuration(format!("Invalid client certificate {}: {}", cert.cert_name, e))
        })?;
        let roots = reqwest::Certificate::from_pem_bundle(&cert.roots_pem).map_err(|e| {
            AppError::Configuration(format!("Invalid truststore for {}: {}", cert.cert_name, e))
        })?;

        let mut builder = builder.identity(identity);
        for root in roots {
            builder = builder.add_root_certificate(root);
        }
        Ok(builder)
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&raw).map_err(|e| AppError::Configuration(format!("Invalid URL {}: {}", raw, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.credentials {
            Credentials::Anonymous => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, password.as_deref())
            }
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }

    /// Sends the request and returns the body, or `None` on 404.
    async fn fetch_bytes(&self, request: RequestBuilder, what: &str) -> Result<Option<Vec<u8>>> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::Remote(format!(
                "{} request to {} failed with status {}",
                what, self.base_url, status
            )));
        }

        let bytes = response.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }

    fn parse<T: for<'de> Deserialize<'de>>(bytes: &[u8], what: &str) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| AppError::Remote(format!("Invalid {} response: {}", what, e)))
    }

    fn unwrap_service_response<T>(response: ServiceResponse<T>, what: &str) -> Result<T> {
        if response.response_type != SUCCESS {
            return Err(AppError::Remote(format!(
                "{} failed: {}",
                what,
                response.msg.unwrap_or(response.response_type)
            )));
        }
        response
            .result
            .ok_or_else(|| AppError::Remote(format!("{} returned no result", what)))
    }
}

#[async_trait]
impl ProcessServerClient for KieServerClient {
    async fn identify(&self) -> Result<ServerIdentity> {
        let request = self.request(Method::GET, self.url("")?);
        let body = match self.fetch_bytes(request, "server info").await {
            Ok(Some(body)) => body,
            Ok(None) => return Err(AppError::EndpointNotFound(self.base_url.clone())),
            Err(AppError::Http(e)) if e.is_connect() || e.is_timeout() => {
                return Err(AppError::EndpointNotFound(self.base_url.clone()));
            }
            Err(AppError::Http(e)) => return Err(AppError::Connectivity(e.to_string())),
            Err(e) => return Err(e),
        };

        let response: ServiceResponse<ServerInfoResult> = Self::parse(&body, "server info")?;
        let info = Self::unwrap_service_response(response, "server info")?.info;
        Ok(ServerIdentity {
            server_id: info.id,
            name: info.name,
            version: info.version,
        })
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let request = self.request(Method::GET, self.url("containers")?);
        let body = self
            .fetch_bytes(request, "containers")
            .await?
            .ok_or_else(|| AppError::Remote("containers endpoint not found".to_string()))?;

        let response: ServiceResponse<ContainersResult> = Self::parse(&body, "containers")?;
        let containers = Self::unwrap_service_response(response, "list containers")?.containers;
        Ok(containers
            .items
            .into_iter()
            .map(|container| container.container_id)
            .collect())
    }

    async fn find_process_definition(
        &self,
        container_id: &str,
        process_id: &str,
    ) -> Result<bool> {
        let path = format!(
            "queries/containers/{}/processes/definitions/{}",
            container_id, process_id
        );
        let request = self.request(Method::GET, self.url(&path)?);
        let Some(body) = self.fetch_bytes(request, "process definition").await? else {
            return Ok(false);
        };

        let definition: ProcessDefinitionBody = Self::parse(&body, "process definition")?;
        Ok(definition.container_id == container_id)
    }

    async fn find_process_definitions(
        &self,
        container_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<String>> {
        let mut url = self.url(&format!("queries/containers/{}/processes/definitions", container_id))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());

        let request = self.request(Method::GET, url);
        let Some(body) = self.fetch_bytes(request, "process definitions").await? else {
            return Ok(Vec::new());
        };

        let list: ProcessDefinitionList = Self::parse(&body, "process definitions")?;
        Ok(list
            .definitions
            .into_iter()
            .map(|definition| definition.process_id)
            .collect())
    }

    async fn find_instances(
        &self,
        container_id: &str,
        filter: &InstanceFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ProcessInstanceSummary>> {
        let mut url = self.url(&format!("queries/containers/{}/process/instances", container_id))?;
        {
            let mut query = url.query_pairs_mut();
            for status in &filter.statuses {
                query.append_pair("status", &status.to_string());
            }
            query.append_pair("page", &page.to_string());
            query.append_pair("pageSize", &page_size.to_string());
        }

        let request = self.request(Method::GET, url);
        let Some(body) = self.fetch_bytes(request, "process instances").await? else {
            return Ok(Vec::new());
        };

        let list: ProcessInstanceList = Self::parse(&body, "process instances")?;
        Ok(list
            .instances
            .into_iter()
            .map(|instance| ProcessInstanceSummary {
                id: instance.id,
                process_id: instance.process_id,
                process_name: instance.process_name,
                state: instance.state,
                initiator: instance.initiator,
                start_date: instance.start_date.and_then(|d| d.to_utc()),
            })
            .collect())
    }

    async fn migrate_instance(&self, request: MigrateInstance<'_>) -> Result<InstanceMigration> {
        let mut url = self.url(&format!(
            "admin/containers/{}/processes/instances/{}",
            request.source_container_id, request.instance_id
        ))?;
        url.query_pairs_mut()
            .append_pair("targetContainerId", request.target_container_id)
            .append_pair("targetProcessId", request.target_process_id);

        let payload = serde_json::to_vec(request.node_mapping)
            .map_err(|e| AppError::InvalidMigration(format!("Invalid node mapping: {}", e)))?;
        let started = Utc::now();
        let http_request = self
            .request(Method::PUT, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);

        let body = self
            .fetch_bytes(http_request, "migrate instance")
            .await?
            .ok_or_else(|| {
                AppError::Remote(format!(
                    "process instance {} not found in {}",
                    request.instance_id, request.source_container_id
                ))
            })?;

        let report: MigrationReportInstance = Self::parse(&body, "migration report")?;
        let finished = Utc::now();
        Ok(InstanceMigration {
            successful: report.successful,
            start: report.start.and_then(|d| d.to_utc()).unwrap_or(started),
            end: report.end.and_then(|d| d.to_utc()).unwrap_or(finished),
            logs: report.logs,
        })
    }
}
