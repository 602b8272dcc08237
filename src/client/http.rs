use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{RemoteClient, RemoteError, RemoteErrorKind};
use crate::resource::collection::{CollectionDescription, CreateCollection};
use crate::resource::index::{Index, IndexConfigure, IndexSpec};

const API_KEY_HEADER: &str = "Api-Key";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `RemoteClient` speaking JSON to the control plane's REST API.
#[derive(Clone, Debug)]
pub struct HttpControlPlane {
    base_url: Url,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<Index>,
}

#[derive(Deserialize)]
struct CollectionList {
    #[serde(default)]
    collections: Vec<CollectionDescription>,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RemoteError::transport(err.to_string()))?;
        let base_url = Url::parse(base_url)
            .map_err(|err| RemoteError::transport(format!("Invalid base URL '{}': {}", base_url, err)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::transport(format!("Invalid base URL '{}'", base_url)));
        }
        Ok(HttpControlPlane {
            base_url,
            api_key: api_key.to_owned(),
            http,
        })
    }

    /// `segments` are percent-encoded, so a resource name can never leave its path segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!("{} {}", method, url);
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|err| RemoteError::transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(classify(status), error_message(status, &body)).with_status(status.as_u16()))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| RemoteError::transport(format!("Unable to decode response: {}", err)))
    }
}

/// Map a non-success HTTP status onto the error kinds the reconcilers act on.
fn classify(status: StatusCode) -> RemoteErrorKind {
    match status {
        StatusCode::NOT_FOUND => RemoteErrorKind::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteErrorKind::Validation
        }
        _ => RemoteErrorKind::Transport,
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    }
}

#[async_trait]
impl RemoteClient for HttpControlPlane {
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), RemoteError> {
        self.send(self.request(Method::POST, &["indexes"]).json(spec)).await?;
        Ok(())
    }

    async fn describe_index(&self, name: &str) -> Result<Index, RemoteError> {
        self.send_json(self.request(Method::GET, &["indexes", name]))
            .await
    }

    async fn configure_index(&self, name: &str, changes: &IndexConfigure) -> Result<(), RemoteError> {
        let body = json!({ "spec": { "pod": changes } });
        self.send(self.request(Method::PATCH, &["indexes", name]).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<(), RemoteError> {
        self.send(self.request(Method::DELETE, &["indexes", name]))
            .await?;
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<Index>, RemoteError> {
        let list: IndexList = self.send_json(self.request(Method::GET, &["indexes"])).await?;
        Ok(list.indexes)
    }

    async fn create_collection(&self, request: &CreateCollection) -> Result<(), RemoteError> {
        self.send(self.request(Method::POST, &["collections"]).json(request))
            .await?;
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, RemoteError> {
        self.send_json(self.request(Method::GET, &["collections", name]))
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RemoteError> {
        self.send(self.request(Method::DELETE, &["collections", name]))
            .await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionDescription>, RemoteError> {
        let list: CollectionList = self.send_json(self.request(Method::GET, &["collections"])).await?;
        Ok(list.collections)
    }
}
