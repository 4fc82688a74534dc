use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ header::AUTHORIZATION, Client as HttpClient, RequestBuilder, StatusCode };
use serde::Deserialize;
use serde_json::{ json, Value as JsonValue };
use std::path::Path;
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::{
    read_service_account_key,
    DefaultHyperClientBuilder,
    HyperClientBuilder,
    ServiceAccountAuthenticator,
};

use crate::store::value::{ decode_fields, encode, encode_fields };
use crate::store::{ split_path, Document, DocumentStore, Fields, StoreError };

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const PAGE_SIZE: usize = 300;

#[derive(Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: serde_json::Map<String, JsonValue>,
}

impl RawDocument {
    fn into_document(self) -> Document {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        Document { id, fields: decode_fields(&self.fields) }
    }
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// Service-account authenticator; it caches tokens and refreshes them on expiry.
pub type ServiceAccountAuth = Authenticator<<DefaultHyperClientBuilder as HyperClientBuilder>::Connector>;

/// Firestore REST v1 client. Without a service account key the client
/// sends no credentials, which is what the local emulator expects.
pub struct FirestoreStore {
    http: HttpClient,
    documents_url: String,
    auth: Option<ServiceAccountAuth>,
}

impl FirestoreStore {
    pub async fn connect(
        project_id: &str,
        sa_key_path: Option<&str>,
        emulator_host: Option<&str>
    ) -> Result<Self, StoreError> {
        let auth = match sa_key_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                let key = read_service_account_key(Path::new(path)).await.map_err(|e| {
                    StoreError::Auth(format!("Failed to load SA key from {}: {}", path, e))
                })?;
                let auth = ServiceAccountAuthenticator::builder(key)
                    .build().await
                    .map_err(|e| StoreError::Auth(e.to_string()))?;
                Some(auth)
            }
            None => None,
        };

        let host = match emulator_host.filter(|h| !h.trim().is_empty()) {
            Some(h) if h.starts_with("http") => h.trim_end_matches('/').to_string(),
            Some(h) => format!("http://{}", h.trim_end_matches('/')),
            None => FIRESTORE_HOST.to_string(),
        };

        if auth.is_none() {
            info!("Firestore client running without credentials against {}", host);
        }
        Ok(Self::with_base_url(&host, project_id, auth))
    }

    pub fn with_base_url(host: &str, project_id: &str, auth: Option<ServiceAccountAuth>) -> Self {
        Self {
            http: HttpClient::new(),
            documents_url: format!(
                "{}/v1/projects/{}/databases/(default)/documents",
                host.trim_end_matches('/'),
                project_id
            ),
            auth,
        }
    }

    async fn access_token(&self) -> Result<Option<String>, StoreError> {
        let Some(auth) = &self.auth else {
            return Ok(None);
        };

        let token = auth.token(&[DATASTORE_SCOPE]).await.map_err(|e| StoreError::Auth(e.to_string()))?;
        let value = token
            .token()
            .ok_or_else(|| StoreError::Auth("OAuth token was None".to_string()))?
            .to_string();
        Ok(Some(value))
    }

    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        Ok(match self.access_token().await? {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => req,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.documents_url, path.trim_matches('/'))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status { status, body })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let url = self.url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.http.get(&url).query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let resp = check_status(self.authorized(req).await?.send().await?).await?;
            let page: ListResponse = resp.json().await?;

            documents.extend(page.documents.into_iter().map(RawDocument::into_document));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => {
                    page_token = Some(token);
                }
                None => {
                    break;
                }
            }
        }

        debug!("Listed {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        split_path(path)?;
        let req = self.http.get(self.url(path));
        let resp = self.authorized(req).await?.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: RawDocument = check_status(resp).await?.json().await?;
        Ok(Some(raw.into_document()))
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let body = json!({ "fields": encode_fields(&fields) });
        let req = self.http.post(self.url(collection)).json(&body);
        let raw: RawDocument = check_status(self.authorized(req).await?.send().await?).await?.json().await?;
        Ok(raw.into_document().id)
    }

    async fn update_field(&self, path: &str, field: &str, value: JsonValue) -> Result<(), StoreError> {
        split_path(path)?;
        let body = json!({ "fields": { field: encode(&value) } });
        let req = self.http
            .patch(self.url(path))
            .query(&[("updateMask.fieldPaths", field)])
            .json(&body);
        check_status(self.authorized(req).await?.send().await?).await?;
        Ok(())
    }
}
