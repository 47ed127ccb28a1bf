// Client HTTP per l'API delle operadoras
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::client::config::ClientConfig;
use crate::client::services::error_handler::FetchError;
use crate::common::models::{ExpenseDetail, OperatorDetail, OperatorPage, RegionExpenseResponse, Statistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    #[default]
    RazaoSocial,
    Cnpj,
}

impl SearchField {
    pub fn as_param(&self) -> &'static str {
        match self {
            SearchField::RazaoSocial => "razao_social",
            SearchField::Cnpj => "cnpj",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSearch {
    pub term: String,
    pub field: SearchField,
}

/// Parameters of `GET /operadoras`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<FieldSearch>,
}

impl ListQuery {
    pub fn page(page: u32, limit: u32) -> Self {
        Self { page, limit, search: None }
    }

    pub fn with_search(mut self, term: impl Into<String>, field: SearchField) -> Self {
        self.search = Some(FieldSearch { term: term.into(), field });
        self
    }

    /// Query string pairs; `q`/`campo` only when a non-empty term is set.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", self.page.to_string()), ("limit", self.limit.to_string())];
        if let Some(search) = self.search.as_ref().filter(|s| !s.term.is_empty()) {
            params.push(("q", search.term.clone()));
            params.push(("campo", search.field.as_param().to_string()));
        }
        params
    }
}

/// The backend as the store sees it. Implementations report every failure
/// as a `FetchError` and never retry.
pub trait OperadorasApi: Send + Sync {
    fn list_operators(&self, query: &ListQuery) -> impl Future<Output = Result<OperatorPage, FetchError>> + Send;

    fn get_operator(&self, cnpj: &str) -> impl Future<Output = Result<OperatorDetail, FetchError>> + Send;

    fn expense_detail(&self, cnpj: &str) -> impl Future<Output = Result<ExpenseDetail, FetchError>> + Send;

    fn statistics(&self) -> impl Future<Output = Result<Statistics, FetchError>> + Send;

    fn region_expenses(&self) -> impl Future<Output = Result<RegionExpenseResponse, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("API base URL cannot have path segments: {}", base_url));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url, timeout })
    }

    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| FetchError::Other(format!("invalid API base URL {}", self.base_url)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout { after_ms: self.timeout.as_millis() as u64 }
        } else if err.is_decode() {
            FetchError::Other(format!("invalid response body: {}", err))
        } else if err.is_connect() || err.is_request() || err.is_body() {
            FetchError::Network { reason: err.to_string() }
        } else {
            FetchError::Other(err.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&'static str, String)]) -> Result<T, FetchError> {
        debug!("GET {} {:?}", url, query);
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = match serde_json::from_str::<Value>(&text) {
                Ok(v) => v,
                Err(_) if text.is_empty() => Value::Null,
                Err(_) => Value::String(text),
            };
            warn!("GET {} -> {}", url, status);
            return Err(FetchError::HttpStatus { status: status.as_u16(), body });
        }

        response.json::<T>().await.map_err(|e| self.map_transport_error(e))
    }
}

impl OperadorasApi for HttpApiClient {
    async fn list_operators(&self, query: &ListQuery) -> Result<OperatorPage, FetchError> {
        let url = self.endpoint(&["operadoras"])?;
        self.get_json(url, &query.params()).await
    }

    async fn get_operator(&self, cnpj: &str) -> Result<OperatorDetail, FetchError> {
        let url = self.endpoint(&["operadoras", cnpj])?;
        self.get_json(url, &[]).await
    }

    async fn expense_detail(&self, cnpj: &str) -> Result<ExpenseDetail, FetchError> {
        let url = self.endpoint(&["operadoras", cnpj, "despesas"])?;
        self.get_json(url, &[]).await
    }

    async fn statistics(&self) -> Result<Statistics, FetchError> {
        let url = self.endpoint(&["estatisticas"])?;
        self.get_json(url, &[]).await
    }

    async fn region_expenses(&self) -> Result<RegionExpenseResponse, FetchError> {
        let url = self.endpoint(&["operadoras", "estatisticas", "despesas-uf"])?;
        self.get_json(url, &[]).await
    }
}
