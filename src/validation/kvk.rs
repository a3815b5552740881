//! Client for the KvK (Kamer van Koophandel) search API.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cache::TtlCache;
use super::RegistryError;

/// Registered company as reported by the KvK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvkCompany {
    pub kvk_number: String,
    pub trade_name: String,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub street: Option<String>,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    resultaten: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    kvk_nummer: String,
    naam: String,
    #[serde(default)]
    adres: Option<Address>,
    #[serde(default)]
    actief: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Address {
    #[serde(default)]
    binnenlands_adres: Option<DomesticAddress>,
}

#[derive(Debug, Deserialize)]
struct DomesticAddress {
    #[serde(default)]
    straatnaam: Option<String>,
    #[serde(default)]
    postcode: Option<String>,
    #[serde(default)]
    plaats: Option<String>,
}

impl From<SearchResult> for KvkCompany {
    fn from(result: SearchResult) -> Self {
        let domestic = result.adres.and_then(|a| a.binnenlands_adres);
        Self {
            kvk_number: result.kvk_nummer,
            trade_name: result.naam,
            street: domestic.as_ref().and_then(|a| a.straatnaam.clone()),
            postal_code: domestic.as_ref().and_then(|a| a.postcode.clone()),
            city: domestic.and_then(|a| a.plaats),
            // the search API omits the flag for active registrations
            active: result
                .actief
                .map(|flag| !flag.eq_ignore_ascii_case("nee"))
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KvkConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

/// KvK search client. Cheap to clone; clones share the HTTP pool and cache.
#[derive(Debug, Clone)]
pub struct KvkClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache: Arc<TtlCache<String, Option<KvkCompany>>>,
}

impl KvkClient {
    pub fn new(config: KvkConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|key| !key.trim().is_empty()),
            cache: Arc::new(TtlCache::new(config.cache_ttl)),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Looks up a KvK number. `Ok(None)` means the number is not registered.
    ///
    /// The number must already be format-validated.
    pub async fn lookup(&self, kvk_number: &str) -> Result<Option<KvkCompany>, RegistryError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RegistryError::NotConfigured("KVK_API_KEY is not set".into()))?;

        if let Some(hit) = self.cache.get(&kvk_number.to_string()) {
            tracing::debug!(kvk_number, "kvk cache hit");
            return Ok(hit);
        }

        let endpoint = format!("{}/v2/zoeken", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .header("apikey", api_key)
            .query(&[("kvkNummer", kvk_number)])
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        let company = if status == reqwest::StatusCode::NOT_FOUND {
            None
        } else if status.is_success() {
            let body: SearchResponse = response.json().await.map_err(|source| RegistryError::Decode {
                endpoint: endpoint.clone(),
                source,
            })?;
            body.resultaten
                .into_iter()
                .find(|r| r.kvk_nummer == kvk_number)
                .map(KvkCompany::from)
        } else {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        };

        tracing::info!(kvk_number, found = company.is_some(), "kvk lookup");
        self.cache.insert(kvk_number.to_string(), company.clone());
        Ok(company)
    }
}
