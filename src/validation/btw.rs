//! Client for the EU VIES VAT number validation REST API.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cache::TtlCache;
use super::RegistryError;

/// VIES answer for one VAT id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatCheck {
    pub vat_id: String,
    pub valid: bool,
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViesResponse {
    is_valid: bool,
    #[serde(default)]
    user_error: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// VIES reports undisclosed fields as `---`.
fn disclosed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "---")
}

/// `userError` values that mean the member state could not answer.
fn is_unavailable(user_error: &str) -> bool {
    matches!(
        user_error,
        "MS_UNAVAILABLE" | "MS_MAX_CONCURRENT_REQ" | "SERVICE_UNAVAILABLE" | "TIMEOUT" | "GLOBAL_MAX_CONCURRENT_REQ"
    )
}

#[derive(Debug, Clone)]
pub struct ViesConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ViesClient {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<TtlCache<String, VatCheck>>,
}

impl ViesClient {
    pub fn new(config: ViesConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache: Arc::new(TtlCache::new(config.cache_ttl)),
        })
    }

    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Checks a format-validated VAT id (country prefix included).
    pub async fn check(&self, vat_id: &str) -> Result<VatCheck, RegistryError> {
        if let Some(hit) = self.cache.get(&vat_id.to_string()) {
            tracing::debug!(vat_id, "vies cache hit");
            return Ok(hit);
        }

        let (Some(country), Some(number)) = (vat_id.get(..2), vat_id.get(2..)) else {
            return Err(RegistryError::InvalidInput(format!("'{vat_id}' has no country prefix")));
        };
        if number.is_empty() {
            return Err(RegistryError::InvalidInput(format!("'{vat_id}' has no number after the country prefix")));
        }
        let endpoint = format!("{}/ms/{}/vat/{}", self.base_url, country, number);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let body: ViesResponse = response.json().await.map_err(|source| RegistryError::Decode {
            endpoint: endpoint.clone(),
            source,
        })?;

        if let Some(code) = body.user_error.as_deref() {
            if is_unavailable(code) {
                return Err(RegistryError::Unavailable(format!("VIES reported {code} for {country}")));
            }
        }

        let check = VatCheck {
            vat_id: vat_id.to_string(),
            valid: body.is_valid,
            name: disclosed(body.name),
            address: disclosed(body.address),
        };
        tracing::info!(vat_id, valid = check.valid, "vies check");
        self.cache.insert(vat_id.to_string(), check.clone());
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undisclosed_fields_are_dropped() {
        assert_eq!(disclosed(Some("---".into())), None);
        assert_eq!(disclosed(Some("  ".into())), None);
        assert_eq!(disclosed(Some(" Acme BV ".into())), Some("Acme BV".into()));
    }

    #[test]
    fn member_state_outages_are_not_answers() {
        assert!(is_unavailable("MS_UNAVAILABLE"));
        assert!(!is_unavailable("VALID"));
        assert!(!is_unavailable("INVALID"));
    }
}
