//! Client identifier validation: format checks plus KvK and VIES registry
//! lookups, combined into a [`ValidationReport`].

pub mod btw;
pub mod cache;
pub mod format;
pub mod kvk;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::models::{Client, NewClient};

pub use btw::{VatCheck, ViesClient, ViesConfig};
pub use format::FormatError;
pub use kvk::{KvkClient, KvkCompany, KvkConfig};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry not configured: {0}")]
    NotConfigured(String),

    #[error("invalid registry query: {0}")]
    InvalidInput(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: reqwest::Error,
    },
}

impl From<RegistryError> for crate::error::Error {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// The check could not be carried out, e.g. a registry was down.
    Unavailable,
    /// Nothing to check; the field is optional and empty.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Normalised value when the check passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl CheckResult {
    fn new(check: &str, status: CheckStatus) -> Self {
        Self {
            check: check.to_string(),
            status,
            detail: None,
            value: None,
        }
    }

    pub fn passed(check: &str, value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::new(check, CheckStatus::Passed)
        }
    }

    pub fn failed(check: &str, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(check, CheckStatus::Failed)
        }
    }

    pub fn unavailable(check: &str, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(check, CheckStatus::Unavailable)
        }
    }

    pub fn skipped(check: &str) -> Self {
        Self::new(check, CheckStatus::Skipped)
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Outcome of validating one client. Passes when no check failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let passed = checks.iter().all(|c| c.status != CheckStatus::Failed);
        Self { passed, checks }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Unavailable)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.checks).unwrap_or(serde_json::Value::Null)
    }
}

fn format_check(check: &str, value: Option<&str>, required: bool, validate: fn(&str) -> Result<String, FormatError>) -> CheckResult {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None if required => CheckResult::failed(check, "missing"),
        None => CheckResult::skipped(check),
        Some(v) => match validate(v) {
            Ok(normalised) => CheckResult::passed(check, normalised),
            Err(e) => CheckResult::failed(check, e.to_string()),
        },
    }
}

fn names_match(registered: &str, ours: &str) -> bool {
    let normalise = |s: &str| {
        s.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    normalise(registered) == normalise(ours)
}

/// Format checks that need no network access.
pub fn format_checks(client: &Client) -> Vec<CheckResult> {
    let dutch = client.is_dutch();
    vec![
        format_check("email", Some(client.email.as_str()), true, format::validate_email),
        format_check("phone", client.phone.as_deref(), false, format::validate_phone),
        if dutch {
            format_check("postal_code", client.postal_code.as_deref(), true, format::validate_postal_code)
        } else {
            CheckResult::skipped("postal_code")
        },
        format_check("iban", client.iban.as_deref(), false, format::validate_iban),
        if dutch {
            format_check("kvk_number", client.kvk_number.as_deref(), true, format::validate_kvk_number)
        } else {
            CheckResult::skipped("kvk_number")
        },
        format_check("vat_id", client.vat_id.as_deref(), !dutch, format::validate_vat_id),
    ]
}

fn tidy(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Cleans up client input before it is stored.
///
/// Name and email are required. Identifiers that pass their format check
/// are stored normalised; others are kept as entered so the validation
/// report can point at them.
pub fn normalise_client(input: NewClient) -> crate::error::Result<NewClient> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(crate::error::Error::validation("client name is required"));
    }
    let email = format::validate_email(&input.email)
        .map_err(|e| crate::error::Error::validation(format!("email: {e}")))?;
    let country_code = tidy(input.country_code)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or_else(|| "NL".to_string());
    if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(crate::error::Error::validation("country_code must be an ISO 3166-1 alpha-2 code"));
    }

    let normalised = |value: Option<String>, validate: fn(&str) -> Result<String, FormatError>| {
        tidy(value).map(|v| validate(&v).unwrap_or(v))
    };

    Ok(NewClient {
        name,
        email,
        phone: normalised(input.phone, format::validate_phone),
        address: tidy(input.address),
        postal_code: if country_code == "NL" {
            normalised(input.postal_code, format::validate_postal_code)
        } else {
            tidy(input.postal_code)
        },
        city: tidy(input.city),
        country_code: Some(country_code),
        kvk_number: normalised(input.kvk_number, format::validate_kvk_number),
        vat_id: normalised(input.vat_id, format::validate_vat_id),
        iban: normalised(input.iban, format::validate_iban),
    })
}

/// VAT id of a client that qualifies for reverse-charged VAT: a valid id
/// from an EU member state other than the Netherlands.
pub fn reverse_charge_vat_id(client: &Client) -> crate::error::Result<String> {
    let vat_id = client
        .vat_id
        .as_deref()
        .ok_or_else(|| crate::error::Error::validation("reverse charge requires the client's VAT id"))?;
    let vat_id = format::validate_vat_id(vat_id)
        .map_err(|e| crate::error::Error::validation(format!("reverse charge: {e}")))?;
    match format::vat_country(&vat_id) {
        Some("NL") | None => Err(crate::error::Error::validation(
            "reverse charge only applies to clients with a VAT id from another EU member state",
        )),
        Some(_) => Ok(vat_id),
    }
}

/// Registry clients shared by the API and the console.
#[derive(Debug, Clone)]
pub struct Validator {
    pub kvk: KvkClient,
    pub vies: ViesClient,
}

impl Validator {
    pub fn new(kvk: KvkClient, vies: ViesClient) -> Self {
        Self { kvk, vies }
    }

    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let kvk = KvkClient::new(KvkConfig {
            base_url: config.kvk_base_url.clone(),
            api_key: config.kvk_api_key.clone(),
            timeout: config.registry_timeout(),
            cache_ttl: config.registry_cache_ttl(),
        })?;
        let vies = ViesClient::new(ViesConfig {
            base_url: config.vies_base_url.clone(),
            timeout: config.registry_timeout(),
            cache_ttl: config.registry_cache_ttl(),
        })?;
        Ok(Self::new(kvk, vies))
    }

    /// Drops expired registry answers from both caches.
    pub fn purge_caches(&self) -> usize {
        self.kvk.purge_cache() + self.vies.purge_cache()
    }

    async fn kvk_registry_check(&self, client: &Client, kvk_number: &str) -> CheckResult {
        const CHECK: &str = "kvk_registry";
        if !self.kvk.is_configured() {
            return CheckResult::unavailable(CHECK, "KvK API key not configured");
        }
        match self.kvk.lookup(kvk_number).await {
            Ok(None) => CheckResult::failed(CHECK, format!("{kvk_number} is not registered")),
            Ok(Some(company)) if !company.active => {
                CheckResult::failed(CHECK, format!("{} is no longer active", company.trade_name))
            }
            Ok(Some(company)) => {
                let result = CheckResult::passed(CHECK, company.trade_name.clone());
                if names_match(&company.trade_name, &client.name) {
                    result
                } else {
                    result.with_detail(format!("registered as '{}'", company.trade_name))
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, kvk_number, "kvk lookup failed");
                CheckResult::unavailable(CHECK, e.to_string())
            }
        }
    }

    async fn vat_registry_check(&self, client: &Client, vat_id: &str) -> CheckResult {
        const CHECK: &str = "vat_registry";
        match self.vies.check(vat_id).await {
            Ok(check) if !check.valid => CheckResult::failed(CHECK, format!("{vat_id} is not a valid VAT id")),
            Err(RegistryError::InvalidInput(msg)) => CheckResult::failed(CHECK, msg),
            Ok(check) => {
                let result = CheckResult::passed(CHECK, vat_id);
                match check.name {
                    Some(name) if !names_match(&name, &client.name) => {
                        result.with_detail(format!("registered as '{name}'"))
                    }
                    _ => result,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, vat_id, "vies check failed");
                CheckResult::unavailable(CHECK, e.to_string())
            }
        }
    }

    /// Runs format checks, then registry lookups for identifiers that passed.
    pub async fn validate_client(&self, client: &Client) -> ValidationReport {
        let mut checks = format_checks(client);

        let kvk = checks
            .iter()
            .find(|c| c.check == "kvk_number" && c.status == CheckStatus::Passed)
            .and_then(|c| c.value.clone());
        let vat = checks
            .iter()
            .find(|c| c.check == "vat_id" && c.status == CheckStatus::Passed)
            .and_then(|c| c.value.clone());

        if let Some(kvk) = kvk {
            checks.push(self.kvk_registry_check(client, &kvk).await);
        }
        if let Some(vat) = vat {
            checks.push(self.vat_registry_check(client, &vat).await);
        }

        let report = ValidationReport::from_checks(checks);
        tracing::info!(
            client_id = client.id,
            passed = report.passed,
            warnings = report.warnings().count(),
            "client validated"
        );
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::models::{ApprovalStatus, OnboardingStatus};

    pub(crate) fn sample_client() -> Client {
        Client {
            id: 7,
            profile_id: 1,
            name: "Bakkerij de Vries".into(),
            email: "info@bakkerijdevries.nl".into(),
            phone: Some("06 12345678".into()),
            address: Some("Dorpsstraat 1".into()),
            postal_code: Some("1234ab".into()),
            city: Some("Utrecht".into()),
            country_code: "NL".into(),
            kvk_number: Some("69241327".into()),
            vat_id: Some("NL004495445B01".into()),
            iban: Some("NL91ABNA0417164300".into()),
            onboarding_status: OnboardingStatus::PendingValidation,
            approval_status: ApprovalStatus::NotRequested,
            total_invoiced: Decimal::ZERO,
            version: 1,
            confirmation_token_hash: None,
            confirmation_expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn status_of<'a>(checks: &'a [CheckResult], name: &str) -> &'a CheckResult {
        checks.iter().find(|c| c.check == name).unwrap()
    }

    #[test]
    fn dutch_client_format_checks_pass() {
        let checks = format_checks(&sample_client());
        assert!(checks.iter().all(|c| c.status == CheckStatus::Passed), "{checks:?}");
        assert_eq!(status_of(&checks, "postal_code").value.as_deref(), Some("1234 AB"));
        assert_eq!(status_of(&checks, "phone").value.as_deref(), Some("+31612345678"));
    }

    #[test]
    fn dutch_client_needs_kvk_but_not_vat() {
        let mut client = sample_client();
        client.kvk_number = None;
        client.vat_id = None;
        client.iban = None;
        let checks = format_checks(&client);
        assert_eq!(status_of(&checks, "kvk_number").status, CheckStatus::Failed);
        assert_eq!(status_of(&checks, "vat_id").status, CheckStatus::Skipped);
        assert_eq!(status_of(&checks, "iban").status, CheckStatus::Skipped);
        assert!(!ValidationReport::from_checks(checks).passed);
    }

    #[test]
    fn foreign_client_needs_vat_and_skips_dutch_checks() {
        let mut client = sample_client();
        client.country_code = "DE".into();
        client.kvk_number = None;
        client.postal_code = Some("10115".into());
        client.vat_id = None;
        let checks = format_checks(&client);
        assert_eq!(status_of(&checks, "kvk_number").status, CheckStatus::Skipped);
        assert_eq!(status_of(&checks, "postal_code").status, CheckStatus::Skipped);
        assert_eq!(status_of(&checks, "vat_id").status, CheckStatus::Failed);
    }

    #[test]
    fn unavailable_checks_are_warnings_not_failures() {
        let report = ValidationReport::from_checks(vec![
            CheckResult::passed("email", "a@b.nl"),
            CheckResult::unavailable("kvk_registry", "timeout"),
        ]);
        assert!(report.passed);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn name_comparison_ignores_case_and_punctuation() {
        assert!(names_match("Bakkerij De Vries B.V.", "bakkerij de vries bv"));
        assert!(!names_match("Bakkerij Jansen", "Bakkerij de Vries"));
    }

    #[test]
    fn report_serialises_checks_as_json_array() {
        let report = ValidationReport::from_checks(vec![CheckResult::failed("iban", "IBAN checksum is invalid")]);
        let json = report.to_json();
        assert_eq!(json[0]["check"], "iban");
        assert_eq!(json[0]["status"], "failed");
        assert!(json[0].get("value").is_none());
    }

    #[test]
    fn input_is_trimmed_and_normalised() {
        let input = NewClient {
            name: "  Studio Noord ".into(),
            email: "Hallo@Studio-Noord.NL".into(),
            phone: Some("020 1234567".into()),
            postal_code: Some(" 1011ab ".into()),
            country_code: None,
            kvk_number: Some("6924 1327".into()),
            vat_id: Some("".into()),
            iban: Some("nl91 abna 0417 1643 00".into()),
            ..Default::default()
        };
        let client = normalise_client(input).unwrap();
        assert_eq!(client.name, "Studio Noord");
        assert_eq!(client.country_code.as_deref(), Some("NL"));
        assert_eq!(client.postal_code.as_deref(), Some("1011 AB"));
        assert_eq!(client.kvk_number.as_deref(), Some("69241327"));
        assert_eq!(client.iban.as_deref(), Some("NL91ABNA0417164300"));
        assert_eq!(client.vat_id, None);
    }

    #[test]
    fn invalid_identifiers_are_kept_as_entered() {
        let input = NewClient {
            name: "X".into(),
            email: "x@example.nl".into(),
            iban: Some("NL00BANK0000000000".into()),
            ..Default::default()
        };
        let client = normalise_client(input).unwrap();
        assert_eq!(client.iban.as_deref(), Some("NL00BANK0000000000"));
    }

    #[test]
    fn name_and_email_are_required() {
        assert!(normalise_client(NewClient { email: "a@b.nl".into(), ..Default::default() }).is_err());
        assert!(normalise_client(NewClient { name: "A".into(), email: "nope".into(), ..Default::default() }).is_err());
    }

    #[test]
    fn reverse_charge_needs_a_foreign_eu_vat_id() {
        let mut client = sample_client();
        assert!(reverse_charge_vat_id(&client).is_err());

        client.country_code = "BE".into();
        client.vat_id = Some("BE0123456789".into());
        assert_eq!(reverse_charge_vat_id(&client).unwrap(), "BE0123456789");

        client.vat_id = None;
        assert!(reverse_charge_vat_id(&client).is_err());
    }
}
