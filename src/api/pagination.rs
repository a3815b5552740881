use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ApiError;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// `?page=&per_page=` query parameters, 1-based.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Pagination {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: &Pagination, total: i64) -> Self {
        Self {
            items,
            page: pagination.page(),
            per_page: pagination.per_page(),
            total,
        }
    }
}

/// Parses an optional filter value; blank means no filter.
pub fn parse_filter<T>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|e| ApiError::Validation(format!("invalid {name} filter: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OnboardingStatus;

    #[test]
    fn defaults_and_clamping() {
        let p = Pagination::default();
        assert_eq!((p.page(), p.per_page(), p.offset()), (1, 20, 0));

        let p = Pagination { page: Some(3), per_page: Some(500) };
        assert_eq!(p.per_page(), 100);
        assert_eq!(p.offset(), 200);

        let p = Pagination { page: Some(0), per_page: Some(0) };
        assert_eq!((p.page(), p.per_page()), (1, 1));
    }

    #[test]
    fn filters_parse_status_labels() {
        let parsed: Option<OnboardingStatus> = parse_filter("onboarding_status", Some("admin_review")).unwrap();
        assert_eq!(parsed, Some(OnboardingStatus::AdminReview));
        let blank: Option<OnboardingStatus> = parse_filter("onboarding_status", Some(" ")).unwrap();
        assert_eq!(blank, None);
        assert!(parse_filter::<OnboardingStatus>("onboarding_status", Some("bogus")).is_err());
        assert!(parse_filter::<i32>("client_id", Some("x")).is_err());
    }
}
