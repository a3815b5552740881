//! Format-level validators for Dutch and EU business identifiers.
//!
//! Every validator returns the normalised value on success, which is what
//! gets stored.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("value is empty")]
    Empty,
    #[error("IBAN country {0} is not supported")]
    UnsupportedIbanCountry(String),
    #[error("IBAN for {country} must be {expected} characters, got {actual}")]
    IbanLength {
        country: String,
        expected: usize,
        actual: usize,
    },
    #[error("IBAN checksum is invalid")]
    IbanChecksum,
    #[error("VAT id has an unknown country prefix")]
    UnknownVatCountry,
    #[error("VAT id does not match the format for {0}")]
    VatPattern(String),
    #[error("Dutch VAT id checksum is invalid")]
    VatChecksum,
    #[error("KvK number must be exactly 8 digits")]
    KvkNumber,
    #[error("postal code must look like 1234 AB")]
    PostalCode,
    #[error("phone number is not a valid Dutch or international number")]
    Phone,
    #[error("email address is malformed")]
    Email,
    #[error("contains characters that are not allowed")]
    Characters,
}

fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

const IBAN_LENGTHS: &[(&str, usize)] = &[
    ("AT", 20), ("BE", 16), ("BG", 22), ("CH", 21), ("CY", 28), ("CZ", 24),
    ("DE", 22), ("DK", 18), ("EE", 20), ("ES", 24), ("FI", 18), ("FR", 27),
    ("GB", 22), ("GR", 27), ("HR", 21), ("HU", 28), ("IE", 22), ("IS", 26),
    ("IT", 27), ("LI", 21), ("LT", 20), ("LU", 20), ("LV", 21), ("MT", 31),
    ("NL", 18), ("NO", 15), ("PL", 28), ("PT", 25), ("RO", 24), ("SE", 24),
    ("SI", 19), ("SK", 24),
];

/// ISO 7064 mod-97 over an alphanumeric string, letters mapped A=10..Z=35.
fn mod97(value: &str) -> Option<u32> {
    let mut remainder: u32 = 0;
    for c in value.chars() {
        let n = c.to_digit(36)?;
        remainder = if n >= 10 {
            (remainder * 100 + n) % 97
        } else {
            (remainder * 10 + n) % 97
        };
    }
    Some(remainder)
}

/// Validates an IBAN and returns it without spaces, upper-cased.
pub fn validate_iban(value: &str) -> Result<String, FormatError> {
    let iban = compact(value);
    if iban.is_empty() {
        return Err(FormatError::Empty);
    }
    if !iban.chars().all(|c| c.is_ascii_alphanumeric()) || iban.len() < 5 {
        return Err(FormatError::Characters);
    }

    let country = &iban[..2];
    let expected = IBAN_LENGTHS
        .iter()
        .find(|(code, _)| *code == country)
        .map(|(_, len)| *len)
        .ok_or_else(|| FormatError::UnsupportedIbanCountry(country.to_string()))?;
    if iban.len() != expected {
        return Err(FormatError::IbanLength {
            country: country.to_string(),
            expected,
            actual: iban.len(),
        });
    }

    let rearranged = format!("{}{}", &iban[4..], &iban[..4]);
    match mod97(&rearranged) {
        Some(1) => Ok(iban),
        Some(_) => Err(FormatError::IbanChecksum),
        None => Err(FormatError::Characters),
    }
}

/// Groups an IBAN in blocks of four for display.
pub fn format_iban(iban: &str) -> String {
    iban.as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

const VAT_PATTERNS: &[(&str, &str)] = &[
    ("AT", r"^ATU\d{8}$"),
    ("BE", r"^BE[01]\d{9}$"),
    ("BG", r"^BG\d{9,10}$"),
    ("CY", r"^CY\d{8}[A-Z]$"),
    ("CZ", r"^CZ\d{8,10}$"),
    ("DE", r"^DE\d{9}$"),
    ("DK", r"^DK\d{8}$"),
    ("EE", r"^EE\d{9}$"),
    ("EL", r"^EL\d{9}$"),
    ("ES", r"^ES[A-Z0-9]\d{7}[A-Z0-9]$"),
    ("FI", r"^FI\d{8}$"),
    ("FR", r"^FR[A-HJ-NP-Z0-9]{2}\d{9}$"),
    ("HR", r"^HR\d{11}$"),
    ("HU", r"^HU\d{8}$"),
    ("IE", r"^IE(\d{7}[A-W][A-IW]?|\d[A-Z+*]\d{5}[A-W])$"),
    ("IT", r"^IT\d{11}$"),
    ("LT", r"^LT(\d{9}|\d{12})$"),
    ("LU", r"^LU\d{8}$"),
    ("LV", r"^LV\d{11}$"),
    ("MT", r"^MT\d{8}$"),
    ("NL", r"^NL\d{9}B\d{2}$"),
    ("PL", r"^PL\d{10}$"),
    ("PT", r"^PT\d{9}$"),
    ("RO", r"^RO\d{2,10}$"),
    ("SE", r"^SE\d{12}$"),
    ("SI", r"^SI\d{8}$"),
    ("SK", r"^SK\d{10}$"),
];

static VAT_REGEXES: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    VAT_PATTERNS
        .iter()
        .filter_map(|(country, pattern)| Regex::new(pattern).ok().map(|re| (*country, re)))
        .collect()
});

/// Legacy Dutch BTW-id check: weighted sum of the first eight digits mod 11
/// equals the ninth digit.
fn dutch_vat_mod11(digits: &[u32]) -> bool {
    let sum: u32 = digits[..8]
        .iter()
        .zip((2..=9).rev())
        .map(|(d, w)| d * w)
        .sum();
    let check = sum % 11;
    check < 10 && check == digits[8]
}

/// Check used for sole-proprietor BTW-ids issued since 2020: mod-97 over the
/// full id with letters substituted, as for an IBAN.
fn dutch_vat_mod97(vat: &str) -> bool {
    mod97(vat) == Some(1)
}

/// Validates an EU VAT id (`NL123456789B01`, `DE123456789`, ...).
pub fn validate_vat_id(value: &str) -> Result<String, FormatError> {
    let vat: String = compact(value).chars().filter(|c| *c != '.' && *c != '-').collect();
    if vat.is_empty() {
        return Err(FormatError::Empty);
    }
    if !vat.is_ascii() {
        return Err(FormatError::Characters);
    }
    if vat.len() < 4 {
        return Err(FormatError::UnknownVatCountry);
    }
    let country = &vat[..2];
    let regex = VAT_REGEXES.get(country).ok_or(FormatError::UnknownVatCountry)?;
    if !regex.is_match(&vat) {
        return Err(FormatError::VatPattern(country.to_string()));
    }

    if country == "NL" {
        let digits: Vec<u32> = vat[2..11].chars().filter_map(|c| c.to_digit(10)).collect();
        if !dutch_vat_mod11(&digits) && !dutch_vat_mod97(&vat) {
            return Err(FormatError::VatChecksum);
        }
    }

    Ok(vat)
}

/// Country prefix of a VAT id, `EL` mapped to Greece's ISO code `GR`.
pub fn vat_country(vat: &str) -> Option<&str> {
    match vat.get(..2)? {
        "EL" => Some("GR"),
        prefix if VAT_REGEXES.contains_key(prefix) => Some(prefix),
        _ => None,
    }
}

pub fn validate_kvk_number(value: &str) -> Result<String, FormatError> {
    let kvk: String = value.chars().filter(|c| !c.is_whitespace() && *c != '.').collect();
    if kvk.is_empty() {
        return Err(FormatError::Empty);
    }
    if kvk.len() != 8 || !kvk.chars().all(|c| c.is_ascii_digit()) {
        return Err(FormatError::KvkNumber);
    }
    Ok(kvk)
}

static POSTAL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9][0-9]{3})\s?([A-Za-z]{2})$").expect("static regex"));

/// Validates a Dutch postal code and returns it as `1234 AB`.
pub fn validate_postal_code(value: &str) -> Result<String, FormatError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FormatError::Empty);
    }
    let caps = POSTAL_CODE.captures(trimmed).ok_or(FormatError::PostalCode)?;
    let letters = caps[2].to_ascii_uppercase();
    if matches!(letters.as_str(), "SA" | "SD" | "SS") {
        return Err(FormatError::PostalCode);
    }
    Ok(format!("{} {}", &caps[1], letters))
}

/// Validates a phone number and returns it in E.164 form.
///
/// Dutch numbers may be written as `06 12345678`, `020-1234567`,
/// `+31 6 12345678` or `0031612345678`. Other international numbers are
/// accepted when written with a leading `+`.
pub fn validate_phone(value: &str) -> Result<String, FormatError> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
        .collect();
    if cleaned.is_empty() {
        return Err(FormatError::Empty);
    }

    let national = if let Some(rest) = cleaned.strip_prefix("+31") {
        rest
    } else if let Some(rest) = cleaned.strip_prefix("0031") {
        rest
    } else if let Some(rest) = cleaned.strip_prefix('+') {
        let digits_ok = rest.chars().all(|c| c.is_ascii_digit());
        if digits_ok && (7..=15).contains(&rest.len()) && !rest.starts_with('0') {
            return Ok(cleaned);
        }
        return Err(FormatError::Phone);
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        rest
    } else {
        return Err(FormatError::Phone);
    };

    // "+31 (0)6 ..." leaves a redundant trunk zero behind
    let national = national.strip_prefix('0').unwrap_or(national);
    if national.len() != 9 || !national.chars().all(|c| c.is_ascii_digit()) {
        return Err(FormatError::Phone);
    }
    Ok(format!("+31{national}"))
}

pub fn validate_email(value: &str) -> Result<String, FormatError> {
    let email = value.trim();
    if email.is_empty() {
        return Err(FormatError::Empty);
    }
    let (local, domain) = email.split_once('@').ok_or(FormatError::Email)?;
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty());
    if !well_formed {
        return Err(FormatError::Email);
    }
    Ok(format!("{local}@{}", domain.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iban_accepts_valid_numbers_and_normalises() {
        assert_eq!(validate_iban("nl91 abna 0417 1643 00").unwrap(), "NL91ABNA0417164300");
        assert!(validate_iban("DE89370400440532013000").is_ok());
        assert!(validate_iban("BE68539007547034").is_ok());
        assert!(validate_iban("GB82 WEST 1234 5698 7654 32").is_ok());
    }

    #[test]
    fn iban_rejects_bad_checksum_length_and_country() {
        assert_eq!(validate_iban("NL91ABNA0417164301"), Err(FormatError::IbanChecksum));
        assert!(matches!(
            validate_iban("NL91ABNA041716430"),
            Err(FormatError::IbanLength { expected: 18, actual: 17, .. })
        ));
        assert!(matches!(validate_iban("XX00123412341234"), Err(FormatError::UnsupportedIbanCountry(_))));
        assert_eq!(validate_iban("   "), Err(FormatError::Empty));
        assert_eq!(validate_iban("NL91-ABNA-0417"), Err(FormatError::Characters));
    }

    #[test]
    fn iban_is_grouped_for_display() {
        assert_eq!(format_iban("NL91ABNA0417164300"), "NL91 ABNA 0417 1643 00");
    }

    #[test]
    fn dutch_vat_accepts_either_checksum() {
        // mod-11 only
        assert_eq!(validate_vat_id("NL004495445B01").unwrap(), "NL004495445B01");
        // mod-97 only
        assert!(validate_vat_id("nl0000.99998.b57").is_ok());
        assert!(validate_vat_id("NL123456789B13").is_ok());
    }

    #[test]
    fn dutch_vat_rejects_failed_checksums() {
        assert_eq!(validate_vat_id("NL123456780B01"), Err(FormatError::VatChecksum));
        assert_eq!(validate_vat_id("NL004495446B01"), Err(FormatError::VatChecksum));
        assert!(matches!(validate_vat_id("NL12345678B01"), Err(FormatError::VatPattern(_))));
    }

    #[test]
    fn other_eu_vat_ids_are_pattern_checked() {
        assert!(validate_vat_id("DE123456789").is_ok());
        assert!(validate_vat_id("BE0123456789").is_ok());
        assert!(validate_vat_id("ATU12345678").is_ok());
        assert!(matches!(validate_vat_id("DE12345678"), Err(FormatError::VatPattern(_))));
        assert_eq!(validate_vat_id("US123456789"), Err(FormatError::UnknownVatCountry));
    }

    #[test]
    fn vat_country_maps_greece() {
        assert_eq!(vat_country("EL123456789"), Some("GR"));
        assert_eq!(vat_country("DE123456789"), Some("DE"));
        assert_eq!(vat_country("ZZ1"), None);
    }

    #[test]
    fn kvk_number_is_eight_digits() {
        assert_eq!(validate_kvk_number("6924 1327").unwrap(), "69241327");
        assert_eq!(validate_kvk_number("1234567"), Err(FormatError::KvkNumber));
        assert_eq!(validate_kvk_number("1234567A"), Err(FormatError::KvkNumber));
    }

    #[test]
    fn postal_codes() {
        assert_eq!(validate_postal_code("1012ab").unwrap(), "1012 AB");
        assert_eq!(validate_postal_code(" 3511 LX ").unwrap(), "3511 LX");
        assert_eq!(validate_postal_code("0123 AB"), Err(FormatError::PostalCode));
        assert_eq!(validate_postal_code("1234 SS"), Err(FormatError::PostalCode));
        assert_eq!(validate_postal_code("1234 A"), Err(FormatError::PostalCode));
    }

    #[test]
    fn phone_numbers_normalise_to_e164() {
        assert_eq!(validate_phone("06-12345678").unwrap(), "+31612345678");
        assert_eq!(validate_phone("020 123 4567").unwrap(), "+31201234567");
        assert_eq!(validate_phone("+31 (0)6 12345678").unwrap(), "+31612345678");
        assert_eq!(validate_phone("0031612345678").unwrap(), "+31612345678");
        assert_eq!(validate_phone("+49 30 123456").unwrap(), "+4930123456");
        assert_eq!(validate_phone("0612345"), Err(FormatError::Phone));
        assert_eq!(validate_phone("612345678"), Err(FormatError::Phone));
    }

    #[test]
    fn email_addresses() {
        assert_eq!(validate_email(" Jan@Example.NL ").unwrap(), "Jan@example.nl");
        assert_eq!(validate_email("jan@localhost"), Err(FormatError::Email));
        assert_eq!(validate_email("jan@@example.nl"), Err(FormatError::Email));
        assert_eq!(validate_email("jan example@x.nl"), Err(FormatError::Email));
    }
}
