//! Date localisation for the certificate's refuge date.

use chrono::{Datelike, NaiveDate};

use crate::error::CertificateError;
use crate::locale::Locale;

/// Offset between the Gregorian year and the Minguo (ROC) era year.
pub const MINGUO_OFFSET: i32 = 1911;

/// Format a stored `YYYY-MM-DD` date for display.
///
/// Unparseable input is returned unchanged, so a malformed record never
/// blocks generation. Empty input stays empty.
pub fn localize_date(raw: &str, locale: Locale) -> String {
    match try_localize_date(raw, locale) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Showing raw date: {e}");
            raw.to_string()
        }
    }
}

/// Like [`localize_date`] but reports unparseable input.
pub fn try_localize_date(raw: &str, locale: Locale) -> Result<String, CertificateError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| CertificateError::DateParse(raw.to_string()))?;

    Ok(match locale {
        Locale::Zh => format!(
            "{}年{}月{}日",
            minguo_year(date.year()),
            date.month(),
            date.day()
        ),
        Locale::En => date.format("%B %-d, %Y").to_string(),
    })
}

/// Era label for a Gregorian year. Years before the era's first year use
/// the customary 民國前 form instead of a zero or negative number.
pub fn minguo_year(gregorian: i32) -> String {
    let era = gregorian - MINGUO_OFFSET;
    if era >= 1 {
        format!("民國{era}")
    } else {
        format!("民國前{}", 1 - era)
    }
}
