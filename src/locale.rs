//! Display locales and the label table consumed by the composer and the
//! session boundary.
//!
//! The table is owned outside this crate; we ship built-in defaults and
//! accept a JSON override of the form `{ "zh": { key: text }, "en": { .. } }`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CertificateError;

/// One of the two supported display-language / date-formatting profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Traditional Chinese, Minguo-era dates.
    #[default]
    Zh,
    /// English, long Gregorian dates.
    En,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Locale::Zh => "zh",
            Locale::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-tw" | "zh_tw" => Ok(Locale::Zh),
            "en" | "en-us" | "en_us" => Ok(Locale::En),
            other => Err(format!("unsupported locale {other:?} (expected zh or en)")),
        }
    }
}

const ZH_DEFAULTS: &[(&str, &str)] = &[
    ("organizationName", "噶陀仁珍千寶佛學會"),
    ("certificateTitle", "皈依證"),
    ("certRecipient", "皈依者(Recipient):"),
    ("certDate", "皈依日期(Date):"),
    ("certPlace", "皈依地點(Place):"),
    ("certDharmaName", "法名(Dharma Name):"),
    ("certDharmaNamePhonetic", "法名音譯(Phonetic Transcription):"),
    ("certDharmaNameMeaning", "法名譯意(Translation):"),
    ("preparingPrint", "正在準備列印..."),
    ("printFullCertificate", "列印完整皈依證"),
    ("saveImage", "儲存圖片"),
    ("saveDocument", "儲存 PDF"),
    ("printError", "準備列印皈依證時發生錯誤，請重試。"),
    ("exportError", "匯出皈依證時發生錯誤，請重試。"),
    ("generationError", "產生皈依證時發生錯誤，請重試。"),
    ("fileSuffix", "皈依證"),
];

const EN_DEFAULTS: &[(&str, &str)] = &[
    ("organizationName", "Kathog Rigzin Chenpo Dharma Association"),
    ("certificateTitle", "Refuge Certificate"),
    ("certRecipient", "Recipient (皈依者):"),
    ("certDate", "Date (皈依日期):"),
    ("certPlace", "Place (皈依地點):"),
    ("certDharmaName", "Dharma Name (法名):"),
    ("certDharmaNamePhonetic", "Phonetic Transcription (法名音譯):"),
    ("certDharmaNameMeaning", "Translation (法名譯意):"),
    ("preparingPrint", "Preparing to print..."),
    ("printFullCertificate", "Print Full Certificate"),
    ("saveImage", "Save Image"),
    ("saveDocument", "Save PDF"),
    (
        "printError",
        "An error occurred while preparing the certificate for printing. Please try again.",
    ),
    (
        "exportError",
        "An error occurred while exporting the certificate. Please try again.",
    ),
    (
        "generationError",
        "An error occurred while generating the certificate. Please try again.",
    ),
    ("fileSuffix", "refuge_certificate"),
];

/// Localized strings keyed by locale, then by label key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelTable {
    #[serde(default)]
    zh: BTreeMap<String, String>,
    #[serde(default)]
    en: BTreeMap<String, String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        let collect = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Self {
            zh: collect(ZH_DEFAULTS),
            en: collect(EN_DEFAULTS),
        }
    }
}

impl LabelTable {
    /// Look up a label; unknown keys render as the key itself.
    pub fn get<'a>(&'a self, locale: Locale, key: &'a str) -> &'a str {
        let table = match locale {
            Locale::Zh => &self.zh,
            Locale::En => &self.en,
        };
        table.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Parse a JSON table and layer it over the built-in defaults.
    pub fn from_json(json: &str) -> Result<Self, CertificateError> {
        let overrides: LabelTable = serde_json::from_str(json)
            .map_err(|e| CertificateError::Config(format!("label table: {e}")))?;
        let mut table = Self::default();
        table.zh.extend(overrides.zh);
        table.en.extend(overrides.en);
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, CertificateError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
