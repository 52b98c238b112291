//! Runtime configuration: serde defaults, optionally overridden by a TOML
//! file and then by CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::Breakpoints;
use crate::error::CertificateError;

const DEFAULT_ASSET_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PRINT_GRACE_MS: u64 = 3_000;
const DEFAULT_TEARDOWN_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SUPERSAMPLE: f32 = 2.0;
const DEFAULT_CAPTURE_DPI: f32 = 96.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CertificateConfig {
    /// Directory that `asset:<name>` references resolve against.
    pub asset_dir: PathBuf,
    /// Typeface references, in fallback order.
    pub fonts: Vec<String>,
    pub seal: String,
    pub imagery: String,

    pub asset_timeout_ms: u64,
    pub print_grace_ms: u64,
    pub teardown_timeout_ms: u64,

    /// Bitmap resolution multiplier applied on top of `capture_dpi`.
    pub supersample: f32,
    pub capture_dpi: f32,

    pub breakpoints: Breakpoints,
    pub spooler: SpoolerConfig,
    /// Where saved exports land.
    pub out_dir: PathBuf,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
            fonts: Vec::new(),
            seal: "asset:seal.png".to_string(),
            imagery: "asset:three-jewels.png".to_string(),
            asset_timeout_ms: DEFAULT_ASSET_TIMEOUT_MS,
            print_grace_ms: DEFAULT_PRINT_GRACE_MS,
            teardown_timeout_ms: DEFAULT_TEARDOWN_TIMEOUT_MS,
            supersample: DEFAULT_SUPERSAMPLE,
            capture_dpi: DEFAULT_CAPTURE_DPI,
            breakpoints: Breakpoints::default(),
            spooler: SpoolerConfig::default(),
            out_dir: PathBuf::from("."),
        }
    }
}

/// Print spooler selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpoolerConfig {
    /// Pipe the print stream into a command (`lp` by default).
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Drop the print stream into a spool directory.
    Directory { path: PathBuf },
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        SpoolerConfig::Command {
            program: "lp".to_string(),
            args: Vec::new(),
        }
    }
}

impl CertificateConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, CertificateError> {
        let config: Self =
            toml::from_str(text).map_err(|e| CertificateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CertificateError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| CertificateError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), CertificateError> {
        if !(1.0..=4.0).contains(&self.supersample) {
            return Err(CertificateError::Config(format!(
                "supersample must be between 1 and 4, got {}",
                self.supersample
            )));
        }
        if !(self.capture_dpi.is_finite() && self.capture_dpi > 0.0) {
            return Err(CertificateError::Config("capture_dpi must be positive".into()));
        }
        if self.breakpoints.compact_below_px > self.breakpoints.touch_compact_below_px {
            return Err(CertificateError::Config(
                "breakpoints.compact_below_px exceeds touch_compact_below_px".into(),
            ));
        }
        Ok(())
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    pub fn print_grace(&self) -> Duration {
        Duration::from_millis(self.print_grace_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Device pixels per PDF point for captures.
    pub fn capture_scale(&self) -> f32 {
        self.capture_dpi / 72.0 * self.supersample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = CertificateConfig::default();
        assert_eq!(c.asset_timeout(), Duration::from_secs(5));
        assert_eq!(c.print_grace(), Duration::from_secs(3));
        assert_eq!(c.teardown_timeout(), Duration::from_secs(2));
        assert_eq!(c.supersample, 2.0);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = CertificateConfig::from_toml_str(
            r#"
            asset_dir = "/srv/cert-assets"
            fonts = ["asset:NotoSerifTC-Regular.otf"]
            supersample = 3.0

            [breakpoints]
            compact_below_px = 600

            [spooler]
            kind = "directory"
            path = "/var/spool/certs"
            "#,
        )
        .unwrap();
        assert_eq!(c.asset_dir, PathBuf::from("/srv/cert-assets"));
        assert_eq!(c.breakpoints.compact_below_px, 600);
        assert_eq!(c.breakpoints.touch_compact_below_px, 1024);
        assert_eq!(
            c.spooler,
            SpoolerConfig::Directory {
                path: PathBuf::from("/var/spool/certs")
            }
        );
        assert_eq!(c.print_grace_ms, 3_000);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(CertificateConfig::from_toml_str("supersample = 8.0").is_err());
        assert!(CertificateConfig::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn rejects_non_finite_dpi() {
        for dpi in [f32::NAN, f32::INFINITY, 0.0, -96.0] {
            let c = CertificateConfig {
                capture_dpi: dpi,
                ..Default::default()
            };
            assert!(c.validate().is_err(), "{dpi}");
        }
        assert!(CertificateConfig::from_toml_str("capture_dpi = nan").is_err());
    }
}
