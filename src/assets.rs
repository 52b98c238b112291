//! Asset references and loading.
//!
//! Sheets reference images as `asset:<name>` (resolved against the
//! configured asset directory) or as inline `data:<mime>;base64,...` URIs.
//! Typefaces use the same reference forms. Loading is asynchronous so the
//! render host can wait on all of them with one bounded deadline.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use crate::fonts::FontManager;
use crate::layout::ImageSizes;
use crate::markup::{Element, Tag};

/// Where an asset's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// A file name inside the asset directory.
    Named(String),
    /// Bytes decoded from a data URI.
    Inline(Vec<u8>),
}

impl AssetSource {
    pub fn parse(src: &str) -> Result<Self, String> {
        if let Some(name) = src.strip_prefix("asset:") {
            let name = name.trim();
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(format!("Invalid asset name {name:?}"));
            }
            return Ok(AssetSource::Named(name.to_string()));
        }
        if src.starts_with("data:") {
            return parse_data_uri(src).map(AssetSource::Inline);
        }
        let preview: String = src.chars().take(80).collect();
        Err(format!(
            "Unsupported asset reference {preview:?} (expected `asset:<name>` or a base64 data URI)"
        ))
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = &src["data:".len()..];
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "Invalid data URI: missing `,` separator".to_string())?;
    if !header.contains(";base64") {
        return Err("Only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("Base64 decode error: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AssetKind {
    Font,
    Image,
}

/// One asset the document needs before it can be captured.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssetRequest {
    pub kind: AssetKind,
    pub src: String,
}

/// Every distinct asset referenced by `sheets` plus the configured fonts,
/// fonts first, in a stable order.
pub fn collect_requests<'a>(
    sheets: impl IntoIterator<Item = &'a Element>,
    fonts: &[String],
) -> Vec<AssetRequest> {
    let mut set = BTreeSet::new();
    for src in fonts {
        set.insert(AssetRequest {
            kind: AssetKind::Font,
            src: src.clone(),
        });
    }
    for sheet in sheets {
        sheet.walk(&mut |e| {
            if e.tag == Tag::Img {
                if let Some(src) = e.attr("src").filter(|s| !s.is_empty()) {
                    set.insert(AssetRequest {
                        kind: AssetKind::Image,
                        src: src.to_string(),
                    });
                }
            }
        });
    }
    set.into_iter().collect()
}

/// Read the bytes behind one reference.
pub async fn fetch(src: &str, asset_dir: &Path) -> Result<Vec<u8>, String> {
    match AssetSource::parse(src)? {
        AssetSource::Inline(bytes) => Ok(bytes),
        AssetSource::Named(name) => {
            let path = asset_dir.join(&name);
            tokio::fs::read(&path)
                .await
                .map_err(|e| format!("{}: {e}", path.display()))
        }
    }
}

/// A decoded raster image.
#[derive(Clone)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    /// Straight-alpha RGBA8 pixels.
    pub rgba: Vec<u8>,
    /// The original encoded bytes, embedded as-is in vector output.
    pub encoded: Vec<u8>,
}

impl std::fmt::Debug for LoadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoded", &self.encoded.len())
            .finish()
    }
}

pub fn decode_image(bytes: Vec<u8>) -> Result<LoadedImage, String> {
    let img = ::image::load_from_memory(&bytes).map_err(|e| format!("decode error: {e}"))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err("image has no pixels".to_string());
    }
    Ok(LoadedImage {
        width,
        height,
        rgba: rgba.into_raw(),
        encoded: bytes,
    })
}

/// Everything that finished loading before readiness resolved.
#[derive(Debug, Default)]
pub struct LoadedAssets {
    pub images: BTreeMap<String, LoadedImage>,
    pub fonts: FontManager,
    /// References that failed; their images are hidden.
    pub failed: Vec<String>,
}

impl LoadedAssets {
    /// Record the outcome of one fetch. Failures are logged and remembered,
    /// never propagated.
    pub fn accept(&mut self, request: &AssetRequest, result: Result<Vec<u8>, String>) {
        let outcome = result.and_then(|bytes| match request.kind {
            AssetKind::Image => decode_image(bytes).map(|img| {
                self.images.insert(request.src.clone(), img);
            }),
            AssetKind::Font => self.fonts.load_font(&request.src, bytes),
        });
        match outcome {
            Ok(()) => log::debug!("Loaded {:?} {}", request.kind, request.src),
            Err(e) => {
                log::warn!("Asset {} failed to load, continuing without it: {e}", request.src);
                self.failed.push(request.src.clone());
            }
        }
    }

    pub fn image_sizes(&self) -> ImageSizes {
        self.images
            .iter()
            .map(|(src, img)| (src.clone(), (img.width, img.height)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse_markup, Node};

    pub(crate) fn tiny_png() -> Vec<u8> {
        let img = ::image::RgbaImage::from_pixel(4, 2, ::image::Rgba([200, 30, 30, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ::image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn parses_reference_forms() {
        assert_eq!(
            AssetSource::parse("asset:seal.png").unwrap(),
            AssetSource::Named("seal.png".into())
        );
        let uri = format!("data:image/png;base64,{}", BASE64_STD.encode(b"abc"));
        assert_eq!(AssetSource::parse(&uri).unwrap(), AssetSource::Inline(b"abc".to_vec()));
        assert!(AssetSource::parse("asset:../etc/passwd").is_err());
        assert!(AssetSource::parse("https://example.com/seal.png").is_err());
        assert!(AssetSource::parse("data:image/png,raw").is_err());
    }

    #[test]
    fn collects_distinct_requests_fonts_first() {
        let nodes = parse_markup(
            r#"<sheet><img src="asset:seal.png"><div><img src="asset:seal.png"><img src="asset:b.png"></div></sheet>"#,
        )
        .unwrap();
        let Node::Element(sheet) = &nodes[0] else { panic!() };
        let requests = collect_requests([sheet], &["asset:font.ttf".to_string()]);
        let srcs: Vec<_> = requests.iter().map(|r| r.src.as_str()).collect();
        assert_eq!(srcs, vec!["asset:font.ttf", "asset:b.png", "asset:seal.png"]);
    }

    #[tokio::test]
    async fn fetch_reads_asset_dir_and_failures_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("seal.png"), tiny_png()).unwrap();

        let mut loaded = LoadedAssets::default();
        for src in ["asset:seal.png", "asset:missing.png"] {
            let request = AssetRequest {
                kind: AssetKind::Image,
                src: src.to_string(),
            };
            let result = fetch(src, dir.path()).await;
            loaded.accept(&request, result);
        }
        assert_eq!(loaded.image_sizes().get("asset:seal.png"), Some(&(4, 2)));
        assert_eq!(loaded.failed, vec!["asset:missing.png".to_string()]);
    }
}
