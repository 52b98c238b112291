//! Raster export channel for the compact pathway.
//!
//! Both exports capture from the render host's frozen layout. The
//! paginated document captures every sheet in order, one at a time, and
//! only assembles the PDF once all captures succeeded.

use std::path::{Path, PathBuf};

use tiny_skia::Pixmap;

use crate::error::CertificateError;
use crate::host::RenderHost;
use crate::locale::{LabelTable, Locale};
use crate::raster::{capture_sheet, encode_png};
use crate::render::{render_bitmap_pdf, BitmapPage};
use crate::template::{PageProfile, SheetKind};

/// Turns one sheet of a ready host into a bitmap.
pub trait SheetCapture {
    fn capture(&self, host: &RenderHost, index: usize, scale: f32) -> Result<Pixmap, CertificateError>;
}

/// Paints sheets with `tiny-skia`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkiaCapture;

impl SheetCapture for SkiaCapture {
    fn capture(&self, host: &RenderHost, index: usize, scale: f32) -> Result<Pixmap, CertificateError> {
        let capture_err = |reason: String| CertificateError::Capture { index, reason };
        let layout = host
            .layout()
            .ok_or_else(|| capture_err("render host is not ready".to_string()))?;
        let sheet = layout
            .sheets
            .get(index)
            .ok_or_else(|| capture_err(format!("document has {} sheets", layout.sheets.len())))?;
        capture_sheet(sheet, host.fonts(), host.images(), scale).map_err(capture_err)
    }
}

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// Write the artifact into `dir`, creating it if needed.
    pub async fn save_into(&self, dir: &Path) -> Result<PathBuf, CertificateError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        log::info!("Saved {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// `<name>_<suffix>` with path separators removed. A blank name leaves just
/// the suffix.
pub fn artifact_file_stem(name: &str, locale: Locale, labels: &LabelTable) -> String {
    let suffix = labels.get(locale, "fileSuffix");
    let name: String = name
        .trim()
        .chars()
        .filter(|c| !matches!(c, '/' | '\\') && !c.is_control())
        .collect();
    if name.is_empty() {
        suffix.to_string()
    } else {
        format!("{name}_{suffix}")
    }
}

/// Where one page of a paginated export came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRecord {
    pub sheet_index: usize,
    pub kind: SheetKind,
    pub profile: PageProfile,
    pub px_width: u32,
    pub px_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedExport {
    /// One entry per page, in page order.
    pub pages: Vec<PageRecord>,
    pub artifact: ExportArtifact,
}

pub struct RasterExportChannel<'a, C: SheetCapture + ?Sized> {
    capture: &'a C,
    scale: f32,
}

impl<'a, C: SheetCapture + ?Sized> RasterExportChannel<'a, C> {
    /// `scale` is device pixels per point, supersampling included.
    pub fn new(capture: &'a C, scale: f32) -> Self {
        Self { capture, scale }
    }

    /// The cover spread as one PNG.
    pub fn export_image(&self, host: &RenderHost, file_stem: &str) -> Result<ExportArtifact, CertificateError> {
        let pixmap = self.capture.capture(host, 0, self.scale)?;
        let bytes = encode_png(&pixmap).map_err(|reason| CertificateError::Capture { index: 0, reason })?;
        log::debug!("Exported cover image {}x{}px", pixmap.width(), pixmap.height());
        Ok(ExportArtifact {
            file_name: format!("{file_stem}.png"),
            media_type: "image/png",
            bytes,
        })
    }

    /// Every sheet, in order, as one page each. The first failed capture
    /// aborts the export and nothing is assembled.
    pub async fn export_document(
        &self,
        host: &RenderHost,
        file_stem: &str,
    ) -> Result<PaginatedExport, CertificateError> {
        let sheets = host.spec().sheets();
        let mut captured: Vec<(PageRecord, Vec<u8>)> = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let pixmap = self.capture.capture(host, sheet.index, self.scale)?;
            let png = encode_png(&pixmap).map_err(|reason| CertificateError::Capture {
                index: sheet.index,
                reason,
            })?;
            captured.push((
                PageRecord {
                    sheet_index: sheet.index,
                    kind: sheet.kind,
                    profile: sheet.profile,
                    px_width: pixmap.width(),
                    px_height: pixmap.height(),
                },
                png,
            ));
            log::debug!("Captured page {} of {}", captured.len(), sheets.len());
            tokio::task::yield_now().await;
        }

        let pages: Vec<BitmapPage<'_>> = captured
            .iter()
            .map(|(record, png)| BitmapPage {
                profile: record.profile,
                png,
                px_width: record.px_width,
                px_height: record.px_height,
            })
            .collect();
        let bytes = render_bitmap_pdf(&host.spec().title, &pages).map_err(|reason| {
            CertificateError::Capture {
                index: captured.len(),
                reason,
            }
        })?;

        Ok(PaginatedExport {
            pages: captured.into_iter().map(|(record, _)| record).collect(),
            artifact: ExportArtifact {
                file_name: format!("{file_stem}.pdf"),
                media_type: "application/pdf",
                bytes,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    use crate::config::CertificateConfig;
    use crate::lifecycle::{HostSurface, SurfaceRegistry};
    use crate::record::RecipientRecord;
    use crate::template::compose;

    async fn ready_host(registry: &SurfaceRegistry, dir: &Path) -> RenderHost {
        let spec = compose(
            &RecipientRecord {
                name: "Jane".into(),
                refuge_date: "2024-01-15".into(),
                ..Default::default()
            },
            Locale::En,
            &LabelTable::default(),
        );
        let config = CertificateConfig {
            asset_dir: dir.to_path_buf(),
            ..Default::default()
        };
        let mut host = RenderHost::mount(registry, HostSurface::foreground(), spec, &config).unwrap();
        host.ready(Duration::from_secs(5)).await.unwrap();
        host
    }

    struct FailingAt {
        index: usize,
        calls: Cell<usize>,
    }

    impl SheetCapture for FailingAt {
        fn capture(&self, host: &RenderHost, index: usize, scale: f32) -> Result<Pixmap, CertificateError> {
            self.calls.set(self.calls.get() + 1);
            if index == self.index {
                return Err(CertificateError::Capture {
                    index,
                    reason: "injected".into(),
                });
            }
            SkiaCapture.capture(host, index, scale)
        }
    }

    #[test]
    fn file_stem_strips_separators() {
        let labels = LabelTable::default();
        assert_eq!(artifact_file_stem("陳小明", Locale::Zh, &labels), "陳小明_皈依證");
        assert_eq!(
            artifact_file_stem(" a/b\\c ", Locale::En, &labels),
            "abc_refuge_certificate"
        );
        assert_eq!(artifact_file_stem("", Locale::Zh, &labels), "皈依證");
    }

    #[tokio::test]
    async fn image_export_is_the_cover_spread() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SurfaceRegistry::new();
        let host = ready_host(&registry, dir.path()).await;
        let channel = RasterExportChannel::new(&SkiaCapture, 0.5);

        let artifact = channel.export_image(&host, "Jane_refuge_certificate").unwrap();
        assert_eq!(artifact.file_name, "Jane_refuge_certificate.png");
        assert_eq!(artifact.media_type, "image/png");
        assert_eq!(&artifact.bytes[..4], b"\x89PNG");

        let saved = artifact.save_into(&dir.path().join("out")).await.unwrap();
        assert_eq!(std::fs::read(saved).unwrap(), artifact.bytes);
    }

    #[tokio::test]
    async fn document_has_one_page_per_sheet_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SurfaceRegistry::new();
        let host = ready_host(&registry, dir.path()).await;
        let channel = RasterExportChannel::new(&SkiaCapture, 0.5);

        let export = channel.export_document(&host, "Jane").await.unwrap();
        let order: Vec<_> = export.pages.iter().map(|p| p.sheet_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        for page in &export.pages {
            let aspect = page.px_width as f32 / page.px_height as f32;
            assert!((aspect - page.profile.aspect()).abs() < 0.02, "{page:?}");
        }
        assert!(export.artifact.bytes.starts_with(b"%PDF"));
        assert_eq!(export.artifact.file_name, "Jane.pdf");
    }

    #[tokio::test]
    async fn failed_capture_aborts_document() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SurfaceRegistry::new();
        let host = ready_host(&registry, dir.path()).await;
        let capture = FailingAt {
            index: 3,
            calls: Cell::new(0),
        };
        let channel = RasterExportChannel::new(&capture, 0.5);

        let err = channel.export_document(&host, "Jane").await.unwrap_err();
        assert!(matches!(err, CertificateError::Capture { index: 3, .. }), "{err}");
        // Sheets after the failing one are never captured.
        assert_eq!(capture.calls.get(), 4);
    }
}
