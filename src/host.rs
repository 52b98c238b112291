//! Render host – the isolated surface a composed certificate is mounted on.
//!
//! Mounting parses every sheet. [`RenderHost::ready`] then loads each
//! referenced image and configured typeface, bounded by one deadline, and
//! computes the layout of every sheet with whatever loaded. Print and
//! export read only from the host, never from the caller's UI.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::assets::{collect_requests, fetch, AssetRequest, LoadedAssets, LoadedImage};
use crate::config::CertificateConfig;
use crate::error::CertificateError;
use crate::fonts::FontManager;
use crate::layout::layout_sheet;
use crate::layout_config::DocumentLayout;
use crate::lifecycle::{HostSurface, PendingInteraction, SurfaceId, SurfaceLease, SurfaceRegistry};
use crate::markup::{parse_markup, Element, Node, Tag};
use crate::template::DocumentSpec;

/// Outcome of the readiness wait.
#[derive(Debug)]
pub struct ReadyReport {
    pub loaded: usize,
    pub failed: Vec<String>,
    /// Set when the deadline passed with assets still pending.
    pub timeout: Option<CertificateError>,
    /// No typeface loaded. Text was laid out with heuristic metrics; the
    /// print stream falls back to a Latin-1 builtin font and raster
    /// captures carry no text.
    pub missing_typefaces: bool,
}

pub struct RenderHost {
    surface: HostSurface,
    lease: SurfaceLease,
    spec: DocumentSpec,
    roots: Vec<Element>,
    asset_dir: PathBuf,
    font_refs: Vec<String>,
    assets: LoadedAssets,
    layout: Option<DocumentLayout>,
    pending: Option<PendingInteraction>,
}

impl std::fmt::Debug for RenderHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHost")
            .field("surface", &self.surface)
            .field("surface_id", &self.lease.id())
            .field("sheets", &self.roots.len())
            .field("ready", &self.layout.is_some())
            .finish()
    }
}

impl RenderHost {
    /// Attach a surface and inject the document. On failure the surface is
    /// detached again before returning.
    pub fn mount(
        registry: &SurfaceRegistry,
        surface: HostSurface,
        spec: DocumentSpec,
        config: &CertificateConfig,
    ) -> Result<Self, CertificateError> {
        let mut lease = registry.attach(&surface);
        let roots = match parse_sheets(&spec) {
            Ok(roots) => roots,
            Err(e) => {
                lease.release();
                return Err(e);
            }
        };
        log::debug!(
            "Mounted {} sheets on {} surface #{}",
            roots.len(),
            surface.name(),
            lease.id()
        );
        Ok(Self {
            surface,
            lease,
            spec,
            roots,
            asset_dir: config.asset_dir.clone(),
            font_refs: config.fonts.clone(),
            assets: LoadedAssets::default(),
            layout: None,
            pending: None,
        })
    }

    /// Wait until every asset has settled or `timeout` elapses, then lay
    /// out all sheets. An elapsed deadline is reported, not raised.
    pub async fn ready(&mut self, timeout: Duration) -> Result<ReadyReport, CertificateError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let requests = collect_requests(&self.roots, &self.font_refs);
        let total = requests.len();

        let mut in_flight: FuturesUnordered<_> = requests
            .into_iter()
            .map(|request| {
                let dir = self.asset_dir.clone();
                async move {
                    let result = fetch(&request.src, &dir).await;
                    (request, result)
                }
            })
            .collect();

        // Completion order varies; results are applied in request order so
        // the font fallback list stays stable.
        let mut settled: BTreeMap<AssetRequest, Result<Vec<u8>, String>> = BTreeMap::new();
        let mut timed_out = None;
        loop {
            match tokio::time::timeout_at(deadline, in_flight.next()).await {
                Ok(Some((request, result))) => {
                    settled.insert(request, result);
                }
                Ok(None) => break,
                Err(_) => {
                    let e = CertificateError::AssetLoadTimeout {
                        pending: in_flight.len(),
                        waited: timeout,
                    };
                    log::warn!("{e}; continuing with the assets that loaded");
                    timed_out = Some(e);
                    break;
                }
            }
        }

        let mut assets = LoadedAssets::default();
        for (request, result) in settled {
            assets.accept(&request, result);
        }
        let missing_typefaces = !assets.fonts.has_real_fonts();
        if missing_typefaces {
            log::warn!(
                "No typefaces loaded ({} configured); Han and Tibetan text will not render",
                self.font_refs.len()
            );
        }
        self.assets = assets;
        self.layout = Some(self.compute_layout()?);

        let loaded = self.assets.images.len() + self.assets.fonts.faces().len();
        log::debug!("{loaded} of {total} assets loaded");
        Ok(ReadyReport {
            loaded,
            failed: self.assets.failed.clone(),
            timeout: timed_out,
            missing_typefaces,
        })
    }

    fn compute_layout(&self) -> Result<DocumentLayout, CertificateError> {
        let sizes = self.assets.image_sizes();
        let sheets = self
            .spec
            .sheets()
            .iter()
            .zip(&self.roots)
            .map(|(sheet, root)| {
                layout_sheet(
                    root,
                    sheet.index,
                    sheet.kind,
                    sheet.profile,
                    &self.assets.fonts,
                    &sizes,
                )
                .map_err(|e| {
                    CertificateError::RenderHostCreation(format!("layout of sheet {}: {e}", sheet.index))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DocumentLayout {
            title: self.spec.title.clone(),
            sheets,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.layout.is_some()
    }

    /// Frozen layout, available once [`ready`](Self::ready) has resolved.
    pub fn layout(&self) -> Option<&DocumentLayout> {
        self.layout.as_ref()
    }

    pub fn spec(&self) -> &DocumentSpec {
        &self.spec
    }

    pub fn fonts(&self) -> &FontManager {
        &self.assets.fonts
    }

    pub fn images(&self) -> &BTreeMap<String, LoadedImage> {
        &self.assets.images
    }

    pub fn surface(&self) -> &HostSurface {
        &self.surface
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.lease.id()
    }

    pub fn set_pending(&mut self, pending: PendingInteraction) {
        self.pending = Some(pending);
    }

    pub fn is_torn_down(&self) -> bool {
        self.lease.is_released()
    }

    /// Remove the surface. A pending interaction gets up to `timeout` to
    /// finish first. Safe to call more than once; later calls do nothing
    /// and return `false`.
    pub async fn teardown(&mut self, timeout: Duration) -> bool {
        if self.lease.is_released() {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            if tokio::time::timeout(timeout, pending.done).await.is_err() {
                log::warn!(
                    "{} still running after {timeout:?}, removing surface anyway",
                    pending.description
                );
            }
        }
        self.lease.release()
    }
}

fn parse_sheets(spec: &DocumentSpec) -> Result<Vec<Element>, CertificateError> {
    spec.sheets()
        .iter()
        .map(|sheet| {
            let nodes = parse_markup(&sheet.markup).map_err(|e| {
                CertificateError::RenderHostCreation(format!("sheet {}: {e}", sheet.index))
            })?;
            let mut elements = nodes.into_iter().filter_map(|n| match n {
                Node::Element(e) => Some(e),
                Node::Text(_) => None,
            });
            match (elements.next(), elements.next()) {
                (Some(root), None) if root.tag == Tag::Sheet => Ok(root),
                _ => Err(CertificateError::RenderHostCreation(format!(
                    "sheet {} must contain exactly one <sheet> element",
                    sheet.index
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::{LabelTable, Locale};
    use crate::record::RecipientRecord;
    use crate::template::compose;

    fn spec() -> DocumentSpec {
        compose(
            &RecipientRecord {
                name: "陳小明".into(),
                refuge_date: "2024-01-15".into(),
                ..Default::default()
            },
            Locale::Zh,
            &LabelTable::default(),
        )
    }

    fn config(dir: &std::path::Path) -> CertificateConfig {
        CertificateConfig {
            asset_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ready_lays_out_every_sheet_without_assets() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SurfaceRegistry::new();
        let mut host =
            RenderHost::mount(&registry, HostSurface::Offscreen, spec(), &config(dir.path())).unwrap();
        assert!(!host.is_ready());

        let report = host.ready(Duration::from_secs(5)).await.unwrap();
        assert!(report.timeout.is_none());
        assert!(report.missing_typefaces);
        // Seal and imagery are missing from the empty asset dir.
        assert_eq!(report.failed.len(), 2);
        assert_eq!(host.layout().unwrap().sheets.len(), 6);

        assert!(host.teardown(Duration::from_millis(10)).await);
        assert!(!host.teardown(Duration::from_millis(10)).await);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_waits_for_pending_interaction_then_forces() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SurfaceRegistry::new();
        let mut host =
            RenderHost::mount(&registry, HostSurface::Offscreen, spec(), &config(dir.path())).unwrap();
        host.set_pending(PendingInteraction {
            description: "print job".into(),
            done: Box::pin(futures::future::pending()),
        });
        assert!(host.teardown(Duration::from_secs(2)).await);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn malformed_sheet_fails_mount_and_detaches() {
        let mut bad = spec();
        bad.set_markup(3, "<sheet><div></sheet>");
        let registry = SurfaceRegistry::new();
        let err = RenderHost::mount(
            &registry,
            HostSurface::foreground(),
            bad,
            &CertificateConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CertificateError::RenderHostCreation(_)), "{err}");
        assert_eq!(registry.live_count(), 0);
    }
}
