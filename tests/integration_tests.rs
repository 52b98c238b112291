//! Integration tests for the certificate pipeline.
//!
//! These tests validate:
//! - Composition is deterministic and always complete
//! - Dates are localized per locale
//! - The standard pathway prints from the render host only
//! - The compact pathway exports one page per sheet at the sheet's profile
//! - No render surface outlives its session, on success or failure

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use sha2::{Digest, Sha256};
use tiny_skia::Pixmap;

use cert_forge::config::CertificateConfig;
use cert_forge::date::localize_date;
use cert_forge::error::CertificateError;
use cert_forge::export::{SheetCapture, SkiaCapture};
use cert_forge::host::RenderHost;
use cert_forge::lifecycle::{HostSurface, SurfaceRegistry};
use cert_forge::print::{PrintJob, PrintSpooler, PrintStatus, SpoolOutcome};
use cert_forge::{
    compose, CapabilitySignal, CertificateService, Delivery, ExportKind, GenerationRequest,
    LabelTable, Locale, PageProfile, RecipientRecord, SessionToken, SheetKind, StaticProbe,
};

// =====================================================================
// Helpers
// =====================================================================

fn scenario_record() -> RecipientRecord {
    RecipientRecord::parse_many(
        r#"{ "id": 7, "name": "陳小明", "refugeDate": "2024-01-15",
             "refugePlace": "台北", "dharmaName": "" }"#,
    )
    .unwrap()
    .remove(0)
}

fn write_png(path: &Path) {
    let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([180, 20, 20, 255]));
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// Asset dir holding the seal and imagery, plus a config pointing at it.
fn config_with_assets(dir: &Path) -> CertificateConfig {
    write_png(&dir.join("seal.png"));
    write_png(&dir.join("three-jewels.png"));
    CertificateConfig {
        asset_dir: dir.to_path_buf(),
        supersample: 1.0,
        capture_dpi: 36.0,
        ..Default::default()
    }
}

fn desktop() -> StaticProbe {
    StaticProbe(CapabilitySignal::default())
}

fn phone() -> StaticProbe {
    StaticProbe(CapabilitySignal {
        viewport_width_px: 390,
        coarse_pointer: true,
        native_print: true,
    })
}

fn request(export: ExportKind) -> GenerationRequest {
    GenerationRequest {
        record: scenario_record(),
        locale: Locale::Zh,
        export,
    }
}

#[derive(Default)]
struct RecordingSpooler {
    jobs: RefCell<Vec<PrintJob>>,
}

impl PrintSpooler for RecordingSpooler {
    fn submit(&self, job: PrintJob) -> LocalBoxFuture<'static, Result<SpoolOutcome, CertificateError>> {
        self.jobs.borrow_mut().push(job);
        async { Ok(SpoolOutcome::Submitted) }.boxed_local()
    }
}

struct NeverReturns;

impl PrintSpooler for NeverReturns {
    fn submit(&self, _job: PrintJob) -> LocalBoxFuture<'static, Result<SpoolOutcome, CertificateError>> {
        futures::future::pending().boxed_local()
    }
}

struct BrokenSpooler;

impl PrintSpooler for BrokenSpooler {
    fn submit(&self, _job: PrintJob) -> LocalBoxFuture<'static, Result<SpoolOutcome, CertificateError>> {
        async { Err(CertificateError::PrintInvocation("no printer".into())) }.boxed_local()
    }
}

struct FailOnSheet {
    index: usize,
    attempts: Cell<usize>,
}

impl SheetCapture for FailOnSheet {
    fn capture(&self, host: &RenderHost, index: usize, scale: f32) -> Result<Pixmap, CertificateError> {
        self.attempts.set(self.attempts.get() + 1);
        if index == self.index {
            return Err(CertificateError::Capture {
                index,
                reason: "surface lost".into(),
            });
        }
        SkiaCapture.capture(host, index, scale)
    }
}

// =====================================================================
// Composition
// =====================================================================

#[test]
fn composing_twice_is_hash_equal() {
    let labels = LabelTable::default();
    let hash = |locale| {
        let markup = compose(&scenario_record(), locale, &labels).markup();
        Sha256::digest(markup.as_bytes())
    };
    assert_eq!(hash(Locale::Zh), hash(Locale::Zh));
    assert_eq!(hash(Locale::En), hash(Locale::En));
    assert_ne!(hash(Locale::Zh), hash(Locale::En));
}

#[test]
fn empty_dharma_fields_still_give_six_rows() {
    let spec = compose(&scenario_record(), Locale::Zh, &LabelTable::default());
    let detail = &spec.sheet(SheetKind::Detail).unwrap().markup;
    assert_eq!(detail.matches("class=\"detail-row").count(), 6);
    assert_eq!(detail.matches("fill-line").count(), 3);
    for field in ["dharma-name", "dharma-name-phonetic", "dharma-name-meaning"] {
        assert!(detail.contains(&format!("data-field=\"{field}\"")), "{field}");
    }
}

#[test]
fn sheet_order_and_profiles_are_fixed() {
    let spec = compose(&RecipientRecord::default(), Locale::En, &LabelTable::default());
    let kinds: Vec<_> = spec.sheets().iter().map(|s| s.kind).collect();
    assert_eq!(kinds, SheetKind::ALL.to_vec());
    assert_eq!(spec.sheets()[0].profile, PageProfile::DoubleWide);
    assert_eq!(spec.sheets()[2].profile, PageProfile::HalfSize);
}

#[test]
fn dates_follow_locale() {
    assert_eq!(localize_date("2024-01-15", Locale::Zh), "民國113年1月15日");
    assert_eq!(localize_date("2024-01-15", Locale::En), "January 15, 2024");
    assert_eq!(localize_date("sometime", Locale::Zh), "sometime");
}

// =====================================================================
// Render host
// =====================================================================

#[tokio::test]
async fn detail_sheet_layout_shows_record_values() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_assets(dir.path());
    let spec = compose(&scenario_record(), Locale::Zh, &LabelTable::default());
    let registry = SurfaceRegistry::new();
    let mut host = RenderHost::mount(&registry, HostSurface::Offscreen, spec, &config).unwrap();

    let report = host.ready(config.asset_timeout()).await.unwrap();
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.loaded, 2);

    let layout = host.layout().unwrap();
    let detail: String = layout.sheets[2].text_lines().concat();
    for expected in ["陳小明", "民國113年1月15日", "台北"] {
        assert!(detail.contains(expected), "missing {expected}");
    }
    let mut seal_shown = false;
    layout.sheets[2].visit(&mut |b| {
        if b.image.as_ref().is_some_and(|i| i.src == "asset:seal.png") {
            seal_shown = b.width > 0.0 && b.height > 0.0;
        }
    });
    assert!(seal_shown);

    host.teardown(config.teardown_timeout()).await;
    assert_eq!(registry.live_count(), 0);
}

/// The seal is a FIFO nobody writes to, so reading it never completes.
/// The host must give up at the deadline, lay out without the seal, and the
/// runtime must still shut down within a bounded time.
#[cfg(unix)]
#[test]
fn stuck_asset_falls_back_at_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_assets(dir.path());
    let seal = dir.path().join("seal.png");
    std::fs::remove_file(&seal).unwrap();
    let made = std::process::Command::new("mkfifo").arg(&seal).status().unwrap();
    assert!(made.success());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let registry = SurfaceRegistry::new();
    let started = std::time::Instant::now();
    rt.block_on(async {
        let spec = compose(&scenario_record(), Locale::Zh, &LabelTable::default());
        let mut host = RenderHost::mount(&registry, HostSurface::Offscreen, spec, &config).unwrap();

        let report = host.ready(Duration::from_millis(300)).await.unwrap();
        assert!(
            matches!(report.timeout, Some(CertificateError::AssetLoadTimeout { pending: 1, .. })),
            "{:?}",
            report.timeout
        );
        assert_eq!(report.loaded, 1);

        let layout = host.layout().unwrap();
        assert_eq!(layout.sheets.len(), SheetKind::ALL.len());
        let mut seal_shown = false;
        for sheet in &layout.sheets {
            sheet.visit(&mut |b| {
                seal_shown |= b.image.as_ref().is_some_and(|i| i.src == "asset:seal.png");
            });
        }
        assert!(!seal_shown);

        assert!(host.teardown(config.teardown_timeout()).await);
    });
    assert_eq!(registry.live_count(), 0);

    rt.shutdown_timeout(Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
}

// =====================================================================
// Standard pathway
// =====================================================================

#[tokio::test]
async fn standard_client_prints_every_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let service = CertificateService::new(
        config_with_assets(dir.path()),
        LabelTable::default(),
        RecordingSpooler::default(),
        SkiaCapture,
    );
    let mut token = SessionToken::new();

    let delivery = service
        .generate(&mut token, &mut desktop(), request(ExportKind::Document))
        .await
        .unwrap();
    assert!(matches!(delivery, Delivery::Printed(PrintStatus::Completed)));

    let jobs = service.spooler().jobs.borrow();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].pages, SheetKind::ALL.len());
    assert_eq!(jobs[0].title, "皈依證 - 陳小明");
    assert!(jobs[0].document.starts_with(b"%PDF-"));
    assert_eq!(service.registry().live_count(), 0);
    assert_eq!(token.sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_print_job_is_handed_off_and_surface_removed() {
    let dir = tempfile::tempdir().unwrap();
    let config = CertificateConfig {
        asset_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let service = CertificateService::new(config, LabelTable::default(), NeverReturns, SkiaCapture);

    let delivery = service
        .generate(&mut SessionToken::new(), &mut desktop(), request(ExportKind::Document))
        .await
        .unwrap();
    assert!(matches!(delivery, Delivery::Printed(PrintStatus::HandedOff)));
    assert_eq!(service.registry().live_count(), 0);
}

#[tokio::test]
async fn print_failure_surfaces_one_localized_message() {
    let dir = tempfile::tempdir().unwrap();
    let service = CertificateService::new(
        config_with_assets(dir.path()),
        LabelTable::default(),
        BrokenSpooler,
        SkiaCapture,
    );
    let err = service
        .generate(&mut SessionToken::new(), &mut desktop(), request(ExportKind::Document))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), LabelTable::default().get(Locale::Zh, "printError"));
    assert!(matches!(err.cause, CertificateError::PrintInvocation(_)));
    assert_eq!(service.registry().live_count(), 0);
}

// =====================================================================
// Compact pathway
// =====================================================================

#[tokio::test]
async fn compact_document_has_one_page_per_sheet_at_profile_aspect() {
    let dir = tempfile::tempdir().unwrap();
    let service = CertificateService::new(
        config_with_assets(dir.path()),
        LabelTable::default(),
        RecordingSpooler::default(),
        SkiaCapture,
    );

    let delivery = service
        .generate(&mut SessionToken::new(), &mut phone(), request(ExportKind::Document))
        .await
        .unwrap();
    let Delivery::Document(export) = delivery else {
        panic!("expected a paginated export");
    };

    assert_eq!(export.pages.len(), SheetKind::ALL.len());
    for (n, page) in export.pages.iter().enumerate() {
        assert_eq!(page.sheet_index, n);
        assert_eq!(page.kind, SheetKind::ALL[n]);
        let aspect = page.px_width as f32 / page.px_height as f32;
        assert!((aspect - page.profile.aspect()).abs() < 0.02, "page {n}: {aspect}");
    }
    assert_eq!(export.artifact.file_name, "陳小明_皈依證.pdf");
    assert!(export.artifact.bytes.starts_with(b"%PDF-"));
    assert!(service.spooler().jobs.borrow().is_empty());
    assert_eq!(service.registry().live_count(), 0);
}

#[tokio::test]
async fn compact_image_export_is_saved_under_recipient_name() {
    let dir = tempfile::tempdir().unwrap();
    let service = CertificateService::new(
        config_with_assets(dir.path()),
        LabelTable::default(),
        RecordingSpooler::default(),
        SkiaCapture,
    );
    let mut probe = StaticProbe(CapabilitySignal {
        native_print: false,
        ..CapabilitySignal::default()
    });

    let delivery = service
        .generate(&mut SessionToken::new(), &mut probe, request(ExportKind::Image))
        .await
        .unwrap();
    let Delivery::Image(artifact) = delivery else {
        panic!("expected an image export");
    };
    let path = artifact.save_into(&dir.path().join("out")).await.unwrap();
    assert!(path.ends_with("陳小明_皈依證.png"));

    let decoded = image::load_from_memory(&std::fs::read(&path).unwrap()).unwrap();
    let aspect = decoded.width() as f32 / decoded.height() as f32;
    assert!((aspect - PageProfile::DoubleWide.aspect()).abs() < 0.02);
}

#[tokio::test]
async fn capture_failure_mid_export_aborts_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let service = CertificateService::new(
        config_with_assets(dir.path()),
        LabelTable::default(),
        RecordingSpooler::default(),
        FailOnSheet {
            index: 3,
            attempts: Cell::new(0),
        },
    );

    let err = service
        .generate(&mut SessionToken::new(), &mut phone(), request(ExportKind::Document))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), LabelTable::default().get(Locale::Zh, "exportError"));
    assert!(matches!(err.cause, CertificateError::Capture { index: 3, .. }));
    assert_eq!(service.capture().attempts.get(), 4);
    assert_eq!(service.registry().live_count(), 0);
}

#[tokio::test]
async fn each_session_gets_a_fresh_surface() {
    let dir = tempfile::tempdir().unwrap();
    let service = CertificateService::new(
        config_with_assets(dir.path()),
        LabelTable::default(),
        RecordingSpooler::default(),
        SkiaCapture,
    );
    let mut token = SessionToken::new();
    for _ in 0..2 {
        service
            .generate(&mut token, &mut desktop(), request(ExportKind::Document))
            .await
            .unwrap();
        assert_eq!(service.registry().live_count(), 0);
    }
    assert_eq!(token.sessions(), 2);
    assert_eq!(service.spooler().jobs.borrow().len(), 2);
}
