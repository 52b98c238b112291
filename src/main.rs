//! certforge – print or export one refuge certificate.
//!
//! Usage:
//!   certforge <record.json> [--id N] [--locale zh|en] [--config PATH]
//!             [--labels PATH] [--viewport-width PX] [--coarse-pointer]
//!             [--no-print] [--export image|document] [--out DIR]
//!             [--dump-markup] [--dump-layout]
//!
//! The record file holds one record object or an array of them. Capability
//! flags stand in for the client's environment: a narrow viewport, a coarse
//! pointer or `--no-print` select the compact (export) pathway.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use cert_forge::config::CertificateConfig;
use cert_forge::error::CertificateError;
use cert_forge::export::SkiaCapture;
use cert_forge::host::RenderHost;
use cert_forge::lifecycle::{HostSurface, SurfaceRegistry};
use cert_forge::print::{spooler_from_config, PrintStatus};
use cert_forge::template::TemplateComposer;
use cert_forge::{
    CapabilitySignal, CertificateService, Delivery, ExportKind, GenerationRequest, LabelTable,
    Locale, RecipientRecord, SessionToken, StaticProbe,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportArg {
    Image,
    Document,
}

impl From<ExportArg> for ExportKind {
    fn from(value: ExportArg) -> Self {
        match value {
            ExportArg::Image => ExportKind::Image,
            ExportArg::Document => ExportKind::Document,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "certforge", version, about = "Print or export a refuge certificate")]
struct Cli {
    /// Record JSON: one object or an array of records.
    #[arg(value_hint = clap::ValueHint::FilePath)]
    record: PathBuf,

    /// Record id to pick from an array (default: the first record).
    #[arg(long)]
    id: Option<u64>,

    #[arg(long, default_value = "zh", env = "CERTFORGE_LOCALE")]
    locale: Locale,

    /// TOML configuration file.
    #[arg(long, env = "CERTFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON label table layered over the built-in labels.
    #[arg(long)]
    labels: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    viewport_width: u32,

    #[arg(long, action = clap::ArgAction::SetTrue)]
    coarse_pointer: bool,

    /// Pretend native printing is unavailable.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_print: bool,

    /// Export produced on the compact pathway.
    #[arg(long, value_enum, default_value = "document")]
    export: ExportArg,

    /// Output directory for exports (overrides the config file).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the composed markup and exit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    dump_markup: bool,

    /// Print the frozen layout as JSON and exit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    dump_layout: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match load_config(&cli).and_then(|config| execute(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<CertificateConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => CertificateConfig::load(path)?,
        None => CertificateConfig::default(),
    };
    if let Some(out) = &cli.out {
        config.out_dir = out.clone();
    }
    config.validate()?;
    if config.fonts.is_empty() {
        eprintln!("Warning: no typefaces configured; Han and Tibetan text will not render");
    }
    Ok(config)
}

/// Drive the session on a current-thread runtime. Asset reads that missed
/// the readiness deadline may still be parked on the blocking pool, so
/// shutdown waits at most the teardown timeout for them.
fn execute(cli: Cli, config: CertificateConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let shutdown = config.teardown_timeout();
    let result = rt.block_on(run(cli, config));
    rt.shutdown_timeout(shutdown);
    result
}

async fn run(cli: Cli, config: CertificateConfig) -> Result<(), Box<dyn std::error::Error>> {
    let labels = match &cli.labels {
        Some(path) => LabelTable::load(path)?,
        None => LabelTable::default(),
    };
    let record = select_record(&cli)?;

    if cli.dump_markup {
        let composer = TemplateComposer::new(config.seal.clone(), config.imagery.clone());
        print!("{}", composer.compose(&record, cli.locale, &labels).markup());
        return Ok(());
    }
    if cli.dump_layout {
        return dump_layout(&config, &labels, &record, cli.locale).await;
    }

    let spooler = spooler_from_config(&config.spooler);
    let service = CertificateService::new(config, labels, spooler, SkiaCapture);
    let mut probe = StaticProbe(CapabilitySignal {
        viewport_width_px: cli.viewport_width,
        coarse_pointer: cli.coarse_pointer,
        native_print: !cli.no_print,
    });
    let mut token = SessionToken::new();
    let request = GenerationRequest {
        record,
        locale: cli.locale,
        export: cli.export.into(),
    };

    match service.generate(&mut token, &mut probe, request).await? {
        Delivery::Printed(PrintStatus::Completed) => eprintln!("Sent certificate to the printer"),
        Delivery::Printed(PrintStatus::Cancelled) => eprintln!("Printing cancelled"),
        Delivery::Printed(PrintStatus::HandedOff) => {
            eprintln!("Print job handed off to the spooler")
        }
        Delivery::Image(artifact) => {
            let path = artifact.save_into(&service.config().out_dir).await?;
            eprintln!("Wrote '{}' ({} bytes)", path.display(), artifact.bytes.len());
        }
        Delivery::Document(export) => {
            let path = export.artifact.save_into(&service.config().out_dir).await?;
            let pages = export.pages.len();
            eprintln!(
                "Wrote '{}' ({} bytes, {} page{})",
                path.display(),
                export.artifact.bytes.len(),
                pages,
                if pages == 1 { "" } else { "s" }
            );
        }
    }
    Ok(())
}

fn select_record(cli: &Cli) -> Result<RecipientRecord, CertificateError> {
    let json = std::fs::read_to_string(&cli.record)?;
    let records = RecipientRecord::parse_many(&json)?;
    let found = match cli.id {
        Some(id) => records.into_iter().find(|r| r.id == id),
        None => records.into_iter().next(),
    };
    found.ok_or_else(|| {
        CertificateError::Config(match cli.id {
            Some(id) => format!("no record with id {id} in {}", cli.record.display()),
            None => format!("{} holds no records", cli.record.display()),
        })
    })
}

async fn dump_layout(
    config: &CertificateConfig,
    labels: &LabelTable,
    record: &RecipientRecord,
    locale: Locale,
) -> Result<(), Box<dyn std::error::Error>> {
    let composer = TemplateComposer::new(config.seal.clone(), config.imagery.clone());
    let spec = composer.compose(record, locale, labels);
    let registry = SurfaceRegistry::new();
    let mut host = RenderHost::mount(&registry, HostSurface::Offscreen, spec, config)?;
    let ready = host.ready(config.asset_timeout()).await;
    if let (Ok(_), Some(layout)) = (&ready, host.layout()) {
        println!("{}", layout.to_json());
    }
    host.teardown(config.teardown_timeout()).await;
    ready?;
    Ok(())
}
