//! Print channel for the standard pathway.
//!
//! The print stream is rendered from the render host's frozen layout only,
//! then handed to a [`PrintSpooler`]. The channel waits a bounded grace
//! period for the spooler; a job still running after that is parked on the
//! host as a pending interaction so teardown can give it a last chance.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use tokio::io::AsyncWriteExt;

use crate::config::SpoolerConfig;
use crate::error::CertificateError;
use crate::host::RenderHost;
use crate::lifecycle::PendingInteraction;
use crate::render::render_print_pdf;

/// A rendered print stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub title: String,
    pub pages: usize,
    /// PDF bytes.
    pub document: Vec<u8>,
}

/// What the spooler reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoolOutcome {
    Submitted,
    /// The user dismissed the dialog without printing.
    Cancelled,
}

/// Platform print submission.
///
/// The returned future owns everything it needs, so the channel can keep
/// it alive past the grace period.
pub trait PrintSpooler {
    fn submit(&self, job: PrintJob) -> LocalBoxFuture<'static, Result<SpoolOutcome, CertificateError>>;
}

impl<S: PrintSpooler + ?Sized> PrintSpooler for Box<S> {
    fn submit(&self, job: PrintJob) -> LocalBoxFuture<'static, Result<SpoolOutcome, CertificateError>> {
        (**self).submit(job)
    }
}

/// Pipes the PDF into a spooler command such as `lp`.
#[derive(Debug, Clone)]
pub struct CommandSpooler {
    pub program: String,
    pub args: Vec<String>,
}

impl PrintSpooler for CommandSpooler {
    fn submit(&self, job: PrintJob) -> LocalBoxFuture<'static, Result<SpoolOutcome, CertificateError>> {
        let program = self.program.clone();
        let args = self.args.clone();
        async move {
            let mut child = tokio::process::Command::new(&program)
                .args(&args)
                .arg("-t")
                .arg(&job.title)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                // A job dropped by forced teardown must not outlive the session.
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| CertificateError::PrintInvocation(format!("{program}: {e}")))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&job.document)
                    .await
                    .map_err(|e| CertificateError::PrintInvocation(format!("{program}: {e}")))?;
                // Closing stdin lets the spooler see end of input.
                drop(stdin);
            }

            let status = child
                .wait()
                .await
                .map_err(|e| CertificateError::PrintInvocation(format!("{program}: {e}")))?;
            if status.success() {
                log::info!("Print job {:?} accepted by {program}", job.title);
                Ok(SpoolOutcome::Submitted)
            } else {
                Err(CertificateError::PrintInvocation(format!(
                    "{program} exited with {status}"
                )))
            }
        }
        .boxed_local()
    }
}

/// Writes each print stream into a spool directory.
#[derive(Debug, Clone)]
pub struct DirectorySpooler {
    pub dir: PathBuf,
}

impl PrintSpooler for DirectorySpooler {
    fn submit(&self, job: PrintJob) -> LocalBoxFuture<'static, Result<SpoolOutcome, CertificateError>> {
        let dir = self.dir.clone();
        async move {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                CertificateError::PrintInvocation(format!("{}: {e}", dir.display()))
            })?;
            let stem: String = job
                .title
                .chars()
                .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
                .collect();
            let path = dir.join(format!("{stem}.pdf"));
            tokio::fs::write(&path, &job.document).await.map_err(|e| {
                CertificateError::PrintInvocation(format!("{}: {e}", path.display()))
            })?;
            log::info!("Spooled print job to {}", path.display());
            Ok(SpoolOutcome::Submitted)
        }
        .boxed_local()
    }
}

/// Build the configured spooler.
pub fn spooler_from_config(config: &SpoolerConfig) -> Box<dyn PrintSpooler> {
    match config {
        SpoolerConfig::Command { program, args } => Box::new(CommandSpooler {
            program: program.clone(),
            args: args.clone(),
        }),
        SpoolerConfig::Directory { path } => Box::new(DirectorySpooler { dir: path.clone() }),
    }
}

/// How a print request ended, from the pipeline's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintStatus {
    Completed,
    Cancelled,
    /// Still running when the grace period ran out; parked on the host.
    HandedOff,
}

pub struct PrintChannel<'a, S: PrintSpooler + ?Sized> {
    spooler: &'a S,
    grace: Duration,
}

impl<'a, S: PrintSpooler + ?Sized> PrintChannel<'a, S> {
    pub fn new(spooler: &'a S, grace: Duration) -> Self {
        Self { spooler, grace }
    }

    /// Render the host's content and submit it. The host must be ready.
    pub async fn print(&self, host: &mut RenderHost) -> Result<PrintStatus, CertificateError> {
        let layout = host.layout().ok_or_else(|| {
            CertificateError::PrintInvocation("render host is not ready".to_string())
        })?;
        let document = render_print_pdf(layout, host.fonts(), host.images())
            .map_err(CertificateError::PrintInvocation)?;
        let job = PrintJob {
            title: layout.title.clone(),
            pages: layout.sheets.len(),
            document,
        };
        log::debug!("Submitting {} page print job {:?}", job.pages, job.title);

        let title = job.title.clone();
        let mut submission = self.spooler.submit(job);
        match tokio::time::timeout(self.grace, &mut submission).await {
            Ok(Ok(SpoolOutcome::Submitted)) => Ok(PrintStatus::Completed),
            Ok(Ok(SpoolOutcome::Cancelled)) => {
                log::info!("Print of {title:?} cancelled by the user");
                Ok(PrintStatus::Cancelled)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                log::info!(
                    "Print of {title:?} still running after {:?}, handing it to teardown",
                    self.grace
                );
                host.set_pending(PendingInteraction {
                    description: format!("print job {title:?}"),
                    done: async move {
                        if let Err(e) = submission.await {
                            log::warn!("Print job finished with an error after hand-off: {e}");
                        }
                    }
                    .boxed_local(),
                });
                Ok(PrintStatus::HandedOff)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> PrintJob {
        PrintJob {
            title: "皈依證 - a/b".into(),
            pages: 6,
            document: b"%PDF-1.7 test".to_vec(),
        }
    }

    #[tokio::test]
    async fn directory_spooler_writes_stream() {
        let dir = tempfile::tempdir().unwrap();
        let spooler = DirectorySpooler {
            dir: dir.path().join("spool"),
        };
        let outcome = spooler.submit(job()).await.unwrap();
        assert_eq!(outcome, SpoolOutcome::Submitted);
        let written = std::fs::read(dir.path().join("spool").join("皈依證 - a_b.pdf")).unwrap();
        assert_eq!(written, b"%PDF-1.7 test");
    }

    #[tokio::test]
    async fn missing_command_is_a_print_failure() {
        let spooler = CommandSpooler {
            program: "definitely-not-a-spooler-binary".into(),
            args: Vec::new(),
        };
        let err = spooler.submit(job()).await.unwrap_err();
        assert!(matches!(err, CertificateError::PrintInvocation(_)), "{err}");
    }

    #[tokio::test]
    async fn unusable_spool_dir_is_a_print_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let spooler = DirectorySpooler {
            dir: blocker.join("spool"),
        };
        let err = spooler.submit(job()).await.unwrap_err();
        assert!(matches!(err, CertificateError::PrintInvocation(_)), "{err}");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_command_job_kills_the_spooler() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let spooler = CommandSpooler {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                format!("echo $$ > {}; exec sleep 30", pid_file.display()),
            ],
        };
        let submission = spooler.submit(job());
        assert!(tokio::time::timeout(Duration::from_millis(500), submission)
            .await
            .is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        tokio::time::sleep(Duration::from_millis(200)).await;
        // Gone, or a zombie awaiting reaping; never still sleeping.
        let state = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
        let running = state
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|s| s != "Z" && s != "X");
        assert!(!running, "spooler {pid} still running: {state}");
    }

    #[test]
    fn config_selects_spooler() {
        // Only checks construction; submission is covered above.
        let _ = spooler_from_config(&SpoolerConfig::default());
        let _ = spooler_from_config(&SpoolerConfig::Directory {
            path: PathBuf::from("/tmp"),
        });
    }
}
