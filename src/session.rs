//! One certificate generation, start to finish.
//!
//! [`CertificateService::generate`] classifies the client once, composes the
//! document, mounts a render host and drives it through the print or export
//! pathway. The host is torn down on every exit path and any fatal error
//! reaches the caller as a single localized [`UserFacingError`].

use crate::config::CertificateConfig;
use crate::device::{classify, CapabilityProbe, DeviceClass};
use crate::error::{CertificateError, UserFacingError};
use crate::export::{artifact_file_stem, ExportArtifact, PaginatedExport, RasterExportChannel, SheetCapture};
use crate::host::RenderHost;
use crate::lifecycle::{HostSurface, SurfaceRegistry};
use crate::locale::{LabelTable, Locale};
use crate::print::{PrintChannel, PrintSpooler, PrintStatus};
use crate::record::RecipientRecord;
use crate::template::TemplateComposer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Ready,
    Printing,
    Exporting,
    Done,
    Failed,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Ready => "ready",
            SessionState::Printing => "printing",
            SessionState::Exporting => "exporting",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    fn can_become(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Ready) => true,
            (Ready, Printing | Exporting) => true,
            (Printing | Exporting, Done) => true,
            _ => false,
        }
    }
}

/// State of one generation run.
#[derive(Debug)]
pub struct RenderSession {
    id: u64,
    class: DeviceClass,
    state: SessionState,
}

impl RenderSession {
    pub fn new(id: u64, class: DeviceClass) -> Self {
        Self {
            id,
            class,
            state: SessionState::Pending,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), CertificateError> {
        if !self.state.can_become(next) {
            return Err(CertificateError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        log::debug!("Session {}: {} -> {}", self.id, self.state.name(), next.name());
        self.state = next;
        Ok(())
    }

    /// Move to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            log::debug!("Session {}: {} -> failed", self.id, self.state.name());
            self.state = SessionState::Failed;
        }
    }
}

/// Exclusive right to run one session at a time. `generate` borrows it
/// mutably, so a caller cannot start a second session while one is running.
#[derive(Debug, Default)]
pub struct SessionToken {
    sessions: u64,
}

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions started with this token.
    pub fn sessions(&self) -> u64 {
        self.sessions
    }
}

/// Export offered on the compact pathway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportKind {
    Image,
    #[default]
    Document,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub record: RecipientRecord,
    pub locale: Locale,
    /// Only used when the client classifies as compact.
    pub export: ExportKind,
}

/// What a successful session produced.
#[derive(Debug)]
pub enum Delivery {
    Printed(PrintStatus),
    Image(ExportArtifact),
    Document(PaginatedExport),
}

pub struct CertificateService<S, C> {
    config: CertificateConfig,
    labels: LabelTable,
    composer: TemplateComposer,
    registry: SurfaceRegistry,
    spooler: S,
    capture: C,
}

impl<S: PrintSpooler, C: SheetCapture> CertificateService<S, C> {
    pub fn new(config: CertificateConfig, labels: LabelTable, spooler: S, capture: C) -> Self {
        let composer = TemplateComposer::new(config.seal.clone(), config.imagery.clone());
        Self {
            config,
            labels,
            composer,
            registry: SurfaceRegistry::new(),
            spooler,
            capture,
        }
    }

    pub fn config(&self) -> &CertificateConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Surfaces currently attached by this service's hosts.
    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    pub fn spooler(&self) -> &S {
        &self.spooler
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    /// Run one session for `request`.
    pub async fn generate(
        &self,
        token: &mut SessionToken,
        probe: &mut impl CapabilityProbe,
        request: GenerationRequest,
    ) -> Result<Delivery, UserFacingError> {
        token.sessions += 1;
        let class = classify(&probe.probe(), &self.config.breakpoints);
        let mut session = RenderSession::new(token.sessions, class);
        log::info!(
            "Session {} for record {} ({:?} pathway)",
            session.id(),
            request.record.id,
            class
        );

        let spec = self.composer.compose(&request.record, request.locale, &self.labels);
        let surface = match class {
            DeviceClass::Standard => HostSurface::Offscreen,
            DeviceClass::Compact => HostSurface::foreground(),
        };
        let mut host = match RenderHost::mount(&self.registry, surface, spec, &self.config) {
            Ok(host) => host,
            Err(e) => return Err(self.fail(&mut session, e, request.locale)),
        };

        let outcome = self.drive(&mut session, &mut host, &request).await;
        host.teardown(self.config.teardown_timeout()).await;

        match outcome {
            Ok(delivery) => Ok(delivery),
            Err(e) => Err(self.fail(&mut session, e, request.locale)),
        }
    }

    async fn drive(
        &self,
        session: &mut RenderSession,
        host: &mut RenderHost,
        request: &GenerationRequest,
    ) -> Result<Delivery, CertificateError> {
        let report = host.ready(self.config.asset_timeout()).await?;
        if !report.failed.is_empty() {
            log::warn!("Hidden unavailable assets: {}", report.failed.join(", "));
        }
        session.transition(SessionState::Ready)?;

        let delivery = match session.class() {
            DeviceClass::Standard => {
                session.transition(SessionState::Printing)?;
                let channel = PrintChannel::new(&self.spooler, self.config.print_grace());
                Delivery::Printed(channel.print(host).await?)
            }
            DeviceClass::Compact => {
                session.transition(SessionState::Exporting)?;
                let stem = artifact_file_stem(&request.record.name, request.locale, &self.labels);
                let channel = RasterExportChannel::new(&self.capture, self.config.capture_scale());
                match request.export {
                    ExportKind::Image => Delivery::Image(channel.export_image(host, &stem)?),
                    ExportKind::Document => {
                        Delivery::Document(channel.export_document(host, &stem).await?)
                    }
                }
            }
        };
        session.transition(SessionState::Done)?;
        Ok(delivery)
    }

    fn fail(&self, session: &mut RenderSession, cause: CertificateError, locale: Locale) -> UserFacingError {
        session.fail();
        log::error!("Session {} failed: {cause}", session.id());
        UserFacingError::new(cause, &self.labels, locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut s = RenderSession::new(1, DeviceClass::Standard);
        s.transition(SessionState::Ready).unwrap();
        s.transition(SessionState::Printing).unwrap();
        s.transition(SessionState::Done).unwrap();
        assert!(s.state().is_terminal());
    }

    #[test]
    fn only_ready_may_start_output() {
        let mut s = RenderSession::new(1, DeviceClass::Compact);
        let err = s.transition(SessionState::Exporting).unwrap_err();
        assert!(matches!(
            err,
            CertificateError::InvalidTransition {
                from: "pending",
                to: "exporting"
            }
        ));
        assert_eq!(s.state(), SessionState::Pending);
    }

    #[test]
    fn terminal_states_stay_put() {
        let mut s = RenderSession::new(1, DeviceClass::Standard);
        s.fail();
        assert_eq!(s.state(), SessionState::Failed);
        assert!(s.transition(SessionState::Ready).is_err());
        s.fail();
        assert_eq!(s.state(), SessionState::Failed);

        let mut done = RenderSession::new(2, DeviceClass::Standard);
        done.transition(SessionState::Ready).unwrap();
        done.transition(SessionState::Printing).unwrap();
        done.transition(SessionState::Done).unwrap();
        assert!(done.transition(SessionState::Failed).is_err());
        done.fail();
        assert_eq!(done.state(), SessionState::Done);
    }
}
