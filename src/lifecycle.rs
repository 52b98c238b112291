//! Surface bookkeeping for render hosts.
//!
//! Every render host attaches exactly one surface to a [`SurfaceRegistry`]
//! and holds the returned [`SurfaceLease`]. The lease detaches the surface
//! when released explicitly during teardown, or on drop if an error path
//! skipped teardown. The registry is how callers (and tests) check that no
//! surface outlives its session.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

pub type SurfaceId = u64;

/// Controls offered on a foreground surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAction {
    SaveImage,
    SaveDocument,
}

impl ExportAction {
    /// Label table key of the control's caption.
    pub fn label_key(self) -> &'static str {
        match self {
            ExportAction::SaveImage => "saveImage",
            ExportAction::SaveDocument => "saveDocument",
        }
    }
}

/// The kind of surface a render host is mounted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSurface {
    /// Never shown to the user; content is printed from it.
    Offscreen,
    /// Shown to the user with explicit export controls.
    Foreground { controls: Vec<ExportAction> },
}

impl HostSurface {
    pub fn foreground() -> Self {
        HostSurface::Foreground {
            controls: vec![ExportAction::SaveImage, ExportAction::SaveDocument],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostSurface::Offscreen => "offscreen",
            HostSurface::Foreground { .. } => "foreground",
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: SurfaceId,
    live: BTreeMap<SurfaceId, &'static str>,
}

/// Single-threaded registry of attached surfaces.
#[derive(Debug, Clone, Default)]
pub struct SurfaceRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, surface: &HostSurface) -> SurfaceLease {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, surface.name());
        log::debug!("Attached {} surface #{id}", surface.name());
        SurfaceLease {
            id,
            registry: self.clone(),
            released: false,
        }
    }

    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn is_live(&self, id: SurfaceId) -> bool {
        self.state.borrow().live.contains_key(&id)
    }

    fn detach(&self, id: SurfaceId) -> bool {
        self.state.borrow_mut().live.remove(&id).is_some()
    }
}

/// Ownership of one attached surface.
#[derive(Debug)]
pub struct SurfaceLease {
    id: SurfaceId,
    registry: SurfaceRegistry,
    released: bool,
}

impl SurfaceLease {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Detach the surface. Returns `false` when it was already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        let removed = self.registry.detach(self.id);
        log::debug!("Released surface #{}", self.id);
        removed
    }
}

impl Drop for SurfaceLease {
    fn drop(&mut self) {
        if !self.released {
            log::warn!("Surface #{} released on drop without teardown", self.id);
            self.release();
        }
    }
}

/// Work the user is still interacting with when the pipeline finishes,
/// e.g. a print job that outlived its grace period. Teardown waits on it
/// for a bounded time before removing the surface anyway.
pub struct PendingInteraction {
    pub description: String,
    pub done: LocalBoxFuture<'static, ()>,
}

impl std::fmt::Debug for PendingInteraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingInteraction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
