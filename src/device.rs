//! Client capability classification.
//!
//! A session asks its [`CapabilityProbe`] exactly once and carries the
//! resulting [`DeviceClass`] for its whole lifetime.

use serde::{Deserialize, Serialize};

/// Export pathway chosen for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Cannot rely on a native print dialog; gets explicit export controls.
    Compact,
    /// Native print of the off-screen render host.
    Standard,
}

/// Environment characteristics observed at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySignal {
    pub viewport_width_px: u32,
    pub coarse_pointer: bool,
    pub native_print: bool,
}

impl Default for CapabilitySignal {
    fn default() -> Self {
        Self {
            viewport_width_px: 1280,
            coarse_pointer: false,
            native_print: true,
        }
    }
}

/// Viewport widths separating the two classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Breakpoints {
    /// Below this width every client is compact.
    pub compact_below_px: u32,
    /// Touch-first clients below this width are compact too.
    pub touch_compact_below_px: u32,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            compact_below_px: 768,
            touch_compact_below_px: 1024,
        }
    }
}

/// Pure classification of one signal.
pub fn classify(signal: &CapabilitySignal, breakpoints: &Breakpoints) -> DeviceClass {
    if !signal.native_print || signal.viewport_width_px < breakpoints.compact_below_px {
        return DeviceClass::Compact;
    }
    if signal.coarse_pointer && signal.viewport_width_px < breakpoints.touch_compact_below_px {
        return DeviceClass::Compact;
    }
    DeviceClass::Standard
}

/// Source of the capability signal.
pub trait CapabilityProbe {
    fn probe(&mut self) -> CapabilitySignal;
}

/// A signal fixed by the caller, e.g. from CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe(pub CapabilitySignal);

impl CapabilityProbe for StaticProbe {
    fn probe(&mut self) -> CapabilitySignal {
        self.0
    }
}
