//! # cert-forge – Refuge certificate composition and export
//!
//! Binds one recipient record into a fixed six-sheet certificate and
//! delivers it either as a native print job or as a downloadable bitmap or
//! paginated PDF, depending on what the client can do. The stages are:
//!
//! 1. **Compose** – record → sheet markup ([`template`], [`date`])
//! 2. **Classify** – capability signal → device class ([`device`])
//! 3. **Mount** – parse and style the markup on a render host ([`host`],
//!    [`markup`], [`style`])
//! 4. **Ready** – load images and typefaces under a deadline ([`assets`],
//!    [`fonts`]), then lay out every sheet with Taffy ([`layout`])
//! 5. **Deliver** – vector print stream ([`print`], [`render`]) or raster
//!    exports ([`export`], [`raster`])
//!
//! [`session::CertificateService`] runs the whole sequence and guarantees
//! the render host is torn down afterwards ([`lifecycle`]).

pub mod assets;
pub mod config;
pub mod date;
pub mod device;
pub mod error;
pub mod export;
pub mod fonts;
pub mod host;
pub mod layout;
pub mod layout_config;
pub mod lifecycle;
pub mod locale;
pub mod markup;
pub mod print;
pub mod raster;
pub mod record;
pub mod render;
pub mod session;
pub mod style;
pub mod template;

// Re-exports for convenience
pub use config::CertificateConfig;
pub use device::{classify, CapabilitySignal, DeviceClass, StaticProbe};
pub use error::{CertificateError, UserFacingError};
pub use locale::{LabelTable, Locale};
pub use record::RecipientRecord;
pub use session::{CertificateService, Delivery, ExportKind, GenerationRequest, SessionToken};
pub use template::{compose, DocumentSpec, PageProfile, SheetKind};
