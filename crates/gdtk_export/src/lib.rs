//! The project export pipeline.
//!
//! Collects every resource a project references, applies the preset's
//! include/exclude filters, resolves import remaps per feature set, runs
//! export plugins over each file, and feeds the resulting payloads into a
//! pack or ZIP emitter. The editor front-end, template management and
//! resource importing sit outside this crate; it consumes already-imported
//! files plus their `.import` sidecars.

pub mod cfg;
mod error;
pub mod features;
pub mod filter;
pub mod key;
pub mod message;
pub mod pipeline;
pub mod platform;
pub mod plugin;
pub mod preset;
pub mod project;
pub mod remap;
pub mod resources;
mod util;

pub use error::{ExportError, Result};
pub use features::FeatureSet;
pub use message::{worst_severity, ExportMessage, Severity};
pub use pipeline::{ExportContext, FileConsumer, NullProgress, Progress, RemapMode};
pub use platform::{ExportOption, ExportPlatform, PcPlatform, PlatformCheck};
pub use plugin::{
    ExportNotifier, ExportPlugin, ExtraFile, PluginOutput, SharedObject, SharedPlugin,
    TextResourceToBinaryPlugin,
};
pub use preset::{ExportFilter, ExportPreset, PresetStore};
pub use project::{Project, TextServer};
