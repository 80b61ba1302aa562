//! Export plugins: caller-supplied hooks that inspect or transform each
//! exported file.
//!
//! A plugin sees `export_begin` once before enumeration, `export_file` for
//! every plain (non-imported) file, and `export_end` once after — the end
//! call is guaranteed by [`ExportNotifier`]'s `Drop` even when the build
//! errors out. Side effects go through the [`PluginOutput`] collector, which
//! the driver hands out fresh per call, so per-file state never leaks
//! between files or plugins.

use std::cell::RefCell;
use std::rc::Rc;

use crate::features::FeatureSet;

/// An extra file a plugin wants in the archive.
#[derive(Debug, Clone)]
pub struct ExtraFile {
    pub path: String,
    pub data: Vec<u8>,
    /// When set, the file currently being exported is suppressed and a
    /// `.remap` stub redirecting to this extra file is synthesized.
    pub remap: bool,
}

/// A native artifact copied alongside the final binary, not packed.
#[derive(Debug, Clone)]
pub struct SharedObject {
    pub path: String,
    pub tags: Vec<String>,
    pub target: String,
}

impl SharedObject {
    pub fn new(path: impl Into<String>, tags: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tags,
            target: target.into(),
        }
    }
}

/// Collector for one plugin invocation's side effects.
#[derive(Debug, Default)]
pub struct PluginOutput {
    pub extra_files: Vec<ExtraFile>,
    pub shared_objects: Vec<SharedObject>,
    pub skipped: bool,
    // Pass-through lists consumed by platform glue.
    pub ios_frameworks: Vec<String>,
    pub ios_embedded_frameworks: Vec<String>,
    pub ios_project_static_libs: Vec<String>,
    pub ios_bundle_files: Vec<String>,
    pub ios_plist_content: String,
    pub ios_linker_flags: String,
    pub macos_plugin_files: Vec<String>,
}

impl PluginOutput {
    pub fn add_file(&mut self, path: impl Into<String>, data: Vec<u8>, remap: bool) {
        self.extra_files.push(ExtraFile {
            path: path.into(),
            data,
            remap,
        });
    }

    pub fn add_shared_object(&mut self, so: SharedObject) {
        self.shared_objects.push(so);
    }

    /// Do not store the file currently being exported.
    pub fn skip(&mut self) {
        self.skipped = true;
    }

    pub fn add_ios_framework(&mut self, path: impl Into<String>) {
        self.ios_frameworks.push(path.into());
    }

    pub fn add_ios_embedded_framework(&mut self, path: impl Into<String>) {
        self.ios_embedded_frameworks.push(path.into());
    }

    pub fn add_ios_project_static_lib(&mut self, path: impl Into<String>) {
        self.ios_project_static_libs.push(path.into());
    }

    pub fn add_ios_bundle_file(&mut self, path: impl Into<String>) {
        self.ios_bundle_files.push(path.into());
    }

    pub fn add_ios_plist_content(&mut self, content: &str) {
        self.ios_plist_content.push_str(content);
        self.ios_plist_content.push('\n');
    }

    pub fn add_ios_linker_flags(&mut self, flags: &str) {
        if !self.ios_linker_flags.is_empty() {
            self.ios_linker_flags.push(' ');
        }
        self.ios_linker_flags.push_str(flags);
    }

    pub fn add_macos_plugin_file(&mut self, path: impl Into<String>) {
        self.macos_plugin_files.push(path.into());
    }
}

/// The plugin capability surface. Script-hosted and native plugins share
/// this one trait; a scripting bridge is just another implementation.
pub trait ExportPlugin {
    fn export_begin(
        &mut self,
        out: &mut PluginOutput,
        features: &[String],
        debug: bool,
        path: &str,
        flags: u32,
    ) {
        let _ = (out, features, debug, path, flags);
    }

    fn export_file(
        &mut self,
        out: &mut PluginOutput,
        path: &str,
        resource_type: &str,
        features: &FeatureSet,
    ) {
        let _ = (out, path, resource_type, features);
    }

    fn export_end(&mut self) {}
}

/// Shared plugin handle; the driver and the notifier hold clones for the
/// duration of one build.
pub type SharedPlugin = Rc<RefCell<dyn ExportPlugin>>;

/// Scoped begin/end bracket around plugin invocation.
///
/// Construction fires `export_begin` on every plugin and collects their
/// outputs; dropping the notifier fires `export_end` on every exit path,
/// including errors.
pub struct ExportNotifier {
    plugins: Vec<SharedPlugin>,
}

impl ExportNotifier {
    pub fn begin(
        plugins: Vec<SharedPlugin>,
        features: &FeatureSet,
        debug: bool,
        path: &str,
        flags: u32,
    ) -> (Self, Vec<PluginOutput>) {
        let mut outputs = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            let mut out = PluginOutput::default();
            plugin
                .borrow_mut()
                .export_begin(&mut out, features.ordered(), debug, path, flags);
            outputs.push(out);
        }
        (Self { plugins }, outputs)
    }
}

impl Drop for ExportNotifier {
    fn drop(&mut self) {
        for plugin in &self.plugins {
            plugin.borrow_mut().export_end();
        }
    }
}

/// Converts text resources to their binary representation at export time.
///
/// Registers the converted payload as an extra file with `remap` set, so the
/// archive carries `<path>.converted.res` plus a `.remap` stub while the
/// text original stays out. Enabled via the
/// `editor/export/convert_text_resources_to_binary` project setting.
pub struct TextResourceToBinaryPlugin {
    enabled: bool,
    project_root: std::path::PathBuf,
}

impl TextResourceToBinaryPlugin {
    const BINARY_MAGIC: &'static [u8; 4] = b"RSRC";

    pub fn from_project(project: &crate::project::Project) -> Self {
        Self {
            enabled: project.bool_setting("editor/export/convert_text_resources_to_binary"),
            project_root: project.root().to_owned(),
        }
    }

    fn convert(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() + 12);
        out.extend_from_slice(Self::BINARY_MAGIC);
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        out.extend_from_slice(data);
        out
    }
}

impl ExportPlugin for TextResourceToBinaryPlugin {
    fn export_file(
        &mut self,
        out: &mut PluginOutput,
        path: &str,
        _resource_type: &str,
        _features: &FeatureSet,
    ) {
        if !self.enabled {
            return;
        }
        let lower = path.to_lowercase();
        if !lower.ends_with(".tres") && !lower.ends_with(".tscn") {
            return;
        }
        let disk = self
            .project_root
            .join(crate::util::strip_res_prefix(path));
        let data = match std::fs::read(&disk) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!("cannot convert '{path}' to binary: {err}");
                return;
            }
        };
        out.add_file(
            format!("{path}.converted.res"),
            Self::convert(&data),
            true,
        );
    }
}
