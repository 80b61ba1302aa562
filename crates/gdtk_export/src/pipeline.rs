//! The export driver.
//!
//! [`ExportContext::export_project_files`] walks the preset's path set and
//! feeds every payload — remapped imports, plugin extra files, plain bodies
//! and the synthetic artifacts (remap stubs, icons, settings blob) — into a
//! [`FileConsumer`]. The two consumers are the pack stager and the ZIP
//! writer; [`ExportContext::save_pack`] and [`ExportContext::save_zip`] wire
//! them up and finalize the archive.
//!
//! Everything runs on the caller's thread. The only yield point is
//! [`Progress::step`], which may pump UI events and can cancel the build by
//! returning `true`.

use glob::Pattern;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::mem;
use std::path::Path;

use gdtk_pck::{EngineVersion, PckError, PckOptions, PckSummary, PckWriter};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::cfg::{c_escape, Value};
use crate::error::{ExportError, Result};
use crate::features::FeatureSet;
use crate::filter::{compile_filter, edit_filter_list, matches_any};
use crate::key::decode_script_key;
use crate::message::{ExportMessage, Severity};
use crate::platform::ExportPlatform;
use crate::plugin::{ExportNotifier, PluginOutput, SharedObject, SharedPlugin};
use crate::preset::ExportPreset;
use crate::project::Project;
use crate::remap::{resolve_import, RemapOutcome};
use crate::resources::{collect_export_paths, ResourceIndex};
use crate::util::strip_res_prefix;

pub const DEBUG_FLAG_DUMB_CLIENT: u32 = 1;
pub const DEBUG_FLAG_REMOTE_DEBUG: u32 = 2;
pub const DEBUG_FLAG_REMOTE_DEBUG_LOCALHOST: u32 = 4;
pub const DEBUG_FLAG_VIEW_COLLISIONS: u32 = 8;
pub const DEBUG_FLAG_VIEW_NAVIGATION: u32 = 16;

/// Progress reporting hook. `step` returns `true` to cancel the build.
pub trait Progress {
    fn step(&mut self, label: &str, value: u32) -> bool;
}

/// Reporter that never cancels.
pub struct NullProgress;

impl Progress for NullProgress {
    fn step(&mut self, _label: &str, _value: u32) -> bool {
        false
    }
}

/// Sink for the payload stream produced by the driver.
pub trait FileConsumer {
    fn save_file(&mut self, path: &str, data: &[u8], file_idx: usize, total: usize) -> Result<()>;

    fn add_shared_object(&mut self, so: &SharedObject) -> Result<()> {
        let _ = so;
        Ok(())
    }
}

/// How suppressed originals are redirected to their replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemapMode {
    /// Synthesize a `.remap` stub file per redirected path. Plays well with
    /// multi-pack distributions.
    #[default]
    RemapFiles,
    /// Legacy: record all redirections in the `path_remap/remapped_paths`
    /// setting inside `project.binary`.
    RemappedPathsSetting,
}

/// Explicit state for one export run: the project, the platform, the plugin
/// list, and the message log.
pub struct ExportContext<'a> {
    pub project: &'a Project,
    pub platform: &'a dyn ExportPlatform,
    pub plugins: Vec<SharedPlugin>,
    pub messages: Vec<ExportMessage>,
    pub remap_mode: RemapMode,
    pub engine_version: EngineVersion,
    /// Test hook: zero padding and fixed IVs in the emitted pack.
    pub deterministic: bool,
    pending_begin: Vec<PluginOutput>,
}

impl<'a> ExportContext<'a> {
    pub fn new(project: &'a Project, platform: &'a dyn ExportPlatform) -> Self {
        Self {
            project,
            platform,
            plugins: Vec::new(),
            messages: Vec::new(),
            remap_mode: RemapMode::default(),
            engine_version: EngineVersion::new(4, 0, 0),
            deterministic: false,
            pending_begin: Vec::new(),
        }
    }

    pub fn add_message(&mut self, severity: Severity, category: &str, text: &str) {
        match severity {
            Severity::Info => tracing::info!("[{category}] {text}"),
            Severity::Warning => tracing::warn!("[{category}] {text}"),
            Severity::Error => tracing::error!("[{category}] {text}"),
        }
        self.messages.push(ExportMessage {
            severity,
            category: category.to_owned(),
            text: text.to_owned(),
        });
    }

    /// Fire `export_begin` on every plugin. The returned notifier fires
    /// `export_end` when dropped, on every exit path.
    pub fn begin_plugins(
        &mut self,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
        flags: u32,
    ) -> ExportNotifier {
        let features = FeatureSet::build(self.platform, preset, debug);
        let (notifier, outputs) = ExportNotifier::begin(
            self.plugins.clone(),
            &features,
            debug,
            &path.to_string_lossy(),
            flags,
        );
        self.pending_begin = outputs;
        notifier
    }

    /// Enumerate, filter, remap and transform the preset's files, feeding
    /// each payload into `consumer`.
    pub fn export_project_files(
        &mut self,
        preset: &ExportPreset,
        debug: bool,
        consumer: &mut dyn FileConsumer,
    ) -> Result<()> {
        let index = ResourceIndex::scan(self.project);
        let mut paths = collect_export_paths(self.project, &index, preset);

        // Native icons live outside the resource index.
        edit_filter_list(self.project, &mut paths, "*.icns", false);
        edit_filter_list(self.project, &mut paths, "*.ico", false);

        edit_filter_list(self.project, &mut paths, &preset.include_filter, false);
        edit_filter_list(self.project, &mut paths, &preset.exclude_filter, true);

        // Sidecars are re-added per imported file below.
        edit_filter_list(self.project, &mut paths, "*.import", true);

        let total = paths.len();

        // Flush files and shared objects the plugins registered during
        // `export_begin`.
        for output in mem::take(&mut self.pending_begin) {
            for so in &output.shared_objects {
                consumer.add_shared_object(so)?;
            }
            for extra in &output.extra_files {
                consumer.save_file(&extra.path, &extra.data, 0, total)?;
            }
        }

        let features = FeatureSet::build(self.platform, preset, debug);

        let mut path_remaps: Vec<(String, String)> = Vec::new();
        let mut idx = 0usize;

        for path in &paths {
            let resource_type = index.resource_type(path);
            let sidecar = format!("{path}.import");

            if self.project.file_exists(&sidecar) {
                let outcome =
                    match resolve_import(self.project, self.platform, preset, &features, path) {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            self.add_message(
                                Severity::Error,
                                "Export",
                                &format!("Could not parse: '{path}', not exported."),
                            );
                            tracing::debug!("sidecar parse failure: {err}");
                            continue;
                        }
                    };

                match outcome {
                    RemapOutcome::Keep => {
                        let data = self.project.read_file(path)?;
                        consumer.save_file(path, &data, idx, total)?;
                        continue;
                    }
                    RemapOutcome::Remapped { payloads } => {
                        for payload in &payloads {
                            let data = self.project.read_file(payload)?;
                            consumer.save_file(payload, &data, idx, total)?;
                        }
                        let data = self.project.read_file(&sidecar)?;
                        consumer.save_file(&sidecar, &data, idx, total)?;
                    }
                }
            } else {
                let mut do_export = true;
                for plugin in &self.plugins {
                    let mut output = PluginOutput::default();
                    plugin
                        .borrow_mut()
                        .export_file(&mut output, path, resource_type, &features);

                    for so in &output.shared_objects {
                        consumer.add_shared_object(so)?;
                    }
                    for extra in &output.extra_files {
                        consumer.save_file(&extra.path, &extra.data, idx, total)?;
                        if extra.remap {
                            do_export = false;
                            path_remaps.push((path.clone(), extra.path.clone()));
                        }
                    }
                    if output.skipped {
                        do_export = false;
                    }
                    if !do_export {
                        break;
                    }
                }

                if do_export {
                    let data = self.project.read_file(path)?;
                    consumer.save_file(path, &data, idx, total)?;
                }
            }

            idx += 1;
        }

        // Synthetic artifacts.

        let custom_list = crate::util::split_comma(&preset.custom_features);

        let mut overlays: Vec<(String, Value)> = Vec::new();
        if !path_remaps.is_empty() {
            match self.remap_mode {
                RemapMode::RemapFiles => {
                    for (from, to) in &path_remaps {
                        let stub = format!("[remap]\n\npath=\"{}\"\n", c_escape(to));
                        consumer.save_file(
                            &format!("{from}.remap"),
                            stub.as_bytes(),
                            idx,
                            total,
                        )?;
                    }
                }
                RemapMode::RemappedPathsSetting => {
                    let mut flat = Vec::with_capacity(path_remaps.len() * 2);
                    for (from, to) in &path_remaps {
                        flat.push(from.clone());
                        flat.push(to.clone());
                    }
                    overlays.push(("path_remap/remapped_paths".to_owned(), Value::List(flat)));
                }
            }
        }

        // Icon and boot splash bypass the import system; pack them raw.
        let icon = self.project.string_setting("application/config/icon").to_owned();
        let splash = self
            .project
            .string_setting("application/boot_splash/image")
            .to_owned();
        if !icon.is_empty() && self.project.file_exists(&icon) {
            let data = self.project.read_file(&icon)?;
            consumer.save_file(&icon, &data, idx, total)?;
        }
        if !splash.is_empty() && self.project.file_exists(&splash) && splash != icon {
            let data = self.project.read_file(&splash)?;
            consumer.save_file(&splash, &data, idx, total)?;
        }

        for aux in [
            self.project.uid_cache_path(),
            self.project.extension_list_path(),
        ] {
            if self.project.file_exists(aux) {
                let data = self.project.read_file(aux)?;
                consumer.save_file(aux, &data, idx, total)?;
            }
        }

        self.export_text_server_data(consumer, idx, total)?;

        let settings = self.project.save_settings_binary(&custom_list, &overlays)?;
        consumer.save_file("res://project.binary", &settings, idx, total)
    }

    fn export_text_server_data(
        &mut self,
        consumer: &mut dyn FileConsumer,
        idx: usize,
        total: usize,
    ) -> Result<()> {
        let Some(text_server) = &self.project.text_server else {
            return Ok(());
        };
        if !self
            .project
            .bool_setting("internationalization/locale/include_text_server_data")
        {
            return Ok(());
        }

        let ts_path = format!("res://{}", text_server.support_data_filename());
        if self.project.file_exists(&ts_path) {
            let data = self.project.read_file(&ts_path)?;
            return consumer.save_file(&ts_path, &data, idx, total);
        }

        // No user-provided file; regenerate to a temp path and pack that.
        let tmp = tempfile::NamedTempFile::new().map_err(|e| ExportError::io("tmp_icu_data", e))?;
        text_server
            .save_support_data(tmp.path())
            .map_err(|e| ExportError::io(tmp.path(), e))?;
        let data = std::fs::read(tmp.path()).map_err(|e| ExportError::io(tmp.path(), e))?;
        consumer.save_file(&ts_path, &data, idx, total)
    }

    /// Stage and emit a pack at `path`. When `embed` is set, `path` must be
    /// an existing executable; the pack is appended with the loader trailer
    /// and the returned summary reports the embedded byte range.
    pub fn save_pack(
        &mut self,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
        embed: bool,
        so_files: &mut Vec<SharedObject>,
        progress: &mut dyn Progress,
    ) -> Result<PckSummary> {
        if let Some(warning) = preset.validate_encryption() {
            self.add_message(Severity::Warning, "Save PCK", &warning);
        }

        let writer = if self.deterministic {
            PckWriter::new_deterministic()
        } else {
            PckWriter::new()
        };
        let writer = match writer {
            Ok(writer) => writer,
            Err(err) => {
                self.add_message(Severity::Error, "Save PCK", "Cannot create temporary file.");
                return Err(err.into());
            }
        };

        let mut enc_in = Vec::new();
        let mut enc_ex = Vec::new();
        let mut key = None;
        if preset.enc_pck {
            enc_in = compile_filter(&preset.enc_in_filter);
            enc_ex = compile_filter(&preset.enc_ex_filter);
            key = Some(decode_script_key(&preset.script_encryption_key));
        }

        let mut pack = PackData {
            writer,
            enc_in,
            enc_ex,
            key,
            so_files,
            progress,
        };

        if let Err(err) = self.export_project_files(preset, debug, &mut pack) {
            // The staging temp file is removed when the writer drops.
            if !err.is_cancelled() {
                self.add_message(Severity::Error, "Save PCK", "Failed to export project files.");
            }
            return Err(err);
        }

        let mut out = if embed {
            OpenOptions::new().read(true).write(true).open(path)
        } else {
            File::create(path)
        }
        .map_err(|e| {
            self.add_message(
                Severity::Error,
                "Save PCK",
                &format!("Cannot create file \"{}\".", path.display()),
            );
            ExportError::io(path, e)
        })?;

        let mut options = PckOptions::new(self.engine_version);
        options.embed = embed;
        if preset.enc_pck && preset.enc_directory {
            options.directory_key = Some(decode_script_key(&preset.script_encryption_key));
        }

        pack.writer.finish(&mut out, &options).map_err(|err| match err {
            PckError::InvalidKeyLength(_) => {
                self.add_message(Severity::Error, "Save PCK", "Can't create encrypted file.");
                ExportError::EncryptionSetup
            }
            other => other.into(),
        })
    }

    /// Emit a DEFLATE ZIP at `path`: no encryption, no digests, driver
    /// enumeration order.
    pub fn save_zip(
        &mut self,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
        let mut data = ZipData {
            zip: ZipWriter::new(file),
            progress,
        };

        let result = self.export_project_files(preset, debug, &mut data);
        data.zip.finish()?;

        if let Err(err) = result {
            if !err.is_cancelled() {
                self.add_message(Severity::Error, "Save ZIP", "Failed to export project files.");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Pack export bracketed by the plugin begin/end notifications.
    pub fn export_pack(
        &mut self,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
        progress: &mut dyn Progress,
    ) -> Result<PckSummary> {
        let notifier = self.begin_plugins(preset, debug, path, 0);
        let mut so_files = Vec::new();
        let result = self.save_pack(preset, debug, path, false, &mut so_files, progress);
        drop(notifier);
        result
    }

    /// ZIP export bracketed by the plugin begin/end notifications.
    pub fn export_zip(
        &mut self,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let notifier = self.begin_plugins(preset, debug, path, 0);
        let result = self.save_zip(preset, debug, path, progress);
        drop(notifier);
        result
    }
}

/// Pack staging consumer: decides per-body encryption from the preset's
/// filters and forwards payloads to the two-pass writer.
struct PackData<'a> {
    writer: PckWriter,
    enc_in: Vec<Pattern>,
    enc_ex: Vec<Pattern>,
    key: Option<[u8; 32]>,
    so_files: &'a mut Vec<SharedObject>,
    progress: &'a mut dyn Progress,
}

impl FileConsumer for PackData<'_> {
    fn save_file(&mut self, path: &str, data: &[u8], file_idx: usize, total: usize) -> Result<()> {
        if total < 1 {
            return Err(ExportError::ParameterRange);
        }

        // Includes first, then excludes: a later exclude match wins.
        let mut encrypted = false;
        if self.key.is_some() {
            if matches_any(path, &self.enc_in) {
                encrypted = true;
            }
            if matches_any(path, &self.enc_ex) {
                encrypted = false;
            }
        }

        let key = if encrypted { self.key.as_ref() } else { None };
        self.writer.add_file(path, data, key)?;

        if self
            .progress
            .step(&format!("Storing File: {path}"), (2 + file_idx * 100 / total) as u32)
        {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }

    fn add_shared_object(&mut self, so: &SharedObject) -> Result<()> {
        self.so_files.push(so.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ExportOption, PcPlatform, PlatformCheck};
    use crate::plugin::ExportPlugin;
    use crate::preset::ExportFilter;
    use gdtk_pck::PckArchive;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::fs;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn selected_preset(platform: &dyn ExportPlatform, files: &[&str]) -> ExportPreset {
        let mut preset = ExportPreset::new("test", platform.name());
        preset.export_filter = ExportFilter::SelectedResources;
        for file in files {
            preset.selected_files.insert((*file).to_owned());
        }
        preset
    }

    struct StepLog {
        labels: Vec<String>,
        cancel_at: Option<usize>,
    }

    impl StepLog {
        fn new() -> Self {
            Self {
                labels: Vec::new(),
                cancel_at: None,
            }
        }
    }

    impl Progress for StepLog {
        fn step(&mut self, label: &str, _value: u32) -> bool {
            self.labels.push(label.to_owned());
            self.cancel_at
                .is_some_and(|at| self.labels.len() > at)
        }
    }

    fn pack_deterministic(
        project: &Project,
        platform: &dyn ExportPlatform,
        preset: &ExportPreset,
        out: &Path,
    ) -> (Vec<ExportMessage>, PckSummary) {
        let mut ctx = ExportContext::new(project, platform);
        ctx.deterministic = true;
        let summary = ctx
            .export_pack(preset, false, out, &mut NullProgress)
            .unwrap();
        (ctx.messages, summary)
    }

    #[test]
    fn pack_contains_selected_file_and_settings_blob() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", b"hi");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://a.txt"]);

        let out = dir.path().join("out.pck");
        pack_deterministic(&project, &platform, &preset, &out);

        let mut archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        let paths: Vec<_> = archive.entries().iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, ["res://a.txt", "res://project.binary"]);
        assert_eq!(archive.read_file("res://a.txt", None).unwrap(), b"hi");
        archive.verify(None).unwrap();
    }

    #[test]
    fn directory_encryption_round_trips() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a", b"A");
        write(dir.path(), "b", b"B");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();

        let mut preset = selected_preset(&platform, &["res://a", "res://b"]);
        preset.enc_pck = true;
        preset.enc_directory = true;
        preset.script_encryption_key = "00".repeat(32);

        let out = dir.path().join("out.pck");
        pack_deterministic(&project, &platform, &preset, &out);

        let key = [0u8; 32];
        // The directory is unreadable without the key.
        assert!(PckArchive::mount(File::open(&out).unwrap(), None).is_err());

        let mut archive = PckArchive::mount(File::open(&out).unwrap(), Some(&key)).unwrap();
        // No body filters were configured, so bodies stay plaintext.
        let a = archive.find("res://a").unwrap();
        assert_eq!(a.size, 1);
        assert!(!a.encrypted);
        assert_eq!(archive.read_file("res://a", None).unwrap(), b"A");
        assert_eq!(archive.read_file("res://b", None).unwrap(), b"B");
    }

    #[test]
    fn encryption_filters_select_bodies() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", b"plain");
        write(dir.path(), "x.secret", b"hidden");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();

        let mut preset = selected_preset(&platform, &["res://a.txt", "res://x.secret"]);
        preset.enc_pck = true;
        preset.enc_in_filter = "*.secret".to_owned();
        preset.script_encryption_key = "ab".repeat(32);

        let out = dir.path().join("out.pck");
        pack_deterministic(&project, &platform, &preset, &out);

        let key = decode_script_key(&preset.script_encryption_key);
        let mut archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert!(!archive.find("res://a.txt").unwrap().encrypted);
        assert!(archive.find("res://x.secret").unwrap().encrypted);
        assert_eq!(archive.read_file("res://a.txt", None).unwrap(), b"plain");
        assert_eq!(
            archive.read_file("res://x.secret", Some(&key)).unwrap(),
            b"hidden"
        );
    }

    #[test]
    fn exclude_filter_wins_over_include() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", b"data");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();

        let mut preset = selected_preset(&platform, &["res://a.txt"]);
        preset.enc_pck = true;
        preset.enc_in_filter = "*.txt".to_owned();
        preset.enc_ex_filter = "a.*".to_owned();
        preset.script_encryption_key = "cd".repeat(32);

        let out = dir.path().join("out.pck");
        pack_deterministic(&project, &platform, &preset, &out);

        let archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert!(!archive.find("res://a.txt").unwrap().encrypted);
    }

    struct RemapPlugin;

    impl ExportPlugin for RemapPlugin {
        fn export_file(
            &mut self,
            out: &mut PluginOutput,
            path: &str,
            _resource_type: &str,
            _features: &FeatureSet,
        ) {
            if path == "res://a.txt" {
                out.add_file("res://a.txt.conv", b"HELLO".to_vec(), true);
            }
        }
    }

    #[test]
    fn plugin_remap_suppresses_original_and_emits_stub() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", b"original on disk");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://a.txt"]);

        let mut ctx = ExportContext::new(&project, &platform);
        ctx.deterministic = true;
        ctx.plugins.push(Rc::new(RefCell::new(RemapPlugin)));
        let out = dir.path().join("out.pck");
        ctx.export_pack(&preset, false, &out, &mut NullProgress)
            .unwrap();

        let mut archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert!(archive.find("res://a.txt").is_none());
        assert_eq!(
            archive.read_file("res://a.txt.conv", None).unwrap(),
            b"HELLO"
        );
        assert_eq!(
            archive.read_file("res://a.txt.remap", None).unwrap(),
            b"[remap]\n\npath=\"res://a.txt.conv\"\n"
        );
    }

    #[test]
    fn legacy_remap_mode_writes_the_settings_overlay() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", b"original on disk");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://a.txt"]);

        let mut ctx = ExportContext::new(&project, &platform);
        ctx.deterministic = true;
        ctx.remap_mode = RemapMode::RemappedPathsSetting;
        ctx.plugins.push(Rc::new(RefCell::new(RemapPlugin)));
        let out = dir.path().join("out.pck");
        ctx.export_pack(&preset, false, &out, &mut NullProgress)
            .unwrap();

        let mut archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert!(archive.find("res://a.txt.remap").is_none());
        let settings = archive.read_file("res://project.binary", None).unwrap();
        let haystack = String::from_utf8_lossy(&settings);
        assert!(haystack.contains("path_remap/remapped_paths"));
    }

    struct SkipPlugin;

    impl ExportPlugin for SkipPlugin {
        fn export_file(
            &mut self,
            out: &mut PluginOutput,
            path: &str,
            _resource_type: &str,
            _features: &FeatureSet,
        ) {
            if path.ends_with(".gd") {
                out.skip();
            }
        }
    }

    #[test]
    fn plugin_skip_drops_the_file() {
        let dir = tempdir().unwrap();
        write(dir.path(), "keep.txt", b"k");
        write(dir.path(), "drop.gd", b"extends Node\n");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://keep.txt", "res://drop.gd"]);

        let mut ctx = ExportContext::new(&project, &platform);
        ctx.deterministic = true;
        ctx.plugins.push(Rc::new(RefCell::new(SkipPlugin)));
        let out = dir.path().join("out.pck");
        ctx.export_pack(&preset, false, &out, &mut NullProgress)
            .unwrap();

        let archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert!(archive.find("res://keep.txt").is_some());
        assert!(archive.find("res://drop.gd").is_none());
    }

    /// Platform whose texture priority keeps `etc2` over `s3tc`.
    struct MobilePlatform;

    impl ExportPlatform for MobilePlatform {
        fn name(&self) -> &str {
            "Mobile"
        }
        fn os_name(&self) -> &str {
            "Android"
        }
        fn preset_features(&self, _preset: &ExportPreset) -> Vec<String> {
            vec!["etc2".to_owned(), "s3tc".to_owned()]
        }
        fn platform_features(&self) -> Vec<String> {
            vec!["mobile".to_owned()]
        }
        fn export_options(&self) -> Vec<ExportOption> {
            Vec::new()
        }
        fn resolve_platform_feature_priorities(
            &self,
            _preset: &ExportPreset,
            features: &mut HashSet<String>,
        ) {
            if features.contains("etc2") {
                features.remove("s3tc");
            }
        }
        fn can_export(&self, _preset: &ExportPreset, _debug: bool) -> PlatformCheck {
            PlatformCheck {
                valid: true,
                ..PlatformCheck::default()
            }
        }
        fn export_project(
            &self,
            _ctx: &mut ExportContext<'_>,
            _preset: &ExportPreset,
            _debug: bool,
            _path: &Path,
            _flags: u32,
            _progress: &mut dyn Progress,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn imported_file_is_replaced_by_the_winning_variant() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.png", b"source image");
        write(
            dir.path(),
            "a.png.import",
            b"[remap]\n\nimporter=\"texture\"\n\
              path.etc2=\"res://.godot/imported/a.etc2\"\n\
              path.s3tc=\"res://.godot/imported/a.s3tc\"\n",
        );
        write(dir.path(), ".godot/imported/a.etc2", b"etc2 payload");
        write(dir.path(), ".godot/imported/a.s3tc", b"s3tc payload");
        let project = Project::load(dir.path()).unwrap();
        let platform = MobilePlatform;
        let preset = selected_preset(&platform, &["res://a.png"]);

        let out = dir.path().join("out.pck");
        pack_deterministic(&project, &platform, &preset, &out);

        let mut archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert_eq!(
            archive
                .read_file("res://.godot/imported/a.etc2", None)
                .unwrap(),
            b"etc2 payload"
        );
        assert!(archive.find("res://.godot/imported/a.s3tc").is_none());
        assert!(archive.find("res://a.png.import").is_some());
        assert!(archive.find("res://a.png").is_none());
    }

    #[test]
    fn keep_importer_packs_the_original_without_its_sidecar() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.dat", b"verbatim");
        write(dir.path(), "a.dat.import", b"[remap]\n\nimporter=\"keep\"\n");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://a.dat"]);

        let out = dir.path().join("out.pck");
        pack_deterministic(&project, &platform, &preset, &out);

        let mut archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert_eq!(archive.read_file("res://a.dat", None).unwrap(), b"verbatim");
        assert!(archive.find("res://a.dat.import").is_none());
    }

    #[test]
    fn icon_and_splash_bypass_the_import_system() {
        let dir = tempdir().unwrap();
        write(dir.path(), "icon.svg", b"<svg/>");
        write(dir.path(), "splash.png", b"splash-bytes");
        write(dir.path(), "main.gd", b"extends Node\n");
        write(
            dir.path(),
            "project.godot",
            b"[application]\nconfig/icon=\"res://icon.svg\"\nboot_splash/image=\"res://splash.png\"\n",
        );
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://main.gd"]);

        let out = dir.path().join("out.pck");
        pack_deterministic(&project, &platform, &preset, &out);

        let mut archive = PckArchive::mount(File::open(&out).unwrap(), None).unwrap();
        assert_eq!(archive.read_file("res://icon.svg", None).unwrap(), b"<svg/>");
        assert_eq!(
            archive.read_file("res://splash.png", None).unwrap(),
            b"splash-bytes"
        );
    }

    #[test]
    fn cancellation_surfaces_and_stops_the_run() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", b"1");
        write(dir.path(), "b.txt", b"2");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://a.txt", "res://b.txt"]);

        let mut progress = StepLog::new();
        progress.cancel_at = Some(1);

        let mut ctx = ExportContext::new(&project, &platform);
        let out = dir.path().join("out.pck");
        let mut so_files = Vec::new();
        let result = ctx.save_pack(&preset, false, &out, false, &mut so_files, &mut progress);
        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert_eq!(progress.labels.len(), 2);
        // The destination was never opened.
        assert!(!out.exists());
    }

    #[test]
    fn empty_path_set_is_a_parameter_error() {
        let dir = tempdir().unwrap();
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &[]);

        let mut ctx = ExportContext::new(&project, &platform);
        let out = dir.path().join("out.pck");
        let mut so_files = Vec::new();
        let result = ctx.save_pack(
            &preset,
            false,
            &out,
            false,
            &mut so_files,
            &mut NullProgress,
        );
        assert!(matches!(result, Err(ExportError::ParameterRange)));
    }

    #[test]
    fn zip_stores_prefix_stripped_paths() {
        let dir = tempdir().unwrap();
        write(dir.path(), "data/a.txt", b"hi");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = selected_preset(&platform, &["res://data/a.txt"]);

        let mut ctx = ExportContext::new(&project, &platform);
        let out = dir.path().join("out.zip");
        ctx.export_zip(&preset, false, &out, &mut NullProgress)
            .unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let names: Vec<String> = zip.file_names().map(str::to_owned).collect();
        assert!(names.contains(&"data/a.txt".to_owned()));
        assert!(names.contains(&"project.binary".to_owned()));
        assert!(!names.iter().any(|n| n.starts_with("res://")));

        use std::io::Read;
        let mut body = String::new();
        zip.by_name("data/a.txt")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "hi");
    }

    struct BeginSharedObjectPlugin;

    impl ExportPlugin for BeginSharedObjectPlugin {
        fn export_begin(
            &mut self,
            out: &mut PluginOutput,
            _features: &[String],
            _debug: bool,
            _path: &str,
            _flags: u32,
        ) {
            out.add_shared_object(SharedObject::new("res://libgame.so", Vec::new(), ""));
        }
    }

    #[test]
    fn pc_platform_embeds_the_pack_and_copies_shared_objects() {
        let dir = tempdir().unwrap();
        write(dir.path(), "main.gd", b"extends Node\n");
        write(dir.path(), "libgame.so", b"\x7fELF-shared");
        write(dir.path(), "templates/linux_debug_64", b"EXEC!!!!");

        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux().with_templates_dir(dir.path().join("templates"));

        let mut preset = ExportPreset::for_platform("Linux", &platform);
        preset.export_filter = ExportFilter::SelectedResources;
        preset.selected_files.insert("res://main.gd".to_owned());
        preset
            .options
            .insert("binary_format/embed_pck".to_owned(), Value::Bool(true));

        let mut ctx = ExportContext::new(&project, &platform);
        ctx.deterministic = true;
        ctx.plugins
            .push(Rc::new(RefCell::new(BeginSharedObjectPlugin)));

        let out = dir.path().join("dist/game");
        platform
            .export_project(&mut ctx, &preset, true, &out, 0, &mut NullProgress)
            .unwrap();

        // Executable template is at the front, pack is mountable from the
        // trailer, and the shared object landed next to the binary.
        let bytes = fs::read(&out).unwrap();
        assert_eq!(&bytes[..8], b"EXEC!!!!");
        let mut archive = PckArchive::mount_embedded(File::open(&out).unwrap(), None).unwrap();
        assert_eq!(
            archive.read_file("res://main.gd", None).unwrap(),
            b"extends Node\n"
        );
        assert!(dir.path().join("dist/libgame.so").is_file());
    }

    #[test]
    fn missing_template_aborts_before_packing() {
        let dir = tempdir().unwrap();
        write(dir.path(), "main.gd", b"extends Node\n");
        let project = Project::load(dir.path()).unwrap();
        let platform = PcPlatform::linux();
        let preset = ExportPreset::for_platform("Linux", &platform);

        let mut ctx = ExportContext::new(&project, &platform);
        let out = dir.path().join("dist/game");
        let result =
            platform.export_project(&mut ctx, &preset, true, &out, 0, &mut NullProgress);
        assert!(matches!(result, Err(ExportError::TemplateMissing(_))));
        assert!(!out.exists());
    }
}

/// ZIP consumer: stores payloads under their prefix-stripped path.
struct ZipData<'a, W: Write + std::io::Seek> {
    zip: ZipWriter<W>,
    progress: &'a mut dyn Progress,
}

impl<W: Write + std::io::Seek> FileConsumer for ZipData<'_, W> {
    fn save_file(&mut self, path: &str, data: &[u8], file_idx: usize, total: usize) -> Result<()> {
        if total < 1 {
            return Err(ExportError::ParameterRange);
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(strip_res_prefix(path), options)?;
        self.zip
            .write_all(data)
            .map_err(|e| ExportError::io(path, e))?;

        if self
            .progress
            .step(&format!("Storing File: {path}"), (2 + file_idx * 100 / total) as u32)
        {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }
}
