//! Export platform abstraction and the desktop implementation.
//!
//! A platform contributes feature tags, declares per-preset options,
//! breaks feature-priority ties during remap resolution, and drives the
//! outer export flow (template copy, pack emission, shared-object copy).
//! Template *contents*, signing and executable patching are platform glue
//! beyond this crate; [`PcPlatform`] covers the pack-centric flow shared by
//! every desktop target.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cfg::Value;
use crate::error::{ExportError, Result};
use crate::message::Severity;
use crate::pipeline::{ExportContext, Progress};
use crate::plugin::SharedObject;
use crate::preset::ExportPreset;

/// A per-preset option declared by a platform, with its default value.
#[derive(Debug, Clone)]
pub struct ExportOption {
    pub name: String,
    pub default: Value,
}

impl ExportOption {
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
        }
    }
}

/// Result of a pre-export validity check.
#[derive(Debug, Clone, Default)]
pub struct PlatformCheck {
    pub valid: bool,
    pub error: String,
    pub missing_templates: bool,
}

/// The closed capability set the pipeline needs from a platform.
pub trait ExportPlatform {
    fn name(&self) -> &str;

    fn os_name(&self) -> &str;

    /// Feature tags derived from the preset's option values.
    fn preset_features(&self, preset: &ExportPreset) -> Vec<String>;

    /// Feature tags every export for this platform carries.
    fn platform_features(&self) -> Vec<String>;

    fn export_options(&self) -> Vec<ExportOption>;

    /// Whether presets should re-seed their option maps from
    /// [`Self::export_options`].
    fn should_update_export_options(&self) -> bool {
        false
    }

    /// Reduce a multi-feature remap tie to the platform's preference.
    fn resolve_platform_feature_priorities(
        &self,
        preset: &ExportPreset,
        features: &mut HashSet<String>,
    );

    fn can_export(&self, preset: &ExportPreset, debug: bool) -> PlatformCheck;

    /// Run the full export: template, pack (embedded or sibling `.pck`),
    /// shared objects.
    fn export_project(
        &self,
        ctx: &mut ExportContext<'_>,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
        flags: u32,
        progress: &mut dyn Progress,
    ) -> Result<()>;
}

/// Desktop platform: Linux, Windows and macOS exports share this flow.
pub struct PcPlatform {
    name: String,
    os_name: String,
    templates_dir: PathBuf,
}

impl PcPlatform {
    pub fn new(name: impl Into<String>, os_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os_name: os_name.into(),
            templates_dir: PathBuf::new(),
        }
    }

    pub fn linux() -> Self {
        Self::new("Linux/X11", "Linux")
    }

    pub fn windows() -> Self {
        Self::new("Windows Desktop", "Windows")
    }

    pub fn with_templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = dir.into();
        self
    }

    fn template_file_name(&self, target: &str, bits: &str) -> String {
        format!("{}_{}_{}", self.os_name.to_lowercase(), target, bits)
    }

    fn find_template(&self, preset: &ExportPreset, debug: bool) -> Option<PathBuf> {
        let custom = preset.string_option(if debug {
            "custom_template/debug"
        } else {
            "custom_template/release"
        });
        let custom = custom.trim();
        if !custom.is_empty() {
            let path = PathBuf::from(custom);
            return path.is_file().then_some(path);
        }
        if self.templates_dir.as_os_str().is_empty() {
            return None;
        }
        let bits = if preset.bool_option("binary_format/64_bits") {
            "64"
        } else {
            "32"
        };
        let path = self
            .templates_dir
            .join(self.template_file_name(if debug { "debug" } else { "release" }, bits));
        path.is_file().then_some(path)
    }

    fn prepare_template(
        &self,
        ctx: &mut ExportContext<'_>,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
    ) -> Result<()> {
        let template = self.find_template(preset, debug).ok_or_else(|| {
            ctx.add_message(
                Severity::Error,
                "Prepare Template",
                "No export template found for the current configuration.",
            );
            ExportError::TemplateMissing(self.template_file_name(
                if debug { "debug" } else { "release" },
                if preset.bool_option("binary_format/64_bits") {
                    "64"
                } else {
                    "32"
                },
            ))
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))?;
        }
        fs::copy(&template, path).map_err(|e| ExportError::io(path, e))?;
        Ok(())
    }

    /// Hook for patching the destination executable after an embedded pack
    /// write. Signing and section fixups live in platform glue.
    fn fixup_embedded_pck(&self, _path: &Path, _embedded_start: u64, _embedded_size: u64) -> Result<()> {
        Ok(())
    }

    fn copy_shared_objects(
        &self,
        ctx: &mut ExportContext<'_>,
        so_files: &[SharedObject],
        path: &Path,
    ) -> Result<()> {
        let base_dir = path.parent().unwrap_or(Path::new("."));
        for so in so_files {
            let src = ctx.project.resolve_path(&so.path);
            let file_name = src
                .file_name()
                .ok_or_else(|| ExportError::InvalidParameter(format!(
                    "shared object has no file name: {}",
                    so.path
                )))?;
            let target_dir = if so.target.is_empty() {
                base_dir.to_owned()
            } else {
                base_dir.join(&so.target)
            };
            fs::create_dir_all(&target_dir).map_err(|e| ExportError::io(&target_dir, e))?;
            let target = target_dir.join(file_name);
            fs::copy(&src, &target).map_err(|e| ExportError::io(&src, e))?;
        }
        Ok(())
    }
}

impl ExportPlatform for PcPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn os_name(&self) -> &str {
        &self.os_name
    }

    fn preset_features(&self, preset: &ExportPreset) -> Vec<String> {
        let mut features = Vec::new();
        for format in ["s3tc", "etc", "etc2"] {
            if preset.bool_option(&format!("texture_format/{format}")) {
                features.push(format.to_owned());
            }
        }
        features.push(if preset.bool_option("binary_format/64_bits") {
            "64".to_owned()
        } else {
            "32".to_owned()
        });
        features
    }

    fn platform_features(&self) -> Vec<String> {
        vec![
            "pc".to_owned(),
            "s3tc".to_owned(),
            self.os_name.to_lowercase(),
        ]
    }

    fn export_options(&self) -> Vec<ExportOption> {
        vec![
            ExportOption::new("custom_template/debug", ""),
            ExportOption::new("custom_template/release", ""),
            ExportOption::new("debug/export_console_script", 1i64),
            ExportOption::new("binary_format/64_bits", true),
            ExportOption::new("binary_format/embed_pck", false),
            ExportOption::new("texture_format/bptc", false),
            ExportOption::new("texture_format/s3tc", true),
            ExportOption::new("texture_format/etc", false),
            ExportOption::new("texture_format/etc2", false),
            ExportOption::new("texture_format/no_bptc_fallbacks", true),
        ]
    }

    fn resolve_platform_feature_priorities(
        &self,
        preset: &ExportPreset,
        features: &mut HashSet<String>,
    ) {
        if features.contains("bptc") && preset.option("texture_format/no_bptc_fallbacks").is_some()
        {
            features.remove("s3tc");
        }
    }

    fn can_export(&self, preset: &ExportPreset, debug: bool) -> PlatformCheck {
        let mut check = PlatformCheck::default();
        match self.find_template(preset, debug) {
            Some(_) => check.valid = true,
            None => {
                check.missing_templates = true;
                check.error = format!(
                    "No export template found for '{}' ({}).",
                    self.name,
                    if debug { "debug" } else { "release" }
                );
            }
        }
        check
    }

    fn export_project(
        &self,
        ctx: &mut ExportContext<'_>,
        preset: &ExportPreset,
        debug: bool,
        path: &Path,
        flags: u32,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let notifier = ctx.begin_plugins(preset, debug, path, flags);

        let result = (|| {
            self.prepare_template(ctx, preset, debug, path)?;

            let embed = preset.bool_option("binary_format/embed_pck");
            let pck_path = if embed {
                path.to_owned()
            } else {
                path.with_extension("pck")
            };

            let mut so_files = Vec::new();
            let summary = ctx.save_pack(preset, debug, &pck_path, embed, &mut so_files, progress)?;

            if embed {
                if summary.embedded_size >= 0x1_0000_0000
                    && !preset.bool_option("binary_format/64_bits")
                {
                    ctx.add_message(
                        Severity::Error,
                        "PCK Embedding",
                        "On 32-bit exports the embedded PCK cannot be bigger than 4 GiB.",
                    );
                    return Err(ExportError::InvalidParameter(
                        "embedded PCK exceeds 4 GiB on a 32-bit target".to_owned(),
                    ));
                }
                self.fixup_embedded_pck(path, summary.embedded_start, summary.embedded_size)?;
            }

            self.copy_shared_objects(ctx, &so_files, path)
        })();

        drop(notifier);
        result
    }
}
