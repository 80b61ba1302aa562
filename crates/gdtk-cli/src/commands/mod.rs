mod pack;
mod presets;
mod zip;

pub use pack::{pack_project, PackProjectArgs};
pub use presets::{list_presets, ListPresetsArgs};
pub use zip::{zip_project, ZipProjectArgs};

use colored::Colorize;
use gdtk_export::{
    ExportPlatform, ExportPreset, PcPlatform, PresetStore, Progress, Project, Severity,
};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use crate::errors::CliError;

/// Platforms this binary can export for.
pub(crate) fn desktop_platforms() -> Vec<PcPlatform> {
    vec![
        PcPlatform::linux(),
        PcPlatform::windows(),
        PcPlatform::new("macOS", "macOS"),
    ]
}

pub(crate) fn open_project(dir: &str) -> Result<Project> {
    let root = PathBuf::from(dir);
    if !root.is_dir() {
        return Err(CliError::ProjectNotFound { path: root }.into());
    }
    Project::load(root).into_diagnostic()
}

pub(crate) fn load_presets(
    project: &Project,
    platforms: &[PcPlatform],
) -> Result<PresetStore> {
    let refs: Vec<&dyn ExportPlatform> =
        platforms.iter().map(|p| p as &dyn ExportPlatform).collect();
    PresetStore::load(project.root().join("export_presets.cfg"), &refs, project).into_diagnostic()
}

/// Pick the requested preset, or the first one when no name is given.
pub(crate) fn select_preset<'a>(
    store: &'a PresetStore,
    name: Option<&str>,
) -> Result<&'a ExportPreset> {
    match name {
        Some(name) => store
            .presets
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CliError::PresetNotFound { name: name.to_owned() }.into()),
        None => store.presets.first().ok_or_else(|| CliError::NoPresets.into()),
    }
}

/// Resolve the destination: explicit `--output`, else the preset's export
/// path relative to the project root.
pub(crate) fn resolve_output(
    project: &Project,
    preset: &ExportPreset,
    output: Option<&str>,
) -> Result<PathBuf> {
    match output {
        Some(path) => Ok(PathBuf::from(path)),
        None => {
            if preset.export_path.is_empty() {
                return Err(CliError::MissingExportPath {
                    name: preset.name.clone(),
                }
                .into());
            }
            Ok(project.root().join(&preset.export_path))
        }
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            println!(
                "{} {}",
                "📁 Creating output directory:".bright_yellow(),
                parent.display().to_string().bright_white().bold()
            );
            std::fs::create_dir_all(parent).into_diagnostic()?;
        }
    }
    Ok(())
}

/// Progress reporter that prints each stored file on one dim line.
pub(crate) struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn step(&mut self, label: &str, _value: u32) -> bool {
        println!("   {}", label.dimmed());
        false
    }
}

/// Print the run's accumulated messages with severity coloring.
pub(crate) fn print_messages(messages: &[gdtk_export::ExportMessage]) {
    for message in messages {
        let tag = format!("[{}]", message.category);
        match message.severity {
            Severity::Info => println!("{} {}", tag.dimmed(), message.text),
            Severity::Warning => {
                println!("{} {}", tag.bright_yellow().bold(), message.text.bright_yellow())
            }
            Severity::Error => {
                println!("{} {}", tag.bright_red().bold(), message.text.bright_red())
            }
        }
    }
}
