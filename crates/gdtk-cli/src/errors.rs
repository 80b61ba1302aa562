use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Project not found at {path}")]
    #[diagnostic(
        code(project::not_found),
        help("Pass --project pointing at a directory that contains project.godot")
    )]
    ProjectNotFound { path: PathBuf },

    #[error("No presets found")]
    #[diagnostic(
        code(preset::none),
        help("Create an export preset in export_presets.cfg first")
    )]
    NoPresets,

    #[error("Preset not found: {name}")]
    #[diagnostic(
        code(preset::not_found),
        help("Run `gdtk presets` to list the presets the project defines")
    )]
    PresetNotFound { name: String },

    #[error("Preset '{name}' has no export path")]
    #[diagnostic(
        code(preset::no_export_path),
        help("Set export_path in the preset, or pass --output")
    )]
    MissingExportPath { name: String },

    #[error("Embedding requires an existing executable at {path}")]
    #[diagnostic(
        code(pack::embed_target_missing),
        help("--embed appends the pack to an executable that must already exist")
    )]
    EmbedTargetMissing { path: PathBuf },

    #[error(transparent)]
    #[diagnostic(code(export::failed))]
    Export(#[from] gdtk_export::ExportError),
}
