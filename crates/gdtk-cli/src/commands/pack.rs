use std::cell::RefCell;
use std::rc::Rc;

use colored::Colorize;
use gdtk_export::{ExportContext, ExportPlatform, TextResourceToBinaryPlugin};
use miette::Result;

use super::{
    desktop_platforms, ensure_parent_dir, load_presets, open_project, print_messages,
    resolve_output, select_preset, ConsoleProgress,
};
use crate::errors::CliError;

#[derive(Debug)]
pub struct PackProjectArgs {
    pub project: String,
    pub preset: Option<String>,
    pub output: Option<String>,
    pub debug: bool,
    pub embed: bool,
}

pub fn pack_project(args: PackProjectArgs) -> Result<()> {
    let project = open_project(&args.project)?;
    let platforms = desktop_platforms();
    let store = load_presets(&project, &platforms)?;
    let preset = select_preset(&store, args.preset.as_deref())?.clone();

    let platform = platforms
        .iter()
        .find(|p| p.name() == preset.platform)
        .ok_or_else(|| CliError::PresetNotFound {
            name: preset.platform.clone(),
        })?;

    let output = resolve_output(&project, &preset, args.output.as_deref())?;
    if args.embed && !output.is_file() {
        return Err(CliError::EmbedTargetMissing { path: output }.into());
    }
    ensure_parent_dir(&output)?;

    println!(
        "{} {}",
        "📦 Packing project:".bright_blue().bold(),
        preset.name.bright_cyan().bold()
    );

    let mut ctx = ExportContext::new(&project, platform);
    ctx.plugins.push(Rc::new(RefCell::new(
        TextResourceToBinaryPlugin::from_project(&project),
    )));

    let mut progress = ConsoleProgress;
    let result = if args.embed {
        let notifier = ctx.begin_plugins(&preset, args.debug, &output, 0);
        let mut so_files = Vec::new();
        let result = ctx.save_pack(
            &preset,
            args.debug,
            &output,
            true,
            &mut so_files,
            &mut progress,
        );
        drop(notifier);
        result
    } else {
        ctx.export_pack(&preset, args.debug, &output, &mut progress)
    };

    print_messages(&ctx.messages);
    let summary = result.map_err(CliError::Export)?;

    println!(
        "{}\n{} {} {}",
        "✅ Pack created successfully!".bright_green().bold(),
        "📍 Path:".bright_green(),
        output.display().to_string().bright_white().bold(),
        format!("({} files)", summary.file_count).dimmed()
    );
    Ok(())
}
