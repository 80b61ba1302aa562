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
pub struct ZipProjectArgs {
    pub project: String,
    pub preset: Option<String>,
    pub output: Option<String>,
    pub debug: bool,
}

pub fn zip_project(args: ZipProjectArgs) -> Result<()> {
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

    let mut output = resolve_output(&project, &preset, args.output.as_deref())?;
    if args.output.is_none() {
        // The preset's export path targets a .pck; swap the extension.
        output.set_extension("zip");
    }
    ensure_parent_dir(&output)?;

    println!(
        "{} {}",
        "🗜️  Zipping project:".bright_blue().bold(),
        preset.name.bright_cyan().bold()
    );

    let mut ctx = ExportContext::new(&project, platform);
    ctx.plugins.push(Rc::new(RefCell::new(
        TextResourceToBinaryPlugin::from_project(&project),
    )));

    let mut progress = ConsoleProgress;
    let result = ctx.export_zip(&preset, args.debug, &output, &mut progress);

    print_messages(&ctx.messages);
    result.map_err(CliError::Export)?;

    println!(
        "{}\n{} {}",
        "✅ Zip created successfully!".bright_green().bold(),
        "📍 Path:".bright_green(),
        output.display().to_string().bright_white().bold()
    );
    Ok(())
}
