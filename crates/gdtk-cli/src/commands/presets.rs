use colored::Colorize;
use gdtk_export::ExportFilter;
use miette::Result;

use super::{desktop_platforms, load_presets, open_project};

#[derive(Debug)]
pub struct ListPresetsArgs {
    pub project: String,
}

pub fn list_presets(args: ListPresetsArgs) -> Result<()> {
    let project = open_project(&args.project)?;
    let platforms = desktop_platforms();
    let store = load_presets(&project, &platforms)?;

    if store.presets.is_empty() {
        println!("{}", "No presets defined.".bright_yellow());
        return Ok(());
    }

    for preset in &store.presets {
        let filter = match preset.export_filter {
            ExportFilter::AllResources => "all resources",
            ExportFilter::SelectedScenes => "selected scenes",
            ExportFilter::SelectedResources => "selected resources",
            ExportFilter::ExcludeSelectedResources => "all but selected",
        };
        let encryption = if preset.enc_pck {
            if preset.enc_directory {
                "encrypted (directory + files)".bright_magenta()
            } else {
                "encrypted (files)".bright_magenta()
            }
        } else {
            "plaintext".dimmed()
        };
        println!(
            "{} {} {}",
            "•".bright_cyan(),
            preset.name.bright_white().bold(),
            format!("[{}]", preset.platform).bright_cyan()
        );
        println!("    {} · {}", filter, encryption);
        if !preset.export_path.is_empty() {
            println!("    {}", preset.export_path.dimmed());
        }
    }
    Ok(())
}
