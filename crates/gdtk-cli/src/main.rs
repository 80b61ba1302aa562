use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use miette::Result;

use commands::{
    list_presets, pack_project, zip_project, ListPresetsArgs, PackProjectArgs, ZipProjectArgs,
};

mod commands;
mod errors;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export the project as a .pck content pack
    Pack {
        /// The project directory (containing project.godot)
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Name of the preset to export; defaults to the first one
        #[arg(long)]
        preset: Option<String>,

        /// Destination path; defaults to the preset's export path
        #[arg(short, long)]
        output: Option<String>,

        /// Export with the debug feature set
        #[arg(long)]
        debug: bool,

        /// Append the pack to an existing executable instead of writing a
        /// standalone file
        #[arg(long)]
        embed: bool,
    },
    /// Export the project as a DEFLATE zip archive
    Zip {
        /// The project directory (containing project.godot)
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Name of the preset to export; defaults to the first one
        #[arg(long)]
        preset: Option<String>,

        /// Destination path; defaults to the preset's export path
        #[arg(short, long)]
        output: Option<String>,

        /// Export with the debug feature set
        #[arg(long)]
        debug: bool,
    },
    /// List the presets stored in export_presets.cfg
    Presets {
        /// The project directory (containing project.godot)
        #[arg(short, long, default_value = ".")]
        project: String,
    },
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).expect("failed to parse arguments")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();

    match args.command {
        Commands::Pack {
            project,
            preset,
            output,
            debug,
            embed,
        } => pack_project(PackProjectArgs {
            project,
            preset,
            output,
            debug,
            embed,
        }),
        Commands::Zip {
            project,
            preset,
            output,
            debug,
        } => zip_project(ZipProjectArgs {
            project,
            preset,
            output,
            debug,
        }),
        Commands::Presets { project } => list_presets(ListPresetsArgs { project }),
    }
}
