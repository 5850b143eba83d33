#[cfg(not(feature = "cli"))]
compile_error!("The `esedb` binary requires the `cli` feature. Build with `--features cli`.");

use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::process;

use ese::cli;
use ese::cli::app::{Cli, ColorMode, Commands};
use ese::EseError;

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {} // colored auto-detects tty
    }

    let writer_result: Result<Box<dyn Write>, EseError> = match &cli.output {
        Some(path) => File::create(path)
            .map(|f| Box::new(f) as Box<dyn Write>)
            .map_err(|e| EseError::Io(format!("Cannot create {}: {}", path, e))),
        None => Ok(Box::new(std::io::stdout()) as Box<dyn Write>),
    };

    let mut writer = match writer_result {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Info {
            file,
            verbose,
            json,
        } => cli::info::execute(
            &cli::info::InfoOptions {
                file,
                verbose,
                json,
            },
            &mut writer,
        ),

        Commands::Export {
            file,
            target,
            table,
            mode,
            logfile,
        } => cli::export::execute(
            &cli::export::ExportOptions {
                file,
                target,
                table,
                mode,
                logfile,
            },
            &mut writer,
        ),

        Commands::Pages {
            file,
            page,
            show_empty,
            json,
        } => cli::pages::execute(
            &cli::pages::PagesOptions {
                file,
                page,
                show_empty,
                json,
            },
            &mut writer,
        ),

        Commands::Dump {
            file,
            page,
            offset,
            length,
        } => cli::dump::execute(
            &cli::dump::DumpOptions {
                file,
                page,
                offset,
                length,
            },
            &mut writer,
        ),

        Commands::Recover {
            file,
            table,
            verbose,
            json,
        } => cli::recover::execute(
            &cli::recover::RecoverOptions {
                file,
                table,
                verbose,
                json,
            },
            &mut writer,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
