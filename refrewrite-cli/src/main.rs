mod app;
mod rewrite;

use std::process::ExitCode;

use clap::{error::ErrorKind, CommandFactory, Parser};

use crate::app::Cli;

fn usage() {
    println!("rrw reference rewriter");
    println!("{}", Cli::command().render_help());
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            return match error.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                | ErrorKind::MissingRequiredArgument => {
                    usage();
                    ExitCode::from(2)
                }
                _ => {
                    eprintln!("{}", error.render());
                    usage();
                    ExitCode::from(3)
                }
            };
        }
    };

    if cli.has_blank_required() {
        usage();
        return ExitCode::from(2);
    }

    // refrewrite info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("refrewrite", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match rewrite::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            println!("Catastrophic failure while running rrw: {error:#}");
            ExitCode::from(1)
        }
    }
}
