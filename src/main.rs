use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser as ClapParser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use rlox::lox::Lox;

#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Script to execute; starts an interactive prompt when omitted.
    script: Option<PathBuf>,

    /// Enables verbose scanner/parser tracing.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Cli = match Cli::try_parse() {
        Ok(args) => args,

        Err(err)
            if err.kind() == ErrorKind::DisplayHelp
                || err.kind() == ErrorKind::DisplayVersion =>
        {
            err.print()?;
            return Ok(());
        }

        // Anything else (extra positional arguments included) is a usage
        // error.
        Err(err) => {
            err.print()?;
            process::exit(64);
        }
    };

    let level: LevelFilter = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    SimpleLogger::new().with_level(level).init()?;

    let mut lox: Lox = Lox::new();
    lox.set_debug(args.debug);

    match args.script {
        Some(path) => {
            let code: i32 = lox.run_file(&path)?;

            if code != 0 {
                process::exit(code);
            }
        }

        None => lox.run_prompt()?,
    }

    Ok(())
}
