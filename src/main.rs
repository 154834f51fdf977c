use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};

use strand::{Program, RunEnvironment};

/// Strand is a small & convenient emulator for the LS-8 educational computer.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.ls8` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a textual `.ls8` file and output to terminal
    Run {
        /// `.ls8` file to run
        name: PathBuf,
        /// Print a machine state trace to stderr before every step
        #[arg(short, long)]
        trace: bool,
        /// Stop with an error after this many steps
        #[arg(long)]
        max_steps: Option<u64>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Check a `.ls8` file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
}

#[derive(Default)]
struct RunOptions {
    trace: bool,
    max_steps: Option<u64>,
    minimal: bool,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(strand::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    match args.command {
        Some(Command::Run {
            name,
            trace,
            max_steps,
            minimal,
        }) => run(
            &name,
            RunOptions {
                trace,
                max_steps,
                minimal,
            },
        ),
        Some(Command::Check { name }) => {
            file_message(Green, "Checking", &name);
            let program = load(&name)?;
            message(
                Green,
                "Success",
                &format!("{} bytes, no errors found!", program.len()),
            );
            Ok(())
        }
        None => {
            if let Some(path) = args.path {
                run(&path, RunOptions::default())
            } else {
                println!("\n~ strand v{VERSION} ~");
                println!("{}", LOGO.truecolor(255, 183, 197).bold());
                println!("{SHORT_INFO}");
                // Missing argument is a usage error
                std::process::exit(64);
            }
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &PathBuf, opts: RunOptions) -> Result<()> {
    if !opts.minimal {
        file_message(MsgColor::Green, "Loading", name);
    }
    let program = load(name)?;
    let mut env = RunEnvironment::new(&program);
    env.set_trace(opts.trace);
    env.set_step_limit(opts.max_steps);

    if !opts.minimal {
        message(MsgColor::Green, "Running", "loaded program");
    }
    env.run()?;

    if !opts.minimal {
        file_message(MsgColor::Green, "Completed", name);
    }
    Ok(())
}

fn load(name: &PathBuf) -> Result<Program> {
    let src = match fs::read_to_string(name) {
        Ok(src) => src,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            eprintln!("strand: {} not found", name.display());
            std::process::exit(2);
        }
        Err(e) => return Err(e).into_diagnostic(),
    };
    Program::parse(&src)
}

const LOGO: &str = r#"
         _                            _
     ___| |_  _ __  __ _  _ __    __| |
    / __| __|| '__|/ _` || '_ \  / _` |
    \__ \ |_ | |  | (_| || | | || (_| |
    |___/\__||_|   \__,_||_| |_| \__,_|"#;

const SHORT_INFO: &str = r"
Welcome to strand, an emulator for the LS-8 educational 8-bit computer.
Provide a `.ls8` program file to run it, or use `-h` or `--help` to access
the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
