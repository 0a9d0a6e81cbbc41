//! Rill Compiler CLI
//!
//! Command-line interface for type-checking .rill programs and inspecting
//! their SSA lowering.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use rillc::CompilerConfig;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "rillc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rill compiler front-end - type-check and lower .rill programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and type-check a .rill file, printing each phrase's stack effect
    Check {
        /// Input .rill source file
        input: PathBuf,

        /// Path to a compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print phrase sources alongside their types
        #[arg(short, long)]
        verbose: bool,
    },

    /// Lower each phrase to SSA form and print the control-flow graphs
    Ssa {
        /// Input .rill source file
        input: PathBuf,

        /// Path to a compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip constant propagation
        #[arg(long)]
        no_fold: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            input,
            config,
            verbose,
        } => {
            let config = load_config(config.as_deref());
            run_check(&input, &config, verbose);
        }
        Commands::Ssa {
            input,
            config,
            no_fold,
        } => {
            let mut config = load_config(config.as_deref());
            if no_fold {
                config.optimize.constant_folding = false;
            }
            run_ssa(&input, &config);
        }
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "rillc", &mut io::stdout());
        }
    }
}

fn load_config(path: Option<&Path>) -> CompilerConfig {
    match path {
        Some(path) => match CompilerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::new(),
    }
}

fn run_check(input: &Path, config: &CompilerConfig, verbose: bool) {
    match rillc::check_file(input) {
        Ok(reports) => {
            let verbose = verbose || config.output.verbose;
            for report in reports {
                if verbose {
                    println!("{} :: {}", report.source, report.ty);
                } else {
                    println!("{}", report.ty);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_ssa(input: &Path, config: &CompilerConfig) {
    match rillc::lower_file(input, config) {
        Ok(lowered) => {
            for phrase in lowered {
                println!("{} :: {}", phrase.source, phrase.ty);
                print!("{}", phrase.cfg.render());
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
