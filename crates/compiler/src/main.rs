//! FLYUX compiler CLI.
//!
//! `flyuxc [OPTIONS] <INPUT>` compiles a FLYUX source file to a native
//! executable. Diagnostics go to stderr, progress to stdout; the exit code
//! is 0 on success and 1 on any error.

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "flyuxc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "FLYUX compiler - compile FLYUX programs to executables", long_about = None)]
struct Cli {
    /// Input source file
    #[arg(required_unless_present = "completions")]
    input: Option<PathBuf>,

    /// Output executable path (defaults to the input basename)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after writing the LLVM IR file, do not link
    #[arg(long)]
    emit_ir: bool,

    /// Keep the intermediate .ll file next to the executable
    #[arg(long)]
    keep_ir: bool,

    /// Compiler configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the normalized source and exit
    #[arg(long)]
    dump_normalized: bool,

    /// Print the token table and exit
    #[arg(long)]
    dump_tokens: bool,

    /// Print the identifier map and exit
    #[arg(long)]
    dump_varmap: bool,

    /// Generate shell completion scripts and exit
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "flyuxc", &mut io::stdout());
        return;
    }

    let input = cli.input.expect("clap enforces input");

    let config = match &cli.config {
        Some(path) => match flyuxc::CompilerConfig::from_toml_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => flyuxc::CompilerConfig::default(),
    };

    if cli.dump_normalized || cli.dump_tokens || cli.dump_varmap {
        run_dumps(&input, cli.dump_normalized, cli.dump_tokens, cli.dump_varmap);
        return;
    }

    let output = cli.output.unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default();
        PathBuf::from(stem)
    });

    match flyuxc::compile_file(&input, &output, cli.keep_ir, cli.emit_ir, &config) {
        Ok(()) => {
            if cli.emit_ir {
                println!(
                    "Emitted {} -> {}",
                    input.display(),
                    output.with_extension("ll").display()
                );
            } else {
                println!("Compiled {} -> {}", input.display(), output.display());
                if cli.keep_ir {
                    let ir_path = output.with_extension("ll");
                    if ir_path.exists() {
                        println!("IR saved to {}", ir_path.display());
                    }
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn run_dumps(input: &PathBuf, normalized: bool, tokens: bool, varmap: bool) {
    let source = match std::fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", input.display(), e);
            process::exit(1);
        }
    };
    let frontend = match flyuxc::run_frontend(&source) {
        Ok(frontend) => frontend,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if normalized {
        println!("=== Normalized Source ===");
        println!("{}", frontend.normalized);
    }
    if varmap {
        println!("=== Variable Map ===");
        print!("{}", frontend.varmap.table_string());
    }
    if tokens {
        println!("=== Tokens ===");
        print!("{}", flyuxc::lexer::tokens_table_string(&frontend.tokens));
    }
}
