//! ion compiler CLI.
//!
//! Reads a `.ion` source file, compiles it to WebAssembly text, and
//! writes the result to disk.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "ionc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "ion compiler - compile .ion programs to WebAssembly text", long_about = None)]
struct Cli {
    /// Input .ion source file
    input: PathBuf,

    /// Output .wat file path
    #[arg(short, long, default_value = "output.wat")]
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    match ionc::compile_file(&cli.input.to_string_lossy()) {
        Ok(wat) => {
            if let Err(e) = std::fs::write(&cli.output, wat) {
                eprintln!("Unable to write output file: {e}");
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Compile error: {e}");
            process::exit(1);
        }
    }
}
