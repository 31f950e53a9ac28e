//! ion compiler library.
//!
//! Translates a small statically-typed OOP surface language into
//! textual WebAssembly (`.wat`) targeting WASI. The pipeline, run by
//! [`compile_file`], mirrors the reference implementation's stages:
//!
//! 1. [`module_loader`] resolves every `import` to a fixed point and
//!    merges the result into one [`ast::Program`], qualifying
//!    cross-module calls.
//! 2. [`typechecker`] infers and caches every expression's [`types::Type`].
//! 3. [`codegen`] lays out structs, builds the function and string
//!    tables, and emits the final module text.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod function_catalog;
pub mod lexer;
pub mod module_loader;
pub mod parser;
pub mod string_table;
pub mod typechecker;
pub mod types;

use error::{CompileError, Result};
use module_loader::ModuleLoader;
use std::path::Path;

/// Compiles a single entry-point source file (and every module it
/// transitively imports) into `.wat` text.
pub fn compile_file(input_path: &str) -> Result<String> {
    let main_dir = Path::new(input_path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut loader = ModuleLoader::new(main_dir);
    loader.load(input_path)?;
    let all_types = loader.collect_type_names();
    loader.parse_programs(&all_types)?;
    let program = loader.merge_programs(input_path)?;

    codegen::generate(&program)
}

/// Compiles already-loaded source text with no import resolution, for
/// callers (tests, REPL-style tools) that don't have it on disk. The
/// parser discovers this file's own struct names via its pre-scan, so
/// only the four built-in primitive names need seeding here.
pub fn compile_source(source: &str) -> Result<String> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let base_types: std::collections::HashSet<String> =
        ["int", "real", "bool", "string"].iter().map(|s| s.to_string()).collect();
    let mut parser = parser::Parser::new(tokens, &base_types);
    let program = parser.parse_program()?;
    codegen::generate(&program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_hello_world() {
        let wat = compile_source("void main()\n    print(\"hi\\n\")\n").unwrap();
        assert!(wat.contains("(module"));
        assert!(wat.contains("$main"));
    }

    #[test]
    fn test_compile_source_rejects_missing_main() {
        let err = compile_source("void helper()\n    print(\"x\\n\")\n").unwrap_err();
        assert!(err.message.contains("main"));
    }
}
