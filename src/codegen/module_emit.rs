//! Final module assembly: header, imports, memory, data segments, the
//! fixed runtime, every function and struct initializer, and the
//! `_start` entry point.

use super::function::emit_function;
use super::struct_emit::emit_struct_init;
use super::{runtime, Ctx};
use crate::ast::Program;
use crate::error::{CompileError, Result};
use crate::types::Type;

pub fn emit_module(ctx: &Ctx, program: &Program) -> Result<String> {
    let mut out = String::new();
    out.push_str("(module\n");
    out.push_str("  (import \"wasi_snapshot_preview1\" \"fd_write\" (func $fd_write (param i32 i32 i32 i32) (result i32)))\n");
    out.push_str("  (import \"wasi_snapshot_preview1\" \"args_sizes_get\" (func $args_sizes_get (param i32 i32) (result i32)))\n");
    out.push_str("  (import \"wasi_snapshot_preview1\" \"args_get\" (func $args_get (param i32 i32) (result i32)))\n");
    out.push_str("  (memory (export \"memory\") 1)\n");
    out.push_str(&format!("  (global $heap (mut i64) (i64.const {}))\n", ctx.strings.heap_start()));

    emit_data_segments(ctx, &mut out);
    runtime::emit_runtime(ctx, &mut out)?;

    for f in &program.functions {
        emit_function(ctx, &mut out, f, true)?;
    }
    for def in &program.structs {
        emit_struct_init(ctx, &mut out, &def.name)?;
        for m in &def.methods {
            emit_function(ctx, &mut out, m, false)?;
        }
    }

    emit_start(ctx, &mut out, program)?;

    out.push_str(")\n");
    Ok(out)
}

fn emit_data_segments(ctx: &Ctx, out: &mut String) {
    for (offset, bytes) in ctx.strings.segments() {
        out.push_str(&format!("  (data (i32.const {offset}) \"{}\")\n", escape_bytes(bytes)));
    }
}

/// Printable ASCII except `"` and `\` passes through; everything else is
/// an uppercase `\XX` hex escape, matching WAT string literal syntax.
fn escape_bytes(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' => s.push_str("\\22"),
            b'\\' => s.push_str("\\5C"),
            0x20..=0x7E => s.push(b as char),
            _ => s.push_str(&format!("\\{b:02X}")),
        }
    }
    s
}

fn emit_start(ctx: &Ctx, out: &mut String, program: &Program) -> Result<()> {
    let main = program
        .functions
        .iter()
        .find(|f| f.name == "main")
        .ok_or_else(|| CompileError::new("Program has no 'main' function"))?;

    let info = ctx
        .functions
        .get("main")
        .ok_or_else(|| CompileError::new("Internal error: main missing from function table"))?;

    out.push_str("  (func $_start (export \"_start\")\n");
    match main.params.len() {
        0 => {
            out.push_str(&format!("    call {}\n", info.wasm_name));
        }
        1 => {
            let is_string_array = matches!(&info.params[0], Type::Array(inner) if **inner == Type::String);
            if !is_string_array {
                return Err(CompileError::at("main's only parameter must be string[]", main.line));
            }
            out.push_str("    call $build_args\n");
            out.push_str(&format!("    call {}\n", info.wasm_name));
        }
        _ => return Err(CompileError::at("main must take no arguments or a single string[]", main.line)),
    }
    if info.return_type != Type::Void {
        out.push_str("    drop\n");
    }
    out.push_str("  )\n");
    Ok(())
}
