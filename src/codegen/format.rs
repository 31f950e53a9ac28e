//! `print` lowering. Three independent paths:
//!
//! - a single argument that isn't a format-needing string literal is
//!   dispatched straight through by its static type (the "unary" path);
//! - a literal format string that does need formatting is walked here,
//!   char by char, interleaving `write_bytes` calls over the interned
//!   literal fragments (matching the splits `StringTable::add_format_literals`
//!   already made) with raw per-type print calls for each `%` specifier;
//! - anything else (a runtime-computed format string, or a literal paired
//!   with extra arguments) boxes every extra argument into a tagged
//!   16-byte slot and defers to `$print_format`.
//!
//! The formatted paths never append a trailing newline; callers embed
//! `\n` in the format string themselves. The unary path always appends
//! one, via the non-`_raw` runtime helpers.

use super::{require_same_type, type_of, Ctx, Env};
use crate::ast::{Expr, ExprKind};
use crate::error::{CompileError, Result};
use crate::string_table::needs_format;
use crate::types::Type;

pub fn emit_print(ctx: &Ctx, env: &Env, out: &mut String, args: &[Expr], line: usize) -> Result<()> {
    if args.is_empty() {
        return Err(CompileError::at("print requires at least one argument", line));
    }
    let literal = match &args[0].kind {
        ExprKind::StringLit(s) => Some(s.as_str()),
        _ => None,
    };
    let uses_format = args.len() > 1 || literal.is_some_and(needs_format);
    if !uses_format {
        return emit_unary_print(ctx, env, out, &args[0]);
    }
    let fmt_ty = type_of(&args[0])?;
    if fmt_ty != Type::String {
        return Err(CompileError::at("print format argument must be a string", line));
    }
    if let Some(literal) = literal {
        emit_formatted_print(ctx, env, out, literal, &args[1..], line)
    } else {
        emit_runtime_format_call(ctx, env, out, &args[0], &args[1..], line)
    }
}

/// A lone argument with nothing left to format: dispatched straight to
/// the non-`_raw` runtime helper matching its static type.
fn emit_unary_print(ctx: &Ctx, env: &Env, out: &mut String, arg: &Expr) -> Result<()> {
    let ty = type_of(arg)?;
    let helper = match ty {
        Type::Int => "$print_i64",
        Type::Bool => "$print_bool",
        Type::String => "$print_string",
        Type::Real => "$print_f64",
        _ => return Err(CompileError::at("Unsupported type for print", arg.line)),
    };
    super::expr::emit_expr(ctx, env, out, arg)?;
    out.push_str(&format!("    call {helper}\n"));
    Ok(())
}

/// A literal format string, known entirely at compile time (path A).
fn emit_formatted_print(ctx: &Ctx, env: &Env, out: &mut String, format: &str, args: &[Expr], line: usize) -> Result<()> {
    let chars: Vec<char> = format.chars().collect();
    let n = chars.len();
    let mut literal = String::new();
    let mut arg_index = 0usize;
    let mut i = 0usize;

    macro_rules! flush_literal {
        () => {
            if !literal.is_empty() {
                let offset = ctx
                    .strings
                    .offset_of(&literal)
                    .ok_or_else(|| CompileError::at("Internal error: format fragment not interned", line))?;
                out.push_str(&format!("    i32.const {}\n", offset + 8));
                out.push_str(&format!("    i32.const {}\n", literal.len()));
                out.push_str("    call $write_bytes\n");
                literal.clear();
            }
        };
    }

    while i < n {
        let c = chars[i];
        if c == '%' && i + 1 < n {
            let next = chars[i + 1];
            if next == '%' {
                literal.push('%');
                i += 2;
                continue;
            }
            flush_literal!();
            match next {
                'i' => {
                    let arg = next_arg(args, &mut arg_index, line)?;
                    require_same_type(&Type::Int, &type_of(arg)?, arg.line, ctx.structs)?;
                    super::expr::emit_expr(ctx, env, out, arg)?;
                    out.push_str("    call $print_i64_raw\n");
                    i += 2;
                }
                'b' => {
                    let arg = next_arg(args, &mut arg_index, line)?;
                    require_same_type(&Type::Bool, &type_of(arg)?, arg.line, ctx.structs)?;
                    super::expr::emit_expr(ctx, env, out, arg)?;
                    out.push_str("    call $print_bool_raw\n");
                    i += 2;
                }
                's' => {
                    let arg = next_arg(args, &mut arg_index, line)?;
                    require_same_type(&Type::String, &type_of(arg)?, arg.line, ctx.structs)?;
                    super::expr::emit_expr(ctx, env, out, arg)?;
                    out.push_str("    call $print_string_raw\n");
                    i += 2;
                }
                'r' | 'e' => {
                    let arg = next_arg(args, &mut arg_index, line)?;
                    require_same_type(&Type::Real, &type_of(arg)?, arg.line, ctx.structs)?;
                    i += 2;
                    let precision = parse_precision(&chars, &mut i, line)?;
                    super::expr::emit_expr(ctx, env, out, arg)?;
                    if next == 'r' {
                        match precision {
                            Some(p) => {
                                out.push_str(&format!("    i32.const {p}\n"));
                                out.push_str("    call $print_f64_prec\n");
                            }
                            None => out.push_str("    call $print_f64_raw\n"),
                        }
                    } else {
                        out.push_str(&format!("    i32.const {}\n", precision.unwrap_or(6)));
                        out.push_str("    call $print_f64_sci\n");
                    }
                }
                _ => return Err(CompileError::at("Unsupported format specifier in print", line)),
            }
            continue;
        }
        literal.push(c);
        i += 1;
    }
    flush_literal!();

    if arg_index != args.len() {
        return Err(CompileError::at("Too many arguments for format string", line));
    }
    Ok(())
}

fn next_arg<'a>(args: &'a [Expr], arg_index: &mut usize, line: usize) -> Result<&'a Expr> {
    let arg = args
        .get(*arg_index)
        .ok_or_else(|| CompileError::at("Not enough arguments for format string", line))?;
    *arg_index += 1;
    Ok(arg)
}

fn parse_precision(chars: &[char], i: &mut usize, line: usize) -> Result<Option<u32>> {
    let n = chars.len();
    if *i >= n || chars[*i] != '{' {
        return Ok(None);
    }
    *i += 1;
    if *i >= n || !chars[*i].is_ascii_digit() {
        return Err(CompileError::at("Format precision requires digits", line));
    }
    let start = *i;
    while *i < n && chars[*i].is_ascii_digit() {
        *i += 1;
    }
    let digits: String = chars[start..*i].iter().collect();
    if *i >= n || chars[*i] != '}' {
        return Err(CompileError::at("Format precision missing '}'", line));
    }
    *i += 1;
    Ok(Some(digits.parse().expect("validated digit run")))
}

/// A runtime-computed format string, or one known only once the argument
/// count is known (path B): box every extra argument into a 16-byte
/// tagged slot (tag, then the raw value) and let `$print_format` walk the
/// format string itself.
fn emit_runtime_format_call(ctx: &Ctx, env: &Env, out: &mut String, format_expr: &Expr, args: &[Expr], line: usize) -> Result<()> {
    super::expr::emit_expr(ctx, env, out, format_expr)?;
    out.push_str("    local.set $tmp0\n");

    let count = args.len() as i64;
    out.push_str(&format!("    i64.const {}\n", count * 16));
    out.push_str("    call $alloc\n");
    out.push_str("    local.set $tmp1\n");

    for (i, arg) in args.iter().enumerate() {
        let ty = type_of(arg)?;
        let tag = match ty {
            Type::Int => 1,
            Type::Real => 2,
            Type::Bool => 3,
            Type::String => 4,
            _ => return Err(CompileError::at("Unsupported value in runtime format call", arg.line)),
        };
        let slot = i as i64 * 16;

        out.push_str("    local.get $tmp1\n");
        out.push_str(&format!("    i64.const {slot}\n    i64.add\n"));
        out.push_str("    i32.wrap_i64\n");
        out.push_str(&format!("    i32.const {tag}\n    i32.store\n"));

        out.push_str("    local.get $tmp1\n");
        out.push_str(&format!("    i64.const {}\n    i64.add\n", slot + 8));
        out.push_str("    i32.wrap_i64\n");
        if ty == Type::Real {
            super::expr::emit_expr(ctx, env, out, arg)?;
            out.push_str("    f64.store\n");
        } else {
            super::expr::emit_expr(ctx, env, out, arg)?;
            out.push_str("    i64.store\n");
        }
    }

    out.push_str("    local.get $tmp0\n");
    out.push_str("    local.get $tmp1\n");
    out.push_str(&format!("    i32.const {count}\n"));
    out.push_str("    call $print_format\n");
    Ok(())
}
