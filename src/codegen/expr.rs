//! Expression emission: every `emit_expr` call pushes exactly one value
//! of `type_of(expr)`'s wasm representation onto the stack.

use super::{format as fmt_emit, load_op, require_same_type, type_of, Ctx, Env};
use crate::ast::{Expr, ExprKind};
use crate::error::{CompileError, Result};
use crate::types::Type;

pub fn emit_expr(ctx: &Ctx, env: &Env, out: &mut String, expr: &Expr) -> Result<()> {
    match &expr.kind {
        ExprKind::IntLit(n) => {
            out.push_str(&format!("    i64.const {n}\n"));
            Ok(())
        }
        ExprKind::RealLitBits(_) => {
            out.push_str(&format!("    f64.const {:?}\n", expr.real_value()));
            Ok(())
        }
        ExprKind::BoolLit(b) => {
            out.push_str(&format!("    i64.const {}\n", if *b { 1 } else { 0 }));
            Ok(())
        }
        ExprKind::StringLit(s) => {
            let offset = ctx
                .strings
                .offset_of(s)
                .ok_or_else(|| CompileError::at("Internal error: string literal not interned", expr.line))?;
            out.push_str(&format!("    i64.const {offset}\n"));
            Ok(())
        }
        ExprKind::Var(name) => emit_var(ctx, env, out, name, expr.line),
        ExprKind::Unary { op, operand } => emit_unary(ctx, env, out, op, operand),
        ExprKind::Binary { op, left, right } => emit_binary(ctx, env, out, op, left, right),
        ExprKind::Field { base, field } => emit_field(ctx, env, out, base, field, expr.line),
        ExprKind::Index { base, index } => emit_index(ctx, env, out, base, index, expr.line),
        ExprKind::Call { base, args } => emit_call(ctx, env, out, base, args, expr.line),
        ExprKind::NewExpr { new_type, size } => emit_new(ctx, env, out, new_type, size, expr.line),
    }
}

fn emit_var(ctx: &Ctx, env: &Env, out: &mut String, name: &str, line: usize) -> Result<()> {
    if let Some(local) = env.locals.get(name) {
        out.push_str(&format!("    local.get {}\n", local.wasm_name));
        return Ok(());
    }
    if let Some(param) = env.params.get(name) {
        out.push_str(&format!("    local.get {}\n", param.wasm_name));
        return Ok(());
    }
    if let Some(owner) = &env.owner {
        if let Some(info) = ctx.structs.get(owner) {
            if let Some(field) = info.field(name) {
                out.push_str("    local.get $this\n");
                out.push_str(&format!("    i64.const {}\n", field.offset));
                out.push_str("    i64.add\n");
                out.push_str("    i32.wrap_i64\n");
                out.push_str(&format!("    {}\n", load_op(&field.ty)));
                return Ok(());
            }
        }
    }
    Err(CompileError::at(format!("Unknown identifier {name}"), line))
}

fn emit_unary(ctx: &Ctx, env: &Env, out: &mut String, op: &str, operand: &Expr) -> Result<()> {
    emit_expr(ctx, env, out, operand)?;
    let ty = type_of(operand)?;
    match op {
        "-" if ty.is_int() => {
            out.push_str("    i64.const -1\n    i64.mul\n");
        }
        "-" => out.push_str("    f64.neg\n"),
        "!" => out.push_str("    i64.eqz\n    i64.extend_i32_u\n"),
        _ => return Err(CompileError::at("Unknown unary operator", operand.line)),
    }
    Ok(())
}

fn emit_binary(ctx: &Ctx, env: &Env, out: &mut String, op: &str, left: &Expr, right: &Expr) -> Result<()> {
    let left_ty = type_of(left)?;
    let right_ty = type_of(right)?;
    let promote_left = left_ty.is_int() && right_ty.is_real();
    let promote_right = right_ty.is_int() && left_ty.is_real();

    emit_expr(ctx, env, out, left)?;
    if promote_left {
        out.push_str("    f64.convert_i64_s\n");
    }
    emit_expr(ctx, env, out, right)?;
    if promote_right {
        out.push_str("    f64.convert_i64_s\n");
    }

    let operand_is_real = left_ty.is_real() || right_ty.is_real();

    match op {
        "+" | "-" | "*" | "/" | "%" => {
            let instr = if operand_is_real {
                match op {
                    "+" => "f64.add",
                    "-" => "f64.sub",
                    "*" => "f64.mul",
                    "/" => "f64.div",
                    _ => return Err(CompileError::at("'%' is not defined for real", left.line)),
                }
            } else {
                match op {
                    "+" => "i64.add",
                    "-" => "i64.sub",
                    "*" => "i64.mul",
                    "/" => "i64.div_s",
                    "%" => "i64.rem_s",
                    _ => unreachable!(),
                }
            };
            out.push_str(&format!("    {instr}\n"));
        }
        "==" | "!=" | "<" | "<=" | ">" | ">=" => {
            let instr = if operand_is_real {
                match op {
                    "==" => "f64.eq",
                    "!=" => "f64.ne",
                    "<" => "f64.lt",
                    "<=" => "f64.le",
                    ">" => "f64.gt",
                    ">=" => "f64.ge",
                    _ => unreachable!(),
                }
            } else {
                match op {
                    "==" => "i64.eq",
                    "!=" => "i64.ne",
                    "<" => "i64.lt_s",
                    "<=" => "i64.le_s",
                    ">" => "i64.gt_s",
                    ">=" => "i64.ge_s",
                    _ => unreachable!(),
                }
            };
            out.push_str(&format!("    {instr}\n    i64.extend_i32_u\n"));
        }
        "and" => out.push_str("    i64.and\n"),
        "or" => out.push_str("    i64.or\n"),
        _ => return Err(CompileError::at("Unknown binary operator", left.line)),
    }
    Ok(())
}

fn emit_field(ctx: &Ctx, env: &Env, out: &mut String, base: &Expr, field: &str, line: usize) -> Result<()> {
    if field == "length" {
        let base_ty = type_of(base)?;
        if matches!(base_ty, Type::Array(_) | Type::String) {
            emit_expr(ctx, env, out, base)?;
            out.push_str("    i32.wrap_i64\n    i64.load\n");
            return Ok(());
        }
    }
    let base_ty = type_of(base)?;
    let struct_name = match &base_ty {
        Type::Struct(name) => name,
        _ => return Err(CompileError::at("Field access on non-struct", line)),
    };
    let info = ctx
        .structs
        .get(struct_name)
        .ok_or_else(|| CompileError::at(format!("Unknown struct {struct_name}"), line))?;
    let finfo = info
        .field(field)
        .ok_or_else(|| CompileError::at(format!("Unknown field {field} on struct {struct_name}"), line))?
        .clone();
    emit_expr(ctx, env, out, base)?;
    out.push_str(&format!("    i64.const {}\n    i64.add\n", finfo.offset));
    out.push_str("    i32.wrap_i64\n");
    out.push_str(&format!("    {}\n", load_op(&finfo.ty)));
    Ok(())
}

fn emit_index(ctx: &Ctx, env: &Env, out: &mut String, base: &Expr, index: &Expr, line: usize) -> Result<()> {
    let base_ty = type_of(base)?;
    let element = match base_ty {
        Type::Array(element) => *element,
        _ => return Err(CompileError::at("Not an array", line)),
    };
    emit_expr(ctx, env, out, base)?;
    out.push_str("    local.set $tmp0\n");
    emit_expr(ctx, env, out, index)?;
    out.push_str("    local.set $tmp1\n");
    out.push_str("    local.get $tmp0\n");
    out.push_str("    i64.const 8\n    i64.add\n");
    out.push_str("    local.get $tmp1\n");
    out.push_str("    i64.const 8\n    i64.mul\n");
    out.push_str("    i64.add\n");
    out.push_str("    i32.wrap_i64\n");
    out.push_str(&format!("    {}\n", load_op(&element)));
    Ok(())
}

fn emit_call(ctx: &Ctx, env: &Env, out: &mut String, base: &Expr, args: &[Expr], line: usize) -> Result<()> {
    if let ExprKind::Var(name) = &base.kind {
        if name == "print" {
            return fmt_emit::emit_print(ctx, env, out, args, line);
        }
        if name == "sqrt" {
            if args.len() != 1 {
                return Err(CompileError::at("sqrt takes exactly one argument", line));
            }
            let arg_ty = type_of(&args[0])?;
            if !arg_ty.is_real() {
                return Err(CompileError::at(format!("sqrt expects real at line {line}"), line));
            }
            emit_expr(ctx, env, out, &args[0])?;
            out.push_str("    f64.sqrt\n");
            return Ok(());
        }
        let info = ctx
            .functions
            .get(name)
            .ok_or_else(|| CompileError::at(format!("Unknown function {name}"), line))?
            .clone();
        if args.len() != info.params.len() {
            return Err(CompileError::at(format!("Wrong number of arguments to {name}"), line));
        }
        for (arg, expected) in args.iter().zip(&info.params) {
            let actual = type_of(arg)?;
            require_same_type(expected, &actual, arg.line, ctx.structs)?;
            emit_expr(ctx, env, out, arg)?;
        }
        out.push_str(&format!("    call {}\n", info.wasm_name));
        return Ok(());
    }

    if let ExprKind::Field { base: field_base, field } = &base.kind {
        let base_ty = type_of(field_base)?;
        if matches!(base_ty, Type::Array(_) | Type::String) && field == "length" {
            return emit_field(ctx, env, out, field_base, field, line);
        }
        let struct_name = match &base_ty {
            Type::Struct(name) => name.clone(),
            _ => return Err(CompileError::at("Method call on non-struct", line)),
        };
        let method_name = format!("{struct_name}.{field}");
        let info = ctx
            .functions
            .get(&method_name)
            .ok_or_else(|| CompileError::at(format!("Unknown method {method_name}"), line))?
            .clone();
        if args.len() + 1 != info.params.len() {
            return Err(CompileError::at(format!("Wrong number of arguments to {method_name}"), line));
        }
        // `this` is whatever value field_base evaluates to; no extra work
        // needed to pass it beyond emitting it first.
        emit_expr(ctx, env, out, field_base)?;
        for (arg, expected) in args.iter().zip(info.params.iter().skip(1)) {
            let actual = type_of(arg)?;
            require_same_type(expected, &actual, arg.line, ctx.structs)?;
            emit_expr(ctx, env, out, arg)?;
        }
        out.push_str(&format!("    call {}\n", info.wasm_name));
        return Ok(());
    }

    Err(CompileError::at("Unsupported call expression", line))
}

fn emit_new(
    ctx: &Ctx,
    env: &Env,
    out: &mut String,
    new_type: &crate::ast::TypeSpec,
    size: &Option<Box<Expr>>,
    line: usize,
) -> Result<()> {
    if let Some(size_expr) = size {
        emit_expr(ctx, env, out, size_expr)?;
        out.push_str("    local.set $tmp0\n");
        out.push_str("    local.get $tmp0\n");
        out.push_str("    i64.const 8\n    i64.mul\n    i64.const 8\n    i64.add\n");
        out.push_str("    call $alloc\n");
        out.push_str("    local.set $tmp1\n");
        out.push_str("    local.get $tmp1\n");
        out.push_str("    i32.wrap_i64\n");
        out.push_str("    local.get $tmp0\n");
        out.push_str("    i64.store\n");
        out.push_str("    local.get $tmp1\n");
        return Ok(());
    }
    let struct_name = &new_type.name;
    let info = ctx
        .structs
        .get(struct_name)
        .ok_or_else(|| CompileError::at(format!("Unknown struct {struct_name}"), line))?;
    out.push_str(&format!("    i64.const {}\n", info.size));
    out.push_str("    call $alloc\n");
    out.push_str("    local.set $tmp0\n");
    out.push_str("    local.get $tmp0\n");
    out.push_str(&format!("    call $init_{struct_name}\n"));
    out.push_str("    local.get $tmp0\n");
    Ok(())
}
