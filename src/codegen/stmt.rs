//! Statement emission, including assignment targets (`Var`/`Field`/
//! `Index`) and the `if`/`while` condition wrapper.

use super::{emit_zero, expr::emit_expr, require_same_type, store_op, type_of, Ctx, Env, Local};
use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::error::{CompileError, Result};
use crate::types::Type;

pub fn emit_block(ctx: &Ctx, env: &mut Env, out: &mut String, stmts: &[Stmt]) -> Result<()> {
    for stmt in stmts {
        emit_stmt(ctx, env, out, stmt)?;
    }
    Ok(())
}

fn emit_stmt(ctx: &Ctx, env: &mut Env, out: &mut String, stmt: &Stmt) -> Result<()> {
    match &stmt.kind {
        StmtKind::VarDecl { var_type, name, init } => {
            let ty = ctx.resolver.resolve(var_type)?;
            let wasm_name = format!("$v{name}");
            match init {
                Some(expr) => {
                    let actual = type_of(expr)?;
                    require_same_type(&ty, &actual, stmt.line, ctx.structs)?;
                    emit_expr(ctx, env, out, expr)?;
                }
                None => emit_zero(out, &ty),
            }
            out.push_str(&format!("    local.set {wasm_name}\n"));
            env.locals.insert(name.clone(), Local { wasm_name, ty });
        }
        StmtKind::Assign { target, value } => emit_assign(ctx, env, out, target, value, stmt.line)?,
        StmtKind::If { cond, then_body, else_body } => {
            emit_condition(ctx, env, out, cond)?;
            out.push_str("    if\n");
            let mut then_env = env.clone();
            emit_block(ctx, &mut then_env, out, then_body)?;
            if !else_body.is_empty() {
                out.push_str("    else\n");
                let mut else_env = env.clone();
                emit_block(ctx, &mut else_env, out, else_body)?;
            }
            out.push_str("    end\n");
        }
        StmtKind::While { cond, body } => {
            out.push_str("    block\n      loop\n");
            emit_condition(ctx, env, out, cond)?;
            out.push_str("        i32.eqz\n        br_if 1\n");
            let mut loop_env = env.clone();
            emit_block(ctx, &mut loop_env, out, body)?;
            out.push_str("        br 0\n      end\n    end\n");
        }
        StmtKind::Return(Some(expr)) => {
            emit_expr(ctx, env, out, expr)?;
            out.push_str("    return\n");
        }
        StmtKind::Return(None) => out.push_str("    return\n"),
        StmtKind::ExprStmt(expr) => {
            emit_expr(ctx, env, out, expr)?;
            if type_of(expr)? != Type::Void {
                out.push_str("    drop\n");
            }
        }
    }
    Ok(())
}

fn emit_condition(ctx: &Ctx, env: &Env, out: &mut String, cond: &Expr) -> Result<()> {
    if type_of(cond)? != Type::Bool {
        return Err(CompileError::at("Condition must be bool", cond.line));
    }
    emit_expr(ctx, env, out, cond)?;
    out.push_str("    i32.wrap_i64\n");
    Ok(())
}

fn emit_assign(ctx: &Ctx, env: &Env, out: &mut String, target: &Expr, value: &Expr, line: usize) -> Result<()> {
    let value_ty = type_of(value)?;

    if let ExprKind::Var(name) = &target.kind {
        if let Some(local) = env.locals.get(name) {
            require_same_type(&local.ty, &value_ty, line, ctx.structs)?;
            emit_expr(ctx, env, out, value)?;
            out.push_str(&format!("    local.set {}\n", local.wasm_name));
            return Ok(());
        }
        if let Some(param) = env.params.get(name) {
            require_same_type(&param.ty, &value_ty, line, ctx.structs)?;
            emit_expr(ctx, env, out, value)?;
            out.push_str(&format!("    local.set {}\n", param.wasm_name));
            return Ok(());
        }
        if let Some(owner) = &env.owner {
            if let Some(info) = ctx.structs.get(owner) {
                if let Some(field) = info.field(name) {
                    let field = field.clone();
                    require_same_type(&field.ty, &value_ty, line, ctx.structs)?;
                    out.push_str("    local.get $this\n");
                    out.push_str(&format!("    i64.const {}\n    i64.add\n", field.offset));
                    store_via_scratch(ctx, env, out, value, &field.ty)?;
                    return Ok(());
                }
            }
        }
        return Err(CompileError::at(format!("Unknown identifier {name}"), line));
    }

    let (dest_ty, address_ops) = emit_target_address(ctx, env, target)?;
    require_same_type(&dest_ty, &value_ty, line, ctx.structs)?;
    out.push_str(&address_ops);
    store_via_scratch(ctx, env, out, value, &dest_ty)?;
    Ok(())
}

/// Computes a `Field`/`Index` assignment target's address, leaving it as
/// an i64 on the stack (consumed by `store_via_scratch` through `$tmp2`).
fn emit_target_address(ctx: &Ctx, env: &Env, target: &Expr) -> Result<(Type, String)> {
    match &target.kind {
        ExprKind::Field { base, field } => {
            let base_ty = type_of(base)?;
            let struct_name = match &base_ty {
                Type::Struct(name) => name,
                _ => return Err(CompileError::at("Field assignment on non-struct", target.line)),
            };
            let info = ctx
                .structs
                .get(struct_name)
                .ok_or_else(|| CompileError::at(format!("Unknown struct {struct_name}"), target.line))?;
            let finfo = info
                .field(field)
                .ok_or_else(|| CompileError::at(format!("Unknown field {field} on struct {struct_name}"), target.line))?
                .clone();
            let mut ops = String::new();
            emit_expr(ctx, env, &mut ops, base)?;
            ops.push_str(&format!("    i64.const {}\n    i64.add\n", finfo.offset));
            Ok((finfo.ty, ops))
        }
        ExprKind::Index { base, index } => {
            let base_ty = type_of(base)?;
            let element = match base_ty {
                Type::Array(element) => *element,
                _ => return Err(CompileError::at("Index assignment on non-array", target.line)),
            };
            let mut ops = String::new();
            emit_expr(ctx, env, &mut ops, base)?;
            ops.push_str("    local.set $tmp0\n");
            emit_expr(ctx, env, &mut ops, index)?;
            ops.push_str("    local.set $tmp1\n");
            ops.push_str("    local.get $tmp0\n    i64.const 8\n    i64.add\n");
            ops.push_str("    local.get $tmp1\n    i64.const 8\n    i64.mul\n    i64.add\n");
            Ok((element, ops))
        }
        _ => Err(CompileError::at("Invalid assignment target", target.line)),
    }
}

/// Stashes the already-on-stack i64 address into `$tmp2`, evaluates
/// `value` into the matching scratch (`$tmpf` for real, `$tmp1`
/// otherwise), then stores it at the address.
fn store_via_scratch(ctx: &Ctx, env: &Env, out: &mut String, value: &Expr, ty: &Type) -> Result<()> {
    out.push_str("    local.set $tmp2\n");
    emit_expr(ctx, env, out, value)?;
    if *ty == Type::Real {
        out.push_str("    local.set $tmpf\n");
        out.push_str("    local.get $tmp2\n    i32.wrap_i64\n");
        out.push_str("    local.get $tmpf\n");
    } else {
        out.push_str("    local.set $tmp1\n");
        out.push_str("    local.get $tmp2\n    i32.wrap_i64\n");
        out.push_str("    local.get $tmp1\n");
    }
    out.push_str(&format!("    {}\n", store_op(ty)));
    Ok(())
}
