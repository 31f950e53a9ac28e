//! Function (and method) signature and body emission.
//!
//! Every function gets the same four scratch locals regardless of
//! whether its body uses them, matching the fixed convention the rest
//! of codegen assumes is always available: `$tmp0`/`$tmp1`/`$tmp2` (i64)
//! and `$tmpf` (f64).

use super::stmt::emit_block;
use super::{emit_zero, wasm_type, Ctx, Env};
use crate::ast::{Function, Stmt, StmtKind};
use crate::error::Result;
use crate::types::Type;
use std::collections::HashSet;

pub fn emit_function(ctx: &Ctx, out: &mut String, func: &Function, export: bool) -> Result<()> {
    let mut env = Env::for_function(func, &ctx.resolver)?;
    let return_type = ctx.resolver.resolve(&func.return_type)?;

    out.push_str(&format!("  (func ${name}", name = wasm_func_name(ctx, func)));
    if export && !func.is_method {
        out.push_str(&format!(" (export \"{}\")", func.name));
    }
    if func.is_method {
        out.push_str(&format!(" (param $this {})", wasm_type(&Type::Struct(func.owner.clone()))));
    }
    for (index, (spec, _)) in func.params.iter().enumerate() {
        let ty = ctx.resolver.resolve(spec)?;
        out.push_str(&format!(" (param $p{index} {})", wasm_type(&ty)));
    }
    if return_type != Type::Void {
        out.push_str(&format!(" (result {})", wasm_type(&return_type)));
    }
    out.push('\n');

    out.push_str("    (local $tmp0 i64) (local $tmp1 i64) (local $tmp2 i64) (local $tmpf f64)\n");

    let mut seen = HashSet::new();
    for (name, ty) in collect_locals(ctx, &func.body)? {
        if seen.insert(name.clone()) {
            out.push_str(&format!("    (local $v{name} {})\n", wasm_type(&ty)));
        }
    }

    emit_block(ctx, &mut env, out, &func.body)?;

    if return_type == Type::Void {
        out.push_str("    (nop)\n");
    } else {
        emit_zero(out, &return_type);
        out.push_str("    return\n");
    }
    out.push_str("  )\n");
    Ok(())
}

fn wasm_func_name(ctx: &Ctx, func: &Function) -> String {
    let key = if func.is_method {
        format!("{}.{}", func.owner, func.name)
    } else {
        func.name.clone()
    };
    ctx.functions
        .get(&key)
        .map(|info| info.wasm_name.trim_start_matches('$').to_string())
        .unwrap_or_else(|| key.replace('.', "_"))
}

fn collect_locals(ctx: &Ctx, body: &[Stmt]) -> Result<Vec<(String, Type)>> {
    let mut out = Vec::new();
    collect_locals_into(ctx, body, &mut out)?;
    Ok(out)
}

fn collect_locals_into(ctx: &Ctx, body: &[Stmt], out: &mut Vec<(String, Type)>) -> Result<()> {
    for stmt in body {
        match &stmt.kind {
            StmtKind::VarDecl { var_type, name, .. } => {
                out.push((name.clone(), ctx.resolver.resolve(var_type)?));
            }
            StmtKind::If { then_body, else_body, .. } => {
                collect_locals_into(ctx, then_body, out)?;
                collect_locals_into(ctx, else_body, out)?;
            }
            StmtKind::While { body, .. } => collect_locals_into(ctx, body, out)?,
            _ => {}
        }
    }
    Ok(())
}
