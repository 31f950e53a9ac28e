//! Struct initializer emission.
//!
//! A fresh struct's memory comes back zeroed from `$alloc`, which would
//! be enough for int/real/bool fields on its own. This emitter writes
//! those zeros explicitly anyway, and additionally points every `string`
//! field at the interned empty-string literal rather than leaving it
//! null — an unassigned `string` field that is later passed to
//! `.length()` or `print` must behave like `""`, not crash.

use super::{store_op, Ctx};
use crate::error::{CompileError, Result};
use crate::types::Type;

pub fn emit_struct_init(ctx: &Ctx, out: &mut String, struct_name: &str) -> Result<()> {
    let info = ctx
        .structs
        .get(struct_name)
        .ok_or_else(|| CompileError::new(format!("Unknown struct {struct_name}")))?;

    out.push_str(&format!("  (func $init_{struct_name} (param $this i64)\n"));
    out.push_str("    (local $tmp0 i64)\n");

    for field in &info.fields {
        match &field.ty {
            Type::Struct(owner) => {
                let nested = ctx
                    .structs
                    .get(owner)
                    .ok_or_else(|| CompileError::new(format!("Unknown struct {owner}")))?;
                out.push_str(&format!("    i64.const {}\n", nested.size));
                out.push_str("    call $alloc\n");
                out.push_str("    local.set $tmp0\n");
                out.push_str("    local.get $tmp0\n");
                out.push_str(&format!("    call $init_{owner}\n"));
                out.push_str("    local.get $this\n");
                out.push_str(&format!("    i64.const {}\n    i64.add\n", field.offset));
                out.push_str("    i32.wrap_i64\n");
                out.push_str("    local.get $tmp0\n");
                out.push_str(&format!("    {}\n", store_op(&field.ty)));
            }
            Type::String => {
                let empty = ctx
                    .strings
                    .offset_of("")
                    .ok_or_else(|| CompileError::new("Internal error: empty string literal not interned"))?;
                out.push_str("    local.get $this\n");
                out.push_str(&format!("    i64.const {}\n    i64.add\n", field.offset));
                out.push_str("    i32.wrap_i64\n");
                out.push_str(&format!("    i64.const {empty}\n"));
                out.push_str(&format!("    {}\n", store_op(&field.ty)));
            }
            _ => {
                out.push_str("    local.get $this\n");
                out.push_str(&format!("    i64.const {}\n    i64.add\n", field.offset));
                out.push_str("    i32.wrap_i64\n");
                super::emit_zero(out, &field.ty);
                out.push_str(&format!("    {}\n", store_op(&field.ty)));
            }
        }
    }

    out.push_str("  )\n");
    Ok(())
}
