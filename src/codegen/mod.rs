//! WAT code generation.
//!
//! Runs after type checking: struct layouts, the function catalog and the
//! string table are all final by the time this module runs, so codegen
//! never has to re-derive a type it doesn't already have cached on the
//! `Expr` itself (see [`type_of`]).
//!
//! Strict assignability is enforced here, not in the type checker: at a
//! `VarDecl` initializer, an `Assign`, and each call argument, once the
//! destination type is actually known (see [`require_same_type`]).

mod expr;
mod format;
mod function;
pub mod module_emit;
pub mod runtime;
mod stmt;
mod struct_emit;

use crate::ast::Function as AstFunction;
use crate::error::{CompileError, Result};
use crate::function_catalog::FunctionInfo;
use crate::string_table::StringTable;
use crate::types::{StructInfo, Type, TypeResolver};
use std::collections::HashMap;

/// A local variable or parameter's wasm identity alongside its type.
/// Unlike the type checker's `Env`, codegen needs the mangled wasm name
/// to emit `local.get`/`local.set`.
#[derive(Clone)]
pub struct Local {
    pub wasm_name: String,
    pub ty: Type,
}

/// Per-function codegen scope. `owner` is the enclosing struct name when
/// emitting a method, used both for `$this` field lookups and for
/// mangling nested calls.
#[derive(Clone, Default)]
pub struct Env {
    pub locals: HashMap<String, Local>,
    pub params: HashMap<String, Local>,
    pub owner: Option<String>,
}

impl Env {
    pub fn for_function(func: &AstFunction, resolver: &TypeResolver) -> Result<Self> {
        let mut params = HashMap::new();
        if func.is_method {
            params.insert(
                "this".to_string(),
                Local {
                    wasm_name: "$this".to_string(),
                    ty: Type::Struct(func.owner.clone()),
                },
            );
        }
        for (index, (spec, name)) in func.params.iter().enumerate() {
            params.insert(
                name.clone(),
                Local {
                    wasm_name: format!("$p{index}"),
                    ty: resolver.resolve(spec)?,
                },
            );
        }
        Ok(Env {
            locals: HashMap::new(),
            params,
            owner: if func.is_method { Some(func.owner.clone()) } else { None },
        })
    }
}

/// Shared read-only tables every emitter needs.
pub struct Ctx<'a> {
    pub structs: &'a HashMap<String, StructInfo>,
    pub functions: &'a HashMap<String, FunctionInfo>,
    pub strings: &'a StringTable,
    pub resolver: TypeResolver<'a>,
}

impl<'a> Ctx<'a> {
    pub fn new(
        structs: &'a HashMap<String, StructInfo>,
        functions: &'a HashMap<String, FunctionInfo>,
        strings: &'a StringTable,
    ) -> Self {
        Ctx {
            structs,
            functions,
            strings,
            resolver: TypeResolver::new(structs),
        }
    }
}

/// Every non-void value is i64 except `real`, which is f64.
pub fn wasm_type(ty: &Type) -> &'static str {
    match ty {
        Type::Real => "f64",
        _ => "i64",
    }
}

/// The zero constant instruction for a type, used for implicit
/// zero-init and the safety-net return at the end of a function body.
pub fn emit_zero(out: &mut String, ty: &Type) {
    match ty {
        Type::Real => out.push_str("    f64.const 0\n"),
        _ => out.push_str("    i64.const 0\n"),
    }
}

/// The raw memory load instruction for a value of this type, issued
/// right after the i32 address has been computed and wrapped.
pub(crate) fn load_op(ty: &Type) -> &'static str {
    match ty {
        Type::Real => "f64.load",
        _ => "i64.load",
    }
}

/// The raw memory store instruction for a value of this type.
pub(crate) fn store_op(ty: &Type) -> &'static str {
    match ty {
        Type::Real => "f64.store",
        _ => "i64.store",
    }
}

/// Reads back the type the checker already cached on this expression.
/// Codegen never re-infers a type; it only ever reads the cache the
/// type-checking pass filled in, which supersedes the original's
/// separate infer-without-emitting callback.
pub fn type_of(expr: &crate::ast::Expr) -> Result<Type> {
    expr.cached_type()
        .ok_or_else(|| CompileError::at("Internal error: expression was never type-checked", expr.line))
}

/// Strict (non-promoting) assignability check, raised at the exact point
/// a value is stored into a typed destination: a `VarDecl` initializer,
/// an `Assign`, or a call argument.
pub fn require_same_type(
    expected: &Type,
    actual: &Type,
    line: usize,
    structs: &HashMap<String, StructInfo>,
) -> Result<()> {
    if crate::types::is_assignable(expected, actual, structs) {
        Ok(())
    } else {
        Err(CompileError::at(
            format!("Type mismatch: expected {expected:?}, found {actual:?}"),
            line,
        ))
    }
}

/// Runs the full pipeline from a merged, type-checked `Program` to a
/// complete `.wat` module text.
pub fn generate(program: &crate::ast::Program) -> Result<String> {
    let mut structs = HashMap::new();
    crate::types::init_structs(program, &mut structs);
    crate::types::compute_layouts(program, &mut structs)?;

    let mut functions = HashMap::new();
    crate::function_catalog::build(program, &structs, &mut functions)?;

    let checker = crate::typechecker::TypeChecker::new(&structs, &functions);
    let resolver = TypeResolver::new(&structs);
    for f in &program.functions {
        let mut env = crate::typechecker::Env::for_function(f, &resolver)?;
        checker.check_block(&f.body, &mut env)?;
    }
    for def in &program.structs {
        for m in &def.methods {
            let mut env = crate::typechecker::Env::for_function(m, &resolver)?;
            checker.check_block(&m.body, &mut env)?;
        }
    }

    let strings = StringTable::build(program)?;
    let ctx = Ctx::new(&structs, &functions, &strings);
    module_emit::emit_module(&ctx, program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeSpec;

    #[test]
    fn test_wasm_type_real_is_f64() {
        assert_eq!(wasm_type(&Type::Real), "f64");
        assert_eq!(wasm_type(&Type::Int), "i64");
        assert_eq!(wasm_type(&Type::Bool), "i64");
    }

    #[test]
    fn test_env_for_method_has_this() {
        let structs = HashMap::new();
        let resolver = TypeResolver::new(&structs);
        let method = AstFunction {
            name: "get".to_string(),
            return_type: TypeSpec::named("int"),
            params: Vec::new(),
            body: Vec::new(),
            is_method: true,
            owner: "Counter".to_string(),
            line: 1,
        };
        let env = Env::for_function(&method, &resolver).unwrap();
        assert_eq!(env.params["this"].wasm_name, "$this");
    }
}
