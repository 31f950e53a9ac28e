//! Enumerates free functions and struct methods into `FunctionInfo`
//! records keyed by their (possibly qualified) source name, with
//! WAT-mangled names and resolved signatures.

use crate::ast::{Program, TypeSpec};
use crate::error::Result;
use crate::types::{StructInfo, Type, TypeResolver};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub return_type: Type,
    pub params: Vec<Type>,
    pub wasm_name: String,
    pub is_method: bool,
}

fn mangle(owner: &str, name: &str) -> String {
    if owner.is_empty() {
        format!("${name}")
    } else {
        format!("${owner}_{name}")
    }
}

/// Builds `functions`, keyed `"name"` for free functions and
/// `"Struct.method"` for methods. A struct's own methods are found by
/// looking up `"<struct>.<name>"` rather than via a pointer stored on
/// `StructInfo`, keeping ownership of `Function` bodies entirely in
/// `Program`.
pub fn build(
    program: &Program,
    structs: &HashMap<String, StructInfo>,
    functions: &mut HashMap<String, FunctionInfo>,
) -> Result<()> {
    let resolver = TypeResolver::new(structs);

    for fn_decl in &program.functions {
        let return_type = resolver.resolve(&fn_decl.return_type)?;
        let mut params = Vec::with_capacity(fn_decl.params.len());
        for (spec, _) in &fn_decl.params {
            params.push(resolver.resolve(spec)?);
        }
        let info = FunctionInfo {
            return_type,
            params,
            wasm_name: mangle("", &fn_decl.name),
            is_method: false,
        };
        functions.insert(fn_decl.name.clone(), info);
    }

    for def in &program.structs {
        for method in &def.methods {
            let return_type = resolver.resolve(&method.return_type)?;
            let this_spec = TypeSpec::named(def.name.clone());
            let mut params = vec![resolver.resolve(&this_spec)?];
            for (spec, _) in &method.params {
                params.push(resolver.resolve(spec)?);
            }
            let info = FunctionInfo {
                return_type,
                params,
                wasm_name: mangle(&def.name, &method.name),
                is_method: true,
            };
            let key = format!("{}.{}", def.name, method.name);
            functions.insert(key, info);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Function, StructDef};

    fn free_fn(name: &str) -> Function {
        Function {
            name: name.to_string(),
            return_type: TypeSpec::named("int"),
            params: vec![(TypeSpec::named("int"), "x".to_string())],
            body: Vec::new(),
            is_method: false,
            owner: String::new(),
            line: 1,
        }
    }

    #[test]
    fn test_free_function_mangled_name() {
        let program = Program {
            imports: Vec::new(),
            structs: Vec::new(),
            functions: vec![free_fn("square")],
        };
        let mut structs = HashMap::new();
        let mut functions = HashMap::new();
        build(&program, &structs, &mut functions).unwrap();
        let info = &functions["square"];
        assert_eq!(info.wasm_name, "$square");
        assert_eq!(info.params, vec![Type::Int]);
        assert_eq!(info.return_type, Type::Int);
    }

    #[test]
    fn test_method_gets_implicit_this_param() {
        let method = Function {
            name: "area".to_string(),
            return_type: TypeSpec::named("int"),
            params: Vec::new(),
            body: Vec::new(),
            is_method: true,
            owner: "Shape".to_string(),
            line: 2,
        };
        let def = StructDef {
            name: "Shape".to_string(),
            parent: None,
            fields: Vec::new(),
            methods: vec![method],
            line: 1,
        };
        let program = Program {
            imports: Vec::new(),
            structs: vec![def],
            functions: Vec::new(),
        };
        let mut structs = HashMap::new();
        crate::types::init_structs(&program, &mut structs);
        crate::types::compute_layouts(&program, &mut structs).unwrap();
        let mut functions = HashMap::new();
        build(&program, &structs, &mut functions).unwrap();
        let info = &functions["Shape.area"];
        assert_eq!(info.wasm_name, "$Shape_area");
        assert_eq!(info.params, vec![Type::Struct("Shape".to_string())]);
    }
}
