//! Semantic type system: resolving `TypeSpec` into `Type`, and computing
//! struct layout (field offsets, sizes) under single inheritance.

use crate::ast::{Program, TypeSpec};
use crate::error::{CompileError, Result};
use std::collections::HashMap;

/// A resolved, canonical type. Every non-void instance occupies exactly
/// 8 bytes in the compiled representation (the uniform boxed-value model).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Real,
    Bool,
    String,
    Void,
    Struct(String),
    Array(Box<Type>),
}

impl Type {
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int)
    }
    pub fn is_real(&self) -> bool {
        matches!(self, Type::Real)
    }
    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    pub offset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructInfo {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<FieldInfo>,
    pub field_map: HashMap<String, FieldInfo>,
    pub size: i64,
}

impl StructInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.field_map.get(name)
    }
}

pub fn align8(value: i64) -> i64 {
    (value + 7) & !7
}

/// Every non-void value occupies exactly 8 bytes.
pub fn size_of(ty: &Type) -> i64 {
    match ty {
        Type::Void => 0,
        _ => 8,
    }
}

/// Translates surface `TypeSpec`s into canonical `Type`s, consulting the
/// struct table for user-defined names.
pub struct TypeResolver<'a> {
    structs: &'a HashMap<String, StructInfo>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(structs: &'a HashMap<String, StructInfo>) -> Self {
        TypeResolver { structs }
    }

    pub fn resolve(&self, spec: &TypeSpec) -> Result<Type> {
        if spec.is_void {
            return Ok(Type::Void);
        }
        let mut base = match spec.name.as_str() {
            "int" => Type::Int,
            "real" => Type::Real,
            "bool" => Type::Bool,
            "string" => Type::String,
            other => {
                if !self.structs.contains_key(other) {
                    return Err(CompileError::new(format!("Unknown type '{other}'")));
                }
                Type::Struct(other.to_string())
            }
        };
        for _ in 0..spec.array_depth {
            base = Type::Array(Box::new(base));
        }
        Ok(base)
    }
}

/// Seeds the struct table with empty `StructInfo` entries (name/parent
/// only) before layout runs.
pub fn init_structs(program: &Program, structs: &mut HashMap<String, StructInfo>) {
    for def in &program.structs {
        structs.insert(
            def.name.clone(),
            StructInfo {
                name: def.name.clone(),
                parent: def.parent.clone(),
                fields: Vec::new(),
                field_map: HashMap::new(),
                size: 0,
            },
        );
    }
}

/// Fixed-point layout pass: repeatedly lays out any struct whose size is
/// still zero and whose parent (if any) already has a non-zero size,
/// until no struct changes. A remaining zero-size struct afterwards
/// means a cycle or a missing parent.
pub fn compute_layouts(program: &Program, structs: &mut HashMap<String, StructInfo>) -> Result<()> {
    let mut changed = true;
    while changed {
        changed = false;
        for def in &program.structs {
            let already_sized = structs[&def.name].size != 0;
            let parent_ready = match &def.parent {
                Some(parent) => structs.get(parent).map(|p| p.size != 0).unwrap_or(false),
                None => true,
            };
            if already_sized || !parent_ready {
                continue;
            }

            let mut offset;
            let mut fields;
            if let Some(parent) = &def.parent {
                let parent_info = &structs[parent];
                offset = parent_info.size;
                fields = parent_info.fields.clone();
            } else {
                offset = 0;
                fields = Vec::new();
            }

            {
                let resolver = TypeResolver::new(structs);
                for (type_spec, name) in &def.fields {
                    let ty = resolver.resolve(type_spec)?;
                    let finfo = FieldInfo {
                        name: name.clone(),
                        ty,
                        offset,
                    };
                    offset += size_of(&finfo.ty);
                    fields.push(finfo);
                }
            }

            let mut size = align8(offset);
            if size == 0 {
                size = 8;
            }
            let field_map = fields
                .iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect();

            let info = structs.get_mut(&def.name).unwrap();
            info.fields = fields;
            info.field_map = field_map;
            info.size = size;
            changed = true;
        }
    }

    for (name, info) in structs.iter() {
        if info.size == 0 {
            return Err(CompileError::new(format!(
                "Struct layout failed for {name}"
            )));
        }
    }
    Ok(())
}

/// Strict assignability: used for assignment and argument passing (no
/// int/real promotion, unlike the permissive rules `TypeChecker` applies
/// to arithmetic and comparison operators).
pub fn is_assignable(expected: &Type, actual: &Type, structs: &HashMap<String, StructInfo>) -> bool {
    match (expected, actual) {
        (Type::Array(e), Type::Array(a)) => is_assignable(e, a, structs),
        (Type::Struct(e), Type::Struct(a)) => {
            if e == a {
                return true;
            }
            let mut current = a.clone();
            while let Some(info) = structs.get(&current) {
                match &info.parent {
                    Some(parent) if parent == e => return true,
                    Some(parent) => current = parent.clone(),
                    None => break,
                }
            }
            false
        }
        (Type::Int, Type::Int)
        | (Type::Real, Type::Real)
        | (Type::Bool, Type::Bool)
        | (Type::String, Type::String)
        | (Type::Void, Type::Void) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StructDef;

    fn program_with(structs: Vec<StructDef>) -> Program {
        Program {
            imports: Vec::new(),
            structs,
            functions: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_primitive() {
        let structs = HashMap::new();
        let resolver = TypeResolver::new(&structs);
        assert_eq!(resolver.resolve(&TypeSpec::named("int")).unwrap(), Type::Int);
        assert_eq!(
            resolver.resolve(&TypeSpec::void()).unwrap(),
            Type::Void
        );
    }

    #[test]
    fn test_resolve_array_depth() {
        let structs = HashMap::new();
        let resolver = TypeResolver::new(&structs);
        let spec = TypeSpec {
            name: "int".to_string(),
            array_depth: 2,
            is_void: false,
        };
        assert_eq!(
            resolver.resolve(&spec).unwrap(),
            Type::Array(Box::new(Type::Array(Box::new(Type::Int))))
        );
    }

    #[test]
    fn test_resolve_unknown_type_errors() {
        let structs = HashMap::new();
        let resolver = TypeResolver::new(&structs);
        assert!(resolver.resolve(&TypeSpec::named("Bogus")).is_err());
    }

    #[test]
    fn test_layout_empty_struct_has_minimum_size() {
        let program = program_with(vec![StructDef {
            name: "Empty".to_string(),
            parent: None,
            fields: Vec::new(),
            methods: Vec::new(),
            line: 1,
        }]);
        let mut structs = HashMap::new();
        init_structs(&program, &mut structs);
        compute_layouts(&program, &mut structs).unwrap();
        assert_eq!(structs["Empty"].size, 8);
    }

    #[test]
    fn test_layout_inheritance_offsets() {
        let program = program_with(vec![
            StructDef {
                name: "A".to_string(),
                parent: None,
                fields: vec![(TypeSpec::named("int"), "x".to_string())],
                methods: Vec::new(),
                line: 1,
            },
            StructDef {
                name: "B".to_string(),
                parent: Some("A".to_string()),
                fields: vec![(TypeSpec::named("int"), "y".to_string())],
                methods: Vec::new(),
                line: 2,
            },
        ]);
        let mut structs = HashMap::new();
        init_structs(&program, &mut structs);
        compute_layouts(&program, &mut structs).unwrap();
        assert_eq!(structs["B"].size, 16);
        assert_eq!(structs["B"].field("x").unwrap().offset, 0);
        assert_eq!(structs["B"].field("y").unwrap().offset, 8);
    }

    #[test]
    fn test_layout_missing_parent_fails() {
        let program = program_with(vec![StructDef {
            name: "B".to_string(),
            parent: Some("Missing".to_string()),
            fields: Vec::new(),
            methods: Vec::new(),
            line: 1,
        }]);
        let mut structs = HashMap::new();
        init_structs(&program, &mut structs);
        assert!(compute_layouts(&program, &mut structs).is_err());
    }

    #[test]
    fn test_is_assignable_struct_covariance() {
        let program = program_with(vec![
            StructDef {
                name: "A".to_string(),
                parent: None,
                fields: Vec::new(),
                methods: Vec::new(),
                line: 1,
            },
            StructDef {
                name: "B".to_string(),
                parent: Some("A".to_string()),
                fields: Vec::new(),
                methods: Vec::new(),
                line: 2,
            },
        ]);
        let mut structs = HashMap::new();
        init_structs(&program, &mut structs);
        compute_layouts(&program, &mut structs).unwrap();
        assert!(is_assignable(
            &Type::Struct("A".to_string()),
            &Type::Struct("B".to_string()),
            &structs
        ));
        assert!(!is_assignable(
            &Type::Struct("B".to_string()),
            &Type::Struct("A".to_string()),
            &structs
        ));
    }

    #[test]
    fn test_is_assignable_no_int_real_promotion() {
        let structs = HashMap::new();
        assert!(!is_assignable(&Type::Real, &Type::Int, &structs));
        assert!(!is_assignable(&Type::Int, &Type::Real, &structs));
    }
}
