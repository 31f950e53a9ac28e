//! Type inference and caching pass.
//!
//! Walks every statement and expression once, resolving and caching each
//! expression's `Type` in `Expr::ty`. This pass infers types and performs
//! the few checks that don't depend on a destination type (unary operand
//! kind, arithmetic/comparison/logical operand kinds, unknown
//! identifiers). Strict assignability between a declared/expected type
//! and an actual value -- assignment, argument passing -- is enforced
//! later, at code generation time, once the destination type is known
//! for certain (`types::is_assignable`).

use crate::ast::{Expr, ExprKind, Function, Stmt, StmtKind, TypeSpec};
use crate::error::{CompileError, Result};
use crate::function_catalog::FunctionInfo;
use crate::types::{StructInfo, Type, TypeResolver};
use std::collections::HashMap;

/// Variable scope for one function body. `locals` shadow `params`, which
/// shadow the current struct's fields when checking a method.
#[derive(Clone, Default)]
pub struct Env {
    locals: HashMap<String, Type>,
    params: HashMap<String, Type>,
    owner: Option<String>,
}

impl Env {
    pub fn for_function(func: &Function, resolver: &TypeResolver) -> Result<Self> {
        let mut params = HashMap::new();
        for (spec, name) in &func.params {
            params.insert(name.clone(), resolver.resolve(spec)?);
        }
        Ok(Env {
            locals: HashMap::new(),
            params,
            owner: if func.is_method { Some(func.owner.clone()) } else { None },
        })
    }
}

pub struct TypeChecker<'a> {
    structs: &'a HashMap<String, StructInfo>,
    functions: &'a HashMap<String, FunctionInfo>,
    resolver: TypeResolver<'a>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(structs: &'a HashMap<String, StructInfo>, functions: &'a HashMap<String, FunctionInfo>) -> Self {
        TypeChecker {
            structs,
            functions,
            resolver: TypeResolver::new(structs),
        }
    }

    pub fn check_block(&self, stmts: &[Stmt], env: &mut Env) -> Result<()> {
        for stmt in stmts {
            self.check_stmt(stmt, env)?;
        }
        Ok(())
    }

    fn check_stmt(&self, stmt: &Stmt, env: &mut Env) -> Result<()> {
        match &stmt.kind {
            StmtKind::VarDecl { var_type, name, init } => {
                if let Some(expr) = init {
                    self.check_expr(expr, env)?;
                }
                let ty = self.resolver.resolve(var_type)?;
                env.locals.insert(name.clone(), ty);
            }
            StmtKind::Assign { target, value } => {
                self.check_expr(target, env)?;
                self.check_expr(value, env)?;
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.check_expr(cond, env)?;
                let mut then_env = env.clone();
                self.check_block(then_body, &mut then_env)?;
                if !else_body.is_empty() {
                    let mut else_env = env.clone();
                    self.check_block(else_body, &mut else_env)?;
                }
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond, env)?;
                let mut loop_env = env.clone();
                self.check_block(body, &mut loop_env)?;
            }
            StmtKind::Return(Some(expr)) => {
                self.check_expr(expr, env)?;
            }
            StmtKind::Return(None) => {}
            StmtKind::ExprStmt(expr) => {
                self.check_expr(expr, env)?;
            }
        }
        Ok(())
    }

    pub fn check_expr(&self, expr: &Expr, env: &Env) -> Result<Type> {
        if let Some(cached) = expr.cached_type() {
            return Ok(cached);
        }
        let ty = match &expr.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::RealLitBits(_) => Type::Real,
            ExprKind::StringLit(_) => Type::String,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::Var(name) => self.check_var(name, expr.line, env)?,
            ExprKind::Unary { op, operand } => self.check_unary(op, operand, expr.line, env)?,
            ExprKind::Binary { op, left, right } => self.check_binary(op, left, right, expr.line, env)?,
            ExprKind::Field { base, field } => self.check_field(base, field, expr.line, env)?,
            ExprKind::Index { base, index } => self.check_index(base, index, expr.line, env)?,
            ExprKind::Call { base, args } => self.check_call(base, args, expr.line, env)?,
            ExprKind::NewExpr { new_type, size } => self.check_new(new_type, size, expr.line, env)?,
        };
        *expr.ty.borrow_mut() = Some(ty.clone());
        Ok(ty)
    }

    fn check_var(&self, name: &str, line: usize, env: &Env) -> Result<Type> {
        if let Some(ty) = env.locals.get(name) {
            return Ok(ty.clone());
        }
        if let Some(ty) = env.params.get(name) {
            return Ok(ty.clone());
        }
        if let Some(owner) = &env.owner {
            if let Some(info) = self.structs.get(owner) {
                if let Some(field) = info.field(name) {
                    return Ok(field.ty.clone());
                }
            }
        }
        Err(CompileError::at(format!("Unknown identifier {name}"), line))
    }

    fn check_unary(&self, op: &str, operand: &Expr, line: usize, env: &Env) -> Result<Type> {
        let ty = self.check_expr(operand, env)?;
        match op {
            "-" if ty.is_int() || ty.is_real() => Ok(ty),
            "-" => Err(CompileError::at("Unary '-' requires int or real", line)),
            "!" if ty.is_bool() => Ok(ty),
            "!" => Err(CompileError::at("Unary '!' requires bool", line)),
            _ => Err(CompileError::at("Invalid unary operator", line)),
        }
    }

    fn check_binary(&self, op: &str, left: &Expr, right: &Expr, line: usize, env: &Env) -> Result<Type> {
        let left_ty = self.check_expr(left, env)?;
        let right_ty = self.check_expr(right, env)?;
        match op {
            "+" | "-" | "*" | "/" | "%" => {
                if left_ty.is_int() && right_ty.is_int() {
                    Ok(Type::Int)
                } else if left_ty.is_real() && right_ty.is_real() {
                    Ok(Type::Real)
                } else if (left_ty.is_real() && right_ty.is_int()) || (left_ty.is_int() && right_ty.is_real()) {
                    Ok(Type::Real)
                } else {
                    Err(CompileError::at("Arithmetic requires int or real", line))
                }
            }
            "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                let same_comparable = left_ty == right_ty
                    && (left_ty.is_int() || left_ty.is_bool() || left_ty.is_real());
                let mixed_numeric =
                    (left_ty.is_real() && right_ty.is_int()) || (left_ty.is_int() && right_ty.is_real());
                if same_comparable || mixed_numeric {
                    Ok(Type::Bool)
                } else {
                    Err(CompileError::at("Comparison type parsing failed", line))
                }
            }
            "and" | "or" => {
                if left_ty.is_bool() && right_ty.is_bool() {
                    Ok(Type::Bool)
                } else {
                    Err(CompileError::at("Logical operators require bool", line))
                }
            }
            _ => Err(CompileError::at("Unknown binary operator", line)),
        }
    }

    fn check_field(&self, base: &Expr, field: &str, line: usize, env: &Env) -> Result<Type> {
        let base_ty = self.check_expr(base, env)?;
        let struct_name = match &base_ty {
            Type::Struct(name) => name,
            _ => return Err(CompileError::at("Field access on non-struct", line)),
        };
        let info = self
            .structs
            .get(struct_name)
            .ok_or_else(|| CompileError::at(format!("Unknown struct {struct_name}"), line))?;
        info.field(field)
            .map(|f| f.ty.clone())
            .ok_or_else(|| CompileError::at(format!("Unknown field {field} on struct {struct_name}"), line))
    }

    fn check_index(&self, base: &Expr, index: &Expr, line: usize, env: &Env) -> Result<Type> {
        let base_ty = self.check_expr(base, env)?;
        let element = match base_ty {
            Type::Array(element) => *element,
            _ => return Err(CompileError::at("Not an array", line)),
        };
        let index_ty = self.check_expr(index, env)?;
        if !index_ty.is_int() {
            return Err(CompileError::at("Index must be int", line));
        }
        Ok(element)
    }

    fn check_call(&self, base: &Expr, args: &[Expr], line: usize, env: &Env) -> Result<Type> {
        for arg in args {
            self.check_expr(arg, env)?;
        }
        if let ExprKind::Var(name) = &base.kind {
            if name == "print" {
                return Ok(Type::Void);
            }
            if name == "sqrt" {
                return Ok(Type::Real);
            }
            return self
                .functions
                .get(name)
                .map(|info| info.return_type.clone())
                .ok_or_else(|| CompileError::at(format!("Unknown function {name}"), line));
        }
        if let ExprKind::Field { base: field_base, field } = &base.kind {
            let base_ty = self.check_expr(field_base, env)?;
            if (matches!(base_ty, Type::Array(_)) || matches!(base_ty, Type::String)) && field == "length" {
                return Ok(Type::Int);
            }
            let struct_name = match &base_ty {
                Type::Struct(name) => name.clone(),
                _ => return Err(CompileError::at("Method on non-struct", line)),
            };
            let method_name = format!("{struct_name}.{field}");
            return self
                .functions
                .get(&method_name)
                .map(|info| info.return_type.clone())
                .ok_or_else(|| CompileError::at(format!("Unknown method {method_name}"), line));
        }
        Err(CompileError::at("Unsupported call", line))
    }

    fn check_new(&self, new_type: &TypeSpec, size: &Option<Box<Expr>>, line: usize, env: &Env) -> Result<Type> {
        if let Some(size_expr) = size {
            let size_ty = self.check_expr(size_expr, env)?;
            if !size_ty.is_int() {
                return Err(CompileError::at("Array size int needed", line));
            }
            let element = self.resolver.resolve(new_type)?;
            return Ok(Type::Array(Box::new(element)));
        }
        let ty = self.resolver.resolve(new_type)?;
        if !ty.is_struct() {
            return Err(CompileError::at("'new' without a size requires a struct type", line));
        }
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, StructDef, TypeSpec};
    use crate::function_catalog;
    use crate::types::{compute_layouts, init_structs};

    fn check_program(program: &crate::ast::Program) -> Result<()> {
        let mut structs = HashMap::new();
        init_structs(program, &mut structs);
        compute_layouts(program, &mut structs)?;
        let mut functions = HashMap::new();
        function_catalog::build(program, &structs, &mut functions)?;
        let checker = TypeChecker::new(&structs, &functions);
        for f in &program.functions {
            let mut env = Env::for_function(f, &checker.resolver)?;
            checker.check_block(&f.body, &mut env)?;
        }
        for def in &program.structs {
            for m in &def.methods {
                let mut env = Env::for_function(m, &checker.resolver)?;
                checker.check_block(&m.body, &mut env)?;
            }
        }
        Ok(())
    }

    fn int_binary(op: &str) -> crate::ast::Program {
        let expr = Expr::new(
            crate::ast::ExprKind::Binary {
                op: op.to_string(),
                left: Box::new(Expr::new(crate::ast::ExprKind::IntLit(1), 1)),
                right: Box::new(Expr::new(crate::ast::ExprKind::IntLit(2), 1)),
            },
            1,
        );
        let stmt = Stmt::new(StmtKind::ExprStmt(expr), 1);
        crate::ast::Program {
            imports: Vec::new(),
            structs: Vec::new(),
            functions: vec![crate::ast::Function {
                name: "main".to_string(),
                return_type: TypeSpec::void(),
                params: Vec::new(),
                body: vec![stmt],
                is_method: false,
                owner: String::new(),
                line: 1,
            }],
        }
    }

    #[test]
    fn test_int_arithmetic_ok() {
        assert!(check_program(&int_binary("+")).is_ok());
    }

    #[test]
    fn test_mixed_int_real_promotes_to_real_in_arithmetic() {
        let expr = Expr::new(
            crate::ast::ExprKind::Binary {
                op: "+".to_string(),
                left: Box::new(Expr::new(crate::ast::ExprKind::IntLit(1), 1)),
                right: Box::new(Expr::new_real(2.0, 1)),
            },
            1,
        );
        let structs = HashMap::new();
        let functions = HashMap::new();
        let checker = TypeChecker::new(&structs, &functions);
        let env = Env::default();
        let ty = checker.check_expr(&expr, &env).unwrap();
        assert_eq!(ty, Type::Real);
    }

    #[test]
    fn test_unknown_identifier_errors() {
        let expr = Expr::new(crate::ast::ExprKind::Var("ghost".to_string()), 3);
        let structs = HashMap::new();
        let functions = HashMap::new();
        let checker = TypeChecker::new(&structs, &functions);
        let env = Env::default();
        let err = checker.check_expr(&expr, &env).unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_method_sees_own_field_via_owner() {
        let def = StructDef {
            name: "Counter".to_string(),
            parent: None,
            fields: vec![(TypeSpec::named("int"), "count".to_string())],
            methods: Vec::new(),
            line: 1,
        };
        let mut structs = HashMap::new();
        let program = crate::ast::Program {
            imports: Vec::new(),
            structs: vec![def],
            functions: Vec::new(),
        };
        init_structs(&program, &mut structs);
        compute_layouts(&program, &mut structs).unwrap();
        let functions = HashMap::new();
        let checker = TypeChecker::new(&structs, &functions);
        let method = crate::ast::Function {
            name: "get".to_string(),
            return_type: TypeSpec::named("int"),
            params: Vec::new(),
            body: Vec::new(),
            is_method: true,
            owner: "Counter".to_string(),
            line: 2,
        };
        let env = Env::for_function(&method, &checker.resolver).unwrap();
        let expr = Expr::new(crate::ast::ExprKind::Var("count".to_string()), 2);
        assert_eq!(checker.check_expr(&expr, &env).unwrap(), Type::Int);
    }

    #[test]
    fn test_new_struct_without_size_ok() {
        let def = StructDef {
            name: "Foo".to_string(),
            parent: None,
            fields: Vec::new(),
            methods: Vec::new(),
            line: 1,
        };
        let program = crate::ast::Program {
            imports: Vec::new(),
            structs: vec![def],
            functions: Vec::new(),
        };
        let mut structs = HashMap::new();
        init_structs(&program, &mut structs);
        compute_layouts(&program, &mut structs).unwrap();
        let functions = HashMap::new();
        let checker = TypeChecker::new(&structs, &functions);
        let env = Env::default();
        let expr = Expr::new(
            crate::ast::ExprKind::NewExpr {
                new_type: TypeSpec::named("Foo"),
                size: None,
            },
            1,
        );
        assert_eq!(
            checker.check_expr(&expr, &env).unwrap(),
            Type::Struct("Foo".to_string())
        );
    }

    #[test]
    fn test_new_primitive_without_size_errors() {
        let structs = HashMap::new();
        let functions = HashMap::new();
        let checker = TypeChecker::new(&structs, &functions);
        let env = Env::default();
        let expr = Expr::new(
            crate::ast::ExprKind::NewExpr {
                new_type: TypeSpec::named("int"),
                size: None,
            },
            1,
        );
        assert!(checker.check_expr(&expr, &env).is_err());
    }

    #[test]
    fn test_array_index_requires_int() {
        let structs = HashMap::new();
        let functions = HashMap::new();
        let checker = TypeChecker::new(&structs, &functions);
        let env = Env::default();
        let array_expr = Expr::new(
            crate::ast::ExprKind::NewExpr {
                new_type: TypeSpec::named("int"),
                size: Some(Box::new(Expr::new(crate::ast::ExprKind::IntLit(3), 1))),
            },
            1,
        );
        let index_expr = Expr::new(
            crate::ast::ExprKind::Index {
                base: Box::new(array_expr),
                index: Box::new(Expr::new(crate::ast::ExprKind::BoolLit(true), 1)),
            },
            1,
        );
        assert!(checker.check_expr(&index_expr, &env).is_err());
    }
}
