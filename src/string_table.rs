//! String literal interning and `print` format-string pre-splitting.
//!
//! Every distinct string value used in a program is assigned one data
//! segment: `[i64 length][utf-8 bytes]`, 8-byte aligned, starting above
//! the reserved WASI/argv region. Nine builtins are always interned
//! first, in a fixed order, since the runtime helpers reference them by
//! offset.

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use crate::error::{CompileError, Result};
use std::collections::HashMap;

pub const BASE_CURSOR: i64 = 4096;

const BUILTINS: &[&str] = &["", "\n", ".", "-", "+", "e", "0", "true", "false"];

pub struct StringTable {
    base_cursor: i64,
    data_cursor: i64,
    heap_start: i64,
    offsets: HashMap<String, i64>,
    segments: Vec<(i64, Vec<u8>)>,
}

impl StringTable {
    pub fn new(base_cursor: i64) -> Self {
        StringTable {
            base_cursor,
            data_cursor: base_cursor,
            heap_start: base_cursor,
            offsets: HashMap::new(),
            segments: Vec::new(),
        }
    }

    pub fn build(program: &Program) -> Result<Self> {
        let mut table = StringTable::new(BASE_CURSOR);
        for builtin in BUILTINS {
            table.add_string_literal(builtin);
        }
        for f in &program.functions {
            for s in &f.body {
                table.collect_strings_stmt(s)?;
            }
        }
        for def in &program.structs {
            for m in &def.methods {
                for s in &m.body {
                    table.collect_strings_stmt(s)?;
                }
            }
        }
        table.heap_start = align8(table.data_cursor);
        Ok(table)
    }

    pub fn offset_of(&self, value: &str) -> Option<i64> {
        self.offsets.get(value).copied()
    }

    pub fn segments(&self) -> &[(i64, Vec<u8>)] {
        &self.segments
    }

    pub fn heap_start(&self) -> i64 {
        self.heap_start
    }

    fn collect_strings_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::VarDecl { init, .. } => {
                if let Some(e) = init {
                    self.collect_strings_expr(e)?;
                }
            }
            StmtKind::Assign { target, value } => {
                self.collect_strings_expr(target)?;
                self.collect_strings_expr(value)?;
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.collect_strings_expr(cond)?;
                for s in then_body {
                    self.collect_strings_stmt(s)?;
                }
                for s in else_body {
                    self.collect_strings_stmt(s)?;
                }
            }
            StmtKind::While { cond, body } => {
                self.collect_strings_expr(cond)?;
                for s in body {
                    self.collect_strings_stmt(s)?;
                }
            }
            StmtKind::Return(Some(e)) => self.collect_strings_expr(e)?,
            StmtKind::Return(None) => {}
            StmtKind::ExprStmt(e) => self.collect_strings_expr(e)?,
        }
        Ok(())
    }

    fn collect_strings_expr(&mut self, expr: &Expr) -> Result<()> {
        if let ExprKind::Call { base, args } = &expr.kind {
            if let ExprKind::Var(name) = &base.kind {
                if name == "print" && !args.is_empty() {
                    if let ExprKind::StringLit(fmt) = &args[0].kind {
                        if args.len() > 1 || needs_format(fmt) {
                            self.add_format_literals(fmt)?;
                        }
                    }
                }
            }
        }
        if let ExprKind::StringLit(value) = &expr.kind {
            self.add_string_literal(value);
        }
        match &expr.kind {
            ExprKind::Unary { operand, .. } => self.collect_strings_expr(operand)?,
            ExprKind::Binary { left, right, .. } => {
                self.collect_strings_expr(left)?;
                self.collect_strings_expr(right)?;
            }
            ExprKind::Call { base, args } => {
                self.collect_strings_expr(base)?;
                for a in args {
                    self.collect_strings_expr(a)?;
                }
            }
            ExprKind::Field { base, .. } => self.collect_strings_expr(base)?,
            ExprKind::Index { base, index } => {
                self.collect_strings_expr(base)?;
                self.collect_strings_expr(index)?;
            }
            ExprKind::NewExpr { size: Some(size), .. } => self.collect_strings_expr(size)?,
            _ => {}
        }
        Ok(())
    }

    pub fn add_string_literal(&mut self, value: &str) -> i64 {
        if let Some(offset) = self.offsets.get(value) {
            return *offset;
        }
        let offset = align8(self.data_cursor);
        let length = value.len() as i64;
        let mut bytes = Vec::with_capacity(8 + value.len());
        bytes.extend_from_slice(&length.to_le_bytes());
        bytes.extend_from_slice(value.as_bytes());
        let end = offset + bytes.len() as i64;
        self.segments.push((offset, bytes));
        self.offsets.insert(value.to_string(), offset);
        self.data_cursor = end;
        offset
    }

    fn add_format_literals(&mut self, format: &str) -> Result<()> {
        let chars: Vec<char> = format.chars().collect();
        let n = chars.len();
        let mut literal = String::new();
        let mut i = 0usize;
        while i < n {
            let c = chars[i];
            if c == '%' && i + 1 < n {
                let next = chars[i + 1];
                if next == '%' {
                    literal.push('%');
                    i += 2;
                    continue;
                }
                if !literal.is_empty() {
                    self.add_string_literal(&literal);
                    literal.clear();
                }
                if next == 'i' || next == 'b' || next == 's' {
                    i += 2;
                    continue;
                }
                if next == 'r' || next == 'e' {
                    i += 2;
                    if i + 1 < n && chars[i] == '{' {
                        i += 1;
                        if i >= n || !chars[i].is_ascii_digit() {
                            return Err(CompileError::new("Format precision requires digits"));
                        }
                        while i < n && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        if i >= n || chars[i] != '}' {
                            return Err(CompileError::new("Format precision missing '}'"));
                        }
                        i += 1;
                    }
                    continue;
                }
                return Err(CompileError::new("Unsupported format specifier in print"));
            }
            literal.push(c);
            i += 1;
        }
        if !literal.is_empty() {
            self.add_string_literal(&literal);
        }
        Ok(())
    }
}

pub fn needs_format(format: &str) -> bool {
    format.chars().any(|c| c == '%' || c == '\n')
}

pub fn align8(value: i64) -> i64 {
    (value + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Function;

    fn program_with_body(body: Vec<Stmt>) -> Program {
        Program {
            imports: Vec::new(),
            structs: Vec::new(),
            functions: vec![Function {
                name: "main".to_string(),
                return_type: crate::ast::TypeSpec::void(),
                params: Vec::new(),
                body,
                is_method: false,
                owner: String::new(),
                line: 1,
            }],
        }
    }

    #[test]
    fn test_builtins_interned_in_order() {
        let table = StringTable::build(&program_with_body(Vec::new())).unwrap();
        assert_eq!(table.offset_of(""), Some(BASE_CURSOR));
        let mut prev = BASE_CURSOR;
        for b in BUILTINS.iter().skip(1) {
            let off = table.offset_of(b).unwrap();
            assert!(off > prev);
            prev = off;
        }
    }

    #[test]
    fn test_duplicate_literal_deduped() {
        let mut table = StringTable::new(BASE_CURSOR);
        let a = table.add_string_literal("hello");
        let b = table.add_string_literal("hello");
        assert_eq!(a, b);
        assert_eq!(table.segments().len(), 1);
    }

    #[test]
    fn test_format_literal_splits_around_specifiers() {
        let mut table = StringTable::new(BASE_CURSOR);
        table.add_format_literals("x=%i y=%s\n").unwrap();
        assert!(table.offset_of("x=").is_some());
        assert!(table.offset_of(" y=").is_some());
    }

    #[test]
    fn test_format_precision_requires_digits() {
        let mut table = StringTable::new(BASE_CURSOR);
        let err = table.add_format_literals("%r{}").unwrap_err();
        assert!(err.message.contains("requires digits"));
    }

    #[test]
    fn test_format_precision_missing_brace() {
        let mut table = StringTable::new(BASE_CURSOR);
        let err = table.add_format_literals("%r{3").unwrap_err();
        assert!(err.message.contains("missing '}'"));
    }

    #[test]
    fn test_unsupported_specifier_errors() {
        let mut table = StringTable::new(BASE_CURSOR);
        assert!(table.add_format_literals("%q").is_err());
    }

    #[test]
    fn test_literal_format_print_call_adds_fragments() {
        let call = Expr::new(
            ExprKind::Call {
                base: Box::new(Expr::new(ExprKind::Var("print".to_string()), 1)),
                args: vec![Expr::new(ExprKind::StringLit("val=%i\n".to_string()), 1)],
            },
            1,
        );
        let stmt = Stmt::new(StmtKind::ExprStmt(call), 1);
        let table = StringTable::build(&program_with_body(vec![stmt])).unwrap();
        assert!(table.offset_of("val=").is_some());
    }

    #[test]
    fn test_align8() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(9), 16);
    }
}
