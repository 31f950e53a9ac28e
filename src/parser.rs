//! Recursive-descent parser: tokens to `Program`.
//!
//! Runs a line-oriented pre-scan for user-defined struct names before
//! the real descent starts, so type positions can accept a struct name
//! even when its declaration appears later in the file.

use crate::ast::{Expr, ExprKind, Function, ImportDecl, Program, Stmt, StmtKind, StructDef, TypeSpec};
use crate::error::{CompileError, Result};
use crate::lexer::{Token, TokenType};
use std::collections::HashSet;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    type_names: HashSet<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, extra_types: &HashSet<String>) -> Self {
        let mut type_names: HashSet<String> = ["int", "real", "bool", "string"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        type_names.extend(extra_types.iter().cloned());
        let mut parser = Parser {
            tokens,
            current: 0,
            type_names,
        };
        parser.pre_scan_struct_names();
        parser
    }

    pub fn type_names(&self) -> &HashSet<String> {
        &self.type_names
    }

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        while !self.check(TokenType::EndOfFile) {
            if self.check(TokenType::Newline) || self.check(TokenType::Dedent) {
                self.advance();
                continue;
            }
            if self.match_keyword("import") {
                program.imports.push(self.parse_import()?);
                continue;
            }
            if self.is_struct_decl_line() {
                program.structs.push(self.parse_struct_decl()?);
            } else {
                program.functions.push(self.parse_function_decl(false, "")?);
            }
        }
        Ok(program)
    }

    /// Scans raw token lines for `Identifier ... ':' ... newline` shapes
    /// with no `(` before the colon: these name structs, possibly ones
    /// not yet declared at the point a type is later referenced.
    fn pre_scan_struct_names(&mut self) {
        let tokens = &self.tokens;
        let mut idx = 0usize;
        while idx < tokens.len() {
            let line_start = idx;
            while idx < tokens.len()
                && tokens[idx].ty != TokenType::Newline
                && tokens[idx].ty != TokenType::EndOfFile
            {
                idx += 1;
            }
            let line_end = idx;
            if line_end > line_start {
                let mut first = line_start;
                while first < line_end
                    && (tokens[first].ty == TokenType::Indent || tokens[first].ty == TokenType::Dedent)
                {
                    first += 1;
                }
                let mut has_paren = false;
                let mut has_colon = false;
                for tok in &tokens[line_start..line_end] {
                    if tok.ty == TokenType::LParen {
                        has_paren = true;
                        break;
                    }
                    if tok.ty == TokenType::Colon {
                        has_colon = true;
                    }
                }
                if has_colon && !has_paren && first < line_end && tokens[first].ty == TokenType::Identifier {
                    self.type_names.insert(tokens[first].text.clone());
                }
            }
            if idx < tokens.len() && tokens[idx].ty == TokenType::Newline {
                idx += 1;
            } else {
                break;
            }
        }
    }

    fn is_struct_decl_line(&self) -> bool {
        let tokens = &self.tokens;
        let mut idx = self.current;
        while idx < tokens.len() && (tokens[idx].ty == TokenType::Indent || tokens[idx].ty == TokenType::Dedent) {
            idx += 1;
        }
        if idx >= tokens.len() || tokens[idx].ty != TokenType::Identifier {
            return false;
        }
        let mut has_paren = false;
        let mut has_colon = false;
        while idx < tokens.len() && tokens[idx].ty != TokenType::Newline && tokens[idx].ty != TokenType::EndOfFile {
            if tokens[idx].ty == TokenType::LParen {
                has_paren = true;
                break;
            }
            if tokens[idx].ty == TokenType::Colon {
                has_colon = true;
            }
            idx += 1;
        }
        has_colon && !has_paren
    }

    fn is_function_decl_line(&self) -> bool {
        let tokens = &self.tokens;
        let mut idx = self.current;
        while idx < tokens.len() && (tokens[idx].ty == TokenType::Indent || tokens[idx].ty == TokenType::Dedent) {
            idx += 1;
        }
        let mut has_paren = false;
        let mut has_colon = false;
        while idx < tokens.len() && tokens[idx].ty != TokenType::Newline && tokens[idx].ty != TokenType::EndOfFile {
            if tokens[idx].ty == TokenType::LParen {
                has_paren = true;
            }
            if tokens[idx].ty == TokenType::Colon {
                has_colon = true;
            }
            idx += 1;
        }
        has_paren && !has_colon
    }

    fn parse_import(&mut self) -> Result<ImportDecl> {
        let (module, is_path, line) = if self.check(TokenType::String) {
            let tok = self.advance().clone();
            (tok.text, true, tok.line)
        } else {
            let first = self.consume(TokenType::Identifier, "Expected module name after import")?;
            let mut module = first.text;
            let line = first.line;
            while self.match_tok(TokenType::Dot) {
                let part = self.consume(TokenType::Identifier, "Expected module name after '.'")?;
                module.push('.');
                module.push_str(&part.text);
            }
            (module, false, line)
        };
        let mut alias = None;
        if self.match_keyword("as") {
            let tok = self.consume(TokenType::Identifier, "Expected alias name after 'as'")?;
            alias = Some(tok.text);
        }
        self.consume(TokenType::Newline, "Expected newline after import")?;
        Ok(ImportDecl {
            module,
            alias,
            is_path,
            line,
        })
    }

    fn parse_struct_decl(&mut self) -> Result<StructDef> {
        let name_tok = self.consume(TokenType::Identifier, "Expected struct name")?;
        let name = name_tok.text;
        let line = name_tok.line;
        let mut parent = None;
        if self.match_keyword("extends") {
            let parent_tok = self.consume(TokenType::Identifier, "Expected parent name")?;
            parent = Some(parent_tok.text);
        }
        self.consume(TokenType::Colon, "Expected ':' after struct name")?;
        self.consume(TokenType::Newline, "Expected newline after struct declaration")?;
        self.consume(TokenType::Indent, "Expected indent for struct body")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenType::Dedent) && !self.check(TokenType::EndOfFile) {
            if self.check(TokenType::Newline) {
                self.advance();
                continue;
            }
            if self.is_struct_decl_line() {
                return Err(CompileError::at(
                    "Nested struct declarations are not allowed",
                    self.peek().line,
                ));
            }
            if self.is_function_decl_line() {
                methods.push(self.parse_function_decl(true, &name)?);
            } else {
                fields.push(self.parse_struct_field()?);
            }
        }
        self.consume(TokenType::Dedent, "Expected end of struct block")?;
        Ok(StructDef {
            name,
            parent,
            fields,
            methods,
            line,
        })
    }

    fn parse_function_decl(&mut self, is_method: bool, owner: &str) -> Result<Function> {
        let return_type = self.parse_return_type()?;
        let name_tok = self.consume(TokenType::Identifier, "Expected function name")?;
        let name = name_tok.text;
        let line = name_tok.line;
        self.consume(TokenType::LParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                let ty = self.parse_type()?;
                let param_name = self.consume(TokenType::Identifier, "Expected parameter name")?;
                params.push((ty, param_name.text));
                if !self.match_tok(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RParen, "Expected ')' after parameters")?;
        self.consume(TokenType::Newline, "Expected newline after function signature")?;
        let body = self.parse_block()?;
        Ok(Function {
            name,
            return_type,
            params,
            body,
            is_method,
            owner: owner.to_string(),
            line,
        })
    }

    fn parse_struct_field(&mut self) -> Result<(TypeSpec, String)> {
        let ty = self.parse_type()?;
        let name = self.consume(TokenType::Identifier, "Expected field name")?;
        self.consume(TokenType::Newline, "Expected newline after field declaration")?;
        Ok((ty, name.text))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.consume(TokenType::Indent, "Expected indent to start block")?;
        let mut stmts = Vec::new();
        while !self.check(TokenType::Dedent) && !self.check(TokenType::EndOfFile) {
            if self.check(TokenType::Newline) {
                self.advance();
                continue;
            }
            stmts.push(self.parse_statement()?);
        }
        self.consume(TokenType::Dedent, "Expected end of block")?;
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        if self.match_keyword("if") {
            return self.parse_if();
        }
        if self.match_keyword("while") {
            return self.parse_while();
        }
        if self.match_keyword("return") {
            let line = self.previous().line;
            let expr = if self.check(TokenType::Newline) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.consume(TokenType::Newline, "Expected newline after return")?;
            return Ok(Stmt::new(StmtKind::Return(expr), line));
        }
        if self.is_type_start() {
            let var_type = self.parse_type()?;
            let name_tok = self.consume(TokenType::Identifier, "Expected variable name")?;
            let line = name_tok.line;
            let init = if self.match_tok(TokenType::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.consume(TokenType::Newline, "Expected newline after declaration")?;
            return Ok(Stmt::new(
                StmtKind::VarDecl {
                    var_type,
                    name: name_tok.text,
                    init,
                },
                line,
            ));
        }

        let expr = self.parse_expression()?;
        if self.match_tok(TokenType::Assign) {
            let line = expr.line;
            let value = self.parse_expression()?;
            self.consume(TokenType::Newline, "Expected newline after assignment")?;
            return Ok(Stmt::new(StmtKind::Assign { target: expr, value }, line));
        }
        let line = expr.line;
        self.consume(TokenType::Newline, "Expected newline after expression")?;
        Ok(Stmt::new(StmtKind::ExprStmt(expr), line))
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let cond = self.parse_expression()?;
        let line = cond.line;
        self.consume(TokenType::Newline, "Expected newline after if condition")?;
        let then_body = self.parse_block()?;
        let else_body = if self.match_keyword("else") {
            self.consume(TokenType::Newline, "Expected newline after else")?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            line,
        ))
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let cond = self.parse_expression()?;
        let line = cond.line;
        self.consume(TokenType::Newline, "Expected newline after while condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::While { cond, body }, line))
    }

    fn parse_return_type(&mut self) -> Result<TypeSpec> {
        if self.match_keyword("void") {
            return Ok(TypeSpec::void());
        }
        self.parse_type()
    }

    fn parse_type(&mut self) -> Result<TypeSpec> {
        let mut name = String::new();
        if self.check(TokenType::Keyword) {
            let kw = self.peek().text.clone();
            if matches!(kw.as_str(), "int" | "real" | "bool" | "string") {
                self.advance();
                name = kw;
            } else {
                return Err(CompileError::at("Expected type keyword", self.peek().line));
            }
        } else if self.check(TokenType::Identifier) {
            name = self.advance().text.clone();
        } else {
            return Err(CompileError::at("Expected type name", self.peek().line));
        }
        let mut array_depth = 0;
        while self.check(TokenType::LBracket) && self.peek_next().ty == TokenType::RBracket {
            self.advance();
            self.consume(TokenType::RBracket, "Expected ']' in array type")?;
            array_depth += 1;
        }
        Ok(TypeSpec {
            name,
            array_depth,
            is_void: false,
        })
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_logical_and()?;
        while self.match_keyword("or") {
            let right = self.parse_logical_and()?;
            expr = make_binary("or", expr, right);
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_equality()?;
        while self.match_keyword("and") {
            let right = self.parse_equality()?;
            expr = make_binary("and", expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut expr = self.parse_relational()?;
        loop {
            if self.match_tok(TokenType::Eq) {
                let right = self.parse_relational()?;
                expr = make_binary("==", expr, right);
            } else if self.match_tok(TokenType::Neq) {
                let right = self.parse_relational()?;
                expr = make_binary("!=", expr, right);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = if self.match_tok(TokenType::Lt) {
                "<"
            } else if self.match_tok(TokenType::Lte) {
                "<="
            } else if self.match_tok(TokenType::Gt) {
                ">"
            } else if self.match_tok(TokenType::Gte) {
                ">="
            } else {
                break;
            };
            let right = self.parse_additive()?;
            expr = make_binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = if self.match_tok(TokenType::Plus) {
                "+"
            } else if self.match_tok(TokenType::Minus) {
                "-"
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            expr = make_binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = if self.match_tok(TokenType::Star) {
                "*"
            } else if self.match_tok(TokenType::Slash) {
                "/"
            } else if self.match_tok(TokenType::Percent) {
                "%"
            } else {
                break;
            };
            let right = self.parse_unary()?;
            expr = make_binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.match_tok(TokenType::Minus) {
            let operand = self.parse_unary()?;
            return Ok(make_unary("-", operand));
        }
        if self.match_tok(TokenType::Bang) {
            let operand = self.parse_unary()?;
            return Ok(make_unary("!", operand));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            if self.match_tok(TokenType::LBracket) {
                let index = self.parse_expression()?;
                self.consume(TokenType::RBracket, "Expected ']' after index")?;
                let line = expr.line;
                expr = Expr::new(
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                );
            } else if self.match_tok(TokenType::Dot) {
                let field = self.consume(TokenType::Identifier, "Expected field name")?;
                let line = field.line;
                expr = Expr::new(
                    ExprKind::Field {
                        base: Box::new(expr),
                        field: field.text,
                    },
                    line,
                );
            } else if self.match_tok(TokenType::LParen) {
                let line = expr.line;
                let mut args = Vec::new();
                if !self.check(TokenType::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.match_tok(TokenType::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenType::RParen, "Expected ')' after arguments")?;
                expr = Expr::new(
                    ExprKind::Call {
                        base: Box::new(expr),
                        args,
                    },
                    line,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        if self.match_tok(TokenType::Integer) {
            let tok = self.previous();
            let value: i64 = tok
                .text
                .parse()
                .map_err(|_| CompileError::at("Invalid integer literal", tok.line))?;
            return Ok(Expr::new(ExprKind::IntLit(value), tok.line));
        }
        if self.match_tok(TokenType::Real) {
            let tok = self.previous();
            let value: f64 = tok
                .text
                .parse()
                .map_err(|_| CompileError::at("Invalid real literal", tok.line))?;
            return Ok(Expr::new_real(value, tok.line));
        }
        if self.match_tok(TokenType::String) {
            let tok = self.previous();
            return Ok(Expr::new(ExprKind::StringLit(tok.text.clone()), tok.line));
        }
        if self.match_keyword("true") || self.match_keyword("false") {
            let tok = self.previous();
            return Ok(Expr::new(ExprKind::BoolLit(tok.text == "true"), tok.line));
        }
        if self.match_keyword("new") {
            let line = self.previous().line;
            let new_type = self.parse_type()?;
            let size = if self.match_tok(TokenType::LBracket) {
                let size_expr = self.parse_expression()?;
                self.consume(TokenType::RBracket, "Expected ']' after new size")?;
                Some(Box::new(size_expr))
            } else {
                None
            };
            return Ok(Expr::new(ExprKind::NewExpr { new_type, size }, line));
        }
        if self.match_tok(TokenType::Identifier) {
            let tok = self.previous();
            return Ok(Expr::new(ExprKind::Var(tok.text.clone()), tok.line));
        }
        if self.match_tok(TokenType::LParen) {
            let expr = self.parse_expression()?;
            self.consume(TokenType::RParen, "Expected ')' after expression")?;
            return Ok(expr);
        }
        Err(CompileError::at("Unexpected token", self.peek().line))
    }

    fn is_type_start(&self) -> bool {
        if self.check(TokenType::Keyword) {
            let kw = self.peek().text.as_str();
            return matches!(kw, "int" | "real" | "bool" | "string");
        }
        if self.check(TokenType::Identifier) {
            return self.type_names.contains(&self.peek().text);
        }
        false
    }

    fn match_tok(&mut self, ty: TokenType) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, kw: &str) -> bool {
        if self.check(TokenType::Keyword) && self.peek().text == kw {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, ty: TokenType, msg: &str) -> Result<Token> {
        if self.check(ty) {
            Ok(self.advance().clone())
        } else {
            Err(CompileError::at(msg, self.peek().line))
        }
    }

    fn check(&self, ty: TokenType) -> bool {
        self.peek().ty == ty
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().ty == TokenType::EndOfFile
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn peek_next(&self) -> &Token {
        if self.current + 1 >= self.tokens.len() {
            self.tokens.last().unwrap()
        } else {
            &self.tokens[self.current + 1]
        }
    }
}

fn make_binary(op: &str, left: Expr, right: Expr) -> Expr {
    let line = left.line;
    Expr::new(
        ExprKind::Binary {
            op: op.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    )
}

fn make_unary(op: &str, operand: Expr) -> Expr {
    let line = operand.line;
    Expr::new(
        ExprKind::Unary {
            op: op.to_string(),
            operand: Box::new(operand),
        },
        line,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let mut parser = Parser::new(tokens, &HashSet::new());
        parser.parse_program().unwrap()
    }

    #[test]
    fn test_parse_main_function() {
        let program = parse("void main()\n    print(1)\n");
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
        assert!(program.functions[0].return_type.is_void);
    }

    #[test]
    fn test_parse_struct_with_inheritance() {
        let program = parse("A:\n    int x\nB extends A:\n    int y\n");
        assert_eq!(program.structs.len(), 2);
        assert_eq!(program.structs[1].parent.as_deref(), Some("A"));
    }

    #[test]
    fn test_forward_referenced_struct_type_in_param() {
        let program = parse("void use(Node n)\n    return\nNode:\n    int x\n");
        assert_eq!(program.functions[0].params[0].0.name, "Node");
    }

    #[test]
    fn test_nested_struct_forbidden() {
        let tokens = Lexer::new("A:\n    B:\n        int x\n").tokenize().unwrap();
        let mut parser = Parser::new(tokens, &HashSet::new());
        assert!(parser.parse_program().is_err());
    }

    #[test]
    fn test_import_dotted() {
        let program = parse("import a.b.c\nvoid main()\n    return\n");
        assert_eq!(program.imports[0].module, "a.b.c");
        assert!(!program.imports[0].is_path);
    }

    #[test]
    fn test_import_path_with_alias() {
        let program = parse("import \"lib/util\" as u\nvoid main()\n    return\n");
        assert_eq!(program.imports[0].module, "lib/util");
        assert!(program.imports[0].is_path);
        assert_eq!(program.imports[0].alias.as_deref(), Some("u"));
    }

    #[test]
    fn test_operator_precedence() {
        let program = parse("void main()\n    int x = 1 + 2 * 3\n");
        let stmt = &program.functions[0].body[0];
        match &stmt.kind {
            StmtKind::VarDecl { init: Some(expr), .. } => match &expr.kind {
                ExprKind::Binary { op, left, right } => {
                    assert_eq!(op, "+");
                    assert!(matches!(left.kind, ExprKind::IntLit(1)));
                    assert!(matches!(right.kind, ExprKind::Binary { .. }));
                }
                _ => panic!("expected binary expr"),
            },
            _ => panic!("expected var decl"),
        }
    }

    #[test]
    fn test_array_type_suffix() {
        let program = parse("void main(string[] args)\n    return\n");
        assert_eq!(program.functions[0].params[0].0.array_depth, 1);
    }

    #[test]
    fn test_method_inside_struct() {
        let program = parse("Shape:\n    int area()\n        return 0\n");
        assert_eq!(program.structs[0].methods.len(), 1);
        assert_eq!(program.structs[0].methods[0].owner, "Shape");
    }

    #[test]
    fn test_postfix_chain_field_index_call() {
        let program = parse("void main()\n    a.b[0].c()\n");
        let stmt = &program.functions[0].body[0];
        assert!(matches!(stmt.kind, StmtKind::ExprStmt(_)));
    }

    #[test]
    fn test_while_and_if_else() {
        let program = parse("void main()\n    while true\n        if false\n            return\n        else\n            return\n");
        assert_eq!(program.functions[0].body.len(), 1);
    }
}
