//! Multi-file loading: resolves `import` declarations to a fixed point,
//! then merges every loaded module into one `Program`, qualifying
//! cross-module calls so the rest of the pipeline sees a single namespace.

use crate::ast::{Expr, ExprKind, ImportDecl, Program, Stmt, StmtKind};
use crate::error::{CompileError, Result};
use crate::lexer::{Lexer, Token, TokenType};
use crate::parser::Parser;
use std::collections::{HashMap, HashSet};
use std::path::Path;

struct ModuleData {
    name: String,
    path: String,
    tokens: Vec<Token>,
    imports: Vec<ImportDecl>,
    struct_names: HashSet<String>,
    program: Program,
}

pub struct ModuleLoader {
    main_dir: String,
    modules: HashMap<String, ModuleData>,
    module_name_to_path: HashMap<String, String>,
    load_order: Vec<String>,
}

impl ModuleLoader {
    pub fn new(main_dir: impl Into<String>) -> Self {
        ModuleLoader {
            main_dir: main_dir.into(),
            modules: HashMap::new(),
            module_name_to_path: HashMap::new(),
            load_order: Vec::new(),
        }
    }

    pub fn load(&mut self, input_path: &str) -> Result<()> {
        self.load_module(input_path, "")
    }

    pub fn collect_type_names(&self) -> HashSet<String> {
        let mut all: HashSet<String> = ["int", "real", "bool", "string"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for data in self.modules.values() {
            all.extend(data.struct_names.iter().cloned());
        }
        all
    }

    pub fn parse_programs(&mut self, all_types: &HashSet<String>) -> Result<()> {
        let paths: Vec<String> = self.modules.keys().cloned().collect();
        for path in paths {
            let tokens = self.modules[&path].tokens.clone();
            let mut parser = Parser::new(tokens, all_types);
            let program = parser.parse_program()?;
            self.modules.get_mut(&path).unwrap().program = program;
        }
        Ok(())
    }

    /// Root module first, then every other module in load (import
    /// discovery) order. The original walks a `HashMap`, whose iteration
    /// order is an implementation detail; recording insertion order here
    /// instead keeps merged output deterministic across runs.
    pub fn merge_programs(&mut self, input_path: &str) -> Result<Program> {
        let mut merged = Program::default();
        let mut struct_names = HashSet::new();
        let mut function_names = HashSet::new();

        let mut ordered: Vec<String> = Vec::new();
        if self.modules.contains_key(input_path) {
            ordered.push(input_path.to_string());
        }
        for path in &self.load_order {
            if path != input_path && !ordered.contains(path) {
                ordered.push(path.clone());
            }
        }

        for path in ordered {
            let data = self.modules.get_mut(&path).unwrap();
            let is_root = data.path == input_path;
            let mut alias_map = HashMap::new();
            for imp in &data.program.imports {
                let module_id = module_id_for_import(imp);
                let alias = imp.alias.clone().unwrap_or_else(|| module_id.clone());
                alias_map.insert(alias, module_id);
            }
            let local_functions: HashSet<String> =
                data.program.functions.iter().map(|f| f.name.clone()).collect();
            if !is_root {
                for f in data.program.functions.iter_mut() {
                    f.name = format!("{}.{}", data.name, f.name);
                }
            }
            rewrite_program_calls(&mut data.program, &data.name, !is_root, &local_functions, &alias_map);

            for def in &data.program.structs {
                if !struct_names.insert(def.name.clone()) {
                    return Err(CompileError::new(format!("Duplicate struct name '{}'", def.name)));
                }
                merged.structs.push(def.clone());
            }
            for f in &data.program.functions {
                if !function_names.insert(f.name.clone()) {
                    return Err(CompileError::new(format!("Duplicate function name '{}'", f.name)));
                }
                merged.functions.push(f.clone());
            }
        }

        Ok(merged)
    }

    fn load_module(&mut self, path: &str, module_id: &str) -> Result<()> {
        if self.modules.contains_key(path) {
            return Ok(());
        }
        if !module_id.is_empty() {
            if let Some(existing) = self.module_name_to_path.get(module_id) {
                if existing != path {
                    return Err(CompileError::new(format!(
                        "Module name '{module_id}' resolves to multiple paths"
                    )));
                }
            }
            self.module_name_to_path
                .insert(module_id.to_string(), path.to_string());
        }

        let source = std::fs::read_to_string(path)
            .map_err(|_| CompileError::new(format!("Unable to open file: {path}")))?;
        let tokens = Lexer::new(&source).tokenize()?;
        let imports = scan_imports(&tokens)?;
        let struct_names = scan_struct_names(&tokens);

        self.load_order.push(path.to_string());
        self.modules.insert(
            path.to_string(),
            ModuleData {
                name: module_id.to_string(),
                path: path.to_string(),
                tokens,
                imports: imports.clone(),
                struct_names,
                program: Program::default(),
            },
        );

        for imp in &imports {
            let import_id = module_id_for_import(imp);
            let resolved = self.resolve_module_path(imp)?;
            self.load_module(&resolved, &import_id)?;
        }
        Ok(())
    }

    fn resolve_module_path(&self, decl: &ImportDecl) -> Result<String> {
        let rel = if decl.is_path {
            let mut r = decl.module.clone();
            if !r.ends_with(".ion") {
                r.push_str(".ion");
            }
            r
        } else {
            module_to_path(&decl.module)
        };
        let full = if is_absolute_path(&rel) {
            rel
        } else {
            join_path(&self.main_dir, &rel)
        };
        if Path::new(&full).is_file() {
            Ok(full)
        } else {
            Err(CompileError::new(format!(
                "Unable to resolve module '{}'",
                decl.module
            )))
        }
    }
}

fn join_path(base: &str, path: &str) -> String {
    if base.is_empty() || base == "." {
        return path.to_string();
    }
    if base.ends_with('/') || base.ends_with('\\') {
        return format!("{base}{path}");
    }
    format!("{base}/{path}")
}

fn module_to_path(module: &str) -> String {
    format!("{}.ion", module.replace('.', "/"))
}

fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/')
}

fn basename_no_ext(path: &str) -> String {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match base.rfind('.') {
        Some(pos) => base[..pos].to_string(),
        None => base.to_string(),
    }
}

fn module_id_for_import(decl: &ImportDecl) -> String {
    if decl.is_path {
        basename_no_ext(&decl.module)
    } else {
        decl.module.clone()
    }
}

/// Raw token-level scan for top-level `import` lines, run before the real
/// parse so imports can be resolved and loaded before anything is parsed.
fn scan_imports(tokens: &[Token]) -> Result<Vec<ImportDecl>> {
    let mut imports = Vec::new();
    let mut at_line_start = true;
    let mut indent_level: i32 = 0;
    let mut i = 0usize;
    while i < tokens.len() {
        match tokens[i].ty {
            TokenType::Indent => indent_level += 1,
            TokenType::Dedent => indent_level = (indent_level - 1).max(0),
            _ => {}
        }
        if tokens[i].ty == TokenType::Newline {
            at_line_start = true;
            i += 1;
            continue;
        }
        if at_line_start
            && indent_level == 0
            && tokens[i].ty == TokenType::Keyword
            && tokens[i].text == "import"
        {
            let line = tokens[i].line;
            i += 1;
            if i >= tokens.len() {
                return Err(CompileError::at("Expected module name after import", line));
            }
            let (module, is_path) = if tokens[i].ty == TokenType::String {
                (tokens[i].text.clone(), true)
            } else {
                if tokens[i].ty != TokenType::Identifier {
                    return Err(CompileError::at("Expected module name after import", line));
                }
                let mut module = tokens[i].text.clone();
                while i + 2 < tokens.len()
                    && tokens[i + 1].ty == TokenType::Dot
                    && tokens[i + 2].ty == TokenType::Identifier
                {
                    module.push('.');
                    module.push_str(&tokens[i + 2].text);
                    i += 2;
                }
                (module, false)
            };
            let mut alias = None;
            if i + 2 < tokens.len()
                && tokens[i + 1].ty == TokenType::Keyword
                && tokens[i + 1].text == "as"
                && tokens[i + 2].ty == TokenType::Identifier
            {
                alias = Some(tokens[i + 2].text.clone());
                i += 2;
            }
            imports.push(ImportDecl {
                module,
                alias,
                is_path,
                line,
            });
            at_line_start = false;
            i += 1;
            continue;
        }
        at_line_start = false;
        i += 1;
    }
    Ok(imports)
}

fn scan_struct_names(tokens: &[Token]) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let line_start = idx;
        while idx < tokens.len() && tokens[idx].ty != TokenType::Newline && tokens[idx].ty != TokenType::EndOfFile {
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
                names.insert(tokens[first].text.clone());
            }
        }
        if idx < tokens.len() && tokens[idx].ty == TokenType::Newline {
            idx += 1;
        } else {
            break;
        }
    }
    names
}

fn build_field_chain(expr: &Expr, parts: &mut Vec<String>) -> bool {
    match &expr.kind {
        ExprKind::Var(name) => {
            parts.push(name.clone());
            true
        }
        ExprKind::Field { base, field } => {
            if !build_field_chain(base, parts) {
                return false;
            }
            parts.push(field.clone());
            true
        }
        _ => false,
    }
}

fn rewrite_expr(
    expr: &mut Expr,
    module_name: &str,
    qualify_local: bool,
    local_functions: &HashSet<String>,
    import_aliases: &HashMap<String, String>,
) {
    match &mut expr.kind {
        ExprKind::Unary { operand, .. } => {
            rewrite_expr(operand, module_name, qualify_local, local_functions, import_aliases);
        }
        ExprKind::Binary { left, right, .. } => {
            rewrite_expr(left, module_name, qualify_local, local_functions, import_aliases);
            rewrite_expr(right, module_name, qualify_local, local_functions, import_aliases);
        }
        ExprKind::Call { base, args } => {
            rewrite_expr(base, module_name, qualify_local, local_functions, import_aliases);
            for arg in args.iter_mut() {
                rewrite_expr(arg, module_name, qualify_local, local_functions, import_aliases);
            }
        }
        ExprKind::Field { base, .. } => {
            rewrite_expr(base, module_name, qualify_local, local_functions, import_aliases);
        }
        ExprKind::Index { base, index } => {
            rewrite_expr(base, module_name, qualify_local, local_functions, import_aliases);
            rewrite_expr(index, module_name, qualify_local, local_functions, import_aliases);
        }
        ExprKind::NewExpr { size: Some(size), .. } => {
            rewrite_expr(size, module_name, qualify_local, local_functions, import_aliases);
        }
        _ => {}
    }

    if let ExprKind::Call { base, .. } = &mut expr.kind {
        match &mut base.kind {
            ExprKind::Var(name) => {
                if qualify_local && local_functions.contains(name.as_str()) {
                    *name = format!("{module_name}.{name}");
                }
            }
            ExprKind::Field { .. } => {
                let mut parts = Vec::new();
                if build_field_chain(base, &mut parts) && parts.len() >= 2 {
                    let module_path = parts[..parts.len() - 1].join(".");
                    if let Some(resolved) = import_aliases.get(&module_path) {
                        let qualified = format!("{resolved}.{}", parts.last().unwrap());
                        let line = base.line;
                        **base = Expr::new(ExprKind::Var(qualified), line);
                    }
                }
            }
            _ => {}
        }
    }
}

fn rewrite_stmt(
    stmt: &mut Stmt,
    module_name: &str,
    qualify_local: bool,
    local_functions: &HashSet<String>,
    import_aliases: &HashMap<String, String>,
) {
    match &mut stmt.kind {
        StmtKind::VarDecl { init, .. } => {
            if let Some(e) = init {
                rewrite_expr(e, module_name, qualify_local, local_functions, import_aliases);
            }
        }
        StmtKind::Assign { target, value } => {
            rewrite_expr(target, module_name, qualify_local, local_functions, import_aliases);
            rewrite_expr(value, module_name, qualify_local, local_functions, import_aliases);
        }
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            rewrite_expr(cond, module_name, qualify_local, local_functions, import_aliases);
            for s in then_body.iter_mut() {
                rewrite_stmt(s, module_name, qualify_local, local_functions, import_aliases);
            }
            for s in else_body.iter_mut() {
                rewrite_stmt(s, module_name, qualify_local, local_functions, import_aliases);
            }
        }
        StmtKind::While { cond, body } => {
            rewrite_expr(cond, module_name, qualify_local, local_functions, import_aliases);
            for s in body.iter_mut() {
                rewrite_stmt(s, module_name, qualify_local, local_functions, import_aliases);
            }
        }
        StmtKind::Return(Some(e)) => {
            rewrite_expr(e, module_name, qualify_local, local_functions, import_aliases);
        }
        StmtKind::Return(None) => {}
        StmtKind::ExprStmt(e) => {
            rewrite_expr(e, module_name, qualify_local, local_functions, import_aliases);
        }
    }
}

fn rewrite_program_calls(
    program: &mut Program,
    module_name: &str,
    qualify_local: bool,
    local_functions: &HashSet<String>,
    import_aliases: &HashMap<String, String>,
) {
    for f in program.functions.iter_mut() {
        for s in f.body.iter_mut() {
            rewrite_stmt(s, module_name, qualify_local, local_functions, import_aliases);
        }
    }
    for def in program.structs.iter_mut() {
        for m in def.methods.iter_mut() {
            for s in m.body.iter_mut() {
                rewrite_stmt(s, module_name, qualify_local, local_functions, import_aliases);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_single_module_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = write_file(dir.path(), "main.ion", "void main()\n    return\n");
        let mut loader = ModuleLoader::new(dir.path().to_str().unwrap());
        loader.load(&main_path).unwrap();
        let types = loader.collect_type_names();
        loader.parse_programs(&types).unwrap();
        let merged = loader.merge_programs(&main_path).unwrap();
        assert_eq!(merged.functions.len(), 1);
        assert_eq!(merged.functions[0].name, "main");
    }

    #[test]
    fn test_dotted_import_qualifies_local_calls() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "util.ion", "int square(int x)\n    return x * x\n");
        let main_path = write_file(
            dir.path(),
            "main.ion",
            "import util\nvoid main()\n    int y = util.square(2)\n",
        );
        let mut loader = ModuleLoader::new(dir.path().to_str().unwrap());
        loader.load(&main_path).unwrap();
        let types = loader.collect_type_names();
        loader.parse_programs(&types).unwrap();
        let merged = loader.merge_programs(&main_path).unwrap();
        assert!(merged.functions.iter().any(|f| f.name == "util.square"));
        let main_fn = merged.functions.iter().find(|f| f.name == "main").unwrap();
        let StmtKind::VarDecl { init: Some(init), .. } = &main_fn.body[0].kind else {
            panic!("expected var decl");
        };
        let ExprKind::Call { base, .. } = &init.kind else {
            panic!("expected call");
        };
        let ExprKind::Var(name) = &base.kind else {
            panic!("expected var base");
        };
        assert_eq!(name, "util.square");
    }

    #[test]
    fn test_duplicate_struct_name_across_modules_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.ion", "Foo:\n    int x\n");
        let main_path = write_file(
            dir.path(),
            "main.ion",
            "import a\nFoo:\n    int y\nvoid main()\n    return\n",
        );
        let mut loader = ModuleLoader::new(dir.path().to_str().unwrap());
        loader.load(&main_path).unwrap();
        let types = loader.collect_type_names();
        loader.parse_programs(&types).unwrap();
        assert!(loader.merge_programs(&main_path).is_err());
    }

    #[test]
    fn test_unresolvable_import_errors() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = write_file(dir.path(), "main.ion", "import missing\nvoid main()\n    return\n");
        let mut loader = ModuleLoader::new(dir.path().to_str().unwrap());
        assert!(loader.load(&main_path).is_err());
    }

    #[test]
    fn test_basename_no_ext() {
        assert_eq!(basename_no_ext("a/b/lib.ion"), "lib");
        assert_eq!(basename_no_ext("lib.ion"), "lib");
    }
}
