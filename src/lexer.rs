//! Indentation-sensitive tokeniser for Ion source files.
//!
//! Block structure is carried by leading whitespace rather than braces;
//! this module turns that whitespace into synthetic `Indent`/`Dedent`
//! tokens so the parser can stay context-free.

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Identifier,
    Integer,
    Real,
    String,
    Newline,
    Indent,
    Dedent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Bang,
    EndOfFile,
    Keyword,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ty: TokenType,
    pub text: String,
    pub line: usize,
}

impl Token {
    fn new(ty: TokenType, text: impl Into<String>, line: usize) -> Self {
        Token {
            ty,
            text: text.into(),
            line,
        }
    }
}

const KEYWORDS: &[&str] = &[
    "int", "real", "bool", "string", "void", "if", "else", "while", "return", "true", "false",
    "new", "and", "or", "extends", "import", "as",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { source }
    }

    pub fn tokenize(&self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut indent_stack: Vec<i32> = vec![0];
        let mut line_no = 1usize;

        for raw_line in self.source.lines() {
            let trimmed = strip_comment(raw_line);
            if trimmed.is_empty() {
                line_no += 1;
                continue;
            }
            let indent = count_indent(&trimmed);
            if indent % 4 != 0 {
                return Err(CompileError::at(
                    "Indentation must be a multiple of 4 spaces",
                    line_no,
                ));
            }
            let level = indent / 4;
            let top = *indent_stack.last().unwrap();
            if level > top {
                while *indent_stack.last().unwrap() < level {
                    let next = indent_stack.last().unwrap() + 1;
                    indent_stack.push(next);
                    tokens.push(Token::new(TokenType::Indent, "", line_no));
                }
            } else if level < top {
                while *indent_stack.last().unwrap() > level {
                    indent_stack.pop();
                    tokens.push(Token::new(TokenType::Dedent, "", line_no));
                }
            }

            lex_line(&trimmed, line_no, &mut tokens)?;
            tokens.push(Token::new(TokenType::Newline, "", line_no));
            line_no += 1;
        }

        while *indent_stack.last().unwrap() > 0 {
            indent_stack.pop();
            tokens.push(Token::new(TokenType::Dedent, "", line_no));
        }
        tokens.push(Token::new(TokenType::EndOfFile, "", line_no));
        Ok(tokens)
    }
}

fn strip_comment(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut in_string = false;
    let mut out = String::new();
    for i in 0..chars.len() {
        let c = chars[i];
        if c == '"' && (i == 0 || chars[i - 1] != '\\') {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if !in_string && c == '#' {
            break;
        }
        out.push(c);
    }
    while out.ends_with(|c: char| c.is_whitespace()) {
        out.pop();
    }
    if out.chars().all(|c| c.is_whitespace()) {
        return String::new();
    }
    out
}

fn count_indent(line: &str) -> i32 {
    let mut count = 0;
    for c in line.chars() {
        match c {
            ' ' => count += 1,
            '\t' => count += 4,
            _ => break,
        }
    }
    count
}

fn lex_line(line: &str, line_no: usize, tokens: &mut Vec<Token>) -> Result<()> {
    let chars: Vec<char> = line.chars().collect();
    let n = chars.len();
    let mut i = 0usize;
    while i < n && chars[i].is_whitespace() {
        i += 1;
    }
    while i < n {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < n && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if is_keyword(&word) {
                tokens.push(Token::new(TokenType::Keyword, word, line_no));
            } else {
                tokens.push(Token::new(TokenType::Identifier, word, line_no));
            }
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut is_real = false;
            while i < n && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < n && chars[i] == '.' {
                is_real = true;
                i += 1;
                while i < n && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let num: String = chars[start..i].iter().collect();
            let ty = if is_real {
                TokenType::Real
            } else {
                TokenType::Integer
            };
            tokens.push(Token::new(ty, num, line_no));
            continue;
        }
        if c == '"' {
            i += 1;
            let mut s = String::new();
            while i < n && chars[i] != '"' {
                if chars[i] == '\\' && i + 1 < n {
                    let esc = chars[i + 1];
                    match esc {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        '"' => s.push('"'),
                        '\\' => s.push('\\'),
                        other => s.push(other),
                    }
                    i += 2;
                } else {
                    s.push(chars[i]);
                    i += 1;
                }
            }
            if i >= n || chars[i] != '"' {
                return Err(CompileError::at("Unterminated string literal", line_no));
            }
            i += 1;
            tokens.push(Token::new(TokenType::String, s, line_no));
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::new(TokenType::LParen, "(", line_no));
                i += 1;
            }
            ')' => {
                tokens.push(Token::new(TokenType::RParen, ")", line_no));
                i += 1;
            }
            '[' => {
                tokens.push(Token::new(TokenType::LBracket, "[", line_no));
                i += 1;
            }
            ']' => {
                tokens.push(Token::new(TokenType::RBracket, "]", line_no));
                i += 1;
            }
            ',' => {
                tokens.push(Token::new(TokenType::Comma, ",", line_no));
                i += 1;
            }
            '.' => {
                tokens.push(Token::new(TokenType::Dot, ".", line_no));
                i += 1;
            }
            ':' => {
                tokens.push(Token::new(TokenType::Colon, ":", line_no));
                i += 1;
            }
            '+' => {
                tokens.push(Token::new(TokenType::Plus, "+", line_no));
                i += 1;
            }
            '-' => {
                tokens.push(Token::new(TokenType::Minus, "-", line_no));
                i += 1;
            }
            '*' => {
                tokens.push(Token::new(TokenType::Star, "*", line_no));
                i += 1;
            }
            '/' => {
                tokens.push(Token::new(TokenType::Slash, "/", line_no));
                i += 1;
            }
            '%' => {
                tokens.push(Token::new(TokenType::Percent, "%", line_no));
                i += 1;
            }
            '=' => {
                if i + 1 < n && chars[i + 1] == '=' {
                    tokens.push(Token::new(TokenType::Eq, "==", line_no));
                    i += 2;
                } else {
                    tokens.push(Token::new(TokenType::Assign, "=", line_no));
                    i += 1;
                }
            }
            '!' => {
                if i + 1 < n && chars[i + 1] == '=' {
                    tokens.push(Token::new(TokenType::Neq, "!=", line_no));
                    i += 2;
                } else {
                    tokens.push(Token::new(TokenType::Bang, "!", line_no));
                    i += 1;
                }
            }
            '<' => {
                if i + 1 < n && chars[i + 1] == '=' {
                    tokens.push(Token::new(TokenType::Lte, "<=", line_no));
                    i += 2;
                } else {
                    tokens.push(Token::new(TokenType::Lt, "<", line_no));
                    i += 1;
                }
            }
            '>' => {
                if i + 1 < n && chars[i + 1] == '=' {
                    tokens.push(Token::new(TokenType::Gte, ">=", line_no));
                    i += 2;
                } else {
                    tokens.push(Token::new(TokenType::Gt, ">", line_no));
                    i += 1;
                }
            }
            other => {
                return Err(CompileError::at(
                    format!("Unexpected character '{other}'"),
                    line_no,
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenType> {
        tokens.iter().map(|t| t.ty).collect()
    }

    #[test]
    fn test_simple_function_indentation() {
        let src = "void main():\n    print(1)\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Keyword,
                TokenType::Identifier,
                TokenType::LParen,
                TokenType::RParen,
                TokenType::Colon,
                TokenType::Newline,
                TokenType::Indent,
                TokenType::Identifier,
                TokenType::LParen,
                TokenType::Integer,
                TokenType::RParen,
                TokenType::Newline,
                TokenType::Dedent,
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_indentation_not_multiple_of_four_is_error() {
        let src = "void main():\n  print(1)\n";
        let err = Lexer::new(src).tokenize().unwrap_err();
        assert!(err.message.contains("multiple of 4"));
    }

    #[test]
    fn test_dedent_multiple_levels() {
        let src = "if true:\n    if true:\n        print(1)\nprint(2)\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let dedents = tokens
            .iter()
            .filter(|t| t.ty == TokenType::Dedent)
            .count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn test_string_escapes() {
        let src = "print(\"a\\nb\\t\\\"\\\\q\")\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let s = tokens
            .iter()
            .find(|t| t.ty == TokenType::String)
            .unwrap();
        assert_eq!(s.text, "a\nb\t\"\\q");
    }

    #[test]
    fn test_unknown_escape_passes_through() {
        let src = "print(\"\\z\")\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let s = tokens
            .iter()
            .find(|t| t.ty == TokenType::String)
            .unwrap();
        assert_eq!(s.text, "z");
    }

    #[test]
    fn test_unterminated_string_errors() {
        let src = "print(\"abc)\n";
        let err = Lexer::new(src).tokenize().unwrap_err();
        assert!(err.message.contains("Unterminated"));
    }

    #[test]
    fn test_operator_disambiguation() {
        let src = "a == b != c <= d >= e < f > g = h ! i\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        assert_eq!(
            kinds(&tokens[..13]),
            vec![
                TokenType::Identifier,
                TokenType::Eq,
                TokenType::Identifier,
                TokenType::Neq,
                TokenType::Identifier,
                TokenType::Lte,
                TokenType::Identifier,
                TokenType::Gte,
                TokenType::Identifier,
                TokenType::Lt,
                TokenType::Identifier,
                TokenType::Gt,
                TokenType::Identifier,
            ]
        );
    }

    #[test]
    fn test_real_literal() {
        let src = "real x = 3.25\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let real = tokens.iter().find(|t| t.ty == TokenType::Real).unwrap();
        assert_eq!(real.text, "3.25");
    }

    #[test]
    fn test_comment_stripped_outside_string() {
        let src = "int x = 1 # this is a comment\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        assert!(tokens.iter().all(|t| !t.text.contains('#')));
    }

    #[test]
    fn test_hash_inside_string_not_stripped() {
        let src = "print(\"a#b\")\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let s = tokens
            .iter()
            .find(|t| t.ty == TokenType::String)
            .unwrap();
        assert_eq!(s.text, "a#b");
    }

    #[test]
    fn test_blank_lines_skipped() {
        let src = "int x\n\n\nint y\n";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let idents: Vec<_> = tokens
            .iter()
            .filter(|t| t.ty == TokenType::Identifier)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(idents, vec!["x", "y"]);
    }

    #[test]
    fn test_unexpected_character() {
        let src = "int x = 1 @ 2\n";
        let err = Lexer::new(src).tokenize().unwrap_err();
        assert!(err.message.contains("Unexpected character"));
    }
}
