//! Go source front-end.
//!
//! Source text is tokenized with nom, semicolons are inserted following Go's
//! lexical rules, and a small recursive-descent parser extracts the top-level
//! declarations, doc comments and router call trees the generator needs.
//! Anything it doesn't understand is skipped rather than rejected.

use log::debug;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{anychar, char, satisfy},
    combinator::{map, recognize},
    multi::many0_count,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::declaration::{
    last_segment, DeclKind, Declaration, Expr, FieldDescriptor, SourceFile, Statement, TypeExpr,
};
use crate::error::SourceLocation;

static STRUCT_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+):"((?:[^"\\]|\\.)*)""#).unwrap());

#[derive(Error, Debug, PartialEq)]
pub enum SyntaxError {
    #[error("missing package clause")]
    MissingPackage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Str,
    RawStr,
    Char,
    Number,
    Punct,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub end_line: usize,
}

impl Token {
    fn is(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Ident | TokenKind::Punct) && self.text == text
    }

    fn is_open(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text.as_str(), "(" | "[" | "{")
    }

    fn is_close(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text.as_str(), ")" | "]" | "}")
    }

    fn is_string(&self) -> bool {
        matches!(self.kind, TokenKind::Str | TokenKind::RawStr)
    }

    // A newline after one of these ends the statement
    fn ends_statement(&self) -> bool {
        match self.kind {
            TokenKind::Ident => matches!(
                self.text.as_str(),
                "break" | "continue" | "fallthrough" | "return"
            ) || !is_keyword(&self.text),
            TokenKind::Str | TokenKind::RawStr | TokenKind::Char | TokenKind::Number => true,
            TokenKind::Punct => matches!(self.text.as_str(), ")" | "]" | "}" | "++" | "--"),
            TokenKind::Comment => false,
        }
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "break"
            | "case"
            | "chan"
            | "const"
            | "continue"
            | "default"
            | "defer"
            | "else"
            | "fallthrough"
            | "for"
            | "func"
            | "go"
            | "goto"
            | "if"
            | "import"
            | "interface"
            | "map"
            | "package"
            | "range"
            | "return"
            | "select"
            | "struct"
            | "switch"
            | "type"
            | "var"
    )
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), take_while(|c: char| c != '\n')))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn raw_string(input: &str) -> IResult<&str, &str> {
    recognize(tuple((char('`'), take_while(|c: char| c != '`'), char('`'))))(input)
}

fn quoted(delim: char) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| {
        recognize(delimited(
            char(delim),
            many0_count(alt((
                preceded(char('\\'), anychar),
                satisfy(move |c| c != '\\' && c != delim && c != '\n'),
            ))),
            char(delim),
        ))(input)
    }
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_digit()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_'),
    ))(input)
}

fn punct(input: &str) -> IResult<&str, &str> {
    alt((
        tag(":="),
        tag("..."),
        tag("&&"),
        tag("||"),
        tag("=="),
        tag("!="),
        tag("<-"),
        tag("<="),
        tag(">="),
        tag("++"),
        tag("--"),
        tag("+="),
        tag("-="),
        recognize(anychar),
    ))(input)
}

fn next_token(input: &str) -> IResult<&str, (Option<TokenKind>, &str)> {
    alt((
        map(take_while1(char::is_whitespace), |s| (None, s)),
        map(line_comment, |s| (Some(TokenKind::Comment), s)),
        map(block_comment, |s| (Some(TokenKind::Comment), s)),
        map(raw_string, |s| (Some(TokenKind::RawStr), s)),
        map(quoted('"'), |s| (Some(TokenKind::Str), s)),
        map(quoted('\''), |s| (Some(TokenKind::Char), s)),
        map(ident, |s| (Some(TokenKind::Ident), s)),
        map(number, |s| (Some(TokenKind::Number), s)),
        map(punct, |s| (Some(TokenKind::Punct), s)),
    ))(input)
}

/// Splits Go source into tokens, comments included, with line numbers
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = src;
    let mut line = 1;

    while !rest.is_empty() {
        match next_token(rest) {
            Ok((remaining, (kind, text))) => {
                let newlines = text.matches('\n').count();
                if let Some(kind) = kind {
                    tokens.push(Token {
                        kind,
                        text: text.to_string(),
                        line,
                        end_line: line + newlines,
                    });
                }
                line += newlines;
                rest = remaining;
            }
            Err(_) => {
                // Not reachable with the catch-all punct parser, but never loop
                let mut chars = rest.chars();
                if chars.next() == Some('\n') {
                    line += 1;
                }
                rest = chars.as_str();
            }
        }
    }

    tokens
}

/// A run of adjacent comments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentGroup {
    pub text: String,
    pub line: usize,
    pub end_line: usize,
    /// Starts on a line that already has code, i.e. a trailing comment
    pub trailing: bool,
}

fn comment_text(raw: &str) -> String {
    if let Some(line) = raw.strip_prefix("//") {
        return line.strip_prefix(' ').unwrap_or(line).trim_end().to_string();
    }
    let inner = raw
        .strip_prefix("/*")
        .and_then(|s| s.strip_suffix("*/"))
        .unwrap_or(raw);
    inner
        .lines()
        .map(|l| l.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Separates comments from code and inserts the implicit semicolons
fn split_tokens(all: Vec<Token>) -> (Vec<Token>, Vec<CommentGroup>) {
    let mut code: Vec<Token> = Vec::new();
    let mut groups: Vec<CommentGroup> = Vec::new();
    let mut prev_was_comment = false;
    let mut last_code_line = 0;

    for tok in all {
        if tok.kind == TokenKind::Comment {
            let text = comment_text(&tok.text);
            match groups.last_mut() {
                Some(group) if prev_was_comment && group.end_line + 1 >= tok.line => {
                    group.text.push('\n');
                    group.text.push_str(&text);
                    group.end_line = tok.end_line;
                }
                _ => groups.push(CommentGroup {
                    text,
                    line: tok.line,
                    end_line: tok.end_line,
                    trailing: last_code_line == tok.line,
                }),
            }
            prev_was_comment = true;
            continue;
        }

        if let Some(last) = code.last() {
            if tok.line > last.end_line && last.ends_statement() {
                code.push(semicolon(last.end_line));
            }
        }
        last_code_line = tok.end_line;
        prev_was_comment = false;
        code.push(tok);
    }

    if let Some(last) = code.last() {
        if last.ends_statement() {
            code.push(semicolon(last.end_line));
        }
    }

    (code, groups)
}

fn semicolon(line: usize) -> Token {
    Token {
        kind: TokenKind::Punct,
        text: ";".to_string(),
        line,
        end_line: line,
    }
}

/// Removes the quotes of a Go string literal and decodes common escapes
pub fn unquote(literal: &str) -> String {
    if let Some(raw) = literal.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        return raw.to_string();
    }
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parses a struct tag such as `json:"id,omitempty" orm:"size(64)"`
pub fn parse_struct_tag(literal: &str) -> BTreeMap<String, String> {
    let raw = unquote(literal);
    STRUCT_TAG_REGEX
        .captures_iter(&raw)
        .map(|cap| (cap[1].to_string(), cap[2].replace("\\\"", "\"")))
        .collect()
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, text: &str) -> bool {
        self.peek().map_or(false, |t| t.is(text))
    }

    fn at_ident(&self) -> bool {
        self.peek()
            .map_or(false, |t| t.kind == TokenKind::Ident && !is_keyword(&t.text))
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.at(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consumes an opening bracket through its matching close
    fn skip_balanced(&mut self) {
        let mut depth = 0i32;
        while let Some(tok) = self.bump() {
            if tok.is_open() {
                depth += 1;
            } else if tok.is_close() {
                depth -= 1;
                if depth <= 0 {
                    return;
                }
            }
        }
    }

    /// Consumes through the next `;` at this nesting level, stopping before an unmatched close
    fn skip_statement(&mut self) {
        let mut depth = 0i32;
        while let Some(tok) = self.peek() {
            if tok.is_open() {
                depth += 1;
            } else if tok.is_close() {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            } else if depth == 0 && tok.is(";") {
                self.pos += 1;
                return;
            }
            self.pos += 1;
        }
    }

    fn ident_list(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(tok) = self.peek() {
            if tok.kind != TokenKind::Ident {
                break;
            }
            names.push(tok.text.clone());
            self.pos += 1;
            if !(self.at(",") && self.peek_at(1).map_or(false, |t| t.kind == TokenKind::Ident)) {
                break;
            }
            self.pos += 1;
        }
        names
    }
}

fn parse_type(cur: &mut Cursor) -> TypeExpr {
    let Some(tok) = cur.peek() else {
        return TypeExpr::Other(String::new());
    };

    match tok.text.as_str() {
        "*" if tok.kind == TokenKind::Punct => {
            cur.bump();
            TypeExpr::Pointer(Box::new(parse_type(cur)))
        }
        "[" if tok.kind == TokenKind::Punct => {
            if cur.peek_at(1).map_or(false, |t| t.is("]")) {
                cur.pos += 2;
            } else {
                cur.skip_balanced();
            }
            TypeExpr::Slice(Box::new(parse_type(cur)))
        }
        "..." => {
            cur.bump();
            TypeExpr::Slice(Box::new(parse_type(cur)))
        }
        "map" => {
            cur.bump();
            cur.eat("[");
            let key = parse_type(cur);
            cur.eat("]");
            let value = parse_type(cur);
            TypeExpr::Map {
                key: Box::new(key),
                value: Box::new(value),
            }
        }
        "struct" => {
            cur.bump();
            TypeExpr::Struct(parse_struct_body(cur))
        }
        "interface" => {
            cur.bump();
            if cur.at("{") {
                cur.skip_balanced();
            }
            TypeExpr::Interface
        }
        "func" => {
            cur.bump();
            if cur.at("(") {
                cur.skip_balanced();
            }
            if cur.at("(") {
                cur.skip_balanced();
            } else if starts_type(cur) {
                parse_type(cur);
            }
            TypeExpr::Func
        }
        "chan" | "<-" => {
            cur.bump();
            cur.eat("chan");
            cur.eat("<-");
            let inner = parse_type(cur);
            TypeExpr::Other(format!("chan {}", inner))
        }
        "(" if tok.kind == TokenKind::Punct => {
            cur.bump();
            let inner = parse_type(cur);
            cur.eat(")");
            inner
        }
        _ if tok.kind == TokenKind::Ident => {
            cur.bump();
            let mut expr = TypeExpr::named(None, &tok.text);
            if cur.at(".") && cur.peek_at(1).map_or(false, |t| t.kind == TokenKind::Ident) {
                cur.bump();
                if let Some(name) = cur.bump() {
                    expr = TypeExpr::named(Some(&tok.text), &name.text);
                }
            }
            // generic instantiation
            if cur.at("[") {
                cur.skip_balanced();
            }
            expr
        }
        _ => {
            cur.bump();
            TypeExpr::Other(tok.text.clone())
        }
    }
}

fn starts_type(cur: &Cursor) -> bool {
    match cur.peek() {
        Some(t) if t.is_string() => false,
        Some(t) if t.kind == TokenKind::Punct => matches!(t.text.as_str(), "*" | "[" | "("),
        Some(t) => t.kind == TokenKind::Ident,
        None => false,
    }
}

fn parse_struct_body(cur: &mut Cursor) -> Vec<FieldDescriptor> {
    let mut fields = Vec::new();
    if !cur.eat("{") {
        return fields;
    }

    loop {
        while cur.eat(";") {}
        if cur.is_done() || cur.eat("}") {
            break;
        }
        let start = cur.pos;

        let embedded = cur.at("*")
            || (cur.at_ident()
                && cur.peek_at(1).map_or(true, |t| {
                    t.is(".") || t.is(";") || t.is("}") || t.is_string()
                }));

        if embedded {
            let type_ref = parse_type(cur);
            let tags = take_tag(cur);
            let name = type_ref.base_name().unwrap_or_default().to_string();
            fields.push(FieldDescriptor {
                name,
                type_ref,
                tags,
                embedded: true,
            });
        } else {
            let names = cur.ident_list();
            let type_ref = parse_type(cur);
            let tags = take_tag(cur);
            for name in names {
                fields.push(FieldDescriptor {
                    name,
                    type_ref: type_ref.clone(),
                    tags: tags.clone(),
                    embedded: false,
                });
            }
        }

        cur.skip_statement();
        if cur.pos == start {
            cur.bump();
        }
    }

    fields
}

fn take_tag(cur: &mut Cursor) -> BTreeMap<String, String> {
    match cur.peek() {
        Some(tok) if tok.is_string() => {
            cur.bump();
            parse_struct_tag(&tok.text)
        }
        _ => BTreeMap::new(),
    }
}

enum ParamEntry {
    Named(String, TypeExpr),
    Bare(String),
    Type(TypeExpr),
}

/// Parses a parenthesized parameter list into named fields
fn parse_params(cur: &mut Cursor) -> Vec<FieldDescriptor> {
    let mut entries = Vec::new();
    if !cur.eat("(") {
        return Vec::new();
    }

    loop {
        if cur.is_done() || cur.eat(")") {
            break;
        }
        let start = cur.pos;
        let next = cur.peek_at(1);
        if cur.at_ident() && next.map_or(false, |t| t.is(",") || t.is(")")) {
            if let Some(tok) = cur.bump() {
                entries.push(ParamEntry::Bare(tok.text.clone()));
            }
        } else if cur.at_ident() && next.map_or(false, |t| !t.is(".")) {
            let name = cur.bump().map(|t| t.text.clone()).unwrap_or_default();
            entries.push(ParamEntry::Named(name, parse_type(cur)));
        } else {
            entries.push(ParamEntry::Type(parse_type(cur)));
        }
        cur.eat(",");
        if cur.pos == start {
            cur.bump();
        }
    }

    let any_named = entries.iter().any(|e| matches!(e, ParamEntry::Named(..)));
    let mut fields = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for (idx, entry) in entries.into_iter().enumerate() {
        match entry {
            ParamEntry::Named(name, type_ref) => {
                for name in pending.drain(..).chain(std::iter::once(name)) {
                    fields.push(param(name, type_ref.clone()));
                }
            }
            ParamEntry::Bare(name) if any_named => pending.push(name),
            ParamEntry::Bare(name) => fields.push(param(idx.to_string(), TypeExpr::named(None, &name))),
            ParamEntry::Type(type_ref) => fields.push(param(idx.to_string(), type_ref)),
        }
    }

    fields
}

fn param(name: String, type_ref: TypeExpr) -> FieldDescriptor {
    FieldDescriptor {
        name,
        type_ref,
        tags: BTreeMap::new(),
        embedded: false,
    }
}

fn is_terminator(tok: Option<&Token>) -> bool {
    match tok {
        None => true,
        Some(t) => [",", ")", ";", "}", "]", ":"].iter().any(|s| t.is(s)),
    }
}

fn parse_expr(cur: &mut Cursor) -> Expr {
    let expr = parse_unary(cur);
    if is_terminator(cur.peek()) {
        return expr;
    }
    // binary expression or something exotic, skip to the end of it
    let mut depth = 0i32;
    while let Some(tok) = cur.peek() {
        if depth == 0 && is_terminator(Some(tok)) {
            break;
        }
        if tok.is_open() {
            depth += 1;
        } else if tok.is_close() {
            depth -= 1;
        }
        cur.bump();
    }
    Expr::Other
}

fn parse_unary(cur: &mut Cursor) -> Expr {
    if cur.eat("&") {
        return Expr::AddressOf(Box::new(parse_unary(cur)));
    }
    if cur.eat("*") {
        return parse_unary(cur);
    }
    if cur.eat("-") || cur.eat("!") || cur.eat("^") || cur.eat("<-") {
        parse_unary(cur);
        return Expr::Other;
    }
    let primary = parse_primary(cur);
    parse_postfix(cur, primary)
}

fn parse_primary(cur: &mut Cursor) -> Expr {
    let Some(tok) = cur.peek() else {
        return Expr::Other;
    };

    match tok.kind {
        TokenKind::Str | TokenKind::RawStr => {
            cur.bump();
            Expr::Str(unquote(&tok.text))
        }
        TokenKind::Number | TokenKind::Char | TokenKind::Comment => {
            cur.bump();
            Expr::Other
        }
        TokenKind::Ident if tok.text == "func" => {
            cur.bump();
            while !cur.is_done() && !cur.at("{") {
                if cur.peek().map_or(false, Token::is_open) {
                    cur.skip_balanced();
                } else {
                    cur.bump();
                }
            }
            cur.skip_balanced();
            Expr::Other
        }
        TokenKind::Ident if matches!(tok.text.as_str(), "map" | "struct") => {
            parse_type(cur);
            if cur.at("{") {
                cur.skip_balanced();
            }
            Expr::Other
        }
        TokenKind::Ident => {
            cur.bump();
            Expr::Path(vec![tok.text.clone()])
        }
        TokenKind::Punct if tok.text == "(" => {
            cur.bump();
            let inner = parse_expr(cur);
            cur.eat(")");
            inner
        }
        TokenKind::Punct if tok.text == "[" => {
            parse_type(cur);
            if cur.at("{") {
                cur.skip_balanced();
            }
            Expr::Other
        }
        TokenKind::Punct => {
            cur.bump();
            Expr::Other
        }
    }
}

fn parse_postfix(cur: &mut Cursor, mut expr: Expr) -> Expr {
    loop {
        if cur.at(".") {
            cur.bump();
            if cur.at("(") {
                cur.skip_balanced();
                expr = Expr::Other;
                continue;
            }
            let Some(name) = cur.bump() else { break };
            expr = match expr {
                Expr::Path(mut segments) if name.kind == TokenKind::Ident => {
                    segments.push(name.text.clone());
                    Expr::Path(segments)
                }
                _ => Expr::Other,
            };
        } else if cur.at("(") {
            cur.bump();
            let args = parse_args(cur);
            let callee = match expr {
                Expr::Path(segments) => segments,
                _ => Vec::new(),
            };
            expr = Expr::Call { callee, args };
        } else if cur.at("{") {
            expr = match expr {
                Expr::Path(segments) if segments.len() <= 2 => {
                    let mut segments = segments.into_iter();
                    let first = segments.next().unwrap_or_default();
                    match segments.next() {
                        Some(name) => Expr::Composite {
                            qualifier: Some(first),
                            name,
                        },
                        None => Expr::Composite {
                            qualifier: None,
                            name: first,
                        },
                    }
                }
                _ => Expr::Other,
            };
            cur.skip_balanced();
        } else if cur.at("[") {
            cur.skip_balanced();
            expr = Expr::Other;
        } else {
            break;
        }
    }
    expr
}

fn parse_args(cur: &mut Cursor) -> Vec<Expr> {
    let mut args = Vec::new();
    loop {
        if cur.is_done() || cur.eat(")") {
            break;
        }
        if cur.at(";") || cur.at("}") || cur.at("]") {
            break;
        }
        let start = cur.pos;
        args.push(parse_expr(cur));
        cur.eat("...");
        if !cur.eat(",") && !cur.at(")") && cur.pos == start {
            cur.bump();
        }
    }
    args
}

fn parse_statement(cur: &mut Cursor) -> Option<Statement> {
    if cur.eat("var") {
        let targets = cur.ident_list();
        if !cur.at("=") && !cur.at(";") {
            parse_type(cur);
        }
        let statement = if cur.eat("=") {
            Some(Statement::Assign {
                targets,
                value: parse_expr(cur),
            })
        } else {
            None
        };
        cur.skip_statement();
        return statement;
    }

    if cur.peek().map_or(false, |t| t.kind == TokenKind::Ident && is_keyword(&t.text)) {
        cur.skip_statement();
        return None;
    }

    let save = cur.pos;
    if cur.at_ident() {
        let targets = cur.ident_list();
        if cur.eat(":=") || cur.eat("=") {
            let value = parse_expr(cur);
            cur.skip_statement();
            return Some(Statement::Assign { targets, value });
        }
        cur.pos = save;
    }

    let expr = parse_expr(cur);
    cur.skip_statement();
    Some(Statement::Expr(expr))
}

/// Parses the statements of a block, cursor on its `{`
fn parse_block(cur: &mut Cursor) -> Vec<Statement> {
    let mut statements = Vec::new();
    if !cur.eat("{") {
        return statements;
    }
    loop {
        while cur.eat(";") {}
        if cur.is_done() || cur.eat("}") {
            break;
        }
        let start = cur.pos;
        if let Some(statement) = parse_statement(cur) {
            statements.push(statement);
        }
        if cur.pos == start {
            cur.bump();
        }
    }
    statements
}

/// Parses a standalone expression, mostly useful for tests and diagnostics
pub fn parse_expression(src: &str) -> Expr {
    let (tokens, _) = split_tokens(tokenize(src));
    parse_expr(&mut Cursor::new(&tokens))
}

struct FileParser<'a> {
    path: &'a Path,
    package_id: &'a str,
    groups: Vec<CommentGroup>,
    declarations: Vec<Declaration>,
}

impl<'a> FileParser<'a> {
    // Doc comment ending on the line right above `line`
    fn doc_for(&self, line: usize) -> Option<String> {
        self.groups
            .iter()
            .find(|g| !g.trailing && g.end_line + 1 == line)
            .map(|g| g.text.clone())
    }

    fn push(
        &mut self,
        kind: DeclKind,
        name: String,
        receiver: Option<String>,
        doc: Option<String>,
        fields: Vec<FieldDescriptor>,
        line: usize,
    ) {
        let symbol = match &receiver {
            Some(recv) => format!("{}.{}", recv, name),
            None => name.clone(),
        };
        self.declarations.push(Declaration {
            package_id: self.package_id.to_string(),
            kind,
            name,
            receiver,
            doc: doc.unwrap_or_default(),
            fields,
            location: SourceLocation {
                file: self.path.to_path_buf(),
                line,
                symbol,
            },
        });
    }

    fn parse_type_spec(&mut self, cur: &mut Cursor, group_doc: Option<String>) {
        let Some(name_tok) = cur.peek().filter(|t| t.kind == TokenKind::Ident) else {
            cur.skip_statement();
            return;
        };
        cur.bump();
        let doc = self.doc_for(name_tok.line).or(group_doc);

        // type parameters
        if cur.at("[")
            && cur.peek_at(1).map_or(false, |t| t.kind == TokenKind::Ident)
            && cur.peek_at(2).map_or(false, |t| !t.is("]"))
        {
            cur.skip_balanced();
        }
        let alias = cur.eat("=");
        let underlying = parse_type(cur);
        let fields = match &underlying {
            TypeExpr::Struct(fields) => fields.clone(),
            _ => Vec::new(),
        };
        cur.skip_statement();
        self.push(
            DeclKind::Type { underlying, alias },
            name_tok.text.clone(),
            None,
            doc,
            fields,
            name_tok.line,
        );
    }

    fn parse_const_spec(&mut self, cur: &mut Cursor, group_doc: Option<String>) {
        let line = cur.peek().map_or(0, |t| t.line);
        let names = cur.ident_list();
        let doc = self.doc_for(line).or(group_doc);
        let type_name = if !cur.at("=") && !cur.at(";") {
            match parse_type(cur) {
                TypeExpr::Named {
                    qualifier: None,
                    name,
                } => Some(name),
                _ => None,
            }
        } else {
            None
        };

        let mut values = Vec::new();
        if cur.eat("=") {
            loop {
                match cur.peek() {
                    Some(tok)
                        if matches!(
                            tok.kind,
                            TokenKind::Str | TokenKind::RawStr | TokenKind::Number | TokenKind::Char
                        ) && cur.peek_at(1).map_or(true, |t| t.is(",") || t.is(";") || t.is(")")) =>
                    {
                        cur.bump();
                        values.push(Some(tok.text.clone()));
                    }
                    _ => {
                        // not a basic literal, skip the expression
                        parse_expr(cur);
                        values.push(None);
                    }
                }
                if !cur.eat(",") {
                    break;
                }
            }
        }
        cur.skip_statement();

        for (name, value) in names.into_iter().zip(values) {
            if let Some(value) = value {
                self.push(
                    DeclKind::Const {
                        type_name: type_name.clone(),
                        value,
                    },
                    name,
                    None,
                    doc.clone(),
                    Vec::new(),
                    line,
                );
            }
        }
    }

    // Runs a spec parser over either a single spec or a parenthesized group
    fn parse_group(
        &mut self,
        cur: &mut Cursor,
        line: usize,
        spec: fn(&mut Self, &mut Cursor, Option<String>),
    ) {
        let group_doc = self.doc_for(line);
        if !cur.eat("(") {
            spec(self, cur, group_doc);
            return;
        }
        loop {
            while cur.eat(";") {}
            if cur.is_done() || cur.eat(")") {
                break;
            }
            let start = cur.pos;
            spec(self, cur, group_doc.clone());
            if cur.pos == start {
                cur.bump();
            }
        }
        cur.eat(";");
    }

    fn parse_func(&mut self, cur: &mut Cursor, line: usize) {
        let doc = self.doc_for(line);
        let receiver = if cur.at("(") {
            parse_params(cur)
                .first()
                .and_then(|recv| recv.type_ref.base_name().map(str::to_string))
        } else {
            None
        };

        let Some(name_tok) = cur.peek().filter(|t| t.kind == TokenKind::Ident) else {
            cur.skip_statement();
            return;
        };
        cur.bump();
        if cur.at("[") {
            cur.skip_balanced();
        }
        let params = parse_params(cur);

        if cur.at("(") {
            cur.skip_balanced();
        } else if !cur.at("{") && starts_type(cur) {
            parse_type(cur);
        }

        let body = if cur.at("{") {
            if receiver.is_none() {
                parse_block(cur)
            } else {
                cur.skip_balanced();
                Vec::new()
            }
        } else {
            Vec::new()
        };
        cur.eat(";");

        self.push(
            DeclKind::Func { body },
            name_tok.text.clone(),
            receiver,
            doc,
            params,
            line,
        );
    }
}

fn parse_import_spec(cur: &mut Cursor, imports: &mut BTreeMap<String, String>) {
    let alias = match cur.peek() {
        Some(t) if t.kind == TokenKind::Ident || t.is(".") => {
            cur.bump();
            Some(t.text.clone())
        }
        _ => None,
    };
    if let Some(path_tok) = cur.peek().filter(|t| t.is_string()) {
        cur.bump();
        let path = unquote(&path_tok.text);
        let local = alias.unwrap_or_else(|| last_segment(&path).to_string());
        if local != "_" && local != "." {
            imports.insert(local, path);
        }
    }
    cur.skip_statement();
}

fn parse_imports(cur: &mut Cursor, imports: &mut BTreeMap<String, String>) {
    if !cur.eat("(") {
        parse_import_spec(cur, imports);
        return;
    }
    loop {
        while cur.eat(";") {}
        if cur.is_done() || cur.eat(")") {
            break;
        }
        let start = cur.pos;
        parse_import_spec(cur, imports);
        if cur.pos == start {
            cur.bump();
        }
    }
    cur.eat(";");
}

/// Parses one Go file into declarations
pub fn parse_source(path: &Path, src: &str, import_path: &str) -> Result<SourceFile, SyntaxError> {
    let (tokens, groups) = split_tokens(tokenize(src));
    let mut cur = Cursor::new(&tokens);

    while cur.eat(";") {}
    if !cur.eat("package") {
        return Err(SyntaxError::MissingPackage);
    }
    let package_name = match cur.bump() {
        Some(tok) if tok.kind == TokenKind::Ident => tok.text.clone(),
        _ => return Err(SyntaxError::MissingPackage),
    };

    let mut imports = BTreeMap::new();
    let mut parser = FileParser {
        path,
        package_id: import_path,
        groups,
        declarations: Vec::new(),
    };

    while let Some(tok) = cur.peek() {
        if tok.kind != TokenKind::Ident {
            cur.bump();
            continue;
        }
        match tok.text.as_str() {
            "import" => {
                cur.bump();
                parse_imports(&mut cur, &mut imports);
            }
            "type" => {
                cur.bump();
                parser.parse_group(&mut cur, tok.line, FileParser::parse_type_spec);
            }
            "const" => {
                cur.bump();
                parser.parse_group(&mut cur, tok.line, FileParser::parse_const_spec);
            }
            "func" => {
                cur.bump();
                parser.parse_func(&mut cur, tok.line);
            }
            _ => {
                cur.bump();
                cur.skip_statement();
            }
        }
    }

    debug!(
        "Parsed {:?}: package {}, {} declarations",
        path,
        package_name,
        parser.declarations.len()
    );

    Ok(SourceFile {
        path: path.to_path_buf(),
        package_name,
        import_path: import_path.to_string(),
        imports,
        comments: parser.groups.into_iter().map(|g| g.text).collect(),
        declarations: parser.declarations,
    })
}
