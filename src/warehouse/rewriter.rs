//! SQL safety rewriting: bound every user-submitted statement by a row
//! limit before it reaches the warehouse.
//!
//! Works on the lexer token stream rather than a parsed AST so arbitrary
//! warehouse dialect constructs pass through untouched, while string
//! literals and comments are still classified correctly (a semicolon or
//! `LIMIT` inside either is never misread as structure).

use sqlparser::dialect::MySqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("multi-statement SQL is not allowed")]
    MultiStatement,

    #[error("failed to tokenize SQL: {0}")]
    Tokenize(String),
}

/// One statement's tokens, split on top-level semicolons.
struct RawStatement {
    tokens: Vec<Token>,
    had_semicolon: bool,
}

impl RawStatement {
    fn is_empty(&self) -> bool {
        !self.tokens.iter().any(is_significant)
    }

    fn render(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.to_string())
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Rewrite `sql` so no statement can return more than `max_limit` rows.
///
/// * `limit` is the requested row cap, clamped into `1..=max_limit`.
/// * Statements already carrying a numeric `LIMIT` keep it, unless the value
///   exceeds the clamped cap, in which case the number is rewritten in
///   place. A non-numeric limit operand (e.g. a placeholder) is left alone.
/// * Statements without a `LIMIT` get ` LIMIT {cap};` appended when their
///   first DML keyword is SELECT, UPDATE or DELETE; everything else (DDL,
///   SHOW, DESCRIBE, INSERT, ...) passes through unmodified.
/// * More than one non-empty statement fails unless `allow_multi_stmt`;
///   empty statements are dropped from the output.
pub fn add_limit_safe(
    sql: &str,
    limit: i64,
    allow_multi_stmt: bool,
    max_limit: i64,
) -> Result<String, RewriteError> {
    let effective_limit = limit.min(max_limit).max(1);

    let dialect = MySqlDialect {};
    // Unescaping must stay off: tokens are re-rendered verbatim, and a
    // literal like 'it\'s' would otherwise come back with its escape
    // stripped, producing broken SQL.
    let tokens = Tokenizer::new(&dialect, sql)
        .with_unescape(false)
        .tokenize()
        .map_err(|e| RewriteError::Tokenize(e.to_string()))?;

    let statements = split_statements(tokens);
    let statement_count = statements.iter().filter(|s| !s.is_empty()).count();
    if statement_count > 1 && !allow_multi_stmt {
        return Err(RewriteError::MultiStatement);
    }

    let mut rewritten = Vec::with_capacity(statement_count);
    for mut stmt in statements {
        if stmt.is_empty() {
            continue;
        }

        if has_limit_clause(&stmt.tokens) {
            cap_existing_limit(&mut stmt.tokens, effective_limit);
            rewritten.push(finish(stmt.render(), stmt.had_semicolon));
            continue;
        }

        match first_dml_keyword(&stmt.tokens) {
            Some(Keyword::SELECT) | Some(Keyword::UPDATE) | Some(Keyword::DELETE) => {
                let body = stmt.render();
                rewritten.push(format!("{} LIMIT {};", body.trim_end_matches(';'), effective_limit));
            }
            _ => rewritten.push(finish(stmt.render(), stmt.had_semicolon)),
        }
    }

    Ok(rewritten.join("\n"))
}

fn finish(body: String, had_semicolon: bool) -> String {
    if had_semicolon {
        format!("{};", body)
    } else {
        body
    }
}

fn split_statements(tokens: Vec<Token>) -> Vec<RawStatement> {
    let mut statements = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        if matches!(token, Token::SemiColon) {
            statements.push(RawStatement { tokens: std::mem::take(&mut current), had_semicolon: true });
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        statements.push(RawStatement { tokens: current, had_semicolon: false });
    }
    statements
}

fn is_significant(token: &Token) -> bool {
    !matches!(token, Token::Whitespace(_))
}

fn keyword_of(token: &Token) -> Option<Keyword> {
    match token {
        // Quoted identifiers are names, never keywords.
        Token::Word(word) if word.quote_style.is_none() => Some(word.keyword),
        _ => None,
    }
}

fn has_limit_clause(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| keyword_of(t) == Some(Keyword::LIMIT))
}

/// First DML-class keyword in the statement, mirroring how the statement
/// verb is classified: `EXPLAIN SELECT ...` still counts as a SELECT.
fn first_dml_keyword(tokens: &[Token]) -> Option<Keyword> {
    tokens.iter().find_map(|t| match keyword_of(t) {
        kw @ (Some(Keyword::SELECT)
        | Some(Keyword::INSERT)
        | Some(Keyword::UPDATE)
        | Some(Keyword::DELETE)) => kw,
        _ => None,
    })
}

/// Rewrite the numeric operand of the statement's outer `LIMIT` in place
/// when it exceeds `cap`. The last `LIMIT` keyword is taken as the outer
/// one (subquery limits come earlier in the token stream). Handles both
/// `LIMIT n` and `LIMIT offset, n`; non-numeric operands are left alone.
fn cap_existing_limit(tokens: &mut [Token], cap: i64) {
    let limit_pos = match tokens
        .iter()
        .rposition(|t| keyword_of(t) == Some(Keyword::LIMIT))
    {
        Some(pos) => pos,
        None => return,
    };

    let significant: Vec<usize> = tokens
        .iter()
        .enumerate()
        .skip(limit_pos + 1)
        .filter(|(_, t)| is_significant(t))
        .map(|(i, _)| i)
        .collect();

    // LIMIT offset, count: the row cap is the second number.
    let target = match significant.as_slice() {
        [_offset, comma, second, ..]
            if matches!(tokens[*comma], Token::Comma)
                && matches!(tokens[*second], Token::Number(_, _)) =>
        {
            *second
        }
        [first, ..] => *first,
        [] => return,
    };

    if let Token::Number(value, _) = &tokens[target] {
        if let Ok(existing) = value.parse::<i64>() {
            if existing > cap {
                tokens[target] = Token::Number(cap.to_string(), false);
            }
        }
    }
}
