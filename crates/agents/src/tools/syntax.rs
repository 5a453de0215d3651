//! Static Python syntax checking.
//!
//! The candidate code is parsed with tree-sitter and never executed. The
//! grammar is error tolerant, so three passes run over the source and the
//! earliest finding wins. On a tie the first pass listed here wins:
//!
//! - block layout: indentation consistency and `else`/`elif`/`except`/
//!   `finally` clauses with nothing to attach to;
//! - constructs the grammar accepts but Python 3 rejects (statement `print`
//!   and `exec`, misplaced defaults, unparenthesized comprehension tuples);
//! - parse errors in the tree, with compound statement headers that lack
//!   their trailing colon reported as `expected ':'` on the header itself.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;
use tracing::{debug, info};
use tree_sitter::{Node, Parser, Point};

const VALID_MESSAGE: &str = "Code is syntactically valid";

const HEADER_KEYWORDS: &[&str] = &[
    "def", "class", "if", "elif", "else", "for", "while", "with", "try", "except", "finally",
    "async",
];

/// Tokens after which an expression or statement cannot end.
const DANGLING_TOKENS: &[&str] = &[
    "+", "-", "*", "/", "//", "%", "**", "@", "|", "&", "^", "<<", ">>", "~", "=", "==", "!=",
    "<", ">", "<=", ">=", ":=", "+=", "-=", "*=", "/=", "//=", "%=", "**=", "@=", "|=", "&=",
    "^=", "<<=", ">>=", "->", ".", ",", "(", "[", "{", "and", "or", "not", "in", "is", "lambda",
    "await",
];

/// Outcome of a syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub is_valid: bool,
    /// Human-readable verdict, suitable for embedding in a stage's output.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_column: Option<usize>,
}

impl ValidationVerdict {
    fn valid() -> Self {
        Self {
            is_valid: true,
            message: VALID_MESSAGE.to_string(),
            error_line: None,
            error_column: None,
        }
    }

    fn syntax_error(diagnostic: Diagnostic) -> Self {
        Self {
            is_valid: false,
            message: format!(
                "Syntax Error: {} at line {}, column {}",
                diagnostic.detail, diagnostic.line, diagnostic.column
            ),
            error_line: Some(diagnostic.line),
            error_column: Some(diagnostic.column),
        }
    }

    fn failure(reason: impl std::fmt::Display) -> Self {
        Self {
            is_valid: false,
            message: format!("Validation Error: {reason}"),
            error_line: None,
            error_column: None,
        }
    }
}

/// 1-based location plus a short description.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Diagnostic {
    detail: String,
    line: usize,
    column: usize,
}

impl Diagnostic {
    fn new(detail: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            detail: detail.into(),
            line,
            column,
        }
    }

    fn at(detail: impl Into<String>, point: Point, lines: &[&str]) -> Self {
        Self::new(
            detail,
            point.row + 1,
            char_column(lines.get(point.row).copied(), point.column) + 1,
        )
    }

    fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }
}

/// Python syntax validator. Stateless; safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxValidator;

impl SyntaxValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check `code` without running it. Always returns a verdict.
    pub fn validate(&self, code: &str) -> ValidationVerdict {
        debug!(code_len = code.len(), "Validating code syntax");

        let verdict = match catch_unwind(AssertUnwindSafe(|| first_syntax_error(code))) {
            Ok(Ok(None)) => ValidationVerdict::valid(),
            Ok(Ok(Some(diagnostic))) => ValidationVerdict::syntax_error(diagnostic),
            Ok(Err(reason)) => ValidationVerdict::failure(reason),
            Err(panic) => ValidationVerdict::failure(panic_message(panic.as_ref())),
        };

        info!(
            valid = verdict.is_valid,
            line = ?verdict.error_line,
            column = ?verdict.error_column,
            verdict = %verdict.message,
            "Code validation verdict"
        );
        verdict
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "parser panicked".to_string()
    }
}

fn first_syntax_error(code: &str) -> Result<Option<Diagnostic>, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| format!("failed to load Python grammar: {e}"))?;
    let tree = parser
        .parse(code, None)
        .ok_or_else(|| "parser produced no syntax tree".to_string())?;

    let root = tree.root_node();
    let lines: Vec<&str> = code.split('\n').collect();

    let tree_error = root.has_error().then(|| parse_error(root, &lines));
    let earliest = [
        layout_error(&lines),
        python3_violation(root, code, &lines),
        tree_error,
    ]
    .into_iter()
    .flatten()
    .min_by_key(Diagnostic::position);

    Ok(earliest)
}

fn parse_error(root: Node<'_>, lines: &[&str]) -> Diagnostic {
    let Some(node) = earliest_error_node(root) else {
        return Diagnostic::new("invalid syntax", 1, 1);
    };

    if let Some(header) = unterminated_header(lines, node.start_position().row) {
        return header;
    }

    if node.is_missing() {
        let detail = if node.is_named() {
            format!("missing {}", node.kind())
        } else {
            format!("expected '{}'", node.kind())
        };
        return Diagnostic::at(detail, node.start_position(), lines);
    }

    Diagnostic::at("invalid syntax", offending_point(node), lines)
}

/// The ERROR or MISSING node that starts first in the document.
fn earliest_error_node(root: Node<'_>) -> Option<Node<'_>> {
    let mut best: Option<Node<'_>> = None;
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            if best.is_none_or(|b| node.start_byte() < b.start_byte()) {
                best = Some(node);
            }
            continue;
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }

    best
}

/// Where inside an ERROR node the parse actually went wrong.
///
/// An ERROR ending on an operator is an incomplete expression, so the fault
/// is whatever follows it. An ERROR opened by a keyword points at the token
/// the keyword could not accept.
fn offending_point(error: Node<'_>) -> Point {
    let leaves = leaves(error);
    if let Some(last) = leaves.last()
        && !last.is_named()
        && DANGLING_TOKENS.contains(&last.kind())
    {
        return error.end_position();
    }
    if let [first, second, ..] = leaves.as_slice()
        && is_keyword_token(*first)
    {
        return second.start_position();
    }
    error.start_position()
}

fn leaves(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        let children: Vec<Node<'_>> = current.children(&mut cursor).collect();
        if children.is_empty() {
            out.push(current);
        } else {
            stack.extend(children.into_iter().rev());
        }
    }
    out
}

fn is_keyword_token(node: Node<'_>) -> bool {
    let kind = node.kind();
    !node.is_named() && !kind.is_empty() && kind.chars().all(|c| c.is_ascii_lowercase())
}

fn char_column(line: Option<&str>, byte_column: usize) -> usize {
    line.and_then(|l| l.get(..byte_column))
        .map(|prefix| prefix.chars().count())
        .unwrap_or(byte_column)
}

/// Earliest construct the grammar accepts that Python 3 does not.
fn python3_violation(root: Node<'_>, code: &str, lines: &[&str]) -> Option<Diagnostic> {
    let mut best: Option<Diagnostic> = None;
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if let Some(found) = node_violation(node, code, lines)
            && best
                .as_ref()
                .is_none_or(|b| found.position() < b.position())
        {
            best = Some(found);
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }

    best
}

fn node_violation(node: Node<'_>, code: &str, lines: &[&str]) -> Option<Diagnostic> {
    match node.kind() {
        "print_statement" if is_statement_print(node, code) => Some(Diagnostic::at(
            "Missing parentheses in call to 'print'",
            node.start_position(),
            lines,
        )),
        "exec_statement" => Some(Diagnostic::at(
            "Missing parentheses in call to 'exec'",
            node.start_position(),
            lines,
        )),
        "parameters" | "lambda_parameters" => misplaced_default(node, lines),
        "for_in_clause" => unparenthesized_iterable(node, lines),
        _ => None,
    }
}

/// `print x`, as opposed to `print (x)` or `print >> f`, which Python 3 reads
/// as ordinary expressions.
fn is_statement_print(node: Node<'_>, code: &str) -> bool {
    node.utf8_text(code.as_bytes())
        .ok()
        .and_then(|text| text.strip_prefix("print"))
        .and_then(|rest| rest.trim_start().chars().next())
        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '\'' | '"' | '{'))
}

fn misplaced_default(params: Node<'_>, lines: &[&str]) -> Option<Diagnostic> {
    let mut seen_default = false;
    let mut cursor = params.walk();
    for param in params.children(&mut cursor) {
        match param.kind() {
            "default_parameter" | "typed_default_parameter" => seen_default = true,
            "list_splat_pattern" | "dictionary_splat_pattern" | "keyword_separator" | "*" => break,
            "typed_parameter" if starts_with_splat(param) => break,
            "identifier" | "typed_parameter" | "tuple_pattern" if seen_default => {
                return Some(Diagnostic::at(
                    "non-default argument follows default argument",
                    param.start_position(),
                    lines,
                ));
            }
            _ => {}
        }
    }
    None
}

fn starts_with_splat(param: Node<'_>) -> bool {
    let mut cursor = param.walk();
    let first = param.named_children(&mut cursor).next();
    first.is_some_and(|n| matches!(n.kind(), "list_splat_pattern" | "dictionary_splat_pattern"))
}

/// `for x in a, b` inside a comprehension needs parentheses in Python 3.
fn unparenthesized_iterable(clause: Node<'_>, lines: &[&str]) -> Option<Diagnostic> {
    let mut cursor = clause.walk();
    let comma = clause.children(&mut cursor).find(|c| c.kind() == ",")?;

    let bare_call_argument = clause
        .parent()
        .filter(|g| g.kind() == "generator_expression")
        .filter(|g| g.parent().is_some_and(|call| call.kind() == "call"));

    Some(match bare_call_argument {
        Some(generator) => Diagnostic::at(
            "Generator expression must be parenthesized",
            generator
                .child_by_field_name("body")
                .unwrap_or(generator)
                .start_position(),
            lines,
        ),
        None => Diagnostic::at("invalid syntax", comma.start_position(), lines),
    })
}

/// Lexical state carried from one physical line to the next.
#[derive(Debug, Default)]
struct LineScanner {
    depth: i32,
    triple_quote: Option<char>,
}

/// What a single physical line contributed to its logical line.
#[derive(Debug, Default)]
struct LineFacts {
    /// Byte length of the line with comments and trailing whitespace removed.
    code_end: usize,
    /// Byte offset just past the last `:` (not `:=`) outside brackets and strings.
    colon_end: Option<usize>,
    /// The line ends in a `\` continuation.
    continues: bool,
}

impl LineScanner {
    fn at_statement_start(&self) -> bool {
        self.depth <= 0 && self.triple_quote.is_none()
    }

    fn scan(&mut self, line: &str) -> LineFacts {
        let mut facts = LineFacts::default();
        let mut quote: Option<char> = None;
        let mut chars = line.char_indices().peekable();
        let mut last_code = 0;

        while let Some((i, c)) = chars.next() {
            if let Some(tq) = self.triple_quote {
                if c == tq && line[i..].starts_with(&tq.to_string().repeat(3)) {
                    self.triple_quote = None;
                    chars.next();
                    chars.next();
                    last_code = i + 3;
                } else if c == '\\' {
                    chars.next();
                }
                continue;
            }
            if let Some(q) = quote {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                    last_code = i + 1;
                }
                continue;
            }
            match c {
                '#' => break,
                '\'' | '"' => {
                    if line[i..].starts_with(&c.to_string().repeat(3)) {
                        self.triple_quote = Some(c);
                        chars.next();
                        chars.next();
                    } else {
                        quote = Some(c);
                    }
                }
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth -= 1,
                ':' if self.depth <= 0 && chars.peek().map(|&(_, n)| n) != Some('=') => {
                    facts.colon_end = Some(i + 1);
                }
                _ => {}
            }
            if !c.is_whitespace() {
                last_code = i + c.len_utf8();
            }
        }

        facts.code_end = last_code;
        facts.continues = self.triple_quote.is_none() && line[..last_code].ends_with('\\');
        facts
    }
}

/// A statement spanning one or more physical lines. Blank and comment-only
/// lines never form one.
#[derive(Debug)]
struct LogicalLine<'a> {
    start_row: usize,
    end_row: usize,
    /// The first physical line.
    head: &'a str,
    has_colon: bool,
    /// The last code character is a top-level `:`, so a block must follow.
    opens_block: bool,
    /// Character column just past the last code character on `end_row`.
    end_column: usize,
}

/// Split `lines` into complete logical lines. A statement still open at the
/// end of input is left out.
fn logical_lines<'a>(lines: &[&'a str]) -> Vec<LogicalLine<'a>> {
    let mut scanner = LineScanner::default();
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut has_colon = false;
    let mut has_code = false;

    for (row, &line) in lines.iter().enumerate() {
        if start.is_none() {
            if !scanner.at_statement_start() {
                scanner.scan(line);
                continue;
            }
            start = Some(row);
            has_colon = false;
            has_code = false;
        }

        let facts = scanner.scan(line);
        has_colon |= facts.colon_end.is_some();
        has_code |= facts.code_end > 0;

        if facts.continues || !scanner.at_statement_start() {
            continue;
        }

        if let Some(start_row) = start.take()
            && has_code
        {
            out.push(LogicalLine {
                start_row,
                end_row: row,
                head: lines[start_row],
                has_colon,
                opens_block: facts.colon_end == Some(facts.code_end),
                end_column: char_column(Some(line), facts.code_end),
            });
        }
    }

    out
}

/// The compound statement keyword opening `line`, looking through `async`.
fn leading_keyword(line: &str) -> Option<(&'static str, &str)> {
    let trimmed = line.trim_start();
    let word = trimmed
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    let keyword = HEADER_KEYWORDS.iter().copied().find(|k| *k == word)?;
    let rest = &trimmed[word.len()..];
    if keyword == "async" {
        return leading_keyword(rest).filter(|(k, _)| matches!(*k, "def" | "for" | "with"));
    }
    Some((keyword, rest))
}

fn starts_expression(text: &str) -> bool {
    text.trim_start().chars().next().is_some_and(|c| {
        c.is_alphanumeric() || matches!(c, '_' | '(' | '[' | '{' | '\'' | '"' | '-' | '+' | '~')
    })
}

/// Whether `line` reads as a compound statement header apart from its colon.
fn is_header(line: &str) -> bool {
    let Some((keyword, rest)) = leading_keyword(line) else {
        return false;
    };
    match keyword {
        "def" | "class" => rest
            .trim_start()
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_'),
        "else" | "try" | "finally" => rest.trim().is_empty(),
        "except" => rest.trim().is_empty() || starts_expression(rest),
        _ => starts_expression(rest),
    }
}

/// Earliest compound statement header, ending at or before `error_row`,
/// whose logical line has no top-level colon.
fn unterminated_header(lines: &[&str], error_row: usize) -> Option<Diagnostic> {
    logical_lines(lines)
        .into_iter()
        .take_while(|logical| logical.end_row <= error_row)
        .find(|logical| !logical.has_colon && is_header(logical.head))
        .map(|logical| Diagnostic::new("expected ':'", logical.end_row + 1, logical.end_column + 1))
}

/// Indentation width with tabs advancing to the next multiple of eight, and
/// the number of characters making it up.
fn indentation(line: &str) -> (usize, usize) {
    let mut width = 0;
    let mut count = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            '\x0c' => width = 0,
            _ => break,
        }
        count += 1;
    }
    (width, count)
}

/// Clauses that continue an earlier statement at the same indentation.
fn required_predecessors(keyword: &str) -> Option<&'static [&'static str]> {
    match keyword {
        "elif" => Some(&["if", "elif"]),
        "else" => Some(&["if", "elif", "for", "while", "except"]),
        "except" => Some(&["try", "except"]),
        "finally" => Some(&["try", "except", "else"]),
        _ => None,
    }
}

#[derive(Debug)]
struct BlockLevel {
    width: usize,
    /// Keyword of the latest statement at this level, if it was compound.
    last_keyword: Option<&'static str>,
}

/// First indentation or clause-placement error in the block structure.
fn layout_error(lines: &[&str]) -> Option<Diagnostic> {
    let mut levels = vec![BlockLevel {
        width: 0,
        last_keyword: None,
    }];
    let mut block_expected = false;

    for logical in logical_lines(lines) {
        let (width, indent_chars) = indentation(logical.head);
        let line = logical.start_row + 1;
        let column = indent_chars + 1;
        let current = levels.last().map_or(0, |level| level.width);

        if block_expected {
            if width <= current {
                return Some(Diagnostic::new("expected an indented block", line, column));
            }
            levels.push(BlockLevel {
                width,
                last_keyword: None,
            });
        } else if width > current {
            return Some(Diagnostic::new("unexpected indent", line, column));
        } else if width < current {
            while levels.last().is_some_and(|level| level.width > width) {
                levels.pop();
            }
            if levels.last().map_or(0, |level| level.width) != width {
                return Some(Diagnostic::new(
                    "unindent does not match any outer indentation level",
                    line,
                    column,
                ));
            }
        }

        let keyword = leading_keyword(logical.head).map(|(k, _)| k);
        let level = levels.last_mut()?;
        if let Some(allowed) = keyword.and_then(required_predecessors)
            && !level.last_keyword.is_some_and(|prev| allowed.contains(&prev))
        {
            return Some(Diagnostic::new("invalid syntax", line, column));
        }
        level.last_keyword = keyword;
        block_expected = logical.opens_block;
    }

    None
}
