//! S-expression tokenizer and printer.
//!
//! The tree produced here knows nothing about symbols. It distinguishes bare
//! atoms (`passive`, `yes`) from quoted strings (`"R"`) and numbers so that a
//! document survives `parse` -> `serialize` -> `parse` unchanged.

use std::fmt;
use thiserror::Error;

/// Column limit used when packing runs of `(xy ..)` points onto one line.
const XY_LINE_WIDTH: usize = 99;

/// Decimal places kept when printing numbers.
const NUMBER_PRECISION: i32 = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unbalanced expression: unexpected ')' at line {line}")]
    UnbalancedClose { line: usize },
    #[error("Unterminated string starting at line {line}")]
    UnterminatedString { line: usize },
    #[error("Unexpected token at line {line}: {token}")]
    UnexpectedToken { line: usize, token: String },
    #[error("Trailing data after top-level expression at line {line}")]
    TrailingData { line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    /// Bare token such as a keyword or enum value.
    Atom(String),
    /// Double-quoted string.
    Str(String),
    Number(f64),
    List(Vec<SExp>),
}

impl SExp {
    pub fn atom(s: impl Into<String>) -> Self {
        SExp::Atom(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        SExp::Str(s.into())
    }

    pub fn number(v: f64) -> Self {
        SExp::Number(v)
    }

    /// `(keyword child child ...)`
    pub fn node(keyword: &str, children: impl IntoIterator<Item = SExp>) -> Self {
        let mut items = vec![SExp::atom(keyword)];
        items.extend(children);
        SExp::List(items)
    }

    /// `(keyword yes)` / `(keyword no)`
    pub fn yes_no(keyword: &str, value: bool) -> Self {
        SExp::node(keyword, [SExp::atom(if value { "yes" } else { "no" })])
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Text of an atom or a quoted string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SExp::Atom(s) | SExp::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SExp::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<SExp>> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, SExp::List(_))
    }

    /// The leading atom of a list, e.g. `pin` for `(pin passive line ...)`.
    pub fn keyword(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(|first| first.as_atom())
    }

    /// First direct child list whose keyword is `key`.
    pub fn get(&self, key: &str) -> Option<&SExp> {
        self.as_list()?
            .iter()
            .find(|item| item.keyword() == Some(key))
    }

    /// All direct child lists whose keyword is `key`.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SExp> + 'a {
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .filter(move |item| item.keyword() == Some(key))
    }

    /// Element following the keyword of the child list `key`: `(key VALUE ...)`.
    pub fn value_of(&self, key: &str) -> Option<&SExp> {
        self.get(key)
            .and_then(|child| child.as_list())
            .and_then(|items| items.get(1))
    }

    pub fn string_of(&self, key: &str) -> Option<&str> {
        self.value_of(key).and_then(|v| v.as_str())
    }

    pub fn number_of(&self, key: &str) -> Option<f64> {
        self.value_of(key).and_then(|v| v.as_number())
    }

    /// `(key yes)` -> `Some(true)`, `(key no)` -> `Some(false)`, a bare `(key)` -> `Some(true)`.
    pub fn flag_of(&self, key: &str) -> Option<bool> {
        let child = self.get(key)?;
        match child.as_list().and_then(|items| items.get(1)) {
            Some(value) => Some(value.as_str() == Some("yes")),
            None => Some(true),
        }
    }

    /// Whether a bare atom `word` appears among the direct children.
    pub fn has_atom(&self, word: &str) -> bool {
        self.as_list()
            .map(|items| items.iter().any(|item| item.as_atom() == Some(word)))
            .unwrap_or(false)
    }

    /// Single-line rendering.
    pub fn to_compact_string(&self) -> String {
        self.to_string()
    }

    /// Tab-indented, multi-line rendering used for library files.
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::new();
        write_pretty(self, 0, &mut out);
        out
    }
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Atom(s) => {
                if atom_needs_quotes(s) {
                    write!(f, "{}", quote(s))
                } else {
                    write!(f, "{}", s)
                }
            }
            SExp::Str(s) => write!(f, "{}", quote(s)),
            SExp::Number(v) => write!(f, "{}", format_number(*v)),
            SExp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parse a complete document consisting of exactly one expression.
pub fn parse(text: &str) -> Result<SExp, ParseError> {
    SExpParser::new(text).parse()
}

/// Pretty-print an expression, terminated by a newline.
pub fn serialize(expr: &SExp) -> String {
    let mut out = expr.to_pretty_string();
    out.push('\n');
    out
}

/// Fixed rounding so repeated load/save cycles never drift.
pub fn format_number(value: f64) -> String {
    let scale = 10f64.powi(NUMBER_PRECISION);
    let rounded = (value * scale).round() / scale;
    if !rounded.is_finite() {
        return format!("{}", value);
    }
    if rounded == 0.0 {
        return "0".to_string();
    }
    let mut s = format!("{:.*}", NUMBER_PRECISION as usize, rounded);
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    s
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn atom_needs_quotes(s: &str) -> bool {
    s.is_empty()
        || parses_as_number(s)
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | '\\'))
}

/// Value of a token the parser reads as a number. Literals beyond the f64
/// range stay atoms.
fn number_value(s: &str) -> Option<f64> {
    if !is_number_token(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parses_as_number(s: &str) -> bool {
    number_value(s).is_some()
}

/// Plain decimal literal: optional sign, digits, at most one dot. No exponent,
/// so tokens like `inf` or `1e5` stay atoms.
fn is_number_token(s: &str) -> bool {
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    let mut digits = 0;
    let mut dots = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

fn is_xy(expr: &SExp) -> bool {
    expr.keyword() == Some("xy")
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn write_pretty(expr: &SExp, depth: usize, out: &mut String) {
    let items = match expr {
        SExp::List(items) if items.iter().any(SExp::is_list) => items,
        _ => {
            out.push_str(&expr.to_compact_string());
            return;
        }
    };

    out.push('(');
    let head = items.iter().take_while(|item| !item.is_list()).count();
    for (i, item) in items[..head].iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&item.to_compact_string());
    }

    let mut rest = items[head..].iter().peekable();
    while let Some(item) = rest.next() {
        out.push('\n');
        push_indent(out, depth + 1);
        if is_xy(item) {
            let mut width = (depth + 1) * 4;
            let text = item.to_compact_string();
            width += text.len();
            out.push_str(&text);
            while let Some(next) = rest.peek() {
                if !is_xy(next) {
                    break;
                }
                let text = next.to_compact_string();
                if width + 1 + text.len() > XY_LINE_WIDTH {
                    break;
                }
                width += 1 + text.len();
                out.push(' ');
                out.push_str(&text);
                rest.next();
            }
        } else {
            write_pretty(item, depth + 1, out);
        }
    }
    out.push('\n');
    push_indent(out, depth);
    out.push(')');
}

pub struct SExpParser {
    input: Vec<char>,
    pos: usize,
    line: usize,
}

impl SExpParser {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }
        let expr = self.parse_sexp()?;
        self.skip_whitespace();
        if !self.is_eof() {
            if self.peek() == ')' {
                return Err(ParseError::UnbalancedClose { line: self.line });
            }
            return Err(ParseError::TrailingData { line: self.line });
        }
        Ok(expr)
    }

    fn parse_sexp(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();

        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }

        match self.peek() {
            '(' => self.parse_list(),
            ')' => Err(ParseError::UnbalancedClose { line: self.line }),
            '"' => self.parse_string(),
            _ => self.parse_symbol(),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        self.expect_char('(')?;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_eof() {
                return Err(ParseError::UnexpectedEof);
            }

            if self.peek() == ')' {
                self.advance();
                break;
            }

            items.push(self.parse_sexp()?);
        }

        Ok(SExp::List(items))
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        let start_line = self.line;
        self.expect_char('"')?;
        let mut s = String::new();
        let mut escaped = false;

        while !self.is_eof() {
            let ch = self.peek();

            if escaped {
                match ch {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    '\\' => s.push('\\'),
                    '"' => s.push('"'),
                    _ => {
                        s.push('\\');
                        s.push(ch);
                    }
                }
                escaped = false;
                self.advance();
            } else if ch == '\\' {
                escaped = true;
                self.advance();
            } else if ch == '"' {
                self.advance();
                return Ok(SExp::Str(s));
            } else {
                s.push(ch);
                self.advance();
            }
        }

        Err(ParseError::UnterminatedString { line: start_line })
    }

    fn parse_symbol(&mut self) -> Result<SExp, ParseError> {
        let mut s = String::new();

        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_whitespace() || ch == '(' || ch == ')' {
                break;
            }
            if ch == '"' {
                return Err(ParseError::UnexpectedToken {
                    line: self.line,
                    token: format!("{}\"", s),
                });
            }
            s.push(ch);
            self.advance();
        }

        match number_value(&s) {
            Some(value) => Ok(SExp::Number(value)),
            None => Ok(SExp::Atom(s)),
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        if self.pos < self.input.len() {
            self.input[self.pos]
        } else {
            '\0'
        }
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            if self.input[self.pos] == '\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }

        let ch = self.peek();
        if ch == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                line: self.line,
                token: format!("expected '{}', found '{}'", expected, ch),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atom() {
        let result = parse("hello").unwrap();
        assert_eq!(result, SExp::Atom("hello".to_string()));
    }

    #[test]
    fn test_parse_string() {
        let result = parse("\"hello world\"").unwrap();
        assert_eq!(result, SExp::Str("hello world".to_string()));
    }

    #[test]
    fn test_parse_numbers() {
        let result = parse("(at -2.54 0 90)").unwrap();
        let items = result.as_list().unwrap();
        assert_eq!(items[1], SExp::Number(-2.54));
        assert_eq!(items[2], SExp::Number(0.0));
        assert_eq!(items[3], SExp::Number(90.0));
    }

    #[test]
    fn test_quoted_number_stays_string() {
        let result = parse("(number \"1\")").unwrap();
        assert_eq!(result.as_list().unwrap()[1], SExp::Str("1".to_string()));
    }

    #[test]
    fn test_parse_nested() {
        let result = parse("(a (b c) d)").unwrap();
        let items = result.as_list().expect("Expected list");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], SExp::Atom("a".to_string()));
        assert_eq!(items[1].as_list().map(|l| l.len()), Some(2));
    }

    #[test]
    fn test_unbalanced_open() {
        assert_eq!(parse("(a (b c)"), Err(ParseError::UnexpectedEof));
    }

    #[test]
    fn test_unbalanced_close() {
        assert!(matches!(
            parse("(a b))"),
            Err(ParseError::UnbalancedClose { .. })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            parse("(name \"abc)"),
            Err(ParseError::UnterminatedString { line: 1 })
        ));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("   \n"), Err(ParseError::UnexpectedEof));
    }

    #[test]
    fn test_escapes_survive() {
        let text = r#"(text "a \"b\"\nc\\d")"#;
        let parsed = parse(text).unwrap();
        assert_eq!(
            parsed.as_list().unwrap()[1],
            SExp::Str("a \"b\"\nc\\d".to_string())
        );
        assert_eq!(parsed.to_compact_string(), text);
    }

    #[test]
    fn test_get() {
        let sexp = parse("(root (key value) other stuff)").unwrap();
        assert_eq!(sexp.string_of("key"), Some("value"));
        assert!(sexp.has_atom("other"));
    }

    #[test]
    fn test_flag_of() {
        let sexp = parse("(pin (hide yes) (power) (in_bom no))").unwrap();
        assert_eq!(sexp.flag_of("hide"), Some(true));
        assert_eq!(sexp.flag_of("power"), Some(true));
        assert_eq!(sexp.flag_of("in_bom"), Some(false));
        assert_eq!(sexp.flag_of("on_board"), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.27), "1.27");
        assert_eq!(format_number(20251024.0), "20251024");
        assert_eq!(format_number(-0.0000001), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(-2.54), "-2.54");
        assert_eq!(format_number(1e305).parse::<f64>().unwrap(), 1e305);
    }

    #[test]
    fn test_out_of_range_literal_round_trips() {
        let text = format!("(at {} 0)", "9".repeat(400));
        let first = parse(&text).unwrap();
        assert!(matches!(first.as_list().unwrap()[1], SExp::Atom(_)));
        let again = parse(&serialize(&first)).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn test_minimal_quoting() {
        assert_eq!(SExp::atom("passive").to_string(), "passive");
        assert_eq!(SExp::atom("two words").to_string(), "\"two words\"");
        assert_eq!(SExp::atom("12").to_string(), "\"12\"");
        assert_eq!(SExp::atom("").to_string(), "\"\"");
        assert_eq!(SExp::string("R").to_string(), "\"R\"");
    }

    #[test]
    fn test_pretty_layout() {
        let expr = parse("(a (b 1 2) (c (d x)))").unwrap();
        assert_eq!(
            expr.to_pretty_string(),
            "(a\n\t(b 1 2)\n\t(c\n\t\t(d x)\n\t)\n)"
        );
    }

    #[test]
    fn test_pretty_packs_points() {
        let expr = parse("(pts (xy 0 0) (xy 1 1) (xy 2 2))").unwrap();
        assert_eq!(
            expr.to_pretty_string(),
            "(pts\n\t(xy 0 0) (xy 1 1) (xy 2 2)\n)"
        );
    }

    #[test]
    fn test_reparse_serialized() {
        let text = "(kicad_symbol_lib (version 20251024) (generator \"x y\") \
                    (symbol \"R\" (pin passive line (at 0 3.81 270) (length 1.27)) \
                    (pts (xy 0 0) (xy 1.5 -2))))";
        let first = parse(text).unwrap();
        let again = parse(&serialize(&first)).unwrap();
        assert_eq!(first, again);
    }
}
