// SPDX-License-Identifier: MIT OR Apache-2.0
//! KeyValues text parser.

use crate::{KeyValues, Value};
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_till, take_till1, take_until};
use nom::character::complete::{anychar, char, multispace1};
use nom::combinator::{map, recognize, value};
use nom::error::ErrorKind;
use nom::multi::{fold_many0, many0_count};
use nom::sequence::{pair, preceded, terminated};
use nom::IResult;

/// What went wrong while parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    /// A quoted string ran to the end of input
    #[error("Unterminated string")]
    UnterminatedString,

    /// A `[$...]` conditional ran to the end of input
    #[error("Unterminated conditional")]
    UnterminatedConditional,

    /// Input ended inside an open section
    #[error("Unexpected end of input, expected '}}'")]
    UnexpectedEof,

    /// A `}` with no matching `{`
    #[error("Unexpected '}}'")]
    UnexpectedClose,

    /// A `{` where a key was expected
    #[error("Unexpected '{{', expected a key")]
    UnexpectedOpen,

    /// A key with no value after it
    #[error("Missing value for key '{0}'")]
    MissingValue(String),

    /// Input the grammar has no rule for
    #[error("Unexpected input")]
    UnexpectedToken,
}

/// Parse failure with its location
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {kind}")]
pub struct ParseError {
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Failure reason
    pub kind: ParseErrorKind,
}

/// Parser-internal error: where it happened and, for hard failures, why
#[derive(Debug)]
struct SyntaxError<'a> {
    at: &'a str,
    kind: Option<ParseErrorKind>,
}

impl<'a> nom::error::ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self { at: input, kind: None }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, SyntaxError<'a>>;

fn failure<'a, T>(at: &'a str, kind: ParseErrorKind) -> PResult<'a, T> {
    Err(nom::Err::Failure(SyntaxError { at, kind: Some(kind) }))
}

/// `// ...` up to the end of the line
fn comment(input: &str) -> PResult<'_, &str> {
    recognize(pair(tag("//"), take_till(|c: char| c == '\n')))(input)
}

fn open_bracket(input: &str) -> PResult<'_, char> {
    char('[')(input)
}

fn conditional_body(input: &str) -> PResult<'_, &str> {
    terminated(take_until("]"), char(']'))(input)
}

/// `[$PLATFORM]` tags are accepted anywhere and ignored
fn conditional(input: &str) -> PResult<'_, ()> {
    let (rest, _) = open_bracket(input)?;
    match conditional_body(rest) {
        Ok((rest, _)) => Ok((rest, ())),
        Err(_) => failure(input, ParseErrorKind::UnterminatedConditional),
    }
}

/// Whitespace, comments and conditionals
fn trivia(input: &str) -> PResult<'_, ()> {
    value(
        (),
        many0_count(alt((value((), multispace1), value((), comment), conditional))),
    )(input)
}

enum Fragment<'a> {
    Literal(&'a str),
    Escaped(char),
    Unknown(char),
}

fn escape(input: &str) -> PResult<'_, Fragment<'_>> {
    map(preceded(char('\\'), anychar), |c| match c {
        'n' => Fragment::Escaped('\n'),
        't' => Fragment::Escaped('\t'),
        'r' => Fragment::Escaped('\r'),
        '\\' | '"' => Fragment::Escaped(c),
        other => Fragment::Unknown(other),
    })(input)
}

fn quoted_body(input: &str) -> PResult<'_, String> {
    fold_many0(
        alt((map(is_not("\"\\"), Fragment::Literal), escape)),
        String::new,
        |mut out, fragment| {
            match fragment {
                Fragment::Literal(text) => out.push_str(text),
                Fragment::Escaped(c) => out.push(c),
                Fragment::Unknown(c) => {
                    out.push('\\');
                    out.push(c);
                }
            }
            out
        },
    )(input)
}

fn quote(input: &str) -> PResult<'_, char> {
    char('"')(input)
}

/// `"..."` with `\n \t \r \\ \"` escapes; unknown escapes are kept verbatim
fn quoted(input: &str) -> PResult<'_, String> {
    let (rest, _) = quote(input)?;
    let (rest, body) = quoted_body(rest)?;
    match quote(rest) {
        Ok((rest, _)) => Ok((rest, body)),
        Err(_) => failure(input, ParseErrorKind::UnterminatedString),
    }
}

/// Unquoted token, ending at whitespace, a brace or a quote
fn bare(input: &str) -> PResult<'_, String> {
    map(
        take_till1(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | '"')),
        str::to_string,
    )(input)
}

fn text(input: &str) -> PResult<'_, String> {
    alt((quoted, bare))(input)
}

fn open_brace(input: &str) -> PResult<'_, char> {
    char('{')(input)
}

fn close_brace(input: &str) -> PResult<'_, char> {
    char('}')(input)
}

/// `key value` or `key { ... }`
fn entry(input: &str) -> PResult<'_, (String, Value)> {
    let (rest, key) = preceded(trivia, text)(input)?;
    let (rest, _) = trivia(rest)?;
    match alt((map(block, Value::Section), map(text, Value::String)))(rest) {
        Ok((rest, value)) => Ok((rest, (key, value))),
        Err(nom::Err::Error(_)) => failure(rest, ParseErrorKind::MissingValue(key)),
        Err(e) => Err(e),
    }
}

fn entries(input: &str) -> PResult<'_, KeyValues> {
    fold_many0(entry, KeyValues::new, |mut kv, (key, value)| {
        kv.push(key, value);
        kv
    })(input)
}

/// `{ entries }`
fn block(input: &str) -> PResult<'_, KeyValues> {
    let (rest, _) = open_brace(input)?;
    let (rest, kv) = entries(rest)?;
    let (rest, _) = trivia(rest)?;
    match close_brace(rest) {
        Ok((rest, _)) => Ok((rest, kv)),
        Err(_) if rest.is_empty() => failure(rest, ParseErrorKind::UnexpectedEof),
        Err(_) => failure(rest, ParseErrorKind::UnexpectedOpen),
    }
}

fn document(input: &str) -> PResult<'_, KeyValues> {
    let (rest, kv) = entries(input)?;
    let (rest, _) = trivia(rest)?;
    match rest.chars().next() {
        None => Ok((rest, kv)),
        Some('}') => failure(rest, ParseErrorKind::UnexpectedClose),
        Some(_) => failure(rest, ParseErrorKind::UnexpectedOpen),
    }
}

/// Turn the unparsed remainder into a 1-based line and column
fn locate(text: &str, remaining: &str, kind: ParseErrorKind) -> ParseError {
    let consumed = &text[..text.len() - remaining.len()];
    let line_start = consumed.rfind('\n').map_or(0, |i| i + 1);
    ParseError {
        line: consumed.matches('\n').count() + 1,
        column: consumed[line_start..].chars().count() + 1,
        kind,
    }
}

/// Parse KeyValues text into an ordered section.
///
/// Trailing `[$PLATFORM]` conditionals are accepted and ignored.
pub fn parse(text: &str) -> Result<KeyValues, ParseError> {
    match document(text) {
        Ok((_, kv)) => Ok(kv),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(locate(
            text,
            e.at,
            e.kind.unwrap_or(ParseErrorKind::UnexpectedToken),
        )),
        Err(nom::Err::Incomplete(_)) => Err(locate(text, "", ParseErrorKind::UnexpectedEof)),
    }
}
