//! SOQL syntax: lexer, AST and parser.
//!
//! ```
//! use soql::syntax;
//!
//! let query = syntax::parse("SELECT Id, Name FROM Account WHERE Name LIKE 'Acme%'").unwrap();
//! assert_eq!(query.from.name, "Account");
//! assert_eq!(query.select.len(), 2);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::*;
pub use span::{LineIndex, Position, Span};

use chumsky::error::{Rich, RichPattern, RichReason};
use chumsky::input::Input;
use chumsky::span::SimpleSpan;
use chumsky::Parser as _;

use crate::error::ParseError;
use lexer::Token;

/// Parse query text into an AST.
///
/// Returns the first syntax error with its 1-based line and column.
pub fn parse(source: &str) -> Result<Query, ParseError> {
    let index = LineIndex::new(source);

    // Step 1: Lexical analysis
    let tokens = lexer::lex(source).map_err(|errs| match errs.first() {
        Some(err) => {
            let got = match err.found() {
                Some(c) => format!("'{}'", c),
                None => "end of input".to_string(),
            };
            ParseError::new(index.position(err.span().start), "token", got)
        }
        None => ParseError::new(index.position(0), "token", "invalid input"),
    })?;

    if let Some(span) = parser::excess_nesting(&tokens) {
        return Err(ParseError::new(
            index.position(span.start),
            "less deeply nested expression",
            Token::LParen.to_string(),
        ));
    }

    // Step 2: Parsing
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens
        .as_slice()
        .map(eoi, |(tok, span): &(Token<'_>, SimpleSpan)| (tok, span));

    let (query, errs) = parser::parser(&index)
        .parse(token_stream)
        .into_output_errors();

    match errs.iter().min_by_key(|err| err.span().start) {
        Some(err) => Err(convert_error(&index, &tokens, err)),
        None => query.ok_or_else(|| ParseError::new(index.position(len), "query", "end of input")),
    }
}

/// Convert the parser's error into a positioned [`ParseError`].
///
/// Labelled alternatives become the `expected` text; validation failures
/// carry their own message. `got` is the token at the error position.
fn convert_error<'src>(
    index: &LineIndex<'_>,
    tokens: &[(Token<'src>, SimpleSpan)],
    err: &Rich<'_, Token<'src>, SimpleSpan>,
) -> ParseError {
    let start = err.span().start;
    let got = err
        .found()
        .or_else(|| {
            tokens
                .iter()
                .find(|(_, span)| span.start == start)
                .map(|(token, _)| token)
        })
        .map(ToString::to_string)
        .unwrap_or_else(|| "end of input".to_string());

    let expected = match err.reason() {
        RichReason::Custom(message) => message.clone(),
        _ => expected_list(err),
    };

    ParseError::new(index.position(start), expected, got)
}

/// Render expected patterns as `'(', field name or end of query`.
fn expected_list(err: &Rich<'_, Token<'_>, SimpleSpan>) -> String {
    let mut expected: Vec<String> = Vec::new();
    for pattern in err.expected() {
        let text = match pattern {
            RichPattern::Token(token) => format!("'{}'", &**token),
            RichPattern::Label(label) => label.to_string(),
            RichPattern::Identifier(ident) => ident.clone(),
            RichPattern::EndOfInput => "end of query".to_string(),
            _ => continue,
        };
        if !expected.contains(&text) {
            expected.push(text);
        }
    }
    match expected.split_last() {
        None => "something else".to_string(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} or {}", rest.join(", "), last),
    }
}

/// Parse query text, panicking on error. Intended for tests and fixtures.
pub fn must_parse(source: &str) -> Query {
    match parse(source) {
        Ok(query) => query,
        Err(err) => panic!("failed to parse {:?}: {}", source, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_error_has_position() {
        let err = parse("SELECT Name\nFROM Account WHERE Name = 'open").unwrap_err();
        assert_eq!(err.position.line, 2);
        assert_eq!(err.expected, "token");
    }

    #[test]
    fn test_unexpected_character() {
        let err = parse("SELECT Name FROM Account WHERE Id = #").unwrap_err();
        assert_eq!(err.position.line, 1);
        assert_eq!(err.position.column, 37);
    }

    #[test]
    fn test_expected_alternatives_are_listed() {
        let err = parse("SELECT Name FROM Account ORDER Name").unwrap_err();
        assert_eq!(err.expected, "BY");
        assert_eq!(err.got, "Name");
        assert_eq!(err.position.column, 32);

        let err = parse("SELECT Name FROM Account WHERE Name = 'x' )").unwrap_err();
        assert!(err.expected.contains(" or "), "{}", err.expected);
        assert!(err.expected.contains("end of query"), "{}", err.expected);
        assert_eq!(err.got, ")");
    }

    #[test]
    #[should_panic(expected = "failed to parse")]
    fn test_must_parse_panics() {
        must_parse("SELECT FROM");
    }
}
