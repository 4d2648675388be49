//! Lexer for SOQL.
//!
//! Converts query text into a sequence of tokens with span information.
//! Keywords are matched case-insensitively; identifiers keep their spelling.

use chumsky::prelude::*;

/// A token in a SOQL query.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // ========================================================================
    // Reserved Keywords
    // ========================================================================
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    In,
    Like,
    Is,
    Null,
    True,
    False,
    Group,
    Having,
    Order,
    Asc,
    Desc,
    Nulls,
    Limit,
    Offset,
    With,
    For,
    TypeOf,
    When,
    Then,
    Else,
    End,

    // ========================================================================
    // Literals
    // ========================================================================
    /// An identifier (not a keyword).
    Ident(&'src str),
    /// A double-quoted identifier with `""` unescaped.
    QuotedIdent(String),
    /// A single-quoted string with escapes resolved.
    StringLit(String),
    Integer(&'src str),
    Float(&'src str),
    /// `YYYY-MM-DD`
    DateLit(&'src str),
    /// `YYYY-MM-DDThh:mm:ss[.fff](Z|+hh:mm)`
    DateTimeLit(&'src str),

    // ========================================================================
    // Symbols
    // ========================================================================
    LParen,
    RParen,
    Comma,
    Dot,
    Colon,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Select => write!(f, "SELECT"),
            Token::From => write!(f, "FROM"),
            Token::Where => write!(f, "WHERE"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::In => write!(f, "IN"),
            Token::Like => write!(f, "LIKE"),
            Token::Is => write!(f, "IS"),
            Token::Null => write!(f, "NULL"),
            Token::True => write!(f, "TRUE"),
            Token::False => write!(f, "FALSE"),
            Token::Group => write!(f, "GROUP"),
            Token::Having => write!(f, "HAVING"),
            Token::Order => write!(f, "ORDER"),
            Token::Asc => write!(f, "ASC"),
            Token::Desc => write!(f, "DESC"),
            Token::Nulls => write!(f, "NULLS"),
            Token::Limit => write!(f, "LIMIT"),
            Token::Offset => write!(f, "OFFSET"),
            Token::With => write!(f, "WITH"),
            Token::For => write!(f, "FOR"),
            Token::TypeOf => write!(f, "TYPEOF"),
            Token::When => write!(f, "WHEN"),
            Token::Then => write!(f, "THEN"),
            Token::Else => write!(f, "ELSE"),
            Token::End => write!(f, "END"),

            Token::Ident(s) => write!(f, "{}", s),
            Token::QuotedIdent(s) => write!(f, "\"{}\"", s),
            Token::StringLit(s) => write!(f, "'{}'", s),
            Token::Integer(s) | Token::Float(s) => write!(f, "{}", s),
            Token::DateLit(s) | Token::DateTimeLit(s) => write!(f, "{}", s),

            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Eq => write!(f, "="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Lte => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Gte => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Concat => write!(f, "||"),
        }
    }
}

/// Map an identifier string to a keyword token or return Ident.
fn keyword_or_ident(s: &str) -> Token<'_> {
    match s.to_ascii_uppercase().as_str() {
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "IN" => Token::In,
        "LIKE" => Token::Like,
        "IS" => Token::Is,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "GROUP" => Token::Group,
        "HAVING" => Token::Having,
        "ORDER" => Token::Order,
        "ASC" => Token::Asc,
        "DESC" => Token::Desc,
        "NULLS" => Token::Nulls,
        "LIMIT" => Token::Limit,
        "OFFSET" => Token::Offset,
        "WITH" => Token::With,
        "FOR" => Token::For,
        "TYPEOF" => Token::TypeOf,
        "WHEN" => Token::When,
        "THEN" => Token::Then,
        "ELSE" => Token::Else,
        "END" => Token::End,
        // Not a keyword - return as identifier
        _ => Token::Ident(s),
    }
}

/// Exactly `n` ASCII digits.
fn digits_n<'src>(n: usize) -> impl Parser<'src, &'src str, (), extra::Err<Rich<'src, char>>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .exactly(n)
}

/// Create a lexer for SOQL.
///
/// Returns a parser that tokenizes the input string into a sequence of
/// tokens with span information, skipping whitespace.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    // Identifiers: start with letter or underscore, followed by alphanumeric or underscore
    let ident = text::ident().map(keyword_or_ident);

    // Double-quoted identifiers: "..." with "" as an escaped quote
    let quoted_ident = just('"')
        .ignore_then(
            choice((just("\"\"").to('"'), none_of('"')))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'))
        .map(Token::QuotedIdent);

    // String literals: '...' with '' or backslash escapes
    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('\''),
        just('"'),
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
    )));
    let string_lit = just('\'')
        .ignore_then(
            choice((just("''").to('\''), escape, none_of("\\'")))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('\''))
        .map(Token::StringLit);

    // Dates and datetimes: 2024-03-15, 2024-03-15T10:30:00Z, 2024-03-15T10:30:00.000+02:00
    let zone = choice((
        just('Z').ignored(),
        one_of("+-")
            .then(digits_n(2))
            .then(just(':'))
            .then(digits_n(2))
            .ignored(),
    ));
    let time = just('T')
        .then(digits_n(2))
        .then(just(':'))
        .then(digits_n(2))
        .then(just(':'))
        .then(digits_n(2))
        .then(just('.').then(text::digits(10)).or_not())
        .then(zone)
        .ignored();
    let date = digits_n(4)
        .then(just('-'))
        .then(digits_n(2))
        .then(just('-'))
        .then(digits_n(2))
        .then(time.or_not())
        .to_slice()
        .map(|s: &str| {
            if s.contains('T') {
                Token::DateTimeLit(s)
            } else {
                Token::DateLit(s)
            }
        });

    // Numbers: integers and decimals
    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(|s: &str| {
            if s.contains('.') {
                Token::Float(s)
            } else {
                Token::Integer(s)
            }
        });

    // Symbols (multi-char first, then single-char)
    let symbol = choice((
        just("!=").to(Token::Ne),
        just("<>").to(Token::Ne),
        just("<=").to(Token::Lte),
        just(">=").to(Token::Gte),
        just("||").to(Token::Concat),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just('=').to(Token::Eq),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    // A single token with span
    let token = choice((ident, quoted_ident, string_lit, date, number, symbol))
        .map_with(|tok, e| (tok, e.span()));

    token
        .padded()
        .repeated()
        .collect()
        .padded()
        .then_ignore(end())
}

/// Lex a source string into tokens.
///
/// Returns Ok with the token list on success, or Err with the lexer errors.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}
