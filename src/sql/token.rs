//! SQL tokens, the atomic units of compiled output.
//!
//! The compiler never concatenates strings directly. It pushes tokens onto a
//! [`TokenStream`], which serializes them with PostgreSQL quoting rules.
//! Values never appear in the output; they are bound through [`Token::Param`].

use std::fmt::Write;

/// Every element of a compiled statement.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    LeftJoin,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    NullsFirst,
    NullsLast,
    Limit,
    Offset,
    ForUpdate,
    In,
    Like,
    IsNull,
    IsNotNull,
    Distinct,
    Null,

    // === Punctuation ===
    Comma,
    Star,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,

    // === Whitespace ===
    Space,

    // === Dynamic Content ===
    /// Quoted identifier (column, alias)
    Ident(String),
    /// Table reference: `"schema"."table"` or `"table"`
    Table {
        schema: Option<String>,
        name: String,
    },
    /// `"alias"."column"`
    Column {
        table: String,
        name: String,
    },
    /// Bind placeholder, 0-based; rendered as `$index+1`.
    Param(usize),
    /// Row count for LIMIT and OFFSET
    LitInt(u64),
    /// Function name, rendered upper-cased
    FunctionName(String),

    // === Escape Hatch ===
    /// SQL passed directly to output without escaping.
    ///
    /// Only for static fragments such as `'[]'::json`. Never pass query
    /// text through this variant.
    Raw(&'static str),
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl Token {
    /// Append this token's SQL to `out`.
    pub fn write_to(&self, out: &mut String) {
        let keyword = match self {
            Token::Select => "SELECT",
            Token::From => "FROM",
            Token::Where => "WHERE",
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
            Token::As => "AS",
            Token::On => "ON",
            Token::LeftJoin => "LEFT JOIN",
            Token::GroupBy => "GROUP BY",
            Token::Having => "HAVING",
            Token::OrderBy => "ORDER BY",
            Token::Asc => "ASC",
            Token::Desc => "DESC",
            Token::NullsFirst => "NULLS FIRST",
            Token::NullsLast => "NULLS LAST",
            Token::Limit => "LIMIT",
            Token::Offset => "OFFSET",
            Token::ForUpdate => "FOR UPDATE",
            Token::In => "IN",
            Token::Like => "LIKE",
            Token::IsNull => "IS NULL",
            Token::IsNotNull => "IS NOT NULL",
            Token::Distinct => "DISTINCT",
            Token::Null => "NULL",

            Token::Comma => ",",
            Token::Star => "*",
            Token::LParen => "(",
            Token::RParen => ")",

            Token::Eq => "=",
            Token::Ne => "<>",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Mul => "*",
            Token::Div => "/",
            Token::Mod => "%",
            Token::Concat => "||",

            Token::Space => " ",
            Token::Raw(s) => *s,

            Token::Ident(name) => {
                out.push_str(&quote_ident(name));
                return;
            }
            Token::Table { schema, name } => {
                if let Some(schema) = schema {
                    out.push_str(&quote_ident(schema));
                    out.push('.');
                }
                out.push_str(&quote_ident(name));
                return;
            }
            Token::Column { table, name } => {
                out.push_str(&quote_ident(table));
                out.push('.');
                out.push_str(&quote_ident(name));
                return;
            }
            Token::Param(index) => {
                let _ = write!(out, "${}", index + 1);
                return;
            }
            Token::LitInt(n) => {
                let _ = write!(out, "{}", n);
                return;
            }
            Token::FunctionName(name) => {
                out.push_str(&name.to_uppercase());
                return;
            }
        };
        out.push_str(keyword);
    }

    /// Serialize this token to a string.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens);
        self
    }

    pub fn first(&self) -> Option<&Token> {
        self.tokens.first()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of bind placeholders in the stream.
    pub fn param_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, Token::Param(_)))
            .count()
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            token.write_to(&mut out);
        }
        out
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
    /// Push ` <keyword> ` surrounded by spaces.
    pub fn keyword(&mut self, token: Token) -> &mut Self {
        self.space().push(token).space()
    }
    pub fn ident(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Token::Ident(name.into()))
    }
    pub fn column(&mut self, table: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.push(Token::Column {
            table: table.into(),
            name: name.into(),
        })
    }
    pub fn param(&mut self, index: usize) -> &mut Self {
        self.push(Token::Param(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_serialize() {
        assert_eq!(Token::Select.serialize(), "SELECT");
        assert_eq!(Token::GroupBy.serialize(), "GROUP BY");
        assert_eq!(Token::Ne.serialize(), "<>");
    }

    #[test]
    fn test_ident_quoting() {
        assert_eq!(Token::Ident("users".into()).serialize(), "\"users\"");
        assert_eq!(Token::Ident("we\"ird".into()).serialize(), "\"we\"\"ird\"");
    }

    #[test]
    fn test_table_and_column() {
        let tok = Token::Table {
            schema: Some("crm".into()),
            name: "accounts".into(),
        };
        assert_eq!(tok.serialize(), "\"crm\".\"accounts\"");
        assert_eq!(
            Token::Column {
                table: "t0".into(),
                name: "name".into()
            }
            .serialize(),
            "\"t0\".\"name\""
        );
    }

    #[test]
    fn test_params_are_one_based() {
        assert_eq!(Token::Param(0).serialize(), "$1");
        assert_eq!(Token::Param(11).serialize(), "$12");
    }

    #[test]
    fn test_token_stream() {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .column("t0", "name")
            .keyword(Token::From)
            .push(Token::Table {
                schema: None,
                name: "accounts".into(),
            })
            .space()
            .ident("t0")
            .keyword(Token::Where)
            .column("t0", "id")
            .space()
            .push(Token::Eq)
            .space()
            .param(0);

        assert_eq!(
            ts.serialize(),
            "SELECT \"t0\".\"name\" FROM \"accounts\" \"t0\" WHERE \"t0\".\"id\" = $1"
        );
        assert_eq!(ts.param_count(), 1);
    }
}
