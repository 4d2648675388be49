//! Parser for SOQL using chumsky.
//!
//! Transforms the token stream from the lexer into a [`Query`]. The grammar is
//! built from combinators over `(Token, SimpleSpan)` input; positions are
//! resolved to line and column through a [`LineIndex`] as nodes are built.
//!
//! Expression precedence, loosest first: OR, AND, NOT, comparison, IN, LIKE,
//! IS, additive, multiplicative, unary, primary.

use chrono::{DateTime, NaiveDate};
use chumsky::input::ValueInput;
use chumsky::prelude::*;

use super::ast::*;
use super::lexer::Token;
use super::span::LineIndex;
use crate::dates::{DateLiteral, DynamicDateKind, StaticDateLiteral};

/// Maximum nesting of parentheses, including subqueries and call arguments.
///
/// Every group recurses through the whole expression grammar, so the limit
/// is checked on the token stream before parsing starts.
pub const MAX_NESTING: usize = 16;

type Extra<'tokens, 'src> = extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>;

type Node<'tokens, 'src, I, O> = Boxed<'tokens, 'tokens, I, O, Extra<'tokens, 'src>>;

/// Span of the first `(` nested deeper than [`MAX_NESTING`].
pub fn excess_nesting(tokens: &[(Token<'_>, SimpleSpan)]) -> Option<SimpleSpan> {
    let mut depth = 0usize;
    for (token, span) in tokens {
        match token {
            Token::LParen => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Some(*span);
                }
            }
            Token::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Create the statement parser.
///
/// Accepts any `ValueInput` producing lexer tokens with `SimpleSpan` spans and
/// requires the whole input to be one query.
pub fn parser<'tokens, 'src: 'tokens, I>(
    index: &'tokens LineIndex<'src>,
) -> impl Parser<'tokens, I, Query, Extra<'tokens, 'src>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    query(index).then_ignore(end().labelled("end of query"))
}

// ==========================================================================
// Basic token parsers
// ==========================================================================

/// An identifier, plain or double-quoted.
fn name<'tokens, 'src: 'tokens, I>() -> impl Parser<'tokens, I, String, Extra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    select! {
        Token::Ident(s) => s.to_string(),
        Token::QuotedIdent(s) => s,
    }
}

/// A contextual keyword that lexes as an identifier (`BY`, `FIRST`, ...).
fn word<'tokens, 'src: 'tokens, I>(
    word: &'static str,
) -> impl Parser<'tokens, I, (), Extra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    select! {
        Token::Ident(s) if s.eq_ignore_ascii_case(word) => (),
    }
    .labelled(word)
}

/// An unsigned row count for LIMIT and OFFSET.
fn row_count<'tokens, 'src: 'tokens, I>(
    what: &'static str,
) -> impl Parser<'tokens, I, u64, Extra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    select! {
        Token::Integer(digits) => digits,
    }
    .labelled(what)
    .validate(move |digits, e, emitter| {
        digits.parse::<u64>().unwrap_or_else(|_| {
            emitter.emit(Rich::custom(e.span(), what));
            0
        })
    })
}

/// `Account.Owner.Name`, positioned at its first segment.
fn path<'tokens, 'src: 'tokens, I>(index: &'tokens LineIndex<'src>) -> Node<'tokens, 'src, I, FieldPath>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    name()
        .labelled("field name")
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<_>>()
        .map_with(move |segments, e| FieldPath::new(segments, index.position(SimpleSpan::start(&e.span()))))
        .boxed()
}

// ==========================================================================
// Statements
// ==========================================================================

fn query<'tokens, 'src: 'tokens, I>(index: &'tokens LineIndex<'src>) -> Node<'tokens, 'src, I, Query>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    recursive(|query| {
        let query = query.boxed();
        let expr = expression(index, query.clone());
        let additive = arithmetic(index, expr.clone());
        let (aggregate, function) = calls(index, expr.clone(), additive.clone());
        let path = path(index);
        let alias = name().labelled("alias").or_not();

        let path_list = path
            .clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>();

        // TYPEOF What WHEN Account THEN Name, Phone ... [ELSE Name] END
        let branch = just(Token::When)
            .to_span()
            .then(name().labelled("object name"))
            .then_ignore(just(Token::Then))
            .then(path_list.clone())
            .map(move |((span, object), fields): ((SimpleSpan, _), _)| TypeOfBranch {
                object,
                fields,
                position: index.position(span.start),
            });

        let type_of = just(Token::TypeOf)
            .to_span()
            .then(path.clone())
            .then(branch.repeated().at_least(1).collect::<Vec<_>>())
            .then(just(Token::Else).ignore_then(path_list).or_not())
            .then_ignore(just(Token::End))
            .map(move |(((span, path), branches), else_fields): (((SimpleSpan, _), _), _)| TypeOf {
                path,
                branches,
                else_fields: else_fields.unwrap_or_default(),
                position: index.position(span.start),
            });

        let select_item = choice((
            query
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(|query| SelectItem::Subquery(Box::new(query))),
            type_of.map(SelectItem::TypeOf),
            aggregate
                .then(alias.clone())
                .map(|(call, alias)| SelectItem::Aggregate { call, alias }),
            function
                .then(alias.clone())
                .map(|(call, alias)| SelectItem::Function { call, alias }),
            path.clone()
                .then(alias)
                .map(|(path, alias)| SelectItem::Field { path, alias }),
        ))
        .labelled("field, function or subquery");

        let from = name()
            .labelled("object name")
            .then(name().labelled("alias").or_not())
            .map_with(move |(name, alias), e| FromClause {
                name,
                alias,
                position: index.position(SimpleSpan::start(&e.span())),
            });

        let direction = choice((
            just(Token::Asc).to(SortDirection::Asc),
            just(Token::Desc).to(SortDirection::Desc),
        ))
        .or_not()
        .map(Option::unwrap_or_default);

        let nulls = just(Token::Nulls)
            .ignore_then(choice((
                word("FIRST").to(NullsOrder::First),
                word("LAST").to(NullsOrder::Last),
            )))
            .or_not();

        let order_item = additive
            .then(direction)
            .then(nulls)
            .map(|((expr, direction), nulls)| OrderItem {
                expr,
                direction,
                nulls,
            });

        let where_clause = just(Token::Where).ignore_then(expr.clone()).or_not();

        let security_enforced = just(Token::With)
            .ignore_then(word("SECURITY_ENFORCED"))
            .or_not()
            .map(|with| with.is_some());

        let group_by = just(Token::Group)
            .ignore_then(word("BY"))
            .ignore_then(
                path.separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .or_not()
            .map(Option::unwrap_or_default);

        let having = just(Token::Having).ignore_then(expr).or_not();

        let order_by = just(Token::Order)
            .ignore_then(word("BY"))
            .ignore_then(
                order_item
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .or_not()
            .map(Option::unwrap_or_default);

        let limit = just(Token::Limit).ignore_then(row_count("row count")).or_not();
        let offset = just(Token::Offset).ignore_then(row_count("row offset")).or_not();

        let for_update = just(Token::For)
            .ignore_then(word("UPDATE"))
            .or_not()
            .map(|lock| lock.is_some());

        just(Token::Select)
            .to_span()
            .then(
                select_item
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .then_ignore(just(Token::From))
            .then(from)
            .then(where_clause)
            .then(security_enforced)
            .then(group_by)
            .then(having)
            .then(order_by)
            .then(limit.then(offset))
            .then(for_update)
            .map(
                move |(
                    (
                        (
                            (
                                (((((span, select), from), where_clause), with_security_enforced), group_by),
                                having,
                            ),
                            order_by,
                        ),
                        (limit, offset),
                    ),
                    for_update,
                )| Query {
                    select,
                    from,
                    where_clause,
                    with_security_enforced,
                    group_by,
                    having,
                    order_by,
                    limit,
                    offset,
                    for_update,
                    position: index.position(SimpleSpan::start(&span)),
                },
            )
    })
    .boxed()
}

// ==========================================================================
// Expressions
// ==========================================================================

/// Boolean-level expressions: OR down to IS NULL.
fn expression<'tokens, 'src: 'tokens, I>(
    index: &'tokens LineIndex<'src>,
    query: Node<'tokens, 'src, I, Query>,
) -> Node<'tokens, 'src, I, Expr>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    recursive(|expr| {
        let additive = arithmetic(index, expr.boxed());

        let is_null = additive
            .clone()
            .then(
                just(Token::Is)
                    .ignore_then(just(Token::Not).or_not())
                    .then_ignore(just(Token::Null))
                    .or_not(),
            )
            .map(|(expr, test)| match test {
                Some(not) => Expr::IsNull {
                    expr: Box::new(expr),
                    negated: not.is_some(),
                },
                None => expr,
            });

        let like = is_null
            .clone()
            .then(
                just(Token::Not)
                    .or_not()
                    .then_ignore(just(Token::Like))
                    .then(is_null)
                    .or_not(),
            )
            .map(|(expr, like)| match like {
                Some((not, pattern)) => Expr::Like {
                    expr: Box::new(expr),
                    pattern: Box::new(pattern),
                    negated: not.is_some(),
                },
                None => expr,
            });

        let in_list = choice((
            query.map(|query| InList::Subquery(Box::new(query))),
            additive
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .map(InList::Values),
        ))
        .delimited_by(just(Token::LParen), just(Token::RParen));

        let membership = like
            .clone()
            .then(
                just(Token::Not)
                    .or_not()
                    .then_ignore(just(Token::In))
                    .then(in_list)
                    .or_not(),
            )
            .map(|(expr, list)| match list {
                Some((not, list)) => Expr::In {
                    expr: Box::new(expr),
                    list,
                    negated: not.is_some(),
                },
                None => expr,
            });

        let compare_op = select! {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Lte => CompareOp::Lte,
            Token::Gt => CompareOp::Gt,
            Token::Gte => CompareOp::Gte,
        };

        let comparison = membership
            .clone()
            .then(compare_op.then(membership).or_not())
            .map(|(left, right)| match right {
                Some((op, right)) => Expr::Compare {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                None => left,
            });

        let negation = just(Token::Not)
            .repeated()
            .foldr(comparison, |_, expr| Expr::Not(Box::new(expr)));

        let conjunction = negation.clone().foldl(
            just(Token::And).ignore_then(negation).repeated(),
            |left, right| Expr::And(Box::new(left), Box::new(right)),
        );

        conjunction
            .clone()
            .foldl(
                just(Token::Or).ignore_then(conjunction).repeated(),
                |left, right| Expr::Or(Box::new(left), Box::new(right)),
            )
            .labelled("expression")
    })
    .boxed()
}

/// A numeric token before sign folding.
enum Number<'src> {
    Integer(&'src str),
    Float(&'src str),
}

enum Operand<'src> {
    Number(Number<'src>, SimpleSpan),
    Expr(Expr),
}

/// Value-level expressions: additive down to primary.
fn arithmetic<'tokens, 'src: 'tokens, I>(
    index: &'tokens LineIndex<'src>,
    expr: Node<'tokens, 'src, I, Expr>,
) -> Node<'tokens, 'src, I, Expr>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    recursive(|additive| {
        let (aggregate, function) = calls(index, expr.clone(), additive.boxed());

        let literal = select! {
            Token::StringLit(s) => Literal::String(s),
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::Null => Literal::Null,
        }
        .map_with(move |literal, e| Expr::Literal(literal, index.position(SimpleSpan::start(&e.span()))));

        let date = select! {
            Token::DateLit(s) => s,
        }
        .validate(move |text, e, emitter| {
            let position = index.position(SimpleSpan::start(&e.span()));
            match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                Ok(date) => Expr::Date(DateValue::Date(date), position),
                Err(_) => {
                    emitter.emit(Rich::custom(e.span(), "valid date"));
                    Expr::Literal(Literal::Null, position)
                }
            }
        });

        let datetime = select! {
            Token::DateTimeLit(s) => s,
        }
        .validate(move |text, e, emitter| {
            let position = index.position(SimpleSpan::start(&e.span()));
            match DateTime::parse_from_rfc3339(text) {
                Ok(dt) => Expr::Date(DateValue::DateTime(dt), position),
                Err(_) => {
                    emitter.emit(Rich::custom(e.span(), "valid datetime"));
                    Expr::Literal(Literal::Null, position)
                }
            }
        });

        // A keyword followed by `.` is a relationship name, not a date.
        let static_date = chumsky::primitive::select(|token, _| match token {
            Token::Ident(s) => StaticDateLiteral::from_keyword(s),
            _ => None,
        })
        .then_ignore(just(Token::Dot).not())
        .map_with(move |literal, e| {
            Expr::Date(
                DateValue::Relative(DateLiteral::Static(literal)),
                index.position(SimpleSpan::start(&e.span())),
            )
        });

        let periods = select! {
            Token::Integer(digits) => digits,
        }
        .labelled("number of periods")
        .validate(|digits, e, emitter| {
            digits.parse::<u32>().unwrap_or_else(|_| {
                emitter.emit(Rich::custom(e.span(), "number of periods"));
                0
            })
        });

        let dynamic_date = chumsky::primitive::select(|token, _| match token {
            Token::Ident(s) => DynamicDateKind::from_keyword(s),
            _ => None,
        })
        .then_ignore(just(Token::Dot).not())
        .then(just(Token::Colon).ignore_then(periods).or_not())
        .validate(move |(kind, n), e, emitter| {
            let n = n.unwrap_or_else(|| {
                emitter.emit(Rich::custom(e.span(), format!("{}:n", kind.keyword())));
                0
            });
            Expr::Date(
                DateValue::Relative(DateLiteral::Dynamic { kind, n }),
                index.position(SimpleSpan::start(&e.span())),
            )
        });

        let primary = choice((
            expr.clone()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(|inner| Expr::Paren(Box::new(inner))),
            literal,
            date,
            datetime,
            aggregate.map(Expr::Aggregate),
            function.map(Expr::Function),
            static_date,
            dynamic_date,
            path(index).map(Expr::Field),
        ))
        .labelled("expression");

        let number = select! {
            Token::Integer(s) => Number::Integer(s),
            Token::Float(s) => Number::Float(s),
        };

        let operand = choice((
            number.map_with(|number, e| Operand::Number(number, e.span())),
            primary.map(Operand::Expr),
        ));

        // Negative numeric constants fold into the literal; other minus
        // signs become Negate nodes.
        let unary = just(Token::Minus)
            .to_span()
            .repeated()
            .collect::<Vec<_>>()
            .then(operand)
            .validate(move |(mut signs, operand), _, emitter| {
                let expr = match operand {
                    Operand::Expr(expr) => expr,
                    Operand::Number(number, span) => {
                        let sign = signs.pop();
                        let position = index.position(sign.unwrap_or(span).start);
                        let literal = match number {
                            Number::Integer(digits) => {
                                let text = match sign {
                                    Some(_) => format!("-{}", digits),
                                    None => digits.to_string(),
                                };
                                text.parse::<i64>().map(Literal::Integer).unwrap_or_else(|_| {
                                    emitter.emit(Rich::custom(span, "integer"));
                                    Literal::Integer(0)
                                })
                            }
                            Number::Float(digits) => match digits.parse::<f64>() {
                                Ok(value) if sign.is_some() => Literal::Float(-value),
                                Ok(value) => Literal::Float(value),
                                Err(_) => {
                                    emitter.emit(Rich::custom(span, "number"));
                                    Literal::Float(0.0)
                                }
                            },
                        };
                        Expr::Literal(literal, position)
                    }
                };
                signs
                    .into_iter()
                    .fold(expr, |expr, _| Expr::Negate(Box::new(expr)))
            });

        let product = unary.clone().foldl(
            select! {
                Token::Star => ArithmeticOp::Mul,
                Token::Slash => ArithmeticOp::Div,
                Token::Percent => ArithmeticOp::Mod,
            }
            .then(unary)
            .repeated(),
            |left, (op, right)| Expr::Arithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        );

        product
            .clone()
            .foldl(
                select! {
                    Token::Plus => ArithmeticOp::Add,
                    Token::Minus => ArithmeticOp::Sub,
                    Token::Concat => ArithmeticOp::Concat,
                }
                .then(product)
                .repeated(),
                |left, (op, right)| Expr::Arithmetic {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            )
            .labelled("expression")
    })
    .boxed()
}

enum AggregateArg {
    Star(SimpleSpan),
    Expr(Expr),
}

/// Aggregate and scalar function calls, told apart by name.
fn calls<'tokens, 'src: 'tokens, I>(
    index: &'tokens LineIndex<'src>,
    expr: Node<'tokens, 'src, I, Expr>,
    additive: Node<'tokens, 'src, I, Expr>,
) -> (
    Node<'tokens, 'src, I, AggregateCall>,
    Node<'tokens, 'src, I, FunctionCall>,
)
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    let aggregate = chumsky::primitive::select(|token, _| match token {
        Token::Ident(name) => AggregateFunction::from_name(name),
        _ => None,
    })
    .map_with(move |function, e| (function, index.position(SimpleSpan::start(&e.span()))))
    .then(
        choice((
            just(Token::Star).to_span().map(AggregateArg::Star),
            additive.map(AggregateArg::Expr),
        ))
        .or_not()
        .delimited_by(just(Token::LParen), just(Token::RParen)),
    )
    .validate(|((function, position), arg), _, emitter| {
        let arg = match arg {
            Some(AggregateArg::Expr(expr)) => Some(Box::new(expr)),
            Some(AggregateArg::Star(span)) => {
                if function != AggregateFunction::Count {
                    emitter.emit(Rich::custom(span, "expression"));
                }
                None
            }
            None => None,
        };
        AggregateCall {
            function,
            arg,
            distinct: function == AggregateFunction::CountDistinct,
            position,
        }
    });

    let function = select! {
        Token::Ident(name) if AggregateFunction::from_name(name).is_none() => name,
    }
    .map_with(move |name, e| (name.to_ascii_uppercase(), index.position(SimpleSpan::start(&e.span()))))
    .then(
        expr.separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen)),
    )
    .map(|((name, position), args)| FunctionCall {
        name,
        args,
        position,
    });

    (aggregate.boxed(), function.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::syntax::parse;

    fn parse_str(input: &str) -> Query {
        parse(input).expect("parsing should succeed")
    }

    fn parse_err(input: &str) -> ParseError {
        parse(input).expect_err("parsing should fail")
    }

    fn where_of(input: &str) -> Expr {
        parse_str(input).where_clause.expect("expected WHERE clause")
    }

    #[test]
    fn test_parse_simple_select() {
        let q = parse_str("SELECT Id, Name FROM Account");
        assert_eq!(q.select.len(), 2);
        assert_eq!(q.from.name, "Account");
        assert!(q.from.alias.is_none());
        assert!(q.where_clause.is_none());
        assert_eq!(q.position.column, 1);
    }

    #[test]
    fn test_parse_from_alias() {
        let q = parse_str("SELECT a.Name FROM Account a");
        assert_eq!(q.from.alias.as_deref(), Some("a"));
        assert_eq!(q.from.position.column, 20);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = where_of("SELECT Id FROM Account WHERE A = 1 OR B = 2 AND C = 3");
        match expr {
            Expr::Or(left, right) => {
                assert!(matches!(*left, Expr::Compare { .. }));
                assert!(matches!(*right, Expr::And(..)));
            }
            other => panic!("expected OR at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let expr = where_of("SELECT Id FROM Account WHERE NOT Name = 'x'");
        match expr {
            Expr::Not(inner) => assert!(matches!(*inner, Expr::Compare { .. })),
            other => panic!("expected NOT, got {:?}", other),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        let expr = where_of("SELECT Id FROM Account WHERE A + B * C > 10");
        let Expr::Compare { left, .. } = expr else {
            panic!("expected comparison");
        };
        match *left {
            Expr::Arithmetic {
                op: ArithmeticOp::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::Arithmetic {
                    op: ArithmeticOp::Mul,
                    ..
                }
            )),
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_in_and_not_in() {
        let expr = where_of("SELECT Id FROM Account WHERE Industry NOT IN ('A', 'B')");
        match expr {
            Expr::In {
                negated: true,
                list: InList::Values(values),
                ..
            } => assert_eq!(values.len(), 2),
            other => panic!("expected NOT IN, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_in_subquery() {
        let expr = where_of("SELECT Id FROM Account WHERE Id IN (SELECT AccountId FROM Contact)");
        match expr {
            Expr::In {
                list: InList::Subquery(q),
                ..
            } => assert_eq!(q.from.name, "Contact"),
            other => panic!("expected IN subquery, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_like_and_is_null() {
        let expr =
            where_of("SELECT Id FROM Account WHERE Name NOT LIKE 'Acme%' AND Phone IS NOT NULL");
        let Expr::And(left, right) = expr else {
            panic!("expected AND");
        };
        assert!(matches!(*left, Expr::Like { negated: true, .. }));
        assert!(matches!(*right, Expr::IsNull { negated: true, .. }));
    }

    #[test]
    fn test_parse_date_literals() {
        let expr = where_of("SELECT Id FROM Account WHERE CreatedDate = LAST_N_DAYS:30");
        let Expr::Compare { right, .. } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(
            *right,
            Expr::Date(
                DateValue::Relative(DateLiteral::Dynamic {
                    kind: DynamicDateKind::LastNDays,
                    n: 30
                }),
                _
            )
        ));

        let expr = where_of("SELECT Id FROM Account WHERE CreatedDate > 2024-01-01T00:00:00Z");
        let Expr::Compare { right, .. } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*right, Expr::Date(DateValue::DateTime(_), _)));
    }

    #[test]
    fn test_date_keyword_before_dot_is_a_path() {
        let expr = where_of("SELECT Id FROM Account WHERE Today.Name = 'x'");
        let Expr::Compare { left, .. } = expr else {
            panic!("expected comparison");
        };
        match *left {
            Expr::Field(path) => assert_eq!(path.dotted(), "Today.Name"),
            other => panic!("expected field path, got {:?}", other),
        }

        let expr = where_of("SELECT Id FROM Account WHERE CloseDate = TODAY");
        let Expr::Compare { right, .. } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(
            *right,
            Expr::Date(DateValue::Relative(DateLiteral::Static(_)), _)
        ));
    }

    #[test]
    fn test_parse_aggregates_and_group_by() {
        let q = parse_str(
            "SELECT Industry, COUNT(Id) cnt, COUNT() FROM Account GROUP BY Industry HAVING COUNT(Id) > 5",
        );
        assert_eq!(q.group_by.len(), 1);
        assert!(q.having.is_some());
        match &q.select[1] {
            SelectItem::Aggregate { call, alias } => {
                assert_eq!(call.function, AggregateFunction::Count);
                assert_eq!(alias.as_deref(), Some("cnt"));
            }
            other => panic!("expected aggregate, got {:?}", other),
        }
        match &q.select[2] {
            SelectItem::Aggregate { call, .. } => assert!(call.arg.is_none()),
            other => panic!("expected COUNT(), got {:?}", other),
        }
    }

    #[test]
    fn test_parse_scalar_function() {
        let q = parse_str("SELECT upper(Name) n, COUNT(*) FROM Account");
        match &q.select[0] {
            SelectItem::Function { call, alias } => {
                assert_eq!(call.name, "UPPER");
                assert_eq!(call.args.len(), 1);
                assert_eq!(alias.as_deref(), Some("n"));
            }
            other => panic!("expected function, got {:?}", other),
        }
        assert!(matches!(
            &q.select[1],
            SelectItem::Aggregate { call, .. } if call.arg.is_none()
        ));
    }

    #[test]
    fn test_parse_relationship_subquery() {
        let q = parse_str("SELECT Name, (SELECT LastName FROM Contacts LIMIT 5) FROM Account");
        match &q.select[1] {
            SelectItem::Subquery(sub) => {
                assert_eq!(sub.from.name, "Contacts");
                assert_eq!(sub.limit, Some(5));
            }
            other => panic!("expected subquery, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_typeof() {
        let q = parse_str(
            "SELECT TYPEOF What WHEN Account THEN Name, Phone WHEN Opportunity THEN Amount ELSE Name END FROM Task",
        );
        match &q.select[0] {
            SelectItem::TypeOf(t) => {
                assert_eq!(t.path.dotted(), "What");
                assert_eq!(t.branches.len(), 2);
                assert_eq!(t.branches[0].fields.len(), 2);
                assert_eq!(t.branches[1].position.column, 50);
                assert_eq!(t.else_fields.len(), 1);
            }
            other => panic!("expected TYPEOF, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trailing_clauses() {
        let q = parse_str(
            "SELECT Name FROM Account WHERE Name != null WITH SECURITY_ENFORCED \
             ORDER BY Name DESC NULLS LAST, Id LIMIT 10 OFFSET 20 FOR UPDATE",
        );
        assert!(q.with_security_enforced);
        assert_eq!(q.order_by.len(), 2);
        assert_eq!(q.order_by[0].direction, SortDirection::Desc);
        assert_eq!(q.order_by[0].nulls, Some(NullsOrder::Last));
        assert_eq!(q.order_by[1].direction, SortDirection::Asc);
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, Some(20));
        assert!(q.for_update);
    }

    #[test]
    fn test_negative_literal_folds() {
        let expr = where_of("SELECT Id FROM Account WHERE Amount > -5");
        let Expr::Compare { right, .. } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*right, Expr::Literal(Literal::Integer(-5), _)));

        let expr = where_of("SELECT Id FROM Account WHERE Amount > -9223372036854775808");
        let Expr::Compare { right, .. } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*right, Expr::Literal(Literal::Integer(i64::MIN), _)));
    }

    #[test]
    fn test_double_minus_keeps_negation() {
        let expr = where_of("SELECT Id FROM Account WHERE Amount > - -5");
        let Expr::Compare { right, .. } = expr else {
            panic!("expected comparison");
        };
        match *right {
            Expr::Negate(inner) => match *inner {
                Expr::Literal(Literal::Integer(-5), position) => assert_eq!(position.column, 41),
                other => panic!("expected folded literal, got {:?}", other),
            },
            other => panic!("expected negation, got {:?}", other),
        }
    }

    #[test]
    fn test_error_missing_from() {
        let err = parse_err("SELECT Name WHERE Id = 1");
        assert!(err.expected.contains("'FROM'"), "{}", err.expected);
        assert_eq!(err.got, "WHERE");
        assert_eq!(err.position.line, 1);
        assert_eq!(err.position.column, 13);
    }

    #[test]
    fn test_error_trailing_tokens() {
        let err = parse_err("SELECT Name FROM Account LIMIT 5 5");
        assert!(err.expected.contains("end of query"), "{}", err.expected);
        assert_eq!(err.got, "5");
        assert_eq!(err.position.column, 34);
    }

    #[test]
    fn test_error_position_on_second_line() {
        let err = parse_err("SELECT Name\nFROM Account\nWHERE");
        assert_eq!(err.position.line, 3);
        assert_eq!(err.position.column, 6);
        assert_eq!(err.expected, "expression");
        assert_eq!(err.got, "end of input");
    }

    #[test]
    fn test_error_empty_select_list() {
        let err = parse_err("SELECT FROM Account");
        assert_eq!(err.expected, "field, function or subquery");
        assert_eq!(err.got, "FROM");
    }

    #[test]
    fn test_integer_overflow_is_reported_at_the_literal() {
        let err = parse_err("SELECT Id FROM Account WHERE Amount > 99999999999999999999");
        assert_eq!(err.expected, "integer");
        assert_eq!(err.got, "99999999999999999999");
        assert_eq!(err.position.column, 39);
    }

    #[test]
    fn test_dynamic_date_needs_period_count() {
        let err = parse_err("SELECT Id FROM Account WHERE CloseDate = LAST_N_DAYS");
        assert_eq!(err.expected, "LAST_N_DAYS:n");
        assert_eq!(err.position.column, 42);
    }

    #[test]
    fn test_star_only_in_count() {
        let err = parse_err("SELECT SUM(*) FROM Opportunity");
        assert_eq!(err.expected, "expression");
        assert_eq!(err.got, "*");
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let input = format!(
            "SELECT Id FROM Account WHERE {}1{}",
            "(".repeat(500),
            ")".repeat(500)
        );
        let err = parse_err(&input);
        assert_eq!(err.expected, "less deeply nested expression");
        assert_eq!(err.position.column, 30 + MAX_NESTING);

        let input = format!(
            "SELECT Id FROM Account WHERE {}1{} = 1",
            "(".repeat(MAX_NESTING),
            ")".repeat(MAX_NESTING)
        );
        assert!(parse(&input).is_ok());
    }
}
