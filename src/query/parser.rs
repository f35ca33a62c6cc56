//! Recursive-descent parser for filter expressions.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! query   := SELECT columns FROM ident '(' [arg (',' arg)*] ')' [WHERE expr] [LIMIT int]
//! columns := '*' | path [AS ident] (',' path [AS ident])*
//! arg     := ident '=' literal
//! expr    := and (OR and)*
//! and     := not (AND not)*
//! not     := NOT not | cmp
//! cmp     := operand [op operand]
//! operand := literal | path | '(' expr ')'
//! ```

use crate::error::ParseError;
use crate::value::Value;

use super::ast::{Column, Columns, CompareOp, Expr, Query, SourceCall};
use super::lexer::{is_reserved, tokenize, Spanned, Token};

/// Parses query text into a [`Query`].
pub fn parse(input: &str) -> Result<Query, ParseError> {
    parse_with_source_pos(input).map(|(query, _)| query)
}

/// Like [`parse`], also returning the byte offset of the source plugin name.
pub(crate) fn parse_with_source_pos(input: &str) -> Result<(Query, usize), ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        source_pos: 0,
    };
    let query = parser.query()?;
    parser.expect_eof()?;
    Ok((query, parser.source_pos))
}

struct Parser {
    tokens: Vec<Spanned>,
    idx: usize,
    source_pos: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        // The token list always ends with Eof, and `advance` never moves past it.
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let tok = self.peek().clone();
        if tok.token != Token::Eof {
            self.idx += 1;
        }
        tok
    }

    fn error_here(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError::new(tok.pos, format!("expected {expected}, found {}", tok.token.describe()))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if &self.peek().token == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error_here(&token.describe()))
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().token.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error_here(kw))
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.peek().token == Token::Eof {
            Ok(())
        } else {
            Err(self.error_here("end of input"))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match &self.peek().token {
            Token::Ident(name) if !is_reserved(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("identifier")),
        }
    }

    fn path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut segments = vec![self.ident()?];
        while self.eat(&Token::Dot) {
            segments.push(self.ident()?);
        }
        Ok(segments)
    }

    fn query(&mut self) -> Result<Query, ParseError> {
        self.expect_keyword("SELECT")?;
        let columns = self.columns()?;
        self.expect_keyword("FROM")?;
        let source = self.source()?;

        let filter = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            let pos = self.peek().pos;
            match self.advance().token {
                Token::Int(n) if n >= 0 => Some(n.unsigned_abs()),
                _ => return Err(ParseError::new(pos, "expected non-negative integer after LIMIT")),
            }
        } else {
            None
        };

        Ok(Query {
            columns,
            source,
            filter,
            limit,
        })
    }

    fn columns(&mut self) -> Result<Columns, ParseError> {
        if self.eat(&Token::Star) {
            return Ok(Columns::All);
        }
        let mut cols = Vec::new();
        loop {
            let path = self.path()?;
            let alias = if self.eat_keyword("AS") {
                Some(self.ident()?)
            } else {
                None
            };
            cols.push(Column { path, alias });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Columns::Named(cols))
    }

    fn source(&mut self) -> Result<SourceCall, ParseError> {
        self.source_pos = self.peek().pos;
        let plugin = self.ident()?;
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let pos = self.peek().pos;
                let name = self.ident()?;
                if args.iter().any(|(k, _): &(String, Value)| *k == name) {
                    return Err(ParseError::new(pos, format!("duplicate argument '{name}'")));
                }
                self.expect(&Token::Eq)?;
                let value = self.literal()?;
                args.push((name, value));
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        Ok(SourceCall { plugin, args })
    }

    fn literal(&mut self) -> Result<Value, ParseError> {
        let value = match &self.peek().token {
            Token::Str(s) => Value::String(s.clone()),
            Token::Int(n) => Value::Int(*n),
            Token::Float(x) => Value::Float(*x),
            t if t.is_keyword("TRUE") => Value::Bool(true),
            t if t.is_keyword("FALSE") => Value::Bool(false),
            t if t.is_keyword("NULL") => Value::Null,
            _ => return Err(self.error_here("literal")),
        };
        self.advance();
        Ok(value)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("OR") {
            let rhs = self.and_expr()?;
            lhs = lhs.or(rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.not_expr()?;
        while self.eat_keyword("AND") {
            let rhs = self.not_expr()?;
            lhs = lhs.and(rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("NOT") {
            return Ok(self.not_expr()?.not());
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.operand()?;
        let op = match self.peek().token {
            Token::Eq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::RegexMatch => CompareOp::RegexMatch,
            Token::Lt => CompareOp::Lt,
            Token::LtEq => CompareOp::LtEq,
            Token::Gt => CompareOp::Gt,
            Token::GtEq => CompareOp::GtEq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.operand()?;
        Ok(Expr::compare(op, lhs, rhs))
    }

    fn operand(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::LParen) {
            let inner = self.expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        let is_literal = match &self.peek().token {
            Token::Str(_) | Token::Int(_) | Token::Float(_) => true,
            t => t.is_keyword("TRUE") || t.is_keyword("FALSE") || t.is_keyword("NULL"),
        };
        if is_literal {
            return Ok(Expr::Literal(self.literal()?));
        }
        if matches!(self.peek().token, Token::Ident(_)) {
            return Ok(Expr::Path(self.path()?));
        }
        Err(self.error_here("expression"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FLOW_COMPLETION_QUERY;

    #[test]
    fn parses_flow_completion_query() {
        let q = parse(FLOW_COMPLETION_QUERY).unwrap();
        assert_eq!(q.columns, Columns::All);
        assert_eq!(q.source.plugin, "watch_monitoring");
        assert_eq!(q.source.arg("artifact"), Some(&Value::from("System.Flow.Completion")));
        assert_eq!(
            q.filter,
            Some(Expr::regex_match(
                Expr::path("Flow.artifacts_with_results"),
                Expr::var("artifact_name"),
            ))
        );
        assert!(q.limit.is_none());
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let q = parse("select * from info() where a = 1 limit 3").unwrap();
        assert_eq!(q.limit, Some(3));
        assert!(q.filter.is_some());
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let q = parse("SELECT * FROM s() WHERE a = 1 OR b = 2 AND c = 3").unwrap();
        let Some(Expr::Or(_, rhs)) = q.filter else {
            panic!("expected OR at the root");
        };
        assert!(matches!(*rhs, Expr::And(..)));
    }

    #[test]
    fn parses_named_columns_with_alias() {
        let q = parse("SELECT FlowId, Flow.state AS State FROM s()").unwrap();
        let Columns::Named(cols) = q.columns else {
            panic!("expected named columns");
        };
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].path, vec!["Flow".to_string(), "state".to_string()]);
        assert_eq!(cols[1].output_name(), "State");
    }

    #[test]
    fn rendered_query_reparses_equal() {
        let text = "SELECT a.b AS x FROM src(n=1, f=2.5, s='q\\'t', t=TRUE, z=NULL) \
                    WHERE NOT (a = 1 OR b != 'x') AND c =~ 'r.*' AND d >= -3 LIMIT 10";
        let q = parse(text).unwrap();
        let again = parse(&q.to_string()).unwrap();
        assert_eq!(q, again);
    }

    #[test]
    fn missing_from_reports_position() {
        let err = parse("SELECT * watch_monitoring()").unwrap_err();
        assert_eq!(err.position, 9);
        assert!(err.message.contains("FROM"));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let err = parse("SELECT * FROM s() WHERE a = 1 b").unwrap_err();
        assert!(err.message.contains("end of input"));
    }

    #[test]
    fn unbalanced_parens_are_rejected() {
        assert!(parse("SELECT * FROM s() WHERE (a = 1").is_err());
        assert!(parse("SELECT * FROM s(artifact='x'").is_err());
    }

    #[test]
    fn duplicate_source_argument_is_rejected() {
        let err = parse("SELECT * FROM s(a=1, a=2)").unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn reserved_word_is_not_an_identifier() {
        assert!(parse("SELECT * FROM where()").is_err());
    }

    #[test]
    fn exponent_literals_parse() {
        let q = parse("SELECT * FROM s(x=1e300) WHERE y < -2.5e-7").unwrap();
        assert_eq!(q.source.arg("x"), Some(&Value::Float(1e300)));
        assert_eq!(
            q.filter,
            Some(Expr::compare(CompareOp::Lt, Expr::path("y"), Expr::literal(-2.5e-7)))
        );
    }

    #[test]
    fn source_position_is_recorded() {
        let (_, pos) = parse_with_source_pos("SELECT fromage FROM cheese()").unwrap();
        assert_eq!(pos, 20);
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = parse("").unwrap_err();
        assert_eq!(err.position, 0);
    }
}
