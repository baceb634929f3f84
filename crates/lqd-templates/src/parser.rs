use crate::error::Error;
use crate::error::Result;
use crate::expression::Expression;
use crate::expression::Lookup;
use crate::expression::LookupName;
use crate::expression::RangeLookup;
use crate::expression::VariableLookup;
use crate::lexer::tokenize;
use crate::lexer::Token;
use crate::lexer::TokenKind;
use crate::value::Value;

/// A filter or tag argument, either positional or `name: value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expression),
    Keyword(String, Expression),
}

/// Recursive-descent parser over the tokens of one piece of markup.
#[derive(Debug)]
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(markup: &'a str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(markup)?,
            pos: 0,
        })
    }

    fn current(&self) -> Token<'a> {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .copied()
            .unwrap_or(Token {
                kind: TokenKind::EndOfString,
                text: "",
            })
    }

    /// Consume a token of `kind` or fail with `Expected .. but found ..`.
    pub fn consume(&mut self, kind: TokenKind) -> Result<&'a str> {
        let token = self.current();
        if token.kind != kind {
            return Err(Error::syntax(format!(
                "Expected {kind} but found {}",
                token.kind
            )));
        }
        self.advance();
        Ok(token.text)
    }

    /// Consume a token of `kind` if it is next.
    pub fn consume_if(&mut self, kind: TokenKind) -> Option<&'a str> {
        let token = self.current();
        if token.kind == kind {
            self.advance();
            Some(token.text)
        } else {
            None
        }
    }

    /// Consume the identifier `name` if it is next.
    pub fn id(&mut self, name: &str) -> bool {
        let token = self.current();
        if token.kind == TokenKind::Id && token.text == name {
            self.advance();
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn look(&self, kind: TokenKind, ahead: usize) -> bool {
        self.tokens
            .get(self.pos + ahead)
            .is_some_and(|token| token.kind == kind)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub fn expression(&mut self) -> Result<Expression> {
        let token = self.current();
        match token.kind {
            TokenKind::Id => {
                self.advance();
                let lookups = self.variable_lookups()?;
                if lookups.is_empty() {
                    if let Some(literal) = Expression::keyword(token.text) {
                        return Ok(literal);
                    }
                }
                Ok(Expression::Lookup(VariableLookup::new(
                    LookupName::Ident(token.text.to_owned()),
                    lookups,
                )))
            }
            TokenKind::OpenSquare => {
                self.advance();
                let name = self.expression()?;
                self.consume(TokenKind::CloseSquare)?;
                let lookups = self.variable_lookups()?;
                Ok(Expression::Lookup(VariableLookup::new(
                    LookupName::Dynamic(Box::new(name)),
                    lookups,
                )))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expression::Literal(Value::String(
                    token.text[1..token.text.len() - 1].to_owned(),
                )))
            }
            TokenKind::Number => {
                self.advance();
                Ok(Expression::parse(token.text))
            }
            TokenKind::OpenRound => {
                self.advance();
                let start = self.expression()?;
                self.consume(TokenKind::DotDot)?;
                let end = self.expression()?;
                self.consume(TokenKind::CloseRound)?;
                Ok(RangeLookup::build(start, end))
            }
            _ => Err(Error::syntax(format!(
                "{} is not a valid expression",
                token.describe()
            ))),
        }
    }

    /// Parse an expression and also return its markup with whitespace
    /// removed, as used to name loops.
    pub fn expression_with_markup(&mut self) -> Result<(Expression, String)> {
        let start = self.pos;
        let expression = self.expression()?;
        let markup = self.tokens[start..self.pos]
            .iter()
            .map(|token| token.text)
            .collect();
        Ok((expression, markup))
    }

    pub fn argument(&mut self) -> Result<Argument> {
        if self.look(TokenKind::Id, 0) && self.look(TokenKind::Colon, 1) {
            let name = self.consume(TokenKind::Id)?.to_owned();
            self.consume(TokenKind::Colon)?;
            return Ok(Argument::Keyword(name, self.expression()?));
        }
        Ok(Argument::Positional(self.expression()?))
    }

    fn variable_lookups(&mut self) -> Result<Vec<Lookup>> {
        let mut lookups = Vec::new();
        loop {
            if self.consume_if(TokenKind::OpenSquare).is_some() {
                let key = self.expression()?;
                self.consume(TokenKind::CloseSquare)?;
                lookups.push(Lookup::Index(key));
            } else if self.consume_if(TokenKind::Dot).is_some() {
                let key = self.consume(TokenKind::Id)?;
                lookups.push(Lookup::Property(key.to_owned()));
            } else {
                return Ok(lookups);
            }
        }
    }

    /// Require that all tokens were consumed.
    pub fn finish(&mut self) -> Result<()> {
        self.consume(TokenKind::EndOfString).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_kinds() {
        let mut parser = Parser::new("a.b[0] 'x' 3 (1..n) true").unwrap();
        assert!(matches!(parser.expression().unwrap(), Expression::Lookup(_)));
        assert_eq!(
            parser.expression().unwrap(),
            Expression::Literal(Value::from("x"))
        );
        assert_eq!(
            parser.expression().unwrap(),
            Expression::Literal(Value::Integer(3))
        );
        assert!(matches!(parser.expression().unwrap(), Expression::Range(_)));
        assert_eq!(
            parser.expression().unwrap(),
            Expression::Literal(Value::Bool(true))
        );
        parser.finish().unwrap();
    }

    #[test]
    fn keyword_with_lookups_is_a_variable() {
        let mut parser = Parser::new("empty.size").unwrap();
        assert!(matches!(parser.expression().unwrap(), Expression::Lookup(_)));
    }

    #[test]
    fn consume_mismatch_message() {
        let mut parser = Parser::new("| x").unwrap();
        let err = parser.consume(TokenKind::Id).unwrap_err();
        assert_eq!(err.message(), "Expected id but found pipe");
    }

    #[test]
    fn invalid_expression_message() {
        let mut parser = Parser::new("| x").unwrap();
        let err = parser.expression().unwrap_err();
        assert_eq!(err.message(), "[:pipe, \"|\"] is not a valid expression");
    }

    #[test]
    fn markup_of_expression() {
        let mut parser = Parser::new("( 1 .. 5 ) reversed").unwrap();
        let (_, markup) = parser.expression_with_markup().unwrap();
        assert_eq!(markup, "(1..5)");
        assert!(parser.id("reversed"));
    }

    #[test]
    fn keyword_argument() {
        let mut parser = Parser::new("allow_false: true").unwrap();
        assert_eq!(
            parser.argument().unwrap(),
            Argument::Keyword("allow_false".into(), Expression::Literal(Value::Bool(true)))
        );
    }

    #[test]
    fn look_ahead() {
        let parser = Parser::new("a: b").unwrap();
        assert!(parser.look(TokenKind::Id, 0));
        assert!(parser.look(TokenKind::Colon, 1));
        assert!(!parser.look(TokenKind::Colon, 5));
    }
}
