use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::{Phrase, PhraseWord, Query};
use crate::query::rewrite::Tok;

/// Recursive-descent parser over prepared clause tokens. Precedence is
/// ascending: OR, AND, NOT, proximity; parentheses group; adjacent words
/// form phrases.
pub fn parse(tokens: &[Tok]) -> Result<Query> {
    let mut parser = Parser { tokens, pos: 0 };
    let query = parser.or_expr()?;
    match parser.peek() {
        None => Ok(query),
        Some(tok) => Err(Error::new(
            ErrorKind::QuerySyntax,
            format!("unexpected token {:?}", tok),
        )),
    }
}

struct Parser<'a> {
    tokens: &'a [Tok],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Tok> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Tok> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn or_expr(&mut self) -> Result<Query> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Tok::Or) {
            self.advance();
            let right = self.and_expr()?;
            left = Query::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Query> {
        let mut left = self.excl_expr()?;
        while self.peek() == Some(&Tok::And) {
            self.advance();
            let right = self.excl_expr()?;
            left = Query::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn excl_expr(&mut self) -> Result<Query> {
        let mut left = self.prox_expr()?;
        while self.peek() == Some(&Tok::Not) {
            self.advance();
            let right = self.prox_expr()?;
            left = Query::Not(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn prox_expr(&mut self) -> Result<Query> {
        let mut left = self.factor()?;
        while let Some(Tok::Prox(tildes)) = self.peek() {
            let tildes = *tildes;
            self.advance();
            let right = self.factor()?;
            left = Query::Prox {
                left: Box::new(left),
                right: Box::new(right),
                // n tildes allow n-1 intervening words
                max_gap: tildes + 1,
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Query> {
        match self.peek() {
            Some(Tok::LParen) => {
                self.advance();
                let inner = self.or_expr()?;
                match self.advance() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(Error::new(ErrorKind::QuerySyntax, "unbalanced parentheses")),
                }
            }
            Some(Tok::Word { .. }) | Some(Tok::Plus) => self.phrase(),
            Some(tok) => Err(Error::new(
                ErrorKind::QuerySyntax,
                format!("expected a term, found {:?}", tok),
            )),
            None => Err(Error::new(ErrorKind::QuerySyntax, "query ends mid-expression")),
        }
    }

    fn phrase(&mut self) -> Result<Query> {
        let mut words: Vec<PhraseWord> = Vec::new();
        let mut field: Option<String> = None;
        let mut pending_skips = 0u16;

        loop {
            match self.peek() {
                Some(Tok::Word {
                    text,
                    field: word_field,
                    wildcard,
                }) => {
                    self.advance();
                    let skip_before = if words.is_empty() { 0 } else { pending_skips };
                    pending_skips = 0;
                    field.get_or_insert_with(|| word_field.clone());
                    words.push(PhraseWord {
                        text: text.clone(),
                        wildcard: *wildcard,
                        skip_before,
                    });
                }
                Some(Tok::Plus) => {
                    self.advance();
                    pending_skips += 1;
                }
                _ => break,
            }
        }

        match field {
            Some(field) if !words.is_empty() => Ok(Query::Phrase(Phrase { field, words })),
            // a clause of only elided stop words cannot be evaluated
            _ => Err(Error::new(
                ErrorKind::QuerySyntax,
                "clause contains no searchable term",
            )),
        }
    }
}
