use crate::ast::*;
use crate::error::{Error, Result};
use crate::predicate::{Condition, Predicate};
use crate::tokenizer::{Token, Tokenizer};
use crate::{ColumnDef, DataType, Value};

/// Tokenizes and parses a single statement.
pub fn parse(sql: &str) -> Result<Statement> {
    let tokens = Tokenizer::new(sql).tokenize()?;
    Parser::new(tokens).parse()
}

/// Tokenizes and parses a `;` separated script.
pub fn parse_script(sql: &str) -> Result<Vec<Statement>> {
    let tokens = Tokenizer::new(sql).tokenize()?;
    Parser::new(tokens).parse_all()
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parses exactly one statement, optionally followed by `;`.
    pub fn parse(&mut self) -> Result<Statement> {
        let statement = self.parse_statement()?;

        // semicolon is optional in SQL so skip it
        if matches!(self.current_token(), Token::Semicolon) {
            self.advance();
        }

        // Check we are at the end of the statement
        if !self.is_at_end() {
            return Err(Error::Parse(format!(
                "unexpected token after statement: {:?}",
                self.current_token()
            )));
        }

        Ok(statement)
    }

    /// Parses every statement until the end of input. Empty statements
    /// (stray `;`) are skipped.
    pub fn parse_all(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while matches!(self.current_token(), Token::Semicolon) {
                self.advance();
            }
            if self.is_at_end() {
                return Ok(statements);
            }
            statements.push(self.parse_statement()?);
            match self.current_token() {
                Token::Semicolon | Token::Eof => {}
                other => {
                    return Err(Error::Parse(format!(
                        "expected ';' between statements, found {other:?}"
                    )));
                }
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current_token() {
            Token::Create => self.parse_create_table(),
            Token::Insert => self.parse_insert(),
            Token::Select => self.parse_select(),
            Token::Update => self.parse_update(),
            Token::Delete => self.parse_delete(),
            Token::Drop => {
                self.advance();
                self.consume(Token::Table)?;
                Ok(Statement::DropTable(self.consume_ident()?))
            }
            Token::Describe => {
                self.advance();
                Ok(Statement::Describe(self.consume_ident()?))
            }
            Token::Begin => {
                self.advance();
                self.skip_transaction_keyword();
                Ok(Statement::Begin)
            }
            Token::Commit => {
                self.advance();
                self.skip_transaction_keyword();
                Ok(Statement::Commit)
            }
            Token::Rollback => {
                self.advance();
                self.skip_transaction_keyword();
                Ok(Statement::Rollback)
            }
            Token::Eof => Err(Error::Parse("empty statement".into())),
            other => Err(Error::Parse(format!("unexpected token: {other:?}"))),
        }
    }

    //helpers
    fn current_token(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    fn consume(&mut self, expected: Token) -> Result<()> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(Error::Parse(format!(
                "expected {:?}, found {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    fn consume_if(&mut self, expected: Token) -> bool {
        let found = *self.current_token() == expected;
        if found {
            self.advance();
        }
        found
    }

    fn skip_transaction_keyword(&mut self) {
        self.consume_if(Token::Transaction);
    }

    fn consume_ident(&mut self) -> Result<String> {
        match self.current_token() {
            Token::Ident(string) => {
                let string = string.clone();
                self.advance();
                Ok(string)
            }
            other => match other.as_name() {
                Some(name) => {
                    self.advance();
                    Ok(name.to_string())
                }
                None => Err(Error::Parse(format!("expected identifier, found {other:?}"))),
            },
        }
    }

    fn consume_data_type(&mut self) -> Result<DataType> {
        let name = match self.current_token() {
            Token::Ident(name) => name,
            other => return Err(Error::Parse(format!("expected a column type, found {other:?}"))),
        };
        let data_type = DataType::from_name(name)
            .ok_or_else(|| Error::Parse(format!("unsupported data type: {name}")))?;
        self.advance();
        Ok(data_type)
    }

    /// Comma separated list between parentheses.
    fn parse_list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.consume(Token::LeftParen)?;
        let mut items = vec![];
        loop {
            items.push(item(self)?);
            match self.current_token() {
                Token::RightParen => {
                    self.advance();
                    return Ok(items);
                }
                Token::Comma => self.advance(),
                other => return Err(Error::Parse(format!("expected ',' or ')', found {other:?}"))),
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let negative = self.consume_if(Token::Minus);
        let value = match self.current_token() {
            Token::Number(n) => {
                let int = if negative {
                    0i64.checked_sub_unsigned(*n)
                } else {
                    i64::try_from(*n).ok()
                };
                let sign = if negative { "-" } else { "" };
                Value::Int(int.ok_or_else(|| {
                    Error::Parse(format!("integer literal out of range: {sign}{n}"))
                })?)
            }
            Token::FloatNumber(f) => Value::Float(if negative { -f } else { *f }),
            _ if negative => {
                return Err(Error::Parse(format!(
                    "expected a number after '-', found {:?}",
                    self.current_token()
                )));
            }
            Token::String(s) => Value::from(s.as_str()),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            other => return Err(Error::Parse(format!("expected a value, found {other:?}"))),
        };
        self.advance();
        Ok(value)
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.consume_ident()?;
        let data_type = self.consume_data_type()?;
        let mut column = ColumnDef::new(name, data_type);

        loop {
            match self.current_token() {
                Token::Primary => {
                    self.advance();
                    self.consume(Token::Key)?;
                    column = column.primary_key();
                }
                Token::Not => {
                    self.advance();
                    self.consume(Token::Null)?;
                    column = column.not_null();
                }
                Token::Unique => {
                    self.advance();
                    column = column.unique();
                }
                Token::References => {
                    self.advance();
                    let table = self.consume_ident()?;
                    self.consume(Token::LeftParen)?;
                    let target = self.consume_ident()?;
                    self.consume(Token::RightParen)?;
                    column = column.references(table, target);
                }
                _ => return Ok(column),
            }
        }
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        self.consume(Token::Create)?;
        self.consume(Token::Table)?;
        let name = self.consume_ident()?;
        let columns = self.parse_list(Self::parse_column_def)?;
        Ok(Statement::CreateTable(CreateTable { name, columns }))
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.consume(Token::Insert)?;
        self.consume(Token::Into)?;
        let table = self.consume_ident()?;
        let columns = if matches!(self.current_token(), Token::LeftParen) {
            Some(self.parse_list(Self::consume_ident)?)
        } else {
            None
        };
        self.consume(Token::Values)?;
        let values = self.parse_list(Self::parse_literal)?;
        Ok(Statement::InsertInto(InsertInto {
            table,
            columns,
            values,
        }))
    }

    fn parse_select(&mut self) -> Result<Statement> {
        self.consume(Token::Select)?;
        let columns = if self.consume_if(Token::Star) {
            ColumnsSelect::Star
        } else {
            let mut names = vec![self.consume_ident()?];
            while self.consume_if(Token::Comma) {
                names.push(self.consume_ident()?);
            }
            ColumnsSelect::ColumnsNames(names)
        };
        self.consume(Token::From)?;
        let table = self.consume_ident()?;
        let where_clause = self.parse_where()?.unwrap_or_default();
        Ok(Statement::Select(Select {
            columns,
            table,
            where_clause,
        }))
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.consume(Token::Update)?;
        let table = self.consume_ident()?;
        self.consume(Token::Set)?;
        let mut assignments = vec![];
        loop {
            let column = self.consume_ident()?;
            self.consume(Token::Equal)?;
            assignments.push((column, self.parse_literal()?));
            if !self.consume_if(Token::Comma) {
                break;
            }
        }
        let where_clause = self.parse_where()?;
        Ok(Statement::Update(Update {
            table,
            assignments,
            where_clause,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.consume(Token::Delete)?;
        self.consume(Token::From)?;
        let table = self.consume_ident()?;
        let where_clause = self.parse_where()?.unwrap_or_default();
        Ok(Statement::Delete(Delete {
            table,
            where_clause,
        }))
    }

    /// `None` when there is no WHERE keyword.
    fn parse_where(&mut self) -> Result<Option<Predicate>> {
        if !self.consume_if(Token::Where) {
            return Ok(None);
        }
        let mut conditions = vec![self.parse_condition()?];
        while self.consume_if(Token::And) {
            conditions.push(self.parse_condition()?);
        }
        Ok(Some(Predicate::from(conditions)))
    }

    fn parse_condition(&mut self) -> Result<Condition> {
        let column = self.consume_ident()?;
        let op = match self.current_token() {
            Token::Equal => ComparisonOp::Eq,
            Token::NotEqual => ComparisonOp::NotEq,
            Token::Greater => ComparisonOp::Gt,
            Token::Lower => ComparisonOp::Lt,
            Token::GreaterEqual => ComparisonOp::GtEq,
            Token::LowerEqual => ComparisonOp::LtEq,
            other => {
                return Err(Error::Parse(format!(
                    "expected a comparison operator, found {other:?}"
                )));
            }
        };
        self.advance();
        let value = self.parse_literal()?;
        Ok(Condition { column, op, value })
    }
}
