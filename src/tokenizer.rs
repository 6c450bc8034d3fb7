use std::iter::Peekable;
use std::num::{ParseFloatError, ParseIntError};
use std::str::Chars;

use crate::error::{Error, Result};

/// Lexical unit of the SQL dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // keywords
    Create,
    Table,
    Insert,
    Into,
    Values,
    Select,
    From,
    Where,
    And,
    Update,
    Set,
    Delete,
    Drop,
    Describe,
    Begin,
    Transaction,
    Commit,
    Rollback,
    Primary,
    Key,
    Not,
    Unique,
    References,

    // names and literals
    /// A name representing a table, a column or a type (e.g., `users`, `INTEGER`).
    Ident(String),
    /// Unsigned; a leading `-` is its own token so that `-9223372036854775808`
    /// still fits once negated.
    Number(u64),
    /// A string literal between single or double quotes (e.g., `'Alice'`).
    String(String),
    FloatNumber(f64),
    True,
    False,
    Null,

    // punctuation and operators
    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    /// `*` in `SELECT *`
    Star,
    /// Minus sign in front of a numeric literal
    Minus,
    Equal,
    /// `!=` or `<>`
    NotEqual,
    Greater,
    Lower,
    GreaterEqual,
    LowerEqual,

    /// End of input.
    Eof,
}

/// Maps an upper-cased word to its keyword token.
fn keyword(word: &str) -> Option<Token> {
    let token = match word {
        "CREATE" => Token::Create,
        "TABLE" => Token::Table,
        "INSERT" => Token::Insert,
        "INTO" => Token::Into,
        "VALUES" => Token::Values,
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "AND" => Token::And,
        "UPDATE" => Token::Update,
        "SET" => Token::Set,
        "DELETE" => Token::Delete,
        "DROP" => Token::Drop,
        "DESCRIBE" => Token::Describe,
        "BEGIN" => Token::Begin,
        "TRANSACTION" => Token::Transaction,
        "COMMIT" => Token::Commit,
        "ROLLBACK" => Token::Rollback,
        "PRIMARY" => Token::Primary,
        "KEY" => Token::Key,
        "NOT" => Token::Not,
        "UNIQUE" => Token::Unique,
        "REFERENCES" => Token::References,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "NULL" => Token::Null,
        _ => return None,
    };
    Some(token)
}

impl Token {
    /// Keywords that never start or shape a clause, so they can also name a
    /// table or a column.
    pub fn as_name(&self) -> Option<&'static str> {
        let name = match self {
            Token::Key => "key",
            Token::Transaction => "transaction",
            Token::Begin => "begin",
            Token::Commit => "commit",
            Token::Rollback => "rollback",
            Token::Describe => "describe",
            Token::Primary => "primary",
            Token::Unique => "unique",
            Token::References => "references",
            _ => return None,
        };
        Some(name)
    }
}

/// Splits SQL text into [Token]s.
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    /// Scans the whole input. The returned vector always ends with
    /// [Token::Eof].
    ///
    /// # Errors
    /// [Error::Parse] on an unknown character, a bad number or an
    /// unterminated string.
    ///
    /// # Example
    /// ```
    /// # use oxylite::tokenizer::{Tokenizer, Token};
    /// let tokens = Tokenizer::new("SELECT * FROM t WHERE a <> -1").tokenize().unwrap();
    /// assert_eq!(tokens[0], Token::Select);
    /// assert_eq!(tokens[6], Token::NotEqual);
    /// assert_eq!(tokens[7], Token::Minus);
    /// ```
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.eat_while(|c| c.is_whitespace());
            match self.chars.peek().copied() {
                Some(c) => tokens.push(self.scan(c)?),
                None => break,
            }
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn scan(&mut self, c: char) -> Result<Token> {
        if c.is_alphabetic() || c == '_' {
            let word = self.eat_while(|c| c.is_alphanumeric() || c == '_');
            return Ok(keyword(&word.to_uppercase()).unwrap_or(Token::Ident(word)));
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        self.chars.next();
        let token = match c {
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '*' => Token::Star,
            '-' => Token::Minus,
            '=' => Token::Equal,
            '>' if self.eat('=') => Token::GreaterEqual,
            '>' => Token::Greater,
            '<' if self.eat('=') => Token::LowerEqual,
            '<' if self.eat('>') => Token::NotEqual,
            '<' => Token::Lower,
            '!' if self.eat('=') => Token::NotEqual,
            '!' => return Err(Error::Parse("expected '=' after '!'".into())),
            '\'' | '"' => return self.string(c),
            _ => return Err(Error::Parse(format!("unexpected character {c:?}"))),
        };
        Ok(token)
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if_eq(&expected).is_some()
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.chars.next_if(|&c| pred(c)) {
            out.push(c);
        }
        out
    }

    /// An integer, or a float when a single `.` appears.
    fn number(&mut self) -> Result<Token> {
        let mut text = self.eat_while(|c| c.is_ascii_digit());
        let is_float = self.eat('.');
        if is_float {
            text.push('.');
            text.push_str(&self.eat_while(|c| c.is_ascii_digit()));
            if self.chars.peek() == Some(&'.') {
                return Err(Error::Parse(format!("malformed number {text}.")));
            }
        }

        let invalid = |e: String| Error::Parse(format!("invalid number {text:?}: {e}"));
        if is_float {
            text.parse()
                .map(Token::FloatNumber)
                .map_err(|e: ParseFloatError| invalid(e.to_string()))
        } else {
            text.parse()
                .map(Token::Number)
                .map_err(|e: ParseIntError| invalid(e.to_string()))
        }
    }

    /// The opening `quote` is already consumed. Two quotes in a row stand
    /// for one.
    fn string(&mut self, quote: char) -> Result<Token> {
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(Error::Parse("unterminated string".into())),
                Some(c) if c == quote && !self.eat(quote) => return Ok(Token::String(text)),
                Some(c) => text.push(c),
            }
        }
    }
}
