//! Tokenizer for schema dumps: DDL plus `INSERT ... VALUES` data.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // DDL keywords
    Create,
    Alter,
    Add,
    Table,
    Only,
    Primary,
    Key,
    Foreign,
    References,
    Constraint,
    Unique,
    Index,
    Check,
    Default,
    On,
    Delete,
    Update,
    Cascade,
    Restrict,
    If,
    Not,
    Exists,
    Serial,

    // Data keywords
    Insert,
    Into,
    Values,
    Null,
    True,
    False,

    Ident(String),
    Str(String),
    Num(String),

    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    current: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.chars().peekable();
        let current = chars.next();
        Self { chars, current }
    }

    fn advance(&mut self) {
        self.current = self.chars.next();
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.current {
            self.advance();
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        // current is '/', next is '*'
        self.advance();
        self.advance();
        while let Some(c) = self.current {
            self.advance();
            if c == '*' && self.current == Some('/') {
                self.advance();
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.current {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    /// Quoted text with doubled-quote escapes; backslash escapes only in
    /// string literals.
    fn read_quoted(&mut self, close: char, backslash: bool) -> String {
        self.advance();
        let mut text = String::new();
        while let Some(c) = self.current {
            if c == close {
                if self.peek() == Some(&close) {
                    text.push(c);
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                break;
            }
            if backslash && c == '\\' {
                self.advance();
                match self.current {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(other) => text.push(other),
                    None => break,
                }
                self.advance();
                continue;
            }
            text.push(c);
            self.advance();
        }
        text
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        if self.current == Some('-') {
            num.push('-');
            self.advance();
        }
        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(c) = self.current {
            match c {
                '0'..='9' => num.push(c),
                '.' if !seen_dot && !seen_exp => {
                    seen_dot = true;
                    num.push(c);
                }
                'e' | 'E' if !seen_exp => {
                    seen_exp = true;
                    num.push(c);
                    self.advance();
                    if let Some(sign @ ('+' | '-')) = self.current {
                        num.push(sign);
                    } else {
                        continue;
                    }
                }
                _ => break,
            }
            self.advance();
        }
        num
    }

    fn keyword_or_ident(word: String) -> Token {
        match word.to_uppercase().as_str() {
            "CREATE" => Token::Create,
            "ALTER" => Token::Alter,
            "ADD" => Token::Add,
            "TABLE" => Token::Table,
            "ONLY" => Token::Only,
            "PRIMARY" => Token::Primary,
            "KEY" => Token::Key,
            "FOREIGN" => Token::Foreign,
            "REFERENCES" => Token::References,
            "CONSTRAINT" => Token::Constraint,
            "UNIQUE" => Token::Unique,
            "INDEX" => Token::Index,
            "CHECK" => Token::Check,
            "DEFAULT" => Token::Default,
            "ON" => Token::On,
            "DELETE" => Token::Delete,
            "UPDATE" => Token::Update,
            "CASCADE" => Token::Cascade,
            "RESTRICT" => Token::Restrict,
            "IF" => Token::If,
            "NOT" => Token::Not,
            "EXISTS" => Token::Exists,
            "SERIAL" | "BIGSERIAL" | "SMALLSERIAL" => Token::Serial,
            "INSERT" => Token::Insert,
            "INTO" => Token::Into,
            "VALUES" => Token::Values,
            "NULL" => Token::Null,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            _ => Token::Ident(word),
        }
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            let Some(c) = self.current else {
                return Token::Eof;
            };
            match c {
                c if c.is_whitespace() => self.advance(),
                '-' if self.peek() == Some(&'-') => self.skip_line(),
                '#' => self.skip_line(),
                '/' if self.peek() == Some(&'*') => self.skip_block_comment(),
                '-' if self.peek().is_some_and(|n| n.is_ascii_digit()) => {
                    return Token::Num(self.read_number());
                }
                '0'..='9' => return Token::Num(self.read_number()),
                '(' | ')' | ',' | ';' | '.' => {
                    self.advance();
                    return match c {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        ',' => Token::Comma,
                        ';' => Token::Semicolon,
                        _ => Token::Dot,
                    };
                }
                '"' => return Token::Ident(self.read_quoted('"', false)),
                '`' => return Token::Ident(self.read_quoted('`', false)),
                '[' => return Token::Ident(self.read_quoted(']', false)),
                '\'' => return Token::Str(self.read_quoted('\'', true)),
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.read_word();
                    return Self::keyword_or_ident(word);
                }
                // casts, operators and other punctuation carry nothing we use
                _ => self.advance(),
            }
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(sql: &str) -> Vec<Token> {
        Lexer::new(sql).tokenize()
    }

    #[test]
    fn test_create_table_tokens() {
        let tokens = lex("CREATE TABLE users (id INT);");
        assert_eq!(
            tokens,
            vec![
                Token::Create,
                Token::Table,
                Token::Ident("users".into()),
                Token::LParen,
                Token::Ident("id".into()),
                Token::Ident("INT".into()),
                Token::RParen,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_identifiers() {
        let tokens = lex(r#"CREATE TABLE "User Table" (`column name` INT, [x] INT);"#);
        assert_eq!(tokens[2], Token::Ident("User Table".into()));
        assert_eq!(tokens[4], Token::Ident("column name".into()));
        assert_eq!(tokens[7], Token::Ident("x".into()));
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex("-- comment\nCREATE /* block */ TABLE t (id INT); # trailing");
        assert_eq!(tokens[0], Token::Create);
        assert_eq!(tokens[1], Token::Table);
        assert_eq!(tokens.last(), Some(&Token::Eof));
    }

    #[test]
    fn test_insert_literals() {
        let tokens = lex("INSERT INTO t VALUES (-1.5, 'it''s', NULL, TRUE, 2e3);");
        assert_eq!(tokens[0], Token::Insert);
        assert_eq!(tokens[1], Token::Into);
        assert_eq!(tokens[3], Token::Values);
        assert_eq!(tokens[5], Token::Num("-1.5".into()));
        assert_eq!(tokens[7], Token::Str("it's".into()));
        assert_eq!(tokens[9], Token::Null);
        assert_eq!(tokens[11], Token::True);
        assert_eq!(tokens[13], Token::Num("2e3".into()));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex(r"'a\nb\'c'");
        assert_eq!(tokens[0], Token::Str("a\nb'c".into()));
    }
}
