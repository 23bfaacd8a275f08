//! Schema dump parser: `CREATE TABLE`, `ALTER TABLE ... FOREIGN KEY` and
//! `INSERT INTO ... VALUES`.

use super::dialect::Dialect;
use super::lexer::{Lexer, Token};
use super::types::{classify, coerce, number_value, sample_value, TypeClass};
use crate::model::{Relationship, Row, Table};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlParseError {
    #[error("Unexpected token: {0:?}")]
    UnexpectedToken(Token),
    #[error("Expected {expected}, found {found:?}")]
    Expected { expected: String, found: Token },
    #[error("INSERT into unknown table {0}")]
    UnknownInsertTable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlColumn {
    pub name: String,
    pub class: TypeClass,
    pub primary_key: bool,
}

/// Tables and foreign-key relationships recovered from a dump.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSchema {
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    /// Typed column info per table id, in declaration order.
    pub columns: HashMap<String, Vec<SqlColumn>>,
}

impl SqlSchema {
    /// Fill every table that has no data with `count` generated rows.
    /// Foreign-key columns take values from the referenced table's rows.
    pub fn with_sample_rows(mut self, count: usize) -> Self {
        let mut generated = HashSet::new();
        for table in self.tables.iter_mut().filter(|t| t.rows.is_empty()) {
            generated.insert(table.id.clone());
            let columns = self.columns.get(&table.id).map(Vec::as_slice).unwrap_or_default();
            table.rows = (0..count)
                .map(|i| {
                    columns
                        .iter()
                        .map(|c| (c.name.clone(), sample_value(c.class, &c.name, i)))
                        .collect()
                })
                .collect();
        }

        for rel in self
            .relationships
            .iter()
            .filter(|r| generated.contains(&r.source_table_id))
        {
            let Some(target) = self.tables.iter().find(|t| t.id == rel.target_table_id) else {
                continue;
            };
            let keys: Vec<Value> = target
                .rows
                .iter()
                .filter_map(|r| r.get(&rel.target_column).cloned())
                .collect();
            if keys.is_empty() {
                continue;
            }
            let Some(source) = self.tables.iter_mut().find(|t| t.id == rel.source_table_id) else {
                continue;
            };
            for (i, row) in source.rows.iter_mut().enumerate() {
                if let Some(cell) = row.get_mut(&rel.source_column) {
                    // Self references point one row back so chains form
                    let pick = if rel.is_self_referencing() { i.saturating_sub(1) } else { i };
                    *cell = if rel.is_self_referencing() && i == 0 {
                        Value::Null
                    } else {
                        keys[pick % keys.len()].clone()
                    };
                }
            }
        }
        self
    }
}

/// Parse a SQL dump into tables and relationships.
pub fn parse_sql(input: &str, dialect: Dialect) -> Result<SqlSchema, SqlParseError> {
    let dialect = dialect.resolve(input);
    let tokens = Lexer::new(input).tokenize();
    Parser::new(tokens, dialect).parse()
}

/// Words continuing a multi-word type name.
const TYPE_WORDS: &[&str] = &["precision", "varying", "with", "without", "time", "zone"];
/// MySQL numeric attributes that do not change the value class.
const TYPE_FLAGS: &[&str] = &["unsigned", "signed", "zerofill"];

enum Alteration {
    ForeignKey(ForeignKey),
    PrimaryKey { table: String, columns: Vec<String> },
}

struct ForeignKey {
    table: String,
    columns: Vec<String>,
    target: String,
    target_columns: Vec<String>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    dialect: Dialect,
}

impl Parser {
    fn new(tokens: Vec<Token>, dialect: Dialect) -> Self {
        Self {
            tokens,
            pos: 0,
            dialect,
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), SqlParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(SqlParseError::Expected {
                expected: expected.to_string(),
                found: self.current().clone(),
            })
        }
    }

    fn parse(&mut self) -> Result<SqlSchema, SqlParseError> {
        let mut tables: Vec<Table> = Vec::new();
        let mut columns: HashMap<String, Vec<SqlColumn>> = HashMap::new();
        let mut foreign_keys = Vec::new();
        let mut inserts: Vec<(String, Option<Vec<String>>, Vec<Vec<Value>>)> = Vec::new();

        while self.current() != &Token::Eof {
            match self.current() {
                Token::Create => {
                    self.advance();
                    if !self.eat(&Token::Table) {
                        // CREATE INDEX, VIEW, SEQUENCE, ...
                        self.skip_statement();
                        continue;
                    }
                    self.skip_if_not_exists();
                    let Some(name) = self.qualified_name() else {
                        self.skip_statement();
                        continue;
                    };
                    let (cols, fks) = self.parse_table_body(&name)?;
                    let mut table =
                        Table::new(&name, &name, cols.iter().map(|c| c.name.clone()).collect());
                    table.root = cols.iter().any(|c| c.primary_key);
                    tables.push(table);
                    columns.insert(name, cols);
                    foreign_keys.extend(fks);
                }
                Token::Alter => match self.parse_alter_table()? {
                    Some(Alteration::ForeignKey(fk)) => foreign_keys.push(fk),
                    Some(Alteration::PrimaryKey { table, columns: pk }) => {
                        if let Some(typed) = columns.get_mut(&table) {
                            typed
                                .iter_mut()
                                .filter(|c| pk.contains(&c.name))
                                .for_each(|c| c.primary_key = true);
                        }
                        if let Some(t) = tables.iter_mut().find(|t| t.id == table) {
                            t.root = true;
                        }
                    }
                    None => {}
                },
                Token::Insert => {
                    if let Some(insert) = self.parse_insert()? {
                        inserts.push(insert);
                    }
                }
                _ => self.skip_statement(),
            }
        }

        for (name, insert_columns, rows) in inserts {
            let table = tables
                .iter_mut()
                .find(|t| t.id == name)
                .ok_or_else(|| SqlParseError::UnknownInsertTable(name.clone()))?;
            let typed = columns.get(&name).map(Vec::as_slice).unwrap_or_default();
            let names = insert_columns.unwrap_or_else(|| table.columns.clone());
            for values in rows {
                let row: Row = names
                    .iter()
                    .zip(values)
                    .map(|(column, value)| {
                        let class = typed
                            .iter()
                            .find(|c| &c.name == column)
                            .map_or(TypeClass::Text, |c| c.class);
                        (column.clone(), coerce(class, value))
                    })
                    .collect();
                table.rows.push(row);
            }
        }

        let relationships = relationships_from(&tables, &foreign_keys);
        Ok(SqlSchema {
            tables,
            relationships,
            columns,
        })
    }

    fn skip_if_not_exists(&mut self) {
        if self.eat(&Token::If) {
            self.eat(&Token::Not);
            self.eat(&Token::Exists);
        }
    }

    /// `name` or `schema.name`, keeping the last part.
    fn qualified_name(&mut self) -> Option<String> {
        let Token::Ident(first) = self.current().clone() else {
            return None;
        };
        self.advance();
        let mut name = first;
        while self.eat(&Token::Dot) {
            if let Token::Ident(part) = self.current().clone() {
                self.advance();
                name = part;
            }
        }
        Some(name)
    }

    fn parse_table_body(&mut self, table: &str) -> Result<(Vec<SqlColumn>, Vec<ForeignKey>), SqlParseError> {
        if !self.eat(&Token::LParen) {
            // CREATE TABLE ... AS SELECT and similar
            self.skip_statement();
            return Ok((Vec::new(), Vec::new()));
        }

        let mut columns: Vec<SqlColumn> = Vec::new();
        let mut fks = Vec::new();
        let mut pk_columns: Vec<String> = Vec::new();

        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                Token::Comma => self.advance(),
                Token::Constraint => {
                    self.advance();
                    if let Token::Ident(_) = self.current() {
                        self.advance();
                    }
                }
                Token::Primary => {
                    self.advance();
                    self.eat(&Token::Key);
                    pk_columns.extend(self.parse_column_list());
                }
                Token::Foreign => {
                    if let Some(fk) = self.parse_foreign_key(table)? {
                        fks.push(fk);
                    }
                }
                Token::Unique | Token::Index | Token::Key | Token::Check => {
                    self.skip_until_separator();
                }
                Token::Ident(_) => {
                    let (column, inline_fk) = self.parse_column(table)?;
                    columns.push(column);
                    fks.extend(inline_fk);
                }
                _ => self.advance(),
            }
        }

        // table options such as ENGINE=InnoDB
        self.skip_statement();

        for column in &mut columns {
            if pk_columns.contains(&column.name) {
                column.primary_key = true;
            }
        }
        Ok((columns, fks))
    }

    fn parse_column(&mut self, table: &str) -> Result<(SqlColumn, Option<ForeignKey>), SqlParseError> {
        let Token::Ident(name) = self.current().clone() else {
            return Err(SqlParseError::UnexpectedToken(self.current().clone()));
        };
        self.advance();

        let raw_type = self.parse_type();
        let mut column = SqlColumn {
            name,
            class: classify(&raw_type, self.dialect),
            primary_key: false,
        };
        let mut fk = None;

        loop {
            match self.current() {
                Token::Comma | Token::RParen | Token::Eof => break,
                Token::Primary => {
                    self.advance();
                    self.eat(&Token::Key);
                    column.primary_key = true;
                }
                Token::References => {
                    self.advance();
                    let (target, target_columns) = self.parse_reference()?;
                    fk = Some(ForeignKey {
                        table: table.to_string(),
                        columns: vec![column.name.clone()],
                        target,
                        target_columns,
                    });
                }
                Token::LParen => self.skip_parenthesized(),
                Token::Check | Token::Default => {
                    self.advance();
                    if self.current() == &Token::LParen {
                        self.skip_parenthesized();
                    }
                }
                _ => self.advance(),
            }
        }

        Ok((column, fk))
    }

    /// Type words and their arguments, e.g. `double precision`, `numeric(10,2)`.
    fn parse_type(&mut self) -> String {
        let mut raw = String::new();
        loop {
            match self.current().clone() {
                // `text[]` lexes as an empty bracketed identifier
                Token::Ident(word) if word.is_empty() => raw.push_str("[]"),
                Token::Ident(word) if raw.is_empty() => raw.push_str(&word),
                Token::Ident(word) if TYPE_WORDS.contains(&word.to_lowercase().as_str()) => {
                    raw.push(' ');
                    raw.push_str(&word);
                }
                Token::Ident(word) if TYPE_FLAGS.contains(&word.to_lowercase().as_str()) => {}
                Token::Serial => raw.push_str("serial"),
                Token::LParen => {
                    raw.push('(');
                    self.advance();
                    while !matches!(self.current(), Token::RParen | Token::Eof) {
                        match self.current() {
                            Token::Num(n) | Token::Ident(n) | Token::Str(n) => raw.push_str(n),
                            Token::Comma => raw.push(','),
                            _ => {}
                        }
                        self.advance();
                    }
                    raw.push(')');
                }
                _ => break,
            }
            self.advance();
        }
        raw
    }

    fn parse_reference(&mut self) -> Result<(String, Vec<String>), SqlParseError> {
        let target = self.qualified_name().ok_or_else(|| SqlParseError::Expected {
            expected: "referenced table".to_string(),
            found: self.current().clone(),
        })?;
        let mut columns = self.parse_column_list();
        if columns.is_empty() {
            columns.push("id".to_string());
        }
        self.skip_referential_actions();
        Ok((target, columns))
    }

    fn parse_foreign_key(&mut self, table: &str) -> Result<Option<ForeignKey>, SqlParseError> {
        self.advance(); // FOREIGN
        if !self.eat(&Token::Key) {
            return Ok(None);
        }
        let columns = self.parse_column_list();
        if !self.eat(&Token::References) {
            return Ok(None);
        }
        let (target, target_columns) = self.parse_reference()?;
        Ok(Some(ForeignKey {
            table: table.to_string(),
            columns,
            target,
            target_columns,
        }))
    }

    /// `ALTER TABLE ... ADD [CONSTRAINT name] FOREIGN KEY | PRIMARY KEY ...`
    fn parse_alter_table(&mut self) -> Result<Option<Alteration>, SqlParseError> {
        self.advance(); // ALTER
        if !self.eat(&Token::Table) {
            self.skip_statement();
            return Ok(None);
        }
        self.eat(&Token::Only);
        let Some(table) = self.qualified_name() else {
            self.skip_statement();
            return Ok(None);
        };

        while !matches!(
            self.current(),
            Token::Foreign | Token::Primary | Token::Semicolon | Token::Eof
        ) {
            self.advance();
        }
        let alteration = match self.current() {
            Token::Foreign => self.parse_foreign_key(&table)?.map(Alteration::ForeignKey),
            Token::Primary => {
                self.advance();
                self.eat(&Token::Key);
                let columns = self.parse_column_list();
                Some(Alteration::PrimaryKey { table, columns })
            }
            _ => None,
        };
        self.skip_statement();
        Ok(alteration)
    }

    fn parse_insert(
        &mut self,
    ) -> Result<Option<(String, Option<Vec<String>>, Vec<Vec<Value>>)>, SqlParseError> {
        self.advance(); // INSERT
        self.expect(Token::Into, "INTO")?;
        let Some(table) = self.qualified_name() else {
            self.skip_statement();
            return Ok(None);
        };
        let columns = if self.current() == &Token::LParen {
            Some(self.parse_column_list())
        } else {
            None
        };
        if !self.eat(&Token::Values) {
            // INSERT ... SELECT
            self.skip_statement();
            return Ok(None);
        }

        let mut rows = Vec::new();
        while self.eat(&Token::LParen) {
            let mut values = Vec::new();
            loop {
                match self.current().clone() {
                    Token::RParen => {
                        self.advance();
                        break;
                    }
                    Token::Eof => return Err(SqlParseError::UnexpectedToken(Token::Eof)),
                    Token::Comma => self.advance(),
                    token => values.push(self.parse_literal(token)),
                }
            }
            rows.push(values);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.skip_statement();
        Ok(Some((table, columns, rows)))
    }

    fn parse_literal(&mut self, token: Token) -> Value {
        self.advance();
        match token {
            Token::Num(n) => number_value(&n),
            Token::Str(s) => Value::String(s),
            Token::Null => Value::Null,
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Ident(word) => {
                // function call such as now(), kept as text
                if self.current() == &Token::LParen {
                    self.skip_parenthesized();
                    return Value::String(format!("{}()", word));
                }
                Value::String(word)
            }
            _ => Value::Null,
        }
    }

    fn parse_column_list(&mut self) -> Vec<String> {
        let mut cols = Vec::new();
        if !self.eat(&Token::LParen) {
            return cols;
        }
        loop {
            match self.current().clone() {
                Token::Ident(name) => {
                    cols.push(name);
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                _ => self.advance(),
            }
        }
        cols
    }

    fn skip_referential_actions(&mut self) {
        while self.eat(&Token::On) {
            if matches!(self.current(), Token::Delete | Token::Update) {
                self.advance();
            }
            // CASCADE, RESTRICT, SET NULL, SET DEFAULT, NO ACTION
            match self.current().clone() {
                Token::Cascade | Token::Restrict => self.advance(),
                Token::Ident(word) if word.eq_ignore_ascii_case("set") => {
                    self.advance();
                    if matches!(self.current(), Token::Null | Token::Default) {
                        self.advance();
                    }
                }
                Token::Ident(word) if word.eq_ignore_ascii_case("no") => {
                    self.advance();
                    if matches!(self.current(), Token::Ident(a) if a.eq_ignore_ascii_case("action")) {
                        self.advance();
                    }
                }
                _ => {}
            }
        }
    }

    fn skip_parenthesized(&mut self) {
        if !self.eat(&Token::LParen) {
            return;
        }
        let mut depth = 1;
        while depth > 0 {
            match self.current() {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                Token::Eof => break,
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip to the next `,` or `)` at the current nesting level.
    fn skip_until_separator(&mut self) {
        while !matches!(self.current(), Token::Comma | Token::RParen | Token::Eof) {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
    }

    fn skip_statement(&mut self) {
        while !matches!(self.current(), Token::Semicolon | Token::Eof) {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
        self.eat(&Token::Semicolon);
    }
}

/// One relationship per single-column foreign key whose target exists.
fn relationships_from(tables: &[Table], foreign_keys: &[ForeignKey]) -> Vec<Relationship> {
    let mut relationships: Vec<Relationship> = Vec::new();
    for fk in foreign_keys {
        if !tables.iter().any(|t| t.id == fk.target) {
            log::debug!("Dropping foreign key {} -> {}: unknown table", fk.table, fk.target);
            continue;
        }
        let ([column], [target_column]) = (fk.columns.as_slice(), fk.target_columns.as_slice()) else {
            log::debug!("Dropping composite foreign key {} -> {}", fk.table, fk.target);
            continue;
        };
        let rel = Relationship::new(&fk.table, column, &fk.target, target_column);
        if !relationships.contains(&rel) {
            relationships.push(rel);
        }
    }
    relationships
}
