// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compact, declarative PML front-end.
//!
//! Supports the statements needed to build and administer a policy graph:
//!
//! ```text
//! create pc "pc1"
//! create ua "ua1" in ["pc1"]
//! create oa "oa1" in ["pc1"]
//! assign "u1" to ["ua1", "ua2"]
//! deassign "u1" from ["ua2"]
//! associate "ua1" and "oa1" with ["read", "write"]
//! set resource operations ["read", "write"]
//! create obligation "o1" { ... }
//! create operation "op1" { ... }
//! create routine "r1" { ... }
//! delete node "u1"
//! ```
//!
//! Bodies of obligations, operations and routines are not interpreted, the complete text of the
//! declaration is kept as its source. Lines starting with `#` are comments, `;` may be used to
//! separate statements.
use std::iter::Peekable;
use std::str::CharIndices;

use ngac_core::pml::DeleteTarget;
use ngac_core::{AccessRightSet, NodeKind, PmlCompiler, PolicyError, Statement};

/// Parses the PML dialect described in the module documentation.
#[derive(Clone, Debug, Default)]
pub struct PmlParser;

impl PmlParser {
    pub fn new() -> Self {
        Self
    }
}

impl PmlCompiler for PmlParser {
    fn compile(&self, source: &str) -> Result<Vec<Statement>, PolicyError> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(source, tokens).parse()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum TokenKind {
    Ident(String),
    Str(String),
    LBracket,
    RBracket,
    Comma,
    Block,
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, PolicyError> {
        let mut tokens = Vec::new();

        while let Some((start, c)) = self.chars.next() {
            let kind = match c {
                c if c.is_whitespace() || c == ';' => continue,
                '#' => {
                    for (_, c) in self.chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                '"' => TokenKind::Str(self.string(start)?),
                '{' => {
                    self.block(start)?;
                    TokenKind::Block
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut ident = String::from(c);
                    while let Some((_, c)) = self
                        .chars
                        .next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
                    {
                        ident.push(c);
                    }
                    TokenKind::Ident(ident)
                }
                c => return Err(PolicyError::pml(start, format!("unexpected character '{c}'"))),
            };

            let end = self.position();
            tokens.push(Token { kind, start, end });
        }

        Ok(tokens)
    }

    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(index, _)| *index)
            .unwrap_or(self.source.len())
    }

    fn string(&mut self, start: usize) -> Result<String, PolicyError> {
        let mut value = String::new();

        for (_, c) in self.chars.by_ref() {
            if c == '"' {
                return Ok(value);
            }
            value.push(c);
        }

        Err(PolicyError::pml(start, "unterminated string"))
    }

    /// Skips over a brace-delimited body, respecting nested braces and strings.
    fn block(&mut self, start: usize) -> Result<(), PolicyError> {
        let mut depth = 1;

        while let Some((position, c)) = self.chars.next() {
            match c {
                '"' => {
                    self.string(position)?;
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => (),
            }
        }

        Err(PolicyError::pml(start, "unterminated block"))
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    cursor: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            cursor: 0,
        }
    }

    fn parse(mut self) -> Result<Vec<Statement>, PolicyError> {
        let mut statements = Vec::new();

        while self.cursor < self.tokens.len() {
            statements.push(self.statement()?);
        }

        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement, PolicyError> {
        let (keyword, start) = self.ident()?;

        match keyword.as_str() {
            "create" => self.create(start),
            "assign" => {
                let ascendant = self.string()?;
                self.keyword("to")?;
                let descendants = self.list()?;
                Ok(Statement::Assign {
                    ascendant,
                    descendants,
                })
            }
            "deassign" => {
                let ascendant = self.string()?;
                self.keyword("from")?;
                let descendants = self.list()?;
                Ok(Statement::Deassign {
                    ascendant,
                    descendants,
                })
            }
            "associate" => {
                let ua = self.string()?;
                self.keyword("and")?;
                let target = self.string()?;
                self.keyword("with")?;
                let access_rights: AccessRightSet = self.list()?.into_iter().collect();
                Ok(Statement::Associate {
                    ua,
                    target,
                    access_rights,
                })
            }
            "set" => {
                self.keyword("resource")?;
                self.keyword("operations")?;
                let operations: AccessRightSet = self.list()?.into_iter().collect();
                Ok(Statement::SetResourceOperations { operations })
            }
            "delete" => {
                let (target, position) = self.ident()?;
                let target = match target.as_str() {
                    "node" => DeleteTarget::Node,
                    "prohibition" => DeleteTarget::Prohibition,
                    "obligation" => DeleteTarget::Obligation,
                    "operation" => DeleteTarget::Operation,
                    "routine" => DeleteTarget::Routine,
                    other => {
                        return Err(PolicyError::pml(
                            position,
                            format!("can not delete \"{other}\""),
                        ));
                    }
                };
                let name = self.string()?;
                Ok(Statement::Delete { target, name })
            }
            other => Err(PolicyError::pml(
                start,
                format!("unknown statement \"{other}\""),
            )),
        }
    }

    fn create(&mut self, start: usize) -> Result<Statement, PolicyError> {
        let (what, position) = self.ident()?;

        match what.as_str() {
            "obligation" | "operation" | "routine" => {
                let name = self.string()?;
                let end = self.block()?;
                let source = self.source[start..end].to_owned();

                Ok(match what.as_str() {
                    "obligation" => Statement::CreateObligation { name, source },
                    "operation" => Statement::CreateOperation { name, source },
                    _ => Statement::CreateRoutine { name, source },
                })
            }
            keyword => match NodeKind::from_keyword(keyword) {
                Some(NodeKind::PolicyClass) => {
                    let name = self.string()?;
                    Ok(Statement::CreatePolicyClass { name })
                }
                Some(kind) => {
                    let name = self.string()?;
                    self.keyword("in")?;
                    let descendants = self.list()?;
                    Ok(Statement::CreateNode {
                        kind,
                        name,
                        descendants,
                    })
                }
                None => Err(PolicyError::pml(
                    position,
                    format!("can not create \"{keyword}\""),
                )),
            },
        }
    }

    fn next(&mut self) -> Result<Token, PolicyError> {
        let token = self
            .tokens
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| PolicyError::pml(self.source.len(), "unexpected end of input"))?;
        self.cursor += 1;
        Ok(token)
    }

    fn ident(&mut self) -> Result<(String, usize), PolicyError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Ident(ident) => Ok((ident, token.start)),
            _ => Err(PolicyError::pml(token.start, "expected keyword")),
        }
    }

    fn keyword(&mut self, expected: &str) -> Result<(), PolicyError> {
        let (ident, position) = self.ident()?;
        if ident != expected {
            return Err(PolicyError::pml(
                position,
                format!("expected \"{expected}\", found \"{ident}\""),
            ));
        }
        Ok(())
    }

    fn string(&mut self) -> Result<String, PolicyError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Str(value) => Ok(value),
            _ => Err(PolicyError::pml(token.start, "expected string")),
        }
    }

    fn block(&mut self) -> Result<usize, PolicyError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Block => Ok(token.end),
            _ => Err(PolicyError::pml(token.start, "expected block")),
        }
    }

    fn list(&mut self) -> Result<Vec<String>, PolicyError> {
        let token = self.next()?;
        if token.kind != TokenKind::LBracket {
            return Err(PolicyError::pml(token.start, "expected '['"));
        }

        let mut items = Vec::new();
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::RBracket => return Ok(items),
                TokenKind::Str(value) => items.push(value),
                _ => return Err(PolicyError::pml(token.start, "expected string or ']'")),
            }

            let token = self.next()?;
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::RBracket => return Ok(items),
                _ => return Err(PolicyError::pml(token.start, "expected ',' or ']'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ngac_core::pml::DeleteTarget;
    use ngac_core::{NodeKind, PmlCompiler, PolicyError, Statement, StatementKind};

    use super::PmlParser;

    #[test]
    fn graph_statements() {
        let source = r#"
            # Build a small graph.
            create pc "pc1"
            create ua "ua1" in ["pc1"]; create oa "oa1" in ["pc1"]
            assign "ua1" to []
            associate "ua1" and "oa1" with ["read", "write"]
            set resource operations ["read", "write"]
            delete node "ua1"
        "#;

        let statements = PmlParser::new().compile(source).unwrap();
        assert_eq!(statements.len(), 7);
        assert_eq!(
            statements[1],
            Statement::CreateNode {
                kind: NodeKind::UserAttribute,
                name: "ua1".into(),
                descendants: vec!["pc1".into()],
            }
        );
        assert_eq!(statements[3].kind(), StatementKind::Assign);
        assert_eq!(
            statements[6],
            Statement::Delete {
                target: DeleteTarget::Node,
                name: "ua1".into()
            }
        );
    }

    #[test]
    fn declaration_source_is_kept() {
        let declaration = r#"create obligation "audit" { when any user performs "read" { log("}") } }"#;
        let source = format!("create pc \"pc1\"\n{declaration}\n");

        let statements = PmlParser::new().compile(&source).unwrap();
        assert_eq!(
            statements[1],
            Statement::CreateObligation {
                name: "audit".into(),
                source: declaration.into(),
            }
        );

        // Compiling the kept source again yields the same statement.
        let again = PmlParser::new().compile(declaration).unwrap();
        assert_eq!(again, vec![statements[1].clone()]);
    }

    #[test]
    fn syntax_errors() {
        let parser = PmlParser::new();

        assert_matches!(
            parser.compile("create pc pc1"),
            Err(PolicyError::Pml { position: 10, .. })
        );
        assert_matches!(
            parser.compile("create ua \"ua1\" in [\"pc1\""),
            Err(PolicyError::Pml { .. })
        );
        assert_matches!(
            parser.compile("create routine \"r\" { "),
            Err(PolicyError::Pml { position: 19, .. })
        );
        assert_matches!(parser.compile("grant \"u1\""), Err(PolicyError::Pml { .. }));
        assert!(parser.compile("").unwrap().is_empty());
    }
}
