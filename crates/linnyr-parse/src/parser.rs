//! Recursive-descent parser turning a Linny-R expression into an [`ASTNode`]
//! tree. The grammar is ordinary infix arithmetic/comparison/logic plus two
//! Linny-R-specific productions: variable references (`[...]`, scanned whole
//! by the tokenizer and structured here into a [`ReferenceSpec`]) and
//! statistics operators (`SUM$`, `MEAN$`, ...) applied either to a single
//! wildcard reference (`SUM$[process ??|L]`) or an explicit argument list
//! (`SUM$(a, b, c)`).
//!
//! Precedence, low to high: `OR` < `AND` < unary `NOT` < comparison <
//! additive < multiplicative < unary `+`/`-` < `^` (right-associative).

use std::fmt::{self, Display};

use crate::tokenizer::{Token, TokenType, Tokenizer};
use crate::types::ParsingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Not,
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neg => "-",
            Self::Pos => "+",
            Self::Not => "NOT ",
        })
    }
}

/// One of the six aggregate operators applied over a wildcard-matched group
/// of entities (`min$`, `max$`, `sum$`, `mean$`, `sd$`, `N$`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticOp {
    Min,
    Max,
    Sum,
    Mean,
    Sd,
    Count,
}

impl StatisticOp {
    pub fn parse_name(ident: &str) -> Option<Self> {
        let stripped = ident.strip_suffix('$')?;
        Some(match stripped.to_ascii_uppercase().as_str() {
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            "SUM" => Self::Sum,
            "MEAN" => Self::Mean,
            "SD" => Self::Sd,
            "N" => Self::Count,
            _ => return None,
        })
    }
}

impl Display for StatisticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "MIN$",
            Self::Max => "MAX$",
            Self::Sum => "SUM$",
            Self::Mean => "MEAN$",
            Self::Sd => "SD$",
            Self::Count => "N$",
        })
    }
}

/// A parsed `[...]` variable reference.
///
/// `name` holds the entity (or, when `is_method` is set, the method)
/// selector text verbatim, wildcard characters (`?`, `*`, `??`) included —
/// resolving wildcards against the live entity store is `linnyr-model`'s
/// job, not the parser's.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSpec {
    /// The `{prefix}` context brace, when present.
    pub context_prefix: Option<String>,
    /// A leading `!`: reference the entity itself rather than its evaluated
    /// value (used to bind a method's bound-to entity).
    pub by_reference: bool,
    /// A leading `:` on the name: this is a method selector, not an entity
    /// name, and must be bound to a prefix entity before it can evaluate.
    pub is_method: bool,
    pub name: String,
    pub attribute: Option<String>,
    pub offset: Option<Box<ASTNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ASTNodeType {
    Number(f64),
    StringLiteral(String),
    Reference(ReferenceSpec),
    UnaryOp {
        op: UnaryOperator,
        operand: Box<ASTNode>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    StatisticCall {
        op: StatisticOp,
        args: Vec<ASTNode>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ASTNode {
    pub node_type: ASTNodeType,
    pub source_offset: usize,
}

impl ASTNode {
    fn new(node_type: ASTNodeType, source_offset: usize) -> Self {
        Self {
            node_type,
            source_offset,
        }
    }

    /// Walks the tree collecting every referenced entity name (not method
    /// names, which resolve against a binding prefix rather than the store).
    /// Used by the evaluator to build its static dependency graph ahead of
    /// the first pass of cycle detection.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a ReferenceSpec>) {
        match &self.node_type {
            ASTNodeType::Reference(r) => {
                out.push(r);
                if let Some(offset) = &r.offset {
                    offset.collect_references(out);
                }
            }
            ASTNodeType::UnaryOp { operand, .. } => operand.collect_references(out),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            ASTNodeType::StatisticCall { args, .. } => {
                for a in args {
                    a.collect_references(out);
                }
            }
            ASTNodeType::Number(_) | ASTNodeType::StringLiteral(_) => {}
        }
    }
}

impl Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_type {
            ASTNodeType::Number(n) => write!(f, "{n}"),
            ASTNodeType::StringLiteral(s) => write!(f, "\"{s}\""),
            ASTNodeType::Reference(r) => {
                write!(f, "[")?;
                if let Some(p) = &r.context_prefix {
                    write!(f, "{{{p}}}")?;
                }
                if r.by_reference {
                    write!(f, "!")?;
                }
                if r.is_method {
                    write!(f, ":")?;
                }
                write!(f, "{}", r.name)?;
                if let Some(a) = &r.attribute {
                    write!(f, "|{a}")?;
                }
                if let Some(o) = &r.offset {
                    write!(f, "@{o}")?;
                }
                write!(f, "]")
            }
            ASTNodeType::UnaryOp { op, operand } => write!(f, "{op}{operand}"),
            ASTNodeType::BinaryOp { op, left, right } => write!(f, "({left} {op} {right})"),
            ASTNodeType::StatisticCall { op, args } => {
                write!(f, "{op}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

pub fn parse(source: &str) -> Result<ASTNode, ParsingError> {
    let tokens = Tokenizer::tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn is_ident(&self, text: &str) -> bool {
        self.peek().token_type == TokenType::Ident && self.peek().text.eq_ignore_ascii_case(text)
    }

    fn expect_eof(&self) -> Result<(), ParsingError> {
        if self.peek().token_type == TokenType::Eof {
            Ok(())
        } else {
            Err(ParsingError::TrailingInput {
                offset: self.peek().offset,
            })
        }
    }

    fn expect(&mut self, tt: TokenType, expected: &'static str) -> Result<Token, ParsingError> {
        if self.peek().token_type == tt {
            Ok(self.advance())
        } else {
            Err(ParsingError::UnexpectedToken {
                found: self.peek().text.clone(),
                offset: self.peek().offset,
                expected,
            })
        }
    }

    fn parse_or(&mut self) -> Result<ASTNode, ParsingError> {
        let mut left = self.parse_and()?;
        while self.is_ident("OR") {
            let offset = self.advance().offset;
            let right = self.parse_and()?;
            left = ASTNode::new(
                ASTNodeType::BinaryOp {
                    op: BinaryOperator::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                offset,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ASTNode, ParsingError> {
        let mut left = self.parse_not()?;
        while self.is_ident("AND") {
            let offset = self.advance().offset;
            let right = self.parse_not()?;
            left = ASTNode::new(
                ASTNodeType::BinaryOp {
                    op: BinaryOperator::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                offset,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ASTNode, ParsingError> {
        if self.is_ident("NOT") {
            let offset = self.advance().offset;
            let operand = self.parse_not()?;
            return Ok(ASTNode::new(
                ASTNodeType::UnaryOp {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                },
                offset,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<ASTNode, ParsingError> {
        let left = self.parse_additive()?;
        let op = match self.peek().token_type {
            TokenType::Eq => BinaryOperator::Eq,
            TokenType::Ne => BinaryOperator::Ne,
            TokenType::Lt => BinaryOperator::Lt,
            TokenType::Le => BinaryOperator::Le,
            TokenType::Gt => BinaryOperator::Gt,
            TokenType::Ge => BinaryOperator::Ge,
            _ => return Ok(left),
        };
        let offset = self.advance().offset;
        let right = self.parse_additive()?;
        Ok(ASTNode::new(
            ASTNodeType::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            offset,
        ))
    }

    fn parse_additive(&mut self) -> Result<ASTNode, ParsingError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Plus => BinaryOperator::Add,
                TokenType::Minus => BinaryOperator::Sub,
                _ => break,
            };
            let offset = self.advance().offset;
            let right = self.parse_multiplicative()?;
            left = ASTNode::new(
                ASTNodeType::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                offset,
            );
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<ASTNode, ParsingError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Star => BinaryOperator::Mul,
                TokenType::Slash => BinaryOperator::Div,
                _ => break,
            };
            let offset = self.advance().offset;
            let right = self.parse_unary()?;
            left = ASTNode::new(
                ASTNodeType::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                offset,
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ASTNode, ParsingError> {
        let op = match self.peek().token_type {
            TokenType::Minus => Some(UnaryOperator::Neg),
            TokenType::Plus => Some(UnaryOperator::Pos),
            _ => None,
        };
        if let Some(op) = op {
            let offset = self.advance().offset;
            let operand = self.parse_unary()?;
            return Ok(ASTNode::new(
                ASTNodeType::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                offset,
            ));
        }
        self.parse_power()
    }

    /// `^` is right-associative: `2^3^2` parses as `2^(3^2)`.
    fn parse_power(&mut self) -> Result<ASTNode, ParsingError> {
        let base = self.parse_primary()?;
        if self.peek().token_type == TokenType::Caret {
            let offset = self.advance().offset;
            let exponent = self.parse_unary()?;
            return Ok(ASTNode::new(
                ASTNodeType::BinaryOp {
                    op: BinaryOperator::Pow,
                    left: Box::new(base),
                    right: Box::new(exponent),
                },
                offset,
            ));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<ASTNode, ParsingError> {
        let tok = self.peek().clone();
        match tok.token_type {
            TokenType::Number => {
                self.advance();
                let n: f64 = tok.text.parse().map_err(|_| ParsingError::InvalidNumber {
                    text: tok.text.clone(),
                    offset: tok.offset,
                })?;
                Ok(ASTNode::new(ASTNodeType::Number(n), tok.offset))
            }
            TokenType::String => {
                self.advance();
                Ok(ASTNode::new(ASTNodeType::StringLiteral(tok.text), tok.offset))
            }
            TokenType::Reference => {
                self.advance();
                let spec = parse_reference_body(&tok.text, tok.offset)?;
                Ok(ASTNode::new(ASTNodeType::Reference(spec), tok.offset))
            }
            TokenType::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(TokenType::RParen, "')'")?;
                Ok(inner)
            }
            TokenType::Ident => self.parse_ident_primary(tok),
            _ => Err(ParsingError::UnexpectedToken {
                found: tok.text,
                offset: tok.offset,
                expected: "a number, reference, or '('",
            }),
        }
    }

    fn parse_ident_primary(&mut self, tok: Token) -> Result<ASTNode, ParsingError> {
        if let Some(op) = StatisticOp::parse_name(&tok.text) {
            self.advance();
            if self.peek().token_type == TokenType::LParen {
                self.advance();
                let mut args = Vec::new();
                if self.peek().token_type != TokenType::RParen {
                    loop {
                        args.push(self.parse_or()?);
                        if self.peek().token_type == TokenType::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(TokenType::RParen, "')'")?;
                return Ok(ASTNode::new(
                    ASTNodeType::StatisticCall { op, args },
                    tok.offset,
                ));
            }
            // Sugar: `SUM$[wildcard ref]` aggregates directly over the
            // matched group named by the bracket reference, no parens.
            if self.peek().token_type == TokenType::Reference {
                let ref_tok = self.advance();
                let spec = parse_reference_body(&ref_tok.text, ref_tok.offset)?;
                let arg = ASTNode::new(ASTNodeType::Reference(spec), ref_tok.offset);
                return Ok(ASTNode::new(
                    ASTNodeType::StatisticCall { op, args: vec![arg] },
                    tok.offset,
                ));
            }
            return Err(ParsingError::UnexpectedToken {
                found: self.peek().text.clone(),
                offset: self.peek().offset,
                expected: "'(' or a '[...]' reference after a statistics operator",
            });
        }
        Err(ParsingError::UnexpectedToken {
            found: tok.text,
            offset: tok.offset,
            expected: "a number, reference, statistics operator, or '('",
        })
    }
}

/// Structures the raw text inside `[...]` into a [`ReferenceSpec`]:
/// `{prefix}? !? :?name (|attribute)? (@offset)?`.
fn parse_reference_body(raw: &str, base_offset: usize) -> Result<ReferenceSpec, ParsingError> {
    let mut rest = raw;

    let context_prefix = if rest.starts_with('{') {
        let end = rest.find('}').ok_or_else(|| ParsingError::InvalidReference {
            detail: "unterminated '{' context prefix".into(),
            offset: base_offset,
        })?;
        let prefix = rest[1..end].to_string();
        rest = &rest[end + 1..];
        Some(prefix)
    } else {
        None
    };

    let by_reference = if let Some(stripped) = rest.strip_prefix('!') {
        rest = stripped;
        true
    } else {
        false
    };

    // Split off `@offset` first, then `|attribute`, since neither an entity
    // name nor an attribute code may itself contain `@` or `|`.
    let (head, offset_text) = match rest.find('@') {
        Some(idx) => (&rest[..idx], Some(rest[idx + 1..].trim())),
        None => (rest, None),
    };
    let (name_part, attribute) = match head.find('|') {
        Some(idx) => (
            &head[..idx],
            Some(head[idx + 1..].trim().to_string()).filter(|s| !s.is_empty()),
        ),
        None => (head, None),
    };

    let name_part = name_part.trim();
    let (is_method, name) = match name_part.strip_prefix(':') {
        Some(rest) => (true, rest.trim().to_string()),
        None => (false, name_part.to_string()),
    };

    if name.is_empty() {
        return Err(ParsingError::InvalidReference {
            detail: "empty entity/method name".into(),
            offset: base_offset,
        });
    }

    let offset = match offset_text {
        Some(text) if !text.is_empty() => Some(Box::new(parse(text).map_err(|e| {
            ParsingError::InvalidReference {
                detail: format!("bad offset expression '{text}': {e}"),
                offset: base_offset,
            }
        })?)),
        _ => None,
    };

    Ok(ReferenceSpec {
        context_prefix,
        by_reference,
        is_method,
        name,
        attribute,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> ASTNode {
        ASTNode::new(ASTNodeType::Number(n), 0)
    }

    #[test]
    fn precedence_respects_multiplication_over_addition() {
        let ast = parse("1 + 2 * 3").unwrap();
        match ast.node_type {
            ASTNodeType::BinaryOp {
                op: BinaryOperator::Add,
                left,
                right,
            } => {
                assert_eq!(*left, num(1.0));
                assert!(matches!(
                    right.node_type,
                    ASTNodeType::BinaryOp {
                        op: BinaryOperator::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let ast = parse("2^3^2").unwrap();
        if let ASTNodeType::BinaryOp {
            op: BinaryOperator::Pow,
            right,
            ..
        } = ast.node_type
        {
            assert!(matches!(
                right.node_type,
                ASTNodeType::BinaryOp {
                    op: BinaryOperator::Pow,
                    ..
                }
            ));
        } else {
            panic!("expected power node");
        }
    }

    #[test]
    fn parses_plain_reference() {
        let ast = parse("[process A|L@-1]").unwrap();
        if let ASTNodeType::Reference(r) = ast.node_type {
            assert_eq!(r.name, "process A");
            assert_eq!(r.attribute.as_deref(), Some("L"));
            assert!(r.offset.is_some());
            assert!(!r.by_reference);
            assert!(!r.is_method);
        } else {
            panic!("expected reference node");
        }
    }

    #[test]
    fn parses_prefixed_by_reference_method() {
        let ast = parse("[{P1}!:revenue]").unwrap();
        if let ASTNodeType::Reference(r) = ast.node_type {
            assert_eq!(r.context_prefix.as_deref(), Some("P1"));
            assert!(r.by_reference);
            assert!(r.is_method);
            assert_eq!(r.name, "revenue");
        } else {
            panic!("expected reference node");
        }
    }

    #[test]
    fn parses_wildcard_statistic_sugar() {
        let ast = parse("SUM$[product ??|L]").unwrap();
        if let ASTNodeType::StatisticCall { op, args } = ast.node_type {
            assert_eq!(op, StatisticOp::Sum);
            assert_eq!(args.len(), 1);
        } else {
            panic!("expected statistic call node");
        }
    }

    #[test]
    fn parses_statistic_call_with_arg_list() {
        let ast = parse("MEAN$([a], [b], [c])").unwrap();
        assert!(matches!(
            ast.node_type,
            ASTNodeType::StatisticCall {
                op: StatisticOp::Mean,
                ..
            }
        ));
    }

    #[test]
    fn logical_precedence_and_binds_tighter_than_or() {
        let ast = parse("1 AND 2 OR 3").unwrap();
        assert!(matches!(
            ast.node_type,
            ASTNodeType::BinaryOp {
                op: BinaryOperator::Or,
                ..
            }
        ));
    }

    #[test]
    fn collects_nested_references_including_offset_expression() {
        let ast = parse("[a] + [b@[c]]").unwrap();
        let mut refs = Vec::new();
        ast.collect_references(&mut refs);
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse("1 + 2)").is_err());
    }
}
