//! Expression language for alert rules.
//!
//! A deliberately small, deterministic, side-effect-free language:
//! numbers, strings, booleans, field identifiers, comparison operators
//! (`> >= < <= == !=`), boolean `&& || !` and parentheses. Evaluation is
//! strict about types — comparing a number to a string is an error, not a
//! coercion.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Supplies field values during evaluation.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<Value>;
}

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown field {0}")]
    UnknownField(String),
    #[error("type mismatch: cannot apply {op} to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("operand of {0} must be a boolean")]
    NotBoolean(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Gt,
    Ge,
    Lt,
    Le,
    EqEq,
    Ne,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::EqEq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn lex(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar('=', i));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar('&', i));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar('|', i));
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] as char != quote {
                    j += 1;
                }
                if j == bytes.len() {
                    return Err(ExprError::UnterminatedString);
                }
                tokens.push(Token::Str(input[start..j].to_string()));
                i = j + 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut j = i;
                while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b'.') {
                    j += 1;
                }
                let text = &input[start..j];
                let num = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedToken(text.to_string()))?;
                tokens.push(Token::Num(num));
                i = j;
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                let mut j = i;
                while j < bytes.len()
                    && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_')
                {
                    j += 1;
                }
                let ident = &input[start..j];
                tokens.push(match ident {
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(ident.to_string()),
                });
                i = j;
            }
            other => return Err(ExprError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    Str(String),
    Bool(bool),
    Field(String),
    Not(Box<Node>),
    Cmp(CmpOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CmpOp {
    fn name(self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(ExprError::UnexpectedToken(found.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    // or := and ("||" and)*
    fn parse_or(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // and := cmp ("&&" cmp)*
    fn parse_and(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_cmp()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.parse_cmp()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // cmp := unary (op unary)?
    fn parse_cmp(&mut self) -> Result<Node, ExprError> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.parse_unary()?;
        Ok(Node::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_unary(&mut self) -> Result<Node, ExprError> {
        match self.next() {
            Some(Token::Not) => Ok(Node::Not(Box::new(self.parse_unary()?))),
            Some(Token::Num(n)) => Ok(Node::Num(n)),
            Some(Token::Str(s)) => Ok(Node::Str(s)),
            Some(Token::True) => Ok(Node::Bool(true)),
            Some(Token::False) => Ok(Node::Bool(false)),
            Some(Token::Ident(name)) => Ok(Node::Field(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(other) => Err(ExprError::UnexpectedToken(other.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// A parsed expression, ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    root: Node,
}

pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(ExprError::UnexpectedEnd);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.parse_or()?;
    if let Some(trailing) = parser.peek() {
        return Err(ExprError::UnexpectedToken(trailing.to_string()));
    }
    Ok(Expr { root })
}

impl Expr {
    pub fn eval(&self, source: &dyn FieldSource) -> Result<Value, ExprError> {
        eval_node(&self.root, source)
    }

    /// Evaluate and require a boolean result, as alert rules do.
    pub fn eval_bool(&self, source: &dyn FieldSource) -> Result<bool, ExprError> {
        match self.eval(source)? {
            Value::Bool(b) => Ok(b),
            _ => Err(ExprError::NotBoolean("rule expression")),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Num(_) => "number",
        Value::Str(_) => "string",
        Value::Bool(_) => "boolean",
    }
}

fn eval_node(node: &Node, source: &dyn FieldSource) -> Result<Value, ExprError> {
    match node {
        Node::Num(n) => Ok(Value::Num(*n)),
        Node::Str(s) => Ok(Value::Str(s.clone())),
        Node::Bool(b) => Ok(Value::Bool(*b)),
        Node::Field(name) => source
            .field(name)
            .ok_or_else(|| ExprError::UnknownField(name.clone())),
        Node::Not(inner) => match eval_node(inner, source)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(ExprError::NotBoolean("!")),
        },
        Node::And(lhs, rhs) => {
            match eval_node(lhs, source)? {
                // Short-circuit, but the right side must still be valid
                // when reached.
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => match eval_node(rhs, source)? {
                    Value::Bool(b) => Ok(Value::Bool(b)),
                    _ => Err(ExprError::NotBoolean("&&")),
                },
                _ => Err(ExprError::NotBoolean("&&")),
            }
        }
        Node::Or(lhs, rhs) => match eval_node(lhs, source)? {
            Value::Bool(true) => Ok(Value::Bool(true)),
            Value::Bool(false) => match eval_node(rhs, source)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                _ => Err(ExprError::NotBoolean("||")),
            },
            _ => Err(ExprError::NotBoolean("||")),
        },
        Node::Cmp(op, lhs, rhs) => {
            let lhs = eval_node(lhs, source)?;
            let rhs = eval_node(rhs, source)?;
            compare(*op, &lhs, &rhs)
        }
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let mismatch = || ExprError::TypeMismatch {
        op: op.name(),
        lhs: type_name(lhs),
        rhs: type_name(rhs),
    };
    let result = match (lhs, rhs) {
        (Value::Num(a), Value::Num(b)) => match op {
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
        },
        (Value::Str(a), Value::Str(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            _ => return Err(mismatch()),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            _ => return Err(mismatch()),
        },
        _ => return Err(mismatch()),
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Fields(HashMap<&'static str, Value>);

    impl FieldSource for Fields {
        fn field(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }
    }

    fn fields() -> Fields {
        Fields(HashMap::from([
            ("CPU", Value::Num(95.0)),
            ("RAMUsedPct", Value::Num(40.5)),
            ("ArrayState", Value::Str("STARTED".into())),
            ("ParityValid", Value::Bool(true)),
            ("ContainerCount", Value::Num(12.0)),
        ]))
    }

    #[test]
    fn test_numeric_comparisons() {
        let f = fields();
        for (expr, expected) in [
            ("CPU > 90", true),
            ("CPU >= 95", true),
            ("CPU < 90", false),
            ("CPU <= 95", true),
            ("CPU == 95", true),
            ("CPU != 95", false),
        ] {
            assert_eq!(
                parse(expr).unwrap().eval_bool(&f).unwrap(),
                expected,
                "{expr}"
            );
        }
    }

    #[test]
    fn test_string_and_bool_equality() {
        let f = fields();
        assert!(parse("ArrayState == 'STARTED'").unwrap().eval_bool(&f).unwrap());
        assert!(parse("ArrayState != \"STOPPED\"").unwrap().eval_bool(&f).unwrap());
        assert!(parse("ParityValid == true").unwrap().eval_bool(&f).unwrap());
        assert!(parse("!ParityValid == false").unwrap().eval_bool(&f).unwrap());
    }

    #[test]
    fn test_boolean_connectives_and_precedence() {
        let f = fields();
        assert!(parse("CPU > 90 && RAMUsedPct < 50").unwrap().eval_bool(&f).unwrap());
        assert!(parse("CPU > 99 || ContainerCount >= 12").unwrap().eval_bool(&f).unwrap());
        // && binds tighter than ||.
        assert!(parse("CPU > 99 && CPU > 90 || ParityValid")
            .unwrap()
            .eval_bool(&f)
            .unwrap());
        assert!(!parse("(CPU > 99 || CPU > 90) && !ParityValid")
            .unwrap()
            .eval_bool(&f)
            .unwrap());
    }

    #[test]
    fn test_unknown_field_is_error() {
        let f = fields();
        assert_eq!(
            parse("Bogus > 1").unwrap().eval_bool(&f),
            Err(ExprError::UnknownField("Bogus".into()))
        );
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let f = fields();
        assert!(matches!(
            parse("ArrayState > 5").unwrap().eval_bool(&f),
            Err(ExprError::TypeMismatch { .. })
        ));
        assert!(matches!(
            parse("CPU == 'busy'").unwrap().eval_bool(&f),
            Err(ExprError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_boolean_result_rejected() {
        let f = fields();
        assert!(matches!(
            parse("CPU").unwrap().eval_bool(&f),
            Err(ExprError::NotBoolean(_))
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("CPU >"), Err(ExprError::UnexpectedEnd)));
        assert!(matches!(parse(""), Err(ExprError::UnexpectedEnd)));
        assert!(matches!(parse("CPU > 90)"), Err(ExprError::UnexpectedToken(_))));
        assert!(matches!(parse("(CPU > 90"), Err(ExprError::UnexpectedEnd)));
        assert!(matches!(parse("CPU # 90"), Err(ExprError::UnexpectedChar('#', 4))));
        assert!(matches!(parse("'open"), Err(ExprError::UnterminatedString)));
        assert!(matches!(parse("CPU = 90"), Err(ExprError::UnexpectedChar('=', 4))));
    }

    #[test]
    fn test_short_circuit_skips_rhs_field_lookup() {
        let f = fields();
        // Bogus is never looked up when the left side decides.
        assert!(!parse("CPU > 99 && Bogus > 1").unwrap().eval_bool(&f).unwrap());
        assert!(parse("CPU > 90 || Bogus > 1").unwrap().eval_bool(&f).unwrap());
    }
}
