use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use ndarray::prelude::*;


/// Marks an expression whose names resolve to constants only.  Element attributes are
/// reached with `df.name` or `df['name']`.
pub const FREE_FORM_PREFIX: char = '@';

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Str(String),
    Op(&'static str),
}

// longest operators first, so that "**" is not read as two "*"
static OPERATORS: [&str; 20] = ["**", "<=", ">=", "==", "!=", "*", "/", "%", "+", "-", "<", ">",
                                "&", "|", "~", "(", ")", "[", "]", ","];

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = vec![];
    let mut chars: Peekable<Chars> = text.chars().peekable();
    while let Some(&cc) = chars.peek() {
        if cc.is_whitespace() {
            chars.next();
        } else if cc.is_ascii_digit() || cc == '.' {
            let mut number = String::new();
            while let Some(&dd) = chars.peek() {
                let is_exponent_sign = (dd == '-' || dd == '+') &&
                    (number.ends_with('e') || number.ends_with('E'));
                if dd.is_ascii_digit() || dd == '.' || dd == 'e' || dd == 'E' || is_exponent_sign {
                    number.push(dd);
                    chars.next();
                } else {
                    break;
                }
            }
            if number == "." {
                tokens.push(Token::Op("."));
            } else {
                let value = number.parse::<f64>().map_err(|_|
                    format!("invalid number '{}'", number))?;
                tokens.push(Token::Number(value));
            }
        } else if cc.is_alphabetic() || cc == '_' {
            let mut ident = String::new();
            while let Some(&dd) = chars.peek() {
                if dd.is_alphanumeric() || dd == '_' {
                    ident.push(dd);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else if cc == '\'' || cc == '"' {
            chars.next();
            let mut string = String::new();
            loop {
                match chars.next() {
                    Some(dd) if dd == cc => break,
                    Some(dd) => string.push(dd),
                    None => return Err(String::from("unterminated string literal")),
                }
            }
            tokens.push(Token::Str(string));
        } else {
            let rest: String = chars.clone().take(2).collect();
            let op: &'static str = OPERATORS.iter().find(|op| rest.starts_with(**op)).copied()
                .ok_or_else(|| format!("unexpected character '{}'", cc))?;
            for _ in 0..op.len() {
                chars.next();
            }
            tokens.push(Token::Op(op));
        }
    }
    return Ok(tokens);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn comparison(op: &str) -> Option<BinaryOp> {
        match op {
            "<" => Some(BinaryOp::Lt),
            "<=" => Some(BinaryOp::Le),
            ">" => Some(BinaryOp::Gt),
            ">=" => Some(BinaryOp::Ge),
            "==" => Some(BinaryOp::Eq),
            "!=" => Some(BinaryOp::Ne),
            _ => None,
        }
    }

    fn apply(&self, aa: f64, bb: f64) -> f64 {
        match self {
            BinaryOp::Add => aa + bb,
            BinaryOp::Sub => aa - bb,
            BinaryOp::Mul => aa * bb,
            BinaryOp::Div => aa / bb,
            // floored modulo, so the result takes the sign of the divisor
            BinaryOp::Mod => aa - bb * (aa / bb).floor(),
            BinaryOp::Pow => aa.powf(bb),
            BinaryOp::Lt => bool_value(aa < bb),
            BinaryOp::Le => bool_value(aa <= bb),
            BinaryOp::Gt => bool_value(aa > bb),
            BinaryOp::Ge => bool_value(aa >= bb),
            BinaryOp::Eq => bool_value(aa == bb),
            BinaryOp::Ne => bool_value(aa != bb),
            BinaryOp::And => bool_value(aa != 0. && bb != 0.),
            BinaryOp::Or => bool_value(aa != 0. || bb != 0.),
        }
    }
}

fn bool_value(flag: bool) -> f64 {
    if flag { 1. } else { 0. }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Abs,
    Exp,
    Log,
    Sqrt,
    Min,
    Max,
    Where,
}

impl Function {
    fn from_name(name: &str) -> Option<Function> {
        match name {
            "abs" | "absolute" => Some(Function::Abs),
            "exp" => Some(Function::Exp),
            "log" => Some(Function::Log),
            "sqrt" => Some(Function::Sqrt),
            "min" | "minimum" => Some(Function::Min),
            "max" | "maximum" => Some(Function::Max),
            "where" => Some(Function::Where),
            _ => None,
        }
    }

    fn check_arity(&self, name: &str, num_args: usize) -> Result<(), String> {
        let ok = match self {
            Function::Abs | Function::Exp | Function::Log | Function::Sqrt => num_args == 1,
            Function::Min | Function::Max => num_args >= 2,
            Function::Where => num_args == 3,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("wrong number of arguments ({}) to '{}'", num_args, name))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Value(f64),
    Attribute(usize),
    Negate(Box<Node>),
    Not(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

impl Node {
    fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
        Node::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn evaluate(&self, row: &ArrayView1<f64>) -> f64 {
        match self {
            Node::Value(value) => *value,
            Node::Attribute(idx) => row[*idx],
            Node::Negate(inner) => -inner.evaluate(row),
            Node::Not(inner) => bool_value(inner.evaluate(row) == 0.),
            Node::Binary(op, lhs, rhs) => op.apply(lhs.evaluate(row), rhs.evaluate(row)),
            Node::Call(func, args) => {
                let first = args[0].evaluate(row);
                match func {
                    Function::Abs => first.abs(),
                    Function::Exp => first.exp(),
                    Function::Log => first.ln(),
                    Function::Sqrt => first.sqrt(),
                    Function::Min => args[1..].iter().fold(first, |acc, arg|
                        acc.min(arg.evaluate(row))),
                    Function::Max => args[1..].iter().fold(first, |acc, arg|
                        acc.max(arg.evaluate(row))),
                    Function::Where => if first != 0. {
                        args[1].evaluate(row)
                    } else {
                        args[2].evaluate(row)
                    },
                }
            }
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    attributes: &'a HashMap<String, usize>,
    constants: &'a HashMap<String, f64>,
    free_form: bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        return token;
    }

    fn peek_op(&self, op: &str) -> bool {
        match self.peek() {
            Some(Token::Op(oo)) => *oo == op,
            _ => false,
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(ident)) => ident == keyword,
            _ => false,
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), String> {
        match self.next() {
            Some(Token::Op(oo)) if oo == op => Ok(()),
            Some(token) => Err(format!("expected '{}', found {:?}", op, token)),
            None => Err(format!("expected '{}', found end of expression", op)),
        }
    }

    fn parse_or(&mut self) -> Result<Node, String> {
        let mut lhs = self.parse_and()?;
        while self.peek_op("|") || self.peek_keyword("or") {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Node::binary(BinaryOp::Or, lhs, rhs);
        }
        return Ok(lhs);
    }

    fn parse_and(&mut self) -> Result<Node, String> {
        let mut lhs = self.parse_not()?;
        while self.peek_op("&") || self.peek_keyword("and") {
            self.next();
            let rhs = self.parse_not()?;
            lhs = Node::binary(BinaryOp::And, lhs, rhs);
        }
        return Ok(lhs);
    }

    fn parse_not(&mut self) -> Result<Node, String> {
        if self.peek_op("~") || self.peek_keyword("not") {
            self.next();
            let inner = self.parse_not()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        return self.parse_comparison();
    }

    /// Chained comparisons read as in python: `a < b < c` is `a < b and b < c`.
    fn parse_comparison(&mut self) -> Result<Node, String> {
        let mut lhs = self.parse_sum()?;
        let mut result: Option<Node> = None;
        loop {
            let op = match self.peek() {
                Some(Token::Op(oo)) => BinaryOp::comparison(oo),
                _ => None,
            };
            let op = match op {
                Some(op) => op,
                None => break,
            };
            self.next();
            let rhs = self.parse_sum()?;
            let comparison = Node::binary(op, lhs, rhs.clone());
            result = Some(match result {
                Some(prev) => Node::binary(BinaryOp::And, prev, comparison),
                None => comparison,
            });
            lhs = rhs;
        }
        return Ok(result.unwrap_or(lhs));
    }

    fn parse_sum(&mut self) -> Result<Node, String> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.peek_op("+") {
                BinaryOp::Add
            } else if self.peek_op("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            self.next();
            let rhs = self.parse_term()?;
            lhs = Node::binary(op, lhs, rhs);
        }
        return Ok(lhs);
    }

    fn parse_term(&mut self) -> Result<Node, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.peek_op("*") {
                BinaryOp::Mul
            } else if self.peek_op("/") {
                BinaryOp::Div
            } else if self.peek_op("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            self.next();
            let rhs = self.parse_unary()?;
            lhs = Node::binary(op, lhs, rhs);
        }
        return Ok(lhs);
    }

    fn parse_unary(&mut self) -> Result<Node, String> {
        if self.peek_op("-") {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Node::Negate(Box::new(inner)));
        }
        if self.peek_op("+") {
            self.next();
            return self.parse_unary();
        }
        return self.parse_power();
    }

    fn parse_power(&mut self) -> Result<Node, String> {
        let base = self.parse_primary()?;
        if self.peek_op("**") {
            self.next();
            // right associative, and binds tighter than a unary minus on its left
            let exponent = self.parse_unary()?;
            return Ok(Node::binary(BinaryOp::Pow, base, exponent));
        }
        return Ok(base);
    }

    fn parse_primary(&mut self) -> Result<Node, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Node::Value(value)),
            Some(Token::Op("(")) => {
                let inner = self.parse_or()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_name(name),
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err(String::from("unexpected end of expression")),
        }
    }

    fn parse_name(&mut self, name: String) -> Result<Node, String> {
        if self.peek_op(".") {
            self.next();
            let member = match self.next() {
                Some(Token::Ident(member)) => member,
                _ => return Err(format!("expected a name after '{}.'", name)),
            };
            return match name.as_str() {
                "df" => self.resolve_attribute(&member),
                "np" | "numpy" => self.parse_call(&member),
                _ => Err(format!("unknown namespace '{}'", name)),
            };
        }
        if self.peek_op("[") {
            if name != "df" {
                return Err(format!("cannot index into '{}'", name));
            }
            self.next();
            let member = match self.next() {
                Some(Token::Str(member)) => member,
                _ => return Err(String::from("expected a quoted attribute name in df[...]")),
            };
            self.expect_op("]")?;
            return self.resolve_attribute(&member);
        }
        if self.peek_op("(") {
            return self.parse_call(&name);
        }

        match name.as_str() {
            "True" | "true" => return Ok(Node::Value(1.)),
            "False" | "false" => return Ok(Node::Value(0.)),
            _ => (),
        }
        if !self.free_form {
            if let Some(idx) = self.attributes.get(&name) {
                return Ok(Node::Attribute(*idx));
            }
        }
        match self.constants.get(&name) {
            Some(value) => Ok(Node::Value(*value)),
            None if self.free_form => Err(format!("unknown constant '{}'", name)),
            None => Err(format!("unknown attribute or constant '{}'", name)),
        }
    }

    fn resolve_attribute(&self, name: &str) -> Result<Node, String> {
        match self.attributes.get(name) {
            Some(idx) => Ok(Node::Attribute(*idx)),
            None => Err(format!("unknown attribute '{}'", name)),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Node, String> {
        let func = Function::from_name(name).ok_or_else(||
            format!("unsupported function '{}'", name))?;
        self.expect_op("(")?;
        let mut args = vec![];
        if !self.peek_op(")") {
            loop {
                args.push(self.parse_or()?);
                if self.peek_op(",") {
                    self.next();
                } else {
                    break;
                }
            }
        }
        self.expect_op(")")?;
        func.check_arity(name, args.len())?;
        return Ok(Node::Call(func, args));
    }
}

/// A utility expression compiled against the attribute columns of one element table.
#[derive(Debug, Clone)]
pub struct Expression {
    text: String,
    root: Node,
}

impl Expression {
    /// Parses `text` and resolves its names.  `attributes` maps attribute names to the
    /// column they occupy in the rows later passed to `evaluate`.
    pub fn compile(text: &str, attributes: &HashMap<String, usize>,
                   constants: &HashMap<String, f64>) -> Result<Expression, String> {
        let trimmed = text.trim();
        let (free_form, body) = match trimmed.strip_prefix(FREE_FORM_PREFIX) {
            Some(body) => (true, body),
            None => (false, trimmed),
        };
        let tokens = tokenize(body)?;
        if tokens.is_empty() {
            return Err(String::from("empty expression"));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            attributes,
            constants,
            free_form,
        };
        let root = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected trailing {:?}", token));
        }
        return Ok(Expression {
            text: String::from(text),
            root,
        });
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn evaluate(&self, row: ArrayView1<f64>) -> f64 {
        self.root.evaluate(&row)
    }
}
