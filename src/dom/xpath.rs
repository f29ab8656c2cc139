//! XPath location paths evaluated directly over a `scraper` tree.
//!
//! Covers what test suites tend to write: absolute and relative paths, the
//! common axes, positional and boolean predicates, unions, comparisons and a
//! handful of string functions. No arithmetic, no namespaces.

use ego_tree::{NodeId, Tree};
use scraper::Node;
use std::collections::{HashMap, HashSet};

type XResult<T> = std::result::Result<T, String>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    Star,
    ColonColon,
    Cmp(CmpOp),
    Name(String),
    Literal(String),
    Number(f64),
    Var(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }
}

fn tokenize(input: &str) -> XResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let (token, width) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '@' => (Token::At, 1),
            ',' => (Token::Comma, 1),
            '|' => (Token::Pipe, 1),
            '*' => (Token::Star, 1),
            '.' if next == Some('.') => (Token::DotDot, 2),
            '.' if next.map_or(false, |n| n.is_ascii_digit()) => {
                let (number, width) = read_number(&chars[i..])?;
                (Token::Number(number), width)
            }
            '.' => (Token::Dot, 1),
            ':' if next == Some(':') => (Token::ColonColon, 2),
            '=' => (Token::Cmp(CmpOp::Eq), 1),
            '!' if next == Some('=') => (Token::Cmp(CmpOp::Ne), 2),
            '<' if next == Some('=') => (Token::Cmp(CmpOp::Le), 2),
            '<' => (Token::Cmp(CmpOp::Lt), 1),
            '>' if next == Some('=') => (Token::Cmp(CmpOp::Ge), 2),
            '>' => (Token::Cmp(CmpOp::Gt), 1),
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                let literal: String = chars[i + 1..i + 1 + end].iter().collect();
                (Token::Literal(literal), end + 2)
            }
            '$' => {
                let name = read_name(&chars[i + 1..]);
                if name.is_empty() {
                    return Err("expected a variable name after $".to_string());
                }
                let width = name.chars().count() + 1;
                (Token::Var(name), width)
            }
            c if c.is_ascii_digit() => {
                let (number, width) = read_number(&chars[i..])?;
                (Token::Number(number), width)
            }
            c if c.is_alphabetic() || c == '_' => {
                let name = read_name(&chars[i..]);
                let width = name.chars().count();
                (Token::Name(name), width)
            }
            other => return Err(format!("unexpected character {:?}", other)),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

fn read_name(chars: &[char]) -> String {
    chars
        .iter()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

fn read_number(chars: &[char]) -> XResult<(f64, usize)> {
    let text: String = chars
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == '.')
        .collect();
    let number = text
        .parse::<f64>()
        .map_err(|_| format!("invalid number {:?}", text))?;
    Ok((number, text.len()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Any,
    Name(String),
    Text,
    Node,
    Comment,
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

impl Step {
    fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    /// What `//` abbreviates.
    fn descendant_or_self() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::Node)
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Union(Vec<Expr>),
    Literal(String),
    Number(f64),
    Var(String),
    Call(String, Vec<Expr>),
    Path { absolute: bool, steps: Vec<Step> },
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node" | "comment")
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(Token::Name(name)) if name == word => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: Token) -> XResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(format!("expected {:?}, found {}", token, self.describe_next()))
        }
    }

    fn describe_next(&self) -> String {
        self.peek()
            .map_or_else(|| "end of expression".to_string(), |t| format!("{:?}", t))
    }

    fn parse_or(&mut self) -> XResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> XResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.eat_keyword("and") {
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> XResult<Expr> {
        let mut left = self.parse_union()?;
        while let Some(Token::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_union()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_union(&mut self) -> XResult<Expr> {
        let first = self.parse_path_expr()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.eat(&Token::Pipe) {
            parts.push(self.parse_path_expr()?);
        }
        Ok(Expr::Union(parts))
    }

    fn parse_path_expr(&mut self) -> XResult<Expr> {
        let base = match self.peek().cloned() {
            Some(Token::Literal(text)) => {
                self.pos += 1;
                Expr::Literal(text)
            }
            Some(Token::Number(number)) => {
                self.pos += 1;
                Expr::Number(number)
            }
            Some(Token::Var(name)) => {
                self.pos += 1;
                Expr::Var(name)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                inner
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && !is_node_type(&name) =>
            {
                self.pos += 2;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen)?;
                        break;
                    }
                }
                Expr::Call(name, args)
            }
            _ => return self.parse_location_path(),
        };

        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }
        let mut steps = Vec::new();
        self.parse_trailing_steps(&mut steps)?;

        if predicates.is_empty() && steps.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Filter {
                base: Box::new(base),
                predicates,
                steps,
            })
        }
    }

    fn parse_location_path(&mut self) -> XResult<Expr> {
        let mut steps = Vec::new();
        let absolute = if self.eat(&Token::Slash) {
            if self.starts_step() {
                self.parse_steps(&mut steps)?;
            }
            true
        } else if self.eat(&Token::DoubleSlash) {
            steps.push(Step::descendant_or_self());
            self.parse_steps(&mut steps)?;
            true
        } else {
            self.parse_steps(&mut steps)?;
            false
        };
        Ok(Expr::Path { absolute, steps })
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot)
                | Some(Token::DotDot)
                | Some(Token::At)
                | Some(Token::Star)
                | Some(Token::Name(_))
        )
    }

    fn parse_steps(&mut self, steps: &mut Vec<Step>) -> XResult<()> {
        steps.push(self.parse_step()?);
        self.parse_trailing_steps(steps)
    }

    fn parse_trailing_steps(&mut self, steps: &mut Vec<Step>) -> XResult<()> {
        loop {
            if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
            } else if !self.eat(&Token::Slash) {
                return Ok(());
            }
            steps.push(self.parse_step()?);
        }
    }

    fn parse_step(&mut self) -> XResult<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name).ok_or_else(|| format!("unsupported axis {}", name))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let mut step = Step::new(axis, self.parse_node_test()?);
        while self.eat(&Token::LBracket) {
            step.predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }
        Ok(step)
    }

    fn parse_node_test(&mut self) -> XResult<NodeTest> {
        match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(NodeTest::Any)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                if is_node_type(&name) && self.eat(&Token::LParen) {
                    self.expect(Token::RParen)?;
                    return Ok(match name.as_str() {
                        "text" => NodeTest::Text,
                        "comment" => NodeTest::Comment,
                        _ => NodeTest::Node,
                    });
                }
                Ok(NodeTest::Name(name.to_ascii_lowercase()))
            }
            _ => Err(format!("expected a node test, found {}", self.describe_next())),
        }
    }
}

/// A node, or one attribute of an element identified by its position in the
/// element's attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Item {
    Node(NodeId),
    Attr(NodeId, usize),
}

#[derive(Debug, Clone)]
enum Value {
    Nodes(Vec<Item>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value {
    fn boolean(&self) -> bool {
        match self {
            Value::Nodes(items) => !items.is_empty(),
            Value::Str(text) => !text.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Context {
    item: Item,
    position: usize,
    size: usize,
}

struct Evaluator<'t> {
    tree: &'t Tree<Node>,
    order: HashMap<NodeId, usize>,
    vars: &'t [(String, String)],
}

impl<'t> Evaluator<'t> {
    fn eval(&self, expr: &Expr, ctx: Context) -> XResult<Value> {
        match expr {
            Expr::Or(left, right) => Ok(Value::Bool(
                self.eval(left, ctx)?.boolean() || self.eval(right, ctx)?.boolean(),
            )),
            Expr::And(left, right) => Ok(Value::Bool(
                self.eval(left, ctx)?.boolean() && self.eval(right, ctx)?.boolean(),
            )),
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                Ok(Value::Bool(self.compare(*op, &left, &right)))
            }
            Expr::Union(parts) => {
                let mut items = Vec::new();
                for part in parts {
                    match self.eval(part, ctx)? {
                        Value::Nodes(nodes) => items.extend(nodes),
                        _ => return Err("| needs node-sets on both sides".to_string()),
                    }
                }
                Ok(Value::Nodes(self.sorted(items)))
            }
            Expr::Literal(text) => Ok(Value::Str(text.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Var(name) => self
                .vars
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| Value::Str(value.clone()))
                .ok_or_else(|| format!("unbound variable ${}", name)),
            Expr::Call(name, args) => self.call(name, args, ctx),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    Item::Node(self.tree.root().id())
                } else {
                    ctx.item
                };
                Ok(Value::Nodes(self.walk(vec![start], steps)?))
            }
            Expr::Filter {
                base,
                predicates,
                steps,
            } => {
                let items = match self.eval(base, ctx)? {
                    Value::Nodes(items) => items,
                    _ => return Err("predicates and paths need a node-set".to_string()),
                };
                let filtered = self.filter(items, predicates)?;
                Ok(Value::Nodes(self.walk(filtered, steps)?))
            }
        }
    }

    fn walk(&self, start: Vec<Item>, steps: &[Step]) -> XResult<Vec<Item>> {
        let mut current = start;
        for step in steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();
            for &item in &current {
                let candidates: Vec<Item> = self
                    .axis(item, step.axis)
                    .into_iter()
                    .filter(|candidate| self.matches(*candidate, step.axis, &step.test))
                    .collect();
                for found in self.filter(candidates, &step.predicates)? {
                    if seen.insert(found) {
                        next.push(found);
                    }
                }
            }
            current = self.sorted(next);
        }
        Ok(current)
    }

    /// Applies predicates in turn; `items` must be in axis order so that
    /// `position()` counts the right way on reverse axes.
    fn filter(&self, items: Vec<Item>, predicates: &[Expr]) -> XResult<Vec<Item>> {
        let mut current = items;
        for predicate in predicates {
            let size = current.len();
            let mut kept = Vec::with_capacity(size);
            for (index, item) in current.into_iter().enumerate() {
                let ctx = Context {
                    item,
                    position: index + 1,
                    size,
                };
                let keep = match self.eval(predicate, ctx)? {
                    Value::Num(n) => n == (index + 1) as f64,
                    other => other.boolean(),
                };
                if keep {
                    kept.push(item);
                }
            }
            current = kept;
        }
        Ok(current)
    }

    fn axis(&self, item: Item, axis: Axis) -> Vec<Item> {
        let (id, on_attr) = match item {
            Item::Node(id) => (id, false),
            Item::Attr(owner, _) => (owner, true),
        };
        let node = match self.tree.get(id) {
            Some(node) => node,
            None => return Vec::new(),
        };
        let nodes = |iter: &mut dyn Iterator<Item = ego_tree::NodeRef<'t, Node>>| {
            iter.map(|n| Item::Node(n.id())).collect::<Vec<_>>()
        };

        match axis {
            Axis::SelfAxis => vec![item],
            Axis::Child if !on_attr => nodes(&mut node.children()),
            Axis::Descendant if !on_attr => nodes(&mut node.descendants().skip(1)),
            Axis::DescendantOrSelf if !on_attr => nodes(&mut node.descendants()),
            Axis::DescendantOrSelf => vec![item],
            Axis::Parent if on_attr => vec![Item::Node(id)],
            Axis::Parent => nodes(&mut node.parent().into_iter()),
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let mut out = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    out.push(item);
                }
                if on_attr {
                    out.push(Item::Node(id));
                }
                out.extend(nodes(&mut node.ancestors()));
                out
            }
            Axis::Attribute if !on_attr => match node.value() {
                Node::Element(element) => (0..element.attrs().count())
                    .map(|index| Item::Attr(id, index))
                    .collect(),
                _ => Vec::new(),
            },
            Axis::FollowingSibling if !on_attr => nodes(&mut node.next_siblings()),
            Axis::PrecedingSibling if !on_attr => nodes(&mut node.prev_siblings()),
            _ => Vec::new(),
        }
    }

    fn matches(&self, item: Item, axis: Axis, test: &NodeTest) -> bool {
        match item {
            Item::Attr(owner, index) => match test {
                NodeTest::Node => true,
                NodeTest::Any => axis == Axis::Attribute,
                NodeTest::Name(name) => {
                    axis == Axis::Attribute
                        && self
                            .attribute(owner, index)
                            .map_or(false, |(key, _)| key.eq_ignore_ascii_case(name))
                }
                _ => false,
            },
            Item::Node(id) => {
                let value = match self.tree.get(id) {
                    Some(node) => node.value(),
                    None => return false,
                };
                match (test, value) {
                    (NodeTest::Node, _) => true,
                    (NodeTest::Any, Node::Element(_)) => true,
                    (NodeTest::Name(name), Node::Element(element)) => {
                        element.name().eq_ignore_ascii_case(name)
                    }
                    (NodeTest::Text, Node::Text(_)) => true,
                    (NodeTest::Comment, Node::Comment(_)) => true,
                    _ => false,
                }
            }
        }
    }

    fn attribute(&self, owner: NodeId, index: usize) -> Option<(&'t str, &'t str)> {
        match self.tree.get(owner)?.value() {
            Node::Element(element) => element.attrs().nth(index),
            _ => None,
        }
    }

    fn string_value(&self, item: Item) -> String {
        match item {
            Item::Attr(owner, index) => self
                .attribute(owner, index)
                .map(|(_, value)| value.to_string())
                .unwrap_or_default(),
            Item::Node(id) => match self.tree.get(id) {
                Some(node) => match node.value() {
                    Node::Text(text) => text.text.to_string(),
                    Node::Comment(comment) => comment.comment.to_string(),
                    Node::Element(_) | Node::Document | Node::Fragment => node
                        .descendants()
                        .filter_map(|n| match n.value() {
                            Node::Text(text) => Some(&*text.text),
                            _ => None,
                        })
                        .collect(),
                    _ => String::new(),
                },
                None => String::new(),
            },
        }
    }

    fn item_name(&self, item: Item) -> String {
        match item {
            Item::Attr(owner, index) => self
                .attribute(owner, index)
                .map(|(key, _)| key.to_string())
                .unwrap_or_default(),
            Item::Node(id) => match self.tree.get(id).map(|node| node.value()) {
                Some(Node::Element(element)) => element.name().to_string(),
                _ => String::new(),
            },
        }
    }

    fn sorted(&self, mut items: Vec<Item>) -> Vec<Item> {
        items.sort_by_key(|item| self.order_key(*item));
        items.dedup();
        items
    }

    fn order_key(&self, item: Item) -> (usize, usize) {
        let position = |id: &NodeId| self.order.get(id).copied().unwrap_or(usize::MAX);
        match item {
            Item::Node(id) => (position(&id), 0),
            Item::Attr(owner, index) => (position(&owner), index + 1),
        }
    }

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(items) => items
                .first()
                .map(|item| self.string_value(*item))
                .unwrap_or_default(),
            Value::Str(text) => text.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => bool_number(*b),
            other => self.string(other).trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }

    fn compare(&self, op: CmpOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(items), Value::Bool(_)) | (Value::Bool(_), Value::Nodes(items)) => {
                let as_bool = Value::Bool(!items.is_empty());
                if matches!(left, Value::Nodes(_)) {
                    self.compare_atoms(op, &as_bool, right)
                } else {
                    self.compare_atoms(op, left, &as_bool)
                }
            }
            (Value::Nodes(lhs), Value::Nodes(rhs)) => {
                let rhs: Vec<Value> = rhs
                    .iter()
                    .map(|item| Value::Str(self.string_value(*item)))
                    .collect();
                lhs.iter().any(|item| {
                    let lhs = Value::Str(self.string_value(*item));
                    rhs.iter().any(|r| self.compare_atoms(op, &lhs, r))
                })
            }
            (Value::Nodes(items), other) => items.iter().any(|item| {
                self.compare_atoms(op, &Value::Str(self.string_value(*item)), other)
            }),
            (other, Value::Nodes(items)) => items.iter().any(|item| {
                self.compare_atoms(op, other, &Value::Str(self.string_value(*item)))
            }),
            _ => self.compare_atoms(op, left, right),
        }
    }

    fn compare_atoms(&self, op: CmpOp, left: &Value, right: &Value) -> bool {
        match (op, left, right) {
            (CmpOp::Eq | CmpOp::Ne, Value::Bool(_), _) | (CmpOp::Eq | CmpOp::Ne, _, Value::Bool(_)) => {
                op.holds(bool_number(left.boolean()), bool_number(right.boolean()))
            }
            (CmpOp::Eq | CmpOp::Ne, Value::Str(a), Value::Str(b)) => (a == b) == (op == CmpOp::Eq),
            _ => op.holds(self.number(left), self.number(right)),
        }
    }

    fn call(&self, name: &str, args: &[Expr], ctx: Context) -> XResult<Value> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg, ctx))
            .collect::<XResult<Vec<_>>>()?;
        let arity = |min: usize, max: usize| -> XResult<()> {
            if values.len() < min || values.len() > max {
                Err(format!("wrong number of arguments to {}()", name))
            } else {
                Ok(())
            }
        };
        let text_arg = |index: usize| self.string(&values[index]);
        let text_or_context = || {
            values
                .first()
                .map(|value| self.string(value))
                .unwrap_or_else(|| self.string_value(ctx.item))
        };

        match name {
            "position" => arity(0, 0).map(|_| Value::Num(ctx.position as f64)),
            "last" => arity(0, 0).map(|_| Value::Num(ctx.size as f64)),
            "true" => arity(0, 0).map(|_| Value::Bool(true)),
            "false" => arity(0, 0).map(|_| Value::Bool(false)),
            "not" => {
                arity(1, 1)?;
                Ok(Value::Bool(!values[0].boolean()))
            }
            "boolean" => {
                arity(1, 1)?;
                Ok(Value::Bool(values[0].boolean()))
            }
            "contains" => {
                arity(2, 2)?;
                Ok(Value::Bool(text_arg(0).contains(text_arg(1).as_str())))
            }
            "starts-with" => {
                arity(2, 2)?;
                Ok(Value::Bool(text_arg(0).starts_with(text_arg(1).as_str())))
            }
            "ends-with" => {
                arity(2, 2)?;
                Ok(Value::Bool(text_arg(0).ends_with(text_arg(1).as_str())))
            }
            "normalize-space" => {
                arity(0, 1)?;
                Ok(Value::Str(
                    text_or_context().split_whitespace().collect::<Vec<_>>().join(" "),
                ))
            }
            "string" => {
                arity(0, 1)?;
                Ok(Value::Str(text_or_context()))
            }
            "string-length" => {
                arity(0, 1)?;
                Ok(Value::Num(text_or_context().chars().count() as f64))
            }
            "number" => {
                arity(0, 1)?;
                match values.first() {
                    Some(value) => Ok(Value::Num(self.number(value))),
                    None => Ok(Value::Num(self.number(&Value::Str(self.string_value(ctx.item))))),
                }
            }
            "count" => {
                arity(1, 1)?;
                match &values[0] {
                    Value::Nodes(items) => Ok(Value::Num(items.len() as f64)),
                    _ => Err("count() needs a node-set".to_string()),
                }
            }
            "concat" => {
                if values.len() < 2 {
                    return Err("concat() needs at least two arguments".to_string());
                }
                Ok(Value::Str(values.iter().map(|v| self.string(v)).collect()))
            }
            "name" | "local-name" => {
                arity(0, 1)?;
                let item = match values.first() {
                    Some(Value::Nodes(items)) => items.first().copied(),
                    Some(_) => return Err(format!("{}() needs a node-set", name)),
                    None => Some(ctx.item),
                };
                Ok(Value::Str(item.map(|i| self.item_name(i)).unwrap_or_default()))
            }
            other => Err(format!("unsupported function {}()", other)),
        }
    }
}

fn bool_number(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A compiled XPath expression.
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn parse(source: &str) -> XResult<Self> {
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
        };
        let expr = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(format!("unexpected {}", parser.describe_next()));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against `tree` with `context` as the context node and returns
    /// the selected elements in document order. Expressions that produce
    /// anything other than elements are rejected.
    pub fn select(
        &self,
        tree: &Tree<Node>,
        context: NodeId,
        vars: &[(String, String)],
    ) -> XResult<Vec<NodeId>> {
        if tree.get(context).is_none() {
            return Err("context node is not part of the document".to_string());
        }
        let order = tree
            .root()
            .descendants()
            .enumerate()
            .map(|(index, node)| (node.id(), index))
            .collect();
        let evaluator = Evaluator { tree, order, vars };
        let ctx = Context {
            item: Item::Node(context),
            position: 1,
            size: 1,
        };

        match evaluator.eval(&self.expr, ctx)? {
            Value::Nodes(items) => items
                .into_iter()
                .map(|item| match item {
                    Item::Node(id)
                        if matches!(tree.get(id).map(|n| n.value()), Some(Node::Element(_))) =>
                    {
                        Ok(id)
                    }
                    _ => Err("expression selects nodes that are not elements".to_string()),
                })
                .collect(),
            _ => Err("expression does not select nodes".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{ElementRef, Html};

    const PAGE: &str = r#"
        <html><body>
          <ul id="first"><li id="a">A</li><li id="b">B</li></ul>
          <ul id="second"><li id="c">C</li><li id="d">D</li><li id="e">E</li></ul>
          <form id="f">
            <label for="n" id="l">Name</label>
            <input id="n" name="name" type="text">
            <input id="r1" name="r" type="radio" value="1">
            <input id="r2" name="r" type="radio" value="2" checked>
          </form>
          <p id="p1"><a id="x" href="/next">Next   page</a></p>
          <p id="p2"><a id="y" href="/other#frag">Other</a></p>
        </body></html>
    "#;

    fn ids_from(html: &Html, context: NodeId, expr: &str, vars: &[(String, String)]) -> Vec<String> {
        let xpath = XPath::parse(expr).unwrap();
        xpath
            .select(&html.tree, context, vars)
            .unwrap()
            .into_iter()
            .map(|id| {
                let element = ElementRef::wrap(html.tree.get(id).unwrap()).unwrap();
                element
                    .value()
                    .attr("id")
                    .unwrap_or(element.value().name())
                    .to_string()
            })
            .collect()
    }

    fn ids(html: &Html, expr: &str) -> Vec<String> {
        ids_from(html, html.root_element().id(), expr, &[])
    }

    #[test]
    fn test_paths_and_attributes() {
        let html = Html::parse_document(PAGE);
        assert_eq!(ids(&html, "//input[@type='radio']"), vec!["r1", "r2"]);
        assert_eq!(ids(&html, "//input[@checked]"), vec!["r2"]);
        assert_eq!(ids(&html, "/html/body/form"), vec!["f"]);
        assert_eq!(ids(&html, "body/p/a"), vec!["x", "y"]);
        assert_eq!(ids(&html, "//a[@href='/next']/.."), vec!["p1"]);
    }

    #[test]
    fn test_positional_predicates() {
        let html = Html::parse_document(PAGE);
        assert_eq!(ids(&html, "//li[2]"), vec!["b", "d"]);
        assert_eq!(ids(&html, "(//li)[2]"), vec!["b"]);
        assert_eq!(ids(&html, "//li[last()]"), vec!["b", "e"]);
        assert_eq!(ids(&html, "//li[position() > 1]"), vec!["b", "d", "e"]);
        assert_eq!(ids(&html, "//li[@id='e']/preceding-sibling::li[1]"), vec!["d"]);
        assert_eq!(ids(&html, "//li[@id='c']/following-sibling::*"), vec!["d", "e"]);
    }

    #[test]
    fn test_functions() {
        let html = Html::parse_document(PAGE);
        assert_eq!(ids(&html, "//a[normalize-space(.)='Next page']"), vec!["x"]);
        assert_eq!(ids(&html, "//a[contains(@href, 'other')]"), vec!["y"]);
        assert_eq!(ids(&html, "//a[starts-with(@href, '/n')]"), vec!["x"]);
        assert_eq!(ids(&html, "//ul[count(li) = 3]"), vec!["second"]);
        assert_eq!(ids(&html, "//a[text()='Other']"), vec!["y"]);
        assert_eq!(ids(&html, "//*[name()='label']"), vec!["l"]);
        assert_eq!(ids(&html, "//li[not(@id='a') and string-length(.) = 1][1]"), vec!["b", "c"]);
        assert_eq!(ids(&html, "//input[@value=concat('', '2')]"), vec!["r2"]);
    }

    #[test]
    fn test_union_is_in_document_order() {
        let html = Html::parse_document(PAGE);
        assert_eq!(ids(&html, "//a | //label | //ul"), vec!["first", "second", "l", "x", "y"]);
        assert_eq!(ids(&html, "//li[@id='a' or @id='e']"), vec!["a", "e"]);
    }

    #[test]
    fn test_relative_context_and_ancestors() {
        let html = Html::parse_document(PAGE);
        let input = ids(&html, "//input[@id='n']");
        assert_eq!(input, vec!["n"]);
        let xpath = XPath::parse("//input[@id='n']").unwrap();
        let input_id = xpath.select(&html.tree, html.root_element().id(), &[]).unwrap()[0];
        assert_eq!(ids_from(&html, input_id, "ancestor::form", &[]), vec!["f"]);
        assert_eq!(ids_from(&html, input_id, "../label", &[]), vec!["l"]);
        assert_eq!(ids_from(&html, input_id, "./following-sibling::input[2]", &[]), vec!["r2"]);
    }

    #[test]
    fn test_variables() {
        let html = Html::parse_document(PAGE);
        let vars = vec![("v".to_string(), "1".to_string())];
        assert_eq!(
            ids_from(&html, html.root_element().id(), "//input[@value=$v]", &vars),
            vec!["r1"]
        );
        let err = XPath::parse("//input[@value=$missing]")
            .unwrap()
            .select(&html.tree, html.root_element().id(), &[])
            .unwrap_err();
        assert!(err.contains("$missing"));
    }

    #[test]
    fn test_numeric_comparison_against_node_set() {
        let html = Html::parse_document(PAGE);
        assert_eq!(ids(&html, "//input[@value > 1]"), vec!["r2"]);
        assert_eq!(ids(&html, "//input[@value != 1]"), vec!["r2"]);
    }

    #[test]
    fn test_rejects_non_elements_and_bad_syntax() {
        let html = Html::parse_document(PAGE);
        let root = html.root_element().id();
        let attrs = XPath::parse("//a/@href").unwrap();
        assert!(attrs.select(&html.tree, root, &[]).is_err());
        let count = XPath::parse("count(//a)").unwrap();
        assert!(count.select(&html.tree, root, &[]).is_err());
        assert!(XPath::parse("//a[").is_err());
        assert!(XPath::parse("//a[@href='x]").is_err());
        assert!(XPath::parse("namespace::x").is_err());
        assert!(XPath::parse("//a[frobnicate()]")
            .unwrap()
            .select(&html.tree, root, &[])
            .is_err());
    }
}
