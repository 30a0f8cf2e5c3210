use super::ensure_sufficient_stack;
use std::fmt;
use std::rc::Rc;

/// Source range of a node. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
}

impl Span {
    pub fn new(line: usize, column: usize, end_line: usize) -> Self {
        Self {
            line,
            column,
            end_line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// 1-based line where the node starts.
    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn into_kind(mut self) -> NodeKind {
        std::mem::replace(&mut self.kind, NodeKind::Empty)
    }
}

// Deeply nested expressions would otherwise overflow the stack in the
// compiler-generated drop glue.
impl Drop for Node {
    fn drop(&mut self) {
        let kind = std::mem::replace(&mut self.kind, NodeKind::Empty);
        ensure_sufficient_stack(move || drop(kind));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Node>,
    pub span: Span,
}

/// A function body shared between the declaring node and every value
/// referring to it.
#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,

    // Variables and Functions
    Identifier(String),
    VariableDecl {
        kind: DeclarationKind,
        declarations: Vec<Declarator>,
    },
    FunctionDecl(Rc<FunctionDef>),

    // Expressions
    BinaryOp {
        op: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    LogicalOp {
        op: LogicalOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Node>,
    },
    UpdateExpr {
        op: UpdateOperator,
        prefix: bool,
        target: String,
    },
    AssignmentExpr {
        op: AssignmentOperator,
        target: String,
        value: Box<Node>,
    },
    TernaryExpr {
        condition: Box<Node>,
        true_expr: Box<Node>,
        false_expr: Box<Node>,
    },
    CallExpr {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },

    // Parsed but outside the evaluated subset
    MemberExpr {
        object: Box<Node>,
        property: String,
    },
    IndexExpr {
        object: Box<Node>,
        index: Box<Node>,
    },
    MemberAssignment {
        target: Box<Node>,
        value: Box<Node>,
    },
    ArrayLiteral(Vec<Node>),
    ObjectLiteral(Vec<(String, Node)>),
    FunctionExpr(Rc<FunctionDef>),
    NewExpr {
        constructor: Box<Node>,
        arguments: Vec<Node>,
    },

    // Statements
    ExpressionStatement(Box<Node>),
    ReturnStatement(Option<Box<Node>>),
    IfStatement {
        condition: Box<Node>,
        consequent: Box<Node>,
        alternate: Option<Box<Node>>,
    },
    WhileLoop {
        condition: Box<Node>,
        body: Box<Node>,
    },
    ForLoop {
        init: Option<Box<Node>>,
        condition: Option<Box<Node>>,
        update: Option<Box<Node>>,
        body: Box<Node>,
    },
    Block(Vec<Node>),
    Break,
    Continue,
    Empty,

    // Program root
    Program(Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::StrictEqual => "===",
            BinaryOperator::StrictNotEqual => "!==",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::LessThanEqual => "<=",
            BinaryOperator::GreaterThanEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negative,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl AssignmentOperator {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary(self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::Add => Some(BinaryOperator::Add),
            AssignmentOperator::Subtract => Some(BinaryOperator::Subtract),
            AssignmentOperator::Multiply => Some(BinaryOperator::Multiply),
            AssignmentOperator::Divide => Some(BinaryOperator::Divide),
        }
    }
}

/// Renders expressions back to compact source text. Used for the
/// placeholders of expressions the evaluator cannot reduce.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ensure_sufficient_stack(|| self.render(f))
    }
}

impl Node {
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Number(n) => write!(f, "{}", n),
            NodeKind::String(s) => write!(f, "{:?}", s),
            NodeKind::Boolean(b) => write!(f, "{}", b),
            NodeKind::Null => write!(f, "null"),
            NodeKind::Undefined => write!(f, "undefined"),
            NodeKind::Identifier(name) => write!(f, "{}", name),
            NodeKind::BinaryOp { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            NodeKind::LogicalOp { op, left, right } => {
                let symbol = match op {
                    LogicalOperator::And => "&&",
                    LogicalOperator::Or => "||",
                };
                write!(f, "{} {} {}", left, symbol, right)
            }
            NodeKind::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => write!(f, "!{}", operand),
                UnaryOperator::Negative => write!(f, "-{}", operand),
                UnaryOperator::Typeof => write!(f, "typeof {}", operand),
            },
            NodeKind::UpdateExpr { op, prefix, target } => {
                let symbol = match op {
                    UpdateOperator::Increment => "++",
                    UpdateOperator::Decrement => "--",
                };
                if *prefix {
                    write!(f, "{}{}", symbol, target)
                } else {
                    write!(f, "{}{}", target, symbol)
                }
            }
            NodeKind::AssignmentExpr { target, value, .. } => write!(f, "{} = {}", target, value),
            NodeKind::TernaryExpr {
                condition,
                true_expr,
                false_expr,
            } => write!(f, "{} ? {} : {}", condition, true_expr, false_expr),
            NodeKind::CallExpr { callee, arguments } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            NodeKind::MemberExpr { object, property } => write!(f, "{}.{}", object, property),
            NodeKind::IndexExpr { object, index } => write!(f, "{}[{}]", object, index),
            NodeKind::MemberAssignment { target, value } => write!(f, "{} = {}", target, value),
            NodeKind::ArrayLiteral(_) => write!(f, "[...]"),
            NodeKind::ObjectLiteral(_) => write!(f, "{{...}}"),
            NodeKind::FunctionExpr(def) => write!(f, "function {}()", def.name),
            NodeKind::FunctionDecl(def) => write!(f, "function {}()", def.name),
            NodeKind::NewExpr { constructor, .. } => write!(f, "new {}()", constructor),
            _ => write!(f, "..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Node> {
        Box::new(Node::new(NodeKind::Identifier(name.to_string()), Span::default()))
    }

    #[test]
    fn test_display_binary_expression() {
        let node = Node::new(
            NodeKind::BinaryOp {
                op: BinaryOperator::Multiply,
                left: ident("a"),
                right: ident("b"),
            },
            Span::default(),
        );
        assert_eq!(node.to_string(), "a * b");
    }

    #[test]
    fn test_deep_tree_renders_and_drops() {
        let mut node = *ident("x");
        for _ in 0..100_000 {
            node = Node::new(
                NodeKind::UnaryOp {
                    op: UnaryOperator::Negative,
                    operand: Box::new(node),
                },
                Span::default(),
            );
        }
        let rendered = node.to_string();
        assert_eq!(rendered.len(), 100_001);
        assert!(rendered.ends_with("--x"));
        drop(node);
    }

    #[test]
    fn test_display_call_expression() {
        let node = Node::new(
            NodeKind::CallExpr {
                callee: ident("add"),
                arguments: vec![
                    *ident("x"),
                    Node::new(NodeKind::Number(1.0), Span::default()),
                ],
            },
            Span::default(),
        );
        assert_eq!(node.to_string(), "add(x, 1)");
    }
}
