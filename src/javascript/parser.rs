use super::ast::{
    AssignmentOperator, BinaryOperator, DeclarationKind, Declarator, FunctionDef, LogicalOperator,
    Node, NodeKind, Span, UnaryOperator, UpdateOperator,
};
use super::ensure_sufficient_stack;
use super::tokenizer::{SpannedToken, Token, tokenize};
use crate::error::ParseError;
use log::{debug, trace};
use std::rc::Rc;

type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    current: usize,
    function_depth: usize,
    /// Loops enclosing the current statement within the current function.
    loop_depth: usize,
}

impl Parser {
    pub fn new(source: &str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        Ok(Self::from_tokens(tokens))
    }

    pub fn from_tokens(mut tokens: Vec<SpannedToken>) -> Self {
        if !matches!(tokens.last().map(|t| &t.token), Some(Token::EOF)) {
            tokens.push(SpannedToken {
                token: Token::EOF,
                line: tokens.last().map(|t| t.line).unwrap_or(1),
                column: 1,
                offset: 0,
            });
        }
        Self {
            tokens,
            current: 0,
            function_depth: 0,
            loop_depth: 0,
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::EOF)
    }

    fn peek(&self) -> &Token {
        let index = self.current.min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn peek_spanned(&self) -> &SpannedToken {
        let index = self.current.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current.saturating_sub(1)].token
    }

    /// Line of the most recently consumed token.
    fn previous_line(&self) -> usize {
        self.tokens[self.current.saturating_sub(1)].line
    }

    fn start_span(&self) -> Span {
        let token = self.peek_spanned();
        Span::new(token.line, token.column, token.line)
    }

    fn finish_span(&self, start: Span) -> Span {
        Span::new(start.line, start.column, self.previous_line().max(start.line))
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError::at(message, self.peek_spanned().line))
    }

    fn expect(&mut self, expected: Token, context: &str) -> ParseResult<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            let found = self.peek().clone();
            self.error(format!("Expected {:?} {}, found {:?}", expected, context, found))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> ParseResult<String> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            found => self.error(format!("Expected identifier {}, found {:?}", context, found)),
        }
    }

    pub fn parse(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut program = Vec::new();

        while !self.is_at_end() {
            program.push(self.parse_statement()?);
        }

        debug!(target: "javascript", "Parsed program with {} top-level statements", program.len());
        Ok(Node::new(NodeKind::Program(program), self.finish_span(start)))
    }

    fn parse_statement(&mut self) -> ParseResult<Node> {
        ensure_sufficient_stack(|| self.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> ParseResult<Node> {
        trace!(target: "javascript", "Parsing statement, current token: {:?}", self.peek());
        match self.peek() {
            Token::Let | Token::Const | Token::Var => {
                let decl = self.parse_variable_declaration()?;
                self.end_statement()?;
                Ok(decl)
            }
            Token::Function => self.parse_function_declaration(),
            Token::If => self.parse_if_statement(),
            Token::While => self.parse_while_statement(),
            Token::For => self.parse_for_statement(),
            Token::Return => self.parse_return_statement(),
            Token::Break | Token::Continue => self.parse_loop_control(),
            Token::LeftBrace => self.parse_block(),
            Token::Semicolon => {
                let start = self.start_span();
                self.advance();
                Ok(Node::new(NodeKind::Empty, start))
            }
            _ => {
                // Expression statement
                let start = self.start_span();
                let expr = self.parse_expression()?;
                self.end_statement()?;
                Ok(Node::new(
                    NodeKind::ExpressionStatement(Box::new(expr)),
                    self.finish_span(start),
                ))
            }
        }
    }

    /// Accept `;`, a closing brace, end of input, or a line break before
    /// the next token.
    fn end_statement(&mut self) -> ParseResult<()> {
        if matches!(self.peek(), Token::Semicolon) {
            self.advance();
            return Ok(());
        }
        if matches!(self.peek(), Token::RightBrace | Token::EOF) {
            return Ok(());
        }
        if self.peek_spanned().line > self.previous_line() {
            return Ok(());
        }
        let found = self.peek().clone();
        self.error(format!("Unexpected token {:?} after statement", found))
    }

    fn parse_variable_declaration(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let kind = match self.advance() {
            Token::Let => DeclarationKind::Let,
            Token::Const => DeclarationKind::Const,
            _ => DeclarationKind::Var,
        };

        let mut declarations = Vec::new();
        loop {
            let decl_start = self.start_span();
            let name = self.expect_identifier("after variable keyword")?;
            let init = if matches!(self.peek(), Token::Equals) {
                self.advance(); // consume '='
                Some(self.parse_assignment()?)
            } else {
                if kind == DeclarationKind::Const {
                    return self.error(format!("Missing initializer in const declaration '{}'", name));
                }
                None
            };
            declarations.push(Declarator {
                name,
                init,
                span: self.finish_span(decl_start),
            });

            if matches!(self.peek(), Token::Comma) {
                self.advance(); // consume ','
            } else {
                break;
            }
        }

        Ok(Node::new(
            NodeKind::VariableDecl { kind, declarations },
            self.finish_span(start),
        ))
    }

    fn parse_function_declaration(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        self.advance(); // consume 'function'
        let name = self.expect_identifier("after 'function'")?;
        let def = self.parse_function_rest(name, start)?;
        Ok(Node::new(NodeKind::FunctionDecl(Rc::new(def)), self.finish_span(start)))
    }

    /// Parameters and body, after the optional name has been consumed.
    fn parse_function_rest(&mut self, name: String, start: Span) -> ParseResult<FunctionDef> {
        self.expect(Token::LeftParen, "after function name")?;

        let mut params = Vec::new();
        if !matches!(self.peek(), Token::RightParen) {
            loop {
                params.push(self.expect_identifier("as parameter name")?);
                match self.peek() {
                    Token::Comma => {
                        self.advance();
                    }
                    Token::RightParen => break,
                    found => {
                        let found = found.clone();
                        return self.error(format!("Expected ',' or ')' in parameters, found {:?}", found));
                    }
                }
            }
        }
        self.advance(); // consume ')'

        self.expect(Token::LeftBrace, "before function body")?;
        self.function_depth += 1;
        let enclosing_loops = std::mem::take(&mut self.loop_depth);
        let mut body = Vec::new();
        while !matches!(self.peek(), Token::RightBrace | Token::EOF) {
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(e) => {
                    self.function_depth -= 1;
                    self.loop_depth = enclosing_loops;
                    return Err(e);
                }
            }
        }
        self.function_depth -= 1;
        self.loop_depth = enclosing_loops;
        self.expect(Token::RightBrace, "after function body")?;

        Ok(FunctionDef {
            name,
            params,
            body,
            span: self.finish_span(start),
        })
    }

    fn parse_if_statement(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        self.advance(); // consume 'if'
        self.expect(Token::LeftParen, "after 'if'")?;
        let condition = Box::new(self.parse_expression()?);
        self.expect(Token::RightParen, "after if condition")?;

        let consequent = Box::new(self.parse_statement()?);
        let alternate = if matches!(self.peek(), Token::Else) {
            self.advance(); // consume 'else'
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Node::new(
            NodeKind::IfStatement {
                condition,
                consequent,
                alternate,
            },
            self.finish_span(start),
        ))
    }

    fn parse_while_statement(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        self.advance(); // consume 'while'
        self.expect(Token::LeftParen, "after 'while'")?;
        let condition = Box::new(self.parse_expression()?);
        self.expect(Token::RightParen, "after while condition")?;
        let body = Box::new(self.parse_loop_body()?);

        Ok(Node::new(
            NodeKind::WhileLoop { condition, body },
            self.finish_span(start),
        ))
    }

    fn parse_for_statement(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        self.advance(); // consume 'for'
        self.expect(Token::LeftParen, "after 'for'")?;

        let init = match self.peek() {
            Token::Semicolon => None,
            Token::Let | Token::Const | Token::Var => Some(Box::new(self.parse_variable_declaration()?)),
            _ => {
                let expr_start = self.start_span();
                let expr = self.parse_expression()?;
                Some(Box::new(Node::new(
                    NodeKind::ExpressionStatement(Box::new(expr)),
                    self.finish_span(expr_start),
                )))
            }
        };
        if matches!(self.peek(), Token::Identifier(word) if word == "of") {
            return self.error("for...of loops are not supported");
        }
        self.expect(Token::Semicolon, "after for loop initializer")?;

        let condition = if matches!(self.peek(), Token::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect(Token::Semicolon, "after for loop condition")?;

        let update = if matches!(self.peek(), Token::RightParen) {
            None
        } else {
            let update_start = self.start_span();
            let expr = self.parse_expression()?;
            Some(Box::new(Node::new(
                NodeKind::ExpressionStatement(Box::new(expr)),
                self.finish_span(update_start),
            )))
        };
        self.expect(Token::RightParen, "after for loop update")?;

        let body = Box::new(self.parse_loop_body()?);
        Ok(Node::new(
            NodeKind::ForLoop {
                init,
                condition,
                update,
                body,
            },
            self.finish_span(start),
        ))
    }

    fn parse_loop_body(&mut self) -> ParseResult<Node> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body
    }

    fn parse_loop_control(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let (kind, keyword) = match self.peek() {
            Token::Break => (NodeKind::Break, "break"),
            _ => (NodeKind::Continue, "continue"),
        };
        if self.loop_depth == 0 {
            return self.error(format!("'{}' outside of loop", keyword));
        }
        self.advance();
        if matches!(self.peek(), Token::Identifier(_)) && self.peek_spanned().line == start.line {
            return self.error(format!("Labeled '{}' is not supported", keyword));
        }
        self.end_statement()?;
        Ok(Node::new(kind, self.finish_span(start)))
    }

    fn parse_return_statement(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        if self.function_depth == 0 {
            return self.error("'return' outside of function");
        }
        self.advance(); // consume 'return'

        // A line break after `return` ends the statement.
        let on_same_line = self.peek_spanned().line == start.line;
        let expr = if !on_same_line || matches!(self.peek(), Token::Semicolon | Token::RightBrace | Token::EOF) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.end_statement()?;

        Ok(Node::new(NodeKind::ReturnStatement(expr), self.finish_span(start)))
    }

    fn parse_block(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        self.advance(); // consume '{'

        let mut statements = Vec::new();
        while !matches!(self.peek(), Token::RightBrace | Token::EOF) {
            statements.push(self.parse_statement()?);
        }
        self.expect(Token::RightBrace, "to close block")?;

        Ok(Node::new(NodeKind::Block(statements), self.finish_span(start)))
    }

    fn parse_expression(&mut self) -> ParseResult<Node> {
        trace!(target: "javascript", "Parsing expression, current token: {:?}", self.peek());
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ParseResult<Node> {
        ensure_sufficient_stack(|| self.parse_assignment_inner())
    }

    fn parse_assignment_inner(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let expr = self.parse_ternary()?;

        let op = match self.peek() {
            Token::Equals => AssignmentOperator::Assign,
            Token::PlusEquals => AssignmentOperator::Add,
            Token::MinusEquals => AssignmentOperator::Subtract,
            Token::StarEquals => AssignmentOperator::Multiply,
            Token::SlashEquals => AssignmentOperator::Divide,
            Token::Arrow => return self.error("Arrow functions are not supported"),
            _ => return Ok(expr),
        };
        trace!(target: "javascript", "Found assignment operator: {:?}", op);
        self.advance(); // consume the operator
        let value = Box::new(self.parse_assignment()?);

        let target_span = expr.span;
        let kind = match expr.into_kind() {
            NodeKind::Identifier(target) => NodeKind::AssignmentExpr { op, target, value },
            kind @ (NodeKind::MemberExpr { .. } | NodeKind::IndexExpr { .. }) => NodeKind::MemberAssignment {
                target: Box::new(Node::new(kind, target_span)),
                value,
            },
            _ => return Err(ParseError::at("Invalid assignment target", start.line)),
        };
        Ok(Node::new(kind, self.finish_span(start)))
    }

    fn parse_ternary(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let condition = self.parse_logical_or()?;

        if !matches!(self.peek(), Token::Question) {
            return Ok(condition);
        }
        self.advance(); // consume '?'
        let true_expr = self.parse_assignment()?;
        self.expect(Token::Colon, "in conditional expression")?;
        let false_expr = self.parse_assignment()?;

        Ok(Node::new(
            NodeKind::TernaryExpr {
                condition: Box::new(condition),
                true_expr: Box::new(true_expr),
                false_expr: Box::new(false_expr),
            },
            self.finish_span(start),
        ))
    }

    fn parse_logical_or(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut expr = self.parse_logical_and()?;

        while matches!(self.peek(), Token::DoublePipe) {
            self.advance(); // consume operator
            let right = self.parse_logical_and()?;
            expr = Node::new(
                NodeKind::LogicalOp {
                    op: LogicalOperator::Or,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                self.finish_span(start),
            );
        }

        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut expr = self.parse_equality()?;

        while matches!(self.peek(), Token::DoubleAmpersand) {
            self.advance(); // consume operator
            let right = self.parse_equality()?;
            expr = Node::new(
                NodeKind::LogicalOp {
                    op: LogicalOperator::And,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                self.finish_span(start),
            );
        }

        Ok(expr)
    }

    fn binary(&self, op: BinaryOperator, left: Node, right: Node, start: Span) -> Node {
        Node::new(
            NodeKind::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            self.finish_span(start),
        )
    }

    fn parse_equality(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut expr = self.parse_comparison()?;

        loop {
            let op = match self.peek() {
                Token::DoubleEquals => BinaryOperator::Equal,
                Token::TripleEquals => BinaryOperator::StrictEqual,
                Token::NotEquals => BinaryOperator::NotEqual,
                Token::NotDoubleEquals => BinaryOperator::StrictNotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = self.binary(op, expr, right, start);
        }

        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut expr = self.parse_additive()?;

        loop {
            let op = match self.peek() {
                Token::LessThan => BinaryOperator::LessThan,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::LessThanEquals => BinaryOperator::LessThanEqual,
                Token::GreaterThanEquals => BinaryOperator::GreaterThanEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            expr = self.binary(op, expr, right, start);
        }

        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut expr = self.parse_multiplicative()?;

        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = self.binary(op, expr, right, start);
        }

        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut expr = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                Token::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = self.binary(op, expr, right, start);
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let op = match self.peek() {
            Token::Bang => UnaryOperator::Not,
            Token::Minus => UnaryOperator::Negative,
            Token::Typeof => UnaryOperator::Typeof,
            Token::PlusPlus | Token::MinusMinus => {
                let op = if matches!(self.advance(), Token::PlusPlus) {
                    UpdateOperator::Increment
                } else {
                    UpdateOperator::Decrement
                };
                let target = self.expect_identifier("after prefix update operator")?;
                return Ok(Node::new(
                    NodeKind::UpdateExpr {
                        op,
                        prefix: true,
                        target,
                    },
                    self.finish_span(start),
                ));
            }
            _ => return self.parse_call_or_member(),
        };
        self.advance();
        let operand = ensure_sufficient_stack(|| self.parse_unary())?;
        Ok(Node::new(
            NodeKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            self.finish_span(start),
        ))
    }

    fn parse_call_or_member(&mut self) -> ParseResult<Node> {
        let start = self.start_span();
        let mut expr = self.parse_primary()?;

        // Handle member access and function calls
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let property = match self.peek().clone() {
                        Token::Identifier(name) | Token::Reserved(name) => {
                            self.advance();
                            name
                        }
                        found => return self.error(format!("Expected property name after '.', found {:?}", found)),
                    };
                    expr = Node::new(
                        NodeKind::MemberExpr {
                            object: Box::new(expr),
                            property,
                        },
                        self.finish_span(start),
                    );
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(Token::RightBracket, "after computed property")?;
                    expr = Node::new(
                        NodeKind::IndexExpr {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        self.finish_span(start),
                    );
                }
                Token::LeftParen => {
                    self.advance();
                    let arguments = self.parse_arguments()?;
                    expr = Node::new(
                        NodeKind::CallExpr {
                            callee: Box::new(expr),
                            arguments,
                        },
                        self.finish_span(start),
                    );
                }
                Token::PlusPlus | Token::MinusMinus
                    if self.peek_spanned().line == self.previous_line() =>
                {
                    let op = if matches!(self.peek(), Token::PlusPlus) {
                        UpdateOperator::Increment
                    } else {
                        UpdateOperator::Decrement
                    };
                    let target = match &expr.kind {
                        NodeKind::Identifier(name) => name.clone(),
                        _ => return self.error("Invalid update target"),
                    };
                    self.advance();
                    expr = Node::new(
                        NodeKind::UpdateExpr {
                            op,
                            prefix: false,
                            target,
                        },
                        self.finish_span(start),
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn parse_arguments(&mut self) -> ParseResult<Vec<Node>> {
        let mut arguments = Vec::new();
        if !matches!(self.peek(), Token::RightParen) {
            loop {
                arguments.push(self.parse_assignment()?);
                match self.peek() {
                    Token::Comma => {
                        self.advance();
                    }
                    Token::RightParen => break,
                    found => {
                        let found = found.clone();
                        return self.error(format!("Expected ',' or ')' in arguments, found {:?}", found));
                    }
                }
            }
        }
        self.advance(); // consume ')'
        Ok(arguments)
    }

    fn parse_primary(&mut self) -> ParseResult<Node> {
        trace!(target: "javascript", "Parsing primary expression, current token: {:?}", self.peek());
        let start = self.start_span();
        let kind = match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                NodeKind::Number(n)
            }
            Token::String(s) => {
                self.advance();
                NodeKind::String(s)
            }
            Token::True => {
                self.advance();
                NodeKind::Boolean(true)
            }
            Token::False => {
                self.advance();
                NodeKind::Boolean(false)
            }
            Token::Null => {
                self.advance();
                NodeKind::Null
            }
            Token::Undefined => {
                self.advance();
                NodeKind::Undefined
            }
            Token::Identifier(name) => {
                self.advance();
                NodeKind::Identifier(name)
            }
            Token::LeftParen => {
                self.advance(); // consume '('
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen, "after parenthesized expression")?;
                if matches!(self.peek(), Token::Arrow) {
                    return self.error("Arrow functions are not supported");
                }
                return Ok(expr);
            }
            Token::LeftBracket => {
                self.advance(); // consume '['
                let mut elements = Vec::new();
                while !matches!(self.peek(), Token::RightBracket) {
                    elements.push(self.parse_assignment()?);
                    if matches!(self.peek(), Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(Token::RightBracket, "to close array literal")?;
                NodeKind::ArrayLiteral(elements)
            }
            Token::LeftBrace => NodeKind::ObjectLiteral(self.parse_object_literal()?),
            Token::Function => {
                self.advance(); // consume 'function'
                let name = match self.peek().clone() {
                    Token::Identifier(name) => {
                        self.advance();
                        name
                    }
                    _ => "anonymous".to_string(),
                };
                let def = self.parse_function_rest(name, start)?;
                NodeKind::FunctionExpr(Rc::new(def))
            }
            Token::New => {
                self.advance(); // consume 'new'
                let constructor = Box::new(ensure_sufficient_stack(|| self.parse_primary())?);
                let arguments = if matches!(self.peek(), Token::LeftParen) {
                    self.advance();
                    self.parse_arguments()?
                } else {
                    Vec::new()
                };
                NodeKind::NewExpr {
                    constructor,
                    arguments,
                }
            }
            Token::Reserved(word) => return self.error(format!("'{}' is not supported", word)),
            found => return self.error(format!("Unexpected token {:?}", found)),
        };

        Ok(Node::new(kind, self.finish_span(start)))
    }

    fn parse_object_literal(&mut self) -> ParseResult<Vec<(String, Node)>> {
        self.advance(); // consume '{'
        let mut properties = Vec::new();

        while !matches!(self.peek(), Token::RightBrace) {
            let key_span = self.start_span();
            let key = match self.peek().clone() {
                Token::Identifier(name) => name,
                Token::String(s) => s,
                Token::Number(n) => n.to_string(),
                found => return self.error(format!("Unexpected token {:?} in object literal", found)),
            };
            self.advance();

            let value = if matches!(self.peek(), Token::Colon) {
                self.advance(); // consume ':'
                self.parse_assignment()?
            } else {
                // ES6 shorthand property: { key } is { key: key }
                Node::new(NodeKind::Identifier(key.clone()), key_span)
            };
            properties.push((key, value));

            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(Token::RightBrace, "to close object literal")?;

        Ok(properties)
    }
}

pub fn parse(source: &str) -> Result<Node, ParseError> {
    let mut parser = Parser::new(source)?;
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statements(source: &str) -> Vec<Node> {
        match parse(source).expect("source should parse").into_kind() {
            NodeKind::Program(statements) => statements,
            other => panic!("expected program, got {:?}", other),
        }
    }

    #[test]
    fn test_function_declaration_lines() {
        let program = statements("function add(a, b) {\n  const sum = a + b;\n  return sum;\n}\nadd(1, 2);");
        assert_eq!(program.len(), 2);

        let NodeKind::FunctionDecl(def) = &program[0].kind else {
            panic!("expected function declaration");
        };
        assert_eq!(def.name, "add");
        assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(def.body.len(), 2);
        assert_eq!(def.body[0].line(), 2);
        assert_eq!(def.body[1].line(), 3);
        assert_eq!(program[0].span.end_line, 4);
        assert_eq!(program[1].line(), 5);
    }

    #[test]
    fn test_multiple_declarators_keep_their_lines() {
        let program = statements("let a = 1,\n    b = 2;");
        let NodeKind::VariableDecl { declarations, .. } = &program[0].kind else {
            panic!("expected declaration");
        };
        let lines: Vec<usize> = declarations.iter().map(|d| d.span.line).collect();
        assert_eq!(lines, vec![1, 2]);
    }

    #[test]
    fn test_operator_precedence() {
        let program = statements("x = 1 + 2 * 3 < 10 && ok;");
        let NodeKind::ExpressionStatement(expr) = &program[0].kind else {
            panic!("expected expression statement");
        };
        assert_eq!(expr.to_string(), "x = 1 + 2 * 3 < 10 && ok");
        let NodeKind::AssignmentExpr { value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, NodeKind::LogicalOp { op: LogicalOperator::And, .. }));
    }

    #[test]
    fn test_if_without_braces() {
        let program = statements("function f(n) { if (n <= 1) return 1; return n; }");
        let NodeKind::FunctionDecl(def) = &program[0].kind else {
            panic!("expected function declaration");
        };
        let NodeKind::IfStatement { consequent, alternate, .. } = &def.body[0].kind else {
            panic!("expected if statement");
        };
        assert!(matches!(consequent.kind, NodeKind::ReturnStatement(Some(_))));
        assert!(alternate.is_none());
    }

    #[test]
    fn test_for_loop_parts() {
        let program = statements("for (let i = 0; i < 3; i++) { total += i; }");
        let NodeKind::ForLoop { init, condition, update, .. } = &program[0].kind else {
            panic!("expected for loop");
        };
        assert!(matches!(init.as_deref().map(|n| &n.kind), Some(NodeKind::VariableDecl { .. })));
        assert!(condition.is_some());
        assert!(update.is_some());
    }

    #[test]
    fn test_unsupported_constructs_still_parse() {
        let program = statements("const xs = [1, 2];\nconst o = { a: 1, b };\nconst m = Math.max(1, 2);");
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_missing_semicolons_between_lines() {
        let program = statements("let a = 1\nlet b = a\nconsole.log(b)");
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse("let = 5;").expect_err("missing identifier");
        assert_eq!(err.line, Some(1));

        let err = parse("function f( {\n}").expect_err("bad params");
        assert_eq!(err.line, Some(1));

        let err = parse("let a = 1;\nreturn a;").expect_err("top-level return");
        assert_eq!(err.line, Some(2));

        assert!(parse("const x;").is_err());
        assert!(parse("let a = 1 2;").is_err());
        assert!(parse("const f = (x) => x;").is_err());
        assert!(parse("if (x {").is_err());
    }

    #[test]
    fn test_loop_control_statements() {
        let program = statements("while (true) {\n  if (done) break;\n  continue;\n}");
        let NodeKind::WhileLoop { body, .. } = &program[0].kind else {
            panic!("expected while loop");
        };
        let NodeKind::Block(body) = &body.kind else {
            panic!("expected block body");
        };
        assert!(matches!(body[1].kind, NodeKind::Continue));
        assert_eq!(body[1].line(), 3);

        let err = parse("break;").expect_err("break outside loop");
        assert_eq!(err.line, Some(1));
        let err = parse("for (;;) {\n  function f() { continue; }\n}").expect_err("continue inside function");
        assert_eq!(err.line, Some(2));
        assert!(parse("outer: while (true) { break outer; }").is_err());
    }

    #[test]
    fn test_reserved_words_are_rejected() {
        for source in ["throw 1;", "class A {}", "try { x(); } catch (e) {}", "const t = this;", "do { x++; } while (x < 3);"] {
            assert!(parse(source).is_err(), "{} should not parse", source);
        }
        // Reserved words remain valid property names.
        assert_eq!(statements("promise.catch(handle);").len(), 1);
    }

    #[test]
    fn test_deeply_nested_expressions() {
        let depth = 20_000;
        let source = format!("let x = {}1{};", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(statements(&source).len(), 1);

        let source = format!("let y = {}1;", "!".repeat(depth));
        assert_eq!(statements(&source).len(), 1);

        let source = format!("{}{}", "{".repeat(depth), "}".repeat(depth));
        assert_eq!(statements(&source).len(), 1);
    }
}
