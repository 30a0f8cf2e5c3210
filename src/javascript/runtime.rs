//! Tree-walking evaluator that suspends after every observable effect.
//!
//! Each suspension copies the live state (variables, call stack, console
//! buffer) into an [`ExecutionSnapshot`] and hands it to the recorder.

use super::ast::{
    BinaryOperator, FunctionDef, LogicalOperator, Node, NodeKind, UnaryOperator, UpdateOperator,
};
use super::scope::ScopeChain;
use super::ensure_sufficient_stack;
use super::value::{JsFunction, JsValue};
use crate::TracerConfig;
use crate::error::TraceError;
use crate::trace::{ConsoleRecord, ExecutionSnapshot, Recorder, Severity, VariableRecord};
use log::{debug, log, trace, warn};
use std::cmp::Ordering;
use std::rc::Rc;

type EvalResult<T> = Result<T, TraceError>;

/// How a statement finished.
enum Completion {
    Normal,
    Return(JsValue),
    Break,
    Continue,
}

/// One evaluation session: owns the scope chain, call stack and console
/// buffer of a single run.
pub struct Runtime<'r> {
    config: TracerConfig,
    scopes: ScopeChain,
    call_stack: Vec<String>,
    console: Vec<ConsoleRecord>,
    steps: usize,
    recorder: &'r mut dyn Recorder,
}

impl<'r> Runtime<'r> {
    pub fn new(config: &TracerConfig, recorder: &'r mut dyn Recorder) -> Self {
        Self {
            config: config.clone(),
            scopes: ScopeChain::new(),
            call_stack: Vec::new(),
            console: Vec::new(),
            steps: 0,
            recorder,
        }
    }

    /// Number of snapshots emitted so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Run a whole program. On error the snapshots already recorded stay
    /// with the recorder.
    pub fn execute(&mut self, program: &Node) -> EvalResult<()> {
        let statements = match &program.kind {
            NodeKind::Program(statements) => statements.as_slice(),
            _ => std::slice::from_ref(program),
        };
        debug!(target: "javascript", "Executing program with {} statements", statements.len());

        match self.execute_statements(statements) {
            Ok(Completion::Normal) => {
                debug!(target: "javascript", "Program finished after {} steps", self.steps);
                Ok(())
            }
            Ok(_) => Err(TraceError::InvariantViolation(
                "control flow escaped the program body".to_string(),
            )),
            Err(e) => {
                warn!(target: "javascript", "Run aborted after {} steps: {}", self.steps, e);
                Err(e)
            }
        }
    }

    fn execute_statements(&mut self, statements: &[Node]) -> EvalResult<Completion> {
        self.hoist_functions(statements);
        for statement in statements {
            let completion = self.execute_statement(statement)?;
            if !matches!(completion, Completion::Normal) {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal)
    }

    /// Function declarations are callable before the line that declares
    /// them. Hoisting binds them silently; the declaration still suspends
    /// when execution reaches it.
    fn hoist_functions(&mut self, statements: &[Node]) {
        for statement in statements {
            if let NodeKind::FunctionDecl(def) = &statement.kind {
                self.declare_function(def);
            }
        }
    }

    fn declare_function(&mut self, def: &Rc<FunctionDef>) {
        let function = JsFunction {
            def: Rc::clone(def),
            closure_scope: self.scopes.innermost_id(),
        };
        self.scopes.declare(&def.name, JsValue::Function(function));
    }

    fn execute_statement(&mut self, node: &Node) -> EvalResult<Completion> {
        ensure_sufficient_stack(|| self.execute_statement_inner(node))
    }

    fn execute_statement_inner(&mut self, node: &Node) -> EvalResult<Completion> {
        match &node.kind {
            NodeKind::VariableDecl { declarations, .. } => {
                for declarator in declarations {
                    let value = match &declarator.init {
                        Some(init) => self.evaluate(init)?,
                        None => JsValue::Undefined,
                    };
                    trace!(target: "javascript", "Declaring {} = {}", declarator.name, value.inspect());
                    self.scopes.declare(&declarator.name, value);
                    self.suspend(declarator.span.line)?;
                }
                Ok(Completion::Normal)
            }
            NodeKind::FunctionDecl(def) => {
                self.declare_function(def);
                self.suspend(node.line())?;
                Ok(Completion::Normal)
            }
            NodeKind::ReturnStatement(argument) => {
                let value = match argument {
                    Some(expr) => self.evaluate(expr)?,
                    None => JsValue::Undefined,
                };
                let pseudo = self.config.record_return_values.then(|| VariableRecord {
                    name: "return value".to_string(),
                    value: value.to_string(),
                    type_tag: value.type_tag().to_string(),
                    scope: self.scopes.innermost_name().to_string(),
                });
                self.suspend_with(node.line(), pseudo)?;
                Ok(Completion::Return(value))
            }
            NodeKind::IfStatement {
                condition,
                consequent,
                alternate,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_statement(consequent)
                } else if let Some(alternate) = alternate {
                    self.execute_statement(alternate)
                } else {
                    Ok(Completion::Normal)
                }
            }
            NodeKind::WhileLoop { condition, body } => {
                let mut iterations = 0;
                while self.evaluate(condition)?.is_truthy() {
                    self.count_iteration(&mut iterations, node.line())?;
                    match self.execute_statement(body)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            NodeKind::ForLoop {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.execute_statement(init)?;
                }
                let mut iterations = 0;
                loop {
                    if let Some(condition) = condition {
                        if !self.evaluate(condition)?.is_truthy() {
                            break;
                        }
                    }
                    self.count_iteration(&mut iterations, node.line())?;
                    match self.execute_statement(body)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if let Some(update) = update {
                        self.execute_statement(update)?;
                    }
                }
                Ok(Completion::Normal)
            }
            NodeKind::Block(statements) | NodeKind::Program(statements) => {
                self.execute_statements(statements)
            }
            NodeKind::ExpressionStatement(expr) => {
                self.evaluate(expr)?;
                Ok(Completion::Normal)
            }
            NodeKind::Break => Ok(Completion::Break),
            NodeKind::Continue => Ok(Completion::Continue),
            NodeKind::Empty => Ok(Completion::Normal),
            _ => {
                self.evaluate(node)?;
                Ok(Completion::Normal)
            }
        }
    }

    fn count_iteration(&self, iterations: &mut usize, line: usize) -> EvalResult<()> {
        *iterations += 1;
        if *iterations > self.config.max_loop_iterations {
            warn!(target: "javascript", "Loop on line {} exceeded {} iterations", line, self.config.max_loop_iterations);
            return Err(TraceError::LoopLimitExceeded {
                limit: self.config.max_loop_iterations,
                line,
            });
        }
        Ok(())
    }

    fn evaluate(&mut self, node: &Node) -> EvalResult<JsValue> {
        ensure_sufficient_stack(|| self.evaluate_inner(node))
    }

    fn evaluate_inner(&mut self, node: &Node) -> EvalResult<JsValue> {
        match &node.kind {
            NodeKind::Number(n) => Ok(JsValue::Number(*n)),
            NodeKind::String(s) => Ok(JsValue::String(s.clone())),
            NodeKind::Boolean(b) => Ok(JsValue::Boolean(*b)),
            NodeKind::Null => Ok(JsValue::Null),
            NodeKind::Undefined => Ok(JsValue::Undefined),

            NodeKind::Identifier(name) => Ok(self
                .scopes
                .resolve(name)
                .unwrap_or_else(|| unresolved_variable(name))),

            NodeKind::BinaryOp { op, left, right } => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;
                Ok(binary_op(*op, &left_val, &right_val).unwrap_or_else(|| unknown_expression(node)))
            }

            NodeKind::LogicalOp { op, left, right } => {
                let left_val = self.evaluate(left)?;
                match (op, left_val.is_truthy()) {
                    (LogicalOperator::And, true) | (LogicalOperator::Or, false) => {
                        self.evaluate(right)
                    }
                    _ => Ok(left_val),
                }
            }

            NodeKind::UnaryOp { op, operand } => {
                if let (UnaryOperator::Typeof, NodeKind::Identifier(name)) = (op, &operand.kind) {
                    // Undeclared names are not an error for `typeof`.
                    if self.scopes.resolve(name).is_none() {
                        return Ok(JsValue::String("undefined".to_string()));
                    }
                }
                let value = self.evaluate(operand)?;
                if value.is_unknown() {
                    return Ok(unknown_expression(node));
                }
                Ok(match op {
                    UnaryOperator::Not => JsValue::Boolean(!value.is_truthy()),
                    UnaryOperator::Negative => match to_number(&value) {
                        Some(n) => JsValue::Number(-n),
                        None => unknown_expression(node),
                    },
                    UnaryOperator::Typeof => JsValue::String(value.type_tag().to_string()),
                })
            }

            NodeKind::UpdateExpr { op, prefix, target } => {
                let value = match self.scopes.resolve(target).as_ref().and_then(JsValue::as_number) {
                    Some(old) => {
                        let new = match op {
                            UpdateOperator::Increment => old + 1.0,
                            UpdateOperator::Decrement => old - 1.0,
                        };
                        self.scopes.assign(target, JsValue::Number(new));
                        JsValue::Number(if *prefix { new } else { old })
                    }
                    None => {
                        let placeholder = unknown_expression(node);
                        self.scopes.assign(target, placeholder.clone());
                        placeholder
                    }
                };
                self.suspend(node.line())?;
                Ok(value)
            }

            NodeKind::AssignmentExpr { op, target, value } => {
                // Compound assignment reads the target before evaluating the right side.
                let current = op.binary().map(|binary| {
                    let current = self
                        .scopes
                        .resolve(target)
                        .unwrap_or_else(|| unresolved_variable(target));
                    (binary, current)
                });
                let rhs = self.evaluate(value)?;
                let new = match current {
                    None => rhs,
                    Some((binary, current)) => binary_op(binary, &current, &rhs).unwrap_or_else(|| {
                        JsValue::Unknown(format!("[Expression: {} {} {}]", target, binary.symbol(), value))
                    }),
                };
                trace!(target: "javascript", "Assigning {} = {}", target, new.inspect());
                self.scopes.assign(target, new.clone());
                self.suspend(node.line())?;
                Ok(new)
            }

            NodeKind::TernaryExpr {
                condition,
                true_expr,
                false_expr,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(true_expr)
                } else {
                    self.evaluate(false_expr)
                }
            }

            NodeKind::CallExpr { callee, arguments } => self.evaluate_call(callee, arguments, node),

            NodeKind::MemberExpr { object, .. } => {
                self.evaluate(object)?;
                Ok(unsupported(node, "Member Expression"))
            }
            NodeKind::IndexExpr { object, index } => {
                self.evaluate(object)?;
                self.evaluate(index)?;
                Ok(unsupported(node, "Index Expression"))
            }
            NodeKind::MemberAssignment { target, value } => {
                self.evaluate(target)?;
                self.evaluate(value)?;
                Ok(unsupported(node, "Member Assignment"))
            }
            NodeKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.evaluate(element)?;
                }
                Ok(unsupported(node, "Array"))
            }
            NodeKind::ObjectLiteral(properties) => {
                for (_, value) in properties {
                    self.evaluate(value)?;
                }
                Ok(unsupported(node, "Object"))
            }
            NodeKind::FunctionExpr(_) => Ok(unsupported(node, "Function Expression")),
            NodeKind::NewExpr { arguments, .. } => {
                self.evaluate_arguments(arguments)?;
                Ok(unsupported(node, "New Expression"))
            }

            NodeKind::ExpressionStatement(expr) => self.evaluate(expr),
            NodeKind::VariableDecl { .. }
            | NodeKind::FunctionDecl(_)
            | NodeKind::ReturnStatement(_)
            | NodeKind::IfStatement { .. }
            | NodeKind::WhileLoop { .. }
            | NodeKind::ForLoop { .. }
            | NodeKind::Block(_)
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Empty
            | NodeKind::Program(_) => Err(TraceError::InvariantViolation(format!(
                "statement on line {} evaluated as an expression",
                node.line()
            ))),
        }
    }

    fn evaluate_arguments(&mut self, arguments: &[Node]) -> EvalResult<Vec<JsValue>> {
        arguments.iter().map(|arg| self.evaluate(arg)).collect()
    }

    fn evaluate_call(&mut self, callee: &Node, arguments: &[Node], node: &Node) -> EvalResult<JsValue> {
        if let Some(severity) = console_method(callee) {
            return self.console_call(severity, arguments, node.line());
        }

        let target = match &callee.kind {
            NodeKind::Identifier(name) => self.scopes.resolve(name),
            _ => Some(self.evaluate(callee)?),
        };
        let args = self.evaluate_arguments(arguments)?;

        match target {
            Some(JsValue::Function(function)) => {
                let name = match &callee.kind {
                    NodeKind::Identifier(name) => name.clone(),
                    _ => function.name().to_string(),
                };
                self.call_function(&function, &name, args, node.line())
            }
            _ => {
                debug!(target: "javascript", "Call to non-user function {} on line {}", callee, node.line());
                Ok(JsValue::Unknown(format!("[Result of {}()]", callee)))
            }
        }
    }

    fn console_call(&mut self, severity: Severity, arguments: &[Node], line: usize) -> EvalResult<JsValue> {
        let content = self
            .evaluate_arguments(arguments)?
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        log!(target: "js-console", severity.log_level(), "{}", content);
        self.console.push(ConsoleRecord::new(severity, content));
        self.suspend(line)?;
        Ok(JsValue::Undefined)
    }

    fn call_function(
        &mut self,
        function: &JsFunction,
        name: &str,
        args: Vec<JsValue>,
        call_line: usize,
    ) -> EvalResult<JsValue> {
        let depth = self.call_stack.len();
        if depth >= self.config.max_call_depth {
            warn!(target: "javascript", "Call depth limit {} reached calling {} on line {}", self.config.max_call_depth, name, call_line);
            return Err(TraceError::StackOverflow {
                depth: depth + 1,
                limit: self.config.max_call_depth,
                line: call_line,
            });
        }

        let label = format!(
            "{}({})",
            name,
            args.iter().map(JsValue::inspect).collect::<Vec<_>>().join(", ")
        );
        debug!(target: "javascript", "Calling {}", label);
        self.call_stack.push(label);
        self.scopes.push_scope_with_parent(name, function.closure_scope);

        let def = Rc::clone(&function.def);
        let mut args = args.into_iter();
        for param in &def.params {
            self.scopes.declare(param, args.next().unwrap_or(JsValue::Undefined));
        }

        let outcome = self.run_function_body(&def);
        self.scopes.pop_scope()?;
        self.call_stack.pop();
        let value = outcome?;

        self.suspend(call_line)?;
        Ok(value)
    }

    fn run_function_body(&mut self, def: &FunctionDef) -> EvalResult<JsValue> {
        self.suspend(def.span.line)?;
        match self.execute_statements(&def.body)? {
            Completion::Return(value) => Ok(value),
            Completion::Normal => Ok(JsValue::Undefined),
            Completion::Break | Completion::Continue => Err(TraceError::InvariantViolation(format!(
                "loop control escaped function '{}'",
                def.name
            ))),
        }
    }

    fn suspend(&mut self, line: usize) -> EvalResult<()> {
        self.suspend_with(line, None)
    }

    /// Emit one snapshot for the 1-based `line`.
    fn suspend_with(&mut self, line: usize, extra: Option<VariableRecord>) -> EvalResult<()> {
        if self.steps >= self.config.max_steps {
            warn!(target: "javascript", "Step limit {} reached on line {}", self.config.max_steps, line);
            return Err(TraceError::StepLimitExceeded {
                limit: self.config.max_steps,
            });
        }
        if self.call_stack.len() + 1 != self.scopes.depth() {
            return Err(TraceError::InvariantViolation(format!(
                "call stack depth {} does not match {} scopes",
                self.call_stack.len(),
                self.scopes.depth()
            )));
        }

        self.steps += 1;
        let mut variables = self.scopes.snapshot_variables();
        variables.extend(extra);
        self.recorder.record(ExecutionSnapshot {
            source_line: line.saturating_sub(1),
            variables,
            call_stack: self.call_stack.clone(),
            console_output: self.console.clone(),
        });
        Ok(())
    }
}

fn console_method(callee: &Node) -> Option<Severity> {
    match &callee.kind {
        NodeKind::MemberExpr { object, property } => match &object.kind {
            NodeKind::Identifier(name) if name == "console" => Severity::from_console_method(property),
            _ => None,
        },
        _ => None,
    }
}

fn unresolved_variable(name: &str) -> JsValue {
    JsValue::Unknown(format!("[Variable: {}]", name))
}

fn unknown_expression(node: &Node) -> JsValue {
    JsValue::Unknown(format!("[Expression: {}]", node))
}

fn unsupported(node: &Node, kind: &str) -> JsValue {
    debug!(target: "javascript", "Unsupported construct on line {}: {}", node.line(), node);
    JsValue::Unknown(format!("[{}]", kind))
}

/// `None` when the operation cannot be reduced to a known value.
fn binary_op(op: BinaryOperator, left: &JsValue, right: &JsValue) -> Option<JsValue> {
    if left.is_unknown() || right.is_unknown() {
        return None;
    }
    match op {
        BinaryOperator::Add => match (left, right) {
            (JsValue::Number(a), JsValue::Number(b)) => Some(JsValue::Number(a + b)),
            (JsValue::String(_), _) | (_, JsValue::String(_)) => {
                Some(JsValue::String(format!("{}{}", left, right)))
            }
            _ => None,
        },
        BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => {
            let (a, b) = (left.as_number()?, right.as_number()?);
            Some(JsValue::Number(match op {
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => a / b,
                _ => a % b,
            }))
        }
        BinaryOperator::LessThan
        | BinaryOperator::GreaterThan
        | BinaryOperator::LessThanEqual
        | BinaryOperator::GreaterThanEqual => {
            let ordering = match (left, right) {
                (JsValue::Number(a), JsValue::Number(b)) => a.partial_cmp(b),
                (JsValue::String(a), JsValue::String(b)) => Some(a.cmp(b)),
                _ => return None,
            };
            let result = match op {
                BinaryOperator::LessThan => ordering == Some(Ordering::Less),
                BinaryOperator::GreaterThan => ordering == Some(Ordering::Greater),
                BinaryOperator::LessThanEqual => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                }
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            };
            Some(JsValue::Boolean(result))
        }
        BinaryOperator::StrictEqual => Some(JsValue::Boolean(left == right)),
        BinaryOperator::StrictNotEqual => Some(JsValue::Boolean(left != right)),
        BinaryOperator::Equal => Some(JsValue::Boolean(loose_equals(left, right))),
        BinaryOperator::NotEqual => Some(JsValue::Boolean(!loose_equals(left, right))),
    }
}

fn loose_equals(left: &JsValue, right: &JsValue) -> bool {
    use JsValue::{Boolean, Null, Number, String, Undefined};
    match (left, right) {
        (Undefined | Null, Undefined | Null) => true,
        (Undefined | Null, _) | (_, Undefined | Null) => false,
        (Number(_) | Boolean(_) | String(_), Number(_) | Boolean(_))
        | (Number(_) | Boolean(_), String(_)) => to_number(left) == to_number(right),
        _ => left == right,
    }
}

/// Numeric value of a string the way JavaScript reads it. Rust's float
/// parser also takes `inf` and `nan` in any case, which JavaScript does not.
fn string_to_number(text: &str) -> f64 {
    match text {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if text.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) => f64::NAN,
        _ => text.parse().unwrap_or(f64::NAN),
    }
}

fn to_number(value: &JsValue) -> Option<f64> {
    match value {
        JsValue::Number(n) => Some(*n),
        JsValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        JsValue::Null => Some(0.0),
        JsValue::Undefined | JsValue::Function(_) => Some(f64::NAN),
        JsValue::String(s) => Some(string_to_number(s.trim())),
        JsValue::Unknown(_) => None,
    }
}
