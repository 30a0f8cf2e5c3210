//! Line-by-line approximation of a trace for source that does not parse.
//!
//! Nothing is evaluated here. Each meaningful line is lenient-tokenized and
//! matched against a few shapes (declarations with literal initializers,
//! calls, returns, console calls), which is enough to give the display
//! layer something to step through while the user fixes the syntax error.

use super::{ConsoleRecord, ExecutionSnapshot, ExecutionTrace, Severity, VariableRecord};
use crate::javascript::scope::GLOBAL_SCOPE;
use crate::javascript::tokenizer::{SpannedToken, Token, tokenize_lenient};
use crate::javascript::value::format_number;
use log::debug;

/// Metadata of one physical source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
    /// 0-based.
    pub line_number: usize,
    /// The line with surrounding whitespace removed.
    pub content: String,
    pub is_empty: bool,
    pub is_comment: bool,
}

pub fn extract_line_info(source: &str) -> Vec<LineInfo> {
    source
        .split('\n')
        .enumerate()
        .map(|(line_number, line)| {
            let content = line.trim();
            LineInfo {
                line_number,
                content: content.to_string(),
                is_empty: content.is_empty(),
                is_comment: content.starts_with("//"),
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct Approximation {
    variables: Vec<VariableRecord>,
    call_stack: Vec<String>,
    console: Vec<ConsoleRecord>,
}

impl Approximation {
    fn current_scope(&self) -> String {
        self.call_stack
            .last()
            .map(|frame| frame.trim_end_matches("()").to_string())
            .unwrap_or_else(|| GLOBAL_SCOPE.to_string())
    }

    fn declare(&mut self, name: &str, value: String, type_tag: &str) {
        let scope = self.current_scope();
        let record = VariableRecord {
            name: name.to_string(),
            value,
            type_tag: type_tag.to_string(),
            scope,
        };
        match self
            .variables
            .iter_mut()
            .find(|v| v.name == record.name && v.scope == record.scope)
        {
            Some(existing) => *existing = record,
            None => self.variables.push(record),
        }
    }

    fn apply(&mut self, tokens: &[Token]) {
        if let Some((name, value, type_tag)) = declaration(tokens) {
            self.declare(&name, value, &type_tag);
        }
        if let Some((severity, content)) = console_literal(tokens) {
            self.console.push(ConsoleRecord::new(severity, content));
        } else if let Some(callee) = first_call(tokens) {
            self.call_stack.push(format!("{}()", callee));
        }
        if tokens.contains(&Token::Return) {
            self.call_stack.pop();
        }
    }

    fn snapshot(&self, line: usize) -> ExecutionSnapshot {
        ExecutionSnapshot {
            source_line: line,
            variables: self.variables.clone(),
            call_stack: self.call_stack.clone(),
            console_output: self.console.clone(),
        }
    }
}

/// `var|let|const name = <literal>` yields the name, display value and
/// type tag. Non-literal initializers are reported as unknown.
fn declaration(tokens: &[Token]) -> Option<(String, String, String)> {
    let start = tokens
        .iter()
        .position(|t| matches!(t, Token::Var | Token::Let | Token::Const))?;
    let [Token::Identifier(name), Token::Equals, rest @ ..] = &tokens[start + 1..] else {
        return None;
    };
    let (value, type_tag) = match rest {
        [Token::Number(n), ..] => (format_number(*n), "number"),
        [Token::Minus, Token::Number(n), ..] => (format_number(-n), "number"),
        [Token::String(s), ..] => (s.clone(), "string"),
        [Token::True, ..] => ("true".to_string(), "boolean"),
        [Token::False, ..] => ("false".to_string(), "boolean"),
        _ => ("unknown".to_string(), "unknown"),
    };
    Some((name.clone(), value, type_tag.to_string()))
}

/// `console.<method>("literal")` yields the literal text only.
fn console_literal(tokens: &[Token]) -> Option<(Severity, String)> {
    tokens.windows(5).find_map(|window| match window {
        [
            Token::Identifier(object),
            Token::Dot,
            Token::Identifier(method),
            Token::LeftParen,
            Token::String(text),
        ] if object == "console" => {
            Severity::from_console_method(method).map(|severity| (severity, text.clone()))
        }
        _ => None,
    })
}

/// The first `ident(` on the line that is not a method call. Keywords such
/// as `switch` and `catch` lex as reserved words and never match.
fn first_call(tokens: &[Token]) -> Option<&str> {
    tokens.windows(2).enumerate().find_map(|(i, window)| match window {
        [Token::Identifier(name), Token::LeftParen]
            if !matches!(i.checked_sub(1).map(|p| &tokens[p]), Some(Token::Dot)) =>
        {
            Some(name.as_str())
        }
        _ => None,
    })
}

/// Approximate a trace line by line. Never fails and never returns an
/// empty trace.
pub fn analyze(source: &str) -> ExecutionTrace {
    let mut state = Approximation::default();
    let mut snapshots = Vec::new();

    for line in extract_line_info(source) {
        if line.is_empty || line.is_comment {
            continue;
        }
        let tokens: Vec<Token> = tokenize_lenient(&line.content)
            .into_iter()
            .map(|SpannedToken { token, .. }| token)
            .filter(|token| *token != Token::EOF)
            .collect();
        state.apply(&tokens);
        snapshots.push(state.snapshot(line.line_number));
    }

    if snapshots.is_empty() {
        snapshots.push(ExecutionSnapshot::default());
    }
    debug!(target: "fallback", "Approximated {} steps from {} lines", snapshots.len(), source.lines().count());
    ExecutionTrace::from_snapshots(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_line_info() {
        let info = extract_line_info("  let a = 1;\n\n// note\n");
        assert_eq!(info.len(), 4);
        assert_eq!(info[0].content, "let a = 1;");
        assert!(!info[0].is_empty);
        assert!(info[1].is_empty);
        assert!(info[2].is_comment);
        assert_eq!(info[2].line_number, 2);
    }

    #[test]
    fn test_blank_source_yields_single_empty_snapshot() {
        let trace = analyze("\n   \n// only a comment");
        assert_eq!(trace.snapshots(), &[ExecutionSnapshot::default()]);
    }

    #[test]
    fn test_literal_declarations() {
        let trace = analyze("let count = 3;\nconst name = 'Ada';\nvar on = true;\nlet broken = (;");
        let last = trace.iter().last().expect("snapshot");
        let values: Vec<(&str, &str, &str)> = last
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.value.as_str(), v.type_tag.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("count", "3", "number"),
                ("name", "Ada", "string"),
                ("on", "true", "boolean"),
                ("broken", "unknown", "unknown"),
            ]
        );
    }

    #[test]
    fn test_calls_and_returns_approximate_the_stack() {
        let source = "function greet(who) {\n  let msg = 'hi';\n  return msg;\n}\ngreet('Bob'";
        let trace = analyze(source);
        let stacks: Vec<Vec<String>> = trace.iter().map(|s| s.call_stack.clone()).collect();
        assert_eq!(
            stacks,
            vec![
                vec!["greet()".to_string()],
                vec!["greet()".to_string()],
                vec![],
                vec![],
                vec!["greet()".to_string()],
            ]
        );
        assert_eq!(trace.get(1).expect("second").variables[0].scope, "greet");
    }

    #[test]
    fn test_console_literal_is_recorded() {
        let trace = analyze("console.log(\"starting\");\nconsole.log(total);");
        let last = trace.iter().last().expect("snapshot");
        assert_eq!(last.console_output, vec![ConsoleRecord::new(Severity::Log, "starting")]);
        assert!(last.call_stack.is_empty());
    }

    #[test]
    fn test_lines_increase_monotonically() {
        let trace = analyze("let a = 1;\n\nlet b = 2;\n// skip\nlet c = ;");
        let lines: Vec<usize> = trace.iter().map(|s| s.source_line).collect();
        assert_eq!(lines, vec![0, 2, 4]);
    }

    #[test]
    fn test_statement_keywords_are_not_calls() {
        let trace = analyze("switch (mode) {\n}\ntry { run(; } catch (e) {\n}");
        let stacks: Vec<Vec<String>> = trace.iter().map(|s| s.call_stack.clone()).collect();
        assert_eq!(stacks, vec![vec![], vec![], vec!["run()".to_string()], vec!["run()".to_string()]]);
    }
}
