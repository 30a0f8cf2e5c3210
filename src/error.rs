use thiserror::Error;

/// Grammar violation reported by the tokenizer or parser.
///
/// `line` is 1-based, matching the annotations on AST nodes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_parse_error(.message, .line))]
pub struct ParseError {
    pub message: String,
    pub line: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }

    pub fn at(message: impl Into<String>, line: usize) -> Self {
        Self::new(message, Some(line))
    }
}

fn render_parse_error(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("Parse error on line {}: {}", line, message),
        None => format!("Parse error: {}", message),
    }
}

/// Conditions that abort a traced run.
///
/// Every variant is fatal to the run; the snapshots recorded before the
/// failure are kept by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Maximum call stack size exceeded: depth {depth} reached the limit of {limit} (line {line})")]
    StackOverflow {
        depth: usize,
        limit: usize,
        line: usize,
    },

    #[error("Execution stopped after {limit} steps")]
    StepLimitExceeded { limit: usize },

    #[error("Loop on line {line} exceeded {limit} iterations")]
    LoopLimitExceeded { limit: usize, line: usize },

    #[error("Interpreter invariant violated: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        assert_eq!(
            ParseError::at("Expected ')'", 3).to_string(),
            "Parse error on line 3: Expected ')'"
        );
        assert_eq!(
            ParseError::new("Unexpected end of input", None).to_string(),
            "Parse error: Unexpected end of input"
        );
    }

    #[test]
    fn test_trace_error_wraps_parse_error() {
        let err: TraceError = ParseError::at("bad token", 1).into();
        assert_eq!(err.to_string(), "Parse error on line 1: bad token");
    }
}
