use super::ast::FunctionDef;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Function(JsFunction),
    /// A value the evaluator could not reduce, carried as a readable
    /// placeholder such as `[Expression: a * b]`.
    Unknown(String),
}

/// A callable user function and the scope it was declared in.
#[derive(Debug, Clone)]
pub struct JsFunction {
    pub def: Rc<FunctionDef>,
    /// Id of the declaring scope; resolution inside the body continues there.
    pub closure_scope: usize,
}

impl JsFunction {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
            (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
            (JsValue::Number(a), JsValue::Number(b)) => a == b,
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Function(a), JsValue::Function(b)) => Rc::ptr_eq(&a.def, &b.def),
            (JsValue::Unknown(a), JsValue::Unknown(b)) => a == b,
            _ => false,
        }
    }
}

impl JsValue {
    /// The tag shown next to a variable: `typeof` for known values,
    /// `"unknown"` for placeholders.
    pub fn type_tag(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object", // JavaScript quirk
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Function(_) => "function",
            JsValue::Unknown(_) => "unknown",
        }
    }

    /// Like `display`, but strings are quoted. Used for call frame labels.
    pub fn inspect(&self) -> String {
        match self {
            JsValue::String(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, JsValue::Unknown(_))
    }

    /// JavaScript truthiness. Placeholders count as falsy so that a branch or
    /// loop on an unreducible condition is skipped rather than guessed.
    pub fn is_truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null | JsValue::Unknown(_) => false,
            JsValue::Boolean(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Function(_) => true,
        }
    }
}

/// Display string as the variable and console panels show it.
impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{}", b),
            JsValue::Number(n) => write!(f, "{}", format_number(*n)),
            JsValue::String(s) => write!(f, "{}", s),
            JsValue::Function(func) => write!(f, "[Function: {}]", func.name()),
            JsValue::Unknown(placeholder) => write!(f, "{}", placeholder),
        }
    }
}

/// Format a number the way JavaScript's `String(n)` does for the common cases.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n == 0.0 {
        // covers -0
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let formatted = format!("{:e}", n);
        // Rust renders `1e21`; JavaScript renders `1e+21`.
        match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        }
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(120.0), "120");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(JsValue::Number(1.0).type_tag(), "number");
        assert_eq!(JsValue::String("a".into()).type_tag(), "string");
        assert_eq!(JsValue::Null.type_tag(), "object");
        assert_eq!(JsValue::Unknown("[Complex Value]".into()).type_tag(), "unknown");
    }

    #[test]
    fn test_display_and_inspect() {
        let s = JsValue::String("Bob".into());
        assert_eq!(s.to_string(), "Bob");
        assert_eq!(s.inspect(), "\"Bob\"");
        assert_eq!(JsValue::Boolean(false).inspect(), "false");
    }

    #[test]
    fn test_truthiness() {
        assert!(JsValue::Number(3.0).is_truthy());
        assert!(!JsValue::Number(0.0).is_truthy());
        assert!(!JsValue::String(String::new()).is_truthy());
        assert!(!JsValue::Unknown("[Variable: x]".into()).is_truthy());
    }
}
