pub mod ast;
pub mod parser;
pub mod runtime;
pub mod scope;
pub mod tokenizer;
pub mod value;

pub use parser::parse;
pub use runtime::Runtime;
pub use scope::ScopeChain;
pub use value::JsValue;

const RED_ZONE: usize = 100 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Grow the host stack before recursing. Parsing, evaluating, rendering and
/// dropping deeply nested programs are then bounded by memory and by the
/// tracer's own limits rather than by the thread's stack size.
#[inline]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
