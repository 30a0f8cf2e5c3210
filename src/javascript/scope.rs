//! Scope chain of a single traced run.
//!
//! The chain holds every active scope from the global one to the innermost
//! function scope, so its length always mirrors the call stack. Name lookup
//! follows each scope's parent link rather than walking the chain by
//! position, which keeps a callee from seeing its caller's locals.

use super::value::JsValue;
use crate::error::TraceError;
use crate::trace::VariableRecord;
use log::trace;

pub const GLOBAL_SCOPE: &str = "global";

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    value: JsValue,
}

#[derive(Debug, Clone)]
pub struct Scope {
    id: usize,
    name: String,
    /// Index of the enclosing scope in the chain.
    parent: Option<usize>,
    bindings: Vec<Binding>,
}

impl Scope {
    fn new(id: usize, name: &str, parent: Option<usize>) -> Self {
        Self {
            id,
            name: name.to_string(),
            parent,
            bindings: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, name: &str) -> Option<&JsValue> {
        self.bindings.iter().find(|b| b.name == name).map(|b| &b.value)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut JsValue> {
        self.bindings
            .iter_mut()
            .find(|b| b.name == name)
            .map(|b| &mut b.value)
    }

    /// Last write wins; an overwritten binding keeps its position.
    fn insert(&mut self, name: &str, value: JsValue) {
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => self.bindings.push(Binding {
                name: name.to_string(),
                value,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
    next_id: usize,
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeChain {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(0, GLOBAL_SCOPE, None)],
            next_id: 1,
        }
    }

    /// Drop every scope and start over with an empty global scope.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Number of active scopes, the global one included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn innermost(&self) -> &Scope {
        // The global scope is never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn innermost_name(&self) -> &str {
        self.innermost().name()
    }

    pub fn innermost_id(&self) -> usize {
        self.innermost().id()
    }

    /// Push a scope whose parent is the current innermost scope.
    pub fn push_scope(&mut self, name: &str) -> usize {
        let parent = self.scopes.len() - 1;
        self.push_at(name, parent)
    }

    /// Push a scope whose parent is the scope with id `parent_id`, falling
    /// back to the global scope when that scope is no longer active.
    pub fn push_scope_with_parent(&mut self, name: &str, parent_id: usize) -> usize {
        let parent = self
            .scopes
            .iter()
            .rposition(|scope| scope.id == parent_id)
            .unwrap_or(0);
        self.push_at(name, parent)
    }

    fn push_at(&mut self, name: &str, parent: usize) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        trace!(target: "javascript", "Entering scope {} (id {}, parent index {})", name, id, parent);
        self.scopes.push(Scope::new(id, name, Some(parent)));
        id
    }

    pub fn pop_scope(&mut self) -> Result<(), TraceError> {
        if self.scopes.len() <= 1 {
            return Err(TraceError::InvariantViolation(
                "attempted to pop the global scope".to_string(),
            ));
        }
        if let Some(scope) = self.scopes.pop() {
            trace!(target: "javascript", "Leaving scope {} (id {})", scope.name, scope.id);
        }
        Ok(())
    }

    /// Bind `name` in the innermost scope, overwriting an existing binding
    /// of the same name there.
    pub fn declare(&mut self, name: &str, value: JsValue) {
        let last = self.scopes.len() - 1;
        self.scopes[last].insert(name, value);
    }

    /// Overwrite the nearest visible binding, or create a global one when
    /// nothing is visible.
    pub fn assign(&mut self, name: &str, value: JsValue) {
        match self.find(name) {
            Some(index) => self.scopes[index].insert(name, value),
            None => self.scopes[0].insert(name, value),
        }
    }

    /// Look `name` up from the innermost scope outwards. A miss is `None`,
    /// which is different from a binding holding `undefined`.
    pub fn resolve(&self, name: &str) -> Option<JsValue> {
        self.find(name)
            .and_then(|index| self.scopes[index].get(name))
            .cloned()
    }

    fn find(&self, name: &str) -> Option<usize> {
        let mut index = Some(self.scopes.len() - 1);
        while let Some(i) = index {
            let scope = &self.scopes[i];
            if scope.get(name).is_some() {
                return Some(i);
            }
            index = scope.parent;
        }
        None
    }

    /// Every binding of every active scope, outermost scope first and in
    /// insertion order within a scope. Same-named bindings in different
    /// scopes are all listed.
    pub fn snapshot_variables(&self) -> Vec<VariableRecord> {
        self.scopes
            .iter()
            .flat_map(|scope| {
                scope.bindings.iter().map(move |binding| VariableRecord {
                    name: binding.name.clone(),
                    value: binding.value.to_string(),
                    type_tag: binding.value.type_tag().to_string(),
                    scope: scope.name.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names_and_values(chain: &ScopeChain) -> Vec<(String, String, String)> {
        chain
            .snapshot_variables()
            .into_iter()
            .map(|v| (v.scope, v.name, v.value))
            .collect()
    }

    #[test]
    fn test_global_scope_is_never_popped() {
        let mut chain = ScopeChain::new();
        assert!(matches!(chain.pop_scope(), Err(TraceError::InvariantViolation(_))));
        chain.push_scope("f");
        assert!(chain.pop_scope().is_ok());
        assert_eq!(chain.depth(), 1);
        assert_eq!(chain.innermost_name(), GLOBAL_SCOPE);
    }

    #[test]
    fn test_redeclaration_overwrites_in_place() {
        let mut chain = ScopeChain::new();
        chain.declare("a", JsValue::Number(1.0));
        chain.declare("b", JsValue::Number(2.0));
        chain.declare("a", JsValue::String("x".into()));
        let vars = chain.snapshot_variables();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "a");
        assert_eq!(vars[0].value, "x");
        assert_eq!(vars[0].type_tag, "string");
    }

    #[test]
    fn test_resolve_miss_differs_from_undefined() {
        let mut chain = ScopeChain::new();
        chain.declare("u", JsValue::Undefined);
        assert_eq!(chain.resolve("u"), Some(JsValue::Undefined));
        assert_eq!(chain.resolve("missing"), None);
    }

    #[test]
    fn test_snapshot_lists_shadowed_bindings() {
        let mut chain = ScopeChain::new();
        chain.declare("n", JsValue::Number(0.0));
        chain.push_scope("factorial");
        chain.declare("n", JsValue::Number(5.0));
        chain.push_scope("factorial");
        chain.declare("n", JsValue::Number(4.0));

        assert_eq!(chain.resolve("n"), Some(JsValue::Number(4.0)));
        assert_eq!(
            names_and_values(&chain),
            vec![
                ("global".to_string(), "n".to_string(), "0".to_string()),
                ("factorial".to_string(), "n".to_string(), "5".to_string()),
                ("factorial".to_string(), "n".to_string(), "4".to_string()),
            ]
        );
    }

    #[test]
    fn test_lexical_parent_skips_caller_locals() {
        let mut chain = ScopeChain::new();
        chain.declare("g", JsValue::Number(1.0));
        chain.push_scope("caller");
        chain.declare("local", JsValue::Number(2.0));
        chain.push_scope_with_parent("callee", 0);

        assert_eq!(chain.resolve("g"), Some(JsValue::Number(1.0)));
        assert_eq!(chain.resolve("local"), None);
    }

    #[test]
    fn test_stale_parent_falls_back_to_global() {
        let mut chain = ScopeChain::new();
        let gone = chain.push_scope("outer");
        chain.declare("hidden", JsValue::Boolean(true));
        chain.pop_scope().expect("pop outer");

        chain.push_scope_with_parent("inner", gone);
        assert_eq!(chain.resolve("hidden"), None);
        assert_eq!(chain.depth(), 2);
    }

    #[test]
    fn test_assign_updates_nearest_binding_or_creates_global() {
        let mut chain = ScopeChain::new();
        chain.declare("count", JsValue::Number(0.0));
        chain.push_scope("tick");
        chain.assign("count", JsValue::Number(1.0));
        chain.assign("leaked", JsValue::Number(9.0));

        assert_eq!(
            names_and_values(&chain),
            vec![
                ("global".to_string(), "count".to_string(), "1".to_string()),
                ("global".to_string(), "leaked".to_string(), "9".to_string()),
            ]
        );
    }

    #[test]
    fn test_clear_resets_to_empty_global() {
        let mut chain = ScopeChain::new();
        chain.declare("a", JsValue::Number(1.0));
        chain.push_scope("f");
        chain.clear();
        assert_eq!(chain.depth(), 1);
        assert!(chain.snapshot_variables().is_empty());
    }
}
