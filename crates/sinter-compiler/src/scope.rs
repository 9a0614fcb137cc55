//! Lexical scope management for body resolution.
//!
//! The resolver opens one scope per function, per block, and per `for` loop
//! header. Shadowing across scopes is legal and the innermost binding wins;
//! redeclaring a name within one scope is an error. The enclosing class's
//! field scope is not part of this stack - the resolver consults it between
//! the local chain and the global scope, which is what makes unqualified
//! field access work.

use rustc_hash::FxHashMap;
use sinter_ast::NodeId;
use sinter_core::Span;

/// Identity of a local binding (parameter or `var`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// What kind of binding a symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Param,
    Local,
}

/// A local binding.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// The `Param` or `VarDecl` node that introduced the binding.
    pub decl: NodeId,
    pub span: Span,
}

/// The stack of nested scopes inside one function body.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<FxHashMap<String, SymbolId>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new innermost scope.
    pub fn push(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Close the innermost scope, dropping its bindings.
    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `name` in the innermost scope.
    ///
    /// Returns the previously bound symbol if the name is already taken in
    /// this scope (shadowing an *outer* binding is fine and returns `Ok`).
    pub fn declare(&mut self, name: &str, id: SymbolId) -> Result<(), SymbolId> {
        let scope = self
            .scopes
            .last_mut()
            .expect("declare called with no open scope");
        if let Some(&prior) = scope.get(name) {
            return Err(prior);
        }
        scope.insert(name.to_string(), id);
        Ok(())
    }

    /// Resolve `name` by walking outward from the innermost scope.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(name) {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_binding_wins() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare("x", SymbolId(0)).unwrap();
        scopes.push();
        scopes.declare("x", SymbolId(1)).unwrap();
        assert_eq!(scopes.lookup("x"), Some(SymbolId(1)));
        scopes.pop();
        assert_eq!(scopes.lookup("x"), Some(SymbolId(0)));
    }

    #[test]
    fn redeclaration_in_one_scope_is_rejected() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare("x", SymbolId(0)).unwrap();
        assert_eq!(scopes.declare("x", SymbolId(1)), Err(SymbolId(0)));
    }

    #[test]
    fn bindings_die_with_their_scope() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.push();
        scopes.declare("i", SymbolId(0)).unwrap();
        scopes.pop();
        assert_eq!(scopes.lookup("i"), None);
    }
}
