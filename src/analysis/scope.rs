use rustc_hash::FxHashMap;
use tracing::trace;

use crate::errors::Diagnostic;
use crate::helper::interner::{IStr, SpurHelper};
use crate::helper::lex_wrap::TokenWrapper;
use crate::types::CxType;

/// One resolvable overload of a free function.
#[derive(Clone, Debug)]
pub struct FunctionBinding {
    pub params: Vec<CxType>,
    pub ret: CxType,
    pub mangle: String,
}

impl FunctionBinding {
    pub fn pointer_type(&self) -> CxType {
        CxType::FunctionPointer {
            ret: Box::new(self.ret.clone()),
            params: self.params.clone(),
        }
    }
}

/// A named entity resolvable in a scope.
#[derive(Clone, Debug)]
pub enum Binding {
    Variable {
        ty: CxType,
        /// Set for bindings seeded from an enclosing class body, so that
        /// identifier resolution can detect locals shadowing fields.
        from_field: bool,
    },
    /// Builtin constants; not assignable, not addressable.
    Fixed { ty: CxType },
    /// Free-function overload set, keyed by parameter mangle.
    Functions(Vec<FunctionBinding>),
}

#[derive(Clone, Debug, Default)]
pub struct Scope {
    bindings: FxHashMap<IStr, Binding>,
}

/// Stack of lexical scopes. Pushes and pops must pair exactly, including on
/// error paths; `Analyzer::scoped` is the only place that calls these in
/// analysis code so the discipline holds structurally.
pub struct ScopeTracker {
    stack: Vec<Scope>,
}

impl ScopeTracker {
    pub fn new() -> ScopeTracker {
        ScopeTracker {
            stack: vec![Scope::default()],
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push_scope(&mut self) {
        self.stack.push(Scope::default());
        trace!("scope level {} {}", self.depth(), "#".repeat(self.depth()));
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.stack.len() > 1, "popped the base scope");
        self.stack.pop();
        trace!("scope level {} {}", self.depth(), "#".repeat(self.depth()));
    }

    /// Binds into the innermost scope. Shadowing an enclosing scope is legal
    /// and intentional; colliding within the current scope is not.
    pub fn bind(
        &mut self,
        name: IStr,
        binding: Binding,
        token: Option<TokenWrapper>,
    ) -> Result<(), Diagnostic> {
        use std::collections::hash_map::Entry;

        let top = self.stack.last_mut().expect("scope stack is never empty");

        match top.bindings.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(binding);
                Ok(())
            }
            // Function overloads of one name share a binding; a second
            // overload with the same mangle is a true redeclaration.
            Entry::Occupied(mut slot) => match (slot.get_mut(), binding) {
                (Binding::Functions(existing), Binding::Functions(added)) => {
                    for overload in added {
                        if existing.iter().any(|f| f.mangle == overload.mangle) {
                            return Err(Diagnostic::redeclare(name.resolve(), token)
                                .with_note(format!("signature mangle: {}", overload.mangle)));
                        }
                        existing.push(overload);
                    }
                    Ok(())
                }
                _ => Err(Diagnostic::redeclare(name.resolve(), token)),
            },
        }
    }

    /// Innermost-to-outermost search; absence is not itself an error.
    pub fn lookup(&self, name: IStr) -> Option<&Binding> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(&name))
    }

    /// True when the innermost match for `name` is a non-field binding that
    /// hides a field binding in some enclosing scope.
    pub fn shadows_field(&self, name: IStr) -> bool {
        let mut saw_local = false;
        for scope in self.stack.iter().rev() {
            match scope.bindings.get(&name) {
                Some(Binding::Variable { from_field: true, .. }) => return saw_local,
                Some(_) => saw_local = true,
                None => {}
            }
        }
        false
    }

    /// Swap the stack down to a copy of the base (global) scope, returning
    /// the full previous stack. Re-entrant analysis (generic instantiation)
    /// brackets its nested run with this and `restore`, so nested resolution
    /// never leaks bindings into the caller's scopes.
    pub fn isolate_to_base(&mut self) -> Vec<Scope> {
        let base = self.stack.first().cloned().unwrap_or_default();
        std::mem::replace(&mut self.stack, vec![base])
    }

    pub fn restore(&mut self, saved: Vec<Scope>) {
        self.stack = saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::interner::Internable;

    fn var(ty: CxType) -> Binding {
        Binding::Variable {
            ty,
            from_field: false,
        }
    }

    #[test]
    fn popped_bindings_do_not_leak() {
        let mut scopes = ScopeTracker::new();
        let x = "x".intern();

        scopes.push_scope();
        scopes.bind(x, var(CxType::INT), None).unwrap();
        assert!(scopes.lookup(x).is_some());
        scopes.pop_scope();

        assert!(scopes.lookup(x).is_none());
    }

    #[test]
    fn same_scope_redeclaration_is_rejected() {
        let mut scopes = ScopeTracker::new();
        let x = "x".intern();

        scopes.bind(x, var(CxType::INT), None).unwrap();
        assert!(scopes.bind(x, var(CxType::CHAR), None).is_err());
    }

    #[test]
    fn nested_shadowing_resolves_to_inner_binding() {
        let mut scopes = ScopeTracker::new();
        let x = "x".intern();

        scopes.bind(x, var(CxType::INT), None).unwrap();
        scopes.push_scope();
        scopes.bind(x, var(CxType::CHAR), None).unwrap();

        match scopes.lookup(x) {
            Some(Binding::Variable { ty, .. }) => assert_eq!(*ty, CxType::CHAR),
            other => panic!("unexpected binding {:?}", other),
        }

        scopes.pop_scope();
        match scopes.lookup(x) {
            Some(Binding::Variable { ty, .. }) => assert_eq!(*ty, CxType::INT),
            other => panic!("unexpected binding {:?}", other),
        }
    }

    #[test]
    fn local_over_field_is_reported_as_shadowing() {
        let mut scopes = ScopeTracker::new();
        let x = "x".intern();

        scopes.push_scope();
        scopes
            .bind(
                x,
                Binding::Variable {
                    ty: CxType::INT,
                    from_field: true,
                },
                None,
            )
            .unwrap();

        scopes.push_scope();
        assert!(!scopes.shadows_field(x));
        scopes.bind(x, var(CxType::INT), None).unwrap();
        assert!(scopes.shadows_field(x));
    }

    #[test]
    fn isolation_restores_the_full_stack() {
        let mut scopes = ScopeTracker::new();
        let x = "x".intern();
        let g = "g".intern();

        scopes.bind(g, var(CxType::INT), None).unwrap();
        scopes.push_scope();
        scopes.bind(x, var(CxType::INT), None).unwrap();

        let saved = scopes.isolate_to_base();
        assert!(scopes.lookup(x).is_none(), "inner bindings must not leak");
        assert!(scopes.lookup(g).is_some(), "globals are seeded");

        scopes.restore(saved);
        assert!(scopes.lookup(x).is_some());
    }
}
