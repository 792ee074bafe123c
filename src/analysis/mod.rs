pub mod constexpr;
pub mod expression;
pub mod function;
pub mod generics;
pub mod program;
pub mod scope;
pub mod statement;

use tracing::warn;

use crate::ast::TypeSpecifier;
use crate::errors::{AnalyzeResult, Diagnostic, Failure};
use crate::helper::interner::{Internable, SpurHelper};
use crate::helper::lex_wrap::TokenWrapper;
use crate::tast::{NodeId, Tast};
use crate::types::{CxType, TypeEnvironment};

use self::generics::GenericModule;
use self::scope::ScopeTracker;

/// The resolution engine. Owns the tree, the environment, the scope stack
/// and the generic module for exactly one compilation run; deconstructed
/// into a `Resolved` when the run finishes.
pub struct Analyzer {
    pub env: TypeEnvironment,
    pub tast: Tast,
    pub scopes: ScopeTracker,
    pub generics: GenericModule,
    pub errors: Vec<Diagnostic>,

    /// Token of the first `main` sighted, for duplicate reporting.
    pub(crate) first_main: Option<TokenWrapper>,
    /// Index of the top-level declaration currently under analysis; generic
    /// instantiations triggered beneath it anchor here.
    pub(crate) current_anchor: usize,
    /// The top-level declaration node itself, for anchor tags.
    pub(crate) current_top_node: Option<NodeId>,
}

/// Everything the backend consumes: the fully resolved, tagged tree plus
/// the environment and instantiation list it was resolved against.
pub struct Resolved {
    pub tast: Tast,
    pub root: NodeId,
    pub env: TypeEnvironment,
    pub generics: GenericModule,
    pub errors: Vec<Diagnostic>,
}

impl Analyzer {
    pub fn new(env: TypeEnvironment, tast: Tast) -> Analyzer {
        Analyzer {
            env,
            tast,
            scopes: ScopeTracker::new(),
            generics: GenericModule::new(),
            errors: Vec::new(),
            first_main: None,
            current_anchor: 0,
            current_top_node: None,
        }
    }

    pub fn into_resolved(self, root: NodeId) -> Resolved {
        Resolved {
            tast: self.tast,
            root,
            env: self.env,
            generics: self.generics,
            errors: self.errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The analyzer boundary. A recoverable failure is logged and the
    /// subtree counts as having succeeded with no resolved type, so
    /// siblings still get analyzed. A fatal diagnostic marks the node as a
    /// failure point and aborts this subtree only. An internal failure is
    /// wrapped into a diagnostic anchored at the nearest known token and is
    /// always fatal.
    pub fn boundary(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Analyzer) -> AnalyzeResult<()>,
    ) -> bool {
        match f(self) {
            Ok(()) => true,
            Err(Failure::Recoverable(d)) => {
                warn!("recoverable: {}", d.message);
                self.errors.push(d);
                true
            }
            Err(Failure::Fatal(d)) => {
                self.tast.set_failure_point(node);
                self.errors.push(d);
                false
            }
            Err(internal @ Failure::Internal(_)) => {
                self.tast.set_failure_point(node);
                let d = internal.into_diagnostic(self.tast.nearest_token(node));
                self.errors.push(d);
                false
            }
        }
    }

    /// Run `f` inside a fresh scope, guaranteeing the matching pop on every
    /// exit path.
    pub fn scoped<R>(
        &mut self,
        f: impl FnOnce(&mut Analyzer) -> AnalyzeResult<R>,
    ) -> AnalyzeResult<R> {
        self.scopes.push_scope();
        let r = f(self);
        self.scopes.pop_scope();
        r
    }

    /// Turn a syntactic type reference into a concrete type. An unknown
    /// name is the canonical recoverable failure: a forward reference may
    /// legitimately resolve on a later declaration, so the subtree yields
    /// no type and siblings continue.
    pub fn resolve_specifier(
        &self,
        spec: &TypeSpecifier,
        near: Option<TokenWrapper>,
    ) -> AnalyzeResult<CxType> {
        match spec {
            TypeSpecifier::Primitive(p) => Ok(CxType::Primitive(*p)),
            TypeSpecifier::Named(name) => {
                if let Some(ty) = self.env.typedef(*name) {
                    Ok(ty.clone())
                } else if let Some(id) = self.env.class_by_name(*name) {
                    Ok(CxType::Compound(id))
                } else {
                    Err(Failure::Recoverable(Diagnostic::missing_type_reference(
                        name.resolve(),
                        near,
                    )))
                }
            }
            TypeSpecifier::Pointer(inner) => {
                Ok(self.resolve_specifier(inner, near)?.pointer_to())
            }
            TypeSpecifier::Const(inner) => Ok(self.resolve_specifier(inner, near)?.const_of()),
            TypeSpecifier::Array(inner) => Ok(CxType::Array(Box::new(
                self.resolve_specifier(inner, near)?,
            ))),
            TypeSpecifier::Resolved(ty) => Ok(ty.clone()),
        }
    }

    /// The declared specifier of a node, resolved, or an internal error if
    /// the parser did not put one there.
    pub fn declared_type(&self, node: NodeId) -> AnalyzeResult<CxType> {
        let near = self.tast.nearest_token(node);
        let spec = self
            .tast
            .declared(node)
            .ok_or_else(|| {
                Failure::internal(format!(
                    "{} node carries no declared type",
                    self.tast.kind(node)
                ))
            })?
            .clone();
        self.resolve_specifier(&spec, near)
    }

    /// A child's already-resolved type; absence after analysis is an
    /// invariant violation, not a user error.
    pub fn ty_of(&self, node: NodeId) -> AnalyzeResult<CxType> {
        self.tast.ty(node).cloned().ok_or_else(|| {
            Failure::internal(format!(
                "{} node was analyzed but has no type",
                self.tast.kind(node)
            ))
        })
    }

    pub fn describe(&self, ty: &CxType) -> String {
        self.env.describe(ty)
    }

    /// Seed the base scope the way the runtime does: builtin constants
    /// resolvable everywhere.
    pub fn seed_builtins(&mut self) {
        let tracker = &mut self.scopes;
        let _ = tracker.bind(
            "nullptr".intern(),
            scope::Binding::Fixed {
                ty: CxType::VOID.pointer_to(),
            },
            None,
        );
    }
}
