use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::analysis::Analyzer;
use crate::ast::AstNode;
use crate::errors::{AnalyzeResult, Diagnostic, Failure};
use crate::helper::interner::{IStr, SpurHelper};
use crate::helper::lex_wrap::TokenWrapper;
use crate::tast::tags::CompilationTag;
use crate::tast::NodeId;
use crate::types::methods::mangle_types;
use crate::types::CxType;

/// Reference-stable handle to one instantiation; the backend and call-site
/// tags both key on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub usize);

#[derive(Clone, Debug)]
pub struct TypeParam {
    pub name: IStr,
    pub bound: Option<CxType>,
}

/// A syntax template with free type parameters. The body is ordinary
/// function-definition AST whose type references still use the written
/// parameter names.
pub struct GenericFunction {
    pub name: IStr,
    pub type_params: Vec<TypeParam>,
    /// Parameter types with `Generic` placeholders standing in.
    pub params: Vec<CxType>,
    pub ret: CxType,
    pub body: AstNode,
    pub decl_token: Option<TokenWrapper>,
}

/// One monomorphized copy of a template.
pub struct GenericInstance {
    /// Root of the instantiated, fully analyzed tree inside the main arena.
    pub root: NodeId,
    /// Index of the top-level declaration the instantiation must be spliced
    /// next to in the backend's output.
    pub anchor: usize,
    /// The concrete function-pointer type of this instance.
    pub fn_type: CxType,
}

/// Per-compilation-unit template registry and instantiation cache. The
/// cache guarantees at most one instantiation per (function, type-argument
/// tuple); repeated requests return the cached handle.
pub struct GenericModule {
    templates: FxHashMap<(IStr, usize), GenericFunction>,
    cache: FxHashMap<(IStr, String), InstanceId>,
    instances: Vec<GenericInstance>,
}

impl GenericModule {
    pub fn new() -> GenericModule {
        GenericModule {
            templates: FxHashMap::default(),
            cache: FxHashMap::default(),
            instances: Vec::new(),
        }
    }

    /// Templates are keyed by (name, type-parameter count); a second
    /// declaration under the same key is a redeclaration.
    pub fn register(&mut self, template: GenericFunction) -> Result<(), Diagnostic> {
        let key = (template.name, template.type_params.len());
        if let Some(existing) = self.templates.get(&key) {
            let tokens: Vec<_> = existing
                .decl_token
                .iter()
                .chain(template.decl_token.iter())
                .copied()
                .collect();
            return Err(Diagnostic::generic_redeclaration(
                template.name.resolve(),
                &tokens,
            ));
        }
        self.templates.insert(key, template);
        Ok(())
    }

    pub fn template(&self, name: IStr, arity: usize) -> Option<&GenericFunction> {
        self.templates.get(&(name, arity))
    }

    pub fn template_arities(&self, name: IStr) -> Vec<usize> {
        self.templates
            .keys()
            .filter(|(n, _)| *n == name)
            .map(|(_, arity)| *arity)
            .collect()
    }

    pub fn instance(&self, id: InstanceId) -> &GenericInstance {
        &self.instances[id.0]
    }

    /// The ordered list of instantiated trees, in creation order.
    pub fn instances(&self) -> &[GenericInstance] {
        &self.instances
    }

    fn cached(&self, name: IStr, args_mangle: &str) -> Option<InstanceId> {
        self.cache.get(&(name, args_mangle.to_owned())).copied()
    }

    fn insert(
        &mut self,
        name: IStr,
        args_mangle: String,
        instance: GenericInstance,
    ) -> InstanceId {
        let id = InstanceId(self.instances.len());
        self.instances.push(instance);
        self.cache.insert((name, args_mangle), id);
        id
    }
}

impl Analyzer {
    /// On-demand monomorphization. Cache hit returns the existing handle;
    /// a miss substitutes the concrete type arguments through a copy of the
    /// template body, resolves it in an isolated scope seeded with the
    /// global bindings, and caches the result only on success.
    ///
    /// Instantiation is re-entrant: the substituted body may itself request
    /// further instantiations, including of the requesting template with
    /// different type arguments. Nothing here detects a non-terminating
    /// chain; the cache only collapses exact repeats.
    pub fn instantiate(
        &mut self,
        name: IStr,
        type_args: &[CxType],
        call_token: Option<TokenWrapper>,
    ) -> AnalyzeResult<InstanceId> {
        let arity = type_args.len();

        let (bounds, substitution, body) = match self.generics.template(name, arity) {
            Some(template) => {
                let bounds: Vec<_> = template.type_params.iter().cloned().collect();
                let substitution: FxHashMap<IStr, CxType> = template
                    .type_params
                    .iter()
                    .map(|tp| tp.name)
                    .zip(type_args.iter().cloned())
                    .collect();
                (bounds, substitution, template.body.clone())
            }
            None => {
                let arities = self.generics.template_arities(name);
                return Err(match arities.first() {
                    Some(&expected) => {
                        Diagnostic::incorrect_type_argument_count(arity, expected, call_token)
                            .into()
                    }
                    None => Diagnostic::identifier_missing(
                        name.resolve(),
                        call_token.ok_or_else(|| {
                            Failure::internal("generic call with no token".to_owned())
                        })?,
                    )
                    .into(),
                });
            }
        };

        for (tp, arg) in bounds.iter().zip(type_args.iter()) {
            if let Some(bound) = &tp.bound {
                if !self.env.is(arg, bound) {
                    return Err(Diagnostic::illegal_type_arguments(
                        call_token,
                        format!(
                            "'{}' does not satisfy the bound '{}' on '{}'",
                            self.describe(arg),
                            self.describe(bound),
                            tp.name
                        ),
                    )
                    .into());
                }
            }
        }

        let args_mangle = mangle_types(type_args, &self.env);
        if let Some(id) = self.generics.cached(name, &args_mangle) {
            debug!("instantiation {}<{}> served from cache", name, args_mangle);
            return Ok(id);
        }

        info!("instantiating {}<{}>", name, args_mangle);
        let substituted = body.substitute_types(&substitution);
        let root = self.tast.graft(&substituted, None);

        // nested resolution runs against the global scope only and must
        // not leak bindings into (or observe) the caller's scopes
        let saved = self.scopes.isolate_to_base();
        let result = self.analyze_function(root, None);
        self.scopes.restore(saved);

        // a failed instantiation is not cached, partially or otherwise
        result?;

        let fn_type = CxType::FunctionPointer {
            ret: Box::new(substitute_cx(&self.template_ret(name, arity)?, &substitution)),
            params: self
                .template_params(name, arity)?
                .iter()
                .map(|p| substitute_cx(p, &substitution))
                .collect(),
        };

        let instance = GenericInstance {
            root,
            anchor: self.current_anchor,
            fn_type,
        };
        let id = self.generics.insert(name, args_mangle, instance);

        // mark the surrounding top-level declaration as the splice point
        if let Some(top) = self.current_top_node {
            let _ = self
                .tast
                .attach_tag(top, CompilationTag::InstantiationAnchor(id));
        }

        Ok(id)
    }

    fn template_ret(&self, name: IStr, arity: usize) -> AnalyzeResult<CxType> {
        self.generics
            .template(name, arity)
            .map(|t| t.ret.clone())
            .ok_or_else(|| Failure::internal("template vanished mid-instantiation".to_owned()))
    }

    fn template_params(&self, name: IStr, arity: usize) -> AnalyzeResult<Vec<CxType>> {
        self.generics
            .template(name, arity)
            .map(|t| t.params.clone())
            .ok_or_else(|| Failure::internal("template vanished mid-instantiation".to_owned()))
    }
}

/// Replace `Generic` placeholders by name throughout a type.
pub fn substitute_cx(ty: &CxType, map: &FxHashMap<IStr, CxType>) -> CxType {
    match ty {
        CxType::Generic { name, .. } => match map.get(name) {
            Some(concrete) => concrete.clone(),
            None => ty.clone(),
        },
        CxType::Pointer(inner) => substitute_cx(inner, map).pointer_to(),
        CxType::Const(inner) => substitute_cx(inner, map).const_of(),
        CxType::Array(inner) => CxType::Array(Box::new(substitute_cx(inner, map))),
        CxType::FunctionPointer { ret, params } => CxType::FunctionPointer {
            ret: Box::new(substitute_cx(ret, map)),
            params: params.iter().map(|p| substitute_cx(p, map)).collect(),
        },
        CxType::Primitive(_) | CxType::Compound(_) => ty.clone(),
    }
}
