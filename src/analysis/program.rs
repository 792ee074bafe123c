use tracing::{debug, info};

use crate::analysis::generics::{GenericFunction, TypeParam};
use crate::analysis::scope::{Binding, FunctionBinding};
use crate::analysis::Analyzer;
use crate::ast::{AstKind, AstNode};
use crate::errors::{AnalyzeResult, Failure};
use crate::tast::NodeId;
use crate::types::methods::mangle_types;
use crate::types::{CxConstructor, CxMethod, CxParameter, CxType};

impl Analyzer {
    /// Whole-program entry point: analyze every top-level declaration,
    /// collecting all diagnosable errors in one pass rather than stopping
    /// at the first. A run with zero collected errors is the only success.
    pub fn analyze_program(&mut self, root: NodeId) -> bool {
        self.seed_builtins();

        if self.tast.kind(root) != AstKind::TopLevelDecs {
            self.boundary(root, |_| {
                Err(Failure::internal(
                    "program root is not a top-level declaration list".to_owned(),
                ))
            });
            return false;
        }

        for (index, child) in self.tast.children(root).into_iter().enumerate() {
            self.current_anchor = index;
            self.current_top_node = Some(child);
            self.boundary(child, |a| a.analyze_top_level(child));
        }

        info!(
            "program analysis finished with {} diagnostics",
            self.errors.len()
        );
        !self.has_errors()
    }

    fn analyze_top_level(&mut self, node: NodeId) -> AnalyzeResult<()> {
        match self.tast.kind(node) {
            AstKind::Empty => Ok(()),

            AstKind::Typedef => {
                let ty = self.declared_type(node)?;
                let token = self.tast.token(node).ok_or_else(|| {
                    Failure::internal("typedef carries no name token".to_owned())
                })?;
                self.env
                    .register_typedef(token.slice, ty, Some(token))
                    .map_err(Failure::Fatal)
            }

            AstKind::ClassDefinition => self.analyze_class(node),

            AstKind::FunctionDefinition => {
                // the signature is bound before the body is analyzed, so a
                // function may call itself
                let (name_token, params, ret) = self.function_signature(node)?;
                let mangle = mangle_types(&params, &self.env);
                self.scopes
                    .bind(
                        name_token.slice,
                        Binding::Functions(vec![FunctionBinding {
                            params,
                            ret,
                            mangle,
                        }]),
                        Some(name_token),
                    )
                    .map_err(Failure::Fatal)?;

                self.analyze_function(node, None)
            }

            AstKind::GenericFunctionDefinition => self.register_generic(node),

            AstKind::Declarations | AstKind::Declaration | AstKind::InitializedDeclaration => {
                let void = CxType::VOID;
                self.analyze_statement(node, &void)?;
                Ok(())
            }

            other => Err(Failure::internal(format!(
                "{} is not a recognized top-level node kind",
                other
            ))),
        }
    }

    fn function_signature(
        &self,
        node: NodeId,
    ) -> AnalyzeResult<(crate::helper::lex_wrap::TokenWrapper, Vec<CxType>, CxType)> {
        let id = self
            .tast
            .child_of_kind(node, AstKind::Id)
            .ok_or_else(|| Failure::internal("function definition without a name".to_owned()))?;
        let name_token = self
            .tast
            .token(id)
            .ok_or_else(|| Failure::internal("function name without a token".to_owned()))?;

        let params_node = self
            .tast
            .child_of_kind(node, AstKind::ParameterList)
            .ok_or_else(|| Failure::internal("function definition without parameters".to_owned()))?;

        let mut params = Vec::new();
        for param in self.tast.children(params_node) {
            params.push(self.declared_type(param)?);
        }
        let ret = self.declared_type(node)?;
        Ok((name_token, params, ret))
    }

    fn analyze_class(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let name_token = self
            .tast
            .token(node)
            .ok_or_else(|| Failure::internal("class definition without a name".to_owned()))?;

        let parent = match self.tast.child_of_kind(node, AstKind::Inherit) {
            None => None,
            Some(inherit) => {
                let parent_token = self.tast.token(inherit).ok_or_else(|| {
                    Failure::internal("inheritance clause without a name".to_owned())
                })?;
                match self.env.class_by_name(parent_token.slice) {
                    Some(id) => Some(id),
                    None => {
                        // an unseen parent may be declared later; recoverable
                        return Err(Failure::Recoverable(
                            crate::errors::Diagnostic::missing_type_reference(
                                crate::helper::interner::SpurHelper::resolve(&parent_token.slice),
                                Some(parent_token),
                            ),
                        ));
                    }
                }
            }
        };

        let class = self
            .env
            .register_class(name_token.slice, parent, Some(name_token))
            .map_err(Failure::Fatal)?;
        debug!("registered class {}", name_token.slice);

        let members = self
            .tast
            .child_of_kind(node, AstKind::ClassLevelDecs)
            .ok_or_else(|| Failure::internal("class definition without a body".to_owned()))?;

        // two passes over the members: all signatures and fields register
        // before any body runs, so methods may reference each other and the
        // class itself freely
        let mut method_bodies = Vec::new();
        let mut constructor_bodies = Vec::new();

        for member in self.tast.children(members) {
            match self.tast.kind(member) {
                AstKind::Empty => {}
                AstKind::Declaration => {
                    let ty = self.declared_type(member)?;
                    let token = self.tast.token(member).ok_or_else(|| {
                        Failure::internal("field declaration without a name".to_owned())
                    })?;
                    self.env
                        .add_field(class, token.slice, ty.clone(), Some(token))
                        .map_err(Failure::Fatal)?;
                    self.tast.set_type(member, ty);
                }
                AstKind::FunctionDefinition => {
                    self.register_method(class, member, false)?;
                    method_bodies.push(member);
                }
                AstKind::Virtual => {
                    let inner = self
                        .tast
                        .child(member, 0)
                        .filter(|&c| self.tast.kind(c) == AstKind::FunctionDefinition)
                        .ok_or_else(|| {
                            Failure::internal("virtual wrapper without a method".to_owned())
                        })?;
                    self.register_method(class, inner, true)?;
                    method_bodies.push(inner);
                }
                AstKind::ConstructorDefinition => {
                    let params = self.constructor_parameters(member)?;
                    let token = self.tast.token(member);
                    self.env
                        .add_constructor(class, CxConstructor::new(params, token))
                        .map_err(Failure::Fatal)?;
                    constructor_bodies.push(member);
                }
                other => {
                    return Err(Failure::internal(format!(
                        "{} is not a recognized class-level node kind",
                        other
                    )))
                }
            }
        }

        // class body scope: every field of the chain is resolvable by bare
        // name inside method bodies
        self.scoped(|a| {
            let mut seeded = rustc_hash::FxHashSet::default();
            let mut cursor = Some(class);
            while let Some(cid) = cursor {
                let fields: Vec<_> = a
                    .env
                    .class(cid)
                    .fields
                    .iter()
                    .map(|f| (f.name, f.ty.clone()))
                    .collect();
                for (fname, fty) in fields {
                    if seeded.insert(fname) {
                        a.scopes
                            .bind(
                                fname,
                                Binding::Variable {
                                    ty: fty,
                                    from_field: true,
                                },
                                None,
                            )
                            .map_err(Failure::Fatal)?;
                    }
                }
                cursor = a.env.class(cid).parent;
            }

            for body in method_bodies {
                a.boundary(body, |a| a.analyze_function(body, Some(class)));
            }
            for body in constructor_bodies {
                a.boundary(body, |a| a.analyze_constructor(body, class));
            }
            Ok(())
        })?;

        self.tast.set_type(node, CxType::Compound(class));
        Ok(())
    }

    fn register_method(
        &mut self,
        class: crate::types::ClassId,
        node: NodeId,
        is_virtual: bool,
    ) -> AnalyzeResult<()> {
        let id = self
            .tast
            .child_of_kind(node, AstKind::Id)
            .ok_or_else(|| Failure::internal("method definition without a name".to_owned()))?;
        let name_token = self
            .tast
            .token(id)
            .ok_or_else(|| Failure::internal("method name without a token".to_owned()))?;

        let params_node = self
            .tast
            .child_of_kind(node, AstKind::ParameterList)
            .ok_or_else(|| Failure::internal("method definition without parameters".to_owned()))?;

        let mut params = Vec::new();
        for param in self.tast.children(params_node) {
            let ty = self.declared_type(param)?;
            let token = self.tast.token(param).ok_or_else(|| {
                Failure::internal("parameter declaration without a name".to_owned())
            })?;
            params.push(CxParameter {
                name: token.slice,
                ty,
            });
        }
        let ret = self.declared_type(node)?;

        self.env
            .add_method(
                class,
                CxMethod::new(name_token.slice, params, ret, is_virtual, Some(name_token)),
            )
            .map_err(Failure::Fatal)?;
        Ok(())
    }

    fn constructor_parameters(&self, node: NodeId) -> AnalyzeResult<Vec<CxParameter>> {
        let params_node = self
            .tast
            .child_of_kind(node, AstKind::ParameterList)
            .ok_or_else(|| Failure::internal("constructor without parameters".to_owned()))?;

        let mut params = Vec::new();
        for param in self.tast.children(params_node) {
            let ty = self.declared_type(param)?;
            let token = self.tast.token(param).ok_or_else(|| {
                Failure::internal("parameter declaration without a name".to_owned())
            })?;
            params.push(CxParameter {
                name: token.slice,
                ty,
            });
        }
        Ok(params)
    }

    /// Record a generic template; its body is held back until a call site
    /// instantiates it with concrete type arguments.
    fn register_generic(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let id = self
            .tast
            .child_of_kind(node, AstKind::Id)
            .ok_or_else(|| Failure::internal("generic definition without a name".to_owned()))?;
        let name_token = self
            .tast
            .token(id)
            .ok_or_else(|| Failure::internal("generic name without a token".to_owned()))?;

        let tparams_node = self
            .tast
            .child_of_kind(node, AstKind::TypeParameterList)
            .ok_or_else(|| {
                Failure::internal("generic definition without type parameters".to_owned())
            })?;

        let mut type_params = Vec::new();
        let mut placeholders = rustc_hash::FxHashMap::default();
        for tp in self.tast.children(tparams_node) {
            let token = self.tast.token(tp).ok_or_else(|| {
                Failure::internal("type parameter without a name".to_owned())
            })?;
            let bound = match self.tast.declared(tp).cloned() {
                None => None,
                Some(spec) => Some(self.resolve_specifier(&spec, Some(token))?),
            };
            placeholders.insert(
                token.slice,
                CxType::Generic {
                    name: token.slice,
                    bound: bound.clone().map(Box::new),
                },
            );
            type_params.push(TypeParam {
                name: token.slice,
                bound,
            });
        }

        // the template's own signature resolves with placeholders standing
        // in for the type parameters; the stored body keeps the written
        // names so instantiation can substitute them wholesale
        let raw = self.tast.extract_ast(node);
        let signature_source = raw.substitute_types(&placeholders);
        let params_ast = signature_source
            .child_of_kind(AstKind::ParameterList)
            .ok_or_else(|| Failure::internal("generic definition without parameters".to_owned()))?;

        let mut params = Vec::new();
        for p in params_ast.children.iter() {
            let spec = p.declared.clone().ok_or_else(|| {
                Failure::internal("parameter declaration without a type".to_owned())
            })?;
            params.push(self.resolve_specifier(&spec, p.token)?);
        }
        let ret_spec = signature_source.declared.clone().ok_or_else(|| {
            Failure::internal("generic definition without a return type".to_owned())
        })?;
        let ret = self.resolve_specifier(&ret_spec, Some(name_token))?;

        let body = AstNode {
            kind: AstKind::FunctionDefinition,
            token: raw.token,
            declared: raw.declared.clone(),
            children: raw
                .children
                .into_iter()
                .filter(|c| c.kind != AstKind::TypeParameterList)
                .collect(),
        };

        self.generics
            .register(GenericFunction {
                name: name_token.slice,
                type_params,
                params,
                ret,
                body,
                decl_token: Some(name_token),
            })
            .map_err(Failure::Fatal)?;

        debug!("registered generic function {}", name_token.slice);
        Ok(())
    }
}
