use tracing::debug;

use crate::analysis::scope::Binding;
use crate::analysis::Analyzer;
use crate::ast::AstKind;
use crate::errors::{AnalyzeResult, Diagnostic, Failure};
use crate::helper::interner::SpurHelper;
use crate::tast::tags::CompilationTag;
use crate::tast::NodeId;
use crate::types::{ClassId, CxType, Primitive};

impl Analyzer {
    /// Analyze a function or method definition: seed the parameter scope
    /// (plus `this`/`super` for methods), enforce the `main` rules for free
    /// functions, analyze the body, and require a return on every path for
    /// non-void functions.
    pub fn analyze_function(&mut self, node: NodeId, owner: Option<ClassId>) -> AnalyzeResult<()> {
        let return_type = self.declared_type(node)?;

        let id = self
            .tast
            .child_of_kind(node, AstKind::Id)
            .ok_or_else(|| Failure::internal("function definition without a name".to_owned()))?;
        let name_token = self
            .tast
            .token(id)
            .ok_or_else(|| Failure::internal("function name without a token".to_owned()))?;
        let name = name_token.slice;

        let params_node = self
            .tast
            .child_of_kind(node, AstKind::ParameterList)
            .ok_or_else(|| Failure::internal("function definition without parameters".to_owned()))?;
        let body = self
            .tast
            .child_of_kind(node, AstKind::CompoundStatement)
            .ok_or_else(|| Failure::internal("function definition without a body".to_owned()))?;

        debug!("analyzing function {}", name);

        self.scoped(|a| {
            if let Some(owner) = owner {
                a.scopes
                    .bind(
                        crate::helper::interner::intern("this"),
                        Binding::Variable {
                            ty: CxType::Compound(owner).pointer_to(),
                            from_field: false,
                        },
                        None,
                    )
                    .map_err(Failure::Fatal)?;

                // `super` carries the receiver's own class; super-call
                // resolution starts the search at the parent itself
                if a.env.class(owner).parent.is_some() {
                    a.scopes
                        .bind(
                            crate::helper::interner::intern("super"),
                            Binding::Variable {
                                ty: CxType::Compound(owner),
                                from_field: false,
                            },
                            None,
                        )
                        .map_err(Failure::Fatal)?;
                }
            }

            let mut param_types = Vec::new();
            for param in a.tast.children(params_node) {
                let ty = a.declared_type(param)?;
                let token = a.tast.token(param).ok_or_else(|| {
                    Failure::internal("parameter declaration without a name".to_owned())
                })?;
                debug!("parameter {}: {}", token.slice, a.describe(&ty));
                a.scopes
                    .bind(
                        token.slice,
                        Binding::Variable {
                            ty: ty.clone(),
                            from_field: false,
                        },
                        Some(token),
                    )
                    .map_err(Failure::Fatal)?;
                a.tast.set_type(param, ty.clone());
                param_types.push(ty);
            }

            if owner.is_none() && name.resolve() == "main" {
                a.check_main(node, name_token, &return_type, &param_types)?;
            }

            let returns = a.analyze_statement(body, &return_type)?;
            if !return_type.is_void() && !returns {
                return Err(Diagnostic::missing_return(
                    name.resolve(),
                    &a.describe(&return_type),
                    Some(name_token),
                )
                .into());
            }

            a.tast.set_type(
                node,
                CxType::FunctionPointer {
                    ret: Box::new(return_type.clone()),
                    params: param_types,
                },
            );
            Ok(())
        })
    }

    /// `main` has a fixed shape and at most one definition per program.
    fn check_main(
        &mut self,
        node: NodeId,
        name_token: crate::helper::lex_wrap::TokenWrapper,
        return_type: &CxType,
        param_types: &[CxType],
    ) -> AnalyzeResult<()> {
        let char_pp = CxType::CHAR.pointer_to().pointer_to();
        let shape_ok = self.env.is_strict(return_type, &CxType::INT)
            && match param_types {
                [] => true,
                [argc, argv] => {
                    self.env.is_strict(argc, &CxType::INT) && self.env.is_strict(argv, &char_pp)
                }
                _ => false,
            };

        if !shape_ok {
            return Err(Diagnostic::incorrect_main(Some(name_token)).into());
        }

        if let Some(first) = self.first_main {
            return Err(Diagnostic::multiple_main(Some(first), name_token).into());
        }
        self.first_main = Some(name_token);

        let _ = self.tast.attach_tag(node, CompilationTag::MainFunction);
        debug!("main function found");
        Ok(())
    }

    /// Constructors are analyzed like void methods of their class.
    pub fn analyze_constructor(&mut self, node: NodeId, owner: ClassId) -> AnalyzeResult<()> {
        let params_node = self
            .tast
            .child_of_kind(node, AstKind::ParameterList)
            .ok_or_else(|| Failure::internal("constructor without parameters".to_owned()))?;
        let body = self
            .tast
            .child_of_kind(node, AstKind::CompoundStatement)
            .ok_or_else(|| Failure::internal("constructor without a body".to_owned()))?;

        self.scoped(|a| {
            a.scopes
                .bind(
                    crate::helper::interner::intern("this"),
                    Binding::Variable {
                        ty: CxType::Compound(owner).pointer_to(),
                        from_field: false,
                    },
                    None,
                )
                .map_err(Failure::Fatal)?;

            if a.env.class(owner).parent.is_some() {
                a.scopes
                    .bind(
                        crate::helper::interner::intern("super"),
                        Binding::Variable {
                            ty: CxType::Compound(owner),
                            from_field: false,
                        },
                        None,
                    )
                    .map_err(Failure::Fatal)?;
            }

            for param in a.tast.children(params_node) {
                let ty = a.declared_type(param)?;
                let token = a.tast.token(param).ok_or_else(|| {
                    Failure::internal("parameter declaration without a name".to_owned())
                })?;
                a.scopes
                    .bind(
                        token.slice,
                        Binding::Variable {
                            ty: ty.clone(),
                            from_field: false,
                        },
                        Some(token),
                    )
                    .map_err(Failure::Fatal)?;
                a.tast.set_type(param, ty);
            }

            let void = CxType::Primitive(Primitive::Void);
            a.analyze_statement(body, &void)?;
            a.tast.set_type(node, CxType::Compound(owner));
            Ok(())
        })
    }
}
