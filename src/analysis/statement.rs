use crate::analysis::constexpr;
use crate::analysis::scope::Binding;
use crate::analysis::Analyzer;
use crate::ast::AstKind;
use crate::errors::{AnalyzeResult, Diagnostic, Failure};
use crate::lex::Token;
use crate::tast::tags::CompilationTag;
use crate::tast::NodeId;
use crate::types::CxType;

impl Analyzer {
    /// Analyze one statement; the returned flag says whether every control
    /// path through it reaches a `return`.
    pub fn analyze_statement(
        &mut self,
        node: NodeId,
        return_type: &CxType,
    ) -> AnalyzeResult<bool> {
        match self.tast.kind(node) {
            AstKind::Empty => Ok(false),

            AstKind::Declarations => {
                for child in self.tast.children(node) {
                    self.analyze_declaration(child)?;
                }
                Ok(false)
            }

            AstKind::Declaration | AstKind::InitializedDeclaration => {
                self.analyze_declaration(node)?;
                Ok(false)
            }

            AstKind::Assignment => {
                self.analyze_assignment(node)?;
                Ok(false)
            }

            // expressions usable as statements
            AstKind::MethodCall
            | AstKind::FunctionCall
            | AstKind::GenericCall
            | AstKind::ConstructorCall
            | AstKind::PostOp
            | AstKind::UniOp => {
                self.analyze_expression(node)?;
                Ok(false)
            }

            AstKind::If => {
                let cond = self.statement_child(node, 0)?;
                self.analyze_expression(cond)?;

                let then = self.statement_child(node, 1)?;
                let then_returns = self.analyze_statement(then, return_type)?;

                let mut else_returns = false;
                if let Some(alt) = self.tast.child(node, 2) {
                    if self.tast.kind(alt) != AstKind::Empty {
                        let _ = self.tast.attach_tag(node, CompilationTag::HasElse);
                        else_returns = self.analyze_statement(alt, return_type)?;
                    }
                }

                Ok(then_returns && else_returns)
            }

            AstKind::While => {
                let cond = self.statement_child(node, 0)?;
                self.analyze_expression(cond)?;
                let body = self.statement_child(node, 1)?;
                // the body may never run, so its returns don't count
                self.analyze_statement(body, return_type)?;
                Ok(false)
            }

            AstKind::DoWhile => {
                let body = self.statement_child(node, 0)?;
                let body_returns = self.analyze_statement(body, return_type)?;
                let cond = self.statement_child(node, 1)?;
                self.analyze_expression(cond)?;
                Ok(body_returns)
            }

            AstKind::For => self.scoped(|a| {
                let init = a.statement_child(node, 0)?;
                if a.tast.kind(init) != AstKind::Empty {
                    a.analyze_statement(init, return_type)?;
                }

                let cond = a.statement_child(node, 1)?;
                if a.tast.kind(cond) != AstKind::Empty {
                    a.analyze_expression(cond)?;
                }

                let update = a.statement_child(node, 2)?;
                if a.tast.kind(update) != AstKind::Empty {
                    a.analyze_statement(update, return_type)?;
                }

                let body = a.statement_child(node, 3)?;
                a.analyze_statement(body, return_type)?;
                Ok(false)
            }),

            AstKind::Return => self.analyze_return(node, return_type),

            AstKind::CompoundStatement => self.scoped(|a| {
                let mut returns = false;
                for child in a.tast.children(node) {
                    // each statement is its own analyzer boundary: a failed
                    // statement is recorded and its siblings still run
                    let mut child_returns = false;
                    let ok = a.boundary(child, |a| {
                        child_returns = a.analyze_statement(child, return_type)?;
                        Ok(())
                    });
                    if ok && child_returns {
                        returns = true;
                    }
                }
                Ok(returns)
            }),

            // value-producing expressions with no effect are rejected the
            // same way regardless of shape
            AstKind::BinOp
            | AstKind::Literal
            | AstKind::StringLiteral
            | AstKind::True
            | AstKind::False
            | AstKind::Id
            | AstKind::FieldGet
            | AstKind::ArrayReference
            | AstKind::Indirection
            | AstKind::AddressOf
            | AstKind::Cast
            | AstKind::Sizeof
            | AstKind::Ternary => {
                Err(Diagnostic::illegal_statement(self.tast.first_token(node)).into())
            }

            other => Err(Failure::internal(format!(
                "{} is not a recognized statement node kind",
                other
            ))),
        }
    }

    fn statement_child(&self, node: NodeId, index: usize) -> AnalyzeResult<NodeId> {
        self.tast.child(node, index).ok_or_else(|| {
            Failure::internal(format!(
                "{} node is missing child {}",
                self.tast.kind(node),
                index
            ))
        })
    }

    fn analyze_return(&mut self, node: NodeId, return_type: &CxType) -> AnalyzeResult<bool> {
        let value = self
            .tast
            .child(node, 0)
            .filter(|&c| self.tast.kind(c) != AstKind::Empty);

        match value {
            None => {
                if !return_type.is_void() {
                    return Err(Diagnostic::non_void_return(self.tast.nearest_token(node)).into());
                }
                let _ = self.tast.attach_tag(node, CompilationTag::VoidReturn);
            }
            Some(value) => {
                self.analyze_expression(value)?;
                let got = self.ty_of(value)?;
                if return_type.is_void() || !self.env.is(&got, return_type) {
                    return Err(Diagnostic::incorrect_return_type(
                        &self.describe(return_type),
                        &self.describe(&got),
                        self.tast.first_token(value),
                    )
                    .into());
                }
            }
        }

        Ok(true)
    }

    /// A declaration statement: resolve the declared type, fold an array
    /// size if present, check the initializer, and bind the name.
    pub(crate) fn analyze_declaration(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let ty = self.declared_type(node)?;
        let token = self.tast.token(node).ok_or_else(|| {
            Failure::internal("declaration node carries no name token".to_owned())
        })?;

        match self.tast.kind(node) {
            AstKind::Declaration => {
                // an explicit array size that folds to a constant is cached
                // in the tag; a non-constant size means the backend must
                // allocate dynamically
                if let Some(size) = self.tast.child(node, 0) {
                    self.analyze_expression(size)?;
                    if let Some(value) = constexpr::fold(&self.tast, size) {
                        let _ = self.tast.attach_tag(node, CompilationTag::ArraySize { value });
                        let _ = self.tast.attach_tag(node, CompilationTag::ConstantSize);
                    }
                }
            }
            AstKind::InitializedDeclaration => {
                let init = self.statement_child(node, 0)?;
                self.analyze_expression(init)?;
                let got = self.ty_of(init)?;
                if !self.env.is(&got, &ty) {
                    return Err(Diagnostic::incorrect_type(
                        &self.describe(&ty),
                        &self.describe(&got),
                        self.tast.first_token(init),
                    )
                    .into());
                }
            }
            other => {
                return Err(Failure::internal(format!(
                    "{} is not a declaration node kind",
                    other
                )))
            }
        }

        self.scopes
            .bind(
                token.slice,
                Binding::Variable {
                    ty: ty.clone(),
                    from_field: false,
                },
                Some(token),
            )
            .map_err(Failure::Fatal)?;

        self.tast.set_type(node, ty);
        Ok(())
    }

    fn analyze_assignment(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let op = self
            .tast
            .token(node)
            .ok_or_else(|| Failure::internal("assignment with no operator token".to_owned()))?;
        let lhs = self.statement_child(node, 0)?;
        let rhs = self.statement_child(node, 1)?;

        // only these node kinds can produce a storage location
        if !matches!(
            self.tast.kind(lhs),
            AstKind::Id | AstKind::FieldGet | AstKind::Indirection | AstKind::ArrayReference
        ) {
            return Err(Diagnostic::illegal_lvalue(self.tast.first_token(lhs)).into());
        }

        self.analyze_expression(lhs)?;
        self.analyze_expression(rhs)?;

        if !self.tast.is_lvalue(lhs) {
            return Err(Diagnostic::illegal_lvalue(self.tast.first_token(lhs)).into());
        }

        let lt = self.ty_of(lhs)?;
        if lt.is_const() {
            return Err(Diagnostic::const_modification(self.tast.first_token(lhs)).into());
        }

        let rt = self.ty_of(rhs)?;
        if !self.env.is(&rt, &lt) {
            return Err(Diagnostic::incorrect_type(
                &self.describe(&lt),
                &self.describe(&rt),
                self.tast.first_token(rhs),
            )
            .into());
        }

        if op.token != Token::Equals {
            let _ = self
                .tast
                .attach_tag(node, CompilationTag::OperatorAssignment);
        }

        self.tast.set_type(node, lt);
        Ok(())
    }
}
