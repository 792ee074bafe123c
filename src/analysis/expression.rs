use tracing::debug;

use crate::analysis::constexpr::parse_int_literal;
use crate::analysis::scope::Binding;
use crate::analysis::Analyzer;
use crate::ast::AstKind;
use crate::errors::{AnalyzeResult, Diagnostic, Failure};
use crate::helper::interner::SpurHelper;
use crate::lex::Token;
use crate::tast::tags::CompilationTag;
use crate::tast::NodeId;
use crate::types::{CxType, ParameterTypes};

impl Analyzer {
    /// Compute the type of one expression node bottom-up, attaching tags as
    /// resolution decisions are made. Re-entry on an already-typed node is a
    /// no-op, so re-analysis passes stay cheap.
    pub fn analyze_expression(&mut self, node: NodeId) -> AnalyzeResult<()> {
        if self.tast.is_typed(node) {
            return Ok(());
        }

        let r = self.expression_rule(node);
        if let Err(Failure::Fatal(_)) = &r {
            self.tast.set_failure_point(node);
        }
        r
    }

    fn expression_rule(&mut self, node: NodeId) -> AnalyzeResult<()> {
        match self.tast.kind(node) {
            AstKind::Literal => self.literal(node),

            AstKind::StringLiteral => {
                self.tast.set_type(node, CxType::CHAR.pointer_to());
                Ok(())
            }

            AstKind::True | AstKind::False => {
                self.tast.set_type(node, CxType::CHAR);
                Ok(())
            }

            AstKind::Id => self.identifier(node),

            AstKind::BinOp => self.binary_operation(node),

            AstKind::UniOp | AstKind::PostOp => self.single_operand_operation(node),

            AstKind::Indirection => self.indirection(node),

            AstKind::AddressOf => {
                let child = self.expect_child(node, 0)?;
                self.analyze_expression(child)?;
                if !self.tast.is_lvalue(child) {
                    return Err(Diagnostic::illegal_lvalue(self.tast.first_token(child)).into());
                }
                let inner = self.ty_of(child)?;
                self.tast.set_type(node, inner.pointer_to());
                self.tast.set_lvalue(node, true);
                Ok(())
            }

            AstKind::Cast => self.cast(node),

            AstKind::ArrayReference => self.array_reference(node),

            AstKind::Sizeof => {
                if let Some(spec) = self.tast.declared(node).cloned() {
                    // the operand type only needs to resolve, its value is
                    // not inspected
                    self.resolve_specifier(&spec, self.tast.nearest_token(node))?;
                } else {
                    let child = self.expect_child(node, 0)?;
                    self.analyze_expression(child)?;
                }
                self.tast.set_type(node, CxType::INT);
                Ok(())
            }

            AstKind::Ternary => self.ternary(node),

            AstKind::FunctionCall => self.function_call(node),

            AstKind::GenericCall => self.generic_call(node),

            AstKind::MethodCall => self.method_call(node),

            AstKind::FieldGet => self.field_get(node),

            AstKind::ConstructorCall => self.constructor_call(node),

            AstKind::Sequence => {
                for child in self.tast.children(node) {
                    self.analyze_expression(child)?;
                }
                Ok(())
            }

            other => Err(Failure::internal(format!(
                "{} is not a recognized expression node kind",
                other
            ))),
        }
    }

    fn expect_child(&self, node: NodeId, index: usize) -> AnalyzeResult<NodeId> {
        self.tast.child(node, index).ok_or_else(|| {
            Failure::internal(format!(
                "{} node is missing child {}",
                self.tast.kind(node),
                index
            ))
        })
    }

    fn literal(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let token = self
            .tast
            .token(node)
            .ok_or_else(|| Failure::internal("literal node with no token".to_owned()))?;
        let image = token.slice.resolve();

        let ty = match token.token {
            Token::FloatLiteral => {
                if image.parse::<f64>().is_err() {
                    return Err(Diagnostic::malformed_literal(token).into());
                }
                CxType::DOUBLE
            }
            Token::IntLiteral => {
                if parse_int_literal(image).is_none() {
                    return Err(Diagnostic::malformed_literal(token).into());
                }
                CxType::INT
            }
            Token::CharLiteral => CxType::CHAR,
            _ => return Err(Diagnostic::malformed_literal(token).into()),
        };

        self.tast.set_type(node, ty);
        Ok(())
    }

    fn identifier(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let token = self
            .tast
            .token(node)
            .ok_or_else(|| Failure::internal("id node with no token".to_owned()))?;
        let name = token.slice;

        let (ty, lvalue) = match self.scopes.lookup(name) {
            None => {
                return Err(Diagnostic::identifier_missing(name.resolve(), token).into());
            }
            Some(Binding::Variable { ty, .. }) => (ty.clone(), true),
            Some(Binding::Fixed { ty }) => (ty.clone(), false),
            Some(Binding::Functions(overloads)) => match overloads.len() {
                1 => (overloads[0].pointer_type(), false),
                _ => {
                    return Err(Diagnostic::no_matching_overload(
                        name.resolve(),
                        "an unambiguous bare reference",
                        Some(token),
                    )
                    .into())
                }
            },
        };

        // The local wins over an identically-named field of the enclosing
        // class body; the tag records that the implicit receiver access is
        // NOT emitted for this identifier.
        if self.scopes.shadows_field(name) {
            let _ = self.tast.attach_tag(node, CompilationTag::ShadowingFieldName);
        }

        self.tast.set_type(node, ty);
        self.tast.set_lvalue(node, lvalue);
        Ok(())
    }

    fn binary_operation(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let op = self
            .tast
            .token(node)
            .ok_or_else(|| Failure::internal("binop node with no operator token".to_owned()))?;
        let lhs = self.expect_child(node, 0)?;
        let rhs = self.expect_child(node, 1)?;

        self.analyze_expression(lhs)?;
        self.analyze_expression(rhs)?;

        let lt = self.ty_of(lhs)?;
        let rt = self.ty_of(rhs)?;

        if !self.can_binary_op(&lt, &rt) {
            return Err(Diagnostic::illegal_operation(
                op,
                &[self.describe(&lt), self.describe(&rt)],
            )
            .into());
        }

        if op.token.comparison_operator() {
            self.tast.set_type(node, CxType::INT);
            self.tast.set_lvalue(node, false);
        } else {
            // pointer arithmetic keeps the pointer operand's type
            let result = if matches!(rt.strip_const(), CxType::Pointer(_)) {
                rt.strip_const().clone()
            } else {
                lt.strip_const().clone()
            };
            let pointerish = |t: &CxType| {
                matches!(t.strip_const(), CxType::Pointer(_) | CxType::Array(_))
            };
            self.tast.set_lvalue(node, pointerish(&lt) || pointerish(&rt));
            self.tast.set_type(node, result);
        }

        Ok(())
    }

    fn single_operand_operation(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let op = self
            .tast
            .token(node)
            .ok_or_else(|| Failure::internal("uniop node with no operator token".to_owned()))?;
        let child = self.expect_child(node, 0)?;
        self.analyze_expression(child)?;
        let ct = self.ty_of(child)?;

        if !(ct.is_primitive() || matches!(ct.strip_const(), CxType::Pointer(_))) {
            return Err(Diagnostic::illegal_operation(op, &[self.describe(&ct)]).into());
        }

        let ty = match op.token {
            Token::Increment | Token::Decrement => {
                if !self.can_increment(&ct) {
                    return Err(Diagnostic::illegal_operation(op, &[self.describe(&ct)]).into());
                }
                ct.strip_const().clone()
            }
            Token::Bang => CxType::INT,
            _ => ct.strip_const().clone(),
        };

        self.tast.set_type(node, ty);
        let child_lvalue = self.tast.is_lvalue(child);
        self.tast.set_lvalue(node, child_lvalue);
        Ok(())
    }

    fn indirection(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let child = self.expect_child(node, 0)?;
        self.analyze_expression(child)?;
        let ct = self.ty_of(child)?;

        let pointee = match ct.strip_const() {
            CxType::Pointer(inner) => inner.as_ref().clone(),
            _ => {
                let star = self
                    .tast
                    .token(node)
                    .or_else(|| self.tast.first_token(child));
                return Err(Diagnostic::illegal_operation(
                    star.ok_or_else(|| Failure::internal("indirection with no token".to_owned()))?,
                    &[self.describe(&ct)],
                )
                .into());
            }
        };

        if pointee.is_void() {
            return Err(Diagnostic::void_dereference(self.tast.first_token(child)).into());
        }

        if self.tast.kind(child) == AstKind::ConstructorCall {
            let _ = self
                .tast
                .attach_tag(node, CompilationTag::NewObjectDereference);
        }

        let child_lvalue = self.tast.is_lvalue(child);
        self.tast.set_type(node, pointee);
        self.tast.set_lvalue(node, child_lvalue);
        Ok(())
    }

    fn cast(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let target = self.declared_type(node)?;
        let child = self.expect_child(node, 0)?;
        self.analyze_expression(child)?;
        let from = self.ty_of(child)?;

        // any pointer may be reinterpreted; otherwise the target must be
        // usable where the source is expected
        let void_ptr = CxType::VOID.pointer_to();
        if !self.env.is(&target, &void_ptr) && !self.env.is(&target, &from) {
            return Err(Diagnostic::illegal_cast(
                &self.describe(&from),
                &self.describe(&target),
                self.tast.first_token(child),
            )
            .into());
        }

        let child_lvalue = self.tast.is_lvalue(child);
        self.tast.set_type(node, target);
        self.tast.set_lvalue(node, child_lvalue);
        Ok(())
    }

    fn array_reference(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let lhs = self.expect_child(node, 0)?;
        let rhs = self.expect_child(node, 1)?;
        self.analyze_expression(lhs)?;
        self.analyze_expression(rhs)?;

        let lt = self.ty_of(lhs)?;
        let rt = self.ty_of(rhs)?;
        let was_const = lt.is_const();

        let element = match lt.strip_const() {
            CxType::Pointer(inner) | CxType::Array(inner) => inner.as_ref().clone(),
            _ => {
                let token = self
                    .tast
                    .first_token(node)
                    .ok_or_else(|| Failure::internal("untokened array reference".to_owned()))?;
                return Err(Diagnostic::illegal_operation(
                    token,
                    &[self.describe(&lt), self.describe(&rt)],
                )
                .into());
            }
        };

        if !matches!(rt.strip_const(), CxType::Primitive(p) if p.is_integral()) {
            let token = self
                .tast
                .first_token(rhs)
                .or_else(|| self.tast.first_token(node))
                .ok_or_else(|| Failure::internal("untokened array index".to_owned()))?;
            return Err(Diagnostic::illegal_operation(token, &[self.describe(&rt)]).into());
        }

        let element = if was_const { element.const_of() } else { element };
        let lvalue = self.tast.is_lvalue(lhs) || self.tast.is_lvalue(rhs);
        self.tast.set_type(node, element);
        self.tast.set_lvalue(node, lvalue);
        Ok(())
    }

    fn ternary(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let cond = self.expect_child(node, 0)?;
        let lhs = self.expect_child(node, 1)?;
        let rhs = self.expect_child(node, 2)?;

        self.analyze_expression(cond)?;
        self.analyze_expression(lhs)?;
        self.analyze_expression(rhs)?;

        let condt = self.ty_of(cond)?;
        if !condt.is_primitive() {
            return Err(Diagnostic::incorrect_type(
                "a primitive condition",
                &self.describe(&condt),
                self.tast.first_token(cond),
            )
            .into());
        }

        let lt = self.ty_of(lhs)?;
        let rt = self.ty_of(rhs)?;
        let out = if self.env.is(&lt, &rt) {
            rt
        } else if self.env.is(&rt, &lt) {
            lt
        } else {
            return Err(Diagnostic::incorrect_type(
                &self.describe(&lt),
                &self.describe(&rt),
                self.tast.first_token(rhs),
            )
            .into());
        };

        let lvalue = self.tast.is_lvalue(lhs) && self.tast.is_lvalue(rhs);
        self.tast.set_type(node, out);
        self.tast.set_lvalue(node, lvalue);
        Ok(())
    }

    /// Analyze every expression of an argument sequence and collect the
    /// resulting types, const-stripped for overload matching.
    pub(crate) fn sequence_types(&mut self, seq: NodeId) -> AnalyzeResult<ParameterTypes> {
        let mut collected = Vec::new();
        for child in self.tast.children(seq) {
            self.analyze_expression(child)?;
            collected.push(self.ty_of(child)?.strip_const().clone());
        }
        Ok(ParameterTypes::new(collected))
    }

    fn function_call(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let callee = self.expect_child(node, 0)?;
        let seq = self.expect_child(node, 1)?;
        let args = self.sequence_types(seq)?;

        if self.tast.kind(callee) == AstKind::Id {
            let token = self
                .tast
                .token(callee)
                .ok_or_else(|| Failure::internal("callee id with no token".to_owned()))?;
            let name = token.slice;

            match self.scopes.lookup(name) {
                None => {
                    return Err(Diagnostic::identifier_missing(name.resolve(), token).into());
                }
                Some(Binding::Functions(overloads)) => {
                    let mangle = args.mangle(&self.env);
                    let chosen = overloads
                        .iter()
                        .find(|f| f.mangle == mangle)
                        .cloned()
                        .ok_or_else(|| {
                            Diagnostic::no_matching_overload(
                                name.resolve(),
                                &args.describe(&self.env),
                                Some(token),
                            )
                        })?;
                    debug!("call {} resolves to mangle {}", name, chosen.mangle);
                    self.tast.set_type(callee, chosen.pointer_type());
                    self.tast.set_type(node, chosen.ret);
                }
                Some(Binding::Variable { ty, .. }) | Some(Binding::Fixed { ty }) => {
                    let ty = ty.clone();
                    self.tast.set_type(callee, ty.clone());
                    let ret = self.check_pointer_call(&ty, &args, Some(token))?;
                    self.tast.set_type(node, ret);
                }
            }
        } else {
            self.analyze_expression(callee)?;
            let ty = self.ty_of(callee)?;
            let ret = self.check_pointer_call(&ty, &args, self.tast.first_token(callee))?;
            self.tast.set_type(node, ret);
        }

        self.tast.set_lvalue(node, false);
        Ok(())
    }

    /// Arguments against a function-pointer type; each argument must be
    /// usable as the corresponding parameter.
    fn check_pointer_call(
        &self,
        ty: &CxType,
        args: &ParameterTypes,
        token: Option<crate::helper::lex_wrap::TokenWrapper>,
    ) -> AnalyzeResult<CxType> {
        match ty.strip_const() {
            CxType::FunctionPointer { ret, params } => {
                if params.len() != args.len()
                    || !params
                        .iter()
                        .zip(args.as_slice())
                        .all(|(p, a)| self.env.is(a, p))
                {
                    return Err(Diagnostic::new(
                        crate::errors::DiagnosticKind::IncorrectParameterTypes,
                        format!(
                            "arguments {} do not match parameters",
                            args.describe(&self.env)
                        ),
                    )
                    .with_token_opt(token)
                    .into());
                }
                Ok(ret.as_ref().clone())
            }
            other => Err(Diagnostic::new(
                crate::errors::DiagnosticKind::NotAFunction,
                format!("'{}' is not callable", self.describe(other)),
            )
            .with_token_opt(token)
            .into()),
        }
    }

    fn generic_call(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let id = self.expect_child(node, 0)?;
        let type_args_node = self.expect_child(node, 1)?;
        let seq = self.expect_child(node, 2)?;

        let token = self
            .tast
            .token(id)
            .ok_or_else(|| Failure::internal("generic call with no name token".to_owned()))?;
        let name = token.slice;

        let mut type_args = Vec::new();
        for child in self.tast.children(type_args_node) {
            let spec = self
                .tast
                .declared(child)
                .ok_or_else(|| Failure::internal("type argument with no specifier".to_owned()))?
                .clone();
            type_args.push(self.resolve_specifier(&spec, Some(token))?);
        }

        let instance = self.instantiate(name, &type_args, Some(token))?;
        let fn_type = self.generics.instance(instance).fn_type.clone();

        let args = self.sequence_types(seq)?;
        let ret = self.check_pointer_call(&fn_type, &args, Some(token))?;

        let _ = self
            .tast
            .attach_tag(node, CompilationTag::GenericCall(instance));
        self.tast.set_type(node, ret);
        self.tast.set_lvalue(node, false);
        Ok(())
    }

    fn method_call(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let receiver = self.expect_child(node, 0)?;
        let id = self.expect_child(node, 1)?;
        let seq = self.expect_child(node, 2)?;

        let name_token = self
            .tast
            .token(id)
            .ok_or_else(|| Failure::internal("method call with no name token".to_owned()))?;
        let name = name_token.slice;

        let is_super_call = self
            .tast
            .token(receiver)
            .map(|t| t.token == Token::Super)
            .unwrap_or(false);

        self.analyze_expression(receiver)?;
        if self.tast.kind(receiver) == AstKind::Indirection {
            let _ = self
                .tast
                .attach_tag(node, CompilationTag::IndirectMethodCall);
        }

        let receiver_ty = self.ty_of(receiver)?;
        let args = self.sequence_types(seq)?;

        // method-call syntax on a function-pointer typed expression is a
        // plain indirect call
        if matches!(receiver_ty.strip_const(), CxType::FunctionPointer { .. }) {
            let ret =
                self.check_pointer_call(&receiver_ty, &args, self.tast.first_token(receiver))?;
            self.tast.set_type(node, ret);
            return Ok(());
        }

        let class = receiver_ty.as_class().ok_or_else(|| {
            Diagnostic::illegal_access(
                &self.describe(&receiver_ty),
                name.resolve(),
                self.tast.first_token(receiver),
            )
        })?;

        let mangle = args.mangle(&self.env);

        if is_super_call {
            let method = self
                .env
                .find_super_method(class, name, &mangle)
                .ok_or_else(|| {
                    Diagnostic::no_matching_overload(
                        name.resolve(),
                        &args.describe(&self.env),
                        Some(name_token),
                    )
                })?;
            let ret = self.env.method(method).return_type.clone();
            let _ = self.tast.attach_tag(node, CompilationTag::SuperCall(method));
            self.tast.set_type(node, ret);
            return Ok(());
        }

        match self.env.find_method(class, name, &mangle) {
            Some(method) => {
                let resolved = self.env.method(method);
                let ret = resolved.return_type.clone();
                debug!(
                    "method call {}.{} resolves to mangle {}",
                    self.env.class(class).name,
                    name,
                    resolved.mangle
                );

                if resolved.is_virtual {
                    let _ = self
                        .tast
                        .attach_tag(node, CompilationTag::VirtualMethodCall);
                }
                let _ = self.tast.attach_tag(node, CompilationTag::MethodCall(method));
                self.tast.set_type(node, ret);
                Ok(())
            }
            None => {
                // a field holding a function pointer still answers to call
                // syntax
                if let Some((field_ty, _)) = self.env.field_type(class, name) {
                    if matches!(field_ty.strip_const(), CxType::FunctionPointer { .. }) {
                        let ret = self.check_pointer_call(&field_ty, &args, Some(name_token))?;
                        let _ = self
                            .tast
                            .attach_tag(node, CompilationTag::CompileAsFieldGet);
                        self.tast.set_type(node, ret);
                        return Ok(());
                    }
                }

                if self.env.any_method_named(class, name) {
                    Err(Diagnostic::no_matching_overload(
                        name.resolve(),
                        &args.describe(&self.env),
                        Some(name_token),
                    )
                    .into())
                } else {
                    Err(Diagnostic::illegal_access(
                        self.env.class(class).name.resolve(),
                        name.resolve(),
                        Some(name_token),
                    )
                    .into())
                }
            }
        }
    }

    fn field_get(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let receiver = self.expect_child(node, 0)?;
        let id = self.expect_child(node, 1)?;

        let name_token = self
            .tast
            .token(id)
            .ok_or_else(|| Failure::internal("field get with no name token".to_owned()))?;
        let name = name_token.slice;

        self.analyze_expression(receiver)?;
        if self.tast.kind(receiver) == AstKind::Indirection {
            let _ = self.tast.attach_tag(node, CompilationTag::IndirectFieldGet);
        }

        let receiver_ty = self.ty_of(receiver)?;
        let class = receiver_ty.as_class().ok_or_else(|| {
            Diagnostic::illegal_access(
                &self.describe(&receiver_ty),
                name.resolve(),
                self.tast.first_token(receiver),
            )
        })?;

        let (field_ty, _) = self.env.field_type(class, name).ok_or_else(|| {
            Diagnostic::illegal_access(
                self.env.class(class).name.resolve(),
                name.resolve(),
                Some(name_token),
            )
        })?;

        let field_ty = if receiver_ty.is_const() {
            field_ty.const_of()
        } else {
            field_ty
        };

        let lvalue = self.tast.is_lvalue(receiver);
        self.tast.set_type(node, field_ty);
        self.tast.set_lvalue(node, lvalue);
        Ok(())
    }

    fn constructor_call(&mut self, node: NodeId) -> AnalyzeResult<()> {
        let constructed = self.declared_type(node)?;
        let class = constructed.as_class().ok_or_else(|| {
            Diagnostic::incorrect_type(
                "a class",
                &self.describe(&constructed),
                self.tast.nearest_token(node),
            )
        })?;

        let seq = self.expect_child(node, 0)?;
        let args = self.sequence_types(seq)?;
        let mangle = args.mangle(&self.env);

        let constructor = self.env.find_constructor(class, &mangle).ok_or_else(|| {
            Diagnostic::no_constructor(
                self.env.class(class).name.resolve(),
                &args.describe(&self.env),
                self.tast.nearest_token(node),
            )
        })?;

        let _ = self
            .tast
            .attach_tag(node, CompilationTag::ConstructorCall(constructor));
        self.tast
            .set_type(node, CxType::Compound(class).pointer_to());
        self.tast.set_lvalue(node, false);
        Ok(())
    }

    fn can_binary_op(&self, left: &CxType, right: &CxType) -> bool {
        let ok = |t: &CxType| {
            t.is_primitive() && !t.is_void()
                || matches!(t.strip_const(), CxType::Pointer(_) | CxType::Array(_))
        };
        ok(left) && ok(right)
    }

    fn can_increment(&self, ty: &CxType) -> bool {
        match ty.strip_const() {
            CxType::Pointer(_) => true,
            CxType::Primitive(p) => p.is_integral(),
            _ => false,
        }
    }
}
