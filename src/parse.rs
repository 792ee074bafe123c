use crate::helper::lex_wrap::{LookaheadStream, ParseResultError};

/// Lex and parse a whole source string; parse errors are collected with
/// recovery rather than aborting at the first.
pub fn parse_source(
    contents: &str,
) -> (crate::ast::AstNode, Vec<ParseResultError>) {
    let mut lex = crate::helper::lex_wrap::Wrapper::new(contents);
    let mut scanner = LookaheadStream::new(&mut lex);
    parser::entry(&mut scanner)
}

pub mod parser {
    use crate::ast::{AstKind, AstNode, TypeSpecifier};
    use crate::helper::lex_wrap::{LookaheadStream, ParseResultError, TokenWrapper};
    use crate::lex::Token;
    use crate::parse_expr::parse_expression;
    use crate::parse_helper::*;
    use crate::types::Primitive;

    pub type ParseResult = Result<AstNode, ParseResultError>;

    pub fn entry(la: &mut LookaheadStream) -> (AstNode, Vec<ParseResultError>) {
        let mut declarations = Vec::new();
        let mut errors = Vec::new();

        while la.la(0).is_ok() {
            match top_level_declaration(la) {
                Ok(node) => declarations.push(node),
                Err(e) => {
                    errors.push(e);
                    eat_through(la, vec![Token::RBrace, Token::Semicolon]);
                }
            }
        }

        (
            AstNode::new(AstKind::TopLevelDecs).with_children(declarations),
            errors,
        )
    }

    pub fn top_level_declaration(la: &mut LookaheadStream) -> ParseResult {
        let tw = la.la(0).map_err(|_| ParseResultError::EndOfFile)?;

        match tw.token {
            Token::Typedef => typedef_declaration(la),
            Token::Class => class_definition(la),
            Token::Generic => generic_definition(la),
            _ => {
                let spec = parse_type_specifier(la)?;
                let name = expect_identifier(la)?;

                if let Ok(next) = la.la(0) {
                    if next.token == Token::LParen {
                        return function_definition(la, spec, name);
                    }
                }

                let dec = declarator_rest(la, spec, name)?;
                expect(la, Token::Semicolon)?;
                Ok(AstNode::new(AstKind::Declarations).with_children(vec![dec]))
            }
        }
    }

    fn typedef_declaration(la: &mut LookaheadStream) -> ParseResult {
        expect(la, Token::Typedef)?;
        let spec = parse_type_specifier(la)?;
        let name = expect_identifier(la)?;
        expect(la, Token::Semicolon)?;

        Ok(AstNode::new(AstKind::Typedef)
            .with_token(name)
            .with_specifier(spec))
    }

    fn class_definition(la: &mut LookaheadStream) -> ParseResult {
        expect(la, Token::Class)?;
        let name = expect_identifier(la)?;

        let mut children = Vec::new();
        if eat_if_matches(la, Token::Colon).is_some() {
            let parent = expect_identifier(la)?;
            children.push(AstNode::new(AstKind::Inherit).with_token(parent));
        }

        expect(la, Token::LBrace)?;
        let mut members = Vec::new();
        loop {
            let tw = la.la(0).map_err(|_| ParseResultError::EndOfFile)?;
            match tw.token {
                Token::RBrace => {
                    let _ = la.next();
                    break;
                }
                Token::Virtual => {
                    let _ = la.next();
                    let spec = parse_type_specifier(la)?;
                    let mname = expect_identifier(la)?;
                    let method = function_definition(la, spec, mname)?;
                    members.push(
                        AstNode::new(AstKind::Virtual)
                            .with_token(tw)
                            .with_children(vec![method]),
                    );
                }
                Token::Identifier if tw.slice == name.slice => {
                    // constructor: the class's own name followed by a
                    // parameter list
                    if matches!(la.la(1), Ok(p) if p.token == Token::LParen) {
                        let _ = la.next();
                        let params = parameter_list(la)?;
                        let body = compound_statement(la)?;
                        members.push(
                            AstNode::new(AstKind::ConstructorDefinition)
                                .with_token(tw)
                                .with_children(vec![params, body]),
                        );
                        continue;
                    }
                    let member = class_member(la)?;
                    members.push(member);
                }
                _ => {
                    let member = class_member(la)?;
                    members.push(member);
                }
            }
        }

        children.push(AstNode::new(AstKind::ClassLevelDecs).with_children(members));

        Ok(AstNode::new(AstKind::ClassDefinition)
            .with_token(name)
            .with_children(children))
    }

    /// A field or a (non-virtual) method.
    fn class_member(la: &mut LookaheadStream) -> ParseResult {
        let spec = parse_type_specifier(la)?;
        let name = expect_identifier(la)?;

        if let Ok(next) = la.la(0) {
            if next.token == Token::LParen {
                return function_definition(la, spec, name);
            }
        }

        let dec = declarator_rest(la, spec, name)?;
        expect(la, Token::Semicolon)?;
        Ok(dec)
    }

    fn generic_definition(la: &mut LookaheadStream) -> ParseResult {
        expect(la, Token::Generic)?;
        expect(la, Token::CmpLessThan)?;

        let mut type_params = Vec::new();
        loop {
            let pname = expect_identifier(la)?;
            let mut tp = AstNode::new(AstKind::TypeParameter).with_token(pname);
            if eat_if_matches(la, Token::Colon).is_some() {
                let bound = parse_type_specifier(la)?;
                tp = tp.with_specifier(bound);
            }
            type_params.push(tp);

            if eat_if_matches(la, Token::Comma).is_none() {
                break;
            }
        }
        expect(la, Token::CmpGreaterThan)?;

        let spec = parse_type_specifier(la)?;
        let name = expect_identifier(la)?;
        let inner = function_definition(la, spec, name)?;

        let mut children =
            vec![AstNode::new(AstKind::TypeParameterList).with_children(type_params)];
        children.extend(inner.children);

        Ok(AstNode {
            kind: AstKind::GenericFunctionDefinition,
            token: inner.token,
            declared: inner.declared,
            children,
        })
    }

    fn function_definition(
        la: &mut LookaheadStream,
        ret: TypeSpecifier,
        name: TokenWrapper,
    ) -> ParseResult {
        let params = parameter_list(la)?;
        let body = compound_statement(la)?;

        Ok(AstNode::new(AstKind::FunctionDefinition)
            .with_token(name)
            .with_specifier(ret)
            .with_children(vec![
                AstNode::new(AstKind::Id).with_token(name),
                params,
                body,
            ]))
    }

    pub fn parameter_list(la: &mut LookaheadStream) -> ParseResult {
        expect(la, Token::LParen)?;

        let mut params = Vec::new();
        if eat_if_matches(la, Token::RParen).is_none() {
            // C-style `(void)` is an empty parameter list
            if matches!(la.la(0), Ok(t) if t.token == Token::Void)
                && matches!(la.la(1), Ok(t) if t.token == Token::RParen)
            {
                let _ = la.next();
                let _ = la.next();
            } else {
                loop {
                    let spec = parse_type_specifier(la)?;
                    let pname = expect_identifier(la)?;
                    params.push(
                        AstNode::new(AstKind::Declaration)
                            .with_token(pname)
                            .with_specifier(spec),
                    );
                    if eat_if_matches(la, Token::Comma).is_none() {
                        break;
                    }
                }
                expect(la, Token::RParen)?;
            }
        }

        Ok(AstNode::new(AstKind::ParameterList).with_children(params))
    }

    pub fn compound_statement(la: &mut LookaheadStream) -> ParseResult {
        expect(la, Token::LBrace)?;

        let mut statements = Vec::new();
        loop {
            let tw = la.la(0).map_err(|_| ParseResultError::EndOfFile)?;
            if tw.token == Token::RBrace {
                let _ = la.next();
                break;
            }
            statements.push(statement(la)?);
        }

        Ok(AstNode::new(AstKind::CompoundStatement).with_children(statements))
    }

    pub fn statement(la: &mut LookaheadStream) -> ParseResult {
        let tw = la.la(0).map_err(|_| ParseResultError::EndOfFile)?;

        match tw.token {
            Token::LBrace => compound_statement(la),

            Token::Semicolon => {
                let _ = la.next();
                Ok(AstNode::empty())
            }

            Token::If => {
                let _ = la.next();
                expect(la, Token::LParen)?;
                let cond = parse_expression(la)?;
                expect(la, Token::RParen)?;
                let then = statement(la)?;

                let alt = if eat_if_matches(la, Token::Else).is_some() {
                    statement(la)?
                } else {
                    AstNode::empty()
                };

                Ok(AstNode::new(AstKind::If)
                    .with_token(tw)
                    .with_children(vec![cond, then, alt]))
            }

            Token::While => {
                let _ = la.next();
                expect(la, Token::LParen)?;
                let cond = parse_expression(la)?;
                expect(la, Token::RParen)?;
                let body = statement(la)?;

                Ok(AstNode::new(AstKind::While)
                    .with_token(tw)
                    .with_children(vec![cond, body]))
            }

            Token::Do => {
                let _ = la.next();
                let body = statement(la)?;
                expect(la, Token::While)?;
                expect(la, Token::LParen)?;
                let cond = parse_expression(la)?;
                expect(la, Token::RParen)?;
                expect(la, Token::Semicolon)?;

                Ok(AstNode::new(AstKind::DoWhile)
                    .with_token(tw)
                    .with_children(vec![body, cond]))
            }

            Token::For => {
                let _ = la.next();
                expect(la, Token::LParen)?;

                let init = if matches!(la.la(0), Ok(t) if t.token == Token::Semicolon) {
                    AstNode::empty()
                } else {
                    simple_statement_no_semicolon(la)?
                };
                expect(la, Token::Semicolon)?;

                let cond = if matches!(la.la(0), Ok(t) if t.token == Token::Semicolon) {
                    AstNode::empty()
                } else {
                    parse_expression(la)?
                };
                expect(la, Token::Semicolon)?;

                let update = if matches!(la.la(0), Ok(t) if t.token == Token::RParen) {
                    AstNode::empty()
                } else {
                    expression_or_assignment(la)?
                };
                expect(la, Token::RParen)?;

                let body = statement(la)?;

                Ok(AstNode::new(AstKind::For)
                    .with_token(tw)
                    .with_children(vec![init, cond, update, body]))
            }

            Token::Return => {
                let _ = la.next();
                let value = if matches!(la.la(0), Ok(t) if t.token == Token::Semicolon) {
                    AstNode::empty()
                } else {
                    parse_expression(la)?
                };
                expect(la, Token::Semicolon)?;

                Ok(AstNode::new(AstKind::Return)
                    .with_token(tw)
                    .with_children(vec![value]))
            }

            _ => {
                let node = simple_statement_no_semicolon(la)?;
                expect(la, Token::Semicolon)?;
                Ok(node)
            }
        }
    }

    /// A declaration or an expression/assignment, without the trailing
    /// semicolon (shared between plain statements and `for` headers).
    fn simple_statement_no_semicolon(la: &mut LookaheadStream) -> ParseResult {
        if let Some(dec) = try_declaration(la)? {
            return Ok(dec);
        }
        expression_or_assignment(la)
    }

    /// Backtracking probe: a type specifier followed by an identifier is a
    /// declaration, anything else rewinds and parses as an expression.
    fn try_declaration(la: &mut LookaheadStream) -> Result<Option<AstNode>, ParseResultError> {
        let mark = la.index();

        let spec = match parse_type_specifier(la) {
            Ok(spec) => spec,
            Err(_) => {
                la.seek_to(mark);
                return Ok(None);
            }
        };

        let name = match la.la(0) {
            Ok(t) if t.token == Token::Identifier => {
                let _ = la.next();
                t
            }
            _ => {
                la.seek_to(mark);
                return Ok(None);
            }
        };

        let mut declarations = vec![declarator_rest(la, spec.clone(), name)?];
        while eat_if_matches(la, Token::Comma).is_some() {
            let next_name = expect_identifier(la)?;
            declarations.push(declarator_rest(la, spec.clone(), next_name)?);
        }

        Ok(Some(
            AstNode::new(AstKind::Declarations).with_children(declarations),
        ))
    }

    /// After `spec name`: array brackets and/or an initializer.
    pub fn declarator_rest(
        la: &mut LookaheadStream,
        spec: TypeSpecifier,
        name: TokenWrapper,
    ) -> ParseResult {
        let mut spec = spec;
        let mut size = None;

        if eat_if_matches(la, Token::LBracket).is_some() {
            if eat_if_matches(la, Token::RBracket).is_none() {
                size = Some(parse_expression(la)?);
                expect(la, Token::RBracket)?;
            }
            spec = TypeSpecifier::Array(Box::new(spec));

            // array declarations take no initializer in this grammar
            let children = size.into_iter().collect();
            return Ok(AstNode::new(AstKind::Declaration)
                .with_token(name)
                .with_specifier(spec)
                .with_children(children));
        }

        if eat_if_matches(la, Token::Equals).is_some() {
            let init = parse_expression(la)?;
            return Ok(AstNode::new(AstKind::InitializedDeclaration)
                .with_token(name)
                .with_specifier(spec)
                .with_children(vec![init]));
        }

        let children = size.into_iter().collect();
        Ok(AstNode::new(AstKind::Declaration)
            .with_token(name)
            .with_specifier(spec)
            .with_children(children))
    }

    fn expression_or_assignment(la: &mut LookaheadStream) -> ParseResult {
        let lhs = parse_expression(la)?;

        if let Ok(op) = la.la(0) {
            if op.token.assignment_operator() {
                let _ = la.next();
                let rhs = parse_expression(la)?;
                return Ok(AstNode::new(AstKind::Assignment)
                    .with_token(op)
                    .with_children(vec![lhs, rhs]));
            }
        }

        Ok(lhs)
    }

    /// `const? base '*'*`, where base is a primitive keyword or a named
    /// type. Array-ness attaches at the declarator, not here.
    pub fn parse_type_specifier(
        la: &mut LookaheadStream,
    ) -> Result<TypeSpecifier, ParseResultError> {
        let is_const = eat_if_matches(la, Token::Const).is_some();

        let tw = la.next().map_err(|_| ParseResultError::EndOfFile)?;
        let base = match tw.token {
            Token::Void => TypeSpecifier::Primitive(Primitive::Void),
            Token::Char => TypeSpecifier::Primitive(Primitive::Char),
            Token::Int => TypeSpecifier::Primitive(Primitive::Int),
            Token::Float => TypeSpecifier::Primitive(Primitive::Float),
            Token::Double => TypeSpecifier::Primitive(Primitive::Double),
            Token::Identifier => TypeSpecifier::Named(tw.slice),
            _ => {
                la.backtrack();
                return Err(ParseResultError::UnexpectedToken(
                    tw,
                    vec![
                        Token::Void,
                        Token::Char,
                        Token::Int,
                        Token::Float,
                        Token::Double,
                        Token::Identifier,
                    ],
                    Some("expected a type"),
                ));
            }
        };

        let mut spec = if is_const {
            TypeSpecifier::Const(Box::new(base))
        } else {
            base
        };

        while eat_if_matches(la, Token::Asterisk).is_some() {
            spec = TypeSpecifier::Pointer(Box::new(spec));
        }

        Ok(spec)
    }
}
