use crate::ast::{AstKind, AstNode};
use crate::helper::lex_wrap::{LookaheadStream, ParseResultError};
use crate::lex::Token;
use crate::parse::parser::{parse_type_specifier, ParseResult};
use crate::parse_helper::*;

/// Full expression: binary operator chain, then an optional ternary tail.
pub fn parse_expression(la: &mut LookaheadStream) -> ParseResult {
    let cond = parse_binary(la, 0)?;

    if let Ok(q) = la.la(0) {
        if q.token == Token::Question {
            let _ = la.next();
            let lhs = parse_expression(la)?;
            expect(la, Token::Colon)?;
            let rhs = parse_expression(la)?;
            return Ok(AstNode::new(AstKind::Ternary)
                .with_token(q)
                .with_children(vec![cond, lhs, rhs]));
        }
    }

    Ok(cond)
}

/// Precedence climbing over the binding powers the token table declares.
fn parse_binary(la: &mut LookaheadStream, min_bp: u32) -> ParseResult {
    let mut lhs = parse_unary(la)?;

    loop {
        let op = match la.la(0) {
            Ok(tw) => tw,
            Err(_) => break,
        };

        let (lbp, rbp) = match op.token.infix_binding_power() {
            Some(powers) => powers,
            None => break,
        };
        if lbp < min_bp {
            break;
        }

        let _ = la.next();
        let rhs = parse_binary(la, rbp)?;
        lhs = AstNode::new(AstKind::BinOp)
            .with_token(op)
            .with_children(vec![lhs, rhs]);
    }

    Ok(lhs)
}

pub fn parse_unary(la: &mut LookaheadStream) -> ParseResult {
    let tw = la.la(0).map_err(|_| ParseResultError::EndOfFile)?;

    if tw.token.prefix_operator() {
        let _ = la.next();
        let operand = parse_unary(la)?;

        let node = match tw.token {
            Token::Asterisk => AstNode::new(AstKind::Indirection)
                .with_token(tw)
                .with_children(vec![operand]),
            Token::Ampersand => AstNode::new(AstKind::AddressOf)
                .with_token(tw)
                .with_children(vec![operand]),
            _ => AstNode::new(AstKind::UniOp)
                .with_token(tw)
                .with_children(vec![operand]),
        };
        return Ok(node);
    }

    let base = parse_atom(la)?;
    parse_postfix(la, base)
}

fn parse_postfix(la: &mut LookaheadStream, mut base: AstNode) -> ParseResult {
    loop {
        let tw = match la.la(0) {
            Ok(tw) => tw,
            Err(_) => break,
        };

        match tw.token {
            Token::Dot => {
                let _ = la.next();
                let member = expect_identifier(la)?;
                base = member_access(la, base, member)?;
            }
            Token::Arrow => {
                let _ = la.next();
                let member = expect_identifier(la)?;
                let deref = AstNode::new(AstKind::Indirection)
                    .with_token(tw)
                    .with_children(vec![base]);
                base = member_access(la, deref, member)?;
            }
            Token::LBracket => {
                let _ = la.next();
                let index = parse_expression(la)?;
                expect(la, Token::RBracket)?;
                base = AstNode::new(AstKind::ArrayReference)
                    .with_token(tw)
                    .with_children(vec![base, index]);
            }
            Token::LParen => {
                let args = parse_arguments(la)?;
                base = AstNode::new(AstKind::FunctionCall)
                    .with_token(tw)
                    .with_children(vec![base, args]);
            }
            Token::Increment | Token::Decrement => {
                let _ = la.next();
                base = AstNode::new(AstKind::PostOp)
                    .with_token(tw)
                    .with_children(vec![base]);
            }
            // `name<T, ...>(args)` is a generic instantiation when the type
            // list actually parses; otherwise the `<` stays a comparison
            Token::CmpLessThan if base.kind == AstKind::Id => {
                match try_generic_call(la, &base) {
                    Some(call) => base = call,
                    None => break,
                }
            }
            _ => break,
        }
    }

    Ok(base)
}

fn member_access(
    la: &mut LookaheadStream,
    receiver: AstNode,
    member: crate::helper::lex_wrap::TokenWrapper,
) -> ParseResult {
    if matches!(la.la(0), Ok(t) if t.token == Token::LParen) {
        let args = parse_arguments(la)?;
        return Ok(AstNode::new(AstKind::MethodCall)
            .with_token(member)
            .with_children(vec![
                receiver,
                AstNode::new(AstKind::Id).with_token(member),
                args,
            ]));
    }

    Ok(AstNode::new(AstKind::FieldGet)
        .with_token(member)
        .with_children(vec![
            receiver,
            AstNode::new(AstKind::Id).with_token(member),
        ]))
}

/// Backtracking disambiguation for explicit type arguments.
fn try_generic_call(la: &mut LookaheadStream, base: &AstNode) -> Option<AstNode> {
    let mark = la.index();
    let _ = la.next(); // the '<'

    let mut type_args = Vec::new();
    loop {
        let spec = match parse_type_specifier(la) {
            Ok(spec) => spec,
            Err(_) => {
                la.seek_to(mark);
                return None;
            }
        };
        type_args.push(AstNode::new(AstKind::TypeName).with_specifier(spec));

        match la.next() {
            Ok(t) if t.token == Token::Comma => continue,
            Ok(t) if t.token == Token::CmpGreaterThan => break,
            _ => {
                la.seek_to(mark);
                return None;
            }
        }
    }

    if !matches!(la.la(0), Ok(t) if t.token == Token::LParen) {
        la.seek_to(mark);
        return None;
    }

    let args = match parse_arguments(la) {
        Ok(args) => args,
        Err(_) => {
            la.seek_to(mark);
            return None;
        }
    };

    Some(
        AstNode {
            kind: AstKind::GenericCall,
            token: base.token,
            declared: None,
            children: vec![
                base.clone(),
                AstNode::new(AstKind::TypeArguments).with_children(type_args),
                args,
            ],
        },
    )
}

/// `( expr, expr, ... )` into a `Sequence`.
pub fn parse_arguments(la: &mut LookaheadStream) -> ParseResult {
    expect(la, Token::LParen)?;

    let mut args = Vec::new();
    if eat_if_matches(la, Token::RParen).is_none() {
        loop {
            args.push(parse_expression(la)?);
            if eat_if_matches(la, Token::Comma).is_none() {
                break;
            }
        }
        expect(la, Token::RParen)?;
    }

    Ok(AstNode::new(AstKind::Sequence).with_children(args))
}

fn parse_atom(la: &mut LookaheadStream) -> ParseResult {
    let tw = la.next().map_err(|_| ParseResultError::EndOfFile)?;

    match tw.token {
        Token::IntLiteral | Token::FloatLiteral | Token::CharLiteral => {
            Ok(AstNode::new(AstKind::Literal).with_token(tw))
        }

        Token::StringLiteral => Ok(AstNode::new(AstKind::StringLiteral).with_token(tw)),

        Token::True => Ok(AstNode::new(AstKind::True).with_token(tw)),
        Token::False => Ok(AstNode::new(AstKind::False).with_token(tw)),

        // `super` resolves through the scope tracker like any identifier
        Token::Identifier | Token::Super => Ok(AstNode::new(AstKind::Id).with_token(tw)),

        Token::New => {
            let name = expect_identifier(la)?;
            let args = parse_arguments(la)?;
            Ok(AstNode::new(AstKind::ConstructorCall)
                .with_token(name)
                .with_specifier(crate::ast::TypeSpecifier::Named(name.slice))
                .with_children(vec![args]))
        }

        Token::Sizeof => {
            expect(la, Token::LParen)?;

            // a type operand if one parses cleanly up to the ')', an
            // expression otherwise
            let mark = la.index();
            if let Ok(spec) = parse_type_specifier(la) {
                if eat_if_matches(la, Token::RParen).is_some() {
                    return Ok(AstNode::new(AstKind::Sizeof)
                        .with_token(tw)
                        .with_specifier(spec));
                }
            }
            la.seek_to(mark);

            let operand = parse_expression(la)?;
            expect(la, Token::RParen)?;
            Ok(AstNode::new(AstKind::Sizeof)
                .with_token(tw)
                .with_children(vec![operand]))
        }

        Token::LParen => {
            // cast or parenthesized expression; a bare named type is kept
            // as an expression, so value-casts to classes need a pointer
            if let Some(cast) = try_cast(la, tw) {
                return Ok(cast);
            }

            let inner = parse_expression(la)?;
            expect(la, Token::RParen)?;
            Ok(inner)
        }

        _ => {
            la.backtrack();
            Err(ParseResultError::UnexpectedToken(
                tw,
                vec![
                    Token::IntLiteral,
                    Token::Identifier,
                    Token::LParen,
                    Token::New,
                    Token::Sizeof,
                ],
                Some("expected an expression"),
            ))
        }
    }
}

/// Called with the `(` already consumed. Commits to a cast only when the
/// specifier is unambiguous: a primitive keyword base, a pointer, or a
/// const qualification.
fn try_cast(
    la: &mut LookaheadStream,
    paren: crate::helper::lex_wrap::TokenWrapper,
) -> Option<AstNode> {
    use crate::ast::TypeSpecifier;

    let mark = la.index();

    let spec = match parse_type_specifier(la) {
        Ok(spec) => spec,
        Err(_) => {
            la.seek_to(mark);
            return None;
        }
    };

    let unambiguous = !matches!(spec, TypeSpecifier::Named(_));
    if !unambiguous {
        la.seek_to(mark);
        return None;
    }

    if expect(la, Token::RParen).is_err() {
        la.seek_to(mark);
        return None;
    }

    match parse_unary(la) {
        Ok(operand) => Some(
            AstNode::new(AstKind::Cast)
                .with_token(paren)
                .with_specifier(spec)
                .with_children(vec![operand]),
        ),
        Err(_) => {
            la.seek_to(mark);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::lex_wrap::Wrapper;

    fn expr(source: &str) -> AstNode {
        let mut lex = Wrapper::new(source);
        let mut la = LookaheadStream::new(&mut lex);
        parse_expression(&mut la).expect("expression should parse")
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let e = expr("1 + 2 * 3");
        assert_eq!(e.kind, AstKind::BinOp);
        assert_eq!(e.children[1].kind, AstKind::BinOp);
    }

    #[test]
    fn arrow_becomes_indirection() {
        let e = expr("p->x");
        assert_eq!(e.kind, AstKind::FieldGet);
        assert_eq!(e.children[0].kind, AstKind::Indirection);
    }

    #[test]
    fn method_call_shape() {
        let e = expr("k.f(3)");
        assert_eq!(e.kind, AstKind::MethodCall);
        assert_eq!(e.children.len(), 3);
        assert_eq!(e.children[2].children.len(), 1);
    }

    #[test]
    fn generic_call_parses_type_arguments() {
        let e = expr("ident<int>(3)");
        assert_eq!(e.kind, AstKind::GenericCall);
        assert_eq!(e.children[1].children.len(), 1);
    }

    #[test]
    fn less_than_still_compares() {
        let e = expr("a < b");
        assert_eq!(e.kind, AstKind::BinOp);
    }

    #[test]
    fn new_expression() {
        let e = expr("new K(1, 2)");
        assert_eq!(e.kind, AstKind::ConstructorCall);
        assert_eq!(e.children[0].children.len(), 2);
    }
}
