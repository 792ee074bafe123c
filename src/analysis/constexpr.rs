use crate::ast::AstKind;
use crate::helper::interner::SpurHelper;
use crate::lex::Token;
use crate::tast::{NodeId, Tast};

/// Integer literal images as the lexer admits them: decimal, hex, binary.
pub fn parse_int_literal(image: &str) -> Option<i128> {
    if let Some(hex) = image.strip_prefix("0x") {
        i128::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = image.strip_prefix("0b") {
        i128::from_str_radix(bin, 2).ok()
    } else {
        image.parse().ok()
    }
}

fn char_literal_value(image: &str) -> Option<i128> {
    let inner = image.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    let value = match chars.next()? {
        '\\' => match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            other => other,
        },
        plain => plain,
    };
    Some(value as i128)
}

/// Fold a TAST subtree to a compile-time integer constant, or decline.
/// Array-size resolution is the consumer: a foldable size gets cached in a
/// `CONSTANT_SIZE` tag, anything else makes the backend allocate
/// dynamically.
pub fn fold(tast: &Tast, node: NodeId) -> Option<i128> {
    match tast.kind(node) {
        AstKind::Literal => {
            let token = tast.token(node)?;
            match token.token {
                Token::IntLiteral => parse_int_literal(token.slice.resolve()),
                Token::CharLiteral => char_literal_value(token.slice.resolve()),
                _ => None,
            }
        }
        AstKind::True => Some(1),
        AstKind::False => Some(0),
        AstKind::UniOp => {
            let value = fold(tast, tast.child(node, 0)?)?;
            match tast.token(node)?.token {
                Token::Dash => Some(-value),
                Token::Bang => Some((value == 0) as i128),
                _ => None,
            }
        }
        AstKind::BinOp => {
            let lhs = fold(tast, tast.child(node, 0)?)?;
            let rhs = fold(tast, tast.child(node, 1)?)?;
            match tast.token(node)?.token {
                Token::Plus => lhs.checked_add(rhs),
                Token::Dash => lhs.checked_sub(rhs),
                Token::Asterisk => lhs.checked_mul(rhs),
                Token::FSlash => lhs.checked_div(rhs),
                Token::Modulo => lhs.checked_rem(rhs),
                Token::Ampersand => Some(lhs & rhs),
                Token::Pipe => Some(lhs | rhs),
                Token::Caret => Some(lhs ^ rhs),
                _ => None,
            }
        }
        AstKind::Cast => fold(tast, tast.child(node, 0)?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_literal_radixes() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("0x10"), Some(16));
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("abc"), None);
    }

    #[test]
    fn char_escapes() {
        assert_eq!(char_literal_value("'a'"), Some('a' as i128));
        assert_eq!(char_literal_value("'\\n'"), Some('\n' as i128));
    }
}
