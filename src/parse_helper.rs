use crate::helper::lex_wrap::{LookaheadStream, ParseResultError, TokenWrapper};
use crate::lex::Token;
use std::collections::HashSet;

/// Error recovery: discard tokens up to and including the next member of
/// `toks`, so parsing can resume at a statement/declaration boundary.
pub fn eat_through(la: &mut LookaheadStream, toks: Vec<Token>) {
    let s: HashSet<Token> = toks.into_iter().collect();

    while let Ok(tw) = la.next() {
        if s.contains(&tw.token) {
            break;
        }
    }
}

pub fn eat_if_matches(la: &mut LookaheadStream, t: Token) -> Option<TokenWrapper> {
    expect(la, t).ok()
}

pub fn expect(la: &mut LookaheadStream, t: Token) -> Result<TokenWrapper, ParseResultError> {
    match la.next() {
        Ok(tw) if tw.token == t => Ok(tw),
        Ok(tw) => {
            la.backtrack();
            Err(ParseResultError::UnexpectedToken(tw, vec![t], None))
        }
        Err(_) => Err(ParseResultError::EndOfFile),
    }
}

pub fn expect_identifier(la: &mut LookaheadStream) -> Result<TokenWrapper, ParseResultError> {
    expect(la, Token::Identifier)
}
