pub mod interner {
    use std::fmt::{Debug, Display};

    /// Interned string handle. Cheap to copy and compare; resolution goes
    /// through the process-wide rodeo.
    #[derive(Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
    pub struct IStr {
        internal: usize,
    }

    unsafe impl lasso::Key for IStr {
        fn into_usize(self) -> usize {
            self.internal
        }

        fn try_from_usize(int: usize) -> Option<Self> {
            Some(IStr { internal: int })
        }
    }

    lazy_static! {
        static ref INTERNER: lasso::ThreadedRodeo<IStr> = lasso::ThreadedRodeo::new();
    }

    pub fn intern(v: &str) -> IStr {
        INTERNER.get_or_intern(v)
    }

    pub trait Internable {
        fn intern(&self) -> IStr;
    }

    impl Internable for str {
        fn intern(&self) -> IStr {
            intern(self)
        }
    }

    impl Internable for String {
        fn intern(&self) -> IStr {
            intern(self.as_str())
        }
    }

    pub trait SpurHelper {
        fn resolve(&self) -> &'static str;
    }

    impl SpurHelper for IStr {
        fn resolve(&self) -> &'static str {
            let interner: &'static lasso::ThreadedRodeo<IStr> = &INTERNER;
            interner.resolve(self)
        }
    }

    impl Display for IStr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.resolve())
        }
    }

    impl Debug for IStr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "S('{}')", self.resolve())
        }
    }
}

pub mod lex_wrap {
    use crate::helper::interner::*;
    use crate::lex::Token;
    use logos::Logos;

    type LexResult = Result<TokenWrapper, ParseResultError>;

    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub enum CodeLocation {
        Parsed(Loc),
        Builtin,
    }

    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub struct Loc {
        pub line: isize,
        pub offset: isize,
    }

    impl std::fmt::Display for CodeLocation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Parsed(l) => write!(f, "({}:{})", l.line, l.offset),
                Self::Builtin => write!(f, "(builtin)"),
            }
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct TokenWrapper {
        pub token: Token,
        pub slice: IStr,
        pub start: CodeLocation,
        pub end: CodeLocation,
    }

    impl TokenWrapper {
        /// A token that exists only for diagnostics, with no source position.
        pub fn builtin(token: Token, slice: &str) -> TokenWrapper {
            TokenWrapper {
                token,
                slice: slice.intern(),
                start: CodeLocation::Builtin,
                end: CodeLocation::Builtin,
            }
        }
    }

    #[derive(Debug, Clone)]
    pub enum ParseResultError {
        EndOfFile,
        NotYetParsed,
        /// The found token, followed by a list of tokens that would have been
        /// allowed here, followed by a message (if applicable)
        UnexpectedToken(TokenWrapper, Vec<Token>, Option<&'static str>),
        SemanticIssue(&'static str, CodeLocation, CodeLocation),
    }

    impl ParseResultError {
        pub fn add_expect(&mut self, toks: &[Token]) {
            if let Self::UnexpectedToken(_tw, v, None) = self {
                v.extend(toks);
            }
        }
    }

    pub struct Wrapper<'a> {
        lexer: logos::Lexer<'a, Token>,
        cur: LexResult,

        current_line: isize,
        last_newline_absolute: usize,
    }

    impl<'a> Wrapper<'a> {
        pub fn new(input: &'a str) -> Wrapper<'a> {
            Wrapper {
                lexer: Token::lexer(input),
                cur: Err(ParseResultError::NotYetParsed),
                current_line: 1,
                last_newline_absolute: 0,
            }
        }

        pub fn peek(&self) -> LexResult {
            self.cur.clone()
        }

        pub fn advance(&mut self) {
            match self.lexer.next() {
                Some(tok) => {
                    let sp = self.lexer.span();
                    let start = Loc {
                        line: self.current_line,
                        offset: (sp.start - self.last_newline_absolute) as isize,
                    };

                    if let Token::Newline = tok {
                        self.current_line += 1;
                        self.last_newline_absolute = sp.end;
                    }

                    let end = Loc {
                        line: self.current_line,
                        offset: (sp.end.saturating_sub(self.last_newline_absolute)) as isize,
                    };

                    self.cur = Ok(TokenWrapper {
                        token: tok,
                        slice: intern(self.lexer.slice()),
                        start: CodeLocation::Parsed(start),
                        end: CodeLocation::Parsed(end),
                    });
                }
                None => self.cur = Err(ParseResultError::EndOfFile),
            }
        }

        pub fn next(&mut self) -> LexResult {
            self.advance();
            self.peek()
        }
    }

    /// Pre-lexed token stream with arbitrary lookahead and backtracking.
    /// Newlines and lex errors never reach the parser; they are filtered
    /// here so that the grammar only ever sees meaningful tokens.
    #[derive(Clone)]
    pub struct LookaheadStream {
        tokens: Vec<TokenWrapper>,
        index: usize,
    }

    impl LookaheadStream {
        pub fn new(w: &mut Wrapper) -> LookaheadStream {
            let mut v = Vec::new();
            while let Ok(tw) = w.next() {
                match tw.token {
                    Token::Newline | Token::Error => continue,
                    _ => v.push(tw),
                }
            }

            LookaheadStream { tokens: v, index: 0 }
        }

        pub fn index(&self) -> usize {
            self.index
        }

        pub fn seek_to(&mut self, index: usize) {
            self.index = index;
        }

        pub fn la(&self, offset: isize) -> LexResult {
            let index = self.index as isize + offset;
            if index < 0 {
                return Err(ParseResultError::NotYetParsed);
            }

            match self.tokens.get(index as usize) {
                Some(tw) => Ok(*tw),
                None => Err(ParseResultError::EndOfFile),
            }
        }

        pub fn next(&mut self) -> LexResult {
            let r = self.la(0);
            if r.is_ok() {
                self.index += 1;
            }
            r
        }

        pub fn backtrack(&mut self) {
            if self.index > 0 {
                self.index -= 1;
            }
        }
    }
}
