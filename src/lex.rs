use logos::Logos;

#[derive(Logos, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Token {
    #[token("class")]
    Class,

    #[token("virtual")]
    Virtual,

    #[token("typedef")]
    Typedef,

    #[token("const")]
    Const,

    #[token("new")]
    New,

    #[token("generic")]
    Generic,

    #[token("super")]
    Super,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("while")]
    While,

    #[token("do")]
    Do,

    #[token("for")]
    For,

    #[token("return")]
    Return,

    #[token("sizeof")]
    Sizeof,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("void")]
    Void,

    #[token("char")]
    Char,

    #[token("int")]
    Int,

    #[token("float")]
    Float,

    #[token("double")]
    Double,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token("?")]
    Question,

    #[token(".")]
    Dot,

    #[token("->")]
    Arrow,

    #[token("=")]
    Equals,

    #[token("+=")]
    PlusEquals,

    #[token("-=")]
    DashEquals,

    #[token("*=")]
    AsteriskEquals,

    #[token("/=")]
    FSlashEquals,

    #[token("%=")]
    ModuloEquals,

    #[token("==")]
    CmpEqual,

    #[token("!=")]
    CmpNotEqual,

    #[token("<")]
    CmpLessThan,

    #[token("<=")]
    CmpLessThanEq,

    #[token(">")]
    CmpGreaterThan,

    #[token(">=")]
    CmpGreaterThanEq,

    #[token("&&")]
    LogicalAnd,

    #[token("||")]
    LogicalOr,

    #[token("!")]
    Bang,

    #[token("+")]
    Plus,

    #[token("-")]
    Dash,

    #[token("*")]
    Asterisk,

    #[token("/")]
    FSlash,

    #[token("%")]
    Modulo,

    #[token("&")]
    Ampersand,

    #[token("|")]
    Pipe,

    #[token("^")]
    Caret,

    #[token("++")]
    Increment,

    #[token("--")]
    Decrement,

    #[regex("[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    #[regex("[0-9]+\\.[0-9]*|\\.[0-9]+")]
    FloatLiteral,

    #[regex("[0-9]+|0x[0-9a-fA-F]+|0b[01]+")]
    IntLiteral,

    #[regex(r"'([^'\\]|\\.)'")]
    CharLiteral,

    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLiteral,

    #[token(" ", logos::skip)]
    Space,

    #[token("\t", logos::skip)]
    Tab,

    #[token("\r", logos::skip)]
    CarriageReturn,

    #[regex("//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    BlockComment,

    #[token("\n")]
    Newline,

    #[error]
    Error,
}

impl Token {
    /// Binding powers for the binary operators, C precedence order.
    /// Left-associative throughout, so the right power is the higher one.
    pub fn infix_binding_power(&self) -> Option<(u32, u32)> {
        match self {
            Token::LogicalOr => Some((1, 2)),
            Token::LogicalAnd => Some((3, 4)),
            Token::Pipe => Some((5, 6)),
            Token::Caret => Some((7, 8)),
            Token::Ampersand => Some((9, 10)),
            Token::CmpEqual | Token::CmpNotEqual => Some((11, 12)),
            Token::CmpLessThan
            | Token::CmpLessThanEq
            | Token::CmpGreaterThan
            | Token::CmpGreaterThanEq => Some((13, 14)),
            Token::Plus | Token::Dash => Some((15, 16)),
            Token::Asterisk | Token::FSlash | Token::Modulo => Some((17, 18)),
            _ => None,
        }
    }

    pub fn prefix_operator(&self) -> bool {
        matches!(
            self,
            Token::Dash
                | Token::Bang
                | Token::Asterisk
                | Token::Ampersand
                | Token::Increment
                | Token::Decrement
        )
    }

    pub fn assignment_operator(&self) -> bool {
        matches!(
            self,
            Token::Equals
                | Token::PlusEquals
                | Token::DashEquals
                | Token::AsteriskEquals
                | Token::FSlashEquals
                | Token::ModuloEquals
        )
    }

    pub fn comparison_operator(&self) -> bool {
        matches!(
            self,
            Token::CmpEqual
                | Token::CmpNotEqual
                | Token::CmpLessThan
                | Token::CmpLessThanEq
                | Token::CmpGreaterThan
                | Token::CmpGreaterThanEq
                | Token::LogicalAnd
                | Token::LogicalOr
        )
    }

    /// Tokens that can begin a type specifier.
    pub fn starts_type(&self) -> bool {
        matches!(
            self,
            Token::Void
                | Token::Char
                | Token::Int
                | Token::Float
                | Token::Double
                | Token::Const
                | Token::Identifier
        )
    }
}

#[test]
fn lexes_class_declaration() {
    let source = "class K { int f(int a) { return a; } }";
    let mut lex = Token::lexer(source);
    assert!(matches!(lex.next(), Some(Token::Class)));
    assert!(matches!(lex.next(), Some(Token::Identifier)));
    assert_eq!(lex.slice(), "K");
    assert!(matches!(lex.next(), Some(Token::LBrace)));
    assert!(matches!(lex.next(), Some(Token::Int)));
}

#[test]
fn comments_are_skipped() {
    let source = "a /* b */ c // d\ne";
    let mut lex = Token::lexer(source);
    let mut idents = 0;
    while let Some(t) = lex.next() {
        match t {
            Token::Identifier => idents += 1,
            Token::Newline => {}
            other => panic!("unexpected token {:?}", other),
        }
    }
    assert_eq!(idents, 3);
}
