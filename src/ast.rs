use crate::helper::interner::IStr;
use crate::helper::lex_wrap::TokenWrapper;
use crate::types::{CxType, Primitive};

/// The closed set of node kinds the parser may emit. The resolution engine
/// dispatches over this exhaustively; a kind showing up in a position it
/// cannot occupy is an internal error, not a silent fallthrough.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum AstKind {
    TopLevelDecs,

    /// Children: `[Id, ParameterList, CompoundStatement]`; the declared
    /// specifier is the return type.
    FunctionDefinition,
    /// Same shape as `FunctionDefinition` with a `TypeParameterList`
    /// prepended. The body is held back from analysis until instantiation.
    GenericFunctionDefinition,
    TypeParameterList,
    /// One generic type parameter; token is its name, the declared
    /// specifier (if any) is its bound.
    TypeParameter,
    ParameterList,

    /// A single variable declaration; token is the name, the declared
    /// specifier is the type. An array declaration carries its size
    /// expression as the only child.
    Declaration,
    /// A declaration with an initializer as the only child.
    InitializedDeclaration,
    /// A statement-level group of declarations sharing one statement.
    Declarations,

    CompoundStatement,
    /// Children: `[condition, then, else-or-Empty]`.
    If,
    While,
    /// Children: `[body, condition]`.
    DoWhile,
    /// Children: `[init, condition, update, body]`, any of the first three
    /// possibly `Empty`.
    For,
    Return,

    /// Token is the assignment operator; children `[lhs, rhs]`.
    Assignment,
    /// Token is the operator; children `[lhs, rhs]`.
    BinOp,
    /// Token is the operator; one child.
    UniOp,
    /// Postfix `++`/`--`; token is the operator, one child.
    PostOp,
    Ternary,

    Literal,
    StringLiteral,
    True,
    False,
    Id,

    /// An ordered list of expressions (call arguments).
    Sequence,
    /// Children: `[callee-expression, Sequence]`.
    FunctionCall,
    /// Explicit generic instantiation; children
    /// `[Id, TypeArguments, Sequence]`.
    GenericCall,
    TypeArguments,
    /// Children: `[receiver, Id, Sequence]`; token is the method name.
    MethodCall,
    /// Children: `[receiver, Id]`.
    FieldGet,
    ArrayReference,
    /// Pointer dereference.
    Indirection,
    AddressOf,
    /// Declared specifier is the target type; one child.
    Cast,
    /// Either a declared specifier or one expression child.
    Sizeof,
    /// `new Class(args)`; declared specifier names the class, children
    /// `[Sequence]`.
    ConstructorCall,

    /// Token is the class name; children `[Inherit?, ClassLevelDecs]`.
    ClassDefinition,
    Inherit,
    ClassLevelDecs,
    /// Wraps a `FunctionDefinition` that was declared `virtual`.
    Virtual,
    /// Token is the class name; children `[ParameterList, CompoundStatement]`.
    ConstructorDefinition,

    /// Token is the new name; declared specifier is the aliased type.
    Typedef,
    /// A bare type reference; declared specifier carries it.
    TypeName,

    Empty,
}

/// Syntactic type reference as written in source. Resolution to a `CxType`
/// happens during analysis, once the environment can answer name lookups;
/// the `Resolved` variant is how generic instantiation splices concrete
/// types into a copied template body.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeSpecifier {
    Primitive(Primitive),
    Named(IStr),
    Pointer(Box<TypeSpecifier>),
    Const(Box<TypeSpecifier>),
    Array(Box<TypeSpecifier>),
    Resolved(CxType),
}

impl TypeSpecifier {
    /// Rewrites every `Named` occurrence found in `map` to its concrete
    /// replacement. Used when stamping out a generic template body.
    pub fn substitute(&self, map: &rustc_hash::FxHashMap<IStr, CxType>) -> TypeSpecifier {
        match self {
            TypeSpecifier::Named(name) => match map.get(name) {
                Some(concrete) => TypeSpecifier::Resolved(concrete.clone()),
                None => self.clone(),
            },
            TypeSpecifier::Pointer(inner) => {
                TypeSpecifier::Pointer(Box::new(inner.substitute(map)))
            }
            TypeSpecifier::Const(inner) => TypeSpecifier::Const(Box::new(inner.substitute(map))),
            TypeSpecifier::Array(inner) => TypeSpecifier::Array(Box::new(inner.substitute(map))),
            TypeSpecifier::Primitive(_) | TypeSpecifier::Resolved(_) => self.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AstNode {
    pub kind: AstKind,
    pub token: Option<TokenWrapper>,
    pub declared: Option<TypeSpecifier>,
    pub children: Vec<AstNode>,
}

impl AstNode {
    pub fn new(kind: AstKind) -> AstNode {
        AstNode {
            kind,
            token: None,
            declared: None,
            children: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: TokenWrapper) -> AstNode {
        self.token = Some(token);
        self
    }

    pub fn with_specifier(mut self, specifier: TypeSpecifier) -> AstNode {
        self.declared = Some(specifier);
        self
    }

    pub fn with_children(mut self, children: Vec<AstNode>) -> AstNode {
        self.children = children;
        self
    }

    pub fn empty() -> AstNode {
        AstNode::new(AstKind::Empty)
    }

    pub fn is_empty(&self) -> bool {
        self.kind == AstKind::Empty
    }

    /// First direct child of the given kind.
    pub fn child_of_kind(&self, kind: AstKind) -> Option<&AstNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// Substitute type names throughout a subtree; the generic
    /// instantiation path applies this to a cloned template body.
    pub fn substitute_types(&self, map: &rustc_hash::FxHashMap<IStr, CxType>) -> AstNode {
        AstNode {
            kind: self.kind,
            token: self.token,
            declared: self.declared.as_ref().map(|d| d.substitute(map)),
            children: self
                .children
                .iter()
                .map(|c| c.substitute_types(map))
                .collect(),
        }
    }
}
