use colored::*;
use itertools::Itertools;
use smallvec::{smallvec, SmallVec};

use crate::helper::lex_wrap::{CodeLocation, TokenWrapper};

/// Every user-facing failure the resolution engine can raise. The names
/// track what the error is, not where it was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    Redeclare,
    TypeDefinitionAlreadyExists,
    PrimitiveTypeDefinition,
    IdentifierDoesNotExist,
    IllegalTypesForOperation,
    IllegalLValue,
    ConstModification,
    IncorrectParameterTypes,
    NoMatchingOverload,
    NoConstructor,
    MissingReturn,
    NonVoidReturn,
    IncorrectReturnType,
    MultipleMainDefinitions,
    IncorrectMainDefinition,
    IllegalCast,
    IllegalAccess,
    VoidDereference,
    IncorrectType,
    IllegalStatement,
    NotAFunction,
    MissingTypeReference,
    MalformedLiteral,
    GenericRedeclaration,
    IncorrectTypeArgumentCount,
    IllegalTypeArguments,
    Internal,
}

/// A reportable compiler error: a message, the tokens that anchor it in
/// source, and free-form supplementary lines. Internal invariant failures
/// are the only diagnostics allowed to carry no token; the analyzer
/// boundary substitutes the nearest ancestor token before one escapes.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub tokens: SmallVec<[TokenWrapper; 2]>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            kind,
            message: message.into(),
            tokens: SmallVec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: TokenWrapper) -> Diagnostic {
        self.tokens.push(token);
        self
    }

    pub fn with_token_opt(mut self, token: Option<TokenWrapper>) -> Diagnostic {
        if let Some(t) = token {
            self.tokens.push(t);
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Diagnostic {
        self.notes.push(note.into());
        self
    }

    pub fn redeclare(what: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::Redeclare,
            format!("'{}' is already declared in this scope", what),
        )
        .with_token_opt(token)
    }

    pub fn typedef_exists(name: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::TypeDefinitionAlreadyExists,
            format!("a type named '{}' already exists", name),
        )
        .with_token_opt(token)
    }

    pub fn primitive_typedef(name: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::PrimitiveTypeDefinition,
            format!("'{}' names a built-in primitive and cannot be redefined", name),
        )
        .with_token_opt(token)
    }

    pub fn identifier_missing(name: &str, token: TokenWrapper) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IdentifierDoesNotExist,
            format!("identifier '{}' does not exist in this scope", name),
        )
        .with_token(token)
    }

    pub fn illegal_operation(op: TokenWrapper, operands: &[String]) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IllegalTypesForOperation,
            format!(
                "operator '{}' cannot be applied to {}",
                op.slice,
                operands.iter().join(" and ")
            ),
        )
        .with_token(op)
    }

    pub fn illegal_lvalue(token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IllegalLValue,
            "left side of assignment is not an lvalue",
        )
        .with_token_opt(token)
    }

    pub fn const_modification(token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::ConstModification,
            "cannot assign to a const-qualified value",
        )
        .with_token_opt(token)
    }

    pub fn no_matching_overload(
        name: &str,
        attempted: &str,
        token: Option<TokenWrapper>,
    ) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::NoMatchingOverload,
            format!("no overload of '{}' accepts {}", name, attempted),
        )
        .with_token_opt(token)
    }

    pub fn no_constructor(class: &str, attempted: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::NoConstructor,
            format!("class '{}' has no constructor accepting {}", class, attempted),
        )
        .with_token_opt(token)
    }

    pub fn missing_return(function: &str, ret: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::MissingReturn,
            format!(
                "function '{}' does not return '{}' on every path",
                function, ret
            ),
        )
        .with_token_opt(token)
    }

    pub fn multiple_main(first: Option<TokenWrapper>, second: TokenWrapper) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::MultipleMainDefinitions,
            "more than one definition of 'main'",
        )
        .with_token_opt(first)
        .with_token(second)
    }

    pub fn incorrect_main(token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IncorrectMainDefinition,
            "'main' must be declared as 'int main()' or 'int main(int, char**)'",
        )
        .with_token_opt(token)
    }

    pub fn illegal_cast(from: &str, to: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IllegalCast,
            format!("cannot cast '{}' to '{}'", from, to),
        )
        .with_token_opt(token)
    }

    pub fn illegal_access(on: &str, member: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IllegalAccess,
            format!("'{}' has no accessible member '{}'", on, member),
        )
        .with_token_opt(token)
    }

    pub fn void_dereference(token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::VoidDereference, "cannot dereference 'void*'")
            .with_token_opt(token)
    }

    pub fn incorrect_type(expected: &str, got: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IncorrectType,
            format!("expected a value of type '{}', found '{}'", expected, got),
        )
        .with_token_opt(token)
    }

    pub fn incorrect_return_type(
        expected: &str,
        got: &str,
        token: Option<TokenWrapper>,
    ) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IncorrectReturnType,
            format!("returned '{}' from a function returning '{}'", got, expected),
        )
        .with_token_opt(token)
    }

    pub fn non_void_return(token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::NonVoidReturn,
            "bare 'return' in a function with a non-void return type",
        )
        .with_token_opt(token)
    }

    pub fn illegal_statement(token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IllegalStatement,
            "this expression cannot stand alone as a statement",
        )
        .with_token_opt(token)
    }

    pub fn missing_type_reference(name: &str, token: Option<TokenWrapper>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::MissingTypeReference,
            format!("'{}' does not name a known type", name),
        )
        .with_token_opt(token)
    }

    pub fn malformed_literal(token: TokenWrapper) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::MalformedLiteral,
            format!("'{}' is not a valid literal", token.slice),
        )
        .with_token(token)
    }

    pub fn generic_redeclaration(name: &str, tokens: &[TokenWrapper]) -> Diagnostic {
        let mut d = Diagnostic::new(
            DiagnosticKind::GenericRedeclaration,
            format!(
                "a generic function '{}' with this type-parameter count already exists",
                name
            ),
        );
        d.tokens.extend(tokens.iter().copied());
        d
    }

    pub fn incorrect_type_argument_count(
        found: usize,
        expected: usize,
        token: Option<TokenWrapper>,
    ) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IncorrectTypeArgumentCount,
            format!("expected {} type arguments, found {}", expected, found),
        )
        .with_token_opt(token)
    }

    pub fn illegal_type_arguments(token: Option<TokenWrapper>, note: String) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::IllegalTypeArguments,
            "type arguments do not satisfy the declared bounds",
        )
        .with_token_opt(token)
        .with_note(note)
    }

    pub fn first_location(&self) -> Option<CodeLocation> {
        self.tokens.first().map(|t| t.start)
    }
}

/// How a failed analysis propagates.
///
/// `Recoverable` failures are caught at the nearest analyzer boundary and
/// the subtree counts as having produced no type; `Fatal` failures mark the
/// node as a failure point and abort the subtree; `Internal` failures are
/// invariant violations that get wrapped into a token-anchored diagnostic
/// at the boundary and are always fatal.
#[derive(Clone, Debug)]
pub enum Failure {
    Recoverable(Diagnostic),
    Fatal(Diagnostic),
    Internal(String),
}

impl From<Diagnostic> for Failure {
    fn from(d: Diagnostic) -> Failure {
        Failure::Fatal(d)
    }
}

impl Failure {
    pub fn internal(message: impl Into<String>) -> Failure {
        Failure::Internal(message.into())
    }

    /// Internal failures become diagnostics only once a token is known.
    pub fn into_diagnostic(self, nearest: Option<TokenWrapper>) -> Diagnostic {
        match self {
            Failure::Recoverable(d) | Failure::Fatal(d) => d,
            Failure::Internal(message) => Diagnostic {
                kind: DiagnosticKind::Internal,
                message,
                tokens: nearest.map(|t| smallvec![t]).unwrap_or_default(),
                notes: vec!["this is a compiler invariant violation".to_owned()],
            },
        }
    }
}

pub type AnalyzeResult<T> = Result<T, Failure>;

pub struct ErrorPrinter {}

impl ErrorPrinter {
    pub fn note_line(&self, line: &str) {
        println!(
            "   {} {}",
            ">".bright_blue().bold(),
            line.bright_yellow().bold()
        );
    }

    pub fn report(&self, diag: &Diagnostic, source: &str, filename: &str) {
        println!(
            "{}: {}",
            "error".bold().bright_red(),
            diag.message.bold().bright_yellow()
        );

        let lines = source.lines().collect_vec();
        for token in diag.tokens.iter() {
            self.print_context(token.start, token.end, &lines, filename);
        }

        for note in diag.notes.iter() {
            self.note_line(note);
        }
    }

    pub fn print_context(
        &self,
        start: CodeLocation,
        end: CodeLocation,
        lines: &[&str],
        filename: &str,
    ) {
        let (start, end) = match (start, end) {
            (CodeLocation::Parsed(s), CodeLocation::Parsed(e)) => (s, e),
            _ => return,
        };

        let end_line = (end.line + 1).min(lines.len() as isize);
        let start_line = start.line;
        let start_char = start.offset;

        let filename = filename.bold();
        println!(
            "  {} {filename}  starting at {start_line}:{start_char}",
            "-->".blue().bold()
        );

        let mut pad = 0;
        for line_num in start_line..(end_line + 1) {
            pad = pad.max(line_num.to_string().len());
        }
        pad += 4;

        for line_num in start_line..(end_line + 1) {
            let line = lines.get(line_num as usize - 1).unwrap_or(&"");

            let hl = if line_num >= start.line && line_num <= end.line {
                let s = if line_num > start.line {
                    0
                } else {
                    start.offset as usize
                };
                let e = if line_num < end.line {
                    line.len()
                } else {
                    (end.offset as usize).min(line.len())
                };
                Some((s, e))
            } else {
                None
            };

            self.print_fmt_line(line_num, pad, line, hl);
        }
        println!();
    }

    pub fn print_fmt_line(
        &self,
        line_num: isize,
        pad: usize,
        line: &str,
        highlight: Option<(usize, usize)>,
    ) {
        println!();
        print!(" {line:<pad$} | ", line = line_num, pad = pad);
        print!("{}", line.bold());
        println!();

        print!(" {line:pad$} | ", line = "", pad = pad);
        if let Some((start, end)) = highlight {
            for i in 0..line.len() {
                if i >= start && i < end {
                    print!("{}", "^".bright_red());
                } else {
                    print!(" ");
                }
            }
        }
        println!();
    }

    pub fn print_bar(&self) {
        println!();
        if let Some((w, _)) = term_size::dimensions() {
            for _ in 0..w {
                print!("{}", "―".cyan());
            }
        }
        println!();
    }
}
