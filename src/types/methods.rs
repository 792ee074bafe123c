use smallstr::SmallString;
use smallvec::SmallVec;

use crate::helper::interner::IStr;
use crate::helper::lex_wrap::TokenWrapper;
use crate::types::{ClassId, CxType, TypeEnvironment};

#[derive(Clone, Debug)]
pub struct CxParameter {
    pub name: IStr,
    pub ty: CxType,
}

#[derive(Clone, Debug)]
pub struct CxMethod {
    pub name: IStr,
    pub parameters: Vec<CxParameter>,
    pub return_type: CxType,
    pub is_virtual: bool,
    /// Canonical parameter mangle; filled in on registration.
    pub mangle: String,
    pub decl_token: Option<TokenWrapper>,
}

impl CxMethod {
    pub fn new(
        name: IStr,
        parameters: Vec<CxParameter>,
        return_type: CxType,
        is_virtual: bool,
        decl_token: Option<TokenWrapper>,
    ) -> CxMethod {
        CxMethod {
            name,
            parameters,
            return_type,
            is_virtual,
            mangle: String::new(),
            decl_token,
        }
    }

    pub fn parameter_types(&self) -> SmallVec<[CxType; 4]> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }
}

#[derive(Clone, Debug)]
pub struct CxConstructor {
    pub parameters: Vec<CxParameter>,
    pub mangle: String,
    pub decl_token: Option<TokenWrapper>,
}

impl CxConstructor {
    pub fn new(parameters: Vec<CxParameter>, decl_token: Option<TokenWrapper>) -> CxConstructor {
        CxConstructor {
            parameters,
            mangle: String::new(),
            decl_token,
        }
    }

    pub fn parameter_types(&self) -> SmallVec<[CxType; 4]> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }
}

/// Non-owning handle to a method resolved against a concrete class. The
/// backend reads these out of `METHOD_CALL` tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: ClassId,
    pub index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstructorRef {
    pub class: ClassId,
    pub index: usize,
}

/// An argument-type sequence at a call site, canonicalized for overload
/// selection.
#[derive(Clone, Debug)]
pub struct ParameterTypes {
    types: SmallVec<[CxType; 4]>,
}

impl ParameterTypes {
    pub fn new(types: impl IntoIterator<Item = CxType>) -> ParameterTypes {
        ParameterTypes {
            types: types.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn as_slice(&self) -> &[CxType] {
        &self.types
    }

    pub fn mangle(&self, env: &TypeEnvironment) -> String {
        mangle_types(&self.types, env)
    }

    pub fn describe(&self, env: &TypeEnvironment) -> String {
        let inner = self
            .types
            .iter()
            .map(|t| env.describe(t))
            .collect::<Vec<_>>()
            .join(", ");
        format!("({})", inner)
    }
}

/// The canonical signature string used as the overload key: each parameter
/// type's C definition with whitespace stripped and bracket/pointer
/// characters replaced by fixed letter codes.
pub fn mangle_types(types: &[CxType], env: &TypeEnvironment) -> String {
    let mut out: SmallString<[u8; 32]> = SmallString::new();
    for ty in types {
        for ch in ty.c_definition(env).chars() {
            match ch {
                ' ' => {}
                '(' => out.push('L'),
                ')' => {}
                '[' => out.push('R'),
                ']' => {}
                '*' => out.push('p'),
                other => out.push(other),
            }
        }
    }
    out.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::interner::Internable;

    #[test]
    fn mangle_strips_and_encodes() {
        let mut env = TypeEnvironment::new();
        let k = env.register_class("K".intern(), None, None).unwrap();

        let types = [
            CxType::INT,
            CxType::CHAR.pointer_to(),
            CxType::Compound(k).pointer_to(),
        ];
        assert_eq!(mangle_types(&types, &env), "intcharpstructKp");
    }

    #[test]
    fn distinct_arity_means_distinct_mangle() {
        let env = TypeEnvironment::new();
        let one = mangle_types(&[CxType::INT], &env);
        let two = mangle_types(&[CxType::INT, CxType::INT], &env);
        assert_ne!(one, two);
    }
}
