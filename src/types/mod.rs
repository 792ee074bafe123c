pub mod env;
pub mod methods;

pub use env::{ClassId, CxClass, CxField, TypeEnvironment};
pub use methods::{ConstructorRef, CxConstructor, CxMethod, CxParameter, MethodRef, ParameterTypes};

use crate::helper::interner::{IStr, SpurHelper};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    Char,
    Int,
    Float,
    Double,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Void => "void",
            Primitive::Char => "char",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Primitive::Char | Primitive::Int)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double)
    }

    /// Anything a binary arithmetic operator accepts.
    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating_point()
    }
}

/// A node in the type lattice. The environment exclusively owns class data;
/// `Compound` is a non-owning arena index into it, so types stay cheap to
/// clone and compare.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CxType {
    Primitive(Primitive),
    Pointer(Box<CxType>),
    /// Const qualification wrapper. Stripped freely when a value is read,
    /// enforced at assignment targets.
    Const(Box<CxType>),
    /// Element type only; the declared size expression lives on the
    /// declaration node and is cached through the `CONSTANT_SIZE` tag.
    Array(Box<CxType>),
    Compound(ClassId),
    FunctionPointer {
        ret: Box<CxType>,
        params: Vec<CxType>,
    },
    /// Placeholder type usable only inside a generic function body. An
    /// absent bound accepts any type argument.
    Generic {
        name: IStr,
        bound: Option<Box<CxType>>,
    },
}

impl CxType {
    pub const VOID: CxType = CxType::Primitive(Primitive::Void);
    pub const CHAR: CxType = CxType::Primitive(Primitive::Char);
    pub const INT: CxType = CxType::Primitive(Primitive::Int);
    pub const DOUBLE: CxType = CxType::Primitive(Primitive::Double);

    pub fn pointer_to(self) -> CxType {
        CxType::Pointer(Box::new(self))
    }

    pub fn const_of(self) -> CxType {
        CxType::Const(Box::new(self))
    }

    pub fn strip_const(&self) -> &CxType {
        match self {
            CxType::Const(inner) => inner.strip_const(),
            other => other,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, CxType::Const(_))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.strip_const(), CxType::Primitive(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self.strip_const(), CxType::Primitive(Primitive::Void))
    }

    /// The pointed-at type, for pointers and decayed arrays.
    pub fn pointee(&self) -> Option<&CxType> {
        match self.strip_const() {
            CxType::Pointer(inner) | CxType::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self.strip_const() {
            CxType::Compound(id) => Some(*id),
            _ => None,
        }
    }

    /// The textual C definition of this type. This string is the basis of
    /// the overload mangle, so its exact shape is load-bearing.
    pub fn c_definition(&self, env: &TypeEnvironment) -> String {
        match self {
            CxType::Primitive(p) => p.name().to_owned(),
            CxType::Pointer(inner) => format!("{}*", inner.c_definition(env)),
            CxType::Const(inner) => format!("const {}", inner.c_definition(env)),
            CxType::Array(inner) => format!("{}[]", inner.c_definition(env)),
            CxType::Compound(id) => format!("struct {}", env.class(*id).name.resolve()),
            CxType::FunctionPointer { ret, params } => {
                let params = params
                    .iter()
                    .map(|p| p.c_definition(env))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}(*)({})", ret.c_definition(env), params)
            }
            CxType::Generic { name, .. } => name.resolve().to_owned(),
        }
    }
}

impl std::fmt::Display for CxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CxType::Primitive(p) => write!(f, "{}", p.name()),
            CxType::Pointer(inner) => write!(f, "{}*", inner),
            CxType::Const(inner) => write!(f, "const {}", inner),
            CxType::Array(inner) => write!(f, "{}[]", inner),
            CxType::Compound(id) => write!(f, "class#{}", id.0),
            CxType::FunctionPointer { ret, params } => {
                write!(f, "{}(*)(", ret)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            CxType::Generic { name, .. } => write!(f, "{}", name),
        }
    }
}
