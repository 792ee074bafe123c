use std::cell::{Cell, RefCell};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::errors::Diagnostic;
use crate::helper::interner::{IStr, Internable, SpurHelper};
use crate::helper::lex_wrap::TokenWrapper;
use crate::types::methods::{mangle_types, ConstructorRef, CxConstructor, CxMethod, MethodRef};
use crate::types::{CxType, Primitive};

/// Arena index of a class within its owning environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u64);

#[derive(Clone, Debug)]
pub struct CxField {
    pub name: IStr,
    pub ty: CxType,
}

#[derive(Clone, Debug)]
pub struct CxClass {
    pub name: IStr,
    pub parent: Option<ClassId>,
    pub fields: Vec<CxField>,
    pub methods: Vec<CxMethod>,
    pub constructors: Vec<CxConstructor>,
    /// Stable id used for runtime class metadata. Never reused.
    pub type_id: u64,
    pub decl_token: Option<TokenWrapper>,
}

/// Compilation-unit-scoped type registry: the class arena, typedefs, the
/// primitive size table, and the `is`/`is_strict` compatibility predicates.
/// Created once per compilation, mutated only while declarations are being
/// processed, read-only during resolution.
pub struct TypeEnvironment {
    classes: Vec<CxClass>,
    class_names: FxHashMap<IStr, ClassId>,
    typedefs: FxHashMap<IStr, CxType>,

    primitive_ids: [u64; 5],
    next_type_id: Cell<u64>,
    /// Memoized ids for structural types (pointers, arrays, function
    /// pointers), keyed by their canonical C definition so repeated
    /// lookups stay stable.
    structural_ids: RefCell<FxHashMap<String, u64>>,

    char_size: usize,
    int_size: usize,
    float_size: usize,
    double_size: usize,
    pointer_size: usize,
}

impl TypeEnvironment {
    /// Id 0 is reserved for the root reflection metadata class; primitives
    /// take the next ids, classes everything after.
    pub fn new() -> TypeEnvironment {
        let mut env = TypeEnvironment {
            classes: Vec::new(),
            class_names: FxHashMap::default(),
            typedefs: FxHashMap::default(),
            primitive_ids: [0; 5],
            next_type_id: Cell::new(0),
            structural_ids: RefCell::new(FxHashMap::default()),
            char_size: 1,
            int_size: 4,
            float_size: 4,
            double_size: 8,
            pointer_size: 8,
        };

        let root = env
            .register_class("ClassInfo".intern(), None, None)
            .expect("fresh environment cannot collide on the reflection root");
        debug_assert_eq!(env.class(root).type_id, 0);

        env.classes[root.0 as usize].fields = vec![
            CxField {
                name: "id".intern(),
                ty: CxType::INT,
            },
            CxField {
                name: "parent".intern(),
                ty: CxType::Compound(root).pointer_to(),
            },
        ];

        for (i, p) in [
            Primitive::Void,
            Primitive::Char,
            Primitive::Int,
            Primitive::Float,
            Primitive::Double,
        ]
        .iter()
        .enumerate()
        {
            env.primitive_ids[i] = env.take_type_id();
            debug!("primitive {} gets type id {}", p.name(), env.primitive_ids[i]);
        }

        env
    }

    fn take_type_id(&self) -> u64 {
        let id = self.next_type_id.get();
        self.next_type_id.set(id + 1);
        id
    }

    pub fn register_class(
        &mut self,
        name: IStr,
        parent: Option<ClassId>,
        decl_token: Option<TokenWrapper>,
    ) -> Result<ClassId, Diagnostic> {
        if self.class_names.contains_key(&name) {
            return Err(Diagnostic::redeclare(name.resolve(), decl_token));
        }

        let id = ClassId(self.classes.len() as u64);
        let type_id = self.take_type_id();
        debug!("class {} registered with type id {}", name, type_id);

        self.classes.push(CxClass {
            name,
            parent,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            type_id,
            decl_token,
        });
        self.class_names.insert(name, id);
        Ok(id)
    }

    pub fn class(&self, id: ClassId) -> &CxClass {
        &self.classes[id.0 as usize]
    }

    pub fn class_by_name(&self, name: IStr) -> Option<ClassId> {
        self.class_names.get(&name).copied()
    }

    pub fn add_field(
        &mut self,
        id: ClassId,
        name: IStr,
        ty: CxType,
        token: Option<TokenWrapper>,
    ) -> Result<(), Diagnostic> {
        if self.class(id).fields.iter().any(|f| f.name == name) {
            return Err(Diagnostic::redeclare(name.resolve(), token));
        }
        self.classes[id.0 as usize].fields.push(CxField { name, ty });
        Ok(())
    }

    /// Overload identity is the canonical parameter mangle; two methods of
    /// the same name and mangle in one class are a redeclaration.
    pub fn add_method(&mut self, id: ClassId, mut method: CxMethod) -> Result<MethodRef, Diagnostic> {
        let mangle = mangle_types(method.parameter_types().as_slice(), self);
        let existing = self.class(id);
        if existing
            .methods
            .iter()
            .any(|m| m.name == method.name && m.mangle == mangle)
        {
            return Err(Diagnostic::redeclare(method.name.resolve(), method.decl_token)
                .with_note(format!("signature mangle: {}", mangle)));
        }

        method.mangle = mangle;
        let class = &mut self.classes[id.0 as usize];
        class.methods.push(method);
        Ok(MethodRef {
            class: id,
            index: class.methods.len() - 1,
        })
    }

    pub fn add_constructor(
        &mut self,
        id: ClassId,
        mut constructor: CxConstructor,
    ) -> Result<ConstructorRef, Diagnostic> {
        let mangle = mangle_types(constructor.parameter_types().as_slice(), self);
        let existing = self.class(id);
        if existing.constructors.iter().any(|c| c.mangle == mangle) {
            return Err(
                Diagnostic::redeclare(existing.name.resolve(), constructor.decl_token)
                    .with_note(format!("constructor mangle: {}", mangle)),
            );
        }

        constructor.mangle = mangle;
        let class = &mut self.classes[id.0 as usize];
        class.constructors.push(constructor);
        Ok(ConstructorRef {
            class: id,
            index: class.constructors.len() - 1,
        })
    }

    pub fn method(&self, r: MethodRef) -> &CxMethod {
        &self.class(r.class).methods[r.index]
    }

    pub fn constructor(&self, r: ConstructorRef) -> &CxConstructor {
        &self.class(r.class).constructors[r.index]
    }

    /// First exact mangle match, searching the receiver's own class and then
    /// upward along the parent chain. Single inheritance means there is
    /// never a sibling to disambiguate against.
    pub fn find_method(&self, class: ClassId, name: IStr, mangle: &str) -> Option<MethodRef> {
        let mut cursor = Some(class);
        while let Some(cid) = cursor {
            let c = self.class(cid);
            if let Some(index) = c
                .methods
                .iter()
                .position(|m| m.name == name && m.mangle == mangle)
            {
                return Some(MethodRef { class: cid, index });
            }
            cursor = c.parent;
        }
        None
    }

    /// Like `find_method` but starts at the parent, for `super` calls.
    pub fn find_super_method(&self, class: ClassId, name: IStr, mangle: &str) -> Option<MethodRef> {
        self.class(class)
            .parent
            .and_then(|p| self.find_method(p, name, mangle))
    }

    pub fn any_method_named(&self, class: ClassId, name: IStr) -> bool {
        let mut cursor = Some(class);
        while let Some(cid) = cursor {
            let c = self.class(cid);
            if c.methods.iter().any(|m| m.name == name) {
                return true;
            }
            cursor = c.parent;
        }
        false
    }

    pub fn find_constructor(&self, class: ClassId, mangle: &str) -> Option<ConstructorRef> {
        self.class(class)
            .constructors
            .iter()
            .position(|c| c.mangle == mangle)
            .map(|index| ConstructorRef { class, index })
    }

    /// Field lookup walks the parent chain; returns the declaring class as
    /// well so access tags can name it.
    pub fn field_type(&self, class: ClassId, name: IStr) -> Option<(CxType, ClassId)> {
        let mut cursor = Some(class);
        while let Some(cid) = cursor {
            let c = self.class(cid);
            if let Some(f) = c.fields.iter().find(|f| f.name == name) {
                return Some((f.ty.clone(), cid));
            }
            cursor = c.parent;
        }
        None
    }

    pub fn register_typedef(
        &mut self,
        name: IStr,
        ty: CxType,
        token: Option<TokenWrapper>,
    ) -> Result<(), Diagnostic> {
        let text = name.resolve();
        if matches!(text, "void" | "char" | "int" | "float" | "double") {
            return Err(Diagnostic::primitive_typedef(text, token));
        }
        if self.typedefs.contains_key(&name) {
            return Err(Diagnostic::typedef_exists(text, token));
        }
        debug!("typedef {} = {}", name, ty);
        self.typedefs.insert(name, ty);
        Ok(())
    }

    pub fn typedef(&self, name: IStr) -> Option<&CxType> {
        self.typedefs.get(&name)
    }

    pub fn upcastable(&self, from: ClassId, to: ClassId) -> bool {
        let mut cursor = Some(from);
        while let Some(cid) = cursor {
            if cid == to {
                return true;
            }
            cursor = self.class(cid).parent;
        }
        false
    }

    /// May a value of type `a` be used where `b` is expected? Reflexive;
    /// admits numeric widening, non-const to const relaxation, array decay,
    /// any-pointer to `void*`, and class upcast along the parent chain.
    pub fn is(&self, a: &CxType, b: &CxType) -> bool {
        self.compatible(a, b, false)
    }

    /// `is` without primitive-to-primitive coercion: `int` is not `char`
    /// here even though both are integral.
    pub fn is_strict(&self, a: &CxType, b: &CxType) -> bool {
        self.compatible(a, b, true)
    }

    fn compatible(&self, a: &CxType, b: &CxType, strict: bool) -> bool {
        let a = a.strip_const();
        let b = b.strip_const();

        match (a, b) {
            (CxType::Generic { name: x, .. }, CxType::Generic { name: y, .. }) => x == y,
            (CxType::Generic { bound, .. }, other) => match bound {
                Some(bound) => self.compatible(bound, other, strict),
                None => false,
            },
            (_, CxType::Generic { .. }) => false,

            (CxType::Primitive(p), CxType::Primitive(q)) => {
                if strict {
                    p == q
                } else {
                    p == q || (p.is_numeric() && q.is_numeric())
                }
            }

            (CxType::Compound(x), CxType::Compound(y)) => self.upcastable(*x, *y),

            (CxType::Pointer(x), CxType::Pointer(y)) => {
                // `void*` converts freely in both directions, C-style
                if !strict && (y.strip_const().is_void() || x.strip_const().is_void()) {
                    return true;
                }
                match (x.strip_const(), y.strip_const()) {
                    (CxType::Compound(cx), CxType::Compound(cy)) => self.upcastable(*cx, *cy),
                    (xx, yy) => self.compatible(xx, yy, true),
                }
            }

            (CxType::Array(x), CxType::Pointer(y)) if !strict => {
                self.compatible(x, y.strip_const(), true)
            }
            (CxType::Array(x), CxType::Array(y)) => self.compatible(x, y, true),

            (
                CxType::FunctionPointer { ret: r1, params: p1 },
                CxType::FunctionPointer { ret: r2, params: p2 },
            ) => {
                p1.len() == p2.len()
                    && p1
                        .iter()
                        .zip(p2.iter())
                        .all(|(x, y)| self.compatible(x, y, true))
                    && self.compatible(r1, r2, strict)
            }

            _ => false,
        }
    }

    /// Stable reflection id for a concrete type; `None` for generics, which
    /// never survive to runtime.
    pub fn type_id(&self, ty: &CxType) -> Option<u64> {
        match ty.strip_const() {
            CxType::Primitive(p) => {
                let index = match p {
                    Primitive::Void => 0,
                    Primitive::Char => 1,
                    Primitive::Int => 2,
                    Primitive::Float => 3,
                    Primitive::Double => 4,
                };
                Some(self.primitive_ids[index])
            }
            CxType::Compound(id) => Some(self.class(*id).type_id),
            CxType::Generic { .. } => None,
            structural => {
                let key = structural.c_definition(self);
                let mut memo = self.structural_ids.borrow_mut();
                Some(*memo.entry(key).or_insert_with(|| self.take_type_id()))
            }
        }
    }

    pub fn primitive_size(&self, p: Primitive) -> usize {
        match p {
            Primitive::Void => 0,
            Primitive::Char => self.char_size,
            Primitive::Int => self.int_size,
            Primitive::Float => self.float_size,
            Primitive::Double => self.double_size,
        }
    }

    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    /// Human-readable form for diagnostics; resolves class names, which the
    /// plain `Display` impl cannot do.
    pub fn describe(&self, ty: &CxType) -> String {
        ty.c_definition(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_chain() -> (TypeEnvironment, ClassId, ClassId, ClassId) {
        let mut env = TypeEnvironment::new();
        let c = env.register_class("C".intern(), None, None).unwrap();
        let b = env.register_class("B".intern(), Some(c), None).unwrap();
        let a = env.register_class("A".intern(), Some(b), None).unwrap();
        (env, a, b, c)
    }

    #[test]
    fn upcast_is_transitive_along_parent_chain() {
        let (env, a, _b, c) = env_with_chain();
        assert!(env.is(&CxType::Compound(a), &CxType::Compound(c)));
        assert!(!env.is(&CxType::Compound(c), &CxType::Compound(a)));
    }

    #[test]
    fn strict_rejects_primitive_coercion() {
        let (env, _, _, _) = env_with_chain();
        assert!(env.is(&CxType::INT, &CxType::CHAR));
        assert!(!env.is_strict(&CxType::INT, &CxType::CHAR));
        assert!(env.is_strict(&CxType::INT, &CxType::INT));
    }

    #[test]
    fn const_relaxation_is_permitted() {
        let (env, _, _, _) = env_with_chain();
        assert!(env.is(&CxType::INT, &CxType::INT.const_of()));
        assert!(env.is(&CxType::INT.const_of(), &CxType::INT));
    }

    #[test]
    fn any_pointer_converts_to_void_pointer() {
        let (env, a, _, _) = env_with_chain();
        let void_ptr = CxType::VOID.pointer_to();
        assert!(env.is(&CxType::Compound(a).pointer_to(), &void_ptr));
        assert!(!env.is_strict(&CxType::Compound(a).pointer_to(), &void_ptr));
    }

    #[test]
    fn class_redeclaration_is_rejected() {
        let mut env = TypeEnvironment::new();
        env.register_class("K".intern(), None, None).unwrap();
        assert!(env.register_class("K".intern(), None, None).is_err());
    }

    #[test]
    fn typedef_collisions_are_rejected() {
        let mut env = TypeEnvironment::new();
        env.register_typedef("word".intern(), CxType::INT, None)
            .unwrap();
        assert!(env
            .register_typedef("word".intern(), CxType::CHAR, None)
            .is_err());
        assert!(env
            .register_typedef("int".intern(), CxType::CHAR, None)
            .is_err());
    }

    #[test]
    fn type_ids_are_stable_across_lookups() {
        let (env, a, _, _) = env_with_chain();
        let ptr = CxType::Compound(a).pointer_to();
        let first = env.type_id(&ptr).unwrap();
        let second = env.type_id(&ptr).unwrap();
        assert_eq!(first, second);
        assert_ne!(Some(first), env.type_id(&CxType::Compound(a)));
    }

    #[test]
    fn reflection_root_holds_id_zero() {
        let env = TypeEnvironment::new();
        let root = env.class_by_name("ClassInfo".intern()).unwrap();
        assert_eq!(env.class(root).type_id, 0);
    }
}
