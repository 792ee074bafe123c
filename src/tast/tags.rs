use crate::analysis::generics::InstanceId;
use crate::ast::AstKind;
use crate::types::{ConstructorRef, MethodRef};

/// Category of a compilation tag, used as the search key. Several tags of
/// the same category may coexist on one node; search returns the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagCategory {
    VirtualMethodCall,
    ShadowingFieldName,
    IndirectMethodCall,
    IndirectFieldGet,
    NewObjectDereference,
    CompileAsFieldGet,
    OperatorAssignment,
    HasElse,
    VoidReturn,
    ConstantSize,
    MainFunction,
    MethodCall,
    SuperCall,
    ConstructorCall,
    ArraySize,
    GenericCall,
    InstantiationAnchor,
}

/// Semantic markers the resolution engine leaves on TAST nodes for the
/// backend. The set is closed: the source language's tag categories are
/// fixed, so a plugin mechanism would buy nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum CompilationTag {
    /// The resolved method is virtual; emit an indirect call through the
    /// class-info table instead of a direct one.
    VirtualMethodCall,
    /// A local shadows a field of the enclosing class body; the local wins.
    ShadowingFieldName,
    IndirectMethodCall,
    IndirectFieldGet,
    NewObjectDereference,
    /// The "method" is actually a function-pointer field; compile the call
    /// as a field get plus indirect invocation.
    CompileAsFieldGet,
    /// Compound assignment (`+=` and friends).
    OperatorAssignment,
    HasElse,
    VoidReturn,
    /// The declared array size folded to a compile-time constant.
    ConstantSize,
    MainFunction,

    MethodCall(MethodRef),
    SuperCall(MethodRef),
    ConstructorCall(ConstructorRef),
    /// The folded size value for a constant-sized array declaration.
    ArraySize { value: i128 },
    GenericCall(InstanceId),
    /// Marks the top-level declaration the instantiation must be spliced
    /// next to in the output.
    InstantiationAnchor(InstanceId),
}

impl CompilationTag {
    pub fn category(&self) -> TagCategory {
        match self {
            CompilationTag::VirtualMethodCall => TagCategory::VirtualMethodCall,
            CompilationTag::ShadowingFieldName => TagCategory::ShadowingFieldName,
            CompilationTag::IndirectMethodCall => TagCategory::IndirectMethodCall,
            CompilationTag::IndirectFieldGet => TagCategory::IndirectFieldGet,
            CompilationTag::NewObjectDereference => TagCategory::NewObjectDereference,
            CompilationTag::CompileAsFieldGet => TagCategory::CompileAsFieldGet,
            CompilationTag::OperatorAssignment => TagCategory::OperatorAssignment,
            CompilationTag::HasElse => TagCategory::HasElse,
            CompilationTag::VoidReturn => TagCategory::VoidReturn,
            CompilationTag::ConstantSize => TagCategory::ConstantSize,
            CompilationTag::MainFunction => TagCategory::MainFunction,
            CompilationTag::MethodCall(_) => TagCategory::MethodCall,
            CompilationTag::SuperCall(_) => TagCategory::SuperCall,
            CompilationTag::ConstructorCall(_) => TagCategory::ConstructorCall,
            CompilationTag::ArraySize { .. } => TagCategory::ArraySize,
            CompilationTag::GenericCall(_) => TagCategory::GenericCall,
            CompilationTag::InstantiationAnchor(_) => TagCategory::InstantiationAnchor,
        }
    }

    /// The node kinds this tag may attach to; `None` means anywhere.
    pub fn valid_attachment(&self) -> Option<&'static [AstKind]> {
        match self {
            CompilationTag::VirtualMethodCall
            | CompilationTag::IndirectMethodCall
            | CompilationTag::CompileAsFieldGet
            | CompilationTag::MethodCall(_)
            | CompilationTag::SuperCall(_) => Some(&[AstKind::MethodCall]),
            CompilationTag::ShadowingFieldName => Some(&[AstKind::Id]),
            CompilationTag::IndirectFieldGet => Some(&[AstKind::FieldGet]),
            CompilationTag::NewObjectDereference => Some(&[AstKind::Indirection]),
            CompilationTag::OperatorAssignment => Some(&[AstKind::Assignment]),
            CompilationTag::HasElse => Some(&[AstKind::If]),
            CompilationTag::VoidReturn => Some(&[AstKind::Return]),
            CompilationTag::ConstantSize | CompilationTag::ArraySize { .. } => {
                Some(&[AstKind::Declaration, AstKind::InitializedDeclaration])
            }
            CompilationTag::MainFunction => Some(&[AstKind::FunctionDefinition]),
            CompilationTag::ConstructorCall(_) => Some(&[AstKind::ConstructorCall]),
            CompilationTag::GenericCall(_) => Some(&[AstKind::GenericCall]),
            CompilationTag::InstantiationAnchor(_) => None,
        }
    }

    pub fn can_attach_to(&self, kind: AstKind) -> bool {
        match self.valid_attachment() {
            None => true,
            Some(kinds) => kinds.contains(&kind),
        }
    }
}

/// Returned when a tag's valid-attachment set excludes the target node;
/// the node's tag set is left untouched.
#[derive(Clone, Debug)]
pub struct TagRejected {
    pub tag: CompilationTag,
    pub node_kind: AstKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNode;
    use crate::tast::Tast;

    #[test]
    fn attach_and_find_round_trip() {
        let ast = AstNode::new(AstKind::If);
        let (mut tast, root) = Tast::build(&ast);

        tast.attach_tag(root, CompilationTag::HasElse).unwrap();
        let found = tast.find_tag(root, TagCategory::HasElse).unwrap();
        assert_eq!(*found, CompilationTag::HasElse);
    }

    #[test]
    fn rejected_attach_leaves_tags_unchanged() {
        let ast = AstNode::new(AstKind::While);
        let (mut tast, root) = Tast::build(&ast);

        let r = tast.attach_tag(root, CompilationTag::HasElse);
        assert!(r.is_err());
        assert!(tast.tags(root).is_empty());
    }

    #[test]
    fn same_category_tags_accumulate() {
        let ast = AstNode::new(AstKind::MethodCall);
        let (mut tast, root) = Tast::build(&ast);

        tast.attach_tag(root, CompilationTag::VirtualMethodCall)
            .unwrap();
        tast.attach_tag(root, CompilationTag::IndirectMethodCall)
            .unwrap();
        assert_eq!(tast.tags(root).len(), 2);
        assert!(tast.has_tag(root, TagCategory::VirtualMethodCall));
        assert!(tast.has_tag(root, TagCategory::IndirectMethodCall));
    }
}
