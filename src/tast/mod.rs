pub mod tags;

use tracing::trace;

use crate::ast::{AstKind, AstNode, TypeSpecifier};
use crate::helper::lex_wrap::TokenWrapper;
use crate::tast::tags::{CompilationTag, TagCategory, TagRejected};
use crate::types::CxType;

/// Index of a node within its owning `Tast` arena. The arena only ever
/// grows, so ids handed out (including generic-instance roots) stay valid
/// for the life of the compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

pub struct TastNode {
    pub kind: AstKind,
    pub token: Option<TokenWrapper>,
    pub declared: Option<TypeSpecifier>,

    /// Back-reference for diagnostics and upward tag searches only; the
    /// child list is the owning edge.
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,

    ty: Option<CxType>,
    lvalue: bool,
    failure_point: bool,

    tags: Vec<CompilationTag>,
}

/// The type-augmented semantic tree: the AST flattened into an index arena,
/// carrying a resolved type and a tag list per node.
pub struct Tast {
    nodes: Vec<TastNode>,
}

impl Tast {
    pub fn new() -> Tast {
        Tast { nodes: Vec::new() }
    }

    /// Consume an AST subtree into the arena, returning the root id. Also
    /// how instantiated generic bodies get spliced in later: grafts are
    /// ordinary nodes from this point on.
    pub fn graft(&mut self, ast: &AstNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TastNode {
            kind: ast.kind,
            token: ast.token,
            declared: ast.declared.clone(),
            parent,
            children: Vec::new(),
            ty: None,
            lvalue: false,
            failure_point: false,
            tags: Vec::new(),
        });

        for child in ast.children.iter() {
            let cid = self.graft(child, Some(id));
            self.nodes[id.0].children.push(cid);
        }

        trace!("grafted {} as node {}", ast.kind, id.0);
        id
    }

    pub fn build(ast: &AstNode) -> (Tast, NodeId) {
        let mut tast = Tast::new();
        let root = tast.graft(ast, None);
        (tast, root)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: NodeId) -> &TastNode {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> AstKind {
        self.node(id).kind
    }

    pub fn token(&self, id: NodeId) -> Option<TokenWrapper> {
        self.node(id).token
    }

    pub fn declared(&self, id: NodeId) -> Option<&TypeSpecifier> {
        self.node(id).declared.as_ref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children.clone()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).children.len()
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id).children.get(index).copied()
    }

    pub fn child_of_kind(&self, id: NodeId, kind: AstKind) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|&c| self.kind(c) == kind)
    }

    /// A node's resolved type is set at most once per analysis pass; only
    /// an explicit re-analysis may overwrite it.
    pub fn set_type(&mut self, id: NodeId, ty: CxType) {
        self.nodes[id.0].ty = Some(ty);
    }

    pub fn clear_type(&mut self, id: NodeId) {
        self.nodes[id.0].ty = None;
    }

    pub fn ty(&self, id: NodeId) -> Option<&CxType> {
        self.node(id).ty.as_ref()
    }

    pub fn is_typed(&self, id: NodeId) -> bool {
        self.node(id).ty.is_some()
    }

    pub fn set_lvalue(&mut self, id: NodeId, lvalue: bool) {
        self.nodes[id.0].lvalue = lvalue;
    }

    pub fn is_lvalue(&self, id: NodeId) -> bool {
        self.node(id).lvalue
    }

    pub fn set_failure_point(&mut self, id: NodeId) {
        self.nodes[id.0].failure_point = true;
    }

    pub fn is_failure_point(&self, id: NodeId) -> bool {
        self.node(id).failure_point
    }

    /// First token found in a pre-order walk of the subtree.
    pub fn first_token(&self, id: NodeId) -> Option<TokenWrapper> {
        if let Some(t) = self.node(id).token {
            return Some(t);
        }
        for &child in self.node(id).children.iter() {
            if let Some(t) = self.first_token(child) {
                return Some(t);
            }
        }
        None
    }

    /// Nearest locatable token: the subtree first, then enclosing nodes.
    /// Used to anchor internal errors that carry no token of their own.
    pub fn nearest_token(&self, id: NodeId) -> Option<TokenWrapper> {
        if let Some(t) = self.first_token(id) {
            return Some(t);
        }
        let mut cursor = self.node(id).parent;
        while let Some(p) = cursor {
            if let Some(t) = self.node(p).token {
                return Some(t);
            }
            cursor = self.node(p).parent;
        }
        None
    }

    /// The deepest node flagged as a failure point, which is the closest
    /// locatable site of whatever went wrong under `id`.
    pub fn deepest_failure(&self, id: NodeId) -> Option<NodeId> {
        for &child in self.node(id).children.iter() {
            if let Some(found) = self.deepest_failure(child) {
                return Some(found);
            }
        }
        if self.node(id).failure_point {
            Some(id)
        } else {
            None
        }
    }

    pub fn failure_token(&self, id: NodeId) -> Option<TokenWrapper> {
        self.deepest_failure(id)
            .and_then(|n| self.first_token(n))
            .or_else(|| self.nearest_token(id))
    }

    /// Attach is validated and append-only: tags are never removed or
    /// replaced, only searched.
    pub fn attach_tag(&mut self, id: NodeId, tag: CompilationTag) -> Result<(), TagRejected> {
        let kind = self.kind(id);
        if !tag.can_attach_to(kind) {
            return Err(TagRejected {
                tag,
                node_kind: kind,
            });
        }
        self.nodes[id.0].tags.push(tag);
        Ok(())
    }

    pub fn tags(&self, id: NodeId) -> &[CompilationTag] {
        &self.node(id).tags
    }

    pub fn find_tag(&self, id: NodeId, category: TagCategory) -> Option<&CompilationTag> {
        self.node(id)
            .tags
            .iter()
            .find(|t| t.category() == category)
    }

    pub fn has_tag(&self, id: NodeId, category: TagCategory) -> bool {
        self.find_tag(id, category).is_some()
    }

    /// Bounded search: the node itself first, then its subtree in pre-order.
    pub fn find_tag_in_subtree(
        &self,
        id: NodeId,
        category: TagCategory,
    ) -> Option<(NodeId, &CompilationTag)> {
        if let Some(t) = self.find_tag(id, category) {
            return Some((id, t));
        }
        for &child in self.node(id).children.iter() {
            if let Some(found) = self.find_tag_in_subtree(child, category) {
                return Some(found);
            }
        }
        None
    }

    /// Rebuild the AST form of a subtree. Generic instantiation uses this
    /// to recover a template body for substitution.
    pub fn extract_ast(&self, id: NodeId) -> AstNode {
        let node = self.node(id);
        AstNode {
            kind: node.kind,
            token: node.token,
            declared: node.declared.clone(),
            children: node
                .children
                .iter()
                .map(|&c| self.extract_ast(c))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstKind;

    fn small_tree() -> AstNode {
        AstNode::new(AstKind::CompoundStatement).with_children(vec![
            AstNode::new(AstKind::Return).with_children(vec![AstNode::new(AstKind::Literal)]),
        ])
    }

    #[test]
    fn graft_preserves_shape_and_parents() {
        let (tast, root) = Tast::build(&small_tree());
        assert_eq!(tast.kind(root), AstKind::CompoundStatement);
        let ret = tast.child(root, 0).unwrap();
        assert_eq!(tast.kind(ret), AstKind::Return);
        assert_eq!(tast.parent(ret), Some(root));
        let lit = tast.child(ret, 0).unwrap();
        assert_eq!(tast.parent(lit), Some(ret));
    }

    #[test]
    fn deepest_failure_prefers_descendants() {
        let (mut tast, root) = Tast::build(&small_tree());
        let ret = tast.child(root, 0).unwrap();
        let lit = tast.child(ret, 0).unwrap();
        tast.set_failure_point(root);
        tast.set_failure_point(lit);
        assert_eq!(tast.deepest_failure(root), Some(lit));
    }

    #[test]
    fn extract_ast_round_trips() {
        let (tast, root) = Tast::build(&small_tree());
        let extracted = tast.extract_ast(root);
        assert_eq!(extracted.kind, AstKind::CompoundStatement);
        assert_eq!(extracted.children.len(), 1);
        assert_eq!(extracted.children[0].children[0].kind, AstKind::Literal);
    }
}
