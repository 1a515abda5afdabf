//! Frame Graph Arena
//!
//! Owns every frame-graph node, render target and texture of one view.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     FrameGraph                       │
//! │                                                      │
//! │  nodes:          SlotMap<FrameGraphNodeId, Node>     │
//! │  render_targets: SlotMap<RenderTargetId, Target>     │
//! │  textures:       SlotMap<TextureId, Texture>         │
//! │                                                      │
//! │  set_parent(node, Some(p)) → append under p          │
//! │  set_parent(node, None)    → detach (node floats)    │
//! │  destroy(node)             → remove whole subtree    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Detached nodes stay in the arena until destroyed. Stages rely on this to
//! keep optional branches around while they are not part of the tree.
//! Ids of removed nodes go stale; every accessor treats a stale id as
//! missing instead of panicking.

use std::borrow::Cow;
use std::fmt::Write as _;

use glam::UVec2;
use slotmap::{SlotMap, new_key_type};

use super::node::{FrameGraphNode, FrameGraphNodeKind};
use super::render_target::{
    AttachmentPoint, RenderTarget, RenderTargetDesc, RenderTargetId, Texture, TextureId,
};
use crate::errors::{KuesaError, Result};

new_key_type! {
    pub struct FrameGraphNodeId;
}

/// Resource-free snapshot of a subtree, used for topological comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStructure {
    pub name: String,
    pub kind: &'static str,
    pub enabled: bool,
    pub children: Vec<NodeStructure>,
}

impl NodeStructure {
    /// Number of nodes in the snapshot, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(NodeStructure::node_count).sum::<usize>()
    }

    #[must_use]
    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Default)]
pub struct FrameGraph {
    nodes: SlotMap<FrameGraphNodeId, FrameGraphNode>,
    render_targets: SlotMap<RenderTargetId, RenderTarget>,
    textures: SlotMap<TextureId, Texture>,
}

impl FrameGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Creates a detached node.
    pub fn create_node(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        kind: FrameGraphNodeKind,
    ) -> FrameGraphNodeId {
        self.nodes.insert(FrameGraphNode::new(name, kind))
    }

    /// Creates a node appended under `parent`.
    pub fn create_child(
        &mut self,
        parent: FrameGraphNodeId,
        name: impl Into<Cow<'static, str>>,
        kind: FrameGraphNodeKind,
    ) -> Result<FrameGraphNodeId> {
        if !self.nodes.contains_key(parent) {
            return Err(KuesaError::UnknownNode {
                context: "create_child parent",
            });
        }
        let id = self.create_node(name, kind);
        self.nodes[id].parent = Some(parent);
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: FrameGraphNodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[inline]
    #[must_use]
    pub fn node(&self, id: FrameGraphNodeId) -> Option<&FrameGraphNode> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn node_mut(&mut self, id: FrameGraphNodeId) -> Option<&mut FrameGraphNode> {
        self.nodes.get_mut(id)
    }

    /// Mutable access to a node's payload.
    pub fn kind_mut(&mut self, id: FrameGraphNodeId) -> Result<&mut FrameGraphNodeKind> {
        self.nodes
            .get_mut(id)
            .map(|node| &mut node.kind)
            .ok_or(KuesaError::UnknownNode { context: "kind_mut" })
    }

    #[must_use]
    pub fn parent(&self, id: FrameGraphNodeId) -> Option<FrameGraphNodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Ordered children, empty for a stale id.
    #[must_use]
    pub fn children(&self, id: FrameGraphNodeId) -> &[FrameGraphNodeId] {
        self.nodes.get(id).map_or(&[][..], FrameGraphNode::children)
    }

    #[must_use]
    pub fn is_enabled(&self, id: FrameGraphNodeId) -> bool {
        self.nodes.get(id).is_some_and(|node| node.enabled)
    }

    pub fn set_enabled(&mut self, id: FrameGraphNodeId, enabled: bool) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or(KuesaError::UnknownNode { context: "set_enabled" })?;
        node.enabled = enabled;
        Ok(())
    }

    /// `true` when `ancestor` is `node` or one of its parents.
    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: FrameGraphNodeId, node: FrameGraphNodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Moves `node` under `parent` (appended last) or detaches it with `None`.
    ///
    /// Re-parenting under the current parent moves the node to the end of
    /// the children list, which is how stages restore a canonical order.
    pub fn set_parent(
        &mut self,
        node: FrameGraphNodeId,
        parent: Option<FrameGraphNodeId>,
    ) -> Result<()> {
        if !self.nodes.contains_key(node) {
            return Err(KuesaError::UnknownNode {
                context: "set_parent node",
            });
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(KuesaError::UnknownNode {
                    context: "set_parent parent",
                });
            }
            if self.is_ancestor_of(node, parent) {
                return Err(KuesaError::CyclicParent {
                    node: self.nodes[node].name.to_string(),
                    parent: self.nodes[parent].name.to_string(),
                });
            }
        }

        self.detach(node);

        if let Some(parent) = parent {
            self.nodes[parent].children.push(node);
            self.nodes[node].parent = Some(parent);
        }
        Ok(())
    }

    /// Detaches `node` from its parent. No-op for stale or detached nodes.
    pub fn detach(&mut self, node: FrameGraphNodeId) {
        let Some(old_parent) = self.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(old_parent)
            && let Some(pos) = parent.children.iter().position(|&c| c == node)
        {
            parent.children.remove(pos);
        }
    }

    /// Removes `node` and its whole subtree. Returns how many nodes went away.
    pub fn destroy(&mut self, node: FrameGraphNodeId) -> usize {
        if !self.nodes.contains_key(node) {
            return 0;
        }
        self.detach(node);

        let mut removed = 0;
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(removed_node) = self.nodes.remove(id) {
                stack.extend(removed_node.children);
                removed += 1;
            }
        }
        log::trace!("Destroyed frame-graph subtree of {removed} node(s)");
        removed
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node ids of the subtree in depth-first pre-order, with their depth.
    #[must_use]
    pub fn walk(&self, root: FrameGraphNodeId) -> Vec<(usize, FrameGraphNodeId)> {
        let mut out = Vec::new();
        if !self.nodes.contains_key(root) {
            return out;
        }
        let mut stack = vec![(0, root)];
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            stack.extend(self.children(id).iter().rev().map(|&c| (depth + 1, c)));
        }
        out
    }

    #[must_use]
    pub fn subtree_len(&self, root: FrameGraphNodeId) -> usize {
        self.walk(root).len()
    }

    /// First node of the subtree (pre-order) matching `predicate`.
    pub fn find(
        &self,
        root: FrameGraphNodeId,
        mut predicate: impl FnMut(&FrameGraphNode) -> bool,
    ) -> Option<FrameGraphNodeId> {
        self.walk(root)
            .into_iter()
            .map(|(_, id)| id)
            .find(|&id| predicate(&self.nodes[id]))
    }

    #[must_use]
    pub fn find_by_name(&self, root: FrameGraphNodeId, name: &str) -> Option<FrameGraphNodeId> {
        self.find(root, |node| node.name == name)
    }

    #[must_use]
    pub fn structure(&self, root: FrameGraphNodeId) -> Option<NodeStructure> {
        let node = self.nodes.get(root)?;
        Some(NodeStructure {
            name: node.name.to_string(),
            kind: node.kind.label(),
            enabled: node.enabled,
            children: node
                .children
                .iter()
                .filter_map(|&child| self.structure(child))
                .collect(),
        })
    }

    /// Indented text rendering of a subtree.
    #[must_use]
    pub fn dump(&self, root: FrameGraphNodeId) -> String {
        let mut out = String::new();
        for (depth, id) in self.walk(root) {
            let node = &self.nodes[id];
            let _ = writeln!(
                out,
                "{:indent$}{} [{}]{}",
                "",
                node.name,
                node.kind.label(),
                if node.enabled { "" } else { " (disabled)" },
                indent = depth * 2
            );
        }
        out
    }

    // ========================================================================
    // Render targets
    // ========================================================================

    /// Allocates a render target and its attachments.
    pub fn create_render_target(
        &mut self,
        name: impl Into<String>,
        desc: RenderTargetDesc,
    ) -> RenderTargetId {
        let attachments = desc
            .attachment_layout()
            .into_iter()
            .map(|(point, format)| {
                let texture = self.textures.insert(Texture {
                    format,
                    size: desc.size,
                    samples: desc.samples,
                });
                (point, texture)
            })
            .collect();

        let id = self.render_targets.insert(RenderTarget {
            name: name.into(),
            flags: desc.flags,
            size: desc.size,
            samples: desc.samples,
            attachments,
        });
        log::trace!("Allocated render target {id:?} ({}x{})", desc.size.x, desc.size.y);
        id
    }

    /// Frees a render target and its attachments. Returns `false` for a stale id.
    pub fn destroy_render_target(&mut self, id: RenderTargetId) -> bool {
        let Some(target) = self.render_targets.remove(id) else {
            return false;
        };
        for (_, texture) in target.attachments {
            self.textures.remove(texture);
        }
        true
    }

    /// Resizes every attachment in place; texture ids stay valid.
    pub fn resize_render_target(&mut self, id: RenderTargetId, size: UVec2) -> Result<()> {
        let target = self
            .render_targets
            .get_mut(id)
            .ok_or(KuesaError::UnknownRenderTarget { context: "resize" })?;
        target.size = size;
        for (_, texture) in &target.attachments {
            if let Some(texture) = self.textures.get_mut(*texture) {
                texture.size = size;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn render_target(&self, id: RenderTargetId) -> Option<&RenderTarget> {
        self.render_targets.get(id)
    }

    #[must_use]
    pub fn find_render_target_texture(
        &self,
        id: RenderTargetId,
        attachment: AttachmentPoint,
    ) -> Option<TextureId> {
        self.render_targets.get(id)?.texture(attachment)
    }

    /// Depth (or depth-stencil) attachment of a target.
    #[must_use]
    pub fn depth_texture(&self, id: RenderTargetId) -> Option<TextureId> {
        let target = self.render_targets.get(id)?;
        target
            .texture(AttachmentPoint::Depth)
            .or_else(|| target.texture(AttachmentPoint::DepthStencil))
    }

    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    #[must_use]
    pub fn render_target_count(&self) -> usize {
        self.render_targets.len()
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}
