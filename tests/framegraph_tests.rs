//! Frame Graph Arena Tests
//!
//! Tests for:
//! - Node parenting, ordering and cycle rejection
//! - Subtree destruction and stale ids
//! - Structural snapshots and text dumps
//! - Render-target attachment layouts and in-place resizing

use glam::{UVec2, Vec4};
use kuesa::KuesaError;
use kuesa::framegraph::node::{ClearBufferFlags, FrameGraphNodeKind};
use kuesa::framegraph::render_target::{
    AttachmentPoint, RenderTargetDesc, RenderTargetFlags, TextureFormat,
};
use kuesa::framegraph::{FrameGraph, FrameGraphNodeId};

// ============================================================================
// Helpers
// ============================================================================

fn group(graph: &mut FrameGraph, name: &'static str) -> FrameGraphNodeId {
    graph.create_node(name, FrameGraphNodeKind::Group)
}

fn names(graph: &FrameGraph, node: FrameGraphNodeId) -> Vec<String> {
    graph
        .children(node)
        .iter()
        .map(|&child| graph.node(child).unwrap().name.to_string())
        .collect()
}

// ============================================================================
// Parenting
// ============================================================================

#[test]
fn reparenting_appends_last() {
    let mut graph = FrameGraph::new();
    let root = group(&mut graph, "root");
    let a = graph.create_child(root, "a", FrameGraphNodeKind::Group).unwrap();
    graph.create_child(root, "b", FrameGraphNodeKind::Group).unwrap();

    graph.set_parent(a, Some(root)).unwrap();

    assert_eq!(names(&graph, root), vec!["b", "a"]);
    assert_eq!(graph.parent(a), Some(root));
}

#[test]
fn cycles_are_rejected() {
    let mut graph = FrameGraph::new();
    let root = group(&mut graph, "root");
    let child = graph.create_child(root, "child", FrameGraphNodeKind::Group).unwrap();

    let err = graph.set_parent(root, Some(child)).unwrap_err();
    assert!(matches!(err, KuesaError::CyclicParent { .. }));
    assert!(graph.set_parent(root, Some(root)).is_err());

    // The failed call leaves the tree untouched.
    assert_eq!(graph.parent(child), Some(root));
    assert!(graph.parent(root).is_none());
}

#[test]
fn detach_keeps_subtree_alive() {
    let mut graph = FrameGraph::new();
    let root = group(&mut graph, "root");
    let branch = graph.create_child(root, "branch", FrameGraphNodeKind::Group).unwrap();
    let leaf = graph.create_child(branch, "leaf", FrameGraphNodeKind::NoDraw).unwrap();

    graph.detach(branch);
    graph.detach(branch);

    assert!(graph.children(root).is_empty());
    assert!(graph.contains(leaf));
    assert_eq!(graph.parent(leaf), Some(branch));
}

#[test]
fn stale_parent_is_an_error() {
    let mut graph = FrameGraph::new();
    let gone = group(&mut graph, "gone");
    let node = group(&mut graph, "node");
    graph.destroy(gone);

    assert!(matches!(
        graph.set_parent(node, Some(gone)),
        Err(KuesaError::UnknownNode { .. })
    ));
    assert!(graph.create_child(gone, "child", FrameGraphNodeKind::Group).is_err());
    assert!(graph.set_enabled(gone, false).is_err());
    assert!(graph.children(gone).is_empty());
}

// ============================================================================
// Destruction
// ============================================================================

#[test]
fn destroy_removes_whole_subtree() {
    let mut graph = FrameGraph::new();
    let root = group(&mut graph, "root");
    let branch = graph.create_child(root, "branch", FrameGraphNodeKind::Group).unwrap();
    for name in ["x", "y"] {
        let child = graph.create_child(branch, name, FrameGraphNodeKind::Group).unwrap();
        graph.create_child(child, "leaf", FrameGraphNodeKind::NoDraw).unwrap();
    }

    assert_eq!(graph.destroy(branch), 5);
    assert_eq!(graph.node_count(), 1);
    assert!(graph.children(root).is_empty());
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn structure_ignores_ids() {
    let build = |graph: &mut FrameGraph| {
        let root = group(graph, "root");
        let clear = graph
            .create_child(
                root,
                "clear",
                FrameGraphNodeKind::ClearBuffers {
                    buffers: ClearBufferFlags::ALL,
                    color: Vec4::ONE,
                },
            )
            .unwrap();
        graph.create_child(clear, "nodraw", FrameGraphNodeKind::NoDraw).unwrap();
        root
    };

    let mut graph = FrameGraph::new();
    let first = build(&mut graph);
    let second = build(&mut graph);

    let structure = graph.structure(first).unwrap();
    assert_eq!(graph.structure(second), Some(structure.clone()));
    assert_eq!(structure.node_count(), 3);

    let clear = graph.children(second)[0];
    graph.set_enabled(clear, false).unwrap();
    assert_ne!(graph.structure(second), Some(structure));
}

#[test]
fn dump_indents_by_depth() {
    let mut graph = FrameGraph::new();
    let root = group(&mut graph, "root");
    let off = graph.create_child(root, "off", FrameGraphNodeKind::FrustumCulling).unwrap();
    graph.set_enabled(off, false).unwrap();
    graph.create_child(off, "leaf", FrameGraphNodeKind::NoDraw).unwrap();

    let dump = graph.dump(root);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("root"));
    assert!(lines[1].starts_with("  off") && lines[1].ends_with("(disabled)"));
    assert!(lines[2].starts_with("    leaf"));
}

// ============================================================================
// Render Targets
// ============================================================================

#[test]
fn attachment_layout_follows_flags() {
    let mut graph = FrameGraph::new();
    let size = UVec2::new(320, 200);

    let color = graph.create_render_target("color", RenderTargetDesc::new(RenderTargetFlags::empty(), size));
    let depth = graph.create_render_target(
        "depth",
        RenderTargetDesc::new(RenderTargetFlags::INCLUDE_DEPTH | RenderTargetFlags::HALF_FLOAT, size),
    );
    let stencil = graph.create_render_target(
        "stencil",
        RenderTargetDesc::new(
            RenderTargetFlags::INCLUDE_DEPTH | RenderTargetFlags::INCLUDE_STENCIL,
            size,
        ),
    );

    assert_eq!(graph.render_target(color).unwrap().attachments().len(), 1);
    assert!(graph.depth_texture(color).is_none());

    let depth_color = graph
        .find_render_target_texture(depth, AttachmentPoint::Color0)
        .unwrap();
    assert_eq!(graph.texture(depth_color).unwrap().format, TextureFormat::Rgba16Float);
    let depth_texture = graph.depth_texture(depth).unwrap();
    assert_eq!(graph.texture(depth_texture).unwrap().format, TextureFormat::Depth24);

    let stencil_texture = graph.depth_texture(stencil).unwrap();
    assert_eq!(
        graph.find_render_target_texture(stencil, AttachmentPoint::DepthStencil),
        Some(stencil_texture)
    );
    assert_eq!(graph.texture(stencil_texture).unwrap().format, TextureFormat::Depth24Stencil8);
    assert_eq!(graph.texture_count(), 5);
}

#[test]
fn depth_only_target_has_no_color() {
    let mut graph = FrameGraph::new();
    let target = graph.create_render_target(
        "shadow",
        RenderTargetDesc::new(RenderTargetFlags::DEPTH_ONLY | RenderTargetFlags::HALF_FLOAT, UVec2::splat(256)),
    );

    let attachments = graph.render_target(target).unwrap().attachments();
    assert_eq!(attachments.len(), 1);
    assert!(graph.find_render_target_texture(target, AttachmentPoint::Color0).is_none());
    let depth = graph.depth_texture(target).unwrap();
    assert_eq!(graph.texture(depth).unwrap().format, TextureFormat::Depth24);
}

#[test]
fn multisampled_target_carries_sample_count() {
    let mut graph = FrameGraph::new();
    let desc = RenderTargetDesc::new(RenderTargetFlags::INCLUDE_DEPTH, UVec2::splat(64)).with_samples(8);
    let target = graph.create_render_target("ms", desc);

    let target = graph.render_target(target).unwrap();
    assert_eq!(target.samples, 8);
    assert!(target.flags.contains(RenderTargetFlags::MULTISAMPLED));
    for &(_, texture) in target.attachments() {
        assert_eq!(graph.texture(texture).unwrap().samples, 8);
    }

    let single = RenderTargetDesc::new(RenderTargetFlags::MULTISAMPLED, UVec2::ONE).with_samples(1);
    assert!(!single.flags.contains(RenderTargetFlags::MULTISAMPLED));
}

#[test]
fn resize_keeps_texture_ids() {
    let mut graph = FrameGraph::new();
    let target = graph.create_render_target(
        "rt",
        RenderTargetDesc::new(RenderTargetFlags::INCLUDE_DEPTH, UVec2::new(100, 100)),
    );
    let color = graph.find_render_target_texture(target, AttachmentPoint::Color0).unwrap();
    let depth = graph.depth_texture(target).unwrap();

    graph.resize_render_target(target, UVec2::new(40, 30)).unwrap();

    assert_eq!(graph.render_target(target).unwrap().size, UVec2::new(40, 30));
    assert_eq!(graph.texture(color).unwrap().size, UVec2::new(40, 30));
    assert_eq!(graph.texture(depth).unwrap().size, UVec2::new(40, 30));
}

#[test]
fn destroyed_target_frees_textures() {
    let mut graph = FrameGraph::new();
    let target = graph.create_render_target(
        "rt",
        RenderTargetDesc::new(RenderTargetFlags::INCLUDE_DEPTH, UVec2::splat(16)),
    );
    let color = graph.find_render_target_texture(target, AttachmentPoint::Color0).unwrap();

    assert!(graph.destroy_render_target(target));
    assert!(!graph.destroy_render_target(target));
    assert!(graph.texture(color).is_none());
    assert_eq!(graph.texture_count(), 0);
    assert!(matches!(
        graph.resize_render_target(target, UVec2::ONE),
        Err(KuesaError::UnknownRenderTarget { .. })
    ));
}
