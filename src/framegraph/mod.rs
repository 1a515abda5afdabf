//! Frame Graph
//!
//! An arena-backed tree of render configuration nodes. A renderer backend
//! walks it depth-first once per frame; every root-to-leaf path produces one
//! batch of draw commands configured by the nodes along that path.
//!
//! # Layout
//!
//! - [`FrameGraph`]: node arena plus the render targets and textures the
//!   nodes refer to
//! - [`node`]: the node kinds
//! - [`render_target`]: offscreen targets and their attachments
//! - [`stages`]: reusable subtrees composed by a view

pub mod graph;
pub mod node;
pub mod render_target;
pub mod stages;

pub use graph::{FrameGraph, FrameGraphNodeId, NodeStructure};
pub use node::{
    BarrierFlags, BlendFactor, ClearBufferFlags, DepthFunction, Filter, FilterKey, FrameGraphNode,
    FrameGraphNodeKind, LayerFilterMode, Parameter, ParameterValue, RenderState, SortType,
};
pub use render_target::{
    AttachmentPoint, RenderTarget, RenderTargetDesc, RenderTargetFlags, RenderTargetId, Texture, TextureFormat,
    TextureId,
};
