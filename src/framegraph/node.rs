//! Frame-graph node kinds.
//!
//! These are the atomic configuration primitives a renderer backend
//! understands. The stage builders only compose them; they never interpret
//! them.

use std::borrow::Cow;

use bitflags::bitflags;
use glam::{UVec2, UVec3, Vec4};
use smallvec::SmallVec;

use super::render_target::{AttachmentPoint, RenderTargetId, TextureId};
use crate::core::{NormalizedRect, ObjectId};

// ============================================================================
// Filter keys and parameters
// ============================================================================

/// Value carried by a filter key or a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec4(Vec4),
    String(Cow<'static, str>),
    Texture(Option<TextureId>),
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vec4> for ParameterValue {
    fn from(value: Vec4) -> Self {
        Self::Vec4(value)
    }
}

impl From<&'static str> for ParameterValue {
    fn from(value: &'static str) -> Self {
        Self::String(Cow::Borrowed(value))
    }
}

impl From<Option<TextureId>> for ParameterValue {
    fn from(value: Option<TextureId>) -> Self {
        Self::Texture(value)
    }
}

/// A `name = value` pair that techniques or render passes must match.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterKey {
    pub name: Cow<'static, str>,
    pub value: ParameterValue,
}

impl FilterKey {
    #[must_use]
    pub fn new(name: &'static str, value: impl Into<ParameterValue>) -> Self {
        Self {
            name: Cow::Borrowed(name),
            value: value.into(),
        }
    }
}

/// Named shader parameter injected by a filter node into everything below it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Cow<'static, str>,
    pub value: ParameterValue,
}

impl Parameter {
    #[must_use]
    pub fn new(name: &'static str, value: impl Into<ParameterValue>) -> Self {
        Self {
            name: Cow::Borrowed(name),
            value: value.into(),
        }
    }
}

/// Filter keys and parameters shared by technique and render-pass filters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub matches: SmallVec<[FilterKey; 2]>,
    pub parameters: SmallVec<[Parameter; 2]>,
}

impl Filter {
    #[must_use]
    pub fn matching(keys: impl IntoIterator<Item = FilterKey>) -> Self {
        Self {
            matches: keys.into_iter().collect(),
            parameters: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Inserts or overwrites the parameter called `name`.
    pub fn set_parameter(&mut self, name: &'static str, value: impl Into<ParameterValue>) {
        let value = value.into();
        if let Some(existing) = self.parameters.iter_mut().find(|p| p.name == name) {
            existing.value = value;
        } else {
            self.parameters.push(Parameter::new(name, value));
        }
    }
}

// ============================================================================
// Render states
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFunction {
    Never,
    Always,
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    One,
    SourceAlpha,
    OneMinusSourceAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    DepthTest(DepthFunction),
    NoDepthMask,
    ColorMask { red: bool, green: bool, blue: bool, alpha: bool },
    BlendEquationAdd,
    BlendArguments {
        source_rgb: BlendFactor,
        source_alpha: BlendFactor,
        destination_rgb: BlendFactor,
        destination_alpha: BlendFactor,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortType {
    StateChangeCost,
    BackToFront,
    FrontToBack,
    Material,
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerFilterMode {
    #[default]
    AcceptAnyMatchingLayers,
    AcceptAllMatchingLayers,
    DiscardAnyMatchingLayers,
    DiscardAllMatchingLayers,
}

bitflags! {
    /// Buffers cleared by a [`FrameGraphNodeKind::ClearBuffers`] node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearBufferFlags: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;

        const COLOR_DEPTH = Self::COLOR.bits() | Self::DEPTH.bits();
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

bitflags! {
    /// Operations a [`FrameGraphNodeKind::MemoryBarrier`] waits on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierFlags: u8 {
        const VERTEX_ATTRIBUTE_ARRAY = 1 << 0;
        const SHADER_STORAGE         = 1 << 1;
    }
}

// ============================================================================
// Node kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FrameGraphNodeKind {
    /// Plain grouping node.
    Group,
    Viewport {
        rect: NormalizedRect,
    },
    CameraSelector {
        camera: Option<ObjectId>,
        /// Plane equation the camera is mirrored across, for reflection passes.
        mirror_plane: Option<Vec4>,
    },
    LayerFilter {
        layers: SmallVec<[ObjectId; 4]>,
        mode: LayerFilterMode,
    },
    TechniqueFilter(Filter),
    RenderPassFilter(Filter),
    FrustumCulling,
    ClearBuffers {
        buffers: ClearBufferFlags,
        color: Vec4,
    },
    NoDraw,
    SortPolicy {
        sort_types: SmallVec<[SortType; 3]>,
    },
    RenderStateSet {
        states: SmallVec<[RenderState; 4]>,
    },
    RenderTargetSelector {
        target: Option<RenderTargetId>,
    },
    BlitFramebuffer {
        source: Option<RenderTargetId>,
        destination: Option<RenderTargetId>,
        attachment: AttachmentPoint,
        size: UVec2,
    },
    DispatchCompute {
        work_groups: UVec3,
    },
    MemoryBarrier {
        wait_operations: BarrierFlags,
    },
}

impl FrameGraphNodeKind {
    /// Short label used by dumps and structural snapshots.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Group => "Group",
            Self::Viewport { .. } => "Viewport",
            Self::CameraSelector { .. } => "CameraSelector",
            Self::LayerFilter { .. } => "LayerFilter",
            Self::TechniqueFilter(_) => "TechniqueFilter",
            Self::RenderPassFilter(_) => "RenderPassFilter",
            Self::FrustumCulling => "FrustumCulling",
            Self::ClearBuffers { .. } => "ClearBuffers",
            Self::NoDraw => "NoDraw",
            Self::SortPolicy { .. } => "SortPolicy",
            Self::RenderStateSet { .. } => "RenderStateSet",
            Self::RenderTargetSelector { .. } => "RenderTargetSelector",
            Self::BlitFramebuffer { .. } => "BlitFramebuffer",
            Self::DispatchCompute { .. } => "DispatchCompute",
            Self::MemoryBarrier { .. } => "MemoryBarrier",
        }
    }

    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        match self {
            Self::TechniqueFilter(filter) | Self::RenderPassFilter(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn filter_mut(&mut self) -> Option<&mut Filter> {
        match self {
            Self::TechniqueFilter(filter) | Self::RenderPassFilter(filter) => Some(filter),
            _ => None,
        }
    }
}

/// One node of the frame graph.
///
/// A disabled node is pass-through: its own configuration is ignored while
/// its children are still traversed.
#[derive(Debug, Clone)]
pub struct FrameGraphNode {
    pub name: Cow<'static, str>,
    pub kind: FrameGraphNodeKind,
    pub enabled: bool,
    pub(crate) parent: Option<super::FrameGraphNodeId>,
    pub(crate) children: SmallVec<[super::FrameGraphNodeId; 4]>,
}

impl FrameGraphNode {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, kind: FrameGraphNodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            parent: None,
            children: SmallVec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<super::FrameGraphNodeId> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[super::FrameGraphNodeId] {
        &self.children
    }
}
