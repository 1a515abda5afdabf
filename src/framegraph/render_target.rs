//! Offscreen render targets and their texture attachments.
//!
//! Targets and textures are plain records in the frame-graph arena; a backend
//! turns them into GPU objects. Keeping them in the arena makes every
//! allocation countable, so a rebuild that forgets to free a target shows up
//! as a growing [`FrameGraph::render_target_count`](super::FrameGraph::render_target_count).

use bitflags::bitflags;
use glam::UVec2;
use slotmap::new_key_type;
use smallvec::SmallVec;

new_key_type! {
    pub struct RenderTargetId;
    pub struct TextureId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Depth24,
    Depth24Stencil8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentPoint {
    Color0,
    Depth,
    DepthStencil,
}

bitflags! {
    /// How a render target is laid out.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderTargetFlags: u8 {
        const MULTISAMPLED    = 1 << 0;
        const INCLUDE_DEPTH   = 1 << 1;
        const INCLUDE_STENCIL = 1 << 2;
        const HALF_FLOAT      = 1 << 3;
        /// Depth attachment only, for shadow maps.
        const DEPTH_ONLY      = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub format: TextureFormat,
    pub size: UVec2,
    pub samples: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub name: String,
    pub flags: RenderTargetFlags,
    pub size: UVec2,
    pub samples: u32,
    pub(crate) attachments: SmallVec<[(AttachmentPoint, TextureId); 2]>,
}

impl RenderTarget {
    #[must_use]
    pub fn attachments(&self) -> &[(AttachmentPoint, TextureId)] {
        &self.attachments
    }

    #[must_use]
    pub fn texture(&self, attachment: AttachmentPoint) -> Option<TextureId> {
        self.attachments
            .iter()
            .find(|(point, _)| *point == attachment)
            .map(|(_, texture)| *texture)
    }
}

/// Attachment layout requested for a new render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub flags: RenderTargetFlags,
    pub size: UVec2,
    pub samples: u32,
}

impl RenderTargetDesc {
    #[must_use]
    pub fn new(flags: RenderTargetFlags, size: UVec2) -> Self {
        let samples = if flags.contains(RenderTargetFlags::MULTISAMPLED) { 4 } else { 1 };
        Self {
            flags,
            size,
            samples,
        }
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        if self.samples > 1 {
            self.flags |= RenderTargetFlags::MULTISAMPLED;
        } else {
            self.flags -= RenderTargetFlags::MULTISAMPLED;
        }
        self
    }

    /// Textures this layout needs, color first.
    pub(crate) fn attachment_layout(&self) -> SmallVec<[(AttachmentPoint, TextureFormat); 2]> {
        let mut layout = SmallVec::new();
        if self.flags.contains(RenderTargetFlags::DEPTH_ONLY) {
            layout.push((AttachmentPoint::Depth, TextureFormat::Depth24));
            return layout;
        }
        let color = if self.flags.contains(RenderTargetFlags::HALF_FLOAT) {
            TextureFormat::Rgba16Float
        } else {
            TextureFormat::Rgba8Unorm
        };
        layout.push((AttachmentPoint::Color0, color));

        if self.flags.contains(RenderTargetFlags::INCLUDE_STENCIL) {
            layout.push((AttachmentPoint::DepthStencil, TextureFormat::Depth24Stencil8));
        } else if self.flags.contains(RenderTargetFlags::INCLUDE_DEPTH) {
            layout.push((AttachmentPoint::Depth, TextureFormat::Depth24));
        }
        layout
    }
}
