//! Post-Processing Effects
//!
//! An effect contributes a frame-graph subtree that reads the image rendered
//! so far and writes a transformed one. Views chain effects through the
//! render-target ping-pong described in
//! [`EffectsStages`](crate::framegraph::stages::EffectsStages).
//!
//! # Reentrancy
//!
//! One effect may be registered with several views at once. Each view asks
//! for its own subtree through
//! [`frame_graph_sub_tree`](PostProcessingEffect::frame_graph_sub_tree), built
//! inside that view's [`FrameGraph`]. Every later call carries an
//! [`EffectContext`] naming the graph and the subtree it applies to, so an
//! implementation must keep per-view state in the graph, not in `self`.
//!
//! # Property changes
//!
//! Wrap a concrete effect in a [`Handle`] to keep typed access after
//! registration, and change it through [`Handle::modify`]. Every view the
//! effect is registered with then calls
//! [`update_parameters`](PostProcessingEffect::update_parameters) on its own
//! subtree during its next event turn.
//!
//! ```rust,ignore
//! let tone_mapping = Handle::new(ToneMappingAndGammaCorrectionEffect::new());
//! view.add_post_processing_effect(&Effect::from_handle(&tone_mapping));
//! tone_mapping.modify(|fx| fx.set_exposure(2.0));
//! view.process_events();
//! ```

pub mod tone_mapping;

use std::ops::Deref;
use std::rc::Rc;

use glam::UVec2;

use crate::core::{Handle, NormalizedRect, ObjectId, Shared, WeakHandle};
use crate::framegraph::render_target::TextureId;
use crate::framegraph::{FrameGraph, FrameGraphNodeId};
use crate::scene::Layer;

pub use tone_mapping::{ToneMapping, ToneMappingAndGammaCorrectionEffect};

/// The subtree an effect call applies to.
pub struct EffectContext<'a> {
    pub graph: &'a mut FrameGraph,
    pub subtree: FrameGraphNodeId,
}

/// Capability of a post-processing effect.
pub trait PostProcessingEffect {
    /// Debug name.
    fn name(&self) -> &str {
        "PostProcessingEffect"
    }

    /// Builds a fresh detached subtree in `graph`. `None` means the effect has
    /// nothing to render; it stays registered but is not materialized.
    fn frame_graph_sub_tree(&mut self, graph: &mut FrameGraph) -> Option<FrameGraphNodeId>;

    /// Layers of the effect's own content, kept out of the scene pass.
    fn layers(&self) -> Vec<Layer> {
        Vec::new()
    }

    /// Color texture holding the image this effect reads.
    fn set_input_texture(&mut self, ctx: &mut EffectContext<'_>, texture: Option<TextureId>);

    fn set_depth_texture(&mut self, _ctx: &mut EffectContext<'_>, _texture: Option<TextureId>) {}

    fn set_window_size(&mut self, _ctx: &mut EffectContext<'_>, _size: UVec2) {}

    fn set_camera(&mut self, _ctx: &mut EffectContext<'_>, _camera: Option<ObjectId>) {}

    fn set_viewport_rect(&mut self, _ctx: &mut EffectContext<'_>, _rect: NormalizedRect) {}

    /// Rewrites the effect's own properties into `ctx.subtree` after they changed.
    fn update_parameters(&mut self, _ctx: &mut EffectContext<'_>) {}
}

/// Shared handle to a post-processing effect. Compares by identity.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Effect(Handle<dyn PostProcessingEffect>);

pub type WeakEffect = WeakHandle<dyn PostProcessingEffect>;

impl Effect {
    #[must_use]
    pub fn new<E: PostProcessingEffect + 'static>(effect: E) -> Self {
        let shared: Rc<Shared<dyn PostProcessingEffect>> = Rc::new(Shared::new(effect));
        Self(Handle::from_shared(shared))
    }

    /// Shares an already wrapped effect. The result has the same id and
    /// lifecycle as `handle`, which keeps typed access to the effect.
    #[must_use]
    pub fn from_handle<E: PostProcessingEffect + 'static>(handle: &Handle<E>) -> Self {
        let shared: Rc<Shared<dyn PostProcessingEffect>> = handle.shared();
        Self(Handle::from_shared(shared))
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.0.borrow().name().to_string()
    }

    #[must_use]
    pub fn layers(&self) -> Vec<Layer> {
        self.0.borrow().layers()
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> &Handle<dyn PostProcessingEffect> {
        &self.0
    }
}

impl From<Handle<dyn PostProcessingEffect>> for Effect {
    fn from(handle: Handle<dyn PostProcessingEffect>) -> Self {
        Self(handle)
    }
}

impl Deref for Effect {
    type Target = Handle<dyn PostProcessingEffect>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
