//! Effects Stages
//!
//! Chains post-processing effects over the rendered image by ping-ponging
//! between two render targets.
//!
//! ```text
//! KuesaFXStages
//!  ├─ RenderToTexture 1        RenderTargetSelector(RT1) → fx[0]   reads RT0
//!  ├─ RenderToTexture 0        RenderTargetSelector(RT0) → fx[1]   reads RT1
//!  ├─ ...
//!  └─ KuesaFXStateSet          depth always, no depth writes       (present to screen)
//!      └─ KuesaFXViewport      Viewport(rect) → fx[N-1]            reads RT((N-1) mod 2)
//! ```
//!
//! Effect `i` reads `RT(i mod 2)` and writes `RT((i + 1) mod 2)`. When the
//! chain presents to screen the last effect writes the output instead, so a
//! single effect needs only RT0.
//!
//! Without presenting, every effect writes a target and
//! [`EffectsStages::final_render_target`] names the one holding the result,
//! so a later stage can read it.
//!
//! The stage never owns effect subtrees; it only parents them.

use glam::UVec2;
use smallvec::smallvec;

use crate::core::{NormalizedRect, ObjectId};
use crate::errors::Result;
use crate::framegraph::node::{DepthFunction, FrameGraphNodeKind, RenderState};
use crate::framegraph::render_target::{AttachmentPoint, RenderTargetId, TextureId};
use crate::framegraph::{FrameGraph, FrameGraphNodeId};
use crate::fx::{Effect, EffectContext, WeakEffect};
use crate::scene::Layer;

/// A registered effect and the subtree it built for this view.
#[derive(Debug, Clone)]
pub struct EffectBinding {
    pub effect: WeakEffect,
    pub subtree: FrameGraphNodeId,
}

#[derive(Debug)]
pub struct EffectsStages {
    root: FrameGraphNodeId,
    state_set: FrameGraphNodeId,
    viewport: FrameGraphNodeId,
    rt_selectors: Vec<FrameGraphNodeId>,
    effects: Vec<EffectBinding>,
    render_targets: [Option<RenderTargetId>; 2],
    depth_texture: Option<TextureId>,
    camera: Option<ObjectId>,
    viewport_rect: NormalizedRect,
    window_size: UVec2,
    present_to_screen: bool,
    final_rt_index: usize,
}

impl EffectsStages {
    pub fn new(graph: &mut FrameGraph) -> Result<Self> {
        Self::named(graph, "KuesaFXStages")
    }

    /// Same as [`EffectsStages::new`] with a custom root name.
    pub fn named(graph: &mut FrameGraph, name: &'static str) -> Result<Self> {
        let root = graph.create_node(name, FrameGraphNodeKind::Group);
        let state_set = graph.create_node(
            "KuesaFXStateSet",
            FrameGraphNodeKind::RenderStateSet {
                states: smallvec![RenderState::NoDepthMask, RenderState::DepthTest(DepthFunction::Always)],
            },
        );
        let viewport = graph.create_child(
            state_set,
            "KuesaFXViewport",
            FrameGraphNodeKind::Viewport {
                rect: NormalizedRect::FULL,
            },
        )?;

        Ok(Self {
            root,
            state_set,
            viewport,
            rt_selectors: Vec::new(),
            effects: Vec::new(),
            render_targets: [None, None],
            depth_texture: None,
            camera: None,
            viewport_rect: NormalizedRect::FULL,
            window_size: UVec2::ZERO,
            present_to_screen: true,
            final_rt_index: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.root
    }

    #[must_use]
    pub fn effects(&self) -> &[EffectBinding] {
        &self.effects
    }

    /// Subtree recorded for `effect`.
    #[must_use]
    pub fn effect_subtree(&self, effect: &Effect) -> Option<FrameGraphNodeId> {
        self.effects
            .iter()
            .find(|binding| binding.effect.id() == effect.id())
            .map(|binding| binding.subtree)
    }

    /// Layers of every live effect, in registration order.
    #[must_use]
    pub fn layers(&self) -> Vec<Layer> {
        self.effects
            .iter()
            .filter_map(|binding| binding.effect.upgrade())
            .flat_map(|effect| Effect::from(effect).layers())
            .collect()
    }

    /// Replaces the chain. Subtrees that drop out are detached, not destroyed.
    pub fn set_effects(&mut self, graph: &mut FrameGraph, effects: Vec<EffectBinding>) -> Result<()> {
        for old in &self.effects {
            graph.detach(old.subtree);
        }
        self.effects = effects;
        self.reconfigure(graph)
    }

    /// Drops one effect from the chain and detaches its subtree.
    pub fn remove_effect(&mut self, graph: &mut FrameGraph, effect: ObjectId) -> Result<()> {
        let Some(pos) = self.effects.iter().position(|b| b.effect.id() == effect) else {
            return Ok(());
        };
        let binding = self.effects.remove(pos);
        graph.detach(binding.subtree);
        self.reconfigure(graph)
    }

    #[must_use]
    pub fn render_targets(&self) -> [Option<RenderTargetId>; 2] {
        self.render_targets
    }

    pub fn set_render_targets(
        &mut self,
        graph: &mut FrameGraph,
        rt0: Option<RenderTargetId>,
        rt1: Option<RenderTargetId>,
    ) -> Result<()> {
        if self.render_targets == [rt0, rt1] {
            return Ok(());
        }
        self.render_targets = [rt0, rt1];
        self.reconfigure(graph)
    }

    pub fn set_depth_texture(&mut self, graph: &mut FrameGraph, texture: Option<TextureId>) -> Result<()> {
        if self.depth_texture == texture {
            return Ok(());
        }
        self.depth_texture = texture;
        self.reconfigure(graph)
    }

    #[must_use]
    pub fn camera(&self) -> Option<ObjectId> {
        self.camera
    }

    pub fn set_camera(&mut self, graph: &mut FrameGraph, camera: Option<ObjectId>) -> Result<()> {
        if self.camera == camera {
            return Ok(());
        }
        self.camera = camera;
        self.reconfigure(graph)
    }

    #[must_use]
    pub fn viewport_rect(&self) -> NormalizedRect {
        self.viewport_rect
    }

    /// Updates the presenting viewport and forwards the rect to every effect.
    pub fn set_viewport_rect(&mut self, graph: &mut FrameGraph, rect: NormalizedRect) -> Result<()> {
        self.viewport_rect = rect;
        *graph.kind_mut(self.viewport)? = FrameGraphNodeKind::Viewport { rect };
        for binding in &self.effects {
            let Some(effect) = binding.effect.upgrade() else { continue };
            if !graph.contains(binding.subtree) {
                continue;
            }
            let mut ctx = EffectContext {
                graph: &mut *graph,
                subtree: binding.subtree,
            };
            effect.borrow_mut().set_viewport_rect(&mut ctx, rect);
        }
        Ok(())
    }

    #[must_use]
    pub fn window_size(&self) -> UVec2 {
        self.window_size
    }

    pub fn set_window_size(&mut self, graph: &mut FrameGraph, size: UVec2) -> Result<()> {
        if self.window_size == size {
            return Ok(());
        }
        self.window_size = size;
        self.reconfigure(graph)
    }

    #[must_use]
    pub fn present_to_screen(&self) -> bool {
        self.present_to_screen
    }

    pub fn set_present_to_screen(&mut self, graph: &mut FrameGraph, present: bool) -> Result<()> {
        if self.present_to_screen == present {
            return Ok(());
        }
        self.present_to_screen = present;
        self.reconfigure(graph)
    }

    /// Color texture of the target the last effect wrote.
    #[must_use]
    pub fn final_color_texture(&self, graph: &FrameGraph) -> Option<TextureId> {
        let target = self.render_targets[self.final_rt_index]?;
        graph.find_render_target_texture(target, AttachmentPoint::Color0)
    }

    /// Target holding the chain's output when it does not present to
    /// screen. With no effects that is the input target, RT0.
    #[must_use]
    pub fn final_render_target(&self) -> Option<RenderTargetId> {
        if self.present_to_screen {
            return None;
        }
        self.render_targets[self.final_rt_index]
    }

    /// Rebuilds the chain from the current effects and targets.
    pub fn reconfigure(&mut self, graph: &mut FrameGraph) -> Result<()> {
        graph.detach(self.state_set);
        for binding in &self.effects {
            graph.detach(binding.subtree);
        }
        for &selector in &self.rt_selectors {
            graph.detach(selector);
        }
        self.final_rt_index = 0;

        let chain: Vec<(Effect, FrameGraphNodeId)> = self
            .effects
            .iter()
            .filter(|binding| graph.contains(binding.subtree))
            .filter_map(|binding| binding.effect.upgrade().map(|e| (Effect::from(e), binding.subtree)))
            .collect();

        if self.render_targets[0].is_none() || chain.is_empty() {
            return Ok(());
        }
        if !self.present_to_screen && self.render_targets[1].is_none() {
            return Ok(());
        }

        let selector_count = chain.len() - usize::from(self.present_to_screen);
        while self.rt_selectors.len() > selector_count {
            if let Some(selector) = self.rt_selectors.pop() {
                graph.destroy(selector);
            }
        }
        while self.rt_selectors.len() < selector_count {
            let selector = graph.create_node(
                "RenderToTexture",
                FrameGraphNodeKind::RenderTargetSelector { target: None },
            );
            self.rt_selectors.push(selector);
        }

        let last = chain.len() - 1;
        let mut previous = 0;
        for (i, (effect, subtree)) in chain.iter().enumerate() {
            let current = 1 - previous;
            let previous_target = self.render_targets[previous];
            let current_target = self.render_targets[current];
            let input = previous_target
                .and_then(|rt| graph.find_render_target_texture(rt, AttachmentPoint::Color0));

            {
                let mut ctx = EffectContext {
                    graph: &mut *graph,
                    subtree: *subtree,
                };
                let mut fx = effect.borrow_mut();
                fx.set_input_texture(&mut ctx, input);
                fx.set_depth_texture(&mut ctx, self.depth_texture);
                fx.set_camera(&mut ctx, self.camera);
                fx.set_window_size(&mut ctx, self.window_size);
                fx.set_viewport_rect(&mut ctx, self.viewport_rect);
            }

            let parent = if i < last || !self.present_to_screen {
                let selector = self.rt_selectors[i];
                if let Some(node) = graph.node_mut(selector) {
                    node.name = format!("RenderToTexture {current}").into();
                    node.kind = FrameGraphNodeKind::RenderTargetSelector {
                        target: current_target,
                    };
                }
                graph.set_parent(selector, Some(self.root))?;
                selector
            } else {
                self.viewport
            };

            graph.set_parent(*subtree, Some(parent))?;
            previous = current;
        }

        self.final_rt_index = previous;

        if self.present_to_screen {
            graph.set_parent(self.state_set, Some(self.root))?;
        }
        Ok(())
    }

    /// Detaches effect subtrees and destroys the stage's own nodes.
    pub fn release(&mut self, graph: &mut FrameGraph) {
        for binding in self.effects.drain(..) {
            graph.detach(binding.subtree);
        }
        for selector in self.rt_selectors.drain(..) {
            graph.destroy(selector);
        }
        graph.destroy(self.state_set);
        graph.destroy(self.root);
    }
}
