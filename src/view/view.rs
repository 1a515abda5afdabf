//! View
//!
//! A view renders the scene through one camera into one viewport of the
//! output surface, optionally through shadow map and reflection passes and a
//! chain of post-processing effects. It owns a [`FrameGraph`] and keeps the
//! subtree under [`View::root`] a pure function of its configuration.
//!
//! # Topology
//!
//! Without effects the stages hang directly under the view root:
//!
//! ```text
//! KuesaView
//!  ├─ KuesaShadowMapStages       one depth pass per shadow map
//!  ├─ KuesaReflectionStages      one per plane, registration order
//!  └─ KuesaSceneViewport         scene stages
//! ```
//!
//! With effects, or with the internal tone mapping stage enabled through
//! [`RenderingFeatures::tone_mapping`], the scene renders to texture and the
//! effect chains read it:
//!
//! ```text
//! KuesaView
//!  ├─ KuesaMainScene             RenderTargetSelector(RT0, or the MSAA target)
//!  │   ├─ KuesaMainSceneClear    ClearBuffers(color + depth [+ stencil]) → NoDraw
//!  │   └─ KuesaMainSceneFilter   LayerFilter(discard effect layers)
//!  │       ├─ KuesaShadowMapStages
//!  │       ├─ KuesaReflectionStages ...
//!  │       └─ KuesaSceneViewport
//!  ├─ KuesaMSAAResolve           BlitFramebuffer(MSAA → RT0) → NoDraw   (MSAA only)
//!  ├─ KuesaFXStages              effects ping-pong, see EffectsStages
//!  └─ KuesaInternalFXStages      tone mapping and gamma correction      (tone mapping only)
//! ```
//!
//! With the internal stage the user chain no longer presents: it ends in a
//! render target and the tone mapping effect reads that target to screen.
//!
//! # Reconfiguration
//!
//! | Change | Work |
//! |--------|------|
//! | camera, viewport, features, layers, planes, shadow maps | [`reconfigure_stages`](View::reconfigure_stages), synchronous |
//! | effects, stencil mask, rendering features | rebuild scheduled on the event queue |
//! | surface size, reflection texture size | targets resized in place |
//! | exposure, gamma, tone mapping algorithm | internal tone mapping parameters rewritten |
//! | properties of a registered effect | effect parameters rewritten on the next event turn |
//!
//! Scheduled rebuilds coalesce: however many changes happen before the next
//! [`process_events`](View::process_events) turn, the render targets are
//! reallocated once.

use std::iter;

use glam::{UVec2, Vec4};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::core::{Handle, Link, NormalizedRect, ObjectEvent, ObjectId, WatchCallback};
use crate::errors::{KuesaError, Result};
use crate::framegraph::node::{ClearBufferFlags, FrameGraphNodeKind, LayerFilterMode};
use crate::framegraph::render_target::{
    AttachmentPoint, RenderTargetDesc, RenderTargetFlags, RenderTargetId, TextureId,
};
use crate::framegraph::stages::{
    EffectBinding, EffectsStages, ReflectionStages, SceneFeatures, SceneStages, ShadowMapStages,
};
use crate::framegraph::{FrameGraph, FrameGraphNodeId, NodeStructure};
use crate::fx::{
    Effect, EffectContext, PostProcessingEffect, ToneMapping, ToneMappingAndGammaCorrectionEffect, WeakEffect,
};
use crate::scene::{Camera, CameraData, Layer, LayerData, PlaneVisibility, ReflectionPlane, ShadowMap};

use super::events::{Notifier, ViewChange, ViewEvent};
use super::settings::{RenderingFeatures, ViewSettings};

// ============================================================================
// Main scene branch
// ============================================================================

/// Render-to-texture wrapper of the scene when effects are present.
#[derive(Debug)]
struct MainSceneBranch {
    selector: FrameGraphNodeId,
    clear: FrameGraphNodeId,
    filter: FrameGraphNodeId,
    resolve: Option<FrameGraphNodeId>,
}

impl MainSceneBranch {
    fn build(
        graph: &mut FrameGraph,
        parent: FrameGraphNodeId,
        scene_target: RenderTargetId,
        buffers: ClearBufferFlags,
        clear_color: Vec4,
        effect_layers: SmallVec<[ObjectId; 4]>,
        resolve: Option<(RenderTargetId, RenderTargetId, UVec2)>,
    ) -> Result<Self> {
        let selector = graph.create_child(
            parent,
            "KuesaMainScene",
            FrameGraphNodeKind::RenderTargetSelector {
                target: Some(scene_target),
            },
        )?;
        let clear = graph.create_child(
            selector,
            "KuesaMainSceneClear",
            FrameGraphNodeKind::ClearBuffers {
                buffers,
                color: clear_color,
            },
        )?;
        graph.create_child(clear, "KuesaMainSceneNoDraw", FrameGraphNodeKind::NoDraw)?;

        let filter_enabled = !effect_layers.is_empty();
        let filter = graph.create_child(
            selector,
            "KuesaMainSceneFilter",
            FrameGraphNodeKind::LayerFilter {
                layers: effect_layers,
                mode: LayerFilterMode::DiscardAnyMatchingLayers,
            },
        )?;
        graph.set_enabled(filter, filter_enabled)?;

        let resolve = match resolve {
            Some((source, destination, size)) => {
                let blit = graph.create_child(
                    parent,
                    "KuesaMSAAResolve",
                    FrameGraphNodeKind::BlitFramebuffer {
                        source: Some(source),
                        destination: Some(destination),
                        attachment: AttachmentPoint::Color0,
                        size,
                    },
                )?;
                graph.create_child(blit, "KuesaMSAAResolveNoDraw", FrameGraphNodeKind::NoDraw)?;
                Some(blit)
            }
            None => None,
        };

        Ok(Self {
            selector,
            clear,
            filter,
            resolve,
        })
    }

    /// Destroys the branch. Stage roots must be detached first.
    fn release(self, graph: &mut FrameGraph) {
        graph.destroy(self.selector);
        if let Some(resolve) = self.resolve {
            graph.destroy(resolve);
        }
    }
}

// ============================================================================
// View
// ============================================================================

/// One rendered view of the scene.
///
/// Mutators compare against the current value first: setting a value the
/// view already has neither notifies nor reconfigures.
///
/// Layers and cameras handed to the view without a parent are adopted: the
/// view becomes their parent and destroys them when it is dropped. Parented
/// ones are only observed. Effects are always observed, never owned.
#[derive(Debug)]
pub struct View {
    id: ObjectId,
    graph: FrameGraph,
    root: FrameGraphNodeId,

    scene_stages: SceneStages,
    shadow_map_stages: ShadowMapStages,
    reflection_stages: Vec<ReflectionStages>,
    fx_stages: EffectsStages,
    tone_mapping_stages: EffectsStages,
    tone_mapping: Handle<ToneMappingAndGammaCorrectionEffect>,
    tone_mapping_subtree: FrameGraphNodeId,
    main_scene: Option<MainSceneBranch>,
    render_targets: [Option<RenderTargetId>; 2],
    multisample_target: Option<RenderTargetId>,

    camera: Option<Link<CameraData>>,
    viewport_rect: NormalizedRect,
    features: SceneFeatures,
    layers: Vec<Link<LayerData>>,
    effects: Vec<WeakEffect>,
    effect_fg_subtrees: FxHashMap<ObjectId, FrameGraphNodeId>,
    reflection_planes: Vec<ReflectionPlane>,
    reflection_texture_size: UVec2,
    surface_size: UVec2,
    clear_color: Vec4,
    uses_stencil_mask: bool,
    rendering_features: RenderingFeatures,
    last_reflection_texture: Option<TextureId>,

    fg_tree_rebuild_scheduled: bool,
    events_tx: flume::Sender<ViewEvent>,
    events_rx: flume::Receiver<ViewEvent>,
    notifier: Notifier,
}

impl View {
    pub fn new() -> Result<Self> {
        let defaults = ViewSettings::default();
        let mut graph = FrameGraph::new();
        let root = graph.create_node("KuesaView", FrameGraphNodeKind::Group);
        let scene_stages = SceneStages::new(&mut graph, false)?;
        let shadow_map_stages = ShadowMapStages::new(&mut graph)?;
        let fx_stages = EffectsStages::new(&mut graph)?;

        let tone_mapping = Handle::new(ToneMappingAndGammaCorrectionEffect::new());
        let tone_mapping_subtree = tone_mapping
            .borrow_mut()
            .frame_graph_sub_tree(&mut graph)
            .ok_or(KuesaError::UnknownNode {
                context: "tone mapping subtree",
            })?;
        let mut tone_mapping_stages = EffectsStages::named(&mut graph, "KuesaInternalFXStages")?;
        tone_mapping_stages.set_effects(
            &mut graph,
            vec![EffectBinding {
                effect: Effect::from_handle(&tone_mapping).downgrade(),
                subtree: tone_mapping_subtree,
            }],
        )?;

        let (events_tx, events_rx) = flume::unbounded();

        let mut view = Self {
            id: ObjectId::next(),
            graph,
            root,
            scene_stages,
            shadow_map_stages,
            reflection_stages: Vec::new(),
            fx_stages,
            tone_mapping_stages,
            tone_mapping,
            tone_mapping_subtree,
            main_scene: None,
            render_targets: [None, None],
            multisample_target: None,
            camera: None,
            viewport_rect: defaults.viewport_rect,
            features: SceneFeatures::default(),
            layers: Vec::new(),
            effects: Vec::new(),
            effect_fg_subtrees: FxHashMap::default(),
            reflection_planes: Vec::new(),
            reflection_texture_size: defaults.reflection_texture_size,
            surface_size: defaults.surface_size,
            clear_color: defaults.clear_color,
            uses_stencil_mask: defaults.uses_stencil_mask,
            rendering_features: defaults.rendering_features,
            last_reflection_texture: None,
            fg_tree_rebuild_scheduled: false,
            events_tx,
            events_rx,
            notifier: Notifier::default(),
        };
        view.try_reconfigure_stages()?;
        log::debug!("View {} created", view.id);
        Ok(view)
    }

    /// Creates a view and applies `settings` to it.
    pub fn with_settings(settings: &ViewSettings) -> Result<Self> {
        let mut view = Self::new()?;
        settings.apply(&mut view)?;
        Ok(view)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn frame_graph(&self) -> &FrameGraph {
        &self.graph
    }

    /// Root of the view's subtree, the node a frame-graph consumer attaches.
    #[inline]
    #[must_use]
    pub fn root(&self) -> FrameGraphNodeId {
        self.root
    }

    #[must_use]
    pub fn structure(&self) -> Option<NodeStructure> {
        self.graph.structure(self.root)
    }

    /// Text rendering of the view's subtree, also logged at debug level.
    pub fn dump(&self) -> String {
        let dump = self.graph.dump(self.root);
        log::debug!("View {} frame graph:\n{dump}", self.id);
        dump
    }

    #[must_use]
    pub fn scene_stages(&self) -> &SceneStages {
        &self.scene_stages
    }

    #[must_use]
    pub fn reflection_stages(&self) -> &[ReflectionStages] {
        &self.reflection_stages
    }

    #[must_use]
    pub fn shadow_map_stages(&self) -> &ShadowMapStages {
        &self.shadow_map_stages
    }

    #[must_use]
    pub fn effects_stages(&self) -> &EffectsStages {
        &self.fx_stages
    }

    /// The internal tone mapping chain, attached while
    /// [`RenderingFeatures::tone_mapping`] is on.
    #[must_use]
    pub fn tone_mapping_stages(&self) -> &EffectsStages {
        &self.tone_mapping_stages
    }

    /// Render-to-texture node of the scene, present while effects are materialized.
    #[must_use]
    pub fn render_to_texture_root(&self) -> Option<FrameGraphNodeId> {
        self.main_scene.as_ref().map(|branch| branch.selector)
    }

    /// The ping-pong targets allocated for the effects chain.
    #[must_use]
    pub fn intermediate_render_targets(&self) -> [Option<RenderTargetId>; 2] {
        self.render_targets
    }

    #[must_use]
    pub fn multisample_render_target(&self) -> Option<RenderTargetId> {
        self.multisample_target
    }

    /// Receives a [`ViewChange`] for every actual property change.
    pub fn subscribe(&mut self) -> flume::Receiver<ViewChange> {
        self.notifier.subscribe()
    }

    // ========================================================================
    // Camera and viewport
    // ========================================================================

    #[must_use]
    pub fn camera(&self) -> Option<Camera> {
        self.camera.as_ref()?.upgrade().map(Camera::from)
    }

    /// Sets the camera. An orphan camera is adopted by the view.
    pub fn set_camera(&mut self, camera: Option<&Camera>) {
        if let Some(camera) = camera
            && !camera.is_alive()
        {
            log::warn!("{}", KuesaError::invalid_argument("set_camera", "camera was destroyed"));
            return;
        }
        let current = self.camera.as_ref().filter(|link| link.is_alive()).map(Link::id);
        if current == camera.map(|c| c.id()) {
            return;
        }

        if let Some(previous) = self.camera.take() {
            self.unlink(previous);
        }
        if let Some(camera) = camera {
            camera.watch(self.id, self.watch_callback());
            self.camera = Some(Link::adopt_or_borrow(camera.handle(), self.id));
        }

        self.notifier.emit(ViewChange::CameraChanged);
        self.reconfigure_stages();
    }

    #[inline]
    #[must_use]
    pub fn viewport_rect(&self) -> NormalizedRect {
        self.viewport_rect
    }

    pub fn set_viewport_rect(&mut self, rect: NormalizedRect) {
        if self.viewport_rect == rect {
            return;
        }
        self.viewport_rect = rect;
        self.notifier.emit(ViewChange::ViewportRectChanged);
        if let Err(err) = self.update_texture_sizes() {
            log::error!("View {}: failed to resize render targets: {err}", self.id);
        }
        self.reconfigure_stages();
    }

    #[inline]
    #[must_use]
    pub fn surface_size(&self) -> UVec2 {
        self.surface_size
    }

    /// Output size in pixels. Resizes the intermediate targets in place.
    pub fn set_surface_size(&mut self, size: UVec2) {
        if self.surface_size == size {
            return;
        }
        self.surface_size = size;
        self.notifier.emit(ViewChange::SurfaceSizeChanged);
        if let Err(err) = self.update_texture_sizes() {
            log::error!("View {}: failed to resize render targets: {err}", self.id);
        }
    }

    #[inline]
    #[must_use]
    pub fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        if self.clear_color == color {
            return;
        }
        self.clear_color = color;
        if let Some(branch) = &self.main_scene
            && let Ok(FrameGraphNodeKind::ClearBuffers { color, .. }) = self.graph.kind_mut(branch.clear)
        {
            *color = self.clear_color;
        }
        self.notifier.emit(ViewChange::ClearColorChanged);
    }

    // ========================================================================
    // Feature flags
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn features(&self) -> SceneFeatures {
        self.features
    }

    #[must_use]
    pub fn frustum_culling(&self) -> bool {
        self.features.contains(SceneFeatures::FRUSTUM_CULLING)
    }

    pub fn set_frustum_culling(&mut self, enabled: bool) {
        self.set_feature(SceneFeatures::FRUSTUM_CULLING, enabled, ViewChange::FrustumCullingChanged);
    }

    #[must_use]
    pub fn skinning(&self) -> bool {
        self.features.contains(SceneFeatures::SKINNING)
    }

    pub fn set_skinning(&mut self, enabled: bool) {
        self.set_feature(SceneFeatures::SKINNING, enabled, ViewChange::SkinningChanged);
    }

    #[must_use]
    pub fn back_to_front_sorting(&self) -> bool {
        self.features.contains(SceneFeatures::BACK_TO_FRONT_SORTING)
    }

    pub fn set_back_to_front_sorting(&mut self, enabled: bool) {
        self.set_feature(
            SceneFeatures::BACK_TO_FRONT_SORTING,
            enabled,
            ViewChange::BackToFrontSortingChanged,
        );
    }

    #[must_use]
    pub fn z_filling(&self) -> bool {
        self.features.contains(SceneFeatures::Z_FILLING)
    }

    pub fn set_z_filling(&mut self, enabled: bool) {
        self.set_feature(SceneFeatures::Z_FILLING, enabled, ViewChange::ZFillingChanged);
    }

    #[must_use]
    pub fn particles_enabled(&self) -> bool {
        self.features.contains(SceneFeatures::PARTICLES)
    }

    pub fn set_particles_enabled(&mut self, enabled: bool) {
        self.set_feature(SceneFeatures::PARTICLES, enabled, ViewChange::ParticlesEnabledChanged);
    }

    fn set_feature(&mut self, feature: SceneFeatures, enabled: bool, change: ViewChange) {
        if self.features.contains(feature) == enabled {
            return;
        }
        self.features.set(feature, enabled);
        self.notifier.emit(change);
        self.reconfigure_stages();
    }

    #[inline]
    #[must_use]
    pub fn uses_stencil_mask(&self) -> bool {
        self.uses_stencil_mask
    }

    /// Gives the scene target a stencil attachment. Takes effect on the next rebuild.
    pub fn set_uses_stencil_mask(&mut self, enabled: bool) {
        if self.uses_stencil_mask == enabled {
            return;
        }
        self.uses_stencil_mask = enabled;
        self.notifier.emit(ViewChange::UsesStencilMaskChanged);
        self.schedule_fg_tree_rebuild();
    }

    #[inline]
    #[must_use]
    pub fn rendering_features(&self) -> RenderingFeatures {
        self.rendering_features
    }

    /// Takes effect on the next rebuild.
    pub fn set_rendering_features(&mut self, features: RenderingFeatures) {
        if self.rendering_features == features {
            return;
        }
        self.rendering_features = features;
        self.notifier.emit(ViewChange::RenderingFeaturesChanged);
        self.schedule_fg_tree_rebuild();
    }

    // ========================================================================
    // Internal tone mapping
    // ========================================================================

    #[must_use]
    pub fn exposure(&self) -> f32 {
        self.tone_mapping.borrow().exposure()
    }

    #[allow(clippy::float_cmp)]
    pub fn set_exposure(&mut self, exposure: f32) {
        if self.exposure() == exposure {
            return;
        }
        self.tone_mapping.borrow_mut().set_exposure(exposure);
        self.update_tone_mapping_parameters();
        self.notifier.emit(ViewChange::ExposureChanged);
    }

    #[must_use]
    pub fn gamma(&self) -> f32 {
        self.tone_mapping.borrow().gamma()
    }

    #[allow(clippy::float_cmp)]
    pub fn set_gamma(&mut self, gamma: f32) {
        if self.gamma() == gamma {
            return;
        }
        self.tone_mapping.borrow_mut().set_gamma(gamma);
        self.update_tone_mapping_parameters();
        self.notifier.emit(ViewChange::GammaChanged);
    }

    #[must_use]
    pub fn tone_mapping_algorithm(&self) -> ToneMapping {
        self.tone_mapping.borrow().tone_mapping()
    }

    pub fn set_tone_mapping_algorithm(&mut self, algorithm: ToneMapping) {
        if self.tone_mapping_algorithm() == algorithm {
            return;
        }
        self.tone_mapping.borrow_mut().set_tone_mapping(algorithm);
        self.update_tone_mapping_parameters();
        self.notifier.emit(ViewChange::ToneMappingAlgorithmChanged);
    }

    fn update_tone_mapping_parameters(&mut self) {
        let mut ctx = EffectContext {
            graph: &mut self.graph,
            subtree: self.tone_mapping_subtree,
        };
        self.tone_mapping.borrow_mut().update_parameters(&mut ctx);
    }

    // ========================================================================
    // Shadow maps
    // ========================================================================

    #[must_use]
    pub fn shadow_maps(&self) -> &[ShadowMap] {
        self.shadow_map_stages.shadow_maps()
    }

    /// Renders one depth pass per map before the reflections and the scene.
    pub fn set_shadow_maps(&mut self, shadow_maps: &[ShadowMap]) {
        match self.shadow_map_stages.set_shadow_maps(&mut self.graph, shadow_maps) {
            Ok(false) => return,
            Ok(true) => {}
            Err(err) => log::error!("View {}: failed to build shadow map passes: {err}", self.id),
        }
        self.notifier.emit(ViewChange::ShadowMapsChanged);
        self.reconfigure_stages();
    }

    /// Depth texture of every shadow map, in order.
    #[must_use]
    pub fn shadow_map_textures(&self) -> Vec<Option<TextureId>> {
        self.shadow_map_stages.depth_textures(&self.graph)
    }

    // ========================================================================
    // Layers
    // ========================================================================

    /// Live layers in registration order.
    #[must_use]
    pub fn layers(&self) -> Vec<Layer> {
        self.layers
            .iter()
            .filter_map(Link::upgrade)
            .map(Layer::from)
            .collect()
    }

    /// Restricts the scene to entities tagged with any of the view's layers.
    ///
    /// Duplicates are kept. A destroyed layer is rejected with a warning.
    pub fn add_layer(&mut self, layer: &Layer) {
        if !layer.is_alive() {
            log::warn!("{}", KuesaError::invalid_argument("add_layer", "layer was destroyed"));
            return;
        }
        layer.watch(self.id, self.watch_callback());
        self.layers.push(Link::adopt_or_borrow(layer.handle(), self.id));
        self.notifier.emit(ViewChange::LayersChanged);
        self.reconfigure_stages();
    }

    /// Removes the first registration of `layer`.
    pub fn remove_layer(&mut self, layer: &Layer) {
        let Some(pos) = self.layers.iter().position(|link| link.id() == layer.id()) else {
            return;
        };
        let link = self.layers.remove(pos);
        // An adopted layer stays adopted while another registration remains.
        if link.is_owned()
            && let Some(duplicate) = self.layers.iter_mut().find(|other| other.id() == link.id())
        {
            *duplicate = link;
        } else {
            self.unlink(link);
        }
        self.notifier.emit(ViewChange::LayersChanged);
        self.reconfigure_stages();
    }

    // ========================================================================
    // Reflection planes
    // ========================================================================

    #[must_use]
    pub fn reflection_planes(&self) -> &[ReflectionPlane] {
        &self.reflection_planes
    }

    /// Appends a plane. Duplicates are kept.
    pub fn add_reflection_plane(&mut self, plane: ReflectionPlane) {
        if let Some(layer) = plane.layer() {
            layer.watch(self.id, self.watch_callback());
        }
        self.reflection_planes.push(plane);
        self.notifier.emit(ViewChange::ReflectionPlanesChanged);
        self.reconfigure_stages();
    }

    /// Removes the first plane equal to `plane`.
    pub fn remove_reflection_plane(&mut self, plane: &ReflectionPlane) {
        let Some(pos) = self.reflection_planes.iter().position(|p| p == plane) else {
            return;
        };
        let removed = self.reflection_planes.remove(pos);
        if let Some(layer) = removed.layer() {
            self.release_watch(layer.handle());
        }
        self.notifier.emit(ViewChange::ReflectionPlanesChanged);
        self.reconfigure_stages();
    }

    pub fn clear_reflection_planes(&mut self) {
        if self.reflection_planes.is_empty() {
            return;
        }
        let removed = std::mem::take(&mut self.reflection_planes);
        for layer in removed.iter().filter_map(ReflectionPlane::layer) {
            self.release_watch(layer.handle());
        }
        self.notifier.emit(ViewChange::ReflectionPlanesChanged);
        self.reconfigure_stages();
    }

    #[inline]
    #[must_use]
    pub fn reflection_texture_size(&self) -> UVec2 {
        self.reflection_texture_size
    }

    /// Resizes every reflection target in place.
    pub fn set_reflection_texture_size(&mut self, size: UVec2) {
        if self.reflection_texture_size == size {
            return;
        }
        self.reflection_texture_size = size;
        for stages in &mut self.reflection_stages {
            if let Err(err) = stages.set_texture_size(&mut self.graph, size) {
                log::error!("View {}: failed to resize reflection target: {err}", self.id);
            }
        }
        self.notifier.emit(ViewChange::ReflectionTextureSizeChanged);
    }

    /// Texture of the first plane that renders.
    #[must_use]
    pub fn reflection_texture(&self) -> Option<TextureId> {
        self.reflection_textures().into_iter().flatten().next()
    }

    /// One entry per plane, `None` for planes that are skipped.
    #[must_use]
    pub fn reflection_textures(&self) -> Vec<Option<TextureId>> {
        self.reflection_planes
            .iter()
            .zip(&self.reflection_stages)
            .map(|(plane, stages)| {
                (plane.visibility() != PlaneVisibility::Invalid)
                    .then(|| stages.reflection_texture(&self.graph))
                    .flatten()
            })
            .collect()
    }

    // ========================================================================
    // Post-processing effects
    // ========================================================================

    /// Live effects in registration order.
    #[must_use]
    pub fn post_processing_effects(&self) -> Vec<Effect> {
        self.effects
            .iter()
            .filter_map(WeakEffect::upgrade)
            .map(Effect::from)
            .collect()
    }

    /// Appends `effect` to the chain. Registering an effect twice is ignored.
    ///
    /// The effect builds its subtree right away; the render targets are
    /// reallocated on the next [`process_events`](Self::process_events) turn.
    pub fn add_post_processing_effect(&mut self, effect: &Effect) {
        if !effect.is_alive() {
            log::warn!(
                "{}",
                KuesaError::invalid_argument("add_post_processing_effect", "effect was destroyed")
            );
            return;
        }
        if self.effects.iter().any(|registered| registered.id() == effect.id()) {
            return;
        }

        effect.watch(self.id, self.watch_callback());
        self.effects.push(effect.downgrade());

        let subtree = effect.borrow_mut().frame_graph_sub_tree(&mut self.graph);
        match subtree {
            Some(subtree) => {
                self.effect_fg_subtrees.insert(effect.id(), subtree);
                self.schedule_fg_tree_rebuild();
            }
            None => log::debug!("View {}: effect '{}' has no subtree", self.id, effect.name()),
        }

        self.notifier.emit(ViewChange::PostProcessingEffectsChanged);
        self.reconfigure_stages();
    }

    pub fn remove_post_processing_effect(&mut self, effect: &Effect) {
        if self.remove_effect(effect.id()) {
            self.reconfigure_stages();
        }
    }

    /// Subtree this view built for `effect`.
    #[must_use]
    pub fn frame_graph_sub_tree_for_effect(&self, effect: &Effect) -> Option<FrameGraphNodeId> {
        self.effect_fg_subtrees.get(&effect.id()).copied()
    }

    fn remove_effect(&mut self, id: ObjectId) -> bool {
        let Some(pos) = self.effects.iter().position(|registered| registered.id() == id) else {
            return false;
        };
        let weak = self.effects.remove(pos);
        if let Err(err) = self.fx_stages.remove_effect(&mut self.graph, id) {
            log::error!("View {}: failed to unchain effect: {err}", self.id);
        }
        if let Some(subtree) = self.effect_fg_subtrees.remove(&id) {
            self.graph.destroy(subtree);
        }
        if let Some(effect) = weak.upgrade() {
            effect.unwatch(self.id);
        }
        self.notifier.emit(ViewChange::PostProcessingEffectsChanged);
        self.schedule_fg_tree_rebuild();
        true
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn is_fg_tree_rebuild_scheduled(&self) -> bool {
        self.fg_tree_rebuild_scheduled
    }

    /// Handles the events queued so far. Events posted while handling wait
    /// for the next call. Returns the number handled.
    pub fn process_events(&mut self) -> usize {
        let pending = self.events_rx.len();
        let mut handled = 0;
        for _ in 0..pending {
            let Ok(event) = self.events_rx.try_recv() else { break };
            match event {
                ViewEvent::RebuildFrameGraph => self.rebuild_fg_tree(),
                ViewEvent::Changed(id) => self.handle_changed(id),
                ViewEvent::Destroyed(id) => self.handle_destroyed(id),
            }
            handled += 1;
        }
        handled
    }

    fn watch_callback(&self) -> WatchCallback {
        let tx = self.events_tx.clone();
        Box::new(move |id, event| {
            let event = match event {
                ObjectEvent::Changed => ViewEvent::Changed(id),
                ObjectEvent::Destroyed => ViewEvent::Destroyed(id),
            };
            // The view unwatches everything on drop, so the queue is alive here.
            let _ = tx.send(event);
        })
    }

    fn schedule_fg_tree_rebuild(&mut self) {
        if self.fg_tree_rebuild_scheduled {
            return;
        }
        self.fg_tree_rebuild_scheduled = true;
        let _ = self.events_tx.send(ViewEvent::RebuildFrameGraph);
        log::trace!("View {}: frame-graph rebuild scheduled", self.id);
    }

    fn rebuild_fg_tree(&mut self) {
        // Cleared first so that work done during the rebuild can schedule another one.
        self.fg_tree_rebuild_scheduled = false;
        self.reconfigure_frame_graph();
        self.reconfigure_stages();
    }

    /// Rewrites the parameters of a registered effect whose properties changed.
    fn handle_changed(&mut self, id: ObjectId) {
        let Some(&subtree) = self.effect_fg_subtrees.get(&id) else {
            return;
        };
        let Some(effect) = self
            .effects
            .iter()
            .find(|registered| registered.id() == id)
            .and_then(WeakEffect::upgrade)
        else {
            return;
        };
        if !self.graph.contains(subtree) {
            return;
        }
        log::trace!("View {}: effect {id} changed", self.id);
        let mut ctx = EffectContext {
            graph: &mut self.graph,
            subtree,
        };
        effect.borrow_mut().update_parameters(&mut ctx);
    }

    fn handle_destroyed(&mut self, id: ObjectId) {
        log::debug!("View {}: watched object {id} destroyed", self.id);
        let mut restage = false;

        if self.camera.as_ref().is_some_and(|link| link.id() == id) {
            self.camera = None;
            self.notifier.emit(ViewChange::CameraChanged);
            restage = true;
        }

        let before = self.layers.len();
        self.layers.retain(|link| link.id() != id);
        if self.layers.len() != before {
            self.notifier.emit(ViewChange::LayersChanged);
            restage = true;
        }

        if self.reflection_planes.iter().any(|plane| plane.layer_id() == Some(id)) {
            restage = true;
        }

        if self.remove_effect(id) {
            restage = true;
        }

        if restage {
            self.reconfigure_stages();
        }
    }

    // ========================================================================
    // Reconfiguration
    // ========================================================================

    /// Reallocates the render targets for the current effects and rebuilds
    /// the render-to-texture wrapper and the effects chain.
    ///
    /// Calling it twice in a row yields the same topology.
    pub fn reconfigure_frame_graph(&mut self) {
        if let Err(err) = self.try_reconfigure_frame_graph() {
            log::error!("View {}: failed to rebuild the frame graph: {err}", self.id);
        }
        log::debug!(
            "View {}: frame graph rebuilt, {} effect(s), {} render target(s)",
            self.id,
            self.fx_stages.effects().len(),
            self.graph.render_target_count()
        );
        self.notifier.emit(ViewChange::FrameGraphTreeReconfigured);
    }

    /// Pushes the configuration into the stages and recomposes them under
    /// the view. Only attaches and parameterizes existing nodes.
    pub fn reconfigure_stages(&mut self) {
        if let Err(err) = self.try_reconfigure_stages() {
            log::error!("View {}: failed to reconfigure stages: {err}", self.id);
        }
    }

    fn try_reconfigure_frame_graph(&mut self) -> Result<()> {
        // Stage roots may live under the branch being destroyed.
        self.detach_stage_roots();
        self.graph.detach(self.fx_stages.root());
        self.fx_stages.set_render_targets(&mut self.graph, None, None)?;
        self.graph.detach(self.tone_mapping_stages.root());
        self.tone_mapping_stages.set_render_targets(&mut self.graph, None, None)?;
        if let Some(branch) = self.main_scene.take() {
            branch.release(&mut self.graph);
        }
        for target in self
            .render_targets
            .iter_mut()
            .chain(iter::once(&mut self.multisample_target))
        {
            if let Some(target) = target.take() {
                self.graph.destroy_render_target(target);
            }
        }

        let half_float = self.rendering_features.half_float_render_targets;
        if self
            .reflection_stages
            .first()
            .is_some_and(|stages| stages.is_half_float(&self.graph) != half_float)
        {
            for stages in self.reflection_stages.drain(..) {
                stages.release(&mut self.graph);
            }
        }

        let bindings: Vec<EffectBinding> = self
            .effects
            .iter()
            .filter(|effect| effect.is_alive())
            .filter_map(|effect| {
                let subtree = *self.effect_fg_subtrees.get(&effect.id())?;
                Some(EffectBinding {
                    effect: effect.clone(),
                    subtree,
                })
            })
            .collect();
        let count = bindings.len();
        let tone_mapping = self.rendering_features.tone_mapping;
        self.fx_stages.set_effects(&mut self.graph, bindings)?;
        self.fx_stages.set_present_to_screen(&mut self.graph, !tone_mapping)?;
        if count == 0 && !tone_mapping {
            self.fx_stages.set_depth_texture(&mut self.graph, None)?;
            self.tone_mapping_stages.set_depth_texture(&mut self.graph, None)?;
            return self.compose_stages();
        }

        let size = self.viewport_rect.pixel_size(self.surface_size);
        let mut color_flags = RenderTargetFlags::empty();
        if half_float {
            color_flags |= RenderTargetFlags::HALF_FLOAT;
        }
        let mut scene_flags = color_flags | RenderTargetFlags::INCLUDE_DEPTH;
        if self.uses_stencil_mask {
            scene_flags |= RenderTargetFlags::INCLUDE_STENCIL;
        }

        let rt0 = self
            .graph
            .create_render_target("KuesaRenderTarget0", RenderTargetDesc::new(scene_flags, size));
        // An offscreen chain writes RT1 even for a single effect.
        let rt1 = (count > 1 || (tone_mapping && count > 0)).then(|| {
            self.graph
                .create_render_target("KuesaRenderTarget1", RenderTargetDesc::new(color_flags, size))
        });
        let multisample = self.rendering_features.is_multisampled().then(|| {
            self.graph.create_render_target(
                "KuesaMultisampleTarget",
                RenderTargetDesc::new(scene_flags | RenderTargetFlags::MULTISAMPLED, size)
                    .with_samples(self.rendering_features.msaa_samples),
            )
        });
        self.render_targets = [Some(rt0), rt1];
        self.multisample_target = multisample;

        let mut buffers = ClearBufferFlags::COLOR_DEPTH;
        if self.uses_stencil_mask {
            buffers |= ClearBufferFlags::STENCIL;
        }
        let mut effect_layers: SmallVec<[ObjectId; 4]> =
            self.fx_stages.layers().iter().map(|layer| layer.id()).collect();
        if tone_mapping {
            effect_layers.push(self.tone_mapping.borrow().quad_layer().id());
        }
        self.main_scene = Some(MainSceneBranch::build(
            &mut self.graph,
            self.root,
            multisample.unwrap_or(rt0),
            buffers,
            self.clear_color,
            effect_layers,
            multisample.map(|ms| (ms, rt0, size)),
        )?);

        let depth = self.graph.depth_texture(rt0);
        if count > 0 {
            self.fx_stages.set_window_size(&mut self.graph, size)?;
            self.fx_stages.set_depth_texture(&mut self.graph, depth)?;
            self.fx_stages.set_render_targets(&mut self.graph, Some(rt0), rt1)?;
            self.graph.set_parent(self.fx_stages.root(), Some(self.root))?;
        }
        if tone_mapping {
            let input = if count > 0 {
                self.fx_stages.final_render_target()
            } else {
                Some(rt0)
            };
            self.tone_mapping_stages.set_window_size(&mut self.graph, size)?;
            self.tone_mapping_stages.set_depth_texture(&mut self.graph, depth)?;
            self.tone_mapping_stages.set_render_targets(&mut self.graph, input, None)?;
            self.graph.set_parent(self.tone_mapping_stages.root(), Some(self.root))?;
        }
        self.compose_stages()
    }

    fn try_reconfigure_stages(&mut self) -> Result<()> {
        let camera = self.camera.as_ref().filter(|link| link.is_alive()).map(Link::id);
        let layers: SmallVec<[ObjectId; 4]> = self
            .layers
            .iter()
            .filter(|link| link.is_alive())
            .map(Link::id)
            .collect();
        let graph = &mut self.graph;

        self.scene_stages.set_features(graph, self.features)?;
        self.scene_stages.set_camera(graph, camera)?;
        self.scene_stages.set_viewport_rect(graph, self.viewport_rect)?;
        self.scene_stages.set_layers(graph, &layers)?;

        self.shadow_map_stages.set_features(graph, self.features)?;
        self.shadow_map_stages.set_layers(graph, &layers)?;

        while self.reflection_stages.len() > self.reflection_planes.len() {
            if let Some(stages) = self.reflection_stages.pop() {
                stages.release(graph);
            }
        }
        while self.reflection_stages.len() < self.reflection_planes.len() {
            self.reflection_stages.push(ReflectionStages::new(
                graph,
                self.reflection_texture_size,
                self.rendering_features.half_float_render_targets,
            )?);
        }
        for (stages, plane) in self.reflection_stages.iter_mut().zip(&self.reflection_planes) {
            stages.set_features(graph, self.features)?;
            stages.set_camera(graph, camera)?;
            stages.set_viewport_rect(graph, self.viewport_rect)?;
            stages.set_reflection_plane(graph, plane.equation())?;
            match plane.visibility() {
                PlaneVisibility::ViewLayers => stages.set_layers(graph, &layers)?,
                PlaneVisibility::Layer(layer) => stages.set_layers(graph, &[layer])?,
                PlaneVisibility::Invalid => {}
            }
        }

        for fx_stages in [&mut self.fx_stages, &mut self.tone_mapping_stages] {
            fx_stages.set_camera(graph, camera)?;
            fx_stages.set_viewport_rect(graph, self.viewport_rect)?;
        }

        self.compose_stages()?;

        let texture = self.reflection_texture();
        if texture != self.last_reflection_texture {
            self.last_reflection_texture = texture;
            self.notifier.emit(ViewChange::ReflectionTextureChanged);
        }
        Ok(())
    }

    /// Attaches the shadow map, reflection and scene stages, in that order,
    /// under the render-to-texture filter or the view root. Nothing renders
    /// without a camera.
    fn compose_stages(&mut self) -> Result<()> {
        self.detach_stage_roots();
        if !self.camera.as_ref().is_some_and(Link::is_alive) {
            return Ok(());
        }
        let parent = self.main_scene.as_ref().map_or(self.root, |branch| branch.filter);
        if !self.shadow_map_stages.shadow_maps().is_empty() {
            self.graph.set_parent(self.shadow_map_stages.root(), Some(parent))?;
        }
        for (stages, plane) in self.reflection_stages.iter().zip(&self.reflection_planes) {
            if plane.visibility() != PlaneVisibility::Invalid {
                self.graph.set_parent(stages.root(), Some(parent))?;
            }
        }
        self.graph.set_parent(self.scene_stages.root(), Some(parent))
    }

    fn detach_stage_roots(&mut self) {
        self.graph.detach(self.shadow_map_stages.root());
        for stages in &self.reflection_stages {
            self.graph.detach(stages.root());
        }
        self.graph.detach(self.scene_stages.root());
    }

    fn update_texture_sizes(&mut self) -> Result<()> {
        let size = self.viewport_rect.pixel_size(self.surface_size);
        for &target in self
            .render_targets
            .iter()
            .chain(iter::once(&self.multisample_target))
            .flatten()
        {
            self.graph.resize_render_target(target, size)?;
        }
        if let Some(resolve) = self.main_scene.as_ref().and_then(|branch| branch.resolve)
            && let FrameGraphNodeKind::BlitFramebuffer { size: blit_size, .. } = self.graph.kind_mut(resolve)?
        {
            *blit_size = size;
        }
        if self.main_scene.is_some() {
            self.fx_stages.set_window_size(&mut self.graph, size)?;
            self.tone_mapping_stages.set_window_size(&mut self.graph, size)?;
        }
        Ok(())
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Whether any registration other than the one being dropped still refers to `id`.
    fn still_watching(&self, id: ObjectId) -> bool {
        self.camera.as_ref().is_some_and(|link| link.id() == id)
            || self.layers.iter().any(|link| link.id() == id)
            || self.reflection_planes.iter().any(|plane| plane.layer_id() == Some(id))
            || self.effects.iter().any(|effect| effect.id() == id)
    }

    fn release_watch<T: ?Sized>(&self, handle: &Handle<T>) {
        if !self.still_watching(handle.id()) {
            handle.unwatch(self.id);
        }
    }

    /// Drops a camera or layer registration, giving back adopted objects.
    fn unlink<T: ?Sized>(&self, link: Link<T>) {
        if let Some(handle) = link.release(self.id) {
            self.release_watch(&handle);
        }
    }

    /// Teardown counterpart of [`unlink`](Self::unlink): destroys adopted
    /// objects and stops watching the others.
    fn forget<T: ?Sized>(&self, link: Link<T>) {
        match link {
            Link::Owned(handle) if handle.parent() == Some(self.id) => {
                handle.unwatch(self.id);
                handle.destroy();
            }
            other => {
                if let Some(handle) = other.upgrade() {
                    handle.unwatch(self.id);
                }
            }
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        if let Some(camera) = self.camera.take() {
            self.forget(camera);
        }
        for layer in std::mem::take(&mut self.layers) {
            self.forget(layer);
        }
        for layer in self.reflection_planes.iter().filter_map(ReflectionPlane::layer) {
            layer.unwatch(self.id);
        }
        for effect in self.effects.iter().filter_map(WeakEffect::upgrade) {
            effect.unwatch(self.id);
        }
        log::debug!("View {} dropped", self.id);
    }
}
