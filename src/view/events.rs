//! View event queue and change notifications.
//!
//! A view talks to itself through a [`flume`] channel: object watches and
//! rebuild requests post a [`ViewEvent`] that the next
//! [`View::process_events`](super::View::process_events) turn handles.
//! Observers receive [`ViewChange`] notifications on their own channels.

use crate::core::ObjectId;

/// Deferred work queued on a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// Rebuild the render-target topology and recompose the stages.
    RebuildFrameGraph,
    /// A watched effect changed its properties.
    Changed(ObjectId),
    /// A watched layer, camera or effect was destroyed.
    Destroyed(ObjectId),
}

/// Emitted once per actual change of a view property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewChange {
    ViewportRectChanged,
    CameraChanged,
    FrustumCullingChanged,
    SkinningChanged,
    BackToFrontSortingChanged,
    ZFillingChanged,
    ParticlesEnabledChanged,
    LayersChanged,
    ReflectionPlanesChanged,
    PostProcessingEffectsChanged,
    ReflectionTextureSizeChanged,
    ReflectionTextureChanged,
    ClearColorChanged,
    SurfaceSizeChanged,
    UsesStencilMaskChanged,
    RenderingFeaturesChanged,
    ExposureChanged,
    GammaChanged,
    ToneMappingAlgorithmChanged,
    ShadowMapsChanged,
    FrameGraphTreeReconfigured,
}

/// Fan-out of [`ViewChange`] notifications.
#[derive(Debug, Default)]
pub(crate) struct Notifier {
    subscribers: Vec<flume::Sender<ViewChange>>,
}

impl Notifier {
    pub(crate) fn subscribe(&mut self) -> flume::Receiver<ViewChange> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Sends `change` to every live subscriber and forgets the dropped ones.
    pub(crate) fn emit(&mut self, change: ViewChange) {
        log::trace!("View change: {change:?}");
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
