#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Kuesa view frame-graph assembly.
//!
//! A [`View`] turns its configuration (camera, viewport, layers, shadow maps, reflection
//! planes, post-processing effects, feature flags) into a tree of frame-graph
//! nodes and keeps that tree current as the configuration changes.
//!
//! ```rust,ignore
//! use kuesa::{Camera, Effect, Layer, ToneMappingAndGammaCorrectionEffect, View};
//!
//! let mut view = View::new()?;
//! view.set_camera(Some(&Camera::new_perspective(45.0, 16.0 / 9.0, 0.1, 100.0)));
//! view.add_layer(&Layer::new("Ground"));
//! view.add_post_processing_effect(&Effect::new(ToneMappingAndGammaCorrectionEffect::new()));
//!
//! // One event-loop turn: applies the coalesced rebuild.
//! view.process_events();
//! println!("{}", view.dump());
//! ```

pub mod core;
pub mod errors;
pub mod framegraph;
pub mod fx;
pub mod scene;
pub mod view;

pub use self::core::{Handle, Link, NormalizedRect, ObjectId, WeakHandle};
pub use errors::{KuesaError, Result};
pub use framegraph::{FrameGraph, FrameGraphNodeId, FrameGraphNodeKind, NodeStructure};
pub use fx::{Effect, EffectContext, PostProcessingEffect, ToneMapping, ToneMappingAndGammaCorrectionEffect};
pub use scene::{Camera, Layer, Projection, ReflectionPlane, ShadowMap};
pub use view::{RenderingFeatures, View, ViewChange, ViewFeatures, ViewSettings};
