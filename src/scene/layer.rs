use std::borrow::Cow;
use std::ops::Deref;

use crate::core::{Handle, WeakHandle};

/// Payload of a [`Layer`].
#[derive(Debug, Clone)]
pub struct LayerData {
    pub name: Cow<'static, str>,
}

/// Opaque tag used by layer filters to select renderable entities.
///
/// Cloning shares the same layer. Layers compare by identity.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Layer(Handle<LayerData>);

/// Back-reference to a layer that does not keep it alive.
pub type WeakLayer = WeakHandle<LayerData>;

impl Layer {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(Handle::new(LayerData { name: name.into() }))
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.0.borrow().name.to_string()
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> &Handle<LayerData> {
        &self.0
    }
}

impl From<Handle<LayerData>> for Layer {
    fn from(handle: Handle<LayerData>) -> Self {
        Self(handle)
    }
}

impl Deref for Layer {
    type Target = Handle<LayerData>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
