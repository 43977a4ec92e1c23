//! Texture keys and their resolution to GPU handles

use std::collections::HashMap;

use crate::backend::TextureHandle;

/// Opaque key identifying a texture owned by the asset layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureKey(pub u32);

/// Resolves texture keys to bindable handles
pub trait TextureResolver {
    /// `None` when the texture is not (yet) available
    fn resolve(&self, key: TextureKey) -> Option<TextureHandle>;
}

/// Map-backed [`TextureResolver`]
#[derive(Debug, Default, Clone)]
pub struct TextureRegistry {
    textures: HashMap<TextureKey, TextureHandle>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a handle with a key, returning the previous handle
    pub fn insert(&mut self, key: TextureKey, texture: TextureHandle) -> Option<TextureHandle> {
        self.textures.insert(key, texture)
    }

    pub fn remove(&mut self, key: TextureKey) -> Option<TextureHandle> {
        self.textures.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl TextureResolver for TextureRegistry {
    fn resolve(&self, key: TextureKey) -> Option<TextureHandle> {
        self.textures.get(&key).copied()
    }
}
