use std::collections::BTreeMap;

use log::debug;

use crate::error::CanvasError;
use crate::gl::{GlContext, ImageSource};

/// Where texture pixels come from.
pub enum TextureData<I> {
    /// Fetched and decoded by the host. The URL doubles as the default alias.
    Url(String),
    Image(I),
}

impl<I> TextureData<I> {
    /// The alias a texture loaded from this data is registered under.
    pub fn resolve_alias(&self, alias: Option<&str>) -> Result<String, CanvasError> {
        match (self, alias) {
            (_, Some(alias)) => Ok(alias.to_string()),
            (TextureData::Url(url), None) => Ok(url.clone()),
            (TextureData::Image(_), None) => Err(CanvasError::validation(
                "alias is required when texture data is not a url",
            )),
        }
    }
}

pub struct TextureEntry<G: GlContext> {
    texture: G::Texture,
    unit: u32,
    width: u32,
    height: u32,
}

/// Live textures by alias, each bound to its own texture unit.
pub struct TextureRegistry<G: GlContext> {
    textures: BTreeMap<String, TextureEntry<G>>,
    max_units: u32,
}

impl<G: GlContext> TextureRegistry<G> {
    pub fn new(gl: &G) -> TextureRegistry<G> {
        TextureRegistry {
            textures: BTreeMap::new(),
            max_units: gl.max_texture_units(),
        }
    }

    fn next_free_unit(&self) -> Result<u32, CanvasError> {
        (0..self.max_units)
            .find(|unit| !self.textures.values().any(|entry| entry.unit == *unit))
            .ok_or(CanvasError::AllUnitsBound(self.max_units))
    }

    pub fn ensure_alias_free(&self, alias: &str) -> Result<(), CanvasError> {
        if self.textures.contains_key(alias) {
            Err(CanvasError::DuplicateAlias(alias.to_string()))
        } else {
            Ok(())
        }
    }

    /// Uploads `image` into the lowest free texture unit and returns that unit.
    pub fn load_texture(&mut self, gl: &G, alias: &str, image: &G::Image) -> Result<u32, CanvasError> {
        self.ensure_alias_free(alias)?;
        let unit = self.next_free_unit()?;
        let texture = gl.create_texture()?;
        if let Err(e) = gl.upload_texture(unit, &texture, image) {
            gl.delete_texture(unit, &texture);
            return Err(e);
        }
        let (width, height) = (image.width(), image.height());
        debug!("texture {} bound to unit {} ({}x{})", alias, unit, width, height);
        self.textures.insert(
            alias.to_string(),
            TextureEntry {
                texture,
                unit,
                width,
                height,
            },
        );
        Ok(unit)
    }

    fn entry(&self, alias: &str) -> Result<&TextureEntry<G>, CanvasError> {
        self.textures
            .get(alias)
            .ok_or_else(|| CanvasError::NotFound(alias.to_string()))
    }

    pub fn delete_texture(&mut self, gl: &G, alias: &str) -> Result<(), CanvasError> {
        let entry = self
            .textures
            .remove(alias)
            .ok_or_else(|| CanvasError::NotFound(alias.to_string()))?;
        gl.delete_texture(entry.unit, &entry.texture);
        Ok(())
    }

    pub fn delete_all_textures(&mut self, gl: &G) {
        for (_, entry) in std::mem::take(&mut self.textures) {
            gl.delete_texture(entry.unit, &entry.texture);
        }
    }

    /// The texture unit the alias is bound to.
    pub fn texture_id(&self, alias: &str) -> Result<u32, CanvasError> {
        Ok(self.entry(alias)?.unit)
    }

    pub fn texture_dimensions(&self, alias: &str) -> Result<(u32, u32), CanvasError> {
        let entry = self.entry(alias)?;
        Ok((entry.width, entry.height))
    }

    pub fn has_texture(&self, alias: &str) -> bool {
        self.textures.contains_key(alias)
    }

    pub fn texture_names(&self) -> Vec<String> {
        self.textures.keys().cloned().collect()
    }
}
