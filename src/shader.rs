use log::debug;

use crate::error::CanvasError;
use crate::gl::{GlContext, ShaderKind};

/// Compiles shaders and keeps every live handle so they can be freed together.
pub struct ShaderStore<G: GlContext> {
    shaders: Vec<G::Shader>,
}

impl<G: GlContext> Default for ShaderStore<G> {
    fn default() -> Self {
        ShaderStore { shaders: vec![] }
    }
}

impl<G: GlContext> ShaderStore<G> {
    pub fn new() -> ShaderStore<G> {
        ShaderStore::default()
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn contains(&self, shader: &G::Shader) -> bool {
        self.shaders.contains(shader)
    }

    pub fn load_shader_from_string(
        &mut self,
        gl: &G,
        kind: ShaderKind,
        source: &str,
    ) -> Result<G::Shader, CanvasError> {
        let shader = gl.create_shader(kind)?;
        if let Err(log) = gl.compile_shader(&shader, source) {
            gl.delete_shader(&shader);
            return Err(CanvasError::Compile(log));
        }
        debug!("compiled {:?} shader ({} bytes)", kind, source.len());
        self.shaders.push(shader.clone());
        Ok(shader)
    }

    pub fn delete_shader(&mut self, gl: &G, shader: &G::Shader) -> Result<(), CanvasError> {
        let index = self
            .shaders
            .iter()
            .position(|s| s == shader)
            .ok_or(CanvasError::NotTracked)?;
        let shader = self.shaders.remove(index);
        gl.delete_shader(&shader);
        Ok(())
    }

    pub fn delete_all_shaders(&mut self, gl: &G) {
        for shader in self.shaders.drain(..) {
            gl.delete_shader(&shader);
        }
    }
}
