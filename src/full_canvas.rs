//! A single fragment shader drawn over a quad covering the whole canvas.
//!
//! The session owns its program, vertex buffer, shaders and textures. Caller
//! uniforms are declared up front and become part of the fragment shader's
//! preamble; every `sampler2D` uniform also gets a `<name>_resolution`
//! companion that is written whenever the sampler is set.

use std::collections::HashMap;
use std::future::Future;

use log::{debug, warn};

use crate::error::CanvasError;
use crate::gl::{GlContext, ShaderKind, UniformWrite};
use crate::shader::ShaderStore;
use crate::texture::TextureRegistry;
use crate::uniform::{
    expand_uniforms, Scalar, UniformDecl, UniformDescriptor, UniformType, UniformValue,
    RESOLUTION_UNIFORM, TEXTURE_RESOLUTION_SUFFIX,
};

pub const VERTEX_POSITION_ATTRIB: &str = "a_vertexPosition";

const SHADER_PREFIX: &str = "#version 300 es\nprecision highp float;";

const QUAD_VERTICES: [f32; 8] = [1.0, 1.0, -1.0, 1.0, 1.0, -1.0, -1.0, -1.0];

pub fn vertex_source() -> String {
    format!(
        "{}\nin vec4 {attrib};\n\nvoid main() {{\n  gl_Position = vec4({attrib}.xy, 0.0, 1.0);\n}}",
        SHADER_PREFIX,
        attrib = VERTEX_POSITION_ATTRIB
    )
}

/// The fixed preamble, then one declaration per uniform, then the segments.
pub fn fragment_source(uniforms: &[UniformDescriptor], segments: &[String]) -> String {
    let mut lines = vec![
        SHADER_PREFIX.to_string(),
        format!("uniform vec2 {};", RESOLUTION_UNIFORM),
    ];
    lines.extend(uniforms.iter().map(|u| u.declaration()));
    lines.extend(segments.iter().cloned());
    lines.join("\n")
}

/// One piece of fragment shader body text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShaderSegment {
    Source(String),
    Url(String),
}

/// Validated uniforms and segments for a full-canvas shader.
#[derive(Clone, Debug, Default)]
pub struct ShaderConfig {
    uniforms: Vec<UniformDescriptor>,
    segments: Vec<ShaderSegment>,
}

impl ShaderConfig {
    pub fn new(uniforms: &[UniformDecl], segments: Vec<ShaderSegment>) -> Result<ShaderConfig, CanvasError> {
        Ok(ShaderConfig {
            uniforms: expand_uniforms(uniforms)?,
            segments,
        })
    }

    pub fn uniforms(&self) -> &[UniformDescriptor] {
        &self.uniforms
    }

    /// Replaces url segments with the fetched text, keeping order.
    pub async fn resolve_segments<F, Fut>(&self, fetch_text: F) -> Result<Vec<String>, CanvasError>
    where
        F: Fn(&str) -> Fut,
        Fut: Future<Output = Result<String, CanvasError>>,
    {
        let mut out = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                ShaderSegment::Source(text) => out.push(text.clone()),
                ShaderSegment::Url(url) => {
                    debug!("fetching shader segment {}", url);
                    out.push(fetch_text(url).await?);
                }
            }
        }
        Ok(out)
    }

    /// The same config with every url segment replaced by its text.
    pub async fn resolved<F, Fut>(&self, fetch_text: F) -> Result<ShaderConfig, CanvasError>
    where
        F: Fn(&str) -> Fut,
        Fut: Future<Output = Result<String, CanvasError>>,
    {
        let segments = self.resolve_segments(fetch_text).await?;
        Ok(ShaderConfig {
            uniforms: self.uniforms.clone(),
            segments: segments.into_iter().map(ShaderSegment::Source).collect(),
        })
    }

    pub fn segments(&self) -> &[ShaderSegment] {
        &self.segments
    }
}

struct UniformSlot<G: GlContext> {
    descriptor: UniformDescriptor,
    location: Option<G::UniformLocation>,
}

pub struct FullCanvasShader<G: GlContext> {
    gl: Option<G>,
    shaders: ShaderStore<G>,
    textures: TextureRegistry<G>,
    program: G::Program,
    position_buffer: G::Buffer,
    resolution_location: Option<G::UniformLocation>,
    uniforms: HashMap<String, UniformSlot<G>>,
    internal_uniforms: HashMap<String, UniformSlot<G>>,
}

fn check_len(descriptor: &UniformDescriptor, expected: usize, got: usize) -> Result<(), CanvasError> {
    if expected == got {
        Ok(())
    } else {
        Err(CanvasError::validation(format!(
            "uniform {} of type {} takes {} values, got {}",
            descriptor.name, descriptor.ty, expected, got
        )))
    }
}

fn append(acc: &mut Option<UniformValue>, next: UniformValue) -> Result<(), CanvasError> {
    match (acc.as_mut(), next) {
        (None, next) => *acc = Some(next),
        (Some(UniformValue::Bools(a)), UniformValue::Bools(b)) => a.extend(b),
        (Some(UniformValue::Ints(a)), UniformValue::Ints(b)) => a.extend(b),
        (Some(UniformValue::UInts(a)), UniformValue::UInts(b)) => a.extend(b),
        (Some(UniformValue::Floats(a)), UniformValue::Floats(b)) => a.extend(b),
        (Some(_), other) => {
            return Err(CanvasError::Platform(format!(
                "inconsistent uniform element read back: {:?}",
                other
            )))
        }
    }
    Ok(())
}

impl<G: GlContext> FullCanvasShader<G> {
    /// Validates the configuration, fetches url segments, then builds the
    /// program.
    pub async fn create<F, Fut>(gl: G, config: &ShaderConfig, fetch_text: F) -> Result<FullCanvasShader<G>, CanvasError>
    where
        F: Fn(&str) -> Fut,
        Fut: Future<Output = Result<String, CanvasError>>,
    {
        let segments = config.resolve_segments(fetch_text).await?;
        FullCanvasShader::new(gl, config.uniforms.clone(), &segments)
    }

    pub fn new(gl: G, uniforms: Vec<UniformDescriptor>, segments: &[String]) -> Result<FullCanvasShader<G>, CanvasError> {
        let mut shaders = ShaderStore::new();
        let built = Self::build_program(&gl, &mut shaders, &uniforms, segments);
        let program = match built {
            Ok(program) => program,
            Err(e) => {
                shaders.delete_all_shaders(&gl);
                return Err(e);
            }
        };
        let position_buffer = match gl.create_buffer() {
            Ok(buffer) => buffer,
            Err(e) => {
                gl.delete_program(&program);
                shaders.delete_all_shaders(&gl);
                return Err(e);
            }
        };
        let attrib = gl.attrib_location(&program, VERTEX_POSITION_ATTRIB);
        gl.upload_vertices(&position_buffer, attrib, 2, &QUAD_VERTICES);
        let resolution_location = gl.uniform_location(&program, RESOLUTION_UNIFORM);

        let mut caller = HashMap::new();
        let mut internal = HashMap::new();
        for descriptor in uniforms {
            let location = gl.uniform_location(&program, &descriptor.name);
            if location.is_none() {
                warn!("uniform {} is not active in the linked program", descriptor.name);
            }
            let target = if descriptor.internal { &mut internal } else { &mut caller };
            target.insert(descriptor.name.clone(), UniformSlot { descriptor, location });
        }

        Ok(FullCanvasShader {
            textures: TextureRegistry::new(&gl),
            gl: Some(gl),
            shaders,
            program,
            position_buffer,
            resolution_location,
            uniforms: caller,
            internal_uniforms: internal,
        })
    }

    fn build_program(
        gl: &G,
        shaders: &mut ShaderStore<G>,
        uniforms: &[UniformDescriptor],
        segments: &[String],
    ) -> Result<G::Program, CanvasError> {
        let vertex = shaders.load_shader_from_string(gl, ShaderKind::Vertex, &vertex_source())?;
        let fragment = shaders.load_shader_from_string(
            gl,
            ShaderKind::Fragment,
            &fragment_source(uniforms, segments),
        )?;
        let program = gl.create_program()?;
        gl.attach_shader(&program, &vertex);
        gl.attach_shader(&program, &fragment);
        if let Err(log) = gl.link_program(&program) {
            gl.delete_program(&program);
            return Err(CanvasError::Link(log));
        }
        Ok(program)
    }

    fn gl(&self) -> Result<&G, CanvasError> {
        self.gl.as_ref().ok_or(CanvasError::Destroyed)
    }

    pub fn is_torn_down(&self) -> bool {
        self.gl.is_none()
    }

    pub fn resize_viewport(&self, width: u32, height: u32) -> Result<(), CanvasError> {
        let gl = self.gl()?;
        gl.viewport(width, height);
        gl.use_program(Some(&self.program));
        gl.uniform(
            self.resolution_location.as_ref(),
            UniformWrite::Float {
                components: 2,
                data: &[width as f32, height as f32],
            },
        );
        gl.use_program(None);
        Ok(())
    }

    pub fn render(&self) -> Result<(), CanvasError> {
        let gl = self.gl()?;
        // the quad covers every pixel, so no clear
        gl.use_program(Some(&self.program));
        gl.draw_triangle_strip(QUAD_VERTICES.len() as i32 / 2);
        gl.use_program(None);
        Ok(())
    }

    /// Frees the vertex buffer, the program, the shaders and the textures,
    /// in that order.
    pub fn tear_down(&mut self) -> Result<(), CanvasError> {
        let gl = self.gl.take().ok_or(CanvasError::AlreadyTornDown)?;
        gl.delete_buffer(&self.position_buffer);
        gl.delete_program(&self.program);
        self.shaders.delete_all_shaders(&gl);
        self.textures.delete_all_textures(&gl);
        self.uniforms.clear();
        self.internal_uniforms.clear();
        self.resolution_location = None;
        Ok(())
    }

    fn slot(&self, name: &str) -> Result<&UniformSlot<G>, CanvasError> {
        self.uniforms
            .get(name)
            .ok_or_else(|| CanvasError::UnknownUniform(name.to_string()))
    }

    pub fn uniform_type(&self, name: &str) -> Result<UniformType, CanvasError> {
        self.gl()?;
        Ok(self.slot(name)?.descriptor.ty)
    }

    pub fn get_uniform(&self, name: &str) -> Result<UniformValue, CanvasError> {
        let gl = self.gl()?;
        let slot = self.slot(name)?;
        let descriptor = &slot.descriptor;
        let kind = descriptor.ty.kind();
        let inactive = || CanvasError::validation(format!("uniform {} is not active in the program", name));
        match descriptor.length {
            None => {
                let location = slot.location.as_ref().ok_or_else(inactive)?;
                gl.read_uniform(&self.program, location, kind)
            }
            Some(length) => {
                let mut value = None;
                for i in 0..length {
                    let location = gl
                        .uniform_location(&self.program, &format!("{}[{}]", name, i))
                        .ok_or_else(inactive)?;
                    append(&mut value, gl.read_uniform(&self.program, &location, kind)?)?;
                }
                value.ok_or_else(inactive)
            }
        }
    }

    pub fn set_uniform(&self, name: &str, value: &UniformValue) -> Result<(), CanvasError> {
        let gl = self.gl()?;
        let slot = self.slot(name)?;
        gl.use_program(Some(&self.program));
        let result = self.write_uniform(gl, slot, value);
        gl.use_program(None);
        result
    }

    fn write_uniform(&self, gl: &G, slot: &UniformSlot<G>, value: &UniformValue) -> Result<(), CanvasError> {
        let descriptor = &slot.descriptor;
        let kind = descriptor.ty.kind();
        let components = kind.components();
        let expected = descriptor.total_components();
        let location = slot.location.as_ref();
        match (kind.scalar(), value) {
            (Scalar::Bool, UniformValue::Bools(values)) => {
                check_len(descriptor, expected, values.len())?;
                // booleans go through the signed integer calls
                let data: Vec<i32> = values.iter().map(|b| *b as i32).collect();
                gl.uniform(location, UniformWrite::Int { components, data: &data });
            }
            (Scalar::Bool, UniformValue::Ints(data)) | (Scalar::Int, UniformValue::Ints(data)) => {
                check_len(descriptor, expected, data.len())?;
                gl.uniform(location, UniformWrite::Int { components, data });
            }
            (Scalar::UInt, UniformValue::UInts(data)) => {
                check_len(descriptor, expected, data.len())?;
                gl.uniform(location, UniformWrite::UInt { components, data });
            }
            (Scalar::Float, UniformValue::Floats(data)) => {
                check_len(descriptor, expected, data.len())?;
                let write = match kind.matrix_shape() {
                    Some((cols, rows)) => UniformWrite::Matrix { cols, rows, data },
                    None => UniformWrite::Float { components, data },
                };
                gl.uniform(location, write);
            }
            (Scalar::Sampler, UniformValue::Textures(aliases)) => {
                check_len(descriptor, expected, aliases.len())?;
                let mut units = Vec::with_capacity(aliases.len());
                let mut dimensions = Vec::with_capacity(aliases.len() * 2);
                for alias in aliases {
                    units.push(self.textures.texture_id(alias)? as i32);
                    let (width, height) = self.textures.texture_dimensions(alias)?;
                    dimensions.push(width as f32);
                    dimensions.push(height as f32);
                }
                let companion = format!("{}{}", descriptor.name, TEXTURE_RESOLUTION_SUFFIX);
                let resolution = self
                    .internal_uniforms
                    .get(&companion)
                    .and_then(|slot| slot.location.as_ref());
                gl.uniform(location, UniformWrite::Int { components: 1, data: &units });
                gl.uniform(resolution, UniformWrite::Float { components: 2, data: &dimensions });
            }
            (_, other) => {
                return Err(CanvasError::validation(format!(
                    "uniform {} of type {} cannot be set from {:?}",
                    descriptor.name, descriptor.ty, other
                )))
            }
        }
        Ok(())
    }

    pub fn texture_names(&self) -> Result<Vec<String>, CanvasError> {
        self.gl()?;
        Ok(self.textures.texture_names())
    }

    pub fn has_texture(&self, alias: &str) -> Result<bool, CanvasError> {
        self.gl()?;
        Ok(self.textures.has_texture(alias))
    }

    pub fn ensure_alias_free(&self, alias: &str) -> Result<(), CanvasError> {
        self.gl()?;
        self.textures.ensure_alias_free(alias)
    }

    pub fn load_texture(&mut self, alias: &str, image: &G::Image) -> Result<u32, CanvasError> {
        let gl = self.gl.as_ref().ok_or(CanvasError::Destroyed)?;
        self.textures.load_texture(gl, alias, image)
    }

    pub fn delete_texture(&mut self, alias: &str) -> Result<(), CanvasError> {
        let gl = self.gl.as_ref().ok_or(CanvasError::Destroyed)?;
        self.textures.delete_texture(gl, alias)
    }

    pub fn delete_all_textures(&mut self) -> Result<(), CanvasError> {
        let gl = self.gl.as_ref().ok_or(CanvasError::Destroyed)?;
        self.textures.delete_all_textures(gl);
        Ok(())
    }

    pub fn texture_id(&self, alias: &str) -> Result<u32, CanvasError> {
        self.gl()?;
        self.textures.texture_id(alias)
    }

    pub fn texture_dimensions(&self, alias: &str) -> Result<(u32, u32), CanvasError> {
        self.gl()?;
        self.textures.texture_dimensions(alias)
    }
}
