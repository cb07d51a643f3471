//! The slice of WebGL2 used by the full-canvas shader session.

use crate::error::CanvasError;
use crate::uniform::{UniformKind, UniformValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

/// Pixel dimensions of something that can be uploaded as a texture.
pub trait ImageSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// One `uniform*` call. Scalars use the same calls as their arrays, with a
/// single element's worth of data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformWrite<'a> {
    /// `uniform{components}iv`; also used for booleans and sampler units.
    Int { components: u8, data: &'a [i32] },
    /// `uniform{components}uiv`
    UInt { components: u8, data: &'a [u32] },
    /// `uniform{components}fv`
    Float { components: u8, data: &'a [f32] },
    /// `uniformMatrix{cols}x{rows}fv`, column major, never transposed.
    Matrix { cols: u8, rows: u8, data: &'a [f32] },
}

pub trait GlContext {
    type Shader: Clone + PartialEq;
    type Program: Clone;
    type Buffer;
    type Texture;
    type UniformLocation: Clone;
    type Image: ImageSource;

    fn create_shader(&self, kind: ShaderKind) -> Result<Self::Shader, CanvasError>;
    /// Sets the source and compiles. On failure returns the info log.
    fn compile_shader(&self, shader: &Self::Shader, source: &str) -> Result<(), String>;
    fn delete_shader(&self, shader: &Self::Shader);

    fn create_program(&self) -> Result<Self::Program, CanvasError>;
    fn attach_shader(&self, program: &Self::Program, shader: &Self::Shader);
    /// Links the program. On failure returns the info log.
    fn link_program(&self, program: &Self::Program) -> Result<(), String>;
    fn use_program(&self, program: Option<&Self::Program>);
    fn delete_program(&self, program: &Self::Program);

    fn attrib_location(&self, program: &Self::Program, name: &str) -> i32;
    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<Self::UniformLocation>;

    fn create_buffer(&self) -> Result<Self::Buffer, CanvasError>;
    /// Uploads static vertex data and points `attrib` at it, `components`
    /// floats per vertex.
    fn upload_vertices(&self, buffer: &Self::Buffer, attrib: i32, components: i32, data: &[f32]);
    fn delete_buffer(&self, buffer: &Self::Buffer);

    fn viewport(&self, width: u32, height: u32);
    fn draw_triangle_strip(&self, count: i32);

    fn uniform(&self, location: Option<&Self::UniformLocation>, write: UniformWrite<'_>);
    /// Reads back a single (non-array) uniform of the given kind.
    fn read_uniform(
        &self,
        program: &Self::Program,
        location: &Self::UniformLocation,
        kind: UniformKind,
    ) -> Result<UniformValue, CanvasError>;

    fn max_texture_units(&self) -> u32;
    fn create_texture(&self) -> Result<Self::Texture, CanvasError>;
    /// Binds `texture` to texture unit `unit` and uploads `image` as RGBA.
    fn upload_texture(&self, unit: u32, texture: &Self::Texture, image: &Self::Image) -> Result<(), CanvasError>;
    /// Unbinds texture unit `unit` and frees `texture`.
    fn delete_texture(&self, unit: u32, texture: &Self::Texture);
}
