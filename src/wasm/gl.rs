use js_sys::Float32Array;
use wasm_bindgen::JsValue;
use web_sys::{
    HtmlCanvasElement, HtmlImageElement, HtmlVideoElement, ImageBitmap, ImageData,
    WebGl2RenderingContext as GL, WebGlBuffer, WebGlProgram, WebGlShader, WebGlTexture,
    WebGlUniformLocation,
};

use super::host::js_error;
use crate::error::CanvasError;
use crate::gl::{GlContext, ImageSource, ShaderKind, UniformWrite};
use crate::uniform::{Scalar, UniformKind, UniformValue};

// the floor WebGL2 guarantees for MAX_COMBINED_TEXTURE_IMAGE_UNITS
const MIN_COMBINED_TEXTURE_UNITS: u32 = 32;

/// Anything `texImage2D` accepts as a source.
#[derive(Clone, Debug)]
pub enum WebImage {
    Image(HtmlImageElement),
    Bitmap(ImageBitmap),
    Data(ImageData),
    Canvas(HtmlCanvasElement),
    Video(HtmlVideoElement),
}

impl ImageSource for WebImage {
    fn width(&self) -> u32 {
        match self {
            WebImage::Image(image) => image.natural_width(),
            WebImage::Bitmap(bitmap) => bitmap.width(),
            WebImage::Data(data) => data.width(),
            WebImage::Canvas(canvas) => canvas.width(),
            WebImage::Video(video) => video.video_width(),
        }
    }

    fn height(&self) -> u32 {
        match self {
            WebImage::Image(image) => image.natural_height(),
            WebImage::Bitmap(bitmap) => bitmap.height(),
            WebImage::Data(data) => data.height(),
            WebImage::Canvas(canvas) => canvas.height(),
            WebImage::Video(video) => video.video_height(),
        }
    }
}

#[derive(Clone)]
pub struct WebGl {
    gl: GL,
}

impl WebGl {
    pub fn new(gl: GL) -> WebGl {
        WebGl { gl }
    }

    pub fn context(&self) -> &GL {
        &self.gl
    }
}

fn numbers(value: &JsValue) -> Vec<f64> {
    match value.as_f64() {
        Some(n) => vec![n],
        None => js_sys::Array::from(value).iter().filter_map(|v| v.as_f64()).collect(),
    }
}

fn bools(value: &JsValue) -> Vec<bool> {
    match value.as_bool() {
        Some(b) => vec![b],
        None => js_sys::Array::from(value).iter().map(|v| v.is_truthy()).collect(),
    }
}

impl GlContext for WebGl {
    type Shader = WebGlShader;
    type Program = WebGlProgram;
    type Buffer = WebGlBuffer;
    type Texture = WebGlTexture;
    type UniformLocation = WebGlUniformLocation;
    type Image = WebImage;

    fn create_shader(&self, kind: ShaderKind) -> Result<WebGlShader, CanvasError> {
        let kind = match kind {
            ShaderKind::Vertex => GL::VERTEX_SHADER,
            ShaderKind::Fragment => GL::FRAGMENT_SHADER,
        };
        self.gl
            .create_shader(kind)
            .ok_or_else(|| CanvasError::Platform("unable to create shader object".into()))
    }

    fn compile_shader(&self, shader: &WebGlShader, source: &str) -> Result<(), String> {
        self.gl.shader_source(shader, source);
        self.gl.compile_shader(shader);
        let compiled = self
            .gl
            .get_shader_parameter(shader, GL::COMPILE_STATUS)
            .as_bool()
            .unwrap_or(false);
        if compiled {
            Ok(())
        } else {
            Err(self
                .gl
                .get_shader_info_log(shader)
                .unwrap_or_else(|| "unknown error creating shader".into()))
        }
    }

    fn delete_shader(&self, shader: &WebGlShader) {
        self.gl.delete_shader(Some(shader));
    }

    fn create_program(&self) -> Result<WebGlProgram, CanvasError> {
        self.gl
            .create_program()
            .ok_or_else(|| CanvasError::Platform("unable to create program object".into()))
    }

    fn attach_shader(&self, program: &WebGlProgram, shader: &WebGlShader) {
        self.gl.attach_shader(program, shader);
    }

    fn link_program(&self, program: &WebGlProgram) -> Result<(), String> {
        self.gl.link_program(program);
        let linked = self
            .gl
            .get_program_parameter(program, GL::LINK_STATUS)
            .as_bool()
            .unwrap_or(false);
        if linked {
            Ok(())
        } else {
            Err(self
                .gl
                .get_program_info_log(program)
                .unwrap_or_else(|| "unknown error creating program".into()))
        }
    }

    fn use_program(&self, program: Option<&WebGlProgram>) {
        self.gl.use_program(program);
    }

    fn delete_program(&self, program: &WebGlProgram) {
        self.gl.delete_program(Some(program));
    }

    fn attrib_location(&self, program: &WebGlProgram, name: &str) -> i32 {
        self.gl.get_attrib_location(program, name)
    }

    fn uniform_location(&self, program: &WebGlProgram, name: &str) -> Option<WebGlUniformLocation> {
        self.gl.get_uniform_location(program, name)
    }

    fn create_buffer(&self) -> Result<WebGlBuffer, CanvasError> {
        self.gl
            .create_buffer()
            .ok_or_else(|| CanvasError::Platform("unable to create buffer".into()))
    }

    fn upload_vertices(&self, buffer: &WebGlBuffer, attrib: i32, components: i32, data: &[f32]) {
        self.gl.bind_buffer(GL::ARRAY_BUFFER, Some(buffer));
        let array = Float32Array::from(data);
        self.gl
            .buffer_data_with_array_buffer_view(GL::ARRAY_BUFFER, &array, GL::STATIC_DRAW);
        // -1 means the attribute was optimised away
        if attrib >= 0 {
            let attrib = attrib as u32;
            self.gl
                .vertex_attrib_pointer_with_i32(attrib, components, GL::FLOAT, false, 0, 0);
            self.gl.enable_vertex_attrib_array(attrib);
        }
    }

    fn delete_buffer(&self, buffer: &WebGlBuffer) {
        self.gl.delete_buffer(Some(buffer));
    }

    fn viewport(&self, width: u32, height: u32) {
        self.gl.viewport(0, 0, width as i32, height as i32);
    }

    fn draw_triangle_strip(&self, count: i32) {
        self.gl.draw_arrays(GL::TRIANGLE_STRIP, 0, count);
    }

    fn uniform(&self, location: Option<&WebGlUniformLocation>, write: UniformWrite<'_>) {
        let gl = &self.gl;
        match write {
            UniformWrite::Int { components, data } => match components {
                1 => gl.uniform1iv_with_i32_array(location, data),
                2 => gl.uniform2iv_with_i32_array(location, data),
                3 => gl.uniform3iv_with_i32_array(location, data),
                _ => gl.uniform4iv_with_i32_array(location, data),
            },
            UniformWrite::UInt { components, data } => match components {
                1 => gl.uniform1uiv_with_u32_array(location, data),
                2 => gl.uniform2uiv_with_u32_array(location, data),
                3 => gl.uniform3uiv_with_u32_array(location, data),
                _ => gl.uniform4uiv_with_u32_array(location, data),
            },
            UniformWrite::Float { components, data } => match components {
                1 => gl.uniform1fv_with_f32_array(location, data),
                2 => gl.uniform2fv_with_f32_array(location, data),
                3 => gl.uniform3fv_with_f32_array(location, data),
                _ => gl.uniform4fv_with_f32_array(location, data),
            },
            UniformWrite::Matrix { cols, rows, data } => match (cols, rows) {
                (2, 2) => gl.uniform_matrix2fv_with_f32_array(location, false, data),
                (2, 3) => gl.uniform_matrix2x3fv_with_f32_array(location, false, data),
                (2, 4) => gl.uniform_matrix2x4fv_with_f32_array(location, false, data),
                (3, 2) => gl.uniform_matrix3x2fv_with_f32_array(location, false, data),
                (3, 3) => gl.uniform_matrix3fv_with_f32_array(location, false, data),
                (3, 4) => gl.uniform_matrix3x4fv_with_f32_array(location, false, data),
                (4, 2) => gl.uniform_matrix4x2fv_with_f32_array(location, false, data),
                (4, 3) => gl.uniform_matrix4x3fv_with_f32_array(location, false, data),
                _ => gl.uniform_matrix4fv_with_f32_array(location, false, data),
            },
        }
    }

    fn read_uniform(
        &self,
        program: &WebGlProgram,
        location: &WebGlUniformLocation,
        kind: UniformKind,
    ) -> Result<UniformValue, CanvasError> {
        let value = self.gl.get_uniform(program, location);
        if value.is_null() || value.is_undefined() {
            return Err(CanvasError::Platform(format!("could not read {} uniform", kind.tag())));
        }
        Ok(match kind.scalar() {
            Scalar::Bool => UniformValue::Bools(bools(&value)),
            Scalar::Int | Scalar::Sampler => {
                UniformValue::Ints(numbers(&value).into_iter().map(|n| n as i32).collect())
            }
            Scalar::UInt => UniformValue::UInts(numbers(&value).into_iter().map(|n| n as u32).collect()),
            Scalar::Float => UniformValue::Floats(numbers(&value).into_iter().map(|n| n as f32).collect()),
        })
    }

    fn max_texture_units(&self) -> u32 {
        self.gl
            .get_parameter(GL::MAX_COMBINED_TEXTURE_IMAGE_UNITS)
            .ok()
            .and_then(|v| v.as_f64())
            .map(|v| v as u32)
            .unwrap_or(MIN_COMBINED_TEXTURE_UNITS)
    }

    fn create_texture(&self) -> Result<WebGlTexture, CanvasError> {
        self.gl
            .create_texture()
            .ok_or_else(|| CanvasError::Platform("unable to create texture".into()))
    }

    fn upload_texture(&self, unit: u32, texture: &WebGlTexture, image: &WebImage) -> Result<(), CanvasError> {
        let gl = &self.gl;
        gl.active_texture(GL::TEXTURE0 + unit);
        gl.bind_texture(GL::TEXTURE_2D, Some(texture));
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_WRAP_S, GL::CLAMP_TO_EDGE as i32);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_WRAP_T, GL::CLAMP_TO_EDGE as i32);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_MIN_FILTER, GL::LINEAR as i32);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_MAG_FILTER, GL::LINEAR as i32);
        let (target, level, internal, format, ty) = (GL::TEXTURE_2D, 0, GL::RGBA as i32, GL::RGBA, GL::UNSIGNED_BYTE);
        match image {
            WebImage::Image(source) => {
                gl.tex_image_2d_with_u32_and_u32_and_html_image_element(target, level, internal, format, ty, source)
            }
            WebImage::Bitmap(source) => {
                gl.tex_image_2d_with_u32_and_u32_and_image_bitmap(target, level, internal, format, ty, source)
            }
            WebImage::Data(source) => {
                gl.tex_image_2d_with_u32_and_u32_and_image_data(target, level, internal, format, ty, source)
            }
            WebImage::Canvas(source) => {
                gl.tex_image_2d_with_u32_and_u32_and_html_canvas_element(target, level, internal, format, ty, source)
            }
            WebImage::Video(source) => {
                gl.tex_image_2d_with_u32_and_u32_and_html_video_element(target, level, internal, format, ty, source)
            }
        }
        .map_err(js_error)
    }

    fn delete_texture(&self, unit: u32, texture: &WebGlTexture) {
        self.gl.active_texture(GL::TEXTURE0 + unit);
        self.gl.bind_texture(GL::TEXTURE_2D, None);
        self.gl.delete_texture(Some(texture));
    }
}
