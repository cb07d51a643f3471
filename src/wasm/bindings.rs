//! The JavaScript face of [`CanvasManager`].
//!
//! Option bags and uniform values arrive loosely typed; they are checked here
//! and turned into the crate's typed configuration before the core sees them.

use std::rc::Rc;

use anyhow::anyhow;
use js_sys::{Array, Float32Array, Function, Int32Array, Object, Promise, Reflect, Uint32Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{HtmlCanvasElement, HtmlElement, HtmlVideoElement, ImageBitmap, ImageData};

use super::gl::WebImage;
use super::host::{describe, js_error, WebHost};
use crate::error::CanvasError;
use crate::frame_rate::{FrameRate, FrameRateMode};
use crate::full_canvas::ShaderSegment;
use crate::manager::{CanvasManager, CanvasOptions};
use crate::mode::CanvasMode;
use crate::texture::TextureData;
use crate::triggers::{TriggerFuture, Triggers};
use crate::uniform::{Scalar, UniformDecl, UniformType, UniformValue};

impl From<CanvasError> for JsValue {
    fn from(err: CanvasError) -> JsValue {
        js_sys::Error::new(&err.to_string()).into()
    }
}

fn get(target: &JsValue, key: &str) -> Result<JsValue, CanvasError> {
    Reflect::get(target, &JsValue::from_str(key)).map_err(js_error)
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), CanvasError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(js_error)
}

fn is_absent(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

fn string_field(target: &JsValue, key: &str, what: &str) -> Result<String, CanvasError> {
    get(target, key)?
        .as_string()
        .ok_or_else(|| CanvasError::validation(format!("{}.{} must be a string", what, key)))
}

fn array_items(value: &JsValue, what: &str) -> Result<Vec<JsValue>, CanvasError> {
    if !Array::is_array(value) {
        return Err(CanvasError::validation(format!("{} must be an array", what)));
    }
    Ok(Array::from(value).to_vec())
}

fn parse_frame_rate(value: &JsValue) -> Result<FrameRate, CanvasError> {
    if !value.is_object() {
        return Err(CanvasError::validation("frameRate must be an object"));
    }
    let mode: FrameRateMode = string_field(value, "mode", "frameRate")?.parse()?;
    let param = match mode {
        FrameRateMode::FrameMult => get(value, "frameSkips")?.as_f64(),
        FrameRateMode::Millisecond => get(value, "delay")?.as_f64(),
        FrameRateMode::None | FrameRateMode::ResizeOnly => None,
    };
    FrameRate::from_parts(mode, param)
}

fn frame_rate_object(frame_rate: FrameRate) -> Result<JsValue, CanvasError> {
    let object = Object::new();
    set(&object, "mode", &JsValue::from_str(frame_rate.mode().as_str()))?;
    match frame_rate {
        FrameRate::FrameMult { frame_skips } => set(&object, "frameSkips", &frame_skips.into())?,
        FrameRate::Millisecond { delay } => set(&object, "delay", &delay.into())?,
        FrameRate::None | FrameRate::ResizeOnly => {}
    }
    Ok(object.into())
}

fn parse_uniform(value: &JsValue) -> Result<UniformDecl, CanvasError> {
    if let Some(text) = value.as_string() {
        return Ok(UniformDecl::Glsl(text));
    }
    if !value.is_object() {
        return Err(CanvasError::validation("uniform must be a string or an object"));
    }
    let name = string_field(value, "name", "uniform")?;
    let ty: UniformType = string_field(value, "type", "uniform")?.parse()?;
    let length = get(value, "length")?;
    let length = if is_absent(&length) {
        None
    } else {
        match length.as_f64() {
            Some(n) if n.fract() == 0.0 && n >= 1.0 && n <= u32::MAX as f64 => Some(n as u32),
            _ => {
                return Err(CanvasError::validation(format!(
                    "uniform {} length must be a positive integer",
                    name
                )))
            }
        }
    };
    Ok(UniformDecl::Structured { name, ty, length })
}

fn parse_segment(value: &JsValue) -> Result<ShaderSegment, CanvasError> {
    match string_field(value, "type", "shaderSegment")?.as_str() {
        "STRING" => Ok(ShaderSegment::Source(string_field(value, "content", "shaderSegment")?)),
        "URL" => Ok(ShaderSegment::Url(string_field(value, "url", "shaderSegment")?)),
        other => Err(CanvasError::UnknownVariant {
            kind: "shaderSegment.type",
            value: other.to_string(),
        }),
    }
}

fn parse_options(opts: &JsValue) -> Result<CanvasOptions, CanvasError> {
    if !opts.is_object() {
        return Err(CanvasError::validation("setCanvasMode expects an options object"));
    }
    let mode: CanvasMode = string_field(opts, "mode", "options")?.parse()?;
    let mut options = CanvasOptions::new(mode);

    let frame_rate = get(opts, "frameRate")?;
    let frame_rate = if is_absent(&frame_rate) {
        FrameRate::None
    } else {
        parse_frame_rate(&frame_rate)?
    };
    options = options.frame_rate(frame_rate);

    let triggers = get(opts, "triggers")?;
    if !is_absent(&triggers) {
        let triggers = JsTriggers::parse(&triggers)?;
        if triggers.render.is_none() && frame_rate != FrameRate::None {
            return Err(CanvasError::validation("triggers.render must be a function"));
        }
        options = options.triggers(Rc::new(triggers));
    }

    let uniforms = get(opts, "uniforms")?;
    if !is_absent(&uniforms) {
        for uniform in array_items(&uniforms, "uniforms")? {
            options = options.uniform(parse_uniform(&uniform)?);
        }
    }

    let segments = get(opts, "shaderSegments")?;
    if !is_absent(&segments) {
        for segment in array_items(&segments, "shaderSegments")? {
            options = options.shader_segment(parse_segment(&segment)?);
        }
    }
    Ok(options)
}

/// Trigger functions from an options bag. A trigger may return a Promise,
/// which is awaited.
struct JsTriggers {
    setup: Option<Function>,
    render: Option<Function>,
    tear_down: Option<Function>,
}

impl JsTriggers {
    fn parse(value: &JsValue) -> Result<JsTriggers, CanvasError> {
        let function = |key: &str| -> Result<Option<Function>, CanvasError> {
            let value = get(value, key)?;
            if is_absent(&value) {
                return Ok(None);
            }
            value
                .dyn_into::<Function>()
                .map(Some)
                .map_err(|_| CanvasError::validation(format!("triggers.{} must be a function", key)))
        };
        Ok(JsTriggers {
            setup: function("setup")?,
            render: function("render")?,
            tear_down: function("tearDown")?,
        })
    }
}

async fn call_trigger(function: Option<&Function>) -> anyhow::Result<()> {
    let Some(function) = function else {
        return Ok(());
    };
    let returned = function
        .call0(&JsValue::UNDEFINED)
        .map_err(|e| anyhow!(describe(&e)))?;
    if let Ok(promise) = returned.dyn_into::<Promise>() {
        JsFuture::from(promise).await.map_err(|e| anyhow!(describe(&e)))?;
    }
    Ok(())
}

impl Triggers for JsTriggers {
    fn setup(&self) -> TriggerFuture<'_> {
        Box::pin(call_trigger(self.setup.as_ref()))
    }

    fn render(&self) -> TriggerFuture<'_> {
        Box::pin(call_trigger(self.render.as_ref()))
    }

    fn tear_down(&self) -> TriggerFuture<'_> {
        Box::pin(call_trigger(self.tear_down.as_ref()))
    }

    fn has_render(&self) -> bool {
        self.render.is_some()
    }
}

fn numbers(items: &[JsValue], name: &str) -> Result<Vec<f64>, CanvasError> {
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .ok_or_else(|| CanvasError::validation(format!("uniform {} expects numbers", name)))
        })
        .collect()
}

fn integers(items: &[JsValue], name: &str, min: f64, max: f64) -> Result<Vec<f64>, CanvasError> {
    let values = numbers(items, name)?;
    if values.iter().any(|n| n.fract() != 0.0 || *n < min || *n > max) {
        return Err(CanvasError::validation(format!(
            "uniform {} expects integers in [{}, {}]",
            name, min, max
        )));
    }
    Ok(values)
}

/// Converts a JS value to the shape the uniform's type calls for. Scalars
/// and flat (typed) arrays are both accepted.
fn to_uniform_value(name: &str, ty: UniformType, value: &JsValue) -> Result<UniformValue, CanvasError> {
    let items = if value.is_object() {
        Array::from(value).to_vec()
    } else {
        vec![value.clone()]
    };
    Ok(match ty.kind().scalar() {
        Scalar::Bool => UniformValue::Bools(
            items
                .iter()
                .map(|item| item.as_bool().or_else(|| item.as_f64().map(|n| n != 0.0)))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| CanvasError::validation(format!("uniform {} expects booleans", name)))?,
        ),
        Scalar::Int => UniformValue::Ints(
            integers(&items, name, i32::MIN as f64, i32::MAX as f64)?
                .into_iter()
                .map(|n| n as i32)
                .collect(),
        ),
        Scalar::UInt => UniformValue::UInts(
            integers(&items, name, 0.0, u32::MAX as f64)?
                .into_iter()
                .map(|n| n as u32)
                .collect(),
        ),
        Scalar::Float => UniformValue::Floats(numbers(&items, name)?.into_iter().map(|n| n as f32).collect()),
        Scalar::Sampler => UniformValue::Textures(
            items
                .iter()
                .map(|item| item.as_string())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| CanvasError::validation(format!("uniform {} expects texture aliases", name)))?,
        ),
    })
}

fn from_uniform_value(value: UniformValue, array: bool) -> JsValue {
    if !array && value.len() == 1 {
        return match value {
            UniformValue::Bools(v) => JsValue::from_bool(v[0]),
            UniformValue::Ints(v) => JsValue::from(v[0]),
            UniformValue::UInts(v) => JsValue::from(v[0]),
            UniformValue::Floats(v) => JsValue::from(v[0]),
            UniformValue::Textures(v) => JsValue::from_str(&v[0]),
        };
    }
    match value {
        UniformValue::Bools(v) => v.into_iter().map(JsValue::from_bool).collect::<Array>().into(),
        UniformValue::Ints(v) => Int32Array::from(&v[..]).into(),
        UniformValue::UInts(v) => Uint32Array::from(&v[..]).into(),
        UniformValue::Floats(v) => Float32Array::from(&v[..]).into(),
        UniformValue::Textures(v) => v.into_iter().map(JsValue::from).collect::<Array>().into(),
    }
}

fn parse_image(value: JsValue) -> Result<TextureData<WebImage>, CanvasError> {
    if let Some(url) = value.as_string() {
        return Ok(TextureData::Url(url));
    }
    let image = if let Some(image) = value.dyn_ref::<web_sys::HtmlImageElement>() {
        WebImage::Image(image.clone())
    } else if let Some(bitmap) = value.dyn_ref::<ImageBitmap>() {
        WebImage::Bitmap(bitmap.clone())
    } else if let Some(data) = value.dyn_ref::<ImageData>() {
        WebImage::Data(data.clone())
    } else if let Some(canvas) = value.dyn_ref::<HtmlCanvasElement>() {
        WebImage::Canvas(canvas.clone())
    } else if let Some(video) = value.dyn_ref::<HtmlVideoElement>() {
        WebImage::Video(video.clone())
    } else {
        return Err(CanvasError::validation("texture data must be a url or an image source"));
    };
    Ok(TextureData::Image(image))
}

#[wasm_bindgen(js_name = CanvasManager)]
pub struct JsCanvasManager {
    manager: CanvasManager<WebHost>,
}

#[wasm_bindgen(js_class = CanvasManager)]
impl JsCanvasManager {
    #[wasm_bindgen(constructor)]
    pub fn new(container: HtmlElement) -> Result<JsCanvasManager, JsValue> {
        Ok(JsCanvasManager {
            manager: CanvasManager::new(WebHost::new(container)?),
        })
    }

    #[wasm_bindgen(js_name = getCanvasContainer)]
    pub fn get_canvas_container(&self) -> Result<HtmlElement, JsValue> {
        Ok(self.manager.host()?.container().clone())
    }

    #[wasm_bindgen(js_name = getCanvasMode)]
    pub fn get_canvas_mode(&self) -> Result<String, JsValue> {
        Ok(self.manager.get_canvas_mode()?.as_str().to_string())
    }

    /// Option errors throw here; everything later rejects the promise.
    #[wasm_bindgen(js_name = setCanvasMode)]
    pub fn set_canvas_mode(&self, opts: JsValue) -> Result<Promise, JsValue> {
        let options = parse_options(&opts)?;
        let manager = self.manager.clone();
        Ok(future_to_promise(async move {
            manager.set_canvas_mode(options).await?;
            Ok(JsValue::UNDEFINED)
        }))
    }

    #[wasm_bindgen(js_name = getCanvasPixelsPerDisplayPixel)]
    pub fn get_canvas_pixels_per_display_pixel(&self) -> Result<f64, JsValue> {
        Ok(self.manager.get_canvas_pixels_per_display_pixel()?)
    }

    #[wasm_bindgen(js_name = setCanvasPixelsPerDisplayPixel)]
    pub fn set_canvas_pixels_per_display_pixel(&self, ratio: f64) -> Result<(), JsValue> {
        Ok(self.manager.set_canvas_pixels_per_display_pixel(ratio)?)
    }

    /// `[width, height]`, or `[null, null]` without a canvas.
    #[wasm_bindgen(js_name = getCanvasSize)]
    pub fn get_canvas_size(&self) -> Array {
        match self.manager.get_canvas_size() {
            Some((width, height)) => Array::of2(&width.into(), &height.into()),
            None => Array::of2(&JsValue::NULL, &JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = getCanvas)]
    pub fn get_canvas(&self) -> Result<HtmlCanvasElement, JsValue> {
        Ok(self.manager.get_canvas()?)
    }

    #[wasm_bindgen(js_name = getContext)]
    pub fn get_context(&self) -> Result<JsValue, JsValue> {
        Ok(self.manager.get_context()?.map(JsValue::from).unwrap_or(JsValue::NULL))
    }

    #[wasm_bindgen(js_name = getFrameRate)]
    pub fn get_frame_rate(&self) -> Result<JsValue, JsValue> {
        match self.manager.get_frame_rate()? {
            Some(frame_rate) => Ok(frame_rate_object(frame_rate)?),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = setFrameRate)]
    pub fn set_frame_rate(&self, config: JsValue) -> Result<Promise, JsValue> {
        let frame_rate = parse_frame_rate(&config)?;
        let manager = self.manager.clone();
        Ok(future_to_promise(async move {
            manager.set_frame_rate(frame_rate).await?;
            Ok(JsValue::UNDEFINED)
        }))
    }

    #[wasm_bindgen(js_name = managerEditable)]
    pub fn manager_editable(&self) -> bool {
        self.manager.manager_editable()
    }

    #[wasm_bindgen(js_name = awaitManagerEditable)]
    pub fn await_manager_editable(&self) -> Promise {
        let manager = self.manager.clone();
        future_to_promise(async move {
            manager.await_manager_editable().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = forceRender)]
    pub fn force_render(&self) -> Promise {
        let manager = self.manager.clone();
        future_to_promise(async move {
            manager.force_render().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = gracefulShutdown)]
    pub fn graceful_shutdown(&self) -> Promise {
        let manager = self.manager.clone();
        future_to_promise(async move {
            manager.graceful_shutdown().await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = uniformType)]
    pub fn uniform_type(&self, name: &str) -> Result<String, JsValue> {
        Ok(self.manager.uniform_type(name)?.to_string())
    }

    /// Scalars come back as numbers or booleans, everything else as a flat
    /// typed array.
    #[wasm_bindgen(js_name = getUniform)]
    pub fn get_uniform(&self, name: &str) -> Result<JsValue, JsValue> {
        let ty = self.manager.uniform_type(name)?;
        let single = !ty.is_array() && ty.kind().components() == 1;
        Ok(from_uniform_value(self.manager.get_uniform(name)?, !single))
    }

    #[wasm_bindgen(js_name = setUniform)]
    pub fn set_uniform(&self, name: &str, value: JsValue) -> Result<(), JsValue> {
        let ty = self.manager.uniform_type(name)?;
        let value = to_uniform_value(name, ty, &value)?;
        Ok(self.manager.set_uniform(name, value)?)
    }

    #[wasm_bindgen(js_name = currentTextureNames)]
    pub fn current_texture_names(&self) -> Result<Array, JsValue> {
        Ok(self
            .manager
            .current_texture_names()?
            .into_iter()
            .map(JsValue::from)
            .collect())
    }

    #[wasm_bindgen(js_name = hasTexture)]
    pub fn has_texture(&self, alias: &str) -> Result<bool, JsValue> {
        Ok(self.manager.has_texture(alias)?)
    }

    /// Accepts `{ data, alias }`, or a bare url. Resolves to the texture
    /// unit.
    #[wasm_bindgen(js_name = loadTexture)]
    pub fn load_texture(&self, opts: JsValue) -> Result<Promise, JsValue> {
        let (data, alias) = if opts.is_string() {
            (parse_image(opts)?, None)
        } else if opts.is_object() {
            let alias = get(&opts, "alias")?;
            let alias = if is_absent(&alias) {
                None
            } else {
                Some(
                    alias
                        .as_string()
                        .ok_or_else(|| CanvasError::validation("alias must be a string"))?,
                )
            };
            (parse_image(get(&opts, "data")?)?, alias)
        } else {
            return Err(CanvasError::validation("loadTexture expects { data, alias }").into());
        };
        let manager = self.manager.clone();
        Ok(future_to_promise(async move {
            let unit = manager.load_texture(data, alias.as_deref()).await?;
            Ok(JsValue::from(unit))
        }))
    }

    #[wasm_bindgen(js_name = deleteTexture)]
    pub fn delete_texture(&self, alias: &str) -> Result<(), JsValue> {
        Ok(self.manager.delete_texture(alias)?)
    }

    #[wasm_bindgen(js_name = deleteAllTextures)]
    pub fn delete_all_textures(&self) -> Result<(), JsValue> {
        Ok(self.manager.delete_all_textures()?)
    }

    #[wasm_bindgen(js_name = getTextureID)]
    pub fn get_texture_id(&self, alias: &str) -> Result<u32, JsValue> {
        Ok(self.manager.get_texture_id(alias)?)
    }

    /// `{ width, height }` of the uploaded image.
    #[wasm_bindgen(js_name = getTextureDimensions)]
    pub fn get_texture_dimensions(&self, alias: &str) -> Result<JsValue, JsValue> {
        let (width, height) = self.manager.get_texture_dimensions(alias)?;
        let object = Object::new();
        set(&object, "width", &width.into())?;
        set(&object, "height", &height.into())?;
        Ok(object.into())
    }
}

/// Changes the console log level (`"error"`, `"warn"`, `"info"`, `"debug"`,
/// `"trace"`).
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: &str) -> Result<(), JsValue> {
    let level: log::Level = level
        .parse()
        .map_err(|_| CanvasError::UnknownVariant {
            kind: "log level",
            value: level.to_string(),
        })?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}
