//! Lifecycle management for a single canvas inside a container element:
//! mode switching, an interruptible render loop, resize tracking, and a
//! full-canvas fragment shader mode with uniforms and textures.
//!
//! The core is generic over [`platform::Host`] and [`gl::GlContext`] so it
//! runs anywhere; the browser implementation is only compiled for wasm32.

pub mod error;
pub mod frame_rate;
pub mod full_canvas;
pub mod gl;
pub mod lock;
pub mod manager;
pub mod mode;
pub mod platform;
pub mod render_loop;
pub mod shader;
pub mod texture;
pub mod triggers;
pub mod uniform;

pub use error::CanvasError;
pub use frame_rate::{FrameRate, FrameRateMode};
pub use full_canvas::{FullCanvasShader, ShaderSegment};
pub use lock::EditLock;
pub use manager::{CanvasManager, CanvasOptions};
pub use mode::CanvasMode;
pub use texture::TextureData;
pub use triggers::{TriggerFuture, Triggers};
pub use uniform::{UniformDecl, UniformType, UniformValue};

// Only compile browser code when targeting wasm32.
#[cfg(target_arch = "wasm32")]
mod wasm {
    use wasm_bindgen::prelude::*;

    mod bindings;
    mod gl;
    mod host;
    mod wait;

    pub use bindings::JsCanvasManager;
    pub use gl::{WebGl, WebImage};
    pub use host::{ResizeWatch, WebHost};

    #[wasm_bindgen(start)]
    pub fn start() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm::{JsCanvasManager, ResizeWatch, WebGl, WebHost, WebImage};
