//! Seams between the canvas core and the browser.
//!
//! The core only talks to the page through these traits; the `wasm` module
//! implements them on top of `web-sys`.

use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::error::CanvasError;
use crate::gl::GlContext;
use crate::mode::ContextKind;

/// Timing and task primitives of the event loop.
pub trait Scheduler: Clone + 'static {
    /// Resolves at the next display refresh. Dropping it cancels the request.
    fn next_frame(&self) -> LocalBoxFuture<'static, ()>;

    /// Resolves after `millis` milliseconds. Dropping it clears the timer.
    fn sleep(&self, millis: u32) -> LocalBoxFuture<'static, ()>;

    fn page_visible(&self) -> bool;

    /// Resolves at the next page visibility change.
    fn visibility_change(&self) -> LocalBoxFuture<'static, ()>;

    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

/// The page hosting one managed canvas inside one container element.
pub trait Host: Scheduler {
    type Canvas: Clone + 'static;
    type Context: Clone + 'static;
    type Gl: GlContext + 'static;
    /// Dropping this stops resize notifications for the observed canvas.
    type ResizeObservation: 'static;

    /// Creates a canvas element and appends it to the container.
    fn create_canvas(&self) -> Result<Self::Canvas, CanvasError>;

    /// Detaches the canvas element from the container.
    fn remove_canvas(&self, canvas: &Self::Canvas);

    fn context(&self, canvas: &Self::Canvas, kind: ContextKind) -> Result<Self::Context, CanvasError>;

    fn webgl2(&self, context: &Self::Context) -> Result<Self::Gl, CanvasError>;

    /// Computed CSS width and height of the canvas element.
    fn display_size(&self, canvas: &Self::Canvas) -> (f64, f64);

    fn device_pixel_ratio(&self) -> f64;

    fn set_backing_size(&self, canvas: &Self::Canvas, width: u32, height: u32);

    /// Updates the viewport of a plain WebGL1/WebGL2 context.
    fn set_viewport(&self, context: &Self::Context, width: u32, height: u32);

    fn observe_resize(
        &self,
        canvas: &Self::Canvas,
        on_resize: Rc<dyn Fn()>,
    ) -> Result<Self::ResizeObservation, CanvasError>;

    fn fetch_text(&self, url: &str) -> LocalBoxFuture<'static, Result<String, CanvasError>>;

    fn load_image(
        &self,
        url: &str,
    ) -> LocalBoxFuture<'static, Result<<Self::Gl as GlContext>::Image, CanvasError>>;
}
