//! Lifecycle of the single canvas living inside a container element.
//!
//! All mutations of the canvas (mode changes, frame rate changes, resizes)
//! are serialised through an [`EditLock`]. Accessors that would observe a
//! half-finished mutation refuse to run while the lock is held, except the
//! canvas/context/size getters which trigger code needs while drawing.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use log::{debug, error, info};

use crate::error::CanvasError;
use crate::frame_rate::FrameRate;
use crate::full_canvas::{FullCanvasShader, ShaderConfig, ShaderSegment};
use crate::lock::EditLock;
use crate::mode::CanvasMode;
use crate::platform::Host;
use crate::render_loop::{ErrorSignal, RenderFn, RenderLoop};
use crate::texture::TextureData;
use crate::triggers::Triggers;
use crate::uniform::{UniformDecl, UniformType, UniformValue};

type Image<H> = <<H as Host>::Gl as crate::gl::GlContext>::Image;

/// Arguments to [`CanvasManager::set_canvas_mode`].
#[derive(Clone)]
pub struct CanvasOptions {
    mode: CanvasMode,
    frame_rate: FrameRate,
    triggers: Option<Rc<dyn Triggers>>,
    uniforms: Vec<UniformDecl>,
    shader_segments: Option<Vec<ShaderSegment>>,
}

struct ValidOptions {
    mode: CanvasMode,
    frame_rate: FrameRate,
    triggers: Option<Rc<dyn Triggers>>,
    shader: Option<ShaderConfig>,
}

impl CanvasOptions {
    pub fn new(mode: CanvasMode) -> CanvasOptions {
        CanvasOptions {
            mode,
            frame_rate: FrameRate::None,
            triggers: None,
            uniforms: vec![],
            shader_segments: None,
        }
    }

    pub fn none() -> CanvasOptions {
        CanvasOptions::new(CanvasMode::None)
    }

    pub fn frame_rate(mut self, frame_rate: FrameRate) -> CanvasOptions {
        self.frame_rate = frame_rate;
        self
    }

    pub fn triggers(mut self, triggers: Rc<dyn Triggers>) -> CanvasOptions {
        self.triggers = Some(triggers);
        self
    }

    pub fn uniform(mut self, decl: impl Into<UniformDecl>) -> CanvasOptions {
        self.uniforms.push(decl.into());
        self
    }

    pub fn uniforms<I, D>(mut self, decls: I) -> CanvasOptions
    where
        I: IntoIterator<Item = D>,
        D: Into<UniformDecl>,
    {
        self.uniforms.extend(decls.into_iter().map(Into::into));
        self
    }

    pub fn shader_segment(mut self, segment: ShaderSegment) -> CanvasOptions {
        self.shader_segments.get_or_insert_with(Vec::new).push(segment);
        self
    }

    fn validate(self) -> Result<ValidOptions, CanvasError> {
        let frame_rate = self.frame_rate.validate()?;
        let renders = self.triggers.as_ref().is_some_and(|t| t.has_render());
        if self.mode != CanvasMode::None && frame_rate != FrameRate::None && !renders {
            return Err(CanvasError::validation(format!(
                "triggers.render is required with frameRate.mode {}",
                frame_rate.mode()
            )));
        }
        let shader = if self.mode == CanvasMode::WebGlFullCanvasShader {
            let segments = self
                .shader_segments
                .ok_or_else(|| CanvasError::validation("shaderSegments must be provided"))?;
            Some(ShaderConfig::new(&self.uniforms, segments)?)
        } else {
            None
        };
        Ok(ValidOptions {
            mode: self.mode,
            frame_rate,
            triggers: self.triggers,
            shader,
        })
    }
}

impl ValidOptions {
    /// Fetches url shader segments so a bad url fails before anything is
    /// torn down.
    async fn prefetch<H: Host>(&mut self, host: &H) -> Result<(), CanvasError> {
        if let Some(config) = self.shader.take() {
            let host = host.clone();
            self.shader = Some(config.resolved(|url| host.fetch_text(url)).await?);
        }
        Ok(())
    }
}

struct Canvas<H: Host> {
    element: H::Canvas,
    context: Option<H::Context>,
    shader: Option<FullCanvasShader<H::Gl>>,
    observation: Option<H::ResizeObservation>,
    size: (u32, u32),
}

struct ManagerState<H: Host> {
    mode: CanvasMode,
    pixels_per_display_pixel: f64,
    canvas: Option<Canvas<H>>,
    triggers: Option<Rc<dyn Triggers>>,
    /// Bumped whenever a canvas is built or discarded.
    session: u64,
}

impl<H: Host> Default for ManagerState<H> {
    fn default() -> Self {
        ManagerState {
            mode: CanvasMode::None,
            pixels_per_display_pixel: 1.0,
            canvas: None,
            triggers: None,
            session: 0,
        }
    }
}

struct Inner<H: Host> {
    host: H,
    lock: EditLock,
    /// Held for a whole mode change, including while trigger code runs with
    /// `lock` released.
    transition: EditLock,
    state: RefCell<ManagerState<H>>,
    render_loop: RenderLoop<H>,
}

impl<H: Host> Drop for Inner<H> {
    fn drop(&mut self) {
        self.render_loop.halt();
    }
}

/// Owns one canvas element, its context, and the loop that renders into it.
pub struct CanvasManager<H: Host> {
    inner: Rc<Inner<H>>,
}

impl<H: Host> Clone for CanvasManager<H> {
    fn clone(&self) -> Self {
        CanvasManager {
            inner: self.inner.clone(),
        }
    }
}

impl<H: Host> CanvasManager<H> {
    pub fn new(host: H) -> CanvasManager<H> {
        let inner = Rc::new_cyclic(|weak: &Weak<Inner<H>>| {
            let render: RenderFn = {
                let weak = weak.clone();
                Rc::new(move || -> LocalBoxFuture<'static, Result<(), CanvasError>> {
                    let weak = weak.clone();
                    Box::pin(async move {
                        match weak.upgrade() {
                            Some(inner) => {
                                let manager = CanvasManager { inner };
                                manager.call_render().await
                            }
                            None => Ok(()),
                        }
                    })
                })
            };
            let on_error: ErrorSignal = {
                let weak = weak.clone();
                let host = host.clone();
                Rc::new(move |err: CanvasError| {
                    info!("shutting canvas down after error: {}", err);
                    let weak = weak.clone();
                    host.spawn(Box::pin(async move {
                        if let Some(inner) = weak.upgrade() {
                            let manager = CanvasManager { inner };
                            if let Err(e) = manager.graceful_shutdown().await {
                                error!("graceful shutdown failed: {}", e);
                            }
                        }
                    }));
                })
            };
            Inner {
                render_loop: RenderLoop::new(host.clone(), render, on_error),
                host,
                lock: EditLock::new(),
                transition: EditLock::new(),
                state: RefCell::new(ManagerState::default()),
            }
        });
        CanvasManager { inner }
    }

    /// The host, refused while a mutation is in flight.
    pub fn host(&self) -> Result<&H, CanvasError> {
        self.inner.lock.error_if_acquired()?;
        Ok(&self.inner.host)
    }

    pub fn get_canvas_mode(&self) -> Result<CanvasMode, CanvasError> {
        self.inner.lock.error_if_acquired()?;
        Ok(self.inner.state.borrow().mode)
    }

    /// Switches to the requested mode, tearing down the current canvas and
    /// building a new one as needed. Requesting the current mode is a no-op.
    ///
    /// Fails with `AlreadyHeld` while another mode change is in flight. Url
    /// shader segments are fetched before the current canvas is touched.
    /// Failures after the new canvas element exists (context acquisition,
    /// shader compile or link, a failing `setup` trigger) are logged and leave
    /// the manager in mode `None`.
    pub async fn set_canvas_mode(&self, options: CanvasOptions) -> Result<(), CanvasError> {
        let mut options = options.validate()?;
        let inner = &self.inner;
        inner.transition.error_if_acquired()?;

        let current = inner.state.borrow().mode;
        if options.mode != current {
            options.prefetch(&inner.host).await?;
        }

        // the loop must be stopped before the lock is taken: stopping can
        // involve one last run of trigger code, which expects the lock free
        let current = inner.state.borrow().mode;
        if current != CanvasMode::None {
            inner.render_loop.end_render_loop().await;
        }

        inner.transition.acquire()?;
        if let Err(e) = inner.lock.acquire() {
            let _ = inner.transition.release();
            return Err(e);
        }
        let result = self.transition(options).await;
        let released = inner.lock.release();
        let finished = inner.transition.release();
        result?;
        released.and(finished)?;

        if inner.state.borrow().mode != CanvasMode::None {
            inner.render_loop.start_render_loop()?;
        }
        Ok(())
    }

    async fn transition(&self, options: ValidOptions) -> Result<(), CanvasError> {
        let current = self.inner.state.borrow().mode;
        if options.mode == current {
            return Ok(());
        }
        info!("canvas mode {} -> {}", current, options.mode);
        if current != CanvasMode::None {
            self.destroy_canvas().await;
        }
        if options.mode != CanvasMode::None {
            self.create_canvas(options).await?;
        }
        Ok(())
    }

    /// Runs trigger code with the lock released, taking it back afterwards.
    async fn unlocked<F: Future>(&self, future: F) -> F::Output {
        let _ = self.inner.lock.release();
        let out = future.await;
        self.inner.lock.await_acquire().await;
        out
    }

    async fn create_canvas(&self, options: ValidOptions) -> Result<(), CanvasError> {
        let element = self.inner.host.create_canvas()?;
        if let Err(e) = self.build_canvas(element, &options).await {
            error!("canvas creation failed, rolling back: {}", e);
            self.discard_canvas();
        }
        Ok(())
    }

    async fn build_canvas(
        &self,
        element: H::Canvas,
        options: &ValidOptions,
    ) -> Result<(), CanvasError> {
        let inner = &self.inner;
        {
            let mut state = inner.state.borrow_mut();
            state.mode = options.mode;
            state.triggers = options.triggers.clone();
            state.session += 1;
            state.canvas = Some(Canvas {
                element: element.clone(),
                context: None,
                shader: None,
                observation: None,
                size: (0, 0),
            });
        }
        inner.render_loop.set_frame_rate(options.frame_rate).await?;

        let context = match options.mode.context_kind() {
            Some(kind) => Some(inner.host.context(&element, kind)?),
            None => None,
        };
        let shader = match (&options.shader, &context) {
            (Some(config), Some(context)) => {
                let gl = inner.host.webgl2(context)?;
                let host = inner.host.clone();
                Some(FullCanvasShader::create(gl, config, |url| host.fetch_text(url)).await?)
            }
            _ => None,
        };
        if let Some(canvas) = inner.state.borrow_mut().canvas.as_mut() {
            canvas.context = context;
            canvas.shader = shader;
        }

        self.update_canvas_size()?;
        let observation = inner.host.observe_resize(&element, self.resize_callback())?;
        if let Some(canvas) = inner.state.borrow_mut().canvas.as_mut() {
            canvas.observation = Some(observation);
        }

        if let Some(triggers) = options.triggers.clone() {
            self.unlocked(triggers.setup()).await?;
        }
        debug!("canvas ready in mode {}", options.mode);
        Ok(())
    }

    async fn destroy_canvas(&self) {
        let triggers = self.inner.state.borrow().triggers.clone();
        if let Some(triggers) = triggers {
            if let Err(e) = self.unlocked(triggers.tear_down()).await {
                error!("tearDown trigger failed: {:#}", e);
            }
        }
        self.discard_canvas();
    }

    /// Releases everything belonging to the current canvas and returns to
    /// mode `None`. Does not run trigger code.
    fn discard_canvas(&self) {
        let canvas = {
            let mut state = self.inner.state.borrow_mut();
            state.mode = CanvasMode::None;
            state.triggers = None;
            state.session += 1;
            state.canvas.take()
        };
        if let Some(mut canvas) = canvas {
            if let Some(mut shader) = canvas.shader.take() {
                if let Err(e) = shader.tear_down() {
                    error!("shader tear down failed: {}", e);
                }
            }
            drop(canvas.observation.take());
            self.inner.host.remove_canvas(&canvas.element);
        }
        if let Err(e) = self.inner.render_loop.clear_frame_rate() {
            error!("could not clear frame rate: {}", e);
        }
    }

    fn resize_callback(&self) -> Rc<dyn Fn()> {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let host = inner.host.clone();
                host.spawn(Box::pin(CanvasManager { inner }.handle_resize()));
            }
        })
    }

    async fn handle_resize(self) {
        // trigger code of a mode change runs unlocked; wait for the whole change
        loop {
            self.inner.transition.await_acquirable().await;
            self.inner.lock.await_acquire().await;
            if !self.inner.transition.is_acquired() {
                break;
            }
            let _ = self.inner.lock.release();
        }
        let updated = self.update_canvas_size();
        let _ = self.inner.lock.release();
        match updated {
            Ok(true) => self.queue_force_render(),
            Ok(false) => {}
            Err(e) => error!("canvas resize failed: {}", e),
        }
    }

    /// Recomputes the backing store size from the CSS size. Returns false
    /// when there is no canvas.
    fn update_canvas_size(&self) -> Result<bool, CanvasError> {
        let host = &self.inner.host;
        let mut state = self.inner.state.borrow_mut();
        let scale = state.pixels_per_display_pixel;
        let mode = state.mode;
        let canvas = match state.canvas.as_mut() {
            Some(canvas) => canvas,
            None => return Ok(false),
        };
        let (css_width, css_height) = host.display_size(&canvas.element);
        let ratio = host.device_pixel_ratio();
        let width = (css_width.floor() * ratio * scale) as u32;
        let height = (css_height.floor() * ratio * scale) as u32;
        canvas.size = (width, height);
        host.set_backing_size(&canvas.element, width, height);
        match mode {
            CanvasMode::WebGl1 | CanvasMode::WebGl2 => {
                if let Some(context) = &canvas.context {
                    host.set_viewport(context, width, height);
                }
            }
            CanvasMode::WebGlFullCanvasShader => {
                if let Some(shader) = &canvas.shader {
                    shader.resize_viewport(width, height)?;
                }
            }
            _ => {}
        }
        debug!("canvas resized to {}x{}", width, height);
        Ok(true)
    }

    fn queue_force_render(&self) {
        let this = self.clone();
        self.inner.host.spawn(Box::pin(async move {
            this.inner.lock.await_acquirable().await;
            this.inner.render_loop.force_render().await;
        }));
    }

    async fn call_render(&self) -> Result<(), CanvasError> {
        let (mode, triggers) = {
            let state = self.inner.state.borrow();
            (state.mode, state.triggers.clone())
        };
        if mode == CanvasMode::None {
            return Ok(());
        }
        if let Some(triggers) = triggers {
            triggers.render().await?;
        }
        if mode == CanvasMode::WebGlFullCanvasShader {
            let state = self.inner.state.borrow();
            if let Some(shader) = state.canvas.as_ref().and_then(|c| c.shader.as_ref()) {
                shader.render()?;
            }
        }
        Ok(())
    }

    pub fn get_canvas_pixels_per_display_pixel(&self) -> Result<f64, CanvasError> {
        self.inner.lock.error_if_acquired()?;
        Ok(self.inner.state.borrow().pixels_per_display_pixel)
    }

    /// Sets how many canvas pixels cover one device pixel per axis. An
    /// existing canvas is resized to match.
    pub fn set_canvas_pixels_per_display_pixel(&self, ratio: f64) -> Result<(), CanvasError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(CanvasError::validation(format!("pixel ratio value {} invalid", ratio)));
        }
        self.inner.lock.error_if_acquired()?;
        let has_canvas = {
            let mut state = self.inner.state.borrow_mut();
            state.pixels_per_display_pixel = ratio;
            state.canvas.is_some()
        };
        if has_canvas {
            self.inner.host.spawn(Box::pin(self.clone().handle_resize()));
        }
        Ok(())
    }

    /// Backing store size in canvas pixels, `None` without a canvas.
    pub fn get_canvas_size(&self) -> Option<(u32, u32)> {
        self.inner.state.borrow().canvas.as_ref().map(|c| c.size)
    }

    pub fn get_canvas(&self) -> Result<H::Canvas, CanvasError> {
        let state = self.inner.state.borrow();
        state
            .canvas
            .as_ref()
            .map(|c| c.element.clone())
            .ok_or(CanvasError::NoCanvas)
    }

    /// The rendering context; `Ok(None)` in mode `NoContext`.
    pub fn get_context(&self) -> Result<Option<H::Context>, CanvasError> {
        let state = self.inner.state.borrow();
        state
            .canvas
            .as_ref()
            .map(|c| c.context.clone())
            .ok_or(CanvasError::NoCanvas)
    }

    pub fn get_frame_rate(&self) -> Result<Option<FrameRate>, CanvasError> {
        self.inner.lock.error_if_acquired()?;
        Ok(self.inner.render_loop.frame_rate())
    }

    pub async fn set_frame_rate(&self, frame_rate: FrameRate) -> Result<(), CanvasError> {
        let frame_rate = frame_rate.validate()?;
        {
            let state = self.inner.state.borrow();
            let renders = state.triggers.as_ref().is_some_and(|t| t.has_render());
            if state.mode != CanvasMode::None && frame_rate != FrameRate::None && !renders {
                return Err(CanvasError::validation(format!(
                    "frameRate.mode {} needs a render trigger",
                    frame_rate.mode()
                )));
            }
        }
        self.inner.transition.error_if_acquired()?;
        self.inner.lock.acquire()?;
        let result = self.inner.render_loop.set_frame_rate(frame_rate).await;
        self.inner.lock.release()?;
        result?;
        // a canvas that was not looping before may need its loop now
        let render_loop = &self.inner.render_loop;
        if self.inner.state.borrow().mode != CanvasMode::None && !render_loop.render_loop_running() {
            render_loop.start_render_loop()?;
        }
        Ok(())
    }

    /// Whether a mutation could start right now.
    pub fn manager_editable(&self) -> bool {
        !self.inner.lock.is_acquired()
    }

    pub async fn await_manager_editable(&self) {
        self.inner.lock.await_acquirable().await;
    }

    pub async fn force_render(&self) {
        self.inner.lock.await_acquirable().await;
        self.inner.render_loop.force_render().await;
    }

    /// Returns to mode `None` once no mutation is in flight.
    pub async fn graceful_shutdown(&self) -> Result<(), CanvasError> {
        loop {
            self.inner.transition.await_acquirable().await;
            self.await_manager_editable().await;
            match self.set_canvas_mode(CanvasOptions::none()).await {
                Err(CanvasError::AlreadyHeld) => continue,
                other => return other,
            }
        }
    }

    fn with_shader<T>(
        &self,
        f: impl FnOnce(&FullCanvasShader<H::Gl>) -> Result<T, CanvasError>,
    ) -> Result<T, CanvasError> {
        let state = self.inner.state.borrow();
        if state.mode != CanvasMode::WebGlFullCanvasShader {
            return Err(CanvasError::WrongMode {
                expected: CanvasMode::WebGlFullCanvasShader,
                actual: state.mode,
            });
        }
        let shader = state
            .canvas
            .as_ref()
            .and_then(|c| c.shader.as_ref())
            .ok_or(CanvasError::Destroyed)?;
        f(shader)
    }

    fn with_shader_mut<T>(
        &self,
        f: impl FnOnce(&mut FullCanvasShader<H::Gl>) -> Result<T, CanvasError>,
    ) -> Result<T, CanvasError> {
        let mut state = self.inner.state.borrow_mut();
        let actual = state.mode;
        if actual != CanvasMode::WebGlFullCanvasShader {
            return Err(CanvasError::WrongMode {
                expected: CanvasMode::WebGlFullCanvasShader,
                actual,
            });
        }
        let shader = state
            .canvas
            .as_mut()
            .and_then(|c| c.shader.as_mut())
            .ok_or(CanvasError::Destroyed)?;
        f(shader)
    }

    pub fn uniform_type(&self, name: &str) -> Result<UniformType, CanvasError> {
        self.with_shader(|shader| shader.uniform_type(name))
    }

    pub fn get_uniform(&self, name: &str) -> Result<UniformValue, CanvasError> {
        self.with_shader(|shader| shader.get_uniform(name))
    }

    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) -> Result<(), CanvasError> {
        let value = value.into();
        self.with_shader(|shader| shader.set_uniform(name, &value))
    }

    pub fn current_texture_names(&self) -> Result<Vec<String>, CanvasError> {
        self.with_shader(|shader| shader.texture_names())
    }

    pub fn has_texture(&self, alias: &str) -> Result<bool, CanvasError> {
        self.with_shader(|shader| shader.has_texture(alias))
    }

    /// Loads a texture into the lowest free texture unit and returns the
    /// unit. Url data is fetched first; its url is the default alias. Fails
    /// with `Destroyed` if the shader session changed during the fetch.
    pub async fn load_texture(&self, data: TextureData<Image<H>>, alias: Option<&str>) -> Result<u32, CanvasError> {
        let alias = data.resolve_alias(alias)?;
        self.with_shader(|shader| shader.ensure_alias_free(&alias))?;
        let session = self.inner.state.borrow().session;
        let image = match data {
            TextureData::Url(url) => self.inner.host.load_image(&url).await?,
            TextureData::Image(image) => image,
        };
        let current = self.inner.state.borrow().session;
        if current != session {
            return Err(CanvasError::Destroyed);
        }
        self.with_shader_mut(|shader| shader.load_texture(&alias, &image))
    }

    pub fn delete_texture(&self, alias: &str) -> Result<(), CanvasError> {
        self.with_shader_mut(|shader| shader.delete_texture(alias))
    }

    pub fn delete_all_textures(&self) -> Result<(), CanvasError> {
        self.with_shader_mut(|shader| shader.delete_all_textures())
    }

    pub fn get_texture_id(&self, alias: &str) -> Result<u32, CanvasError> {
        self.with_shader(|shader| shader.texture_id(alias))
    }

    pub fn get_texture_dimensions(&self, alias: &str) -> Result<(u32, u32), CanvasError> {
        self.with_shader(|shader| shader.texture_dimensions(alias))
    }
}
