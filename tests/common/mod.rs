//! A scripted page for driving the canvas core on the host.
//!
//! Frames, timers and visibility only move when a test says so, the
//! container is a list of canvas ids, and the GL context records every call.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use canvas_wasm::gl::{GlContext, ImageSource, ShaderKind, UniformWrite};
use canvas_wasm::mode::ContextKind;
use canvas_wasm::platform::{Host, Scheduler};
use canvas_wasm::triggers::{TriggerFuture, Triggers};
use canvas_wasm::uniform::{Scalar, UniformKind, UniformValue};
use canvas_wasm::CanvasError;

/// Spawns `future` and runs the pool until nothing can make progress.
/// Returns the output if the future finished.
pub fn drive<T: 'static>(pool: &mut LocalPool, future: impl Future<Output = T> + 'static) -> Option<T> {
    let out = Rc::new(RefCell::new(None));
    let slot = out.clone();
    pool.spawner()
        .spawn_local(async move {
            *slot.borrow_mut() = Some(future.await);
        })
        .expect("spawn");
    pool.run_until_stalled();
    let value = out.borrow_mut().take();
    value
}

/// Like [`drive`], but the future must finish.
pub fn settle<T: 'static>(pool: &mut LocalPool, future: impl Future<Output = T> + 'static) -> T {
    drive(pool, future).expect("future stalled")
}

#[derive(Default)]
struct Clock {
    now: u64,
    frames: Vec<oneshot::Sender<()>>,
    timers: Vec<(u64, oneshot::Sender<()>)>,
    hidden: bool,
    visibility: Vec<oneshot::Sender<()>>,
}

struct Observer {
    canvas: u32,
    on_resize: Rc<dyn Fn()>,
}

struct Page {
    next_canvas: u32,
    attached: Vec<u32>,
    created: u32,
    css_size: (f64, f64),
    device_pixel_ratio: f64,
    backing: HashMap<u32, (u32, u32)>,
    viewports: Vec<(u32, u32)>,
    observers: HashMap<u64, Observer>,
    next_observer: u64,
    texts: HashMap<String, String>,
    images: HashMap<String, FakeImage>,
    hold_images: bool,
    held_images: Vec<oneshot::Sender<()>>,
    fail_context: bool,
}

#[derive(Clone)]
pub struct FakeHost {
    spawner: LocalSpawner,
    clock: Rc<RefCell<Clock>>,
    page: Rc<RefCell<Page>>,
    gl: FakeGl,
}

impl FakeHost {
    pub fn new(pool: &LocalPool) -> FakeHost {
        FakeHost {
            spawner: pool.spawner(),
            clock: Rc::new(RefCell::new(Clock::default())),
            page: Rc::new(RefCell::new(Page {
                next_canvas: 1,
                attached: vec![],
                created: 0,
                css_size: (100.0, 100.0),
                device_pixel_ratio: 1.0,
                backing: HashMap::new(),
                viewports: vec![],
                observers: HashMap::new(),
                next_observer: 0,
                texts: HashMap::new(),
                images: HashMap::new(),
                hold_images: false,
                held_images: vec![],
                fail_context: false,
            })),
            gl: FakeGl::new(),
        }
    }

    pub fn gl(&self) -> &FakeGl {
        &self.gl
    }

    /// Fires every pending animation frame request.
    pub fn tick_frame(&self) {
        let frames = std::mem::take(&mut self.clock.borrow_mut().frames);
        for frame in frames {
            let _ = frame.send(());
        }
    }

    pub fn pending_frames(&self) -> usize {
        self.clock.borrow().frames.iter().filter(|f| !f.is_canceled()).count()
    }

    pub fn advance(&self, millis: u64) {
        let due = {
            let mut clock = self.clock.borrow_mut();
            clock.now += millis;
            let now = clock.now;
            let (due, pending) = std::mem::take(&mut clock.timers)
                .into_iter()
                .partition::<Vec<_>, _>(|(deadline, _)| *deadline <= now);
            clock.timers = pending;
            due
        };
        for (_, timer) in due {
            let _ = timer.send(());
        }
    }

    pub fn set_visible(&self, visible: bool) {
        let waiters = {
            let mut clock = self.clock.borrow_mut();
            clock.hidden = !visible;
            std::mem::take(&mut clock.visibility)
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Changes the container's CSS size and notifies resize observers of
    /// attached canvases.
    pub fn resize(&self, width: f64, height: f64) {
        let callbacks: Vec<Rc<dyn Fn()>> = {
            let mut page = self.page.borrow_mut();
            page.css_size = (width, height);
            let attached = page.attached.clone();
            page.observers
                .values()
                .filter(|o| attached.contains(&o.canvas))
                .map(|o| o.on_resize.clone())
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn set_device_pixel_ratio(&self, ratio: f64) {
        self.page.borrow_mut().device_pixel_ratio = ratio;
    }

    pub fn attached(&self) -> Vec<u32> {
        self.page.borrow().attached.clone()
    }

    pub fn canvases_created(&self) -> u32 {
        self.page.borrow().created
    }

    pub fn observer_count(&self) -> usize {
        self.page.borrow().observers.len()
    }

    pub fn backing_size(&self, canvas: u32) -> Option<(u32, u32)> {
        self.page.borrow().backing.get(&canvas).copied()
    }

    pub fn viewports(&self) -> Vec<(u32, u32)> {
        self.page.borrow().viewports.clone()
    }

    pub fn serve_text(&self, url: &str, text: &str) {
        self.page.borrow_mut().texts.insert(url.to_string(), text.to_string());
    }

    pub fn serve_image(&self, url: &str, width: u32, height: u32) {
        self.page.borrow_mut().images.insert(url.to_string(), FakeImage { width, height });
    }

    /// While set, image loads stay pending until [`FakeHost::release_images`].
    pub fn hold_images(&self, hold: bool) {
        self.page.borrow_mut().hold_images = hold;
    }

    pub fn release_images(&self) {
        let held = std::mem::take(&mut self.page.borrow_mut().held_images);
        for image in held {
            let _ = image.send(());
        }
    }

    pub fn fail_context(&self, fail: bool) {
        self.page.borrow_mut().fail_context = fail;
    }
}

impl Scheduler for FakeHost {
    fn next_frame(&self) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        self.clock.borrow_mut().frames.push(sender);
        receiver.map(|_| ()).boxed_local()
    }

    fn sleep(&self, millis: u32) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        let mut clock = self.clock.borrow_mut();
        let deadline = clock.now + millis as u64;
        clock.timers.push((deadline, sender));
        receiver.map(|_| ()).boxed_local()
    }

    fn page_visible(&self) -> bool {
        !self.clock.borrow().hidden
    }

    fn visibility_change(&self) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        self.clock.borrow_mut().visibility.push(sender);
        receiver.map(|_| ()).boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner.spawn_local(task).expect("spawn");
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FakeContext {
    pub canvas: u32,
    pub kind: ContextKind,
}

/// Removes its observer when dropped.
pub struct Observation {
    page: Rc<RefCell<Page>>,
    id: u64,
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.page.borrow_mut().observers.remove(&self.id);
    }
}

impl Host for FakeHost {
    type Canvas = u32;
    type Context = FakeContext;
    type Gl = FakeGl;
    type ResizeObservation = Observation;

    fn create_canvas(&self) -> Result<u32, CanvasError> {
        let mut page = self.page.borrow_mut();
        let id = page.next_canvas;
        page.next_canvas += 1;
        page.created += 1;
        page.attached.push(id);
        Ok(id)
    }

    fn remove_canvas(&self, canvas: &u32) {
        self.page.borrow_mut().attached.retain(|c| c != canvas);
    }

    fn context(&self, canvas: &u32, kind: ContextKind) -> Result<FakeContext, CanvasError> {
        if self.page.borrow().fail_context {
            return Err(CanvasError::Platform(format!("{} context not supported", kind.context_id())));
        }
        Ok(FakeContext { canvas: *canvas, kind })
    }

    fn webgl2(&self, context: &FakeContext) -> Result<FakeGl, CanvasError> {
        match context.kind {
            ContextKind::WebGl2 => Ok(self.gl.clone()),
            _ => Err(CanvasError::Platform("context is not WebGL2".into())),
        }
    }

    fn display_size(&self, _canvas: &u32) -> (f64, f64) {
        self.page.borrow().css_size
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.page.borrow().device_pixel_ratio
    }

    fn set_backing_size(&self, canvas: &u32, width: u32, height: u32) {
        self.page.borrow_mut().backing.insert(*canvas, (width, height));
    }

    fn set_viewport(&self, _context: &FakeContext, width: u32, height: u32) {
        self.page.borrow_mut().viewports.push((width, height));
    }

    fn observe_resize(&self, canvas: &u32, on_resize: Rc<dyn Fn()>) -> Result<Observation, CanvasError> {
        let mut page = self.page.borrow_mut();
        let id = page.next_observer;
        page.next_observer += 1;
        page.observers.insert(
            id,
            Observer {
                canvas: *canvas,
                on_resize,
            },
        );
        Ok(Observation {
            page: self.page.clone(),
            id,
        })
    }

    fn fetch_text(&self, url: &str) -> LocalBoxFuture<'static, Result<String, CanvasError>> {
        let found = self.page.borrow().texts.get(url).cloned();
        let url = url.to_string();
        async move {
            found.ok_or_else(|| CanvasError::Fetch {
                url,
                reason: "HTTP 404".into(),
            })
        }
        .boxed_local()
    }

    fn load_image(&self, url: &str) -> LocalBoxFuture<'static, Result<FakeImage, CanvasError>> {
        let mut page = self.page.borrow_mut();
        let found = page.images.get(url).cloned();
        let gate = if page.hold_images {
            let (sender, receiver) = oneshot::channel();
            page.held_images.push(sender);
            Some(receiver)
        } else {
            None
        };
        let url = url.to_string();
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            found.ok_or_else(|| CanvasError::Fetch {
                url,
                reason: "image failed to load".into(),
            })
        }
        .boxed_local()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FakeImage {
    pub width: u32,
    pub height: u32,
}

impl ImageSource for FakeImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Stored {
    Ints(Vec<i32>),
    UInts(Vec<u32>),
    Floats(Vec<f32>),
}

struct GlState {
    next_handle: u32,
    calls: Vec<String>,
    sources: HashMap<u32, String>,
    live: Vec<u32>,
    uniforms: HashMap<String, Stored>,
    max_units: u32,
    fail_link: bool,
}

/// A GL context that records calls. Uniform locations are the uniform
/// names; array elements are addressed as `name[i]`.
#[derive(Clone)]
pub struct FakeGl {
    state: Rc<RefCell<GlState>>,
}

impl FakeGl {
    pub fn new() -> FakeGl {
        FakeGl {
            state: Rc::new(RefCell::new(GlState {
                next_handle: 1,
                calls: vec![],
                sources: HashMap::new(),
                live: vec![],
                uniforms: HashMap::new(),
                max_units: 16,
                fail_link: false,
            })),
        }
    }

    fn handle(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.live.push(handle);
        handle
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }

    fn free(&self, call: &str, handle: u32) {
        let mut state = self.state.borrow_mut();
        state.live.retain(|h| *h != handle);
        state.calls.push(format!("{} {}", call, handle));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Calls whose name starts with `prefix`.
    pub fn calls_named(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(prefix)).collect()
    }

    pub fn live_handles(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn fragment_sources(&self) -> Vec<String> {
        let state = self.state.borrow();
        let mut handles: Vec<_> = state.sources.keys().copied().collect();
        handles.sort_unstable();
        handles
            .into_iter()
            .map(|h| state.sources[&h].clone())
            .filter(|s| !s.contains("gl_Position"))
            .collect()
    }

    pub fn set_max_units(&self, units: u32) {
        self.state.borrow_mut().max_units = units;
    }

    pub fn fail_link(&self, fail: bool) {
        self.state.borrow_mut().fail_link = fail;
    }

    pub fn draws(&self) -> usize {
        self.calls_named("draw").len()
    }
}

impl GlContext for FakeGl {
    type Shader = u32;
    type Program = u32;
    type Buffer = u32;
    type Texture = u32;
    type UniformLocation = String;
    type Image = FakeImage;

    fn create_shader(&self, kind: ShaderKind) -> Result<u32, CanvasError> {
        let handle = self.handle();
        self.record(format!("create_shader {:?} {}", kind, handle));
        Ok(handle)
    }

    fn compile_shader(&self, shader: &u32, source: &str) -> Result<(), String> {
        self.state.borrow_mut().sources.insert(*shader, source.to_string());
        if source.contains("#error") {
            Err("ERROR: 0:3: '#error' : forced failure".into())
        } else {
            Ok(())
        }
    }

    fn delete_shader(&self, shader: &u32) {
        self.free("delete_shader", *shader);
    }

    fn create_program(&self) -> Result<u32, CanvasError> {
        Ok(self.handle())
    }

    fn attach_shader(&self, _program: &u32, _shader: &u32) {}

    fn link_program(&self, _program: &u32) -> Result<(), String> {
        if self.state.borrow().fail_link {
            Err("ERROR: missing main".into())
        } else {
            Ok(())
        }
    }

    fn use_program(&self, _program: Option<&u32>) {}

    fn delete_program(&self, program: &u32) {
        self.free("delete_program", *program);
    }

    fn attrib_location(&self, _program: &u32, _name: &str) -> i32 {
        0
    }

    fn uniform_location(&self, _program: &u32, name: &str) -> Option<String> {
        Some(name.to_string())
    }

    fn create_buffer(&self) -> Result<u32, CanvasError> {
        Ok(self.handle())
    }

    fn upload_vertices(&self, buffer: &u32, _attrib: i32, components: i32, data: &[f32]) {
        self.record(format!("upload_vertices {} {}x{}", buffer, data.len() as i32 / components, components));
    }

    fn delete_buffer(&self, buffer: &u32) {
        self.free("delete_buffer", *buffer);
    }

    fn viewport(&self, width: u32, height: u32) {
        self.record(format!("viewport {}x{}", width, height));
    }

    fn draw_triangle_strip(&self, count: i32) {
        self.record(format!("draw {}", count));
    }

    fn uniform(&self, location: Option<&String>, write: UniformWrite<'_>) {
        let name = match location {
            Some(name) => name.clone(),
            None => return,
        };
        let stored = match write {
            UniformWrite::Int { data, .. } => Stored::Ints(data.to_vec()),
            UniformWrite::UInt { data, .. } => Stored::UInts(data.to_vec()),
            UniformWrite::Float { data, .. } | UniformWrite::Matrix { data, .. } => Stored::Floats(data.to_vec()),
        };
        self.record(format!("uniform {}", name));
        self.state.borrow_mut().uniforms.insert(name, stored);
    }

    fn read_uniform(&self, _program: &u32, location: &String, kind: UniformKind) -> Result<UniformValue, CanvasError> {
        let components = kind.components() as usize;
        let (base, range) = match location.strip_suffix(']').and_then(|l| l.split_once('[')) {
            Some((base, index)) => {
                let index: usize = index.parse().map_err(|_| CanvasError::Platform("bad index".into()))?;
                (base.to_string(), index * components..(index + 1) * components)
            }
            None => (location.clone(), 0..components),
        };
        let state = self.state.borrow();
        let stored = state.uniforms.get(&base);
        let floats = |v: &[f32]| v.get(range.clone()).map(<[f32]>::to_vec).unwrap_or_else(|| vec![0.0; components]);
        let ints = |v: &[i32]| v.get(range.clone()).map(<[i32]>::to_vec).unwrap_or_else(|| vec![0; components]);
        Ok(match (kind.scalar(), stored) {
            (Scalar::Float, Some(Stored::Floats(v))) => UniformValue::Floats(floats(v)),
            (Scalar::Float, _) => UniformValue::Floats(vec![0.0; components]),
            (Scalar::Bool, Some(Stored::Ints(v))) => UniformValue::Bools(ints(v).into_iter().map(|i| i != 0).collect()),
            (Scalar::Bool, _) => UniformValue::Bools(vec![false; components]),
            (Scalar::Int | Scalar::Sampler, Some(Stored::Ints(v))) => UniformValue::Ints(ints(v)),
            (Scalar::Int | Scalar::Sampler, _) => UniformValue::Ints(vec![0; components]),
            (Scalar::UInt, Some(Stored::UInts(v))) => UniformValue::UInts(
                v.get(range.clone()).map(<[u32]>::to_vec).unwrap_or_else(|| vec![0; components]),
            ),
            (Scalar::UInt, _) => UniformValue::UInts(vec![0; components]),
        })
    }

    fn max_texture_units(&self) -> u32 {
        self.state.borrow().max_units
    }

    fn create_texture(&self) -> Result<u32, CanvasError> {
        Ok(self.handle())
    }

    fn upload_texture(&self, unit: u32, texture: &u32, image: &FakeImage) -> Result<(), CanvasError> {
        self.record(format!("upload_texture {} unit {} {}x{}", texture, unit, image.width, image.height));
        Ok(())
    }

    fn delete_texture(&self, _unit: u32, texture: &u32) {
        self.free("delete_texture", *texture);
    }
}

/// Triggers that count their calls and can be told to fail.
#[derive(Default)]
pub struct CountingTriggers {
    pub setups: RefCell<u32>,
    pub renders: RefCell<u32>,
    pub tear_downs: RefCell<u32>,
    pub fail_setup: bool,
    pub fail_render: bool,
    pub fail_tear_down: bool,
}

impl CountingTriggers {
    pub fn new() -> Rc<CountingTriggers> {
        Rc::new(CountingTriggers::default())
    }

    pub fn renders(&self) -> u32 {
        *self.renders.borrow()
    }
}

impl Triggers for CountingTriggers {
    fn setup(&self) -> TriggerFuture<'_> {
        Box::pin(async move {
            *self.setups.borrow_mut() += 1;
            if self.fail_setup {
                anyhow::bail!("setup exploded");
            }
            Ok(())
        })
    }

    fn render(&self) -> TriggerFuture<'_> {
        Box::pin(async move {
            *self.renders.borrow_mut() += 1;
            if self.fail_render {
                anyhow::bail!("render exploded");
            }
            Ok(())
        })
    }

    fn tear_down(&self) -> TriggerFuture<'_> {
        Box::pin(async move {
            *self.tear_downs.borrow_mut() += 1;
            if self.fail_tear_down {
                anyhow::bail!("tear down exploded");
            }
            Ok(())
        })
    }
}
