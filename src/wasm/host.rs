use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, Element, HtmlCanvasElement, HtmlElement, HtmlImageElement, Response,
    WebGl2RenderingContext, WebGlRenderingContext, Window,
};

use super::gl::{WebGl, WebImage};
use super::wait::CallbackWait;
use crate::error::CanvasError;
use crate::mode::ContextKind;
use crate::platform::{Host, Scheduler};

pub(crate) fn describe(value: &JsValue) -> String {
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

pub(crate) fn js_error(value: JsValue) -> CanvasError {
    CanvasError::Platform(describe(&value))
}

// web-sys only exposes ResizeObserver behind its unstable API flag, so bind
// the bare minimum ourselves.
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(extends = ::js_sys::Object)]
    #[derive(Debug, Clone)]
    type ResizeObserver;

    #[wasm_bindgen(catch, constructor, js_class = "ResizeObserver")]
    fn new(callback: &::js_sys::Function) -> Result<ResizeObserver, JsValue>;

    #[wasm_bindgen(method, js_class = "ResizeObserver")]
    fn observe(this: &ResizeObserver, element: &Element);

    #[wasm_bindgen(method, js_class = "ResizeObserver")]
    fn disconnect(this: &ResizeObserver);
}

/// Live resize observation of one canvas. Dropping it disconnects.
pub struct ResizeWatch {
    observer: ResizeObserver,
    _callback: Closure<dyn FnMut()>,
}

impl Drop for ResizeWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

/// The browser page, with the canvas living inside `container`.
#[derive(Clone)]
pub struct WebHost {
    window: Window,
    document: Document,
    container: HtmlElement,
}

impl WebHost {
    pub fn new(container: HtmlElement) -> Result<WebHost, CanvasError> {
        let window = web_sys::window().ok_or_else(|| CanvasError::Platform("no window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| CanvasError::Platform("no document".into()))?;
        Ok(WebHost {
            window,
            document,
            container,
        })
    }

    pub fn container(&self) -> &HtmlElement {
        &self.container
    }
}

fn parse_px(value: &str) -> Option<f64> {
    value.trim().strip_suffix("px")?.parse().ok()
}

impl Scheduler for WebHost {
    fn next_frame(&self) -> LocalBoxFuture<'static, ()> {
        let window = self.window.clone();
        Box::pin(CallbackWait::new(move |callback| {
            let id = window.request_animation_frame(callback)?;
            Ok(Box::new(move || {
                let _ = window.cancel_animation_frame(id);
            }))
        }))
    }

    fn sleep(&self, millis: u32) -> LocalBoxFuture<'static, ()> {
        let window = self.window.clone();
        let millis = millis.min(i32::MAX as u32) as i32;
        Box::pin(CallbackWait::new(move |callback| {
            let id = window.set_timeout_with_callback_and_timeout_and_arguments_0(callback, millis)?;
            Ok(Box::new(move || window.clear_timeout_with_handle(id)))
        }))
    }

    fn page_visible(&self) -> bool {
        !self.document.hidden()
    }

    fn visibility_change(&self) -> LocalBoxFuture<'static, ()> {
        let document = self.document.clone();
        Box::pin(CallbackWait::new(move |callback| {
            document.add_event_listener_with_callback("visibilitychange", callback)?;
            let callback = callback.clone();
            Ok(Box::new(move || {
                let _ = document.remove_event_listener_with_callback("visibilitychange", &callback);
            }))
        }))
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

impl Host for WebHost {
    type Canvas = HtmlCanvasElement;
    type Context = js_sys::Object;
    type Gl = WebGl;
    type ResizeObservation = ResizeWatch;

    fn create_canvas(&self) -> Result<HtmlCanvasElement, CanvasError> {
        let canvas = self
            .document
            .create_element("canvas")
            .map_err(js_error)?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| CanvasError::Platform("created element is not a canvas".into()))?;
        // layout size follows the container, never the backing store
        let style = canvas.style();
        style.set_property("display", "block").map_err(js_error)?;
        style.set_property("width", "100%").map_err(js_error)?;
        style.set_property("height", "100%").map_err(js_error)?;
        self.container.append_child(&canvas).map_err(js_error)?;
        Ok(canvas)
    }

    fn remove_canvas(&self, canvas: &HtmlCanvasElement) {
        canvas.remove();
    }

    fn context(&self, canvas: &HtmlCanvasElement, kind: ContextKind) -> Result<js_sys::Object, CanvasError> {
        canvas
            .get_context(kind.context_id())
            .map_err(js_error)?
            .ok_or_else(|| CanvasError::Platform(format!("{} context not supported", kind.context_id())))
    }

    fn webgl2(&self, context: &js_sys::Object) -> Result<WebGl, CanvasError> {
        context
            .clone()
            .dyn_into::<WebGl2RenderingContext>()
            .map(WebGl::new)
            .map_err(|_| CanvasError::Platform("context is not WebGL2".into()))
    }

    fn display_size(&self, canvas: &HtmlCanvasElement) -> (f64, f64) {
        let computed = self.window.get_computed_style(canvas).ok().flatten();
        let dimension = |name: &str, fallback: i32| {
            computed
                .as_ref()
                .and_then(|style| style.get_property_value(name).ok())
                .and_then(|value| parse_px(&value))
                .unwrap_or(fallback as f64)
        };
        (
            dimension("width", canvas.client_width()),
            dimension("height", canvas.client_height()),
        )
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.window.device_pixel_ratio()
    }

    fn set_backing_size(&self, canvas: &HtmlCanvasElement, width: u32, height: u32) {
        canvas.set_width(width);
        canvas.set_height(height);
    }

    fn set_viewport(&self, context: &js_sys::Object, width: u32, height: u32) {
        let (width, height) = (width as i32, height as i32);
        if let Some(gl) = context.dyn_ref::<WebGl2RenderingContext>() {
            gl.viewport(0, 0, width, height);
        } else if let Some(gl) = context.dyn_ref::<WebGlRenderingContext>() {
            gl.viewport(0, 0, width, height);
        }
    }

    fn observe_resize(&self, canvas: &HtmlCanvasElement, on_resize: Rc<dyn Fn()>) -> Result<ResizeWatch, CanvasError> {
        let callback = Closure::wrap(Box::new(move || on_resize()) as Box<dyn FnMut()>);
        let observer = ResizeObserver::new(callback.as_ref().unchecked_ref()).map_err(js_error)?;
        observer.observe(canvas);
        Ok(ResizeWatch {
            observer,
            _callback: callback,
        })
    }

    fn fetch_text(&self, url: &str) -> LocalBoxFuture<'static, Result<String, CanvasError>> {
        let url = url.to_string();
        let request = self.window.fetch_with_str(&url);
        Box::pin(async move {
            let failed = |reason: String| CanvasError::Fetch {
                url: url.clone(),
                reason,
            };
            let response: Response = JsFuture::from(request)
                .await
                .map_err(|e| failed(describe(&e)))?
                .dyn_into()
                .map_err(|_| failed("not a Response".into()))?;
            if !response.ok() {
                return Err(failed(format!("HTTP {}", response.status())));
            }
            let text = response.text().map_err(|e| failed(describe(&e)))?;
            JsFuture::from(text)
                .await
                .map_err(|e| failed(describe(&e)))?
                .as_string()
                .ok_or_else(|| failed("body is not text".into()))
        })
    }

    fn load_image(&self, url: &str) -> LocalBoxFuture<'static, Result<WebImage, CanvasError>> {
        let url = url.to_string();
        Box::pin(async move {
            let image = HtmlImageElement::new().map_err(js_error)?;
            image.set_cross_origin(Some("anonymous"));
            let (sender, receiver) = oneshot::channel::<bool>();
            let sender = Rc::new(RefCell::new(Some(sender)));
            let settle = |loaded: bool| {
                let sender = sender.clone();
                Closure::wrap(Box::new(move || {
                    if let Some(sender) = sender.borrow_mut().take() {
                        let _ = sender.send(loaded);
                    }
                }) as Box<dyn FnMut()>)
            };
            let on_load = settle(true);
            let on_error = settle(false);
            image.set_onload(Some(on_load.as_ref().unchecked_ref()));
            image.set_onerror(Some(on_error.as_ref().unchecked_ref()));
            image.set_src(&url);
            let loaded = receiver.await.unwrap_or(false);
            image.set_onload(None);
            image.set_onerror(None);
            if loaded {
                Ok(WebImage::Image(image))
            } else {
                Err(CanvasError::Fetch {
                    url,
                    reason: "image failed to load".into(),
                })
            }
        })
    }
}
