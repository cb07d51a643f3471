use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::FutureExt;
use log::error;
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

/// Resolves the first time a browser callback fires.
///
/// `register` hands the callback to the browser and returns how to take it
/// back again. That undo runs when the wait is dropped, resolved or not, so
/// the browser never calls a freed closure.
pub(crate) struct CallbackWait {
    receiver: oneshot::Receiver<()>,
    _callback: Closure<dyn FnMut()>,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl CallbackWait {
    pub(crate) fn new<F>(register: F) -> CallbackWait
    where
        F: FnOnce(&js_sys::Function) -> Result<Box<dyn FnOnce()>, JsValue>,
    {
        let (sender, receiver) = oneshot::channel();
        let mut sender = Some(sender);
        let callback = Closure::wrap(Box::new(move || {
            if let Some(sender) = sender.take() {
                let _ = sender.send(());
            }
        }) as Box<dyn FnMut()>);
        let cancel = match register(callback.as_ref().unchecked_ref()) {
            Ok(cancel) => Some(cancel),
            Err(e) => {
                // never resolves; the render loop can still interrupt it
                error!("could not register browser callback: {:?}", e);
                None
            }
        };
        CallbackWait {
            receiver,
            _callback: callback,
            cancel,
        }
    }
}

impl Future for CallbackWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.receiver.poll_unpin(cx).map(|_| ())
    }
}

impl Drop for CallbackWait {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
