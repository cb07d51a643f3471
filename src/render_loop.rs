//! Interruptible render loop.
//!
//! For `FrameMult` and `Millisecond` cadences a task renders, waits, and
//! repeats. The wait can be cut short in two ways: a *stop* ends the loop
//! after the current cycle, a *skip* renders again immediately and then
//! resumes the normal cadence. While the page is hidden the loop parks until
//! visibility returns.

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{select, Either, LocalBoxFuture};
use log::{debug, error};

use crate::error::CanvasError;
use crate::frame_rate::FrameRate;
use crate::platform::Scheduler;

pub type RenderFn = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<(), CanvasError>>>;
pub type ErrorSignal = Rc<dyn Fn(CanvasError)>;

#[derive(Default)]
struct LoopState {
    frame_rate: Option<FrameRate>,
    running: bool,
    stop: bool,
    skip: bool,
    interrupt: Option<oneshot::Sender<()>>,
    on_stopped: Vec<oneshot::Sender<()>>,
    on_skipped: Vec<oneshot::Sender<()>>,
}

enum Signal {
    Stop,
    Skip,
    Nothing,
}

enum Wake {
    Elapsed,
    Interrupted,
    Hidden,
}

impl LoopState {
    fn arm(&mut self) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        self.interrupt = Some(sender);
        receiver
    }

    fn interrupt(&mut self) {
        if let Some(sender) = self.interrupt.take() {
            let _ = sender.send(());
        }
    }

    fn take_signal(&mut self) -> Signal {
        if self.stop {
            Signal::Stop
        } else if self.skip {
            self.skip = false;
            for waiter in self.on_skipped.drain(..) {
                let _ = waiter.send(());
            }
            Signal::Skip
        } else {
            Signal::Nothing
        }
    }

    fn finish(&mut self) {
        self.running = false;
        self.stop = false;
        self.skip = false;
        self.interrupt = None;
        for waiter in self.on_skipped.drain(..).chain(self.on_stopped.drain(..)) {
            let _ = waiter.send(());
        }
    }
}

#[derive(Clone)]
pub struct RenderLoop<S: Scheduler> {
    scheduler: S,
    state: Rc<RefCell<LoopState>>,
    render: RenderFn,
    on_error: ErrorSignal,
}

impl<S: Scheduler> RenderLoop<S> {
    /// `render` is invoked once per cycle. A failed render is logged and
    /// handed to `on_error`; the loop itself carries on.
    pub fn new(scheduler: S, render: RenderFn, on_error: ErrorSignal) -> RenderLoop<S> {
        RenderLoop {
            scheduler,
            state: Rc::new(RefCell::new(LoopState::default())),
            render,
            on_error,
        }
    }

    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.state.borrow().frame_rate
    }

    pub fn render_loop_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Replaces the cadence. A running loop is stopped first and restarted
    /// with the new cadence.
    pub async fn set_frame_rate(&self, frame_rate: FrameRate) -> Result<(), CanvasError> {
        let frame_rate = frame_rate.validate()?;
        if self.render_loop_running() {
            self.end_render_loop().await;
            self.state.borrow_mut().frame_rate = Some(frame_rate);
            self.start_render_loop()
        } else {
            self.state.borrow_mut().frame_rate = Some(frame_rate);
            Ok(())
        }
    }

    pub fn clear_frame_rate(&self) -> Result<(), CanvasError> {
        let mut state = self.state.borrow_mut();
        if state.running {
            return Err(CanvasError::AlreadyRunning);
        }
        state.frame_rate = None;
        Ok(())
    }

    /// Starts the loop task for looping cadences. Other cadences have no
    /// loop, so this only checks the frame rate is set.
    pub fn start_render_loop(&self) -> Result<(), CanvasError> {
        {
            let mut state = self.state.borrow_mut();
            let frame_rate = state.frame_rate.ok_or(CanvasError::FrameRateUnset)?;
            if state.running {
                return Err(CanvasError::AlreadyRunning);
            }
            if !frame_rate.is_looping() {
                return Ok(());
            }
            state.running = true;
            state.stop = false;
            state.skip = false;
        }
        debug!("render loop starting");
        let this = self.clone();
        self.scheduler.spawn(Box::pin(async move { this.run().await }));
        Ok(())
    }

    /// Asks the loop to stop after its current cycle and waits until it has.
    /// Returns immediately when no loop is running.
    pub async fn end_render_loop(&self) {
        let receiver = {
            let mut state = self.state.borrow_mut();
            if !state.running {
                return;
            }
            state.stop = true;
            let (sender, receiver) = oneshot::channel();
            state.on_stopped.push(sender);
            state.interrupt();
            receiver
        };
        let _ = receiver.await;
        debug!("render loop stopped");
    }

    /// Signals the loop to stop without waiting for it.
    pub fn halt(&self) {
        let mut state = self.state.borrow_mut();
        if state.running {
            state.stop = true;
            state.interrupt();
        }
    }

    /// Renders out of cadence. With `ResizeOnly` this renders right here;
    /// with a running loop it cuts the current wait short and resolves once
    /// the loop has picked the request up.
    pub async fn force_render(&self) {
        let frame_rate = self.frame_rate();
        match frame_rate {
            None | Some(FrameRate::None) => {}
            Some(FrameRate::ResizeOnly) => self.render_once().await,
            Some(FrameRate::FrameMult { .. }) | Some(FrameRate::Millisecond { .. }) => {
                let receiver = {
                    let mut state = self.state.borrow_mut();
                    if !state.running || state.stop {
                        return;
                    }
                    state.skip = true;
                    let (sender, receiver) = oneshot::channel();
                    state.on_skipped.push(sender);
                    state.interrupt();
                    receiver
                };
                let _ = receiver.await;
            }
        }
    }

    async fn render_once(&self) {
        if let Err(e) = (self.render)().await {
            error!("render failed: {}", e);
            (self.on_error)(e);
        }
    }

    /// Waits for `primitive` unless interrupted or the page is hidden first.
    async fn wait(&self, mut primitive: LocalBoxFuture<'static, ()>) -> Wake {
        let mut interrupt = self.state.borrow_mut().arm();
        loop {
            let visibility = self.scheduler.visibility_change();
            match select(primitive, select(interrupt, visibility)).await {
                Either::Left(_) => return Wake::Elapsed,
                Either::Right((Either::Left(_), _)) => return Wake::Interrupted,
                Either::Right((Either::Right((_, pending_interrupt)), pending_primitive)) => {
                    if !self.scheduler.page_visible() {
                        return Wake::Hidden;
                    }
                    primitive = pending_primitive;
                    interrupt = pending_interrupt;
                }
            }
        }
    }

    async fn park_while_hidden(&self) {
        let interrupt = self.state.borrow_mut().arm();
        let _ = select(interrupt, self.scheduler.visibility_change()).await;
    }

    async fn run(&self) {
        loop {
            if !self.scheduler.page_visible() {
                self.park_while_hidden().await;
                self.state.borrow_mut().interrupt = None;
                match self.state.borrow_mut().take_signal() {
                    Signal::Stop => break,
                    Signal::Skip | Signal::Nothing => continue,
                }
            }

            self.render_once().await;

            match self.state.borrow_mut().take_signal() {
                Signal::Stop => break,
                Signal::Skip => continue,
                Signal::Nothing => {}
            }

            let frame_rate = self.state.borrow().frame_rate;
            match frame_rate {
                Some(FrameRate::FrameMult { frame_skips }) => {
                    for _ in 0..=frame_skips {
                        if !matches!(self.wait(self.scheduler.next_frame()).await, Wake::Elapsed) {
                            break;
                        }
                    }
                }
                Some(FrameRate::Millisecond { delay }) => {
                    self.wait(self.scheduler.sleep(delay)).await;
                }
                _ => {
                    error!("render loop running without a looping frame rate");
                    break;
                }
            }
            self.state.borrow_mut().interrupt = None;

            // a hidden page parks at the top of the next cycle
            if let Signal::Stop = self.state.borrow_mut().take_signal() {
                break;
            }
        }
        self.state.borrow_mut().finish();
    }
}
