mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::executor::LocalPool;
use futures::future::FutureExt;

use canvas_wasm::render_loop::{ErrorSignal, RenderFn, RenderLoop};
use canvas_wasm::{CanvasError, FrameRate};
use common::{drive, settle, FakeHost};

struct Fixture {
    pool: LocalPool,
    host: FakeHost,
    renders: Rc<Cell<u32>>,
    errors: Rc<RefCell<Vec<String>>>,
    render_loop: RenderLoop<FakeHost>,
}

fn fixture_with(fail_every_render: bool) -> Fixture {
    let pool = LocalPool::new();
    let host = FakeHost::new(&pool);
    let renders = Rc::new(Cell::new(0));
    let errors = Rc::new(RefCell::new(vec![]));
    let render: RenderFn = {
        let renders = renders.clone();
        Rc::new(move || {
            renders.set(renders.get() + 1);
            let result = if fail_every_render {
                Err(CanvasError::Platform("lost context".into()))
            } else {
                Ok(())
            };
            async move { result }.boxed_local()
        })
    };
    let on_error: ErrorSignal = {
        let errors = errors.clone();
        Rc::new(move |e: CanvasError| errors.borrow_mut().push(e.to_string()))
    };
    let render_loop = RenderLoop::new(host.clone(), render, on_error);
    Fixture {
        pool,
        host,
        renders,
        errors,
        render_loop,
    }
}

fn fixture() -> Fixture {
    fixture_with(false)
}

impl Fixture {
    fn start(&mut self, frame_rate: FrameRate) {
        let render_loop = self.render_loop.clone();
        settle(&mut self.pool, async move { render_loop.set_frame_rate(frame_rate).await }).unwrap();
        self.render_loop.start_render_loop().unwrap();
        self.pool.run_until_stalled();
    }

    fn tick(&mut self) {
        self.host.tick_frame();
        self.pool.run_until_stalled();
    }
}

#[test]
fn frame_mult_waits_frame_skips_plus_one_refreshes() {
    let mut f = fixture();
    f.start(FrameRate::FrameMult { frame_skips: 2 });
    assert_eq!(f.renders.get(), 1);

    f.tick();
    f.tick();
    assert_eq!(f.renders.get(), 1);
    f.tick();
    assert_eq!(f.renders.get(), 2);

    for _ in 0..3 {
        f.tick();
    }
    assert_eq!(f.renders.get(), 3);
}

#[test]
fn frame_mult_zero_renders_every_refresh() {
    let mut f = fixture();
    f.start(FrameRate::FrameMult { frame_skips: 0 });
    for expected in 2..6 {
        f.tick();
        assert_eq!(f.renders.get(), expected);
    }
}

#[test]
fn millisecond_cadence_follows_the_timer() {
    let mut f = fixture();
    f.start(FrameRate::Millisecond { delay: 100 });
    assert_eq!(f.renders.get(), 1);

    f.host.advance(99);
    f.pool.run_until_stalled();
    assert_eq!(f.renders.get(), 1);
    f.host.advance(1);
    f.pool.run_until_stalled();
    assert_eq!(f.renders.get(), 2);
}

#[test]
fn force_render_cuts_the_wait_short_and_resumes() {
    let mut f = fixture();
    f.start(FrameRate::FrameMult { frame_skips: 2 });
    f.tick();

    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move { render_loop.force_render().await });
    assert_eq!(f.renders.get(), 2);
    assert!(f.render_loop.render_loop_running());

    // the cadence restarts from the forced render
    f.tick();
    f.tick();
    assert_eq!(f.renders.get(), 2);
    f.tick();
    assert_eq!(f.renders.get(), 3);
}

#[test]
fn resize_only_renders_inline_and_none_does_nothing() {
    let mut f = fixture();
    f.start(FrameRate::ResizeOnly);
    assert_eq!(f.renders.get(), 0);
    assert!(!f.render_loop.render_loop_running());

    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move { render_loop.force_render().await });
    assert_eq!(f.renders.get(), 1);

    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move { render_loop.set_frame_rate(FrameRate::None).await }).unwrap();
    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move { render_loop.force_render().await });
    assert_eq!(f.renders.get(), 1);
}

#[test]
fn end_render_loop_waits_for_the_loop_to_stop() {
    let mut f = fixture();
    f.start(FrameRate::Millisecond { delay: 50 });

    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move { render_loop.end_render_loop().await });
    assert!(!f.render_loop.render_loop_running());

    f.host.advance(500);
    f.pool.run_until_stalled();
    assert_eq!(f.renders.get(), 1);

    // ending an idle loop is a no-op
    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move { render_loop.end_render_loop().await });
}

#[test]
fn start_rejects_a_running_loop_and_an_unset_rate() {
    let mut f = fixture();
    assert!(matches!(f.render_loop.start_render_loop(), Err(CanvasError::FrameRateUnset)));

    f.start(FrameRate::FrameMult { frame_skips: 0 });
    assert!(matches!(f.render_loop.start_render_loop(), Err(CanvasError::AlreadyRunning)));
    assert!(matches!(f.render_loop.clear_frame_rate(), Err(CanvasError::AlreadyRunning)));
}

#[test]
fn set_frame_rate_restarts_a_running_loop() {
    let mut f = fixture();
    f.start(FrameRate::FrameMult { frame_skips: 5 });
    assert_eq!(f.renders.get(), 1);

    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move {
        render_loop.set_frame_rate(FrameRate::Millisecond { delay: 10 }).await
    })
    .unwrap();
    assert!(f.render_loop.render_loop_running());
    assert_eq!(f.render_loop.frame_rate(), Some(FrameRate::Millisecond { delay: 10 }));
    // the restarted loop renders straight away
    assert_eq!(f.renders.get(), 2);

    f.host.advance(10);
    f.pool.run_until_stalled();
    assert_eq!(f.renders.get(), 3);
    assert_eq!(f.host.pending_frames(), 0);
}

#[test]
fn zero_delay_is_rejected() {
    let mut f = fixture();
    let render_loop = f.render_loop.clone();
    let result = settle(&mut f.pool, async move {
        render_loop.set_frame_rate(FrameRate::Millisecond { delay: 0 }).await
    });
    assert!(matches!(result, Err(CanvasError::Validation(_))));
    assert_eq!(f.render_loop.frame_rate(), None);
}

#[test]
fn hidden_page_parks_the_loop() {
    let mut f = fixture();
    f.start(FrameRate::FrameMult { frame_skips: 0 });
    assert_eq!(f.renders.get(), 1);

    f.host.set_visible(false);
    f.pool.run_until_stalled();
    for _ in 0..5 {
        f.tick();
    }
    assert_eq!(f.renders.get(), 1);
    assert!(f.render_loop.render_loop_running());

    f.host.set_visible(true);
    f.pool.run_until_stalled();
    assert_eq!(f.renders.get(), 2);
    f.tick();
    assert_eq!(f.renders.get(), 3);
}

#[test]
fn parked_loop_still_stops() {
    let mut f = fixture();
    f.start(FrameRate::Millisecond { delay: 20 });
    f.host.set_visible(false);
    f.pool.run_until_stalled();

    let render_loop = f.render_loop.clone();
    settle(&mut f.pool, async move { render_loop.end_render_loop().await });
    assert!(!f.render_loop.render_loop_running());
}

#[test]
fn failed_renders_are_reported_and_the_loop_continues() {
    let mut f = fixture_with(true);
    f.start(FrameRate::FrameMult { frame_skips: 0 });
    f.tick();
    assert_eq!(f.renders.get(), 2);
    assert_eq!(f.errors.borrow().len(), 2);
    assert!(f.errors.borrow()[0].contains("lost context"));
}

#[test]
fn halt_stops_without_waiting() {
    let mut f = fixture();
    f.start(FrameRate::FrameMult { frame_skips: 0 });
    f.render_loop.halt();
    assert_eq!(drive(&mut f.pool, async {}), Some(()));
    assert!(!f.render_loop.render_loop_running());
    f.tick();
    assert_eq!(f.renders.get(), 1);
}
