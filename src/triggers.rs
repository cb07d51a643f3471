use futures::future::LocalBoxFuture;

pub type TriggerFuture<'a> = LocalBoxFuture<'a, anyhow::Result<()>>;

/// Caller code hooked into the canvas lifecycle.
///
/// `setup` runs once the canvas and its context exist, before the first
/// render. `render` runs once per loop cycle or forced render; in
/// full-canvas shader mode it runs before the quad is drawn. `tear_down` runs
/// before the canvas resources are released. The manager's lock is released
/// while `setup` and `tear_down` run, so they may use the manager's accessors.
pub trait Triggers {
    fn setup(&self) -> TriggerFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn render(&self) -> TriggerFuture<'_>;

    /// False when `render` does nothing; looping frame rates need a render.
    fn has_render(&self) -> bool {
        true
    }

    fn tear_down(&self) -> TriggerFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}
