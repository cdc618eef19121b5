use std::future::Future;
use std::pin::Pin;

pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Timers, clock and task spawning for the single-threaded engine.
///
/// Dropping an interval handle stops it.
pub trait Runtime: 'static {
    type Interval;

    fn now_ms(&self) -> i64;

    fn start_interval(&self, period_ms: u32, tick: Box<dyn FnMut()>) -> Self::Interval;

    fn stop_interval(&self, interval: Self::Interval) {
        drop(interval);
    }

    fn spawn(&self, task: LocalTask);
}

#[cfg(target_arch = "wasm32")]
pub use browser::{BrowserInterval, BrowserRuntime};

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::{LocalTask, Runtime};
    use leptos::logging::warn;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;

    /// `window.setInterval` timers and `spawn_local` tasks.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct BrowserRuntime;

    pub struct BrowserInterval {
        id: Option<i32>,
        // Must outlive the JS timer.
        _tick: Closure<dyn FnMut()>,
    }

    impl Drop for BrowserInterval {
        fn drop(&mut self) {
            if let (Some(win), Some(id)) = (web_sys::window(), self.id.take()) {
                win.clear_interval_with_handle(id);
            }
        }
    }

    impl Runtime for BrowserRuntime {
        type Interval = BrowserInterval;

        fn now_ms(&self) -> i64 {
            crate::util::now_ms()
        }

        fn start_interval(&self, period_ms: u32, tick: Box<dyn FnMut()>) -> BrowserInterval {
            let cb = Closure::wrap(tick);
            let id = web_sys::window().and_then(|win| {
                win.set_interval_with_callback_and_timeout_and_arguments_0(
                    cb.as_ref().unchecked_ref(),
                    i32::try_from(period_ms).unwrap_or(i32::MAX),
                )
                .ok()
            });
            if id.is_none() {
                warn!("setInterval unavailable; timer not started");
            }
            BrowserInterval { id, _tick: cb }
        }

        fn spawn(&self, task: LocalTask) {
            leptos::task::spawn_local(task);
        }
    }
}
