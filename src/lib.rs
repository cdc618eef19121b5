pub mod api;
pub mod config;
pub mod drafts;
pub mod models;
pub mod runtime;
pub mod state;
pub mod tasks;
mod util;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, ApiErrorKind, ApiResult, Gateway};
pub use config::EditorConfig;
pub use models::{Presentation, Slide, SlideContent, SlideLayout, Task, TaskStatus};
pub use runtime::Runtime;
#[cfg(target_arch = "wasm32")]
pub use runtime::BrowserRuntime;
pub use state::{EditorMessage, EditorSession};
pub use tasks::TaskTracker;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    let config = EditorConfig::load();
    leptos::logging::log!("slide editor engine ready, backend at {}", config.api_url);
}
