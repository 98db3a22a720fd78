//! Animated metaball background for a canvas, rendered with WebGL2.
//!
//! The simulation, shader generation and frame loop are target independent
//! and run headless on the host; the browser glue only builds for wasm32.

pub mod config;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod shader;
pub mod simulation;

pub use config::Options;
pub use driver::{FrameScheduler, FrameSink, LoopState, ObstacleSource, RenderLoop};
pub use error::RenderError;
pub use geometry::{Rect, MAX_RECTS};
pub use shader::{Mode, ProgramKey};
pub use simulation::{Metaball, Simulation};

// Only compile wasm-specific code when targeting wasm32.

#[cfg(target_arch = "wasm32")]
pub mod wasm {
    use wasm_bindgen::prelude::*;

    mod controller;
    mod render;
    mod tracker;

    pub use controller::{MetaBalls, ScrollFade};
    pub use tracker::rects_for_selector;

    #[wasm_bindgen(start)]
    pub fn main() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).ok();
        log::info!("metaballs module loaded");
        Ok(())
    }
}
