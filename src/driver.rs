//! The per-frame cycle and its start/stop state machine.
//!
//! [`RenderLoop`] owns the simulation and the obstacle lists. The host side
//! plugs in three capabilities: a [`FrameScheduler`] that arms the next frame,
//! a [`FrameSink`] that receives packed buffers and draws, and an
//! [`ObstacleSource`] that resolves selectors to rects. Keeping those behind
//! traits lets the whole loop run headless in tests.

use crate::config::ObstacleSelectors;
use crate::error::RenderError;
use crate::geometry::{cap_rects, Rect, MAX_RECTS};
use crate::shader::{Mode, ProgramKey};
use crate::simulation::Simulation;
use log::debug;
use rand::Rng;

/// Opaque id of a scheduled frame, as returned by `requestAnimationFrame`.
pub type FrameHandle = i32;

/// Below this opacity the loop stops instead of drawing invisible frames.
pub const OPACITY_EPSILON: f64 = 0.001;

pub trait FrameScheduler {
    /// Arm the next frame.
    fn request_frame(&mut self) -> Result<FrameHandle, RenderError>;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Destination of one frame's data.
pub trait FrameSink {
    /// `x, y, r` per ball.
    fn upload_metaballs(&mut self, data: &[f32]);
    /// `x, y, width, height` per rect, padded to [`MAX_RECTS`], plus the
    /// number of live rects.
    fn upload_mask(&mut self, rects: &[f32], count: i32);
    fn draw(&mut self);
}

/// Resolves a selector to the rects of the matching elements. No match is an
/// empty list.
pub trait ObstacleSource {
    fn rects_for_selector(&self, selector: &str) -> Vec<Rect>;
}

impl<F> ObstacleSource for F
where
    F: Fn(&str) -> Vec<Rect>,
{
    fn rects_for_selector(&self, selector: &str) -> Vec<Rect> {
        self(selector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    /// A frame is scheduled under this handle.
    Running(FrameHandle),
}

pub struct RenderLoop {
    simulation: Simulation,
    mode: Mode,
    selectors: ObstacleSelectors,
    bounce_rects: Vec<Rect>,
    mask_rects: Vec<Rect>,
    opacity: f64,
    state: LoopState,
    ball_data: Vec<f32>,
    mask_data: Vec<f32>,
}

impl RenderLoop {
    /// A stopped loop. Call [`RenderLoop::start`] or
    /// [`RenderLoop::set_opacity`] to begin drawing.
    pub fn new(
        simulation: Simulation,
        mode: Mode,
        selectors: ObstacleSelectors,
        opacity: f64,
    ) -> Self {
        Self {
            ball_data: Vec::with_capacity(simulation.len() * 3),
            mask_data: Vec::with_capacity(MAX_RECTS * 4),
            simulation,
            mode,
            selectors,
            bounce_rects: Vec::new(),
            mask_rects: Vec::new(),
            opacity: clamp_opacity(opacity),
            state: LoopState::Stopped,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, LoopState::Running(_))
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn bounce_rects(&self) -> &[Rect] {
        &self.bounce_rects
    }

    pub fn mask_rects(&self) -> &[Rect] {
        &self.mask_rects
    }

    /// Re-query both obstacle lists. Behaviours that are off for the current
    /// mode get an empty list.
    pub fn refresh_obstacles<S: ObstacleSource + ?Sized>(&mut self, source: &S) {
        let query = |selector: &Option<String>| match selector {
            Some(s) => cap_rects(source.rects_for_selector(s)),
            None => Vec::new(),
        };
        self.bounce_rects = query(&self.selectors.bounce);
        self.mask_rects = query(&self.selectors.mask);
    }

    /// Schedule a frame unless one is already pending or the loop is
    /// invisible.
    pub fn start<F: FrameScheduler + ?Sized>(
        &mut self,
        scheduler: &mut F,
    ) -> Result<(), RenderError> {
        if self.is_running() || self.opacity <= 0.0 {
            return Ok(());
        }
        self.state = LoopState::Running(scheduler.request_frame()?);
        debug!("metaball loop started");
        Ok(())
    }

    /// Cancel the pending frame, if any.
    pub fn stop<F: FrameScheduler + ?Sized>(&mut self, scheduler: &mut F) {
        if let LoopState::Running(handle) = self.state {
            scheduler.cancel_frame(handle);
            self.state = LoopState::Stopped;
            debug!("metaball loop stopped");
        }
    }

    /// Apply the external visibility signal. Positive values resume drawing
    /// from wherever the balls were paused.
    pub fn set_opacity<F: FrameScheduler + ?Sized>(
        &mut self,
        value: f64,
        scheduler: &mut F,
    ) -> Result<(), RenderError> {
        self.opacity = clamp_opacity(value);
        if self.opacity > 0.0 {
            self.start(scheduler)
        } else {
            self.stop(scheduler);
            Ok(())
        }
    }

    /// Swap in a reseeded simulation after a count, speed or size change.
    /// The loop goes through `Stopped` and restarts if still visible.
    pub fn replace_simulation<F: FrameScheduler + ?Sized>(
        &mut self,
        simulation: Simulation,
        scheduler: &mut F,
    ) -> Result<(), RenderError> {
        self.stop(scheduler);
        self.simulation = simulation;
        self.start(scheduler)
    }

    /// Move from the program baked for `current` to one baked for `next`.
    ///
    /// An equal key is a no-op and returns `false`. Otherwise the loop stops,
    /// `rebuild` compiles the new program and the balls are reseeded inside
    /// the new bounds. The loop restarts only if it is still visible. When
    /// `rebuild` fails the loop stays stopped with the old balls.
    pub fn rekey<R, F, B>(
        &mut self,
        current: &ProgramKey,
        next: ProgramKey,
        speed: f32,
        rng: &mut R,
        scheduler: &mut F,
        rebuild: B,
    ) -> Result<bool, RenderError>
    where
        R: Rng + ?Sized,
        F: FrameScheduler + ?Sized,
        B: FnOnce(ProgramKey) -> Result<(), RenderError>,
    {
        if *current == next {
            return Ok(false);
        }
        self.stop(scheduler);
        rebuild(next)?;

        let simulation = Simulation::new(
            rng,
            next.count,
            next.width as f32,
            next.height as f32,
            speed,
        );
        debug!("metaballs reseeded for {}x{}", next.width, next.height);
        self.replace_simulation(simulation, scheduler)?;
        Ok(true)
    }

    /// Run one frame. Called when the scheduled frame fires.
    pub fn tick<S, F>(&mut self, sink: &mut S, scheduler: &mut F) -> Result<(), RenderError>
    where
        S: FrameSink + ?Sized,
        F: FrameScheduler + ?Sized,
    {
        if !self.is_running() {
            // Frame fired after a stop; nothing is pending any more.
            return Ok(());
        }
        self.state = LoopState::Stopped;

        if self.opacity < OPACITY_EPSILON {
            debug!("metaball loop paused at opacity {}", self.opacity);
            return Ok(());
        }

        let obstacles = if self.mode.uses_bounce() {
            Some(self.bounce_rects.as_slice())
        } else {
            None
        };
        self.simulation.step(obstacles);

        self.simulation.pack_into(&mut self.ball_data);
        sink.upload_metaballs(&self.ball_data);

        if self.mode.uses_mask() {
            pack_rects(&self.mask_rects, &mut self.mask_data);
            sink.upload_mask(&self.mask_data, self.mask_rects.len() as i32);
        }

        sink.draw();
        self.state = LoopState::Running(scheduler.request_frame()?);
        Ok(())
    }
}

/// Clamp into `[0, 1]`, mapping `NaN` to fully transparent.
pub fn clamp_opacity(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Fill `out` with `4 * MAX_RECTS` floats, zero past the live rects.
fn pack_rects(rects: &[Rect], out: &mut Vec<f32>) {
    out.clear();
    out.resize(MAX_RECTS * 4, 0.0);
    for (slot, rect) in out.chunks_exact_mut(4).zip(rects) {
        slot.copy_from_slice(&[rect.x, rect.y, rect.width, rect.height]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rects_are_zero_padded() {
        let mut out = vec![7.0; 3];
        pack_rects(&[Rect::new(1.0, 2.0, 3.0, 4.0)], &mut out);
        assert_eq!(out.len(), 64);
        assert_eq!(&out[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert!(out[4..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn opacity_is_clamped() {
        assert_eq!(clamp_opacity(1.5), 1.0);
        assert_eq!(clamp_opacity(-0.2), 0.0);
        assert_eq!(clamp_opacity(f64::NAN), 0.0);
    }

    #[test]
    fn closures_are_obstacle_sources() {
        let source = |s: &str| {
            if s == ".card" {
                vec![Rect::new(0.0, 0.0, 1.0, 1.0)]
            } else {
                Vec::new()
            }
        };
        assert_eq!(source.rects_for_selector(".card").len(), 1);
        assert!(source.rects_for_selector(".none").is_empty());
    }
}
