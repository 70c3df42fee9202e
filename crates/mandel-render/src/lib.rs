// SPDX-License-Identifier: CEPL-1.0
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub mod color;
pub mod debug;
pub mod escape;
pub mod params;

pub use debug::{Category, DebugMessage, Severity};
pub use params::{
    DrawParameters, FractalRect, DEFAULT_GRADIENT, GRADIENT_CAPACITY, GRADIENT_SENTINEL,
    MAX_PARAMETER_BLOCK_BYTES,
};

/// Built-in escape-time fragment program; its push block is `DrawParameters`.
pub const DEFAULT_FRAGMENT_SHADER: &str = include_str!("../shaders/mandelbrot.frag");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero_area(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a draw call did with the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    Presented,
    /// Presented, but the surface was stale and has been rebuilt since.
    PresentedAndRecreated,
    /// Surface unavailable (e.g. minimized); nothing was rendered.
    Skipped,
}

/// On-demand renderer for a single window surface.
///
/// Calls must be serialized by the caller; every draw blocks until the
/// device is idle again.
pub trait FractalRenderer {
    type Error: std::error::Error + Send + Sync + 'static;

    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        debug: bool,
    ) -> Result<Self, Self::Error>
    where
        Self: Sized;

    /// Releases every native resource. Repeated calls are no-ops.
    fn dispose(&mut self);

    /// Forces swapchain recreation against the current window size.
    fn refresh_surface(&mut self) -> Result<(), Self::Error>;
    fn surface_extent(&self) -> RenderSize;

    fn draw(&mut self, params: &DrawParameters) -> Result<DrawOutcome, Self::Error>;

    /// Replaces the fragment program; on error the previous one stays active.
    fn load_fragment_shader(&mut self, source: &str, block_size: u32) -> Result<(), Self::Error>;

    fn debug_messages(&self) -> Vec<DebugMessage>;
}
