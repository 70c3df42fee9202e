// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use anyhow::{Context, Result};
use winit::dpi::LogicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

pub const DEFAULT_TITLE: &str = "mandel";

/// Opens the explorer window at `width`x`height` logical pixels.
pub fn open_window(event_loop: &ActiveEventLoop, title: &str, width: u32, height: u32) -> Result<Window> {
    let attrs = Window::default_attributes()
        .with_title(title)
        .with_inner_size(LogicalSize::new(width.max(1), height.max(1)));
    let window = event_loop.create_window(attrs).context("create_window")?;
    let size = window.inner_size();
    tracing::info!("window open ({}x{} physical)", size.width, size.height);
    Ok(window)
}

/// True when the window has no presentable area (minimized or collapsed).
pub fn is_zero_area(window: &Window) -> bool {
    let size = window.inner_size();
    size.width == 0 || size.height == 0
}
