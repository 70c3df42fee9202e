// SPDX-License-Identifier: CEPL-1.0

//! Vulkan backend: draws one full-screen quad through a replaceable
//! escape-time fragment program and presents it to a window surface.

mod buffer;
mod context;
mod debug;
mod engine;
mod error;
mod frame;
mod lifecycle;
mod pipeline;
mod render_pass;
mod shader;
mod surface;

pub use engine::FractalEngine;
pub use error::{EngineError, ErrorKind, Result};
pub use mandel_render::FractalRenderer;
