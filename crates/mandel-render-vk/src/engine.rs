// SPDX-License-Identifier: CEPL-1.0
use ash::khr::swapchain;
use ash::vk;
use mandel_render::{
    DebugMessage, DrawOutcome, DrawParameters, FractalRenderer, RenderSize, DEFAULT_FRAGMENT_SHADER,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::buffer::QuadGeometry;
use crate::context::{DeviceContext, InstanceContext};
use crate::debug::MessageLog;
use crate::error::{EngineError, Result};
use crate::lifecycle::{HasExtent, Lifecycle};
use crate::frame::{
    classify_acquire, classify_present, run_frame, Acquired, FrameResources, FrameTarget,
    Presented, Recording,
};
use crate::pipeline::{validate_block_size, FragmentProgram};
use crate::render_pass::RenderPass;
use crate::shader::{quad_vertex_spirv, ShaderCompiler, ShaderModule, FRAGMENT_SHADER_NAME};
use crate::surface::{wait_for_area, PresentSurface, SurfaceConfig, Swapchain, MINIMIZED_POLL};

const BUILT_IN_SHADER_NAME: &str = "mandelbrot.frag";

/// Vulkan escape-time renderer bound to one window surface.
///
/// Draws on demand: every `draw` blocks until the device is idle again.
/// After `dispose` only the last extent and the captured debug messages
/// remain readable; everything else reports [`EngineError::Disposed`].
pub struct FractalEngine {
    life: Lifecycle<Live>,
}

// STRICT TEARDOWN ORDER: fields drop top to bottom, the reverse of creation.
// - Live::drop waits for device idle first
// - Command pool/semaphores, buffers, pipeline+layout, modules
// - Swapchain bundle (framebuffers, views, swapchain) BEFORE render pass
// - Device, then surface; instance (and debug messenger) last
struct Live {
    frame: FrameResources,
    geometry: QuadGeometry,
    program: FragmentProgram,
    vertex_shader: ShaderModule,
    swapchain: Option<Swapchain>,
    render_pass: RenderPass,
    swapchain_loader: swapchain::Device,
    compiler: ShaderCompiler,
    config: SurfaceConfig,
    device: DeviceContext,
    surface: PresentSurface,
    _instance: InstanceContext,
}

impl Drop for Live {
    fn drop(&mut self) {
        unsafe { self.device.device.device_wait_idle().ok() };
    }
}

// Locals drop in reverse declaration order, so every `?` below unwinds
// exactly what was built before it.
unsafe fn build_live(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    debug: bool,
    log: &MessageLog,
) -> Result<Live> {
    let dh = display.display_handle()?.as_raw();
    let wh = window.window_handle()?.as_raw();

    let instance = InstanceContext::new(dh, debug, log)?;
    let surface = PresentSurface::new(&instance, dh, wh)?;
    let device = DeviceContext::new(&instance, &surface)?;
    let config = surface.negotiate(device.phys)?;
    let compiler = ShaderCompiler::new()?;
    let swapchain_loader = swapchain::Device::new(&instance.instance, &device.device);

    let render_pass = RenderPass::new(&device.device, config.format.format)?;
    let sc = Swapchain::new(&device, &swapchain_loader, &surface, config, render_pass.handle)?;

    let vertex_shader = ShaderModule::new(&device.device, &quad_vertex_spirv()?)?;
    let fragment = compiler.compile_fragment(DEFAULT_FRAGMENT_SHADER, BUILT_IN_SHADER_NAME)?;
    let program = FragmentProgram::new(
        &device.device,
        render_pass.handle,
        vertex_shader.handle,
        &fragment,
        DrawParameters::SIZE,
    )?;

    let frame = FrameResources::new(&device)?;
    let geometry = QuadGeometry::new(&device, frame.pool)?;

    Ok(Live {
        frame,
        geometry,
        program,
        vertex_shader,
        swapchain: Some(sc),
        render_pass,
        swapchain_loader,
        compiler,
        config,
        device,
        surface,
        _instance: instance,
    })
}

impl HasExtent for Live {
    fn extent(&self) -> RenderSize {
        self.swapchain.as_ref().map_or(RenderSize::default(), |sc| RenderSize {
            width: sc.extent.width,
            height: sc.extent.height,
        })
    }
}

impl Live {
    /// Rebuilds swapchain, views and framebuffers. Blocks while the surface
    /// has zero area. Render pass and pipeline are kept.
    unsafe fn recreate_swapchain(&mut self) -> Result<()> {
        let surface = &self.surface;
        let phys = self.device.phys;
        wait_for_area(|| surface.capabilities(phys), MINIMIZED_POLL)?;

        self.device.wait_idle()?;
        self.swapchain = None;
        self.swapchain = Some(Swapchain::new(
            &self.device,
            &self.swapchain_loader,
            &self.surface,
            self.config,
            self.render_pass.handle,
        )?);
        Ok(())
    }

    /// Compiles and builds the replacement before touching the installed
    /// program, so any failure leaves the old one drawing.
    unsafe fn replace_fragment_program(&mut self, source: &str, block_size: u32) -> Result<()> {
        let code = self.compiler.compile_fragment(source, FRAGMENT_SHADER_NAME)?;
        let program = FragmentProgram::new(
            &self.device.device,
            self.render_pass.handle,
            self.vertex_shader.handle,
            &code,
            block_size,
        )
        .map_err(|e| EngineError::Program(Box::new(e)))?;
        self.device.wait_idle()?;
        self.program = program;
        Ok(())
    }

    fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain.as_ref().ok_or(EngineError::NoSwapchain)
    }
}

/// One draw's view of the engine, driven by [`run_frame`].
struct DrawPass<'a> {
    live: &'a mut Live,
    push: &'a [u8],
}

impl FrameTarget for DrawPass<'_> {
    fn acquire(&mut self) -> Result<Acquired> {
        let Some(sc) = self.live.swapchain.as_ref() else {
            return Ok(Acquired::OutOfDate);
        };
        unsafe {
            classify_acquire(self.live.swapchain_loader.acquire_next_image(
                sc.handle,
                u64::MAX,
                self.live.frame.image_available,
                vk::Fence::null(),
            ))
        }
    }

    fn render(&mut self, image: u32) -> Result<()> {
        let live = &*self.live;
        let sc = live.swapchain()?;
        let rec = Recording {
            render_pass: live.render_pass.handle,
            framebuffer: sc.framebuffers[image as usize],
            extent: sc.extent,
            pipeline: live.program.pipeline,
            layout: live.program.layout,
            vertex_buffer: live.geometry.vertices.buffer,
            index_buffer: live.geometry.indices.buffer,
            index_count: QuadGeometry::INDEX_COUNT,
            push: self.push,
        };
        unsafe {
            live.frame.record(&rec)?;
            live.frame.submit(live.device.graphics_queue)
        }
    }

    fn present(&mut self, image: u32) -> Result<Presented> {
        let live = &*self.live;
        let sc = live.swapchain()?;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &live.frame.render_finished,
            swapchain_count: 1,
            p_swapchains: &sc.handle,
            p_image_indices: &image,
            ..Default::default()
        };
        unsafe {
            classify_present(
                live.swapchain_loader
                    .queue_present(live.device.present_queue, &present),
            )
        }
    }

    fn recreate(&mut self) -> Result<()> {
        unsafe { self.live.recreate_swapchain() }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.live.device.wait_idle() }
    }
}

impl FractalEngine {
    /// Draws with a raw parameter block, for fragment programs whose block
    /// is not [`DrawParameters`]. Bytes past the installed size are ignored.
    pub fn draw_raw(&mut self, block: &[u8]) -> Result<DrawOutcome> {
        let live = self.life.get_mut()?;
        let want = live.program.push_size;
        if block.len() < want as usize {
            return Err(EngineError::BlockTooShort {
                got: block.len(),
                want,
            });
        }

        let outcome = run_frame(&mut DrawPass {
            live,
            push: &block[..want as usize],
        })?;
        if outcome != DrawOutcome::Presented {
            debug!(?outcome, "draw");
        }
        Ok(outcome)
    }
}

impl FractalRenderer for FractalEngine {
    type Error = EngineError;

    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        debug: bool,
    ) -> Result<Self> {
        let log = MessageLog::default();
        let live = unsafe { build_live(window, display, debug, &log) }
            .map_err(EngineError::during_init)?;
        let extent = live.extent();
        let debug_enabled = debug;
        info!(
            width = extent.width,
            height = extent.height,
            debug = debug_enabled,
            "fractal engine ready"
        );
        Ok(FractalEngine {
            life: Lifecycle::new(live, log),
        })
    }

    fn dispose(&mut self) {
        if self.life.dispose() {
            info!("fractal engine disposed");
        }
    }

    fn refresh_surface(&mut self) -> Result<()> {
        let live = self.life.get_mut()?;
        unsafe { live.recreate_swapchain() }?;
        let extent = live.extent();
        debug!(width = extent.width, height = extent.height, "surface refreshed");
        Ok(())
    }

    fn surface_extent(&self) -> RenderSize {
        self.life.extent()
    }

    fn draw(&mut self, params: &DrawParameters) -> Result<DrawOutcome> {
        self.draw_raw(params.as_bytes())
    }

    fn load_fragment_shader(&mut self, source: &str, block_size: u32) -> Result<()> {
        let live = self.life.get_mut()?;
        validate_block_size(block_size)?;
        unsafe { live.replace_fragment_program(source, block_size) }?;
        info!(block_size, "fragment program replaced");
        Ok(())
    }

    fn debug_messages(&self) -> Vec<DebugMessage> {
        self.life.messages()
    }
}

impl Drop for FractalEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mandel_render::FractalRect;

    const LAST: RenderSize = RenderSize {
        width: 1280,
        height: 720,
    };

    fn disposed_engine() -> FractalEngine {
        FractalEngine {
            life: Lifecycle::disposed(LAST, MessageLog::default()),
        }
    }

    fn params() -> DrawParameters {
        let rect = FractalRect {
            top: 2.0,
            left: -3.0,
            right: 1.0,
            bottom: -2.0,
        };
        DrawParameters::new(rect, LAST)
    }

    #[test]
    fn disposed_engine_rejects_operations() {
        let mut e = disposed_engine();
        assert_eq!(e.draw(&params()).unwrap_err().kind(), ErrorKind::Disposed);
        assert_eq!(e.draw_raw(&[0; 128]).unwrap_err().kind(), ErrorKind::Disposed);
        assert_eq!(e.refresh_surface().unwrap_err().kind(), ErrorKind::Disposed);
        assert_eq!(
            e.load_fragment_shader(DEFAULT_FRAGMENT_SHADER, DrawParameters::SIZE)
                .unwrap_err()
                .kind(),
            ErrorKind::Disposed
        );
    }

    #[test]
    fn disposed_check_precedes_argument_checks() {
        let mut e = disposed_engine();
        let err = e.load_fragment_shader("", 7).unwrap_err();
        assert!(matches!(err, EngineError::Disposed));
    }

    #[test]
    fn dispose_twice_keeps_queries_stable() {
        let mut e = disposed_engine();
        let before = e.debug_messages();
        e.dispose();
        e.dispose();
        assert_eq!(e.debug_messages(), before);
        assert_eq!(e.surface_extent(), LAST);
    }
}
