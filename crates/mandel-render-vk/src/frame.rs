// SPDX-License-Identifier: CEPL-1.0

//! Command recording, submission and the per-draw acquire/present protocol.

use ash::vk;
use mandel_render::DrawOutcome;
use tracing::debug;

use crate::context::DeviceContext;
use crate::error::{Result, VkContext};

/// Opaque black.
pub(crate) const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Command pool, its single reusable buffer, and the two semaphores
/// ordering acquire -> render -> present.
pub(crate) struct FrameResources {
    device: ash::Device,
    pub pool: vk::CommandPool,
    pub cmd: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameResources {
    pub unsafe fn new(dctx: &DeviceContext) -> Result<Self> {
        let device = &dctx.device;
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: dctx.families.graphics,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let mut frame = FrameResources {
            device: device.clone(),
            pool: device
                .create_command_pool(&pool_info, None)
                .context("create_command_pool")?,
            cmd: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: frame.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        frame.cmd = device
            .allocate_command_buffers(&alloc_info)
            .context("allocate_command_buffers")?[0];

        let sem_ci = vk::SemaphoreCreateInfo::default();
        frame.image_available = device
            .create_semaphore(&sem_ci, None)
            .context("create_semaphore")?;
        frame.render_finished = device
            .create_semaphore(&sem_ci, None)
            .context("create_semaphore")?;
        Ok(frame)
    }

    pub unsafe fn record(&self, rec: &Recording<'_>) -> Result<()> {
        let d = &self.device;
        let cmd = self.cmd;
        d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .context("reset_command_buffer")?;

        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &begin)
            .context("begin_command_buffer")?;

        let clears = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: rec.extent,
        };
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: rec.render_pass,
            framebuffer: rec.framebuffer,
            render_area,
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

        d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, rec.pipeline);
        d.cmd_bind_vertex_buffers(cmd, 0, &[rec.vertex_buffer], &[0]);
        d.cmd_bind_index_buffer(cmd, rec.index_buffer, 0, vk::IndexType::UINT16);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: rec.extent.width as f32,
            height: rec.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
        d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&render_area));

        if !rec.push.is_empty() {
            d.cmd_push_constants(cmd, rec.layout, vk::ShaderStageFlags::FRAGMENT, 0, rec.push);
        }
        d.cmd_draw_indexed(cmd, rec.index_count, 1, 0, 0, 0);

        d.cmd_end_render_pass(cmd);
        d.end_command_buffer(cmd).context("end_command_buffer")
    }

    pub unsafe fn submit(&self, queue: vk::Queue) -> Result<()> {
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &self.cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &self.render_finished,
            ..Default::default()
        };
        self.device
            .queue_submit(queue, std::slice::from_ref(&submit), vk::Fence::null())
            .context("queue_submit")
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_semaphore(self.image_available, None);
            // Frees the command buffer with it.
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Everything one recording needs; borrowed from the engine for one draw.
pub(crate) struct Recording<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub push: &'a [u8],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Acquired {
    /// Suboptimal images are accepted and rendered.
    Image(u32),
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Presented {
    Done,
    /// Out of date or suboptimal; the swapchain needs rebuilding.
    Stale,
}

pub(crate) fn classify_acquire(r: ash::prelude::VkResult<(u32, bool)>) -> Result<Acquired> {
    match r {
        Ok((index, _suboptimal)) => Ok(Acquired::Image(index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(e) => Err(e).context("acquire_next_image"),
    }
}

pub(crate) fn classify_present(r: ash::prelude::VkResult<bool>) -> Result<Presented> {
    match r {
        Ok(false) => Ok(Presented::Done),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::Stale),
        Err(e) => Err(e).context("queue_present"),
    }
}

/// The swapchain-facing steps of one draw.
pub(crate) trait FrameTarget {
    fn acquire(&mut self) -> Result<Acquired>;
    /// Record and submit for `image`.
    fn render(&mut self, image: u32) -> Result<()>;
    fn present(&mut self, image: u32) -> Result<Presented>;
    fn recreate(&mut self) -> Result<()>;
    fn wait_idle(&mut self) -> Result<()>;
}

/// Acquire, render, present, then block until the device is idle.
///
/// An out-of-date acquire rebuilds the swapchain and retries once; a second
/// out-of-date result skips the draw. A stale present rebuilds afterwards.
pub(crate) fn run_frame(target: &mut impl FrameTarget) -> Result<DrawOutcome> {
    let image = match target.acquire()? {
        Acquired::Image(i) => i,
        Acquired::OutOfDate => {
            debug!("acquire: swapchain out of date, recreating");
            target.recreate()?;
            match target.acquire()? {
                Acquired::Image(i) => i,
                Acquired::OutOfDate => {
                    debug!("acquire still out of date; skipping frame");
                    return Ok(DrawOutcome::Skipped);
                }
            }
        }
    };

    target.render(image)?;

    let outcome = match target.present(image)? {
        Presented::Done => DrawOutcome::Presented,
        Presented::Stale => {
            debug!("present: swapchain stale, recreating");
            target.recreate()?;
            DrawOutcome::PresentedAndRecreated
        }
    };

    target.wait_idle()?;
    Ok(outcome)
}
