// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::context::DeviceContext;
use crate::error::{EngineError, Result, VkContext};
use crate::pipeline::{QUAD_INDICES, QUAD_VERTICES};

/// First memory type allowed by `type_bits` that has every flag in `req`.
pub(crate) fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
    })
}

/// Buffer with its own dedicated allocation.
pub(crate) struct DeviceBuffer {
    device: ash::Device,
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

pub(crate) unsafe fn create_buffer_and_memory(
    dctx: &DeviceContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
    what: &'static str,
) -> Result<DeviceBuffer> {
    let device = &dctx.device;
    let bci = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let mut out = DeviceBuffer {
        device: device.clone(),
        buffer: device.create_buffer(&bci, None).context("create_buffer")?,
        memory: vk::DeviceMemory::null(),
    };

    let req = device.get_buffer_memory_requirements(out.buffer);
    let mem_type = find_memory_type(&dctx.memory, req.memory_type_bits, props)
        .ok_or(EngineError::NoMemoryType(what))?;
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: mem_type,
        ..Default::default()
    };
    out.memory = device.allocate_memory(&mai, None).context("allocate_memory")?;
    device
        .bind_buffer_memory(out.buffer, out.memory, 0)
        .context("bind_buffer_memory")?;
    Ok(out)
}

/// Host -> staging -> device-local copy on the graphics queue. Blocks until done.
pub(crate) unsafe fn upload_via_staging(
    dctx: &DeviceContext,
    cmd_pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    src_data: &[u8],
    what: &'static str,
) -> Result<DeviceBuffer> {
    let device = &dctx.device;
    let size = src_data.len() as vk::DeviceSize;

    let staging = create_buffer_and_memory(
        dctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        "staging buffer",
    )?;
    let ptr = device
        .map_memory(staging.memory, 0, size, vk::MemoryMapFlags::empty())
        .context("map_memory")?;
    std::ptr::copy_nonoverlapping(src_data.as_ptr(), ptr as *mut u8, src_data.len());
    device.unmap_memory(staging.memory);

    let dst = create_buffer_and_memory(
        dctx,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        what,
    )?;

    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: cmd_pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let cmd = device
        .allocate_command_buffers(&ai)
        .context("allocate_command_buffers")?[0];

    let copied = record_and_submit_copy(dctx, cmd, staging.buffer, dst.buffer, size);
    device.free_command_buffers(cmd_pool, std::slice::from_ref(&cmd));
    copied?;
    Ok(dst)
}

unsafe fn record_and_submit_copy(
    dctx: &DeviceContext,
    cmd: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let device = &dctx.device;
    let bi = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &bi)
        .context("begin_command_buffer")?;
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
    device.end_command_buffer(cmd).context("end_command_buffer")?;

    let si = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        ..Default::default()
    };
    device
        .queue_submit(dctx.graphics_queue, std::slice::from_ref(&si), vk::Fence::null())
        .context("queue_submit")?;
    device
        .queue_wait_idle(dctx.graphics_queue)
        .context("queue_wait_idle")
}

/// Device-local vertex and 16-bit index buffers for the quad.
pub(crate) struct QuadGeometry {
    pub vertices: DeviceBuffer,
    pub indices: DeviceBuffer,
}

impl QuadGeometry {
    pub const INDEX_COUNT: u32 = QUAD_INDICES.len() as u32;

    pub unsafe fn new(dctx: &DeviceContext, cmd_pool: vk::CommandPool) -> Result<Self> {
        let vertices = upload_via_staging(
            dctx,
            cmd_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
            "vertex buffer",
        )?;
        let indices = upload_via_staging(
            dctx,
            cmd_pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&QUAD_INDICES),
            "index buffer",
        )?;
        Ok(QuadGeometry { vertices, indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &f) in p.memory_types.iter_mut().zip(flags) {
            slot.property_flags = f;
        }
        p
    }

    #[test]
    fn picks_first_allowed_type_with_all_flags() {
        use vk::MemoryPropertyFlags as F;
        let p = props(&[F::DEVICE_LOCAL, F::HOST_VISIBLE, F::HOST_VISIBLE | F::HOST_COHERENT]);
        let host = F::HOST_VISIBLE | F::HOST_COHERENT;
        assert_eq!(find_memory_type(&p, 0b111, host), Some(2));
        assert_eq!(find_memory_type(&p, 0b111, F::DEVICE_LOCAL), Some(0));
        assert_eq!(find_memory_type(&p, 0b110, F::HOST_VISIBLE), Some(1));
    }

    #[test]
    fn respects_type_bits() {
        use vk::MemoryPropertyFlags as F;
        let p = props(&[F::DEVICE_LOCAL, F::DEVICE_LOCAL]);
        assert_eq!(find_memory_type(&p, 0b10, F::DEVICE_LOCAL), Some(1));
        assert_eq!(find_memory_type(&p, 0b00, F::DEVICE_LOCAL), None);
        assert_eq!(find_memory_type(&p, 0b11, F::HOST_VISIBLE), None);
    }

    #[test]
    fn geometry_bytes_match_layout() {
        let vb: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let ib: &[u8] = bytemuck::cast_slice(&QUAD_INDICES);
        assert_eq!(vb.len(), 4 * 20);
        assert_eq!(ib.len(), 6 * 2);
        assert_eq!(QuadGeometry::INDEX_COUNT, 6);
    }
}
