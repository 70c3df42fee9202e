// SPDX-License-Identifier: CEPL-1.0

//! Presentable surface, format/mode/extent negotiation and the swapchain bundle.

use std::time::Duration;

use ash::khr::{surface, swapchain};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

use crate::context::{DeviceContext, InstanceContext, QueueFamilies};
use crate::error::{EngineError, Result, VkContext};
use crate::render_pass::create_framebuffers;

/// Pause between extent polls while the window has no area.
pub(crate) const MINIMIZED_POLL: Duration = Duration::from_millis(5);

/// Owns the `VkSurfaceKHR`. Must be dropped after the device, before the instance.
pub(crate) struct PresentSurface {
    pub loader: surface::Instance,
    pub handle: vk::SurfaceKHR,
}

impl PresentSurface {
    pub unsafe fn new(
        ictx: &InstanceContext,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        let loader = surface::Instance::new(&ictx.entry, &ictx.instance);
        let handle = ash_window::create_surface(&ictx.entry, &ictx.instance, display, window, None)
            .context("create_surface")?;
        Ok(PresentSurface { loader, handle })
    }

    pub unsafe fn supports_present(&self, phys: vk::PhysicalDevice, family: u32) -> bool {
        self.loader
            .get_physical_device_surface_support(phys, family, self.handle)
            .unwrap_or(false)
    }

    pub unsafe fn capabilities(&self, phys: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        self.loader
            .get_physical_device_surface_capabilities(phys, self.handle)
            .context("get_physical_device_surface_capabilities")
    }

    /// Negotiates format and present mode once; both stay fixed for the
    /// engine's lifetime (the render pass is built against the format).
    pub unsafe fn negotiate(&self, phys: vk::PhysicalDevice) -> Result<SurfaceConfig> {
        let formats = self
            .loader
            .get_physical_device_surface_formats(phys, self.handle)
            .context("get_physical_device_surface_formats")?;
        let modes = self
            .loader
            .get_physical_device_surface_present_modes(phys, self.handle)
            .context("get_physical_device_surface_present_modes")?;
        Ok(SurfaceConfig {
            format: choose_surface_format(&formats)?,
            present_mode: choose_present_mode(&modes)?,
        })
    }
}

impl Drop for PresentSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SurfaceConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .ok_or(EngineError::NoSurfaceFormats)
}

pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> Result<vk::PresentModeKHR> {
    if modes.is_empty() {
        Err(EngineError::NoPresentModes)
    } else if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        Ok(vk::PresentModeKHR::MAILBOX)
    } else {
        Ok(vk::PresentModeKHR::FIFO)
    }
}

/// The surface must report a defined extent; sizing from the window is not done here.
pub(crate) fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR) -> Result<vk::Extent2D> {
    if caps.current_extent.width == u32::MAX {
        Err(EngineError::UndefinedExtent)
    } else {
        Ok(caps.current_extent)
    }
}

/// One more than the minimum, clamped to the maximum (0 = unbounded).
pub(crate) fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub(crate) fn sharing(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

pub(crate) fn has_area(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// Polls `read` until the surface reports a non-zero extent, and returns the
/// capabilities that extent came from. Blocks while minimized.
pub(crate) fn wait_for_area(
    mut read: impl FnMut() -> Result<vk::SurfaceCapabilitiesKHR>,
    pause: Duration,
) -> Result<(vk::SurfaceCapabilitiesKHR, vk::Extent2D)> {
    let mut logged = false;
    loop {
        let caps = read()?;
        let extent = extent_from_caps(&caps)?;
        if has_area(extent) {
            return Ok((caps, extent));
        }
        if !logged {
            debug!("surface has zero area; waiting");
            logged = true;
        }
        std::thread::sleep(pause);
    }
}

/// Swapchain plus everything sized by it: image views and framebuffers.
/// Created and destroyed as a unit.
pub(crate) struct Swapchain {
    device: ash::Device,
    loader: swapchain::Device,
    pub handle: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    pub unsafe fn new(
        dctx: &DeviceContext,
        loader: &swapchain::Device,
        surface: &PresentSurface,
        config: SurfaceConfig,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        // Capabilities are re-read here, right before creation; the window may
        // have been minimized since the caller last looked.
        let (caps, extent) = wait_for_area(|| surface.capabilities(dctx.phys), MINIMIZED_POLL)?;
        let (sharing_mode, family_indices) = sharing(dctx.families);

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.handle,
            min_image_count: image_count(&caps),
            image_format: config.format.format,
            image_color_space: config.format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: config.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        let handle = loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;

        // From here on, early returns unwind through Drop.
        let mut sc = Swapchain {
            device: dctx.device.clone(),
            loader: loader.clone(),
            handle,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        };
        sc.images = loader
            .get_swapchain_images(handle)
            .context("get_swapchain_images")?;

        for &img in &sc.images {
            let sub = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            };
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: img,
                view_type: vk::ImageViewType::TYPE_2D,
                format: config.format.format,
                subresource_range: sub,
                ..Default::default()
            };
            let view = sc
                .device
                .create_image_view(&iv_info, None)
                .context("create_image_view")?;
            sc.views.push(view);
        }

        create_framebuffers(&sc.device, render_pass, &sc.views, extent, &mut sc.framebuffers)?;

        info!(
            width = extent.width,
            height = extent.height,
            images = sc.images.len(),
            format = ?config.format.format,
            present_mode = ?config.present_mode,
            "swapchain ready"
        );
        Ok(sc)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &fb in &self.framebuffers {
                self.device.destroy_framebuffer(fb, None);
            }
            for &iv in &self.views {
                self.device.destroy_image_view(iv, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(min: u32, max: u32, w: u32, h: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: w, height: h },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_bgra_is_preferred() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let f = choose_surface_format(&formats).unwrap();
        assert_eq!(f.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(f.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn first_format_is_fallback() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let f = choose_surface_format(&formats).unwrap();
        assert_eq!(f.format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(f.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
        assert!(matches!(choose_surface_format(&[]), Err(EngineError::NoSurfaceFormats)));
    }

    #[test]
    fn mailbox_then_fifo() {
        use vk::PresentModeKHR as M;
        assert_eq!(choose_present_mode(&[M::FIFO, M::MAILBOX]).unwrap(), M::MAILBOX);
        assert_eq!(choose_present_mode(&[M::IMMEDIATE, M::FIFO]).unwrap(), M::FIFO);
        assert!(matches!(choose_present_mode(&[]), Err(EngineError::NoPresentModes)));
    }

    #[test]
    fn undefined_extent_is_fatal() {
        assert!(matches!(
            extent_from_caps(&caps(2, 3, u32::MAX, u32::MAX)),
            Err(EngineError::UndefinedExtent)
        ));
        let e = extent_from_caps(&caps(2, 3, 800, 600)).unwrap();
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn image_count_is_clamped() {
        assert_eq!(image_count(&caps(2, 0, 1, 1)), 3);
        assert_eq!(image_count(&caps(2, 8, 1, 1)), 3);
        assert_eq!(image_count(&caps(3, 3, 1, 1)), 3);
    }

    #[test]
    fn sharing_follows_family_split() {
        let same = QueueFamilies { graphics: 0, present: 0 };
        assert_eq!(sharing(same), (vk::SharingMode::EXCLUSIVE, vec![]));
        let split = QueueFamilies { graphics: 0, present: 2 };
        assert_eq!(sharing(split), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }

    #[test]
    fn waits_out_minimized_window() {
        let calls = Cell::new(0u32);
        let (c, extent) = wait_for_area(
            || {
                calls.set(calls.get() + 1);
                Ok(match calls.get() {
                    1 => caps(2, 0, 0, 0),
                    2 => caps(2, 0, 640, 0),
                    _ => caps(4, 0, 640, 480),
                })
            },
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(calls.get(), 3);
        assert_eq!((extent.width, extent.height), (640, 480));
        // Image count comes from the same read as the extent.
        assert_eq!(image_count(&c), 5);
    }

    #[test]
    fn minimize_after_an_earlier_wait_is_waited_out_again() {
        // Sized when first checked, then minimized before the swapchain is built.
        let seq = [caps(2, 0, 800, 600), caps(2, 0, 0, 0), caps(2, 0, 1024, 768)];
        let first = wait_for_area(|| Ok(seq[0]), Duration::ZERO).unwrap().1;
        assert!(has_area(first));

        let calls = Cell::new(1usize);
        let (_, extent) = wait_for_area(
            || {
                let c = seq[calls.get()];
                calls.set(calls.get() + 1);
                Ok(c)
            },
            Duration::ZERO,
        )
        .unwrap();
        assert!(has_area(extent));
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn zero_extent_has_no_area() {
        assert!(!has_area(vk::Extent2D { width: 0, height: 0 }));
        assert!(!has_area(vk::Extent2D { width: 0, height: 600 }));
        assert!(has_area(vk::Extent2D { width: 1, height: 1 }));
    }

    #[test]
    fn extent_wait_propagates_errors() {
        let r = wait_for_area(|| Err(EngineError::UndefinedExtent), Duration::ZERO);
        assert!(matches!(r, Err(EngineError::UndefinedExtent)));
        let r = wait_for_area(|| Ok(caps(2, 0, u32::MAX, u32::MAX)), Duration::ZERO);
        assert!(matches!(r, Err(EngineError::UndefinedExtent)));
    }
}
