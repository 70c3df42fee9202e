// SPDX-License-Identifier: CEPL-1.0

//! Instance, debug messenger, physical-device selection and logical device.

use std::ffi::{c_char, c_void, CStr};

use ash::ext::debug_utils;
use ash::khr::swapchain;
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, info, warn};

use crate::debug::{messenger_create_info, MessageLog};
use crate::error::{EngineError, Result, VkContext};
use crate::surface::PresentSurface;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"mandel";

/// Owns the API instance and, when debugging, the messenger bound to a
/// [`MessageLog`]. Dropping destroys the messenger, then the instance.
pub(crate) struct InstanceContext {
    pub entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    validation: bool,
    // Keeps the callback's user-data pointer alive until the messenger is gone.
    _log: MessageLog,
}

impl InstanceContext {
    pub unsafe fn new(display: RawDisplayHandle, debug: bool, log: &MessageLog) -> Result<Self> {
        let entry = Entry::linked();

        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .context("enumerate_required_extensions")?
            .to_vec();

        let mut layers: Vec<*const c_char> = Vec::new();
        let mut validation = false;
        let mut with_messenger = false;
        if debug {
            if has_layer(&entry, VALIDATION_LAYER)? {
                layers.push(VALIDATION_LAYER.as_ptr());
                validation = true;
            } else {
                warn!("validation layer {:?} not installed; continuing without it", VALIDATION_LAYER);
            }
            if has_instance_extension(&entry, debug_utils::NAME)? {
                extensions.push(debug_utils::NAME.as_ptr());
                with_messenger = true;
            } else {
                warn!("{:?} unavailable; debug messages will not be captured", debug_utils::NAME);
            }
        }

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: APP_NAME.as_ptr(),
            application_version: 0,
            p_engine_name: APP_NAME.as_ptr(),
            engine_version: 0,
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };

        // Chained into instance creation so messages from vkCreateInstance
        // itself are captured too.
        let early_messenger = messenger_create_info(log);
        let p_next = if with_messenger {
            &early_messenger as *const vk::DebugUtilsMessengerCreateInfoEXT as *const c_void
        } else {
            std::ptr::null()
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_next,
            p_application_info: &app_info,
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            ..Default::default()
        };
        let instance = entry
            .create_instance(&create_info, None)
            .context("create_instance")?;

        let mut ctx = InstanceContext {
            entry,
            instance,
            debug: None,
            validation,
            _log: log.clone(),
        };

        if with_messenger {
            let loader = debug_utils::Instance::new(&ctx.entry, &ctx.instance);
            let messenger = loader
                .create_debug_utils_messenger(&messenger_create_info(log), None)
                .context("create_debug_utils_messenger")?;
            ctx.debug = Some((loader, messenger));
        }

        debug!(validation, messenger = with_messenger, "Vulkan instance created");
        Ok(ctx)
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> Result<bool> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .context("enumerate_instance_layer_properties")?;
    Ok(layers
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == name))
}

unsafe fn has_instance_extension(entry: &Entry, name: &CStr) -> Result<bool> {
    let exts = entry
        .enumerate_instance_extension_properties(None)
        .context("enumerate_instance_extension_properties")?;
    Ok(exts
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name))
}

// ---------------------------------------------------------------------------
// Device selection
// ---------------------------------------------------------------------------

/// What selection needs to know about one queue family.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FamilyInfo {
    pub flags: vk::QueueFlags,
    pub present: bool,
}

/// What selection needs to know about one physical device.
#[derive(Clone, Debug)]
pub(crate) struct DeviceCandidate {
    pub kind: vk::PhysicalDeviceType,
    pub families: Vec<FamilyInfo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// A family that does both graphics and present wins; otherwise the first
/// graphics-capable family is paired with the first present-capable one.
pub(crate) fn find_queue_families(families: &[FamilyInfo]) -> Option<QueueFamilies> {
    let is_graphics = |f: &FamilyInfo| f.flags.contains(vk::QueueFlags::GRAPHICS);

    if let Some(i) = families.iter().position(|f| is_graphics(f) && f.present) {
        return Some(QueueFamilies {
            graphics: i as u32,
            present: i as u32,
        });
    }
    let graphics = families.iter().position(is_graphics)?;
    let present = families.iter().position(|f| f.present)?;
    Some(QueueFamilies {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// Picks the device to drive the surface.
///
/// The first qualifying discrete GPU ends the search. Otherwise the first
/// qualifying integrated GPU is used, then any other qualifying device.
pub(crate) fn select_device(candidates: &[DeviceCandidate]) -> Option<(usize, QueueFamilies)> {
    let mut integrated = None;
    let mut other = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(families) = find_queue_families(&candidate.families) else {
            continue;
        };
        match candidate.kind {
            vk::PhysicalDeviceType::DISCRETE_GPU => return Some((i, families)),
            vk::PhysicalDeviceType::INTEGRATED_GPU => {
                integrated.get_or_insert((i, families));
            }
            _ => {
                other.get_or_insert((i, families));
            }
        }
    }
    integrated.or(other)
}

// ---------------------------------------------------------------------------
// Logical device
// ---------------------------------------------------------------------------

/// Features every device is created with. Fragment programs may use `double`.
pub(crate) fn required_features(
    supported: &vk::PhysicalDeviceFeatures,
) -> Result<vk::PhysicalDeviceFeatures> {
    if supported.shader_float64 != vk::TRUE {
        return Err(EngineError::MissingFeature("shaderFloat64"));
    }
    Ok(vk::PhysicalDeviceFeatures {
        shader_float64: vk::TRUE,
        ..Default::default()
    })
}

/// Physical + logical device and the two queues. Dropping destroys the device.
pub(crate) struct DeviceContext {
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceContext {
    pub unsafe fn new(ictx: &InstanceContext, surface: &PresentSurface) -> Result<Self> {
        let instance = &ictx.instance;
        let physical = instance
            .enumerate_physical_devices()
            .context("enumerate_physical_devices")?;

        let candidates: Vec<DeviceCandidate> = physical
            .iter()
            .map(|&phys| describe_device(instance, surface, phys))
            .collect();
        for (phys, candidate) in physical.iter().zip(&candidates) {
            debug!(
                name = %device_name(instance, *phys),
                kind = ?candidate.kind,
                families = candidate.families.len(),
                "physical device"
            );
        }

        let (index, families) = select_device(&candidates).ok_or(EngineError::NoSuitableDevice)?;
        let phys = physical[index];

        let features = required_features(&instance.get_physical_device_features(phys))?;

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let device_exts = [swapchain::NAME.as_ptr()];
        let layers = [VALIDATION_LAYER.as_ptr()];
        let layer_count = if ictx.validation_enabled() { layers.len() as u32 } else { 0 };

        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            enabled_layer_count: layer_count,
            pp_enabled_layer_names: layers.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = instance
            .create_device(phys, &dinfo, None)
            .context("create_device")?;

        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);
        let memory = instance.get_physical_device_memory_properties(phys);

        info!(
            device = %device_name(instance, phys),
            kind = ?candidates[index].kind,
            graphics_family = families.graphics,
            present_family = families.present,
            "Vulkan device ready"
        );

        Ok(DeviceContext {
            phys,
            device,
            families,
            graphics_queue,
            present_queue,
            memory,
        })
    }

    pub unsafe fn wait_idle(&self) -> Result<()> {
        self.device.device_wait_idle().context("device_wait_idle")
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}

unsafe fn describe_device(
    instance: &Instance,
    surface: &PresentSurface,
    phys: vk::PhysicalDevice,
) -> DeviceCandidate {
    let props = instance.get_physical_device_properties(phys);
    let families = instance
        .get_physical_device_queue_family_properties(phys)
        .iter()
        .enumerate()
        .map(|(i, q)| FamilyInfo {
            flags: q.queue_flags,
            // A failed query counts as "cannot present".
            present: surface.supports_present(phys, i as u32),
        })
        .collect();
    DeviceCandidate {
        kind: props.device_type,
        families,
    }
}

unsafe fn device_name(instance: &Instance, phys: vk::PhysicalDevice) -> String {
    let props = instance.get_physical_device_properties(phys);
    CStr::from_ptr(props.device_name.as_ptr())
        .to_string_lossy()
        .into_owned()
}
