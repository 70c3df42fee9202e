// SPDX-License-Identifier: CEPL-1.0

//! Validation/debug channel capture.

use std::ffi::{c_void, CStr};
use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;
use mandel_render::{Category, DebugMessage, Severity};
use tracing::{debug, error, trace, warn};

/// Append-only message sequence shared with the driver callback.
///
/// The driver may invoke the callback from its own threads, so the sequence
/// sits behind a mutex even though the engine itself is single-threaded.
#[derive(Clone, Default)]
pub(crate) struct MessageLog(Arc<Mutex<Vec<DebugMessage>>>);

impl MessageLog {
    pub fn snapshot(&self) -> Vec<DebugMessage> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Pointer handed to Vulkan as `p_user_data`. Valid while any clone lives.
    fn user_data(&self) -> *mut c_void {
        Arc::as_ptr(&self.0) as *mut c_void
    }
}

fn forward(msg: &DebugMessage) {
    if msg.severity.contains(Severity::ERROR) {
        error!(category = ?msg.category, "[vulkan] {}", msg.text);
    } else if msg.severity.contains(Severity::WARNING) {
        warn!(category = ?msg.category, "[vulkan] {}", msg.text);
    } else if msg.severity.contains(Severity::INFO) {
        debug!(category = ?msg.category, "[vulkan] {}", msg.text);
    } else {
        trace!(category = ?msg.category, "[vulkan] {}", msg.text);
    }
}

pub(crate) unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    let p_message = (*data).p_message;
    let text = if p_message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(p_message).to_string_lossy().into_owned()
    };
    let msg = DebugMessage::new(
        text,
        Severity::from_bits_truncate(severity.as_raw()),
        Category::from_bits_truncate(types.as_raw()),
    );
    forward(&msg);

    let log = &*(user as *const Mutex<Vec<DebugMessage>>);
    log.lock().unwrap_or_else(PoisonError::into_inner).push(msg);

    // Never abort the call that triggered the message.
    vk::FALSE
}

/// Messenger description covering every severity and category, bound to `log`.
pub(crate) fn messenger_create_info(log: &MessageLog) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            | vk::DebugUtilsMessageTypeFlagsEXT::DEVICE_ADDRESS_BINDING,
        pfn_user_callback: Some(debug_callback),
        p_user_data: log.user_data(),
        ..Default::default()
    }
}
