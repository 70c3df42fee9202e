// SPDX-License-Identifier: CEPL-1.0

//! Live/disposed state of the engine and what survives disposal.

use mandel_render::{DebugMessage, RenderSize};

use crate::debug::MessageLog;
use crate::error::{EngineError, Result};

/// Anything that presents to a surface of a known size.
pub(crate) trait HasExtent {
    fn extent(&self) -> RenderSize;
}

/// Holds the live resources until `dispose`, then only the last extent and
/// the message snapshot.
pub(crate) struct Lifecycle<T: HasExtent> {
    live: Option<T>,
    log: MessageLog,
    disposed_messages: Vec<DebugMessage>,
    last_extent: RenderSize,
}

impl<T: HasExtent> Lifecycle<T> {
    pub fn new(live: T, log: MessageLog) -> Self {
        let last_extent = live.extent();
        Lifecycle {
            live: Some(live),
            log,
            disposed_messages: Vec::new(),
            last_extent,
        }
    }

    pub fn get_mut(&mut self) -> Result<&mut T> {
        self.live.as_mut().ok_or(EngineError::Disposed)
    }

    /// Tears the live resources down. Returns false if already disposed.
    pub fn dispose(&mut self) -> bool {
        let Some(live) = self.live.take() else {
            return false;
        };
        self.last_extent = live.extent();
        drop(live);
        // Teardown still reports through the messenger (leaks, misuse), so
        // the snapshot is taken only after everything is destroyed.
        self.disposed_messages = self.log.snapshot();
        true
    }

    pub fn extent(&self) -> RenderSize {
        self.live.as_ref().map_or(self.last_extent, T::extent)
    }

    pub fn messages(&self) -> Vec<DebugMessage> {
        if self.live.is_some() {
            self.log.snapshot()
        } else {
            self.disposed_messages.clone()
        }
    }
}

#[cfg(test)]
impl<T: HasExtent> Lifecycle<T> {
    /// An already disposed holder, as left behind by `dispose`.
    pub fn disposed(last_extent: RenderSize, log: MessageLog) -> Self {
        Lifecycle {
            live: None,
            disposed_messages: log.snapshot(),
            log,
            last_extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::{debug_callback, messenger_create_info};
    use ash::vk;
    use std::cell::Cell;
    use std::ffi::CStr;
    use std::rc::Rc;

    /// Reports through the real callback, the way the validation layer would.
    fn report(log: &MessageLog, text: &CStr) {
        let info = messenger_create_info(log);
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: text.as_ptr(),
            ..Default::default()
        };
        unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                info.p_user_data,
            );
        }
    }

    struct FakeLive {
        size: RenderSize,
        log: MessageLog,
        teardowns: Rc<Cell<u32>>,
    }

    impl HasExtent for FakeLive {
        fn extent(&self) -> RenderSize {
            self.size
        }
    }

    impl Drop for FakeLive {
        fn drop(&mut self) {
            self.teardowns.set(self.teardowns.get() + 1);
            report(&self.log, c"vkDestroyDevice: VkBuffer 0x1234 has not been destroyed");
        }
    }

    fn holder() -> (Lifecycle<FakeLive>, MessageLog, Rc<Cell<u32>>) {
        let log = MessageLog::default();
        let teardowns = Rc::new(Cell::new(0));
        let live = FakeLive {
            size: RenderSize { width: 800, height: 600 },
            log: log.clone(),
            teardowns: teardowns.clone(),
        };
        (Lifecycle::new(live, log.clone()), log, teardowns)
    }

    #[test]
    fn messages_from_teardown_are_kept() {
        let (mut life, log, _) = holder();
        report(&log, c"early");
        assert_eq!(life.messages().len(), 1);

        assert!(life.dispose());
        let after = life.messages();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].text, "early");
        assert!(after[1].text.contains("has not been destroyed"));
    }

    #[test]
    fn second_dispose_is_a_no_op() {
        let (mut life, _, teardowns) = holder();
        assert!(life.dispose());
        assert!(!life.dispose());
        assert_eq!(teardowns.get(), 1);
    }

    #[test]
    fn snapshot_is_frozen_after_dispose() {
        let (mut life, log, _) = holder();
        life.dispose();
        let first = life.messages();
        report(&log, c"after dispose");
        assert_eq!(life.messages(), first);
    }

    #[test]
    fn extent_survives_dispose() {
        let (mut life, _, _) = holder();
        let size = RenderSize { width: 800, height: 600 };
        assert_eq!(life.extent(), size);
        life.dispose();
        assert_eq!(life.extent(), size);
    }

    #[test]
    fn disposed_holder_refuses_access() {
        let (mut life, _, _) = holder();
        assert!(life.get_mut().is_ok());
        life.dispose();
        assert!(matches!(life.get_mut(), Err(EngineError::Disposed)));
    }
}
