// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;

bitflags! {
    /// Message severity. Bit values follow `VkDebugUtilsMessageSeverityFlagBitsEXT`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Severity: u32 {
        const VERBOSE = 0x0000_0001;
        const INFO    = 0x0000_0010;
        const WARNING = 0x0000_0100;
        const ERROR   = 0x0000_1000;
    }
}

bitflags! {
    /// Message category. Bit values follow `VkDebugUtilsMessageTypeFlagBitsEXT`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Category: u32 {
        const GENERAL                = 0x0000_0001;
        const VALIDATION             = 0x0000_0002;
        const PERFORMANCE            = 0x0000_0004;
        const DEVICE_ADDRESS_BINDING = 0x0000_0008;
    }
}

/// One message captured from the validation/debug channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugMessage {
    pub text: String,
    pub severity: Severity,
    pub category: Category,
}

impl DebugMessage {
    pub fn new(text: impl Into<String>, severity: Severity, category: Category) -> Self {
        Self {
            text: text.into(),
            severity,
            category,
        }
    }
}

impl std::fmt::Display for DebugMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sev = if self.severity.contains(Severity::ERROR) {
            "error"
        } else if self.severity.contains(Severity::WARNING) {
            "warning"
        } else if self.severity.contains(Severity::INFO) {
            "info"
        } else {
            "verbose"
        };
        write!(f, "[{sev}] {:?}: {}", self.category, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bits_are_dropped() {
        assert_eq!(Severity::from_bits_truncate(0xFFFF_0100), Severity::WARNING);
        assert_eq!(
            Category::from_bits_truncate(0x12),
            Category::VALIDATION
        );
    }

    #[test]
    fn display_uses_highest_severity() {
        let m = DebugMessage::new("boom", Severity::ERROR | Severity::INFO, Category::VALIDATION);
        assert!(m.to_string().starts_with("[error]"));
    }
}
