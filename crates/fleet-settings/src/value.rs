use fleet_core::{ByteSize, FleetError};

/// Types that `SettingsRegistry::get_as` can coerce a raw string into.
/// Unsupported target types should be rejected at the call site with
/// `FleetError::UnsupportedSettingValueType` rather than implementing
/// this trait for them.
pub trait SettingValue: Sized {
    fn parse_setting(raw: &str) -> Option<Self>;
    fn default_value() -> Self;
}

impl SettingValue for bool {
    fn parse_setting(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    fn default_value() -> Self {
        false
    }
}

impl SettingValue for i64 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn default_value() -> Self {
        0
    }
}

impl SettingValue for String {
    fn parse_setting(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn default_value() -> Self {
        String::new()
    }
}

impl SettingValue for ByteSize {
    fn parse_setting(raw: &str) -> Option<Self> {
        ByteSize::parse(raw).ok()
    }

    fn default_value() -> Self {
        ByteSize::from_bytes(0)
    }
}

/// Raised by callers that ask for a typed accessor with no `SettingValue`
/// impl, mirroring §4.7's `UnsupportedSettingValueType`.
pub fn unsupported_value_type() -> FleetError {
    FleetError::UnsupportedSettingValueType
}
