use std::collections::HashSet;

use fleet_core::FleetError;

/// A single settings handler: owns a disjoint-or-overlapping subset of the
/// key space and answers get/set for the keys it recognizes.
pub trait SettingsHandler: Send + Sync {
    fn keys(&self) -> HashSet<String>;

    /// Return `Err(FleetError::UnrecognizedSetting)` for keys this handler
    /// doesn't own so the registry can fall through to the next handler.
    fn get(&self, key: &str) -> Result<String, FleetError>;

    /// Return `Err(FleetError::UnrecognizedSetting)` for keys this handler
    /// doesn't own. Any other error is surfaced immediately rather than
    /// falling through (§4.7).
    fn set(&self, key: &str, value: &str) -> Result<(), FleetError>;
}

fn unrecognized(key: &str) -> FleetError {
    FleetError::UnrecognizedSetting { key: key.to_string() }
}

/// Dispatches `keys`/`get`/`set` across every registered handler.
#[derive(Default)]
pub struct SettingsRegistry {
    handlers: Vec<Box<dyn SettingsHandler>>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn SettingsHandler>) {
        self.handlers.push(handler);
    }

    /// Union of every handler's key set.
    pub fn keys(&self) -> HashSet<String> {
        self.handlers.iter().flat_map(|h| h.keys()).collect()
    }

    /// First successful handler response; `UnrecognizedSetting` if every
    /// handler rejects the key.
    pub fn get(&self, key: &str) -> Result<String, FleetError> {
        for handler in &self.handlers {
            match handler.get(key) {
                Ok(value) => return Ok(value),
                Err(FleetError::UnrecognizedSetting { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(unrecognized(key))
    }

    /// Try each handler; succeed on the first that recognizes the key.
    /// Any other error (invalid value, state conflict, ...) surfaces
    /// immediately rather than falling through to the next handler.
    pub fn set(&self, key: &str, value: &str) -> Result<(), FleetError> {
        for handler in &self.handlers {
            match handler.set(key, value) {
                Ok(()) => return Ok(()),
                Err(FleetError::UnrecognizedSetting { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(unrecognized(key))
    }

    /// Typed accessor: best-effort coercion, falling back to
    /// `T::default_value()` on parse failure (§4.7).
    pub fn get_as<T: crate::value::SettingValue>(&self, key: &str) -> Result<T, FleetError> {
        let raw = self.get(key)?;
        Ok(T::parse_setting(&raw).unwrap_or_else(T::default_value))
    }
}
