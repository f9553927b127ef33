//! Control → action bindings.
//!
//! Switches and joystick buttons reach the engine as control ids; the bindings stored in
//! the device settings decide which [`Action`] they mean. Disabled bindings resolve to
//! nothing.

use crate::error::{InputError, Result};
use crate::event::Action;
use crate::settings::{JoystickButtonBinding, SwitchBinding};
use std::collections::HashSet;

/// Action bound to `switch_id`, if the binding exists and is enabled.
pub fn resolve_switch(bindings: &[SwitchBinding], switch_id: &str) -> Option<Action> {
    bindings
        .iter()
        .find(|b| b.id == switch_id)
        .filter(|b| b.enabled)
        .map(|b| b.action)
}

/// Action bound to a joystick button, if the binding exists and is enabled.
pub fn resolve_button(bindings: &[JoystickButtonBinding], button_id: &str) -> Option<Action> {
    bindings
        .iter()
        .find(|b| b.button_id == button_id)
        .filter(|b| b.enabled)
        .map(|b| b.action)
}

/// Binding for a keyboard-emulating switch.
pub fn switch_for_key<'a>(bindings: &'a [SwitchBinding], key: &str) -> Option<&'a SwitchBinding> {
    bindings
        .iter()
        .find(|b| b.key_binding.as_deref() == Some(key))
}

/// Binding for a button-index switch: position in the ordered list.
pub fn switch_for_button(bindings: &[SwitchBinding], button: u16) -> Option<&SwitchBinding> {
    bindings.get(usize::from(button))
}

/// Ids must be unique and non-empty; a key may drive at most one switch.
pub fn validate_switch_bindings(bindings: &[SwitchBinding]) -> Result<()> {
    let mut ids = HashSet::new();
    let mut keys = HashSet::new();
    for b in bindings {
        if b.id.is_empty() {
            return Err(InputError::invalid_config("switch binding with empty id"));
        }
        if !ids.insert(b.id.as_str()) {
            return Err(InputError::invalid_config(format!(
                "duplicate switch binding id '{}'",
                b.id
            )));
        }
        if let Some(key) = &b.key_binding {
            if !keys.insert(key.as_str()) {
                return Err(InputError::invalid_config(format!(
                    "key '{key}' bound to more than one switch"
                )));
            }
        }
    }
    Ok(())
}

pub fn validate_joystick_buttons(bindings: &[JoystickButtonBinding]) -> Result<()> {
    let mut ids = HashSet::new();
    for b in bindings {
        if !ids.insert(b.button_id.as_str()) {
            return Err(InputError::invalid_config(format!(
                "duplicate joystick button binding '{}'",
                b.button_id
            )));
        }
    }
    Ok(())
}
