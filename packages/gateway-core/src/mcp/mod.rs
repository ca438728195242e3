//! JSON-RPC request/response correlation and debounced volume control over
//! the device control channel.

mod coordinator;
mod volume;

pub use coordinator::{DeviceChannel, McpCoordinator, McpError};
pub use volume::{McpVolumeDevice, VolumeAction, VolumeDebouncer, VolumeDevice};

/// Maps an agent-side `function_call` name to the device tool name it
/// invokes via [`McpCoordinator::call_tool`].
pub fn tool_name_for_function(function_name: &str) -> Option<&'static str> {
    Some(match function_name {
        "self_set_volume" => "self.audio_speaker.set_volume",
        "self_get_volume" => "self.get_device_status",
        "self_mute" => "self.audio_speaker.mute",
        "self_unmute" => "self.audio_speaker.unmute",
        "self_set_light_color" => "self.led.set_color",
        "self_set_light_mode" => "self.led.set_mode",
        "self_set_rainbow_speed" => "self.led.set_rainbow_speed",
        "self_get_battery_status" => "self.battery.get_status",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_function_names() {
        assert_eq!(tool_name_for_function("self_mute"), Some("self.audio_speaker.mute"));
        assert_eq!(tool_name_for_function("unknown_fn"), None);
    }
}
