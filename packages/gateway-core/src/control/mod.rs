//! Pub/sub control-plane client and message shapes.

mod bus;
mod message;

pub use bus::{ControlBus, RoutedMessage};
pub use message::{DeviceMessage, GoodbyeReason, ListenMode, ListenState, PlaybackAction};
