//! OAuth credentials, device-code flow, and token refresh.

pub mod device_flow;
pub mod oauth;
pub mod refresh;

pub use device_flow::{DeviceAuthorization, DeviceFlowConfig, PollOutcome};
pub use oauth::OAuthCredentials;
