pub mod capture_callback;
pub mod device_session;
pub mod session_activator;
