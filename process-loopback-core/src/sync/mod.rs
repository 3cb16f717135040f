pub mod activation;
pub mod event_signal;
