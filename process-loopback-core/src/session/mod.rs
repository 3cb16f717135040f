pub mod loopback_capture;
