use std::sync::Arc;

/// Consumer callback receiving captured PCM bytes.
///
/// Invoked synchronously with a contiguous, frame-aligned byte range, on the
/// producer thread (direct mode) or the decoupling thread (intermediate mode).
/// The slice is cleared or reused as soon as the call returns, so copy what
/// you need before returning. Caller state is captured by the closure.
pub type CaptureCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;
