//! Runtime utilities that abstract over the underlying async executor.
//!
//! Downstream crates use these helpers instead of depending on Tokio's
//! runtime types directly.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a lightweight current-thread
/// runtime.
///
/// Intended for synchronous call sites outside any runtime (for example the
/// logging sink layer). Panics if the runtime cannot be built, which only
/// happens when the OS refuses to create the reactor.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}
