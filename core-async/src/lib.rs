//! Runtime abstraction layer for the lineup engine.
//!
//! All `core-*` crates depend on this crate instead of reaching for tokio
//! directly. It re-exports the task, time and synchronization primitives the
//! engine relies on, plus cooperative cancellation tokens.
//!
//! # Modules
//!
//! - `task`: Task spawning and join handles
//! - `time`: Sleep, timeouts, instants
//! - `sync`: Locks, channels, cancellation
//! - `runtime`: Handle access and `block_on` for synchronous entry points
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use futures::future::{join_all, try_join_all};
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
