//! PhotoWall Scheduler Library
//!
//! Viewport-driven demand loading with cancellable fetch tasks.
//!
//! The [`DemandScheduler`] turns viewport reports into cache lookups and
//! fetch launches. Each launched [`FetchTask`] runs on its own background
//! thread, writes its result into the shared [`MemoryCache`] and notifies the
//! presentation layer, unless it was cancelled first. The [`TaskRegistry`]
//! tracks every in-flight task so a scrolling viewport (or application
//! teardown) can cancel them all at once.
//!
//! # Example
//!
//! ```
//! use photowall_cache::MemoryCache;
//! use photowall_scheduler::{
//!     DemandScheduler, FetchError, FetchPipeline, RawBytes, TaskRegistry, ViewportEvent,
//! };
//! use std::sync::Arc;
//!
//! let cache = Arc::new(MemoryCache::<Vec<u8>>::new(1024 * 1024));
//! let registry = Arc::new(TaskRegistry::new());
//! let pipeline = FetchPipeline {
//!     cache: Arc::clone(&cache),
//!     registry: Arc::clone(&registry),
//!     transport: Arc::new(|url: &str| -> Result<Vec<u8>, FetchError> {
//!         Ok(url.as_bytes().to_vec())
//!     }),
//!     decoder: Arc::new(RawBytes),
//!     sink: Arc::new(|_key: &str, _content: Arc<Vec<u8>>| {}),
//! };
//!
//! let keys = vec!["https://img.example/1.jpg", "https://img.example/2.jpg"];
//! let mut scheduler = DemandScheduler::new(Arc::new(keys), pipeline);
//!
//! let report = scheduler.on_viewport_event(ViewportEvent::settled(0, 2));
//! report.join_all();
//! assert!(cache.contains("https://img.example/2.jpg"));
//!
//! // Scrolling cancels whatever is still in flight.
//! scheduler.on_viewport_event(ViewportEvent::scrolling(1, 2));
//! ```
//!
//! [`MemoryCache`]: photowall_cache::MemoryCache

mod cancel;
mod error;
mod registry;
mod scheduler;
mod source;
mod task;
mod viewport;

pub use cancel::CancellationToken;
pub use error::{DecodeError, FetchError, IndexError, LoadError};
pub use registry::TaskRegistry;
pub use scheduler::{DemandScheduler, LoadReport};
pub use source::{ContentSink, Decoder, KeySequence, RawBytes, Transport};
pub use task::{launch, FetchPipeline, FetchTask, TaskHandle, TaskId, TaskState};
pub use viewport::{ScrollMode, ViewportEvent, ViewportState};
