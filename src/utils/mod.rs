pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{probe_page_image, probe_page_image_async};
pub use metrics::{Metrics, MetricsSnapshot};
