//! Routing applications (§4.3): composite [`crate::application::Application`]
//! implementations that dispatch by host, path, suffix, or in series.

pub mod host_router;
pub mod path_router;
pub mod serial_router;
pub mod suffix_router;

pub use host_router::HostRouter;
pub use path_router::PathRouter;
pub use serial_router::SerialRouter;
pub use suffix_router::SuffixRouter;
