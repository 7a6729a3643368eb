//! RPC service implementations.

pub mod response;
pub mod tracker;
pub mod work;

pub use response::ResponseService;
pub use tracker::TrackerService;
pub use work::queue_work;
