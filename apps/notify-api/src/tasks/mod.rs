//! Task vocabulary, persistence seam, and the process-wide event hub.

pub mod events;
pub mod model;
pub mod store;
