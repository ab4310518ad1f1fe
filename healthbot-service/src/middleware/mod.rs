pub mod request_events;
pub mod request_tracking;

pub use request_events::request_event_middleware;
pub use request_tracking::{handle_panic, request_tracking_middleware, ChatOutcome};
