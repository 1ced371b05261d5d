mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::{handle_request, handle_store_event};
pub use types::{AppState, Request};
