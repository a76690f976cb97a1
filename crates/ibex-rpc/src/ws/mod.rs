pub mod events;
pub mod server;

pub use events::{forward_commits, forward_round_changes, EventBroadcaster, WsEvent};
pub use server::create_ws_router;
