pub mod event_handlers;
pub mod friend_handlers;
