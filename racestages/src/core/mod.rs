pub mod chat_dispatcher;
pub mod handle_session;
pub mod race_feed;
pub mod stage_tracker;
pub mod telemetry;
pub mod winner_resolver;
