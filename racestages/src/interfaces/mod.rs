pub mod chat_interface;
pub mod status_interface;
