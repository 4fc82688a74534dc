pub mod admin;
pub mod chat;
pub mod websocket;
