//! Chat Relay - streaming chat completion relay
//!
//! Accepts a conversation turn over HTTP, assembles the stored conversation
//! window, forwards it to a chat-completion provider and streams the answer
//! back as server-sent events while persisting both sides of the exchange.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
