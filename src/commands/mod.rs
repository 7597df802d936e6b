//! Caller-facing entry points.
//!
//! An HTTP layer maps its routes onto these one-to-one: `chat::ask` for the
//! question endpoint, `session::*` for history administration. Request and
//! response types serialize to the JSON the web client expects.

pub mod chat;
pub mod session;
