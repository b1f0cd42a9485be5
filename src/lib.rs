//! Social post generator service
//!
//! Turns a pasted data blob into post copy plus an image by chaining a
//! text-generation model, a stock-photo search and an asynchronous image
//! rendering job, exposed as a small JSON-over-HTTP API.

pub mod ai;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod search;
pub mod server;

pub use error::{Error, Result};
