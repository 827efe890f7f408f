//! Co-watching for AtCoder: a driver solves problems on a live stream while
//! viewers follow the statement, chat and like comments.
//!
//! Remote services (the problem metadata mirror, AtCoder itself through CORS
//! proxies, the comments service) are wrapped by the clients in
//! [`problems`], [`statement`], [`contest`] and [`comments`]. [`views`] holds
//! page state and [`web`] serves it.

pub mod cli;
pub mod comments;
pub mod config;
pub mod contest;
pub mod error;
pub mod http;
pub mod likes;
pub mod live;
pub mod poll;
pub mod problems;
pub mod statement;
pub mod store;
pub mod views;
pub mod web;

pub use config::Config;
pub use error::{LiveError, Result};
