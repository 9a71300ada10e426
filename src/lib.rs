//! Control-plane core of a kernel event-tracing collector.
//!
//! Multiplexes concurrently active tracing sessions onto the single shared
//! kernel ftrace instance and the userspace category helper.

pub mod atrace;
pub mod catalog;
pub mod config;
pub mod daemon;
pub mod export;
pub mod filter;
pub mod ftrace;
pub mod muxer;
pub mod request;
pub mod resolver;
