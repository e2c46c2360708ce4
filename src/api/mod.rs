//! HTTP surface: warp routes and the server lifecycle around them.

pub mod http;
pub mod server;

pub use http::{handle_rejection, routes, AppState};
pub use server::{serve, Server};
