pub mod client;
pub mod dtos;
pub mod handlers;
pub mod routes;
pub mod service;

pub use client::{AnthropicClient, TextGenerator};
pub use service::GenerationService;
