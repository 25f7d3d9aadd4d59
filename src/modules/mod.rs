//! Modules layer - Infrastructure components shared across features
//!
//! Contains the content vault and other cross-cutting building blocks.

pub mod vault;
