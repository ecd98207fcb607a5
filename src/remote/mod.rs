//! Support for downloading container images from a registry server

mod auth;
mod builder;
mod client;

pub use builder::RegistryClientBuilder;
pub use client::{PlatformSelector, RegistryClient};

#[cfg(test)]
mod tests;
