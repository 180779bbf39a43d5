//! Remote activity API adapter.

mod dto;
mod http_source;

pub use http_source::{StravaCredentials, StravaHttpSource};

#[cfg(test)]
mod tests;
