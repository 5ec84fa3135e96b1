//! Configuration Module
//!
//! Configuration loading for the hub service.

mod settings;

pub use settings::{
    ConfigError, EventSourceKind, FeedSettings, HubConfig, ServerSettings, SyntheticSettings,
    WelcomeSettings,
};
