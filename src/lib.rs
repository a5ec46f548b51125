// ABOUTME: Root library module for the mirai bot binary
// ABOUTME: Exposes config loading, the built-in bot handlers and the run loop

pub mod bot;
pub mod config;
pub mod runner;

pub use config::{BotConfig, Config};
