pub mod asset;
pub mod audio_models;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod request;
pub mod state;
