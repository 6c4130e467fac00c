//! Normplay Core - loudness-normalizing audio player library

pub mod audio;
pub mod config;
pub mod types;
pub mod loudness;
pub mod mixing;
pub mod track;
pub mod engine;

pub use types::*;
