//! Test Helper Utilities
//!
//! Shared fixtures and fakes for setscan integration tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod fakes;

pub use audio_generator::{generate_test_wav, ToneConfig};
pub use fakes::{track_response, write_source_file, ScriptedOracle, WindowClips};
