//! Integration tests for recompose
//!
//! These tests run the real pipelines against the system `tar` and against shell-script
//! stand-ins for the APK toolchain.

pub mod apk;
pub mod common;
pub mod tar;
