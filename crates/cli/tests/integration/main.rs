//! Integration tests driving blens against a fake SDK.
//!
//! The build tool, size tool and nm are shell scripts, so these only run on Unix.

#![cfg(unix)]

mod analyze_tests;
mod build_tests;
mod common;
