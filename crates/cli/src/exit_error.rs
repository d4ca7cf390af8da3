// SPDX-License-Identifier: MIT

//! A process exit code paired with a message, so commands can return it
//! through `main()`'s `Result` instead of calling `std::process::exit`
//! themselves mid-function.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn session_failed(reason: impl Into<String>) -> Self {
        Self::new(1, reason)
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::new(2, reason)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}
