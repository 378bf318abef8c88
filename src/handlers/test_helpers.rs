//! Test helpers for handler builders.
//!
//! This module centralizes repeated assertions used across builder tests.

use super::HandlerBuilderTrait;

/// Assert that building a handler fails.
pub fn assert_build_err<B>(builder: &B, msg: &str)
where
    B: HandlerBuilderTrait + ?Sized,
{
    assert!(builder.build_inner().is_err(), "{msg}");
}

/// Return the error message produced by a failing build.
pub fn build_err_message<B>(builder: &B) -> String
where
    B: HandlerBuilderTrait + ?Sized,
{
    match builder.build_inner() {
        Ok(_) => panic!("build_inner must fail"),
        Err(err) => err.to_string(),
    }
}
