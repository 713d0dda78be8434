//! Custom assertion macros and utilities
//!
//! Provides enhanced assertion macros for better test output and
//! more descriptive error messages.

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that two replicas (anything with `.snapshot()`) hold identical content
#[macro_export]
macro_rules! assert_converged {
    ($left:expr, $right:expr) => {
        pretty_assertions::assert_eq!($left.snapshot(), $right.snapshot(), "replicas diverged");
    };
}
