//! # Error Definitions
//!
//! Failures that travel on a call's completion future.
//!
//! These are the *recoverable* failures of the runtime: a server raising an
//! error, a dispatch target nobody implements, a promise whose far side went
//! away. Contract violations (using a context after releasing its params,
//! tail-calling after allocating results, and so on) are programmer errors
//! and panic instead.
//!
//! The type is `Clone + PartialEq` because broken capabilities replay their
//! recorded cause on every operation, and forked completion branches each
//! observe their own copy.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The server's dispatch future resolved with an application failure.
    Failed(String),
    /// The target does not implement the requested interface, or the
    /// requested method on it.
    Unimplemented {
        interface_id: u64,
        method_id: Option<u16>,
    },
    /// A promised capability was dropped before it resolved.
    Disconnected(String),
}

impl Error {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::Disconnected(message.into())
    }

    pub fn unimplemented_interface(interface_id: u64) -> Self {
        Self::Unimplemented {
            interface_id,
            method_id: None,
        }
    }

    pub fn unimplemented_method(interface_id: u64, method_id: u16) -> Self {
        Self::Unimplemented {
            interface_id,
            method_id: Some(method_id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(message) => write!(f, "Call failed: {}", message),
            Self::Unimplemented {
                interface_id,
                method_id: Some(method_id),
            } => {
                write!(
                    f,
                    "Method {} not implemented on interface {:#x}",
                    method_id, interface_id
                )
            }
            Self::Unimplemented { interface_id, .. } => {
                write!(f, "Interface {:#x} not implemented", interface_id)
            }
            Self::Disconnected(message) => write!(f, "Disconnected: {}", message),
        }
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for capability operations.
pub type Result<T> = std::result::Result<T, Error>;
