//! Error types for macvnet

use thiserror::Error;

/// macvnet error types
///
/// Every variant that names a resource carries the operation that failed and
/// the resource it failed on, so the message that reaches the container
/// runtime is actionable on its own.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed network configuration, unknown mode, MTU out of range
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Malformed `CNI_ARGS` or missing workload identity
    #[error("Invalid CNI_ARGS: {message}")]
    InvalidArgs {
        /// Error message
        message: String,
    },

    /// A host interface or route could not be resolved
    #[error("Failed to resolve {resource}: {message}")]
    Resolution {
        /// Interface or route that could not be resolved
        resource: String,
        /// Error message
        message: String,
    },

    /// The external allocator failed or returned nothing usable
    #[error("Allocator {operation} failed for {resource}: {message}")]
    Allocation {
        /// Allocator call (`lookup`, `allocate`, `release`)
        operation: String,
        /// Workload the call was made for
        resource: String,
        /// Error message
        message: String,
    },

    /// Link creation, rename, re-read or address setup failed
    #[error("Failed to {operation} {resource}: {message}")]
    Provisioning {
        /// Provisioning step
        operation: String,
        /// Interface the step ran on
        resource: String,
        /// Error message
        message: String,
    },

    /// Interface deletion failed for a reason other than "not found"
    #[error("Failed to {operation} {resource}: {message}")]
    Teardown {
        /// Teardown step
        operation: String,
        /// Interface the step ran on
        resource: String,
        /// Error message
        message: String,
    },

    /// Namespace could not be opened or entered
    #[error("Namespace error: {message}")]
    Namespace {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

impl Error {
    /// Build a provisioning error from any displayable cause
    pub fn provisioning(
        operation: impl Into<String>,
        resource: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Provisioning {
            operation: operation.into(),
            resource: resource.into(),
            message: cause.to_string(),
        }
    }

    /// Build a teardown error from any displayable cause
    pub fn teardown(
        operation: impl Into<String>,
        resource: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Teardown {
            operation: operation.into(),
            resource: resource.into(),
            message: cause.to_string(),
        }
    }

    /// Build an allocation error from any displayable cause
    pub fn allocation(
        operation: impl Into<String>,
        resource: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Allocation {
            operation: operation.into(),
            resource: resource.into(),
            message: cause.to_string(),
        }
    }

    /// Build a resolution error from any displayable cause
    pub fn resolution(resource: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Resolution {
            resource: resource.into(),
            message: cause.to_string(),
        }
    }

    /// Error code reported in the CNI error document
    ///
    /// Codes below 100 are the well-known CNI codes, 100 and above are
    /// plugin specific.
    #[must_use]
    pub const fn cni_code(&self) -> u32 {
        match self {
            Self::Io(_) => 5,
            Self::InvalidArgs { .. } => 4,
            Self::InvalidConfig { .. } => 7,
            Self::Resolution { .. } => 100,
            Self::Allocation { .. } => 101,
            Self::Provisioning { .. } => 102,
            Self::Teardown { .. } => 103,
            Self::Namespace { .. } => 104,
            Self::System(_) => 999,
        }
    }
}

/// Result type alias for macvnet operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::provisioning("rename", "mv1a2b3c4d", "device busy");
        assert_eq!(err.to_string(), "Failed to rename mv1a2b3c4d: device busy");

        let err = Error::allocation("lookup", "default/nginx", "connection refused");
        assert!(err.to_string().contains("default/nginx"));
    }

    #[test]
    fn test_cni_codes() {
        let config = Error::InvalidConfig {
            message: "bad".to_string(),
        };
        assert_eq!(config.cni_code(), 7);

        let teardown = Error::teardown("delete", "eth0", "EPERM");
        assert_eq!(teardown.cni_code(), 103);
    }
}
