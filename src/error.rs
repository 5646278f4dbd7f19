//! Error types for the chaos operator
//!
//! Errors carry the experiment they relate to so that reconcile failures can be
//! traced back to a specific `ChaosExperiment` in the logs.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific experiment is known
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for chaos operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The experiment spec is invalid
    #[error("validation error for {experiment}: {message}")]
    Validation {
        /// Name of the experiment with the invalid spec
        experiment: String,
        /// Description of what's invalid
        message: String,
    },

    /// A status write targeted a stale resourceVersion
    #[error("status conflict for {experiment}: record changed since it was read")]
    Conflict {
        /// Name of the experiment whose status write was rejected
        experiment: String,
    },

    /// Listing or disrupting targets failed
    #[error("attack error [{attack}] for {experiment}: {message}")]
    Attack {
        /// Name of the experiment performing the attack
        experiment: String,
        /// Attack kind (e.g. "pod-kill")
        attack: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The reconcile deadline expired before the invocation finished
    #[error("reconcile of {experiment} timed out after {elapsed:?}")]
    Timeout {
        /// Name of the experiment being reconciled
        experiment: String,
        /// Deadline that expired
        elapsed: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a validation error with experiment context
    pub fn validation_for(experiment: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            experiment: experiment.into(),
            message: msg.into(),
        }
    }

    /// Create a conflict error for the given experiment
    pub fn conflict(experiment: impl Into<String>) -> Self {
        Self::Conflict {
            experiment: experiment.into(),
        }
    }

    /// Create an attack error with full context
    pub fn attack_for(
        experiment: impl Into<String>,
        attack: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Attack {
            experiment: experiment.into(),
            attack: attack.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Map a kube error to [`Error::Conflict`] when the API server answered 409.
    pub fn from_status_write(experiment: &str, source: kube::Error) -> Self {
        match source {
            kube::Error::Api(ref ae) if ae.code == 409 => Self::conflict(experiment),
            other => Self::Kube { source: other },
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec change. Everything else
    /// may resolve on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae)
                    if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
            ),
            Error::Validation { .. } => false,
            Error::Conflict { .. } => true,
            Error::Attack { .. } => true,
            Error::Serialization(_) => false,
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the experiment name if this error is associated with one
    pub fn experiment(&self) -> Option<&str> {
        match self {
            Error::Validation { experiment, .. }
            | Error::Conflict { experiment }
            | Error::Attack { experiment, .. }
            | Error::Timeout { experiment, .. } => Some(experiment),
            Error::Kube { .. } | Error::Serialization(_) | Error::Internal { .. } => None,
        }
    }
}
