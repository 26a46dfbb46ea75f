//! Client error types for the coordination service

use crate::lease::LeaseId;

/// Error type for coordination service calls
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("no coordination service endpoints configured")]
    NoEndpoints,

    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    #[error("lease {0} not found")]
    LeaseNotFound(LeaseId),

    #[error("request timeout")]
    Timeout,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    /// Whether the error means the service could not be reached at all,
    /// as opposed to the service answering with a rejection.
    pub fn is_connectivity(&self) -> bool {
        match self {
            ClientError::Unavailable(_) | ClientError::Timeout | ClientError::NoEndpoints => true,
            ClientError::Etcd(etcd_client::Error::GRpcStatus(status)) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded
            ),
            ClientError::Etcd(e) => matches!(
                e,
                etcd_client::Error::TransportError(_) | etcd_client::Error::IoError(_)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
