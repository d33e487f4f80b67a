use thiserror::Error;

/// Errors surfaced to callers of requester, provider and router
/// operations. `Ok` is the "Success" arm of the original call-status set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The service is not in the Available state
    #[error("service is not available to take this call")]
    ServiceUnavailable,

    /// The peer endpoint is gone or the transport refused the send
    #[error("receiving endpoint is unavailable, message was not delivered")]
    ReceiverUnavailable,

    /// Caller handed in something unusable (invalid RegID, missing callback, duplicate handler)
    #[error("invalid parameter supplied by caller")]
    InvalidParam,

    /// A synchronous call expired before its response arrived
    #[error("request timed out before a response arrived")]
    Timeout,

    /// Anything that has no more precise code
    #[error("call failed for an unknown reason")]
    FailedUnknown,
}

pub type ActionResult<T = ()> = Result<T, ActionError>;
