use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::error;

use weft_shared::{
    decode_content, ActionError, ActionResult, Address, Envelope, OpCode, OpId, Payload, RequestId,
    Serde, TranslateError,
};

use crate::provider::ServiceProvider;

/// Whether a reply closes out the request or is an intermediate update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStatus {
    Incomplete,
    Complete,
}

pub type AbortCallback = Box<dyn FnOnce() + Send>;

/// Server-side handle for one in-flight client request, given to the user
/// request handler. Replies and progress updates go back to the client
/// through it; the provider invalidates it when the request completes,
/// the client aborts, or the service stops serving.
///
/// After completion or abort every operation fails with `InvalidParam`
/// and has no side effects.
pub struct RequestKeeper {
    msg: Envelope,
    provider: Weak<ServiceProvider>,
    valid: AtomicBool,
    abort_callback: Mutex<Option<AbortCallback>>,
}

impl RequestKeeper {
    pub(crate) fn new(msg: Envelope, provider: Weak<ServiceProvider>) -> Arc<Self> {
        Arc::new(Self {
            msg,
            provider,
            valid: AtomicBool::new(true),
            abort_callback: Mutex::new(None),
        })
    }

    pub fn op_code(&self) -> OpCode {
        self.msg.op_code
    }

    pub fn op_id(&self) -> &OpId {
        &self.msg.op_id
    }

    pub fn request_id(&self) -> RequestId {
        self.msg.request_id
    }

    pub fn source(&self) -> &Address {
        &self.msg.source
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Decodes the inbound payload into the request's content type. Works
    /// on a clone of the payload, so it can be called more than once.
    pub fn request_content<T: Serde>(&self) -> Result<T, TranslateError> {
        let mut payload = self.msg.payload.clone();
        decode_content::<T>(payload.as_mut()).map_err(|err| {
            error!(
                "Could not get request content for OpID [{}]: {err}",
                self.msg.op_id
            );
            err
        })
    }

    /// Sends a reply to the requesting client, carrying the same request
    /// id and opcode as the original. `Complete` invalidates the keeper
    /// and removes it from the provider's in-flight record.
    pub fn respond(&self, payload: Option<Payload>, status: ResponseStatus) -> ActionResult {
        if !self.is_valid() {
            return Err(ActionError::InvalidParam);
        }
        let provider = self
            .provider
            .upgrade()
            .ok_or(ActionError::ReceiverUnavailable)?;

        if status == ResponseStatus::Complete {
            self.invalidate();
            provider.forget_request(&self.msg.op_id, self.msg.request_id);
        }

        let reply = self.msg.reply().with_payload(payload);
        provider.send_back_to_client(reply, &self.msg.source)
    }

    /// Sends a progress notification without completing the request.
    pub fn update(&self, payload: Option<Payload>) -> ActionResult {
        self.respond(payload, ResponseStatus::Incomplete)
    }

    /// Registers a one-shot handler fired if the client aborts this
    /// request. At most one invocation, on the provider's dispatch
    /// thread.
    pub fn aborted_by(&self, callback: impl FnOnce() + Send + 'static) -> ActionResult {
        if !self.is_valid() {
            return Err(ActionError::InvalidParam);
        }
        *self
            .abort_callback
            .lock()
            .expect("abort callback poisoned") = Some(Box::new(callback));
        Ok(())
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub(crate) fn take_abort_callback(&self) -> Option<AbortCallback> {
        self.abort_callback
            .lock()
            .expect("abort callback poisoned")
            .take()
    }
}
