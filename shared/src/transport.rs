use crate::{
    address::Address,
    envelope::Envelope,
    error::ActionResult,
    types::{Availability, ServiceId},
};

/// The client-facing half of a router: what a `ServiceRequester` hands
/// its outbound envelopes to.
pub trait ClientTransport: Send + Sync {
    /// Delivers `msg` to the provider side, or reports why it could not.
    /// The envelope is delivered at most once; failures never leave a
    /// duplicate in flight.
    fn send_message_to_server(&self, msg: Envelope) -> ActionResult;
}

/// The server-facing half of a router: what a `ServiceProvider` uses to
/// reach its clients.
pub trait ServerTransport: Send + Sync {
    /// Delivers `msg` to the client endpoint at `to`.
    fn send_message_to_client(&self, msg: Envelope, to: &Address) -> ActionResult;

    /// Announces a provider availability transition to every requester of
    /// `service_id`.
    fn notify_service_status_to_client(
        &self,
        service_id: &ServiceId,
        old: Availability,
        new: Availability,
    );
}

/// Collaborator binding for the client half of an IPC router: a concrete
/// transport (socket, shared memory, pipe) that moves raw packets to the
/// server process.
pub trait PacketSender: Send + Sync {
    fn send(&self, bytes: Vec<u8>) -> ActionResult;
}

/// Collaborator binding for the server half of an IPC router: moves raw
/// packets to a specific client endpoint.
pub trait PacketEndpoint: Send + Sync {
    fn send_to(&self, to: &Address, bytes: Vec<u8>) -> ActionResult;
}
