//! Greeting protocol for admitting new members to a party.
//!
//! A greeter hosts invitations and serves the BEGIN, HANDSHAKE,
//! NOTARIZE and FINISH commands over per-peer swarm channels; an
//! initiator drives the same commands from the invitee side and
//! installs the returned hints into a fresh party state.

#![deny(missing_docs)]

mod error;
mod greeter;
mod initiator;
mod invitation;
mod secret;
mod session;
mod swarm;

pub use error::Error;
pub use greeter::Greeter;
pub use initiator::{GreetingInitiator, JoinKind};
pub use invitation::{Invitation, InvitationState};
pub use secret::{
    EqualityValidator, KeyBindingValidator, SecretProvider,
    SecretValidator, SignedClaimSecret, StaticSecret,
};
pub use session::{FinishHandler, GreetingSession, PartyHost};
pub use swarm::{MemorySwarm, NetworkSwarm, PeerChannel};

use std::time::Duration;

/// Default per-command timeout for greeting sessions.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Result type for the greeting library.
pub type Result<T> = std::result::Result<T, Error>;
