//! Party membership state machine for the conclave core.
//!
//! A party is a trusted set of member keys and feeds grown from a
//! genesis credential by processing signed admission messages in
//! log order.

#![deny(missing_docs)]

mod authenticator;
mod error;
mod event;
mod identity;
mod invitations;
mod log;
mod state;

pub use authenticator::Authenticator;
pub use error::Error;
pub use event::PartyEvent;
pub use identity::IdentityProcessor;
pub use invitations::InvitationRegistry;
pub use log::{LogReader, LogStore, LogWriter, MemoryLog};
pub use state::{PartyLifecycle, PartyState};

/// Result type for the party library.
pub type Result<T> = std::result::Result<T, Error>;
