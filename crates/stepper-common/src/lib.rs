pub mod command;
pub mod error;
pub mod event;
pub mod protocol;

pub use command::*;
pub use error::BackendError;
pub use event::{
    ClickInfo, DomMutation, ElementSummary, EventDetails, KeyInfo, MutationKind, ObserverEvent,
};
