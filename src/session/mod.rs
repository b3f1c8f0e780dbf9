//! Session lifecycle flows: admission and disconnection

mod admission;
mod disconnect;

pub use admission::{AdmissionError, AdmissionFlow, HandshakeMeta};
pub use disconnect::{CleanupFailed, DisconnectFlow};
