//! The building blocks of a synchronized watch session: the playback state machine,
//! member presence records, chat history, and the configuration they are governed by.

mod chat;
mod clock;
mod config;
mod error;
mod identity;
mod member;
mod playback;
mod util;

pub use chat::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use identity::*;
pub use member::*;
pub use playback::*;
pub use util::*;
