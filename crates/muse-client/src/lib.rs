//! MUSE client - session-aware access to the MUSE API
//!
//! Holds the token pair returned by login and recovers from an expired
//! access token with a single refresh and retry.
//!
//! Author: hephaex@gmail.com

pub mod client;
pub mod error;
pub mod session;

pub use client::{LogoutFailure, LogoutSummary, MuseClient};
pub use error::ClientError;
pub use session::{ClientSession, SessionTokens};
