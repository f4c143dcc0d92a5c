//! Payment provider ports.
//!
//! The checkout orchestrator drives payment completion through these traits;
//! the HTTP implementations live alongside so embedders can wire real
//! providers while tests substitute programmable fakes.

pub mod card;
pub mod wallet;

pub use card::{
    CardGateway, CardSession, CreateSessionRequest, PaymentStatus, SessionLineItem,
    SessionMetadata, StripeGateway,
};
pub use wallet::{HttpWalletGateway, WalletGateway, WalletVerification};
