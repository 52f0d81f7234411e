//! # tplus-sdk
//!
//! Rust SDK for the T+ order management and clearing services.
//!
//! ## Features
//!
//! - Canonical asset and vault identifiers across every wire representation
//! - Nonce/signature authentication with proactive, single-flight token refresh
//! - Real-time data streams and a correlated order-control channel
//! - Decryption of settlement approvals addressed to the user
//! - Fixed-point rescaling between token and inventory precision
//!
//! ## Quick Start
//!
//! ### Query the inventory
//!
//! ```no_run
//! use tplus_sdk::{Client, User};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let user = User::from_hex("0x9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")?;
//! let client = Client::new(user, "https://oms.example.com".parse()?)?;
//!
//! let inventory = client.get_inventory().await?;
//! println!("{inventory}");
//! # Ok(())
//! # }
//! ```
//!
//! ### Cancel an order over the control channel
//!
//! ```no_run
//! use tplus_sdk::{AssetIdentifier, Client, User};
//!
//! # async fn example(client: Client) -> anyhow::Result<()> {
//! let control = client.control_channel().await?;
//! let asset: AssetIdentifier = "200".parse()?;
//! let response = control.cancel_order("cXV1eA==", asset).await?;
//! println!("{response}");
//! # Ok(())
//! # }
//! ```
//!
//! ### Watch settlement approvals
//!
//! ```no_run
//! use futures::StreamExt;
//! use tplus_sdk::Client;
//!
//! # async fn example(client: Client) -> anyhow::Result<()> {
//! let mut approvals = client.stream_settlement_approvals().await?;
//! while let Some(approval) = approvals.next().await {
//!     let approval = approval?;
//!     println!("nonce {} expires at {}", approval.nonce(), approval.expiry);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: identifiers, fixed-width codecs and wire payloads
//! - [`http`]: authenticated HTTP client
//! - [`ws`]: data streams and the control channel
//! - [`session`]: token lifecycle
//! - [`approval`]: settlement approval decryption
//! - [`decimals`]: decimal rescaling

pub mod approval;
mod config;
pub mod correlation;
pub mod decimals;
mod error;
pub mod http;
#[cfg(test)]
mod mock;
pub mod session;
pub mod types;
mod user;
pub mod ws;

pub use config::Config;
pub use error::{Error, Result};
pub use http::Client;
pub use types::{AssetIdentifier, ChainAddress, ChainId, UserPublicKey};
pub use user::User;

/// Re-exported Ethereum address type from Alloy.
///
/// Used to build [`ChainAddress`]es from EVM addresses.
pub use alloy::primitives::{Address, address};
/// Re-exported decimal type from rust_decimal.
///
/// Used to display amounts, see [`decimals::to_decimal`].
pub use rust_decimal::Decimal;
