//! # Wallet Types Crate
//!
//! Value types exchanged with the wallet engine.
//!
//! ## Design Principles
//!
//! - **Decode once**: engine payloads are parsed at the boundary into closed
//!   types. Unknown tags map to explicit `Unknown` variants, never to raw JSON
//!   flowing through the typed layers.
//! - **Lenient on extras**: unknown JSON fields are ignored so that newer
//!   engines keep working with older clients.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod amount;
pub mod balance;
pub mod contract;
pub mod errors;
pub mod history;
pub mod pending;
pub mod withdraw;

pub use amount::{Amount, FRACTION_BASE};
pub use balance::{BalanceEntry, BalancesResponse, WalletBalances};
pub use contract::{ContractProduct, ContractTerms};
pub use errors::*;
pub use history::*;
pub use pending::{PendingOperationInfo, PendingOperations};
pub use withdraw::{BankWithdrawDetails, ExchangeInfo, ExchangeWithdrawDetails, WithdrawDetails};
