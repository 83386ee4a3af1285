//! # Wallet Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Request round-trip benchmarks
//! └── src/integration/  # Cross-crate flows
//!     ├── full_stack.rs # Model → client → relay → engine
//!     └── ordering.rs   # Reply ordering properties
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p wallet-tests
//! cargo bench -p wallet-tests
//! ```

pub mod integration;
