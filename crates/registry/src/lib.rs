//! VitalLedger access-control registry.
//!
//! Records which principals own health data, which devices produce it,
//! which consumers an administrator has approved, and which per-domain
//! read permissions owners have granted to those consumers.
//!
//! The registry never advances time on its own. Every operation receives
//! the current block height from its caller, and grant expiry is evaluated
//! by comparing against that height at read time.
//!
//! # Example
//!
//! ```
//! use vitalledger_core::{BlockHeight, CallContext, Principal};
//! use vitalledger_registry::AccessRegistry;
//!
//! let admin = Principal::parse("deployer").unwrap();
//! let alice = Principal::parse("wallet_1").unwrap();
//! let hospital = Principal::parse("wallet_2").unwrap();
//!
//! let mut registry = AccessRegistry::open_in_memory(admin.clone()).unwrap();
//! let h = BlockHeight(1);
//!
//! registry.register_identity(&CallContext::new(alice.clone(), h)).unwrap();
//! registry
//!     .authorize_consumer(&CallContext::new(admin, h), &hospital, "hospital")
//!     .unwrap();
//! registry
//!     .grant_domain_access(&CallContext::new(alice.clone(), h), &hospital, "cardiac-metrics", Some(500))
//!     .unwrap();
//!
//! assert!(registry
//!     .check_data_access(&alice, &hospital, "cardiac-metrics", BlockHeight(2))
//!     .unwrap());
//! ```

pub mod consumer;
pub mod endpoint;
pub mod error;
pub mod grant;
pub mod identity;
pub mod registry;
mod schema;
mod validate;

pub use consumer::{ConsumerAuthorization, ConsumerRegistry};
pub use endpoint::{EndpointRecord, EndpointRegistry};
pub use error::{AccessError, AccessResult, ErrorKind};
pub use grant::{DomainAccessGrant, GrantKey, GrantLedger, GrantState};
pub use identity::{IdentityRecord, IdentityRegistry};
pub use registry::AccessRegistry;
pub use validate::MAX_TEXT_LEN;
