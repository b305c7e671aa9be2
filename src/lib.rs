//! Hierarchical deterministic wallet over Ed25519
//!
//! Features:
//!
//! * Seed to extended root key conversion with unusable-seed detection
//! * Ed25519-BIP32 hard and soft derivation, Khovratovich and Peikert
//!   schemes
//! * BIP44 addressing (`m / 44' / coin_type' / account' / change / index`)
//! * Extended-key transaction signing with domain separation
//! * Arbitrary-data signing behind a tag-rejection and schema-validation
//!   gate
//! * Ed25519 to X25519 session-key agreement with authenticated sealing
//!
#![cfg_attr(feature = "with-bench", feature(test))]

#[macro_use]
extern crate serde_derive;
extern crate serde;
#[cfg_attr(test, macro_use)]
extern crate serde_json;

#[cfg(test)]
#[cfg(feature = "with-bench")]
extern crate test;

extern crate base64;
extern crate cryptoxide;
extern crate rmp_serde;

pub mod util;
pub mod hdwallet;
pub mod bip;
pub mod tags;
pub mod schema;
pub mod signer;
pub mod ecdh;
pub mod wallet;
