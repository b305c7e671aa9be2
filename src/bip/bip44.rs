//! BIP44 addressing
//!
//! provides the logic to address keys of the wallet tree with
//! `purpose / coin_type / account / change / index` paths where the
//! first three levels are hardened.
//!
//! # Example
//!
//! ```
//! use xhdwallet::bip::bip44::{Addressing, KeyContext};
//!
//! let addressing = Addressing::new(KeyContext::Address, 0, 0, 0).unwrap();
//!
//! assert_eq!(addressing.to_path(), [0x8000002C, 0x8000011B, 0x80000000, 0, 0]);
//! ```

use hdwallet::DerivationIndex;
use std::{error, fmt, result};

/// the BIP44 derivation path has a specific length
pub const BIP44_PATH_LENGTH: usize = 5;
/// the BIP44 derivation path has a specific purpose
pub const BIP44_PURPOSE: u32 = 0x8000002C;

/// the soft derivation is upper bounded
pub const BIP44_SOFT_UPPER_BOUND: u32 = 0x80000000;

pub fn harden(index: u32) -> DerivationIndex {
    index | BIP44_SOFT_UPPER_BOUND
}

/// Error relating to `bip44`'s `Addressing` operations
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Error {
    /// this means the given account is out of bound. Indeed the account
    /// derivation is expected to be a hard derivation, so the account
    /// number must fit below the hardening boundary.
    AccountOutOfBound(u32),

    /// this means the given change is out of bound. Indeed the change
    /// derivation is expected to be a soft derivation.
    ChangeOutOfBound(u32),

    /// this means the given index is out of bound. Indeed the key index
    /// derivation is expected to be a soft derivation.
    IndexOutOfBound(u32),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::AccountOutOfBound(given) => write!(
                f,
                "Account out of bound, should have a hard derivation but received 0x{:x}",
                given
            ),
            &Error::ChangeOutOfBound(given) => write!(
                f,
                "Change out of bound, should have a soft derivation but received 0x{:x}",
                given
            ),
            &Error::IndexOutOfBound(given) => write!(
                f,
                "Index out of bound, should have a soft derivation but received 0x{:x}",
                given
            ),
        }
    }
}
impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// The purpose a key tree is addressed for.
///
/// The context selects the BIP44 coin type of the second path level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyContext {
    /// ledger addresses, coin type 283
    Address,
    /// identity keys, coin type 0
    Identity,
}
impl KeyContext {
    pub fn coin_type(&self) -> u32 {
        match self {
            &KeyContext::Address => 283,
            &KeyContext::Identity => 0,
        }
    }
}

/// A bound-checked BIP44 position: context, account, change and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    context: KeyContext,
    account: u32,
    change: u32,
    index: u32,
}
impl Addressing {
    /// create a new `Addressing` checking that account, change and index
    /// fit their derivation-type bounds.
    pub fn new(context: KeyContext, account: u32, change: u32, index: u32) -> Result<Self> {
        if account >= BIP44_SOFT_UPPER_BOUND {
            return Err(Error::AccountOutOfBound(account));
        }
        if change >= BIP44_SOFT_UPPER_BOUND {
            return Err(Error::ChangeOutOfBound(change));
        }
        if index >= BIP44_SOFT_UPPER_BOUND {
            return Err(Error::IndexOutOfBound(index));
        }
        Ok(Addressing {
            context: context,
            account: account,
            change: change,
            index: index,
        })
    }

    pub fn context(&self) -> KeyContext {
        self.context
    }
    pub fn account(&self) -> u32 {
        self.account
    }
    pub fn change(&self) -> u32 {
        self.change
    }
    pub fn index(&self) -> u32 {
        self.index
    }

    /// the full derivation path, first three levels hardened
    pub fn to_path(&self) -> [DerivationIndex; BIP44_PATH_LENGTH] {
        [
            BIP44_PURPOSE,
            harden(self.context.coin_type()),
            harden(self.account),
            self.change,
            self.index,
        ]
    }

    /// the path of the change level, for soft public derivation of the
    /// addresses below it
    pub fn to_change_path(&self) -> [DerivationIndex; 4] {
        [
            BIP44_PURPOSE,
            harden(self.context.coin_type()),
            harden(self.account),
            self.change,
        ]
    }
}
