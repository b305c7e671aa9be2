//! Context-level wallet operations.
//!
//! Ties the BIP44 addressing, the derivation engine, the signing gate
//! and the key exchange together behind the handful of operations a
//! wallet holder actually performs against a root key: deriving
//! addressable public keys, signing transactions and arbitrary data,
//! verifying signatures and agreeing on session keys.
//!
//! The root key is borrowed for the duration of each call; no key
//! material is retained between calls.

use cryptoxide::ed25519;

use std::{fmt, result};

use bip::bip44::{self, Addressing, KeyContext};
use ecdh::{self, SessionKey};
use hdwallet::{DerivationScheme, Signature, XPrv, XPub, PUBLIC_KEY_SIZE};
use schema::Validator;
use signer::{self, Data, SignMetadata, Transaction};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    AddressingError(bip44::Error),
    SignerError(signer::Error),
    EcdhError(ecdh::Error),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::AddressingError(err) => write!(f, "invalid addressing: {}", err),
            &Error::SignerError(err) => write!(f, "refusing to sign: {}", err),
            &Error::EcdhError(err) => write!(f, "key exchange failed: {}", err),
        }
    }
}
impl From<bip44::Error> for Error {
    fn from(e: bip44::Error) -> Error {
        Error::AddressingError(e)
    }
}
impl From<signer::Error> for Error {
    fn from(e: signer::Error) -> Error {
        Error::SignerError(e)
    }
}
impl From<ecdh::Error> for Error {
    fn from(e: ecdh::Error) -> Error {
        Error::EcdhError(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

fn derive_leaf(
    root: &XPrv,
    context: KeyContext,
    account: u32,
    change: u32,
    index: u32,
    scheme: DerivationScheme,
) -> Result<XPrv> {
    let addressing = Addressing::new(context, account, change, index)?;
    Ok(root.derive_path(scheme, &addressing.to_path()))
}

/// the public key at `m / 44' / coin_type' / account' / 0 / key_index`
pub fn key_gen(
    root: &XPrv,
    context: KeyContext,
    account: u32,
    key_index: u32,
    scheme: DerivationScheme,
) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    let leaf = derive_leaf(root, context, account, 0, key_index, scheme)?;
    Ok(leaf.public().public_key())
}

/// the extended public key of the change level, from which the keys
/// below it derive by soft public derivation
pub fn change_level_xpub(
    root: &XPrv,
    context: KeyContext,
    account: u32,
    change: u32,
    scheme: DerivationScheme,
) -> Result<XPub> {
    let addressing = Addressing::new(context, account, change, 0)?;
    let key = root.derive_path(scheme, &addressing.to_change_path());
    Ok(key.public())
}

/// sign a transaction that already carries its domain separation prefix
pub fn sign_algo_transaction(
    root: &XPrv,
    context: KeyContext,
    account: u32,
    change: u32,
    key_index: u32,
    prefix_encoded_tx: &[u8],
    scheme: DerivationScheme,
) -> Result<Signature<Transaction>> {
    let leaf = derive_leaf(root, context, account, change, key_index, scheme)?;
    Ok(signer::sign_transaction(&leaf, prefix_encoded_tx))
}

/// sign arbitrary data after tag rejection, decoding and schema
/// validation
pub fn sign_data<V: Validator>(
    root: &XPrv,
    context: KeyContext,
    account: u32,
    change: u32,
    key_index: u32,
    data: &[u8],
    metadata: &SignMetadata<V>,
    scheme: DerivationScheme,
) -> Result<Signature<Data>> {
    let leaf = derive_leaf(root, context, account, change, key_index, scheme)?;
    let signature = signer::sign_data(&leaf, data, metadata)?;
    Ok(signature)
}

/// detached verification of any signature produced by the wallet
///
/// No tag policy is applied to the message.
pub fn verify_with_public_key<T>(
    signature: &Signature<T>,
    message: &[u8],
    public_key: &[u8],
) -> bool {
    if public_key.len() != PUBLIC_KEY_SIZE {
        return false;
    }
    ed25519::verify(message, public_key, signature.as_ref())
}

/// derive the session key shared with the holder of `other_pk`
///
/// Both parties must use opposite `me_first` values to agree on the
/// same key.
pub fn ecdh(
    root: &XPrv,
    context: KeyContext,
    account: u32,
    key_index: u32,
    other_pk: &[u8],
    me_first: bool,
    scheme: DerivationScheme,
) -> Result<SessionKey> {
    let leaf = derive_leaf(root, context, account, 0, key_index, scheme)?;
    let key = ecdh::shared_secret(&leaf, other_pk, me_first)?;
    Ok(key)
}
