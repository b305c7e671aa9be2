//! Session-key agreement between two wallet identities.
//!
//! Both parties derive a leaf key, convert the Ed25519 identities to
//! their X25519 (Montgomery) form, and hash the Diffie-Hellman point
//! together with both converted public keys in a canonical order. The
//! party that goes first in the transcript passes `me_first = true`,
//! the other `me_first = false`; with opposite flags both ends arrive
//! at the same 32-byte session key.
//!
//! The module also carries a small sealing helper over the session key
//! so that agreed secrets can directly authenticate-encrypt messages.

use cryptoxide::blake2b::Blake2b;
use cryptoxide::chacha20poly1305::ChaCha20Poly1305;
use cryptoxide::curve25519::{Fe, GeP2, GeP3};
use cryptoxide::digest::Digest;
use cryptoxide::util::fixed_time_eq;

use std::iter::repeat;
use std::{fmt, result};

use hdwallet::{XPrv, PUBLIC_KEY_SIZE};
use util::{hex, securemem};

pub const SESSION_KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// the given public key is of invalid size, the parameter is the
    /// given size
    InvalidPublicKeySize(usize),
    /// the given bytes are not a valid compressed Edwards point
    InvalidPublicKey,
    /// the key exchange produced an all-zero shared point
    WeakPoint,
    /// sealed input too short to carry an authentication tag
    NotEnoughSealedData,
    /// authentication failed, the sealed data is corrupted or the key
    /// does not match
    CannotOpen,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::InvalidPublicKeySize(sz) => write!(
                f,
                "invalid public key size, expected {} but received {} bytes.",
                PUBLIC_KEY_SIZE, sz
            ),
            &Error::InvalidPublicKey => write!(f, "invalid public key point"),
            &Error::WeakPoint => write!(f, "key exchange produced a weak shared point"),
            &Error::NotEnoughSealedData => write!(f, "not enough sealed data"),
            &Error::CannotOpen => write!(f, "cannot open sealed data"),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

const FE_ONE_BYTES: [u8; 32] = [
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

// montgomery u-coordinate of a compressed Edwards point: u = (1+y)/(1-y).
// the sign bit is irrelevant, u depends on y only.
fn montgomery_u(point: &[u8]) -> [u8; 32] {
    let mut yb = [0u8; 32];
    yb.clone_from_slice(&point[0..32]);
    yb[31] &= 0b0111_1111;
    let y = Fe::from_bytes(&yb);
    let one = Fe::from_bytes(&FE_ONE_BYTES);
    ((one + y) * (one - y).invert()).to_bytes()
}

/// convert an Ed25519 public key to its X25519 form
///
/// ```
/// use xhdwallet::ecdh::ed25519_pk_to_x25519;
///
/// // the base point
/// let mut pk = [0x66u8; 32]; pk[0] = 0x58;
/// assert!(ed25519_pk_to_x25519(&pk[..]).is_ok());
/// ```
pub fn ed25519_pk_to_x25519(pk: &[u8]) -> Result<[u8; 32]> {
    if pk.len() != PUBLIC_KEY_SIZE {
        return Err(Error::InvalidPublicKeySize(pk.len()));
    }
    if GeP3::from_bytes_negate_vartime(pk).is_none() {
        return Err(Error::InvalidPublicKey);
    }
    Ok(montgomery_u(pk))
}

/// A 32-byte symmetric session key agreed upon through [`shared_secret`].
pub struct SessionKey([u8; SESSION_KEY_SIZE]);
impl SessionKey {
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        SessionKey(bytes)
    }

    /// authenticate-encrypt the input, appending the 16-byte tag
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], input: &[u8]) -> Vec<u8> {
        let mut ctx = ChaCha20Poly1305::new(&self.0, &nonce[..], &[]);

        let len = input.len();

        let mut out: Vec<u8> = repeat(0).take(len).collect();
        let mut tag = [0; TAG_LEN];

        ctx.encrypt(input, &mut out[0..len], &mut tag);
        out.extend_from_slice(&tag[..]);
        out
    }

    /// authenticate-decrypt data produced by `seal`
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], input: &[u8]) -> Result<Vec<u8>> {
        if input.len() < TAG_LEN {
            return Err(Error::NotEnoughSealedData);
        }
        let len = input.len() - TAG_LEN;

        let mut ctx = ChaCha20Poly1305::new(&self.0, &nonce[..], &[]);

        let mut out: Vec<u8> = repeat(0).take(len).collect();

        if ctx.decrypt(&input[..len], &mut out[..], &input[len..]) {
            Ok(out)
        } else {
            Err(Error::CannotOpen)
        }
    }
}
impl AsRef<[u8]> for SessionKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
impl PartialEq for SessionKey {
    fn eq(&self, rhs: &SessionKey) -> bool {
        fixed_time_eq(self.as_ref(), rhs.as_ref())
    }
}
impl Eq for SessionKey {}
impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
impl Drop for SessionKey {
    fn drop(&mut self) {
        securemem::zero(&mut self.0);
    }
}

/// derive the shared session key between the given leaf key and the
/// other party's public key
///
/// Both parties must call with opposite `me_first` values. The shared
/// Edwards point is computed with the left scalar directly, so the
/// agreement holds for every derived child key; an all-zero shared
/// point fails with `Error::WeakPoint`.
pub fn shared_secret(leaf: &XPrv, other_pk: &[u8], me_first: bool) -> Result<SessionKey> {
    if other_pk.len() != PUBLIC_KEY_SIZE {
        return Err(Error::InvalidPublicKeySize(other_pk.len()));
    }
    let peer = match GeP3::from_bytes_negate_vartime(other_pk) {
        Some(p) => p,
        None => return Err(Error::InvalidPublicKey),
    };

    // kl * (-peer) and kl * peer share the same y, hence the same u
    let kl = &leaf.as_ref()[0..32];
    let zero = [0u8; 32];
    let shared = GeP2::double_scalarmult_vartime(kl, peer, &zero);
    let mut dh = montgomery_u(&shared.to_bytes());

    if dh.iter().all(|b| *b == 0) {
        return Err(Error::WeakPoint);
    }

    let self_x = montgomery_u(&leaf.public().public_key());
    let peer_x = montgomery_u(other_pk);

    let mut hasher = Blake2b::new(SESSION_KEY_SIZE);
    hasher.input(&dh);
    if me_first {
        hasher.input(&self_x);
        hasher.input(&peer_x);
    } else {
        hasher.input(&peer_x);
        hasher.input(&self_x);
    }
    let mut key = [0u8; SESSION_KEY_SIZE];
    hasher.result(&mut key);

    securemem::zero(&mut dh);

    Ok(SessionKey::from_bytes(key))
}
