//! Hierarchical Deterministic (HD) Wallet
//!
//! Ed25519-BIP32 key tree over a non-linear keyspace.
//!
//! Supports:
//! * Transform 64-byte seed to extended private key (with unusable-seed detection)
//! * Hard and soft derivation using 32 bits indices
//! * Khovratovich derivation scheme (224 bits of child entropy, for
//!   compatibility with peer wallets)
//! * Peikert derivation scheme (247 bits of child entropy, default)
//! * Extended-key signing and detached verification
//!
use cryptoxide::blake2b::Blake2b;
use cryptoxide::digest::Digest;
use cryptoxide::sha2::{Sha256, Sha512};
use cryptoxide::curve25519::{ge_scalarmult_base, sc_muladd, sc_reduce, GeP3};
use cryptoxide::ed25519;
use cryptoxide::util::fixed_time_eq;

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::{fmt, result};

use util::{hex, securemem};

pub const SEED_SIZE: usize = 64;
pub const XPRV_SIZE: usize = 96;
pub const XPUB_SIZE: usize = 64;
pub const SIGNATURE_SIZE: usize = 64;

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const CHAIN_CODE_SIZE: usize = 32;

/// HDWallet errors
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Error {
    /// the given seed is of invalid size, the parameter is the given size
    ///
    /// See `SEED_SIZE` for details about the expected size.
    InvalidSeedSize(usize),
    /// the seed hashes to a left scalar whose third-highest bit is set,
    /// which the derivation construction cannot accept. Such a seed must
    /// be discarded and a new one generated.
    UnusableSeed,
    /// the given extended private key is of invalid size. The parameter is the given size.
    ///
    /// See `XPRV_SIZE` for the expected size.
    InvalidXPrvSize(usize),
    /// the given extended public key is of invalid size. The parameter is the given size.
    ///
    /// See `XPUB_SIZE`
    InvalidXPubSize(usize),
    /// the given signature is of invalid size. The parameter is the given size.
    ///
    /// See `SIGNATURE_SIZE` for the expected size.
    InvalidSignatureSize(usize),
    /// The given extended private key is of invalid format for our usage of ED25519.
    ///
    /// This is not a problem of the size, see `Error::InvalidXPrvSize`
    InvalidXPrv(&'static str),
    HexadecimalError(hex::Error),
    /// a hardened index was used where only soft derivation is possible
    ExpectedSoftDerivation,
    /// the underlying Edwards point arithmetic rejected the input
    InvalidDerivation,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::InvalidSeedSize(sz) => {
                write!(f, "Invalid Seed Size, expected {} bytes, but received {} bytes.", SEED_SIZE, sz)
            }
            &Error::UnusableSeed => {
                write!(f, "Unusable Seed, the seed must be discarded")
            }
            &Error::InvalidXPrvSize(sz) => {
                write!(f, "Invalid XPrv Size, expected {} bytes, but received {} bytes.", XPRV_SIZE, sz)
            }
            &Error::InvalidXPubSize(sz) => {
                write!(f, "Invalid XPub Size, expected {} bytes, but received {} bytes.", XPUB_SIZE, sz)
            }
            &Error::InvalidSignatureSize(sz) => {
                write!(f, "Invalid Signature Size, expected {} bytes, but received {} bytes.", SIGNATURE_SIZE, sz)
            }
            &Error::InvalidXPrv(ref err) => {
                write!(f, "Invalid XPrv: {}", err)
            }
            &Error::HexadecimalError(err) => {
                write!(f, "Invalid hexadecimal: {}.", err)
            }
            &Error::ExpectedSoftDerivation => {
                write!(f, "expected soft derivation")
            }
            &Error::InvalidDerivation => {
                write!(f, "invalid derivation")
            }
        }
    }
}
impl From<hex::Error> for Error {
    fn from(e: hex::Error) -> Error {
        Error::HexadecimalError(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Ed25519-bip32 derivation scheme
///
/// The schemes differ in how much of the PRF left half flows into the
/// child scalar: `Khovratovich` keeps the low 224 bits, `Peikert` keeps
/// the low 247 bits. Both shift the kept value left by 3 bits before
/// adding it to the parent scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationScheme {
    Khovratovich,
    Peikert,
}
impl Default for DerivationScheme {
    fn default() -> Self {
        DerivationScheme::Peikert
    }
}

/// Seed used to generate the root private key of the HDWallet.
///
#[derive(Debug)]
pub struct Seed([u8; SEED_SIZE]);
impl Seed {
    /// create a Seed by taking ownership of the given array
    ///
    /// ```
    /// use xhdwallet::hdwallet::{Seed, SEED_SIZE};
    ///
    /// let bytes = [1u8; SEED_SIZE];
    /// let seed  = Seed::from_bytes(bytes);
    ///
    /// assert!(seed.as_ref().len() == SEED_SIZE);
    /// ```
    pub fn from_bytes(buf: [u8; SEED_SIZE]) -> Self {
        Seed(buf)
    }

    /// create a Seed by copying the given slice into a new array
    ///
    /// ```
    /// use xhdwallet::hdwallet::{Seed, SEED_SIZE};
    ///
    /// let bytes = [1u8; SEED_SIZE];
    /// let wrong = [1u8; 31];
    ///
    /// assert!(Seed::from_slice(&wrong[..]).is_err());
    /// assert!(Seed::from_slice(&bytes[..]).is_ok());
    /// ```
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        if buf.len() != SEED_SIZE {
            return Err(Error::InvalidSeedSize(buf.len()));
        }
        let mut v = [0u8; SEED_SIZE];
        v[..].clone_from_slice(buf);
        Ok(Seed::from_bytes(v))
    }
}
impl AsRef<[u8]> for Seed {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
impl Drop for Seed {
    fn drop(&mut self) {
        securemem::zero(&mut self.0);
    }
}

/// HDWallet extended private key
///
/// Effectively this is a clamped left scalar (32 bytes) followed by a
/// right scalar (32 bytes) followed by a chain code (32 bytes).
pub struct XPrv([u8; XPRV_SIZE]);
impl XPrv {
    /// create the Root private key `XPrv` of the HDWallet associated to this `Seed`
    ///
    /// This is a deterministic construction. The `XPrv` returned will always be the
    /// same for the same given `Seed`.
    ///
    /// Roughly one seed in 32 hashes to a left scalar the construction
    /// cannot use; those fail with `Error::UnusableSeed` and the caller
    /// must pick a fresh seed.
    ///
    /// ```
    /// use xhdwallet::hdwallet::{Seed, SEED_SIZE, XPrv, XPRV_SIZE};
    ///
    /// let seed = Seed::from_bytes([1u8; SEED_SIZE]);
    /// let xprv = XPrv::generate_from_seed(&seed).unwrap();
    /// ```
    ///
    pub fn generate_from_seed(seed: &Seed) -> Result<Self> {
        let mut out = [0u8; XPRV_SIZE];

        let mut hasher = Sha512::new();
        hasher.input(seed.as_ref());
        hasher.result(&mut out[0..64]);

        if out[31] & 0b0010_0000 != 0 {
            securemem::zero(&mut out);
            return Err(Error::UnusableSeed);
        }
        out[0] &= 0b1111_1000;
        out[31] &= 0b0111_1111;
        out[31] |= 0b0100_0000;

        let mut hasher = Sha256::new();
        hasher.input(&[0x1]);
        hasher.input(seed.as_ref());
        hasher.result(&mut out[64..96]);

        Ok(XPrv::from_bytes(out))
    }

    /// takes the given raw bytes and perform some modifications to normalize
    /// it properly to a XPrv.
    ///
    pub fn normalize_bytes(mut bytes: [u8; XPRV_SIZE]) -> Self {
        bytes[0] &= 0b1111_1000;
        bytes[31] &= 0b0001_1111;
        bytes[31] |= 0b0100_0000;

        Self::from_bytes(bytes)
    }

    // Create a XPrv from the given bytes.
    //
    // This function does not perform any validity check and should not be used outside
    // of this module.
    fn from_bytes(bytes: [u8; XPRV_SIZE]) -> Self {
        XPrv(bytes)
    }

    /// Create a `XPrv` by taking ownership of the given array
    ///
    /// This function may return an error if it does not have the expected
    /// format.
    pub fn from_bytes_verified(bytes: [u8; XPRV_SIZE]) -> Result<Self> {
        let scalar = &bytes[0..32];
        let last = scalar[31];
        let first = scalar[0];

        if (last & 0b1110_0000) != 0b0100_0000 {
            return Err(Error::InvalidXPrv("expected 3 highest bits to be 0b010"));
        }
        if (first & 0b0000_0111) != 0b0000_0000 {
            return Err(Error::InvalidXPrv("expected 3 lowest bits to be 0b000"));
        }

        Ok(XPrv(bytes))
    }

    /// Create a `XPrv` from the given slice. This slice must be of size `XPRV_SIZE`
    /// otherwise it will return `Err`.
    ///
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != XPRV_SIZE {
            return Err(Error::InvalidXPrvSize(bytes.len()));
        }
        let mut buf = [0u8; XPRV_SIZE];
        buf[..].clone_from_slice(bytes);
        Ok(XPrv::from_bytes(buf))
    }

    /// Create a `XPrv` from a given hexadecimal string
    ///
    pub fn from_hex(hex: &str) -> Result<Self> {
        let input = hex::decode(hex)?;
        Self::from_slice(&input)
    }

    /// Get the associated `XPub`
    ///
    /// ```
    /// use xhdwallet::hdwallet::{Seed, SEED_SIZE, XPrv, XPub};
    ///
    /// let seed = Seed::from_bytes([1u8; SEED_SIZE]);
    /// let xprv = XPrv::generate_from_seed(&seed).unwrap();
    ///
    /// let xpub = xprv.public();
    /// ```
    pub fn public(&self) -> XPub {
        let pk = mk_public_key(&self.0[0..32]);
        let mut out = [0u8; XPUB_SIZE];
        out[0..32].clone_from_slice(&pk);
        out[32..64].clone_from_slice(&self.0[64..]);
        XPub::from_bytes(out)
    }

    /// sign the given message with the `XPrv`.
    ///
    /// The extended key is used as-is: the left scalar signs, the right
    /// scalar seeds the deterministic nonce.
    ///
    /// ```
    /// use xhdwallet::hdwallet::{Seed, SEED_SIZE, XPrv, Signature};
    ///
    /// let seed = Seed::from_bytes([1u8; SEED_SIZE]);
    /// let xprv = XPrv::generate_from_seed(&seed).unwrap();
    /// let msg = b"Some message...";
    ///
    /// let signature : Signature<String> = xprv.sign(msg);
    /// assert!(xprv.verify(msg, &signature));
    /// ```
    pub fn sign<T>(&self, message: &[u8]) -> Signature<T> {
        // r = H(kR || M) mod l
        let mut nonce = [0u8; 64];
        let mut hasher = Sha512::new();
        hasher.input(&self.0[32..64]);
        hasher.input(message);
        hasher.result(&mut nonce);
        sc_reduce(&mut nonce);

        let r_point = ge_scalarmult_base(&nonce[0..32]).to_bytes();
        let pk = mk_public_key(&self.0[0..32]);

        // h = H(R || A || M) mod l
        let mut hram = [0u8; 64];
        let mut hasher = Sha512::new();
        hasher.input(&r_point);
        hasher.input(&pk);
        hasher.input(message);
        hasher.result(&mut hram);
        sc_reduce(&mut hram);

        let mut out = [0u8; SIGNATURE_SIZE];
        out[0..32].clone_from_slice(&r_point);
        {
            let (_, s) = out.split_at_mut(32);
            // S = r + h * kL mod l
            sc_muladd(s, &hram[0..32], &self.0[0..32], &nonce[0..32]);
        }

        securemem::zero(&mut nonce);
        securemem::zero(&mut hram);

        Signature::from_bytes(out)
    }

    /// verify a given signature
    ///
    pub fn verify<T>(&self, message: &[u8], signature: &Signature<T>) -> bool {
        let xpub = self.public();
        xpub.verify(message, signature)
    }

    /// derive the child key at the given index
    pub fn derive(&self, scheme: DerivationScheme, index: DerivationIndex) -> Self {
        derive_private(self, index, scheme)
    }

    /// walk the given derivation path left to right, returning the leaf key
    ///
    /// Intermediate keys are scrubbed as the walk advances.
    pub fn derive_path(&self, scheme: DerivationScheme, path: &[DerivationIndex]) -> Self {
        let mut key = self.clone();
        for index in path {
            key = key.derive(scheme, *index);
        }
        key
    }
}
impl PartialEq for XPrv {
    fn eq(&self, rhs: &XPrv) -> bool {
        fixed_time_eq(self.as_ref(), rhs.as_ref())
    }
}
impl Eq for XPrv {}
impl Clone for XPrv {
    fn clone(&self) -> Self {
        Self::from_slice(self.as_ref()).expect("it is already a safely constructed XPrv")
    }
}
impl fmt::Debug for XPrv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
impl fmt::Display for XPrv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
impl AsRef<[u8]> for XPrv {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
impl Drop for XPrv {
    fn drop(&mut self) {
        securemem::zero(&mut self.0);
    }
}

/// Extended Public Key (Point + ChainCode)
///
/// The chain code enables derivation of every soft descendant, so an
/// `XPub` must only be shared when that capability is intended.
#[derive(Clone, Copy)]
pub struct XPub([u8; XPUB_SIZE]);
impl XPub {
    /// create a `XPub` by taking ownership of the given array
    pub fn from_bytes(bytes: [u8; XPUB_SIZE]) -> Self {
        XPub(bytes)
    }

    /// create a `XPub` from the given slice. This slice must be of size `XPUB_SIZE`
    /// otherwise it will return `Err`.
    ///
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != XPUB_SIZE {
            return Err(Error::InvalidXPubSize(bytes.len()));
        }
        let mut buf = [0u8; XPUB_SIZE];
        buf[..].clone_from_slice(bytes);
        Ok(Self::from_bytes(buf))
    }

    /// create a `XPub` from a given hexadecimal string
    ///
    /// ```
    /// use xhdwallet::hdwallet::XPub;
    ///
    /// let xpub = XPub::from_hex("30cef16fa626c46dbf22b2d528e1da9fe38c1c3316be79ca8e2aed1a41bea17626e52319b5693522b821ca06d58c360e34bcd103391ff36b07c9e6e9ea8e50ed");
    ///
    /// assert!(xpub.is_ok());
    /// ```
    ///
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes)
    }

    /// the compressed Edwards point, without the chain code
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let mut pk = [0u8; PUBLIC_KEY_SIZE];
        pk.clone_from_slice(&self.0[0..32]);
        pk
    }

    /// the chain code, without the point
    pub fn chain_code(&self) -> ChainCode {
        let mut cc = [0u8; CHAIN_CODE_SIZE];
        cc.clone_from_slice(&self.0[32..64]);
        cc
    }

    /// verify a signature
    ///
    pub fn verify<T>(&self, message: &[u8], signature: &Signature<T>) -> bool {
        ed25519::verify(message, &self.0[0..32], signature.as_ref())
    }

    /// derive the child public key at the given index
    ///
    /// Only soft indices are allowed here; a hardened index fails with
    /// `Error::ExpectedSoftDerivation`.
    pub fn derive(&self, scheme: DerivationScheme, index: DerivationIndex) -> Result<Self> {
        derive_public(self, index, scheme)
    }

    /// walk the given soft derivation path left to right
    pub fn derive_path(&self, scheme: DerivationScheme, path: &[DerivationIndex]) -> Result<Self> {
        let mut key = *self;
        for index in path {
            key = key.derive(scheme, *index)?;
        }
        Ok(key)
    }
}
impl PartialEq for XPub {
    fn eq(&self, rhs: &XPub) -> bool {
        fixed_time_eq(self.as_ref(), rhs.as_ref())
    }
}
impl Eq for XPub {}
impl Hash for XPub {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.0)
    }
}
impl fmt::Display for XPub {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
impl fmt::Debug for XPub {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
impl AsRef<[u8]> for XPub {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// a signature with an associated type tag
///
#[derive(Clone)]
pub struct Signature<T> {
    bytes: [u8; SIGNATURE_SIZE],
    _phantom: PhantomData<T>,
}
impl<T> Signature<T> {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Signature {
            bytes: bytes,
            _phantom: PhantomData,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(Error::InvalidSignatureSize(bytes.len()));
        }
        let mut buf = [0u8; SIGNATURE_SIZE];
        buf[..].clone_from_slice(bytes);
        Ok(Self::from_bytes(buf))
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes)
    }

    pub fn coerce<R>(self) -> Signature<R> {
        Signature::<R>::from_bytes(self.bytes)
    }

    pub fn to_bytes<'a>(&'a self) -> &'a [u8; SIGNATURE_SIZE] {
        &self.bytes
    }
}
impl<T> PartialEq for Signature<T> {
    fn eq(&self, rhs: &Signature<T>) -> bool {
        fixed_time_eq(self.as_ref(), rhs.as_ref())
    }
}
impl<T> Eq for Signature<T> {}
impl<T> fmt::Display for Signature<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
impl<T> fmt::Debug for Signature<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}
impl<T> AsRef<[u8]> for Signature<T> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

pub type ChainCode = [u8; CHAIN_CODE_SIZE];

pub type DerivationIndex = u32;

pub const SOFT_UPPER_BOUND: u32 = 0x80000000;

#[derive(Debug, PartialEq, Eq)]
enum DerivationType {
    Soft(u32),
    Hard(u32),
}

fn to_type(index: DerivationIndex) -> DerivationType {
    if index >= SOFT_UPPER_BOUND {
        DerivationType::Hard(index)
    } else {
        DerivationType::Soft(index)
    }
}

fn le32(i: u32) -> [u8; 4] {
    [i as u8, (i >> 8) as u8, (i >> 16) as u8, (i >> 24) as u8]
}

fn mk_xprv(out: &mut [u8; XPRV_SIZE], kl: &[u8], kr: &[u8], cc: &[u8]) {
    assert!(kl.len() == 32);
    assert!(kr.len() == 32);
    assert!(cc.len() == CHAIN_CODE_SIZE);

    out[0..32].clone_from_slice(kl);
    out[32..64].clone_from_slice(kr);
    out[64..96].clone_from_slice(cc);
}

fn mk_xpub(out: &mut [u8; XPUB_SIZE], pk: &[u8], cc: &[u8]) {
    assert!(pk.len() == 32);
    assert!(cc.len() == CHAIN_CODE_SIZE);

    out[0..32].clone_from_slice(pk);
    out[32..64].clone_from_slice(cc);
}

/// base point multiplication of a (possibly unreduced) left scalar
///
/// The scalar is reduced mod l first; this leaves the point unchanged
/// and keeps the multiplication exact for child scalars that have
/// drifted above 2^255 after many derivation levels.
fn mk_public_key(kl: &[u8]) -> [u8; PUBLIC_KEY_SIZE] {
    assert!(kl.len() == 32);
    let mut scalar = [0u8; 64];
    scalar[0..32].clone_from_slice(kl);
    sc_reduce(&mut scalar);
    let pk = ge_scalarmult_base(&scalar[0..32]).to_bytes();
    securemem::zero(&mut scalar);
    pk
}

fn add_256bits(x: &[u8], y: &[u8]) -> [u8; 32] {
    assert!(x.len() == 32);
    assert!(y.len() == 32);

    let mut carry: u16 = 0;
    let mut out = [0u8; 32];
    for i in 0..32 {
        let r = (x[i] as u16) + (y[i] as u16) + carry;
        out[i] = r as u8;
        carry = r >> 8;
    }
    out
}

// x + 8 * trunc28(y), keeping the low 224 bits of y
fn add_left_khovratovich(x: &[u8], y: &[u8]) -> [u8; 32] {
    assert!(x.len() == 32);
    assert!(y.len() == 32);

    let mut carry: u16 = 0;
    let mut out = [0u8; 32];

    for i in 0..28 {
        let r = x[i] as u16 + ((y[i] as u16) << 3) + carry;
        out[i] = (r & 0xff) as u8;
        carry = r >> 8;
    }
    for i in 28..32 {
        let r = x[i] as u16 + carry;
        out[i] = (r & 0xff) as u8;
        carry = r >> 8;
    }
    out
}

// x + 8 * trunc247(y), keeping the low 247 bits of y so the shifted
// value stays below 2^250 and the addition cannot wrap
fn add_left_peikert(x: &[u8], y: &[u8]) -> [u8; 32] {
    assert!(x.len() == 32);
    assert!(y.len() == 32);

    let mut carry: u16 = 0;
    let mut out = [0u8; 32];

    for i in 0..32 {
        let yi = match i {
            30 => y[i] & 0b0111_1111,
            31 => 0,
            _ => y[i],
        };
        let r = x[i] as u16 + ((yi as u16) << 3) + carry;
        out[i] = (r & 0xff) as u8;
        carry = r >> 8;
    }
    out
}

fn add_left(x: &[u8], y: &[u8], scheme: DerivationScheme) -> [u8; 32] {
    match scheme {
        DerivationScheme::Khovratovich => add_left_khovratovich(x, y),
        DerivationScheme::Peikert => add_left_peikert(x, y),
    }
}

fn derive_private(xprv: &XPrv, index: DerivationIndex, scheme: DerivationScheme) -> XPrv {
    /*
     * If so (hardened child):
     *    let Z  = PRF(Key = cpar, 0x00 || kL || kR || le32(i)).
     *    let CC = PRF(Key = cpar, 0x01 || kL || kR || le32(i)).
     * If not (soft child):
     *    let Z  = PRF(Key = cpar, 0x00 || serP(point(kL)) || le32(i)).
     *    let CC = PRF(Key = cpar, 0x01 || serP(point(kL)) || le32(i)).
     *
     * where PRF is keyed BLAKE2b-512 and the child chain code is the
     * right half of CC.
     */

    let ekey = &xprv.as_ref()[0..64];
    let kl = &ekey[0..32];
    let kr = &ekey[32..64];
    let chaincode = &xprv.as_ref()[64..96];

    let mut zmac = Blake2b::new_keyed(64, chaincode);
    let mut ccmac = Blake2b::new_keyed(64, chaincode);
    let seri = le32(index);
    match to_type(index) {
        DerivationType::Soft(_) => {
            let pk = mk_public_key(kl);
            zmac.input(&[0x0]);
            zmac.input(&pk);
            zmac.input(&seri);
            ccmac.input(&[0x1]);
            ccmac.input(&pk);
            ccmac.input(&seri);
        }
        DerivationType::Hard(_) => {
            zmac.input(&[0x0]);
            zmac.input(ekey);
            zmac.input(&seri);
            ccmac.input(&[0x1]);
            ccmac.input(ekey);
            ccmac.input(&seri);
        }
    };

    let mut zout = [0u8; 64];
    zmac.result(&mut zout);

    // left = kl + 8 * trunc(zl)
    let mut left = add_left(kl, &zout[0..32], scheme);
    // right = kr + zr
    let mut right = add_256bits(kr, &zout[32..64]);

    let mut ccout = [0u8; 64];
    ccmac.result(&mut ccout);

    let mut out = [0u8; XPRV_SIZE];
    mk_xprv(&mut out, &left, &right, &ccout[32..64]);

    securemem::zero(&mut zout);
    securemem::zero(&mut ccout);
    securemem::zero(&mut left);
    securemem::zero(&mut right);

    XPrv::from_bytes(out)
}

fn point_of_left8(zl: &[u8], scheme: DerivationScheme) -> [u8; 32] {
    assert!(zl.len() == 32);
    let zero = [0u8; 32];
    let l8 = add_left(&zero, zl, scheme);
    let a = ge_scalarmult_base(&l8);
    a.to_bytes()
}

fn point_plus(p1: &[u8], p2: &[u8]) -> Result<[u8; 32]> {
    let a = match GeP3::from_bytes_negate_vartime(p1) {
        Some(g) => g,
        None => {
            return Err(Error::InvalidDerivation);
        }
    };
    let b = match GeP3::from_bytes_negate_vartime(p2) {
        Some(g) => g,
        None => {
            return Err(Error::InvalidDerivation);
        }
    };
    let r = a + b.to_cached();
    let mut r = r.to_p2().to_bytes();
    r[31] ^= 0x80;
    Ok(r)
}

fn derive_public(xpub: &XPub, index: DerivationIndex, scheme: DerivationScheme) -> Result<XPub> {
    let pk = &xpub.as_ref()[0..32];
    let chaincode = &xpub.as_ref()[32..64];

    let mut zmac = Blake2b::new_keyed(64, chaincode);
    let mut ccmac = Blake2b::new_keyed(64, chaincode);
    let seri = le32(index);
    match to_type(index) {
        DerivationType::Soft(_) => {
            zmac.input(&[0x0]);
            zmac.input(&pk);
            zmac.input(&seri);
            ccmac.input(&[0x1]);
            ccmac.input(&pk);
            ccmac.input(&seri);
        }
        DerivationType::Hard(_) => {
            return Err(Error::ExpectedSoftDerivation);
        }
    };

    let mut zout = [0u8; 64];
    zmac.result(&mut zout);

    // child point = parent point + 8 * trunc(zl) * B
    let left = point_plus(pk, &point_of_left8(&zout[0..32], scheme))?;

    let mut ccout = [0u8; 64];
    ccmac.result(&mut ccout);

    let mut out = [0u8; XPUB_SIZE];
    mk_xpub(&mut out, &left, &ccout[32..64]);

    securemem::zero(&mut zout);
    securemem::zero(&mut ccout);

    Ok(XPub::from_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REF_SEED_HEX: &'static str =
        "3aff2db416b895ec3cf9a4f8d1e970bc9819920e7bf44a5e350477af0ef557b1\
         511b0986debf78dd38c7c520cd44ff7c7231618f958e21ef0250733a8c1915ea";

    const REF_ROOT_HEX: &'static str =
        "a8ba80028922d9fcfa055c78aede55b5c575bcd8d5a53168edf45f36d9ec8f46\
         94592b4bc892907583e22669ecdf1b0409a9f3bd5549f2dd751b51360909cd05\
         796b9206ec30e142e94b790a98805bf999042b55046963174ee6cee2d0375946";

    fn ref_root() -> XPrv {
        let seed = Seed::from_slice(&hex::decode(REF_SEED_HEX).unwrap()).unwrap();
        XPrv::generate_from_seed(&seed).unwrap()
    }

    #[test]
    fn seed_to_root_matches_reference() {
        assert_eq!(hex::encode(ref_root().as_ref()), REF_ROOT_HEX);
    }

    #[test]
    fn unusable_seeds_are_rejected() {
        // both hash to a left scalar with the third-highest bit set
        assert_eq!(
            XPrv::generate_from_seed(&Seed::from_bytes([0u8; SEED_SIZE])).unwrap_err(),
            Error::UnusableSeed
        );
        assert_eq!(
            XPrv::generate_from_seed(&Seed::from_bytes([42u8; SEED_SIZE])).unwrap_err(),
            Error::UnusableSeed
        );
    }

    #[test]
    fn root_is_clamped() {
        let root = ref_root();
        let kl = &root.as_ref()[0..32];
        assert_eq!(kl[0] & 0b0000_0111, 0);
        assert_eq!(kl[31] & 0b1110_0000, 0b0100_0000);
    }

    #[test]
    fn root_passes_verification() {
        let root = ref_root();
        let mut bytes = [0u8; XPRV_SIZE];
        bytes.clone_from_slice(root.as_ref());
        assert!(XPrv::from_bytes_verified(bytes).is_ok());
    }

    #[test]
    fn verification_rejects_bad_clamp() {
        let root = ref_root();
        let mut bytes = [0u8; XPRV_SIZE];
        bytes.clone_from_slice(root.as_ref());
        bytes[0] |= 0b0000_0001;
        assert!(XPrv::from_bytes_verified(bytes).is_err());
        bytes.clone_from_slice(root.as_ref());
        bytes[31] |= 0b1000_0000;
        assert!(XPrv::from_bytes_verified(bytes).is_err());
    }

    #[test]
    fn normalize_bytes_always_verifies() {
        for fill in [0u8, 0x3C, 0xA5, 0xFF].iter() {
            let xprv = XPrv::normalize_bytes([*fill; XPRV_SIZE]);
            let mut bytes = [0u8; XPRV_SIZE];
            bytes.clone_from_slice(xprv.as_ref());
            assert!(XPrv::from_bytes_verified(bytes).is_ok());
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let root = ref_root();
        let path = [0x8000002C, 0x8000011B, 0x80000000, 0, 0];
        let a = root.derive_path(DerivationScheme::Peikert, &path);
        let b = root.derive_path(DerivationScheme::Peikert, &path);
        assert_eq!(a, b);
    }

    #[test]
    fn schemes_produce_distinct_children() {
        let root = ref_root();
        let k = root.derive(DerivationScheme::Khovratovich, 0x80000000);
        let p = root.derive(DerivationScheme::Peikert, 0x80000000);
        assert!(k != p);
    }

    #[test]
    fn children_keep_low_scalar_bits_clear() {
        let root = ref_root();
        for scheme in [DerivationScheme::Khovratovich, DerivationScheme::Peikert].iter() {
            let mut key = root.clone();
            for index in [0x8000002C, 0x8000011Bu32, 0x80000000, 0, 5].iter() {
                key = key.derive(*scheme, *index);
                assert_eq!(key.as_ref()[0] & 0b0000_0111, 0);
            }
        }
    }

    #[test]
    fn public_derivation_matches_private_soft_derivation() {
        let root = ref_root();
        for scheme in [DerivationScheme::Khovratovich, DerivationScheme::Peikert].iter() {
            let account = root.derive_path(*scheme, &[0x8000002C, 0x8000011B, 0x80000000]);
            let account_pub = account.public();
            for index in [0u32, 1, 2, 0x10000000].iter() {
                let child_prv = account.derive(*scheme, *index);
                let child_pub = account_pub.derive(*scheme, *index).unwrap();
                assert_eq!(child_prv.public(), child_pub);
            }
        }
    }

    #[test]
    fn public_derivation_rejects_hardened_indices() {
        let root = ref_root();
        let xpub = root.public();
        assert_eq!(
            xpub.derive(DerivationScheme::Peikert, 0x80000000).unwrap_err(),
            Error::ExpectedSoftDerivation
        );
        assert_eq!(
            xpub.derive_path(DerivationScheme::Peikert, &[0, 0x80000001]).unwrap_err(),
            Error::ExpectedSoftDerivation
        );
    }

    #[test]
    fn derive_path_walks_left_to_right() {
        let root = ref_root();
        let walked = root.derive_path(DerivationScheme::Peikert, &[0x8000002C, 0x8000011B, 0x80000000, 0]);
        let manual = root
            .derive(DerivationScheme::Peikert, 0x8000002C)
            .derive(DerivationScheme::Peikert, 0x8000011B)
            .derive(DerivationScheme::Peikert, 0x80000000)
            .derive(DerivationScheme::Peikert, 0);
        assert_eq!(walked, manual);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let root = ref_root();
        let leaf = root.derive_path(DerivationScheme::Peikert, &[0x8000002C, 0x8000011B, 0x80000000, 0, 0]);
        let msg = b"arbitrary payload bytes";
        let signature: Signature<Vec<u8>> = leaf.sign(msg);
        assert!(leaf.verify(msg, &signature));
        assert!(!leaf.verify(b"different payload", &signature));
        assert!(!root.verify(msg, &signature));
    }

    #[test]
    fn signature_verifies_against_derived_public_key() {
        let root = ref_root();
        let leaf = root.derive_path(DerivationScheme::Peikert, &[0x8000002C, 0x8000011B, 0x80000000, 0, 1]);
        let msg = b"check the detached path";
        let signature: Signature<Vec<u8>> = leaf.sign(msg);
        let xpub = leaf.public();
        assert!(xpub.verify(msg, &signature));
    }

    #[test]
    fn xprv_hex_roundtrip() {
        let root = ref_root();
        let xprv = XPrv::from_hex(&hex::encode(root.as_ref())).unwrap();
        assert_eq!(root, xprv);
    }

    #[test]
    fn seed_size_is_checked() {
        assert_eq!(
            Seed::from_slice(&[0u8; 32]).unwrap_err(),
            Error::InvalidSeedSize(32)
        );
    }
}
