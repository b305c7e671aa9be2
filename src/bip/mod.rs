pub mod bip44;
