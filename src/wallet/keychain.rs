//! The wallet's ordered list of owned keys (spec.md §4.8: "an ordered list
//! of keys").

use crate::config::NetworkParams;
use crate::crypto::address::Address;
use crate::crypto::key::EcKey;

/// Owned keys in the order they were added. The first key is the default
/// change address (spec.md §4.8 `CreateSend` step 2).
#[derive(Default)]
pub struct Keychain {
    keys: Vec<EcKey>,
}

impl Keychain {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    pub fn add(&mut self, key: EcKey) {
        self.keys.push(key);
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All addresses this keychain controls, under `params`'s address
    /// version byte.
    pub fn addresses(&self, params: &NetworkParams) -> Vec<Address> {
        self.keys.iter().map(|k| k.to_address(params)).collect()
    }

    /// The key matching `address`, if this keychain owns it.
    pub fn find(&self, address: &Address, params: &NetworkParams) -> Option<&EcKey> {
        self.keys.iter().find(|k| &k.to_address(params) == address)
    }

    /// The default change address: the first key added (spec.md §4.8).
    pub fn default_change_address(&self, params: &NetworkParams) -> Option<Address> {
        self.keys.first().map(|k| k.to_address(params))
    }

    pub fn keys(&self) -> &[EcKey] {
        &self.keys
    }
}
