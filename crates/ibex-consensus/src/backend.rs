//! Capabilities the consensus core needs from its host.
//!
//! Each concern is its own trait so tests can fake one without the others.
//! [`Backend`] bundles them for the engine.

use std::sync::{Arc, Mutex};

use ibex_core::{sign, verify, Address, Block, KeyPair, Sig};
use ibex_storage::{Storage, StorageError};
use tracing::debug;

use crate::error::ConsensusError;
use crate::messages::Message;
use crate::validator::{Validator, ValidatorSet};

/// Who this replica is
pub trait Identity: Send + Sync {
    fn address(&self) -> Address;
}

/// Signature primitives
pub trait Signer: Send + Sync {
    fn sign(&self, data: &[u8]) -> Sig;

    /// Check `signature` over `data` was made by `validator`
    fn check_signature(
        &self,
        data: &[u8],
        validator: &Validator,
        signature: &Sig,
    ) -> Result<(), ConsensusError> {
        verify(&validator.public_key, data, signature)
            .map_err(|_| ConsensusError::InvalidSignature(validator.address))
    }

    /// Resolve `address` in `validators` and check the signature against its
    /// key. Returns the signing validator.
    fn check_validator_signature(
        &self,
        validators: &ValidatorSet,
        address: &Address,
        data: &[u8],
        signature: &Sig,
    ) -> Result<Validator, ConsensusError> {
        let (_, validator) = validators
            .get_by_address(address)
            .ok_or(ConsensusError::NoMatchingValidator(*address))?;
        self.check_signature(data, validator, signature)?;
        Ok(*validator)
    }
}

/// Delivery of encoded messages to peers. Fire-and-forget: an `Ok` only
/// means the message was handed off.
pub trait Transport: Send + Sync {
    fn send(&self, target: &Address, payload: Vec<u8>) -> Result<(), ConsensusError>;

    /// Send to every target, trying all of them even if some fail
    fn broadcast(&self, targets: &[Address], payload: Vec<u8>) -> Result<(), ConsensusError> {
        let mut result = Ok(());
        for target in targets {
            if let Err(e) = self.send(target, payload.clone()) {
                debug!(%target, "Send failed: {}", e);
                result = Err(e);
            }
        }
        result
    }
}

/// Durable key/value persistence for the stable checkpoint record
pub trait Store: Send + Sync {
    fn save(&self, key: &str, value: &[u8]) -> Result<(), ConsensusError>;

    fn restore(&self, key: &str) -> Result<Option<Vec<u8>>, ConsensusError>;
}

/// The host chain proposals are agreed for
pub trait Chain: Send + Sync {
    /// Head block and the validator that proposed it
    fn last_proposal(&self) -> (Block, Address);

    /// Validators that agree on the block after `proposal`
    fn validators(&self, proposal: &Block) -> Vec<Validator>;

    /// Check a proposal before voting for it
    fn verify(&self, proposal: &Block) -> Result<(), ConsensusError>;

    /// Hand over a finalized proposal with the commit messages that formed
    /// its quorum
    fn commit(&self, proposal: &Block, seals: &[Message]) -> Result<(), ConsensusError>;
}

/// The capabilities one engine runs against
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn Identity>,
    pub signer: Arc<dyn Signer>,
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn Store>,
    pub chain: Arc<dyn Chain>,
}

impl Backend {
    /// Backend signing with `keys`
    pub fn new(
        keys: KeyPair,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        chain: Arc<dyn Chain>,
    ) -> Self {
        let signer = Arc::new(KeySigner::new(keys));
        Backend {
            identity: signer.clone(),
            signer,
            transport,
            store,
            chain,
        }
    }

    pub fn address(&self) -> Address {
        self.identity.address()
    }
}

/// Identity and signer backed by an ed25519 key pair
pub struct KeySigner {
    keys: KeyPair,
}

impl KeySigner {
    pub fn new(keys: KeyPair) -> Self {
        KeySigner { keys }
    }
}

impl Identity for KeySigner {
    fn address(&self) -> Address {
        self.keys.address
    }
}

impl Signer for KeySigner {
    fn sign(&self, data: &[u8]) -> Sig {
        sign(&self.keys.secret, data)
    }
}

/// [`Store`] over any [`Storage`]; every save is committed immediately
pub struct StorageStore<S: Storage> {
    storage: Mutex<S>,
}

impl<S: Storage> StorageStore<S> {
    pub fn new(storage: S) -> Self {
        StorageStore {
            storage: Mutex::new(storage),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, S>, ConsensusError> {
        self.storage
            .lock()
            .map_err(|_| StorageError::Io("storage lock poisoned".to_string()).into())
    }
}

impl<S: Storage> Store for StorageStore<S> {
    fn save(&self, key: &str, value: &[u8]) -> Result<(), ConsensusError> {
        let mut storage = self.lock()?;
        storage.put(key.as_bytes(), value);
        if let Err(e) = storage.commit() {
            storage.rollback();
            return Err(e.into());
        }
        Ok(())
    }

    fn restore(&self, key: &str) -> Result<Option<Vec<u8>>, ConsensusError> {
        Ok(self.lock()?.get(key.as_bytes()))
    }
}
