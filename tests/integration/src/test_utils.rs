//! Test utilities for registry integration scenarios

use ed25519_dalek::{Signer, SigningKey};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::path::PathBuf;
use vitalledger_core::{BlockHeight, CallContext, Clock, ManualClock, Principal};
use vitalledger_registry::{AccessRegistry, AccessResult};

/// Names of the accounts every [`Chain`] starts with.
pub const ACCOUNT_NAMES: [&str; 5] = ["deployer", "wallet_1", "wallet_2", "wallet_3", "wallet_4"];

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vitalledger=debug")
        .with_test_writer()
        .try_init();
}

/// Unique database path under the system temp dir
pub fn temp_db_path(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}_{}.db", prefix, uuid::Uuid::new_v4()))
}

/// Test fixture for an account holding an Ed25519 key
pub struct TestAccount {
    pub principal: Principal,
    pub public_key: Vec<u8>,
    pub signing_key: SigningKey,
}

impl TestAccount {
    /// Create a new account with a generated Ed25519 keypair
    pub fn new() -> Self {
        let mut secret_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut secret_bytes);

        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let public_key = signing_key.verifying_key().to_bytes().to_vec();
        let principal = Principal::from_verifying_key(&signing_key.verifying_key());

        Self {
            principal,
            public_key,
            signing_key,
        }
    }

    /// Sign a payload with the account's signing key
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.signing_key.sign(payload).to_bytes().to_vec()
    }
}

impl Default for TestAccount {
    fn default() -> Self {
        Self::new()
    }
}

type Call = Box<dyn FnOnce(&mut AccessRegistry, &CallContext) -> AccessResult<bool>>;

/// A registry call submitted by one account.
pub struct Tx {
    sender: Principal,
    call: Call,
}

impl Tx {
    pub fn call(
        sender: &TestAccount,
        call: impl FnOnce(&mut AccessRegistry, &CallContext) -> AccessResult<bool> + 'static,
    ) -> Self {
        Self {
            sender: sender.principal.clone(),
            call: Box::new(call),
        }
    }
}

/// Render a result the way contract receipts read: `(ok true)`, `(err u3)`.
pub fn receipt(result: AccessResult<bool>) -> String {
    match result {
        Ok(value) => format!("(ok {})", value),
        Err(e) => match e.code() {
            Some(code) => format!("(err u{})", code),
            None => format!("(err storage: {})", e),
        },
    }
}

/// Registry plus a manual clock and named accounts.
///
/// Every mined block advances the clock by one; all transactions in the
/// block execute at the new height.
pub struct Chain {
    pub registry: AccessRegistry,
    pub clock: ManualClock,
    accounts: HashMap<&'static str, TestAccount>,
}

impl Chain {
    /// In-memory chain with `deployer` as administrator.
    pub fn new() -> Self {
        let accounts: HashMap<_, _> = ACCOUNT_NAMES
            .iter()
            .map(|name| (*name, TestAccount::new()))
            .collect();
        let admin = accounts["deployer"].principal.clone();

        Self {
            registry: AccessRegistry::open_in_memory(admin).unwrap(),
            clock: ManualClock::new(BlockHeight::GENESIS),
            accounts,
        }
    }

    pub fn account(&self, name: &str) -> &TestAccount {
        self.accounts
            .get(name)
            .unwrap_or_else(|| panic!("unknown test account {}", name))
    }

    pub fn height(&self) -> BlockHeight {
        self.clock.height()
    }

    /// Execute `txs` in a new block and return one receipt per transaction.
    pub fn mine_block(&mut self, txs: Vec<Tx>) -> Vec<String> {
        let height = self.clock.advance(1);

        txs.into_iter()
            .map(|tx| {
                let ctx = CallContext::new(tx.sender, height);
                receipt((tx.call)(&mut self.registry, &ctx))
            })
            .collect()
    }

    /// Advance the clock without any transactions.
    pub fn mine_empty_blocks(&mut self, count: u64) -> BlockHeight {
        self.clock.advance(count)
    }

    /// Evaluate a read-only call at the current height.
    pub fn read_only(
        &self,
        call: impl FnOnce(&AccessRegistry, BlockHeight) -> AccessResult<bool>,
    ) -> String {
        receipt(call(&self.registry, self.height()))
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}
