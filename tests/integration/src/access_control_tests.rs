//! Registry scenarios driven block by block.

use crate::test_utils::{init_tracing, Chain, Tx};
use vitalledger_core::{BlockHeight, CallContext, Principal};
use vitalledger_registry::{GrantKey, GrantState};

const CARDIAC: &str = "cardiac-metrics";

/// `wallet_1` registered, `wallet_2` authorized as a hospital.
fn chain_with_patient_and_provider() -> Chain {
    let mut chain = Chain::new();
    let provider = chain.account("wallet_2").principal.clone();

    let txs = vec![
        Tx::call(chain.account("wallet_1"), |reg, ctx| reg.register_identity(ctx)),
        Tx::call(chain.account("deployer"), move |reg, ctx| {
            reg.authorize_consumer(ctx, &provider, "hospital")
        }),
    ];
    assert_eq!(chain.mine_block(txs), vec!["(ok true)", "(ok true)"]);
    chain
}

fn grant_tx(chain: &Chain, owner: &str, consumer: &str, domain: &'static str, expires_in: Option<u64>) -> Tx {
    let consumer = chain.account(consumer).principal.clone();
    Tx::call(chain.account(owner), move |reg, ctx| {
        reg.grant_domain_access(ctx, &consumer, domain, expires_in)
    })
}

fn revoke_tx(chain: &Chain, owner: &str, consumer: &str, domain: &'static str) -> Tx {
    let consumer = chain.account(consumer).principal.clone();
    Tx::call(chain.account(owner), move |reg, ctx| {
        reg.revoke_domain_access(ctx, &consumer, domain)
    })
}

fn check(chain: &Chain, owner: &str, consumer: &str, domain: &str) -> String {
    let owner = chain.account(owner).principal.clone();
    let consumer = chain.account(consumer).principal.clone();
    chain.read_only(|reg, height| reg.check_data_access(&owner, &consumer, domain, height))
}

#[test]
fn test_user_identity_registration() {
    init_tracing();
    let mut chain = Chain::new();

    let tx = Tx::call(chain.account("wallet_1"), |reg, ctx| reg.register_identity(ctx));
    assert_eq!(chain.mine_block(vec![tx]), vec!["(ok true)"]);

    let tx = Tx::call(chain.account("wallet_1"), |reg, ctx| reg.register_identity(ctx));
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u2)"]);

    let alice = chain.account("wallet_1").principal.clone();
    let record = chain.registry.get_identity(&alice).unwrap().unwrap();
    assert_eq!(record.registered_at, BlockHeight(1));
}

#[test]
fn test_endpoint_registration() {
    init_tracing();
    let mut chain = Chain::new();

    let tx = Tx::call(chain.account("wallet_1"), |reg, ctx| reg.register_identity(ctx));
    chain.mine_block(vec![tx]);

    let tx = Tx::call(chain.account("wallet_1"), |reg, ctx| {
        reg.register_endpoint(ctx, "device-123", "smartwatch")
    });
    assert_eq!(chain.mine_block(vec![tx]), vec!["(ok true)"]);

    let tx = Tx::call(chain.account("wallet_1"), |reg, ctx| {
        reg.register_endpoint(ctx, "device-123", "smartwatch")
    });
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u4)"]);

    let tx = Tx::call(chain.account("wallet_2"), |reg, ctx| {
        reg.register_endpoint(ctx, "device-456", "fitness-tracker")
    });
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u3)"]);

    let alice = chain.account("wallet_1").principal.clone();
    let endpoints = chain.registry.list_endpoints(&alice).unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].device_type, "smartwatch");
}

#[test]
fn test_consumer_authorization() {
    init_tracing();
    let mut chain = Chain::new();
    let healthcare = chain.account("wallet_1").principal.clone();

    let hc = healthcare.clone();
    let tx = Tx::call(chain.account("deployer"), move |reg, ctx| {
        reg.authorize_consumer(ctx, &hc, "hospital")
    });
    assert_eq!(chain.mine_block(vec![tx]), vec!["(ok true)"]);

    let hc = healthcare.clone();
    let tx = Tx::call(chain.account("deployer"), move |reg, ctx| {
        reg.authorize_consumer(ctx, &hc, "hospital")
    });
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u7)"]);

    let auth = chain.registry.get_consumer(&healthcare).unwrap().unwrap();
    assert_eq!(auth.category, "hospital");
    assert_eq!(&auth.authorized_by, chain.registry.admin());
}

#[test]
fn test_non_admin_cannot_authorize() {
    init_tracing();
    let mut chain = Chain::new();
    let target = chain.account("wallet_2").principal.clone();

    let tx = Tx::call(chain.account("wallet_1"), move |reg, ctx| {
        reg.authorize_consumer(ctx, &target, "hospital")
    });
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u1)"]);
}

#[test]
fn test_domain_access_management() {
    init_tracing();
    let mut chain = chain_with_patient_and_provider();

    let tx = grant_tx(&chain, "wallet_1", "wallet_2", CARDIAC, Some(500));
    assert_eq!(chain.mine_block(vec![tx]), vec!["(ok true)"]);
    assert_eq!(check(&chain, "wallet_1", "wallet_2", CARDIAC), "(ok true)");

    let tx = revoke_tx(&chain, "wallet_1", "wallet_2", CARDIAC);
    assert_eq!(chain.mine_block(vec![tx]), vec!["(ok true)"]);
    assert_eq!(check(&chain, "wallet_1", "wallet_2", CARDIAC), "(ok false)");
}

#[test]
fn test_grant_expires_at_deadline() {
    init_tracing();
    let mut chain = chain_with_patient_and_provider();

    // Granted in block 2, expires at 2 + 3 = 5
    let tx = grant_tx(&chain, "wallet_1", "wallet_2", CARDIAC, Some(3));
    chain.mine_block(vec![tx]);
    assert_eq!(chain.height(), BlockHeight(2));

    chain.mine_empty_blocks(2);
    assert_eq!(chain.height(), BlockHeight(4));
    assert_eq!(check(&chain, "wallet_1", "wallet_2", CARDIAC), "(ok true)");

    chain.mine_empty_blocks(1);
    assert_eq!(check(&chain, "wallet_1", "wallet_2", CARDIAC), "(ok false)");

    let key = GrantKey::new(
        chain.account("wallet_1").principal.clone(),
        chain.account("wallet_2").principal.clone(),
        CARDIAC,
    );
    let grant = chain.registry.get_grant(&key).unwrap().unwrap();
    assert_eq!(grant.state_at(chain.height()), GrantState::Expired);
}

#[test]
fn test_regrant_after_revoke() {
    init_tracing();
    let mut chain = chain_with_patient_and_provider();

    let tx = grant_tx(&chain, "wallet_1", "wallet_2", CARDIAC, Some(10));
    chain.mine_block(vec![tx]);
    let tx = revoke_tx(&chain, "wallet_1", "wallet_2", CARDIAC);
    chain.mine_block(vec![tx]);
    assert_eq!(check(&chain, "wallet_1", "wallet_2", CARDIAC), "(ok false)");

    let tx = grant_tx(&chain, "wallet_1", "wallet_2", CARDIAC, None);
    assert_eq!(chain.mine_block(vec![tx]), vec!["(ok true)"]);

    chain.mine_empty_blocks(1_000);
    assert_eq!(check(&chain, "wallet_1", "wallet_2", CARDIAC), "(ok true)");
}

#[test]
fn test_grant_preconditions() {
    init_tracing();
    let mut chain = chain_with_patient_and_provider();

    // Owner without identity
    let tx = grant_tx(&chain, "wallet_3", "wallet_2", CARDIAC, None);
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u3)"]);

    // Consumer never authorized
    let tx = grant_tx(&chain, "wallet_1", "wallet_4", CARDIAC, None);
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u5)"]);

    // Nothing to revoke
    let tx = revoke_tx(&chain, "wallet_1", "wallet_2", "sleep-patterns");
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u6)"]);
}

#[test]
fn test_consumer_cannot_revoke_owner_grant() {
    init_tracing();
    let mut chain = chain_with_patient_and_provider();

    let tx = grant_tx(&chain, "wallet_1", "wallet_2", CARDIAC, None);
    chain.mine_block(vec![tx]);

    let key = GrantKey::new(
        chain.account("wallet_1").principal.clone(),
        chain.account("wallet_2").principal.clone(),
        CARDIAC,
    );
    let tx = Tx::call(chain.account("wallet_2"), move |reg, ctx| reg.revoke_grant(ctx, &key));
    assert_eq!(chain.mine_block(vec![tx]), vec!["(err u8)"]);

    assert_eq!(check(&chain, "wallet_1", "wallet_2", CARDIAC), "(ok true)");
}

#[test]
fn test_rejected_block_leaves_audit_trail_unchanged() {
    init_tracing();
    let mut chain = chain_with_patient_and_provider();
    let before = chain.registry.audit_len().unwrap();

    let txs = vec![
        Tx::call(chain.account("wallet_1"), |reg, ctx| reg.register_identity(ctx)),
        grant_tx(&chain, "wallet_3", "wallet_2", CARDIAC, None),
        revoke_tx(&chain, "wallet_1", "wallet_2", CARDIAC),
    ];
    assert_eq!(
        chain.mine_block(txs),
        vec!["(err u2)", "(err u3)", "(err u6)"]
    );

    assert_eq!(chain.registry.audit_len().unwrap(), before);
}

#[test]
fn test_signed_caller_registers_key_principal() {
    init_tracing();
    let mut chain = Chain::new();
    let account = chain.account("wallet_3");

    let message = b"register-identity";
    let signature = account.sign(message);
    let caller = Principal::authenticate(&account.public_key, message, &signature).unwrap();
    assert_eq!(
        caller.as_str(),
        hex::encode(blake3::hash(&account.public_key).as_bytes())
    );

    assert_eq!(caller, account.principal);

    let ctx = CallContext::new(caller.clone(), chain.mine_empty_blocks(1));
    assert!(chain.registry.register_identity(&ctx).unwrap());
    assert!(chain.registry.is_registered(&caller).unwrap());
}
