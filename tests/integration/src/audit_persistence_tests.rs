//! File-backed registry: state and audit chain survive a restart, and
//! tampering with the audit table is caught when the store is reopened.

use crate::test_utils::{init_tracing, temp_db_path, TestAccount};
use vitalledger_core::{
    AuditAction, BlockHeight, CallContext, Config, LedgerError, ManualClock, Principal,
};
use vitalledger_registry::{AccessError, AccessRegistry};

struct Fixture {
    config: Config,
    alice: TestAccount,
    provider: TestAccount,
}

impl Fixture {
    fn new() -> Self {
        let admin = TestAccount::new();
        let mut config = Config::new(admin.principal.clone());
        config.registry.database_path = temp_db_path("vitalledger_it");
        config.registry.node_id = "it-node".to_string();

        Self {
            config,
            alice: TestAccount::new(),
            provider: TestAccount::new(),
        }
    }

    fn admin(&self) -> Principal {
        self.config.registry.admin.clone()
    }

    fn open(&self) -> Result<AccessRegistry, AccessError> {
        AccessRegistry::open(&self.config.registry)
    }

    /// Register alice, authorize the provider and grant cardiac access.
    fn seed(&self) {
        let clock = ManualClock::new(BlockHeight(10));
        let mut registry = self.open().unwrap();

        registry
            .register_identity(&CallContext::now(self.alice.principal.clone(), &clock))
            .unwrap();
        clock.advance(1);
        registry
            .authorize_consumer(
                &CallContext::now(self.admin(), &clock),
                &self.provider.principal,
                "hospital",
            )
            .unwrap();
        clock.advance(1);
        registry
            .grant_domain_access(
                &CallContext::now(self.alice.principal.clone(), &clock),
                &self.provider.principal,
                "cardiac-metrics",
                Some(100),
            )
            .unwrap();
    }

    fn cleanup(&self) {
        let path = &self.config.registry.database_path;
        std::fs::remove_file(path).ok();
        std::fs::remove_file(path.with_extension("db-wal")).ok();
        std::fs::remove_file(path.with_extension("db-shm")).ok();
    }
}

#[test]
fn test_state_survives_reopen() {
    init_tracing();
    let fixture = Fixture::new();
    fixture.seed();

    let mut registry = fixture.open().unwrap();
    assert!(registry
        .check_data_access(
            &fixture.alice.principal,
            &fixture.provider.principal,
            "cardiac-metrics",
            BlockHeight(111),
        )
        .unwrap());
    assert!(!registry
        .check_data_access(
            &fixture.alice.principal,
            &fixture.provider.principal,
            "cardiac-metrics",
            BlockHeight(112),
        )
        .unwrap());

    let trail = registry.audit_trail(1, 10).unwrap();
    let actions: Vec<AuditAction> = trail.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::IdentityRegistered,
            AuditAction::ConsumerAuthorized,
            AuditAction::GrantIssued,
        ]
    );
    assert_eq!(trail[2].height, BlockHeight(12));
    assert_eq!(trail[2].subject["domain"], "cardiac-metrics");

    registry.verify_audit_chain().unwrap();
    assert_eq!(registry.health().node_id, "it-node");

    drop(registry);
    fixture.cleanup();
}

#[test]
fn test_tampered_audit_row_refuses_open() {
    init_tracing();
    let fixture = Fixture::new();
    fixture.seed();

    {
        let conn = rusqlite::Connection::open(&fixture.config.registry.database_path).unwrap();
        conn.execute(
            "UPDATE audit_events SET actor = ?1 WHERE seq_no = 2",
            [fixture.alice.principal.as_str()],
        )
        .unwrap();
    }

    let result = fixture.open();
    assert!(matches!(
        result,
        Err(AccessError::Storage(LedgerError::CorruptionDetected(_)))
    ));
    if let Err(e) = result {
        assert_eq!(e.code(), None);
    }

    fixture.cleanup();
}

#[test]
fn test_audit_events_by_actor() {
    init_tracing();
    let fixture = Fixture::new();
    fixture.seed();

    let registry = fixture.open().unwrap();
    let by_alice = registry.audit_events_by(&fixture.alice.principal).unwrap();
    assert_eq!(by_alice.len(), 2);
    assert!(by_alice.iter().all(|e| e.actor == fixture.alice.principal));

    let by_admin = registry.audit_events_by(&fixture.admin()).unwrap();
    assert_eq!(by_admin.len(), 1);
    assert_eq!(by_admin[0].subject["category"], "hospital");

    drop(registry);
    fixture.cleanup();
}
