//! The access registry facade.
//!
//! [`AccessRegistry`] ties the four registries to one [`Store`]. Every
//! mutating operation runs in a single transaction together with its audit
//! event, so a rejected call leaves both the tables and the audit chain
//! exactly as they were.

use crate::consumer::{ConsumerAuthorization, ConsumerRegistry};
use crate::endpoint::{EndpointRecord, EndpointRegistry};
use crate::error::{AccessError, AccessResult};
use crate::grant::{DomainAccessGrant, GrantKey, GrantLedger};
use crate::identity::{IdentityRecord, IdentityRegistry};
use crate::schema::SCHEMA;
use tracing::{debug, info, warn};
use vitalledger_core::{
    AuditEvent, AuditLedger, BlockHeight, CallContext, LedgerHealthInfo, Principal,
    RegistryConfig, Store, StoreMetrics,
};

pub struct AccessRegistry {
    store: Store,
    admin: Principal,
}

impl AccessRegistry {
    /// Open (or create) the registry described by `config`.
    pub fn open(config: &RegistryConfig) -> AccessResult<Self> {
        let store = Store::open(&config.database_path, config.node_id.clone())?;
        Self::with_store(store, config.admin.clone())
    }

    /// Volatile registry backed by an in-memory database.
    pub fn open_in_memory(admin: Principal) -> AccessResult<Self> {
        let store = Store::open_in_memory("vitalledger-memory")?;
        Self::with_store(store, admin)
    }

    fn with_store(store: Store, admin: Principal) -> AccessResult<Self> {
        store.apply_schema(SCHEMA)?;

        info!(
            node_id = %store.node_id(),
            admin = %admin,
            "Access registry ready"
        );

        Ok(Self { store, admin })
    }

    pub fn admin(&self) -> &Principal {
        &self.admin
    }

    pub fn register_identity(&mut self, ctx: &CallContext) -> AccessResult<bool> {
        let result = self
            .store
            .write(|tx| IdentityRegistry::register(tx, ctx));

        match result {
            Ok(record) => {
                info!(
                    caller = %record.principal,
                    height = %record.registered_at,
                    "Identity registered"
                );
                Ok(true)
            }
            Err(e) => Err(rejected("register-identity", ctx, e)),
        }
    }

    pub fn register_endpoint(
        &mut self,
        ctx: &CallContext,
        device_id: &str,
        device_type: &str,
    ) -> AccessResult<bool> {
        let result = self
            .store
            .write(|tx| EndpointRegistry::register(tx, ctx, device_id, device_type));

        match result {
            Ok(record) => {
                info!(
                    caller = %record.owner,
                    device_id = %record.device_id,
                    device_type = %record.device_type,
                    height = %record.registered_at,
                    "Endpoint registered"
                );
                Ok(true)
            }
            Err(e) => Err(rejected("register-endpoint", ctx, e)),
        }
    }

    /// Authorize `consumer` to receive grants. Admin only.
    pub fn authorize_consumer(
        &mut self,
        ctx: &CallContext,
        consumer: &Principal,
        category: &str,
    ) -> AccessResult<bool> {
        let admin = &self.admin;
        let result = self
            .store
            .write(|tx| ConsumerRegistry::authorize(tx, ctx, admin, consumer, category));

        match result {
            Ok(auth) => {
                info!(
                    consumer = %auth.consumer,
                    category = %auth.category,
                    height = %auth.authorized_at,
                    "Consumer authorized"
                );
                Ok(true)
            }
            Err(e) => Err(rejected("authorize-consumer", ctx, e)),
        }
    }

    /// Grant `consumer` access to `domain` of the caller's data.
    ///
    /// `expires_in` counts blocks from `ctx.height`; `None` never expires.
    pub fn grant_domain_access(
        &mut self,
        ctx: &CallContext,
        consumer: &Principal,
        domain: &str,
        expires_in: Option<u64>,
    ) -> AccessResult<bool> {
        let result = self
            .store
            .write(|tx| GrantLedger::grant(tx, ctx, consumer, domain, expires_in));

        match result {
            Ok(grant) => {
                info!(
                    owner = %grant.key.owner,
                    consumer = %grant.key.consumer,
                    domain = %grant.key.domain,
                    expires_at = ?grant.expires_at.map(|h| h.value()),
                    height = %ctx.height,
                    "Domain access granted"
                );
                Ok(true)
            }
            Err(e) => Err(rejected("grant-domain-access", ctx, e)),
        }
    }

    /// Revoke the caller's grant to `consumer` for `domain`.
    pub fn revoke_domain_access(
        &mut self,
        ctx: &CallContext,
        consumer: &Principal,
        domain: &str,
    ) -> AccessResult<bool> {
        let key = GrantKey::new(ctx.caller.clone(), consumer.clone(), domain);
        self.revoke_grant(ctx, &key)
    }

    /// Revoke an explicit grant key. The caller must own it.
    pub fn revoke_grant(&mut self, ctx: &CallContext, key: &GrantKey) -> AccessResult<bool> {
        let result = self.store.write(|tx| GrantLedger::revoke(tx, ctx, key));

        match result {
            Ok(grant) => {
                info!(
                    owner = %grant.key.owner,
                    consumer = %grant.key.consumer,
                    domain = %grant.key.domain,
                    height = %ctx.height,
                    "Domain access revoked"
                );
                Ok(true)
            }
            Err(e) => Err(rejected("revoke-domain-access", ctx, e)),
        }
    }

    /// Whether `consumer` may read `domain` of `owner`'s data at `height`.
    ///
    /// Absent, revoked and expired grants all answer `false`.
    pub fn check_data_access(
        &self,
        owner: &Principal,
        consumer: &Principal,
        domain: &str,
        height: BlockHeight,
    ) -> AccessResult<bool> {
        let key = GrantKey::new(owner.clone(), consumer.clone(), domain);
        let allowed = GrantLedger::check(self.store.reader(), &key, height)?;

        debug!(
            owner = %owner,
            consumer = %consumer,
            domain = %domain,
            height = %height,
            allowed,
            "Data access checked"
        );

        Ok(allowed)
    }

    pub fn get_identity(&self, principal: &Principal) -> AccessResult<Option<IdentityRecord>> {
        IdentityRegistry::get(self.store.reader(), principal)
    }

    pub fn is_registered(&self, principal: &Principal) -> AccessResult<bool> {
        IdentityRegistry::is_registered(self.store.reader(), principal)
    }

    pub fn get_endpoint(
        &self,
        owner: &Principal,
        device_id: &str,
    ) -> AccessResult<Option<EndpointRecord>> {
        EndpointRegistry::get(self.store.reader(), owner, device_id)
    }

    pub fn list_endpoints(&self, owner: &Principal) -> AccessResult<Vec<EndpointRecord>> {
        EndpointRegistry::list_for_owner(self.store.reader(), owner)
    }

    pub fn get_consumer(
        &self,
        consumer: &Principal,
    ) -> AccessResult<Option<ConsumerAuthorization>> {
        ConsumerRegistry::get(self.store.reader(), consumer)
    }

    pub fn is_authorized(&self, consumer: &Principal) -> AccessResult<bool> {
        ConsumerRegistry::is_authorized(self.store.reader(), consumer)
    }

    pub fn get_grant(&self, key: &GrantKey) -> AccessResult<Option<DomainAccessGrant>> {
        GrantLedger::get(self.store.reader(), key)
    }

    pub fn grants_by_owner(&self, owner: &Principal) -> AccessResult<Vec<DomainAccessGrant>> {
        GrantLedger::list_for_owner(self.store.reader(), owner)
    }

    pub fn grants_for_consumer(
        &self,
        consumer: &Principal,
    ) -> AccessResult<Vec<DomainAccessGrant>> {
        GrantLedger::list_for_consumer(self.store.reader(), consumer)
    }

    /// Audit events starting at sequence number `from`.
    pub fn audit_trail(&self, from: u64, limit: usize) -> AccessResult<Vec<AuditEvent>> {
        Ok(AuditLedger::iterate(self.store.reader(), from, limit)?)
    }

    pub fn audit_events_by(&self, actor: &Principal) -> AccessResult<Vec<AuditEvent>> {
        Ok(AuditLedger::events_by_actor(self.store.reader(), actor)?)
    }

    /// Most recent audit event, if any.
    pub fn audit_head(&self) -> AccessResult<Option<AuditEvent>> {
        Ok(AuditLedger::latest(self.store.reader())?)
    }

    /// Most recent audit event performed by `actor`, if any.
    pub fn last_audit_event_by(&self, actor: &Principal) -> AccessResult<Option<AuditEvent>> {
        Ok(AuditLedger::latest_by_actor(self.store.reader(), actor)?)
    }

    pub fn audit_len(&self) -> AccessResult<u64> {
        Ok(AuditLedger::count(self.store.reader())?)
    }

    /// Re-run the audit continuity check.
    pub fn verify_audit_chain(&mut self) -> AccessResult<()> {
        Ok(self.store.continuity_check()?)
    }

    pub fn health(&self) -> LedgerHealthInfo {
        self.store.health()
    }

    pub fn metrics(&self) -> &StoreMetrics {
        self.store.metrics()
    }
}

fn rejected(operation: &'static str, ctx: &CallContext, error: AccessError) -> AccessError {
    warn!(
        operation,
        caller = %ctx.caller,
        height = %ctx.height,
        code = ?error.code(),
        error = %error,
        "Operation rejected"
    );
    error
}
