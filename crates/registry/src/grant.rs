//! Domain access ledger.
//!
//! Grants let a consumer read one domain of an owner's data until an
//! optional expiry height. Per key the lifecycle is:
//!
//! ```text
//! NonExistent
//!     ↓ (grant)
//! Active(expires_at) ──(height reaches expires_at)──▶ Expired   [derived]
//!     ↓ (revoke)
//! Revoked
//!     ↓ (grant)
//! Active(new expires_at)
//! ```
//!
//! Expiry is never written back. It is computed at read time by comparing
//! the stored deadline against the caller-supplied height, so no background
//! job ever touches a grant because time passed.

use crate::consumer::ConsumerRegistry;
use crate::error::{AccessError, AccessResult};
use crate::identity::IdentityRegistry;
use crate::schema::principal_from_sql;
use crate::validate::{require_height, require_text};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use vitalledger_core::{AuditAction, AuditLedger, BlockHeight, CallContext, Principal};

/// Identifies one grant: who owns the data, who reads it, and which domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantKey {
    pub owner: Principal,
    pub consumer: Principal,
    pub domain: String,
}

impl GrantKey {
    pub fn new(owner: Principal, consumer: Principal, domain: impl Into<String>) -> Self {
        Self {
            owner,
            consumer,
            domain: domain.into(),
        }
    }
}

/// Grant state as observed at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Active,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainAccessGrant {
    pub key: GrantKey,
    /// `None` means the grant never expires
    pub expires_at: Option<BlockHeight>,
    pub active: bool,
    /// Height of the most recent grant for this key
    pub granted_at: BlockHeight,
    /// Height of the revocation, cleared by a re-grant
    pub revoked_at: Option<BlockHeight>,
}

impl DomainAccessGrant {
    /// True iff active and `expires_at` is absent or strictly after `height`.
    pub fn is_valid_at(&self, height: BlockHeight) -> bool {
        self.state_at(height) == GrantState::Active
    }

    pub fn state_at(&self, height: BlockHeight) -> GrantState {
        if !self.active {
            return GrantState::Revoked;
        }

        match self.expires_at {
            Some(expires_at) if expires_at <= height => GrantState::Expired,
            _ => GrantState::Active,
        }
    }
}

type GrantRow = (
    String,
    String,
    String,
    Option<BlockHeight>,
    bool,
    BlockHeight,
    Option<BlockHeight>,
);

const SELECT_GRANT: &str = r#"
    SELECT owner, consumer, domain, expires_at, active, granted_at, revoked_at
    FROM domain_grants
"#;

fn read_row(row: &Row<'_>) -> rusqlite::Result<GrantRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_grant(
    (owner, consumer, domain, expires_at, active, granted_at, revoked_at): GrantRow,
) -> AccessResult<DomainAccessGrant> {
    Ok(DomainAccessGrant {
        key: GrantKey {
            owner: principal_from_sql("grant owner", owner)?,
            consumer: principal_from_sql("grant consumer", consumer)?,
            domain,
        },
        expires_at,
        active,
        granted_at,
        revoked_at,
    })
}

pub struct GrantLedger;

impl GrantLedger {
    /// Grant `consumer` access to `domain` of the caller's data.
    ///
    /// `expires_in` is an offset from the current height. Any previous grant
    /// for the same key is overwritten, which also reactivates a revoked one.
    pub fn grant(
        conn: &Connection,
        ctx: &CallContext,
        consumer: &Principal,
        domain: &str,
        expires_in: Option<u64>,
    ) -> AccessResult<DomainAccessGrant> {
        require_height(ctx.height)?;
        require_text("domain", domain)?;

        let expires_at = expires_in
            .map(|blocks| {
                ctx.height
                    .checked_offset(blocks)
                    .ok_or_else(|| AccessError::InvalidArgument {
                        field: "expires_in",
                        reason: format!(
                            "{} blocks after height {} passes {}",
                            blocks,
                            ctx.height,
                            BlockHeight::MAX
                        ),
                    })
            })
            .transpose()?;

        IdentityRegistry::require(conn, &ctx.caller)?;
        ConsumerRegistry::require(conn, consumer)?;

        let key = GrantKey::new(ctx.caller.clone(), consumer.clone(), domain);
        let previous = Self::get(conn, &key)?;

        conn.execute(
            r#"
            INSERT INTO domain_grants (
                owner, consumer, domain, expires_at, active, granted_at, revoked_at
            ) VALUES (?1, ?2, ?3, ?4, 1, ?5, NULL)
            ON CONFLICT (owner, consumer, domain) DO UPDATE SET
                expires_at = excluded.expires_at,
                active = 1,
                granted_at = excluded.granted_at,
                revoked_at = NULL
            "#,
            params![
                key.owner.as_str(),
                key.consumer.as_str(),
                key.domain,
                expires_at,
                ctx.height,
            ],
        )?;

        AuditLedger::append(
            conn,
            ctx.height,
            &ctx.caller,
            AuditAction::GrantIssued,
            json!({
                "consumer": key.consumer,
                "domain": key.domain,
                "expires_at": expires_at,
                "previous_state": previous.map(|g| g.state_at(ctx.height)),
            }),
        )?;

        Ok(DomainAccessGrant {
            key,
            expires_at,
            active: true,
            granted_at: ctx.height,
            revoked_at: None,
        })
    }

    /// Deactivate the grant identified by `key`.
    ///
    /// Only the owner may revoke. The row is kept; revoking an already
    /// revoked grant succeeds and keeps the original `revoked_at`.
    pub fn revoke(
        conn: &Connection,
        ctx: &CallContext,
        key: &GrantKey,
    ) -> AccessResult<DomainAccessGrant> {
        require_height(ctx.height)?;
        require_text("domain", &key.domain)?;

        if key.owner != ctx.caller {
            return Err(AccessError::NotGrantOwner {
                caller: ctx.caller.clone(),
                owner: key.owner.clone(),
            });
        }

        let existing = Self::get(conn, key)?.ok_or_else(|| AccessError::GrantNotFound {
            owner: key.owner.clone(),
            consumer: key.consumer.clone(),
            domain: key.domain.clone(),
        })?;

        let revoked_at = existing.revoked_at.unwrap_or(ctx.height);

        conn.execute(
            r#"
            UPDATE domain_grants
            SET active = 0, revoked_at = ?4
            WHERE owner = ?1 AND consumer = ?2 AND domain = ?3
            "#,
            params![
                key.owner.as_str(),
                key.consumer.as_str(),
                key.domain,
                revoked_at,
            ],
        )?;

        AuditLedger::append(
            conn,
            ctx.height,
            &ctx.caller,
            AuditAction::GrantRevoked,
            json!({
                "consumer": key.consumer,
                "domain": key.domain,
                "previous_state": existing.state_at(ctx.height),
            }),
        )?;

        Ok(DomainAccessGrant {
            active: false,
            revoked_at: Some(revoked_at),
            ..existing
        })
    }

    /// Whether `key` currently grants access at `height`.
    ///
    /// A missing grant is a plain `false`.
    pub fn check(conn: &Connection, key: &GrantKey, height: BlockHeight) -> AccessResult<bool> {
        Ok(Self::get(conn, key)?
            .map(|grant| grant.is_valid_at(height))
            .unwrap_or(false))
    }

    pub fn get(conn: &Connection, key: &GrantKey) -> AccessResult<Option<DomainAccessGrant>> {
        conn.query_row(
            &format!(
                "{} WHERE owner = ?1 AND consumer = ?2 AND domain = ?3",
                SELECT_GRANT
            ),
            params![key.owner.as_str(), key.consumer.as_str(), key.domain],
            read_row,
        )
        .optional()?
        .map(into_grant)
        .transpose()
    }

    /// Every grant an owner has issued, including revoked and expired ones.
    pub fn list_for_owner(
        conn: &Connection,
        owner: &Principal,
    ) -> AccessResult<Vec<DomainAccessGrant>> {
        Self::list_where(conn, "owner", owner)
    }

    /// Every grant naming a consumer, across owners.
    pub fn list_for_consumer(
        conn: &Connection,
        consumer: &Principal,
    ) -> AccessResult<Vec<DomainAccessGrant>> {
        Self::list_where(conn, "consumer", consumer)
    }

    fn list_where(
        conn: &Connection,
        column: &'static str,
        principal: &Principal,
    ) -> AccessResult<Vec<DomainAccessGrant>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE {} = ?1 ORDER BY owner, consumer, domain",
            SELECT_GRANT, column
        ))?;

        let rows = stmt
            .query_map([principal.as_str()], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_grant).collect()
    }
}
