//! Identity registry.
//!
//! Maps a principal to its registration record. Leaf dependency of every
//! other registry: endpoints and grants can only hang off a registered
//! identity.

use crate::error::{AccessError, AccessResult};
use crate::schema::principal_from_sql;
use crate::validate::require_height;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use vitalledger_core::{AuditAction, AuditLedger, BlockHeight, CallContext, Principal};

/// A registered data owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityRecord {
    pub principal: Principal,
    /// Height the identity was registered at
    pub registered_at: BlockHeight,
}

pub struct IdentityRegistry;

impl IdentityRegistry {
    /// Register the caller. Fails if the caller already has a record.
    pub fn register(conn: &Connection, ctx: &CallContext) -> AccessResult<IdentityRecord> {
        require_height(ctx.height)?;

        if Self::is_registered(conn, &ctx.caller)? {
            return Err(AccessError::AlreadyRegistered {
                principal: ctx.caller.clone(),
            });
        }

        conn.execute(
            "INSERT INTO identities (principal, registered_at) VALUES (?1, ?2)",
            params![ctx.caller.as_str(), ctx.height],
        )?;

        AuditLedger::append(
            conn,
            ctx.height,
            &ctx.caller,
            AuditAction::IdentityRegistered,
            json!({ "principal": ctx.caller }),
        )?;

        Ok(IdentityRecord {
            principal: ctx.caller.clone(),
            registered_at: ctx.height,
        })
    }

    pub fn get(conn: &Connection, principal: &Principal) -> AccessResult<Option<IdentityRecord>> {
        let row = conn
            .query_row(
                "SELECT principal, registered_at FROM identities WHERE principal = ?1",
                [principal.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, BlockHeight>(1)?)),
            )
            .optional()?;

        row.map(|(principal, registered_at)| {
            Ok(IdentityRecord {
                principal: principal_from_sql("identity principal", principal)?,
                registered_at,
            })
        })
        .transpose()
    }

    pub fn is_registered(conn: &Connection, principal: &Principal) -> AccessResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM identities WHERE principal = ?1)",
            [principal.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Fail with `IdentityNotFound` unless `principal` is registered.
    pub(crate) fn require(conn: &Connection, principal: &Principal) -> AccessResult<()> {
        if Self::is_registered(conn, principal)? {
            Ok(())
        } else {
            Err(AccessError::IdentityNotFound {
                principal: principal.clone(),
            })
        }
    }
}
