//! Consumer authorization registry.
//!
//! Only the configured administrator may authorize a consumer, and each
//! consumer is authorized at most once. There is no revocation path: the
//! authorization is binary and permanent.

use crate::error::{AccessError, AccessResult};
use crate::schema::principal_from_sql;
use crate::validate::{require_height, require_text};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use vitalledger_core::{AuditAction, AuditLedger, BlockHeight, CallContext, Principal};

/// Administrative approval for a consumer to receive grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsumerAuthorization {
    pub consumer: Principal,
    /// Consumer category, e.g. "hospital"
    pub category: String,
    pub authorized_by: Principal,
    pub authorized_at: BlockHeight,
}

pub struct ConsumerRegistry;

impl ConsumerRegistry {
    /// Authorize `consumer`. The admin check runs before the duplicate check.
    pub fn authorize(
        conn: &Connection,
        ctx: &CallContext,
        admin: &Principal,
        consumer: &Principal,
        category: &str,
    ) -> AccessResult<ConsumerAuthorization> {
        require_height(ctx.height)?;
        require_text("category", category)?;

        if &ctx.caller != admin {
            return Err(AccessError::NotAdmin {
                caller: ctx.caller.clone(),
            });
        }

        if Self::is_authorized(conn, consumer)? {
            return Err(AccessError::AlreadyAuthorized {
                consumer: consumer.clone(),
            });
        }

        conn.execute(
            r#"
            INSERT INTO consumers (consumer, category, authorized_by, authorized_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                consumer.as_str(),
                category,
                ctx.caller.as_str(),
                ctx.height
            ],
        )?;

        AuditLedger::append(
            conn,
            ctx.height,
            &ctx.caller,
            AuditAction::ConsumerAuthorized,
            json!({ "consumer": consumer, "category": category }),
        )?;

        Ok(ConsumerAuthorization {
            consumer: consumer.clone(),
            category: category.to_string(),
            authorized_by: ctx.caller.clone(),
            authorized_at: ctx.height,
        })
    }

    pub fn get(
        conn: &Connection,
        consumer: &Principal,
    ) -> AccessResult<Option<ConsumerAuthorization>> {
        let row = conn
            .query_row(
                r#"
                SELECT consumer, category, authorized_by, authorized_at
                FROM consumers
                WHERE consumer = ?1
                "#,
                [consumer.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, BlockHeight>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(consumer, category, authorized_by, authorized_at)| {
            Ok(ConsumerAuthorization {
                consumer: principal_from_sql("consumer", consumer)?,
                category,
                authorized_by: principal_from_sql("authorized_by", authorized_by)?,
                authorized_at,
            })
        })
        .transpose()
    }

    pub fn is_authorized(conn: &Connection, consumer: &Principal) -> AccessResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM consumers WHERE consumer = ?1)",
            [consumer.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Fail with `ConsumerNotAuthorized` unless `consumer` has a record.
    pub(crate) fn require(conn: &Connection, consumer: &Principal) -> AccessResult<()> {
        if Self::is_authorized(conn, consumer)? {
            Ok(())
        } else {
            Err(AccessError::ConsumerNotAuthorized {
                consumer: consumer.clone(),
            })
        }
    }
}
