//! Endpoint (device) registry.
//!
//! Data-producing devices registered under an owner identity. The device id
//! is unique per owner; two owners may reuse the same id.

use crate::error::{AccessError, AccessResult};
use crate::identity::IdentityRegistry;
use crate::schema::principal_from_sql;
use crate::validate::{require_height, require_text};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use vitalledger_core::{AuditAction, AuditLedger, BlockHeight, CallContext, Principal};

/// A device producing data under its owner's identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointRecord {
    pub owner: Principal,
    pub device_id: String,
    /// Free-form device class, stored verbatim (e.g. "smartwatch")
    pub device_type: String,
    pub registered_at: BlockHeight,
}

type EndpointRow = (String, String, String, BlockHeight);

fn read_row(row: &Row<'_>) -> rusqlite::Result<EndpointRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record((owner, device_id, device_type, registered_at): EndpointRow) -> AccessResult<EndpointRecord> {
    Ok(EndpointRecord {
        owner: principal_from_sql("endpoint owner", owner)?,
        device_id,
        device_type,
        registered_at,
    })
}

pub struct EndpointRegistry;

impl EndpointRegistry {
    /// Register a device for the caller.
    ///
    /// The identity check runs before the duplicate check, so an
    /// unregistered caller always sees `IdentityNotFound`.
    pub fn register(
        conn: &Connection,
        ctx: &CallContext,
        device_id: &str,
        device_type: &str,
    ) -> AccessResult<EndpointRecord> {
        require_height(ctx.height)?;
        require_text("device_id", device_id)?;
        require_text("device_type", device_type)?;

        IdentityRegistry::require(conn, &ctx.caller)?;

        if Self::get(conn, &ctx.caller, device_id)?.is_some() {
            return Err(AccessError::DuplicateEndpoint {
                owner: ctx.caller.clone(),
                device_id: device_id.to_string(),
            });
        }

        conn.execute(
            r#"
            INSERT INTO endpoints (owner, device_id, device_type, registered_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                ctx.caller.as_str(),
                device_id,
                device_type,
                ctx.height
            ],
        )?;

        AuditLedger::append(
            conn,
            ctx.height,
            &ctx.caller,
            AuditAction::EndpointRegistered,
            json!({ "device_id": device_id, "device_type": device_type }),
        )?;

        Ok(EndpointRecord {
            owner: ctx.caller.clone(),
            device_id: device_id.to_string(),
            device_type: device_type.to_string(),
            registered_at: ctx.height,
        })
    }

    pub fn get(
        conn: &Connection,
        owner: &Principal,
        device_id: &str,
    ) -> AccessResult<Option<EndpointRecord>> {
        conn.query_row(
            r#"
            SELECT owner, device_id, device_type, registered_at
            FROM endpoints
            WHERE owner = ?1 AND device_id = ?2
            "#,
            params![owner.as_str(), device_id],
            read_row,
        )
        .optional()?
        .map(into_record)
        .transpose()
    }

    /// All endpoints of an owner, ordered by device id.
    pub fn list_for_owner(conn: &Connection, owner: &Principal) -> AccessResult<Vec<EndpointRecord>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT owner, device_id, device_type, registered_at
            FROM endpoints
            WHERE owner = ?1
            ORDER BY device_id ASC
            "#,
        )?;

        let rows = stmt
            .query_map([owner.as_str()], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_record).collect()
    }
}
