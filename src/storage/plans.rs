//! Staged plans, persisted between the analysis and the confirmation step.
//!
//! Each plan is stored as a run record plus three independent rows (add,
//! remove, missing). A plan is pending only while all three rows exist.

use std::{collections::HashMap, path::Path};

use log::debug;
use rusqlite::{OptionalExtension, params};

use crate::{
    config,
    domain::{
        plan::{PlanPart, StagedPlan},
        track::Track,
    },
    reconcile::diff::DiffResult,
    storage::{
        db,
        error::StorageError,
        schema::{columns::*, tables::*},
    },
};

pub struct PlanStore {
    pub(crate) db: rusqlite::Connection,
}

impl PlanStore {
    /// when called, opens a data base connection
    pub fn new(db_config: &config::Database, default_path: &Path) -> Result<Self, StorageError> {
        Ok(Self::from_existing_conn(db::open(db_config, default_path)?))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    /// Replaces whatever was staged for the plan's session.
    pub fn stage(&mut self, plan: &StagedPlan) -> Result<(), StorageError> {
        let tx = self.db.transaction()?;

        tx.execute(
            &format!("DELETE FROM {STAGED} WHERE {SESSION_ID} = ?1"),
            params![plan.session],
        )?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {RUNS} ({SESSION_ID}, {TARGET_NAME}, {MODE}, {FILTER}, {CREATED_AT})
             VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                plan.session,
                plan.target_name,
                serde_json::to_string(&plan.mode)?,
                serde_json::to_string(&plan.filter)?,
                plan.created_at,
            ],
        )?;

        for part in PlanPart::ALL {
            let tracks = match part {
                PlanPart::Add => &plan.diff.to_add,
                PlanPart::Remove => &plan.diff.to_remove,
                PlanPart::Missing => &plan.diff.missing,
            };
            tx.execute(
                &format!("INSERT INTO {STAGED} ({SESSION_ID}, {KIND}, {PAYLOAD}) VALUES (?1, ?2, ?3)"),
                params![plan.session, part.as_str(), serde_json::to_string(tracks)?],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// The plan awaiting confirmation for this session, if complete.
    pub fn pending(&self, session: &str) -> Result<Option<StagedPlan>, StorageError> {
        let run = self
            .db
            .query_row(
                &format!(
                    "SELECT {TARGET_NAME}, {MODE}, {FILTER}, {CREATED_AT} FROM {RUNS} WHERE {SESSION_ID} = ?1"
                ),
                params![session],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((target_name, mode, filter, created_at)) = run else {
            return Ok(None);
        };

        let mut stmt = self.db.prepare(&format!(
            "SELECT {KIND}, {PAYLOAD} FROM {STAGED} WHERE {SESSION_ID} = ?1"
        ))?;
        let mut parts = stmt
            .query_map(params![session], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        let mut take = |part: PlanPart| -> Result<Option<Vec<Track>>, StorageError> {
            parts
                .remove(part.as_str())
                .map(|payload| serde_json::from_str(&payload))
                .transpose()
                .map_err(StorageError::from)
        };

        let (Some(to_add), Some(to_remove), Some(missing)) = (
            take(PlanPart::Add)?,
            take(PlanPart::Remove)?,
            take(PlanPart::Missing)?,
        ) else {
            debug!("Staged plan for session {session} is incomplete, treating it as absent");
            return Ok(None);
        };

        Ok(Some(StagedPlan {
            session: session.to_string(),
            target_name,
            mode: serde_json::from_str(&mode)?,
            filter: serde_json::from_str(&filter)?,
            diff: DiffResult {
                to_add,
                to_remove,
                missing,
            },
            created_at,
        }))
    }

    pub fn clear(&mut self, session: &str) -> Result<(), StorageError> {
        let tx = self.db.transaction()?;
        tx.execute(
            &format!("DELETE FROM {STAGED} WHERE {SESSION_ID} = ?1"),
            params![session],
        )?;
        tx.execute(
            &format!("DELETE FROM {RUNS} WHERE {SESSION_ID} = ?1"),
            params![session],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
pub fn in_memory_store() -> PlanStore {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    crate::storage::schema::init(&conn).unwrap();
    PlanStore::from_existing_conn(conn)
}
