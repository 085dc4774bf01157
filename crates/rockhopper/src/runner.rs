//! Execution engine
//!
//! Drives a package chain forward or backward: `up`, `up_by_steps`, `down`,
//! `down_by_steps`, `redo` and `align`. Each migration runs either inside
//! its own transaction (the default) or as a bare statement sequence when
//! the script carries `-- !txn`, and every transition appends a bookkeeping
//! row: `is_applied = true` for an apply, `false` for a rollback.
//!
//! A failed statement rolls the current migration back and stops the walk;
//! migrations already committed stay committed, later ones are untouched,
//! so a fixed run can simply be retried.

use std::time::Instant;

use sqlx::AnyConnection;
use tracing::{debug, info};

use crate::console::{self, MigrationAction};
use crate::db::DB;
use crate::error::{ExecutionError, RockhopperError, RockhopperResult};
use crate::migration::{Migration, MigrationHandler, MigrationSlice};
use crate::parser::{Direction, Statement};

impl Migration {
    /// Apply this migration and record it as applied
    pub async fn up(&mut self, db: &DB) -> RockhopperResult<()> {
        self.run(db, Direction::Up).await
    }

    /// Roll this migration back and record the rollback
    pub async fn down(&mut self, db: &DB) -> RockhopperResult<()> {
        self.run(db, Direction::Down).await
    }

    async fn run(&mut self, db: &DB, direction: Direction) -> RockhopperResult<()> {
        let version = self.version;
        let package = self.package.clone();
        let source = self.source.clone();
        let applied = direction == Direction::Up;

        let handler: Option<MigrationHandler> = match direction {
            Direction::Up => self.up_fn.clone(),
            Direction::Down => self.down_fn.clone(),
        };

        let statements = match direction {
            Direction::Up => &mut self.up_statements,
            Direction::Down => &mut self.down_statements,
        };

        if self.use_tx {
            let mut tx = db.pool().begin().await?;

            let result = async {
                run_migration(&mut tx, statements, handler.as_ref(), version, &source).await?;
                db.insert_version(&mut tx, &package, &source, version, applied)
                    .await
            }
            .await;

            match result {
                Ok(()) => {
                    tx.commit().await?;
                    Ok(())
                }
                Err(err) => {
                    if let Err(e) = tx.rollback().await {
                        tracing::warn!(version, error = %e, "failed to roll back migration transaction");
                    }
                    Err(err)
                }
            }
        } else {
            let mut conn = db.pool().acquire().await?;
            run_migration(&mut conn, statements, handler.as_ref(), version, &source).await?;
            db.insert_version(&mut conn, &package, &source, version, applied)
                .await
        }
    }
}

async fn run_migration(
    conn: &mut AnyConnection,
    statements: &mut [Statement],
    handler: Option<&MigrationHandler>,
    version: i64,
    source: &str,
) -> RockhopperResult<()> {
    if let Some(handler) = handler {
        debug!(version, source, "invoking registered migration handler");
        return handler(conn).await;
    }

    for stmt in statements {
        execute_statement(conn, stmt, version, source).await?;
    }

    Ok(())
}

/// Statement pipeline: debug log, execute, time, banner. The observed
/// duration is written back onto the statement.
async fn execute_statement(
    conn: &mut AnyConnection,
    stmt: &mut Statement,
    version: i64,
    source: &str,
) -> RockhopperResult<()> {
    debug!(version, sql = %stmt.sql, "executing statement");

    let started = Instant::now();
    let result = sqlx::query(&stmt.sql).execute(&mut *conn).await;
    let elapsed = started.elapsed();
    stmt.duration = Some(elapsed);

    match result {
        Ok(_) => {
            console::print_statement(&stmt.sql, true, elapsed);
            Ok(())
        }
        Err(err) => {
            console::print_statement(&stmt.sql, false, elapsed);
            Err(RockhopperError::Execution(ExecutionError {
                version,
                source: source.to_string(),
                sql: stmt.sql.clone(),
                message: err.to_string(),
            }))
        }
    }
}

/// Walk the chain forward from `from`, applying every migration with
/// `version <= to` (`to = 0` walks to the chain end). The callback fires
/// after each successful migration.
pub async fn up<F>(
    db: &DB,
    migrations: &mut MigrationSlice,
    from: usize,
    to: i64,
    mut callback: F,
) -> RockhopperResult<()>
where
    F: FnMut(&Migration),
{
    let mut index = from;
    while index < migrations.len() {
        if to > 0 && migrations[index].version > to {
            break;
        }

        console::describe_migration(MigrationAction::Upgrading, &migrations[index]);
        migrations[index].up(db).await?;
        callback(&migrations[index]);
        index += 1;
    }

    Ok(())
}

/// Like [`up`] but limited to `steps` migrations
pub async fn up_by_steps<F>(
    db: &DB,
    migrations: &mut MigrationSlice,
    from: usize,
    steps: usize,
    mut callback: F,
) -> RockhopperResult<()>
where
    F: FnMut(&Migration),
{
    let mut index = from;
    let mut remaining = steps;
    while index < migrations.len() && remaining > 0 {
        console::describe_migration(MigrationAction::Upgrading, &migrations[index]);
        migrations[index].up(db).await?;
        callback(&migrations[index]);
        index += 1;
        remaining -= 1;
    }

    Ok(())
}

/// Walk the chain backward from `from`, rolling back every migration with
/// `version > to` (`to = 0` walks to the chain start)
pub async fn down<F>(
    db: &DB,
    migrations: &mut MigrationSlice,
    from: usize,
    to: i64,
    mut callback: F,
) -> RockhopperResult<()>
where
    F: FnMut(&Migration),
{
    if from >= migrations.len() {
        return Ok(());
    }

    let mut index = from;
    loop {
        if to > 0 && migrations[index].version <= to {
            break;
        }

        console::describe_migration(MigrationAction::Downgrading, &migrations[index]);
        migrations[index].down(db).await?;
        callback(&migrations[index]);

        if index == 0 {
            break;
        }
        index -= 1;
    }

    Ok(())
}

/// Like [`down`] but limited to `steps` migrations
pub async fn down_by_steps<F>(
    db: &DB,
    migrations: &mut MigrationSlice,
    from: usize,
    steps: usize,
    mut callback: F,
) -> RockhopperResult<()>
where
    F: FnMut(&Migration),
{
    if from >= migrations.len() {
        return Ok(());
    }

    let mut index = from;
    let mut remaining = steps;
    while remaining > 0 {
        console::describe_migration(MigrationAction::Downgrading, &migrations[index]);
        migrations[index].down(db).await?;
        callback(&migrations[index]);
        remaining -= 1;

        if index == 0 {
            break;
        }
        index -= 1;
    }

    Ok(())
}

/// Roll one migration back and re-apply it, each step in its own
/// transaction
pub async fn redo(db: &DB, migrations: &mut MigrationSlice, version: i64) -> RockhopperResult<()> {
    let index = migrations
        .find_index(version)
        .ok_or(crate::error::CatalogError::VersionNotFound(version))?;

    console::describe_migration(MigrationAction::Downgrading, &migrations[index]);
    migrations[index].down(db).await?;

    console::describe_migration(MigrationAction::Upgrading, &migrations[index]);
    migrations[index].up(db).await?;

    Ok(())
}

/// Move the chain to `target` from whatever its current state is, choosing
/// the direction automatically. Aligning to the current version is a no-op.
pub async fn align<F>(
    db: &DB,
    migrations: &mut MigrationSlice,
    target: i64,
    callback: F,
) -> RockhopperResult<()>
where
    F: FnMut(&Migration),
{
    match db.find_last_applied_migration(migrations).await? {
        None => up(db, migrations, 0, target, callback).await,
        Some((index, record)) => {
            if target < record.version_id {
                down(db, migrations, index, target, callback).await
            } else if target > record.version_id {
                up(db, migrations, index + 1, target, callback).await
            } else {
                info!(version = target, "the migration version is already aligned");
                Ok(())
            }
        }
    }
}
