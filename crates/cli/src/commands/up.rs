use tracing::info;

use rockhopper::{runner, Config, DB};

pub async fn run(config: &Config, to: i64, steps: usize) -> anyhow::Result<()> {
    let db = DB::open_with_config(config)?;
    db.touch().await?;

    let map = super::load_migration_map(config)?;
    if map.is_empty() {
        info!("no migrations found");
        db.close().await;
        return Ok(());
    }

    for (package, mut migrations) in map {
        let start = match db.find_last_applied_migration(&mut migrations).await? {
            Some((index, _)) => index + 1,
            None => 0,
        };

        let applied = |m: &rockhopper::Migration| {
            info!(package = %m.package, version = m.version, "migration applied");
        };

        if steps > 0 {
            runner::up_by_steps(&db, &mut migrations, start, steps, applied).await?;
        } else {
            runner::up(&db, &mut migrations, start, to, applied).await?;
        }

        info!(
            package = %package,
            version = db.query_latest_version(&package).await?,
            "package is up to date"
        );
    }

    db.close().await;
    Ok(())
}
