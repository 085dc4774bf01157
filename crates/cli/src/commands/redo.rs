use tracing::info;

use rockhopper::{runner, Config, DB};

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let db = DB::open_with_config(config)?;
    db.touch().await?;

    let map = super::load_migration_map(config)?;

    for (package, mut migrations) in map {
        let record = match db.find_last_applied_migration(&mut migrations).await? {
            Some((_, record)) => record,
            None => {
                info!(package = %package, "no applied migration yet");
                continue;
            }
        };

        runner::redo(&db, &mut migrations, record.version_id).await?;
        info!(package = %package, version = record.version_id, "migration re-applied");
    }

    db.close().await;
    Ok(())
}
