use tracing::info;

use rockhopper::{runner, Config, DB};

pub async fn run(config: &Config, to: i64, steps: usize) -> anyhow::Result<()> {
    let db = DB::open_with_config(config)?;
    db.touch().await?;

    let map = super::load_migration_map(config)?;

    for (package, mut migrations) in map {
        let start = match db.find_last_applied_migration(&mut migrations).await? {
            Some((index, _)) => index,
            None => {
                info!(package = %package, "nothing to roll back");
                continue;
            }
        };

        let rolled_back = |m: &rockhopper::Migration| {
            info!(package = %m.package, version = m.version, "migration rolled back");
        };

        if to > 0 {
            runner::down(&db, &mut migrations, start, to, rolled_back).await?;
        } else {
            // one step by default; a bare `down` never empties the schema
            let steps = if steps > 0 { steps } else { 1 };
            runner::down_by_steps(&db, &mut migrations, start, steps, rolled_back).await?;
        }
    }

    db.close().await;
    Ok(())
}
