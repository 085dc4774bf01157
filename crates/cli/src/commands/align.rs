use tracing::info;

use rockhopper::{runner, Config, DB};

pub async fn run(config: &Config, to: i64) -> anyhow::Result<()> {
    let db = DB::open_with_config(config)?;
    db.touch().await?;

    let map = super::load_migration_map(config)?;

    for (package, mut migrations) in map {
        runner::align(&db, &mut migrations, to, |m| {
            info!(package = %m.package, version = m.version, "migration aligned");
        })
        .await?;

        info!(
            package = %package,
            version = db.query_latest_version(&package).await?,
            "package aligned"
        );
    }

    db.close().await;
    Ok(())
}
