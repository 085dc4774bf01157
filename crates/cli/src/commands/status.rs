use colored::Colorize;

use rockhopper::{Config, MigrationRecord, DB};

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let db = DB::open_with_config(config)?;
    db.touch().await?;

    let map = super::load_migration_map(config)?;
    if map.is_empty() {
        println!("no migrations found");
        db.close().await;
        return Ok(());
    }

    println!(
        "{:<12} {:<48} {:<26} {}",
        "PACKAGE".bold(),
        "MIGRATION".bold(),
        "APPLIED AT".bold(),
        "CURRENT".bold()
    );

    for (package, migrations) in map.iter() {
        let current_version = db.query_latest_version(package).await?;

        for migration in migrations.iter() {
            let record = db.find_migration(package, migration.version).await?;
            let mark = if migration.version == current_version {
                "*"
            } else {
                "-"
            };

            println!(
                "{:<12} {:<48} {:<26} {}",
                migration.package,
                migration.source,
                format_applied_at(record.as_ref()),
                mark
            );
        }
    }

    db.close().await;
    Ok(())
}

fn format_applied_at(record: Option<&MigrationRecord>) -> String {
    match record {
        Some(record) if record.is_applied => record.time.format("%Y-%m-%d %H:%M:%S").to_string(),
        Some(_) => "rolled back".to_string(),
        None => "pending".to_string(),
    }
}
