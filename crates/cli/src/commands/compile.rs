use colored::Colorize;

use rockhopper::migration::MigrationSlice;
use rockhopper::{Config, MigrationDumper, MigrationRegistry, SqlMigrationLoader};

pub fn run(config: &Config, output: &str) -> anyhow::Result<()> {
    // compile only script-backed migrations; registered ones already are code
    let loader =
        SqlMigrationLoader::from_config(config).with_registry(&MigrationRegistry::new());
    let migrations = loader.load(&config.migrations_dirs)?;

    let sources: MigrationSlice = migrations
        .into_iter()
        .filter(|m| !m.registered)
        .collect::<Vec<_>>()
        .into();

    if sources.is_empty() {
        println!("no migration scripts to compile");
        return Ok(());
    }

    let count = sources.len();
    MigrationDumper::new(output).dump(&sources)?;

    println!(
        "{} {} migration(s) into {}",
        "Compiled".green(),
        count,
        output
    );
    Ok(())
}
