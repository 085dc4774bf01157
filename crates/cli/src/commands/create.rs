use std::fs;
use std::path::Path;

use chrono::Utc;
use colored::Colorize;

use rockhopper::Config;

const TEMPLATE: &str = "-- +up\n\
                        -- +begin\n\
                        SELECT 1;\n\
                        -- +end\n\
                        \n\
                        -- +down\n\
                        -- +begin\n\
                        SELECT 1;\n\
                        -- +end\n";

pub fn run(config: &Config, name: &str) -> anyhow::Result<()> {
    let dir = config
        .migrations_dirs
        .first()
        .map(String::as_str)
        .unwrap_or("migrations");

    fs::create_dir_all(dir)?;

    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let slug = name.trim().replace([' ', '-'], "_").to_lowercase();
    let filename = format!("{}_{}.sql", timestamp, slug);
    let path = Path::new(dir).join(&filename);

    fs::write(&path, TEMPLATE)?;

    println!("{} {}", "Created migration:".green(), path.display());
    Ok(())
}
