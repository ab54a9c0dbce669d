use std::path::PathBuf;

use crate::categorizer::{categorize_uncategorized, Categorizer};
use crate::cli::open;
use crate::error::Result;
use crate::importer::import_csv;

pub fn run(file: &str) -> Result<()> {
    let file_path = PathBuf::from(file);
    let (settings, conn) = open()?;

    let result = import_csv(&conn, &file_path, &settings.currency)?;

    if result.duplicate_file {
        println!("This file has already been imported (duplicate checksum).");
        return Ok(());
    }

    println!("{} imported, {} skipped (duplicates)", result.imported, result.skipped);

    let merchants = settings.merchants()?;
    let mut categorizer = Categorizer::new(&merchants);
    categorizer.initialize(&conn)?;
    let cat_result = categorize_uncategorized(&conn, categorizer.snapshot()?)?;
    println!(
        "{} categorized, {} still uncategorized",
        cat_result.categorized, cat_result.still_uncategorized
    );

    Ok(())
}
