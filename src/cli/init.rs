use std::path::PathBuf;

use crate::db::{get_connection, init_db, load_categories};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        let expanded = shellexpand_path(&dir);
        std::fs::create_dir_all(&expanded)?;
        settings.data_dir = shellexpand_path(&expanded);
    }
    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;

    let db_path = settings.db_path();
    let existed = db_path.exists();
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    save_settings(&settings)?;

    if existed {
        println!("Database already initialized at {}", db_path.display());
    } else {
        let categories = load_categories(&conn)?.len();
        println!("Initialized {} with {categories} categories", db_path.display());
    }
    Ok(())
}
