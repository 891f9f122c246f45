#![cfg(test)]

use std::io::Write;
use std::path::{Path, PathBuf};

pub fn create_temp_dir(test_name: &str) -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(test_name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn set_fixture(temp_dir: &Path, filename: &str, val: &str) -> std::io::Result<PathBuf> {
    let full_path = temp_dir.join(filename);

    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full_path)?
        .write_all(val.as_bytes())?;

    Ok(full_path)
}
