//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `skymark_core` linkage without an embedding host.
//! - Optionally dump the bookmarks persisted in a local database file.
//!
//! Usage: `skymark_cli [DB_PATH]`

use skymark_core::{BookmarkTarget, LocalStore, SqliteLocalStore, DEFAULT_BOOKMARKS_KEY};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("skymark_core ping={}", skymark_core::ping());
    println!("skymark_core version={}", skymark_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let bookmarks = match SqliteLocalStore::open(&db_path)
        .and_then(|store| store.read(DEFAULT_BOOKMARKS_KEY))
    {
        Ok(bookmarks) => bookmarks,
        Err(err) => {
            eprintln!("failed to read `{db_path}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("bookmarks={}", bookmarks.len());
    for bookmark in &bookmarks {
        match &bookmark.target {
            BookmarkTarget::Coordinate(coordinate) => println!(
                "{}\tra={:.4}\tdec={:.4}",
                bookmark.name, coordinate.ra, coordinate.dec
            ),
            BookmarkTarget::Solution(payload) => {
                println!("{}\tsolution_bytes={}", bookmark.name, payload.len())
            }
        }
    }
    ExitCode::SUCCESS
}
