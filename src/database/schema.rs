use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            content TEXT,
            digest TEXT,
            cover_image TEXT,
            tags TEXT,
            images TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS platform_variants (
            article_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            title TEXT,
            content TEXT,
            video_title TEXT,
            video_description TEXT,
            tags TEXT,
            PRIMARY KEY (article_id, platform),
            FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS presets (
            platform TEXT PRIMARY KEY,
            header_content TEXT,
            footer_content TEXT,
            author TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}
