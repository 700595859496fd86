use crate::images::ImageRef;
use crate::payload::{FillPayload, Preset};
use crate::text::TagsInput;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default, skip_deserializing)]
    pub updated_at: String,
}

/// Per-platform rewrite of an article, e.g. video captions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformVariant {
    pub title: Option<String>,
    pub content: Option<String>,
    pub video_title: Option<String>,
    pub video_description: Option<String>,
    pub tags: Option<TagsInput>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("encoding column")
}

fn from_json<T: for<'de> Deserialize<'de>>(raw: Option<String>) -> Result<Option<T>> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => {
            Ok(Some(serde_json::from_str(&raw).context("decoding column")?))
        }
        _ => Ok(None),
    }
}

// ========== Article Queries ==========

pub fn upsert_article(conn: &Connection, article: &Article) -> Result<()> {
    let tags = article.tags.as_ref().map(to_json).transpose()?;
    let images = to_json(&article.images)?;
    conn.execute(
        "INSERT INTO articles (id, title, content, digest, cover_image, tags, images)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            content = excluded.content,
            digest = excluded.digest,
            cover_image = excluded.cover_image,
            tags = excluded.tags,
            images = excluded.images,
            updated_at = datetime('now')",
        params![
            article.id,
            article.title,
            article.content,
            article.digest,
            article.cover_image,
            tags,
            images
        ],
    )?;
    Ok(())
}

type ArticleRow = (Article, Option<String>, Option<String>);

fn article_row(row: &Row<'_>) -> rusqlite::Result<ArticleRow> {
    Ok((
        Article {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            digest: row.get(3)?,
            cover_image: row.get(4)?,
            tags: None,
            images: Vec::new(),
            updated_at: row.get(7)?,
        },
        row.get(5)?,
        row.get(6)?,
    ))
}

fn finish_article((mut article, tags, images): ArticleRow) -> Result<Article> {
    article.tags = from_json(tags)?;
    article.images = from_json(images)?.unwrap_or_default();
    Ok(article)
}

const ARTICLE_COLUMNS: &str =
    "id, title, content, digest, cover_image, tags, images, updated_at";

pub fn get_article(conn: &Connection, id: &str) -> Result<Option<Article>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
            params![id],
            article_row,
        )
        .optional()?;
    row.map(finish_article).transpose()
}

pub fn list_articles(conn: &Connection) -> Result<Vec<Article>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM articles ORDER BY updated_at DESC, id",
        ARTICLE_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], article_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(finish_article).collect()
}

/// Removes the article and its variants. Returns whether it existed.
pub fn delete_article(conn: &Connection, id: &str) -> Result<bool> {
    conn.execute(
        "DELETE FROM platform_variants WHERE article_id = ?1",
        params![id],
    )?;
    let removed = conn.execute("DELETE FROM articles WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

// ========== Variant Queries ==========

pub fn upsert_variant(
    conn: &Connection,
    article_id: &str,
    platform: &str,
    variant: &PlatformVariant,
) -> Result<()> {
    let tags = variant.tags.as_ref().map(to_json).transpose()?;
    conn.execute(
        "INSERT INTO platform_variants
            (article_id, platform, title, content, video_title, video_description, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(article_id, platform) DO UPDATE SET
            title = excluded.title,
            content = excluded.content,
            video_title = excluded.video_title,
            video_description = excluded.video_description,
            tags = excluded.tags",
        params![
            article_id,
            platform,
            variant.title,
            variant.content,
            variant.video_title,
            variant.video_description,
            tags
        ],
    )?;
    Ok(())
}

pub fn get_variant(
    conn: &Connection,
    article_id: &str,
    platform: &str,
) -> Result<Option<PlatformVariant>> {
    let row = conn
        .query_row(
            "SELECT title, content, video_title, video_description, tags
             FROM platform_variants WHERE article_id = ?1 AND platform = ?2",
            params![article_id, platform],
            |row| {
                Ok((
                    PlatformVariant {
                        title: row.get(0)?,
                        content: row.get(1)?,
                        video_title: row.get(2)?,
                        video_description: row.get(3)?,
                        tags: None,
                    },
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;
    match row {
        Some((mut variant, tags)) => {
            variant.tags = from_json(tags)?;
            Ok(Some(variant))
        }
        None => Ok(None),
    }
}

// ========== Preset Queries ==========

pub fn upsert_preset(conn: &Connection, platform: &str, preset: &Preset) -> Result<()> {
    conn.execute(
        "INSERT INTO presets (platform, header_content, footer_content, author)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(platform) DO UPDATE SET
            header_content = excluded.header_content,
            footer_content = excluded.footer_content,
            author = excluded.author,
            updated_at = datetime('now')",
        params![
            platform,
            preset.header_content,
            preset.footer_content,
            preset.author
        ],
    )?;
    Ok(())
}

pub fn get_preset(conn: &Connection, platform: &str) -> Result<Option<Preset>> {
    let preset = conn
        .query_row(
            "SELECT header_content, footer_content, author FROM presets WHERE platform = ?1",
            params![platform],
            |row| {
                Ok(Preset {
                    header_content: row.get(0)?,
                    footer_content: row.get(1)?,
                    author: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(preset)
}

/// Articles, per-platform variants and presets in one JSON document, as
/// accepted by `mpf import`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportBundle {
    pub articles: Vec<Article>,
    pub variants: Vec<VariantRecord>,
    pub presets: BTreeMap<String, Preset>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    pub article_id: String,
    pub platform: String,
    #[serde(flatten)]
    pub variant: PlatformVariant,
}

/// Writes the whole bundle in one transaction. Returns the number of rows written.
pub fn import_bundle(conn: &mut Connection, bundle: &ImportBundle) -> Result<usize> {
    let tx = conn.transaction()?;
    for article in &bundle.articles {
        upsert_article(&tx, article)
            .with_context(|| format!("importing article {}", article.id))?;
    }
    for record in &bundle.variants {
        upsert_variant(&tx, &record.article_id, &record.platform, &record.variant)
            .with_context(|| format!("importing {} variant of {}", record.platform, record.article_id))?;
    }
    for (platform, preset) in &bundle.presets {
        upsert_preset(&tx, platform, preset)?;
    }
    tx.commit()?;
    Ok(bundle.articles.len() + bundle.variants.len() + bundle.presets.len())
}

/// Assembles the payload for `platform`: the article, overlaid with the
/// platform variant, plus the platform preset.
pub fn load_payload(conn: &Connection, id: &str, platform: &str) -> Result<Option<FillPayload>> {
    let Some(article) = get_article(conn, id)? else {
        return Ok(None);
    };
    let variant = get_variant(conn, id, platform)?.unwrap_or_default();
    let preset = get_preset(conn, platform)?;

    let title = variant
        .title
        .or_else(|| (!article.title.is_empty()).then(|| article.title.clone()));
    Ok(Some(FillPayload {
        title,
        content: variant.content.or(article.content),
        video_title: variant.video_title,
        video_description: variant.video_description,
        tags: variant.tags.or(article.tags),
        images: article.images,
        cover_image: article.cover_image,
        digest: article.digest,
        preset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn article() -> Article {
        Article {
            id: "a1".into(),
            title: "Release notes".into(),
            content: Some("<p>Body</p>".into()),
            digest: Some("Summary".into()),
            cover_image: Some("https://cdn.example.com/c.png".into()),
            tags: Some(TagsInput::List(vec!["rust".into()])),
            images: vec![ImageRef::Url("https://cdn.example.com/1.png".into())],
            updated_at: String::new(),
        }
    }

    #[test]
    fn payload_overlays_variant_and_preset() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        upsert_article(&conn, &article()).unwrap();
        upsert_variant(
            &conn,
            "a1",
            "douyin",
            &PlatformVariant {
                video_title: Some("Clip title".into()),
                tags: Some(TagsInput::Text("short,video".into())),
                ..PlatformVariant::default()
            },
        )
        .unwrap();
        upsert_preset(
            &conn,
            "douyin",
            &Preset {
                footer_content: Some("关注我".into()),
                ..Preset::default()
            },
        )
        .unwrap();

        let payload = load_payload(&conn, "a1", "douyin").unwrap().unwrap();
        assert_eq!(payload.title.as_deref(), Some("Release notes"));
        assert_eq!(payload.video_title.as_deref(), Some("Clip title"));
        assert_eq!(payload.tags, Some(TagsInput::Text("short,video".into())));
        assert_eq!(payload.images.len(), 1);
        assert_eq!(
            payload.preset.unwrap().footer_content.as_deref(),
            Some("关注我")
        );

        let plain = load_payload(&conn, "a1", "zhihu").unwrap().unwrap();
        assert_eq!(plain.tags, Some(TagsInput::List(vec!["rust".into()])));
        assert!(plain.preset.is_none());
    }

    #[test]
    fn bundle_import_writes_every_table() {
        let db = Database::in_memory().unwrap();
        let mut conn = db.conn.lock().unwrap();
        let bundle: ImportBundle = serde_json::from_str(
            r##"{
                "articles": [{"id": "a1", "title": "Hello", "content": "# Hi", "tags": "rust,cli"}],
                "variants": [{"articleId": "a1", "platform": "bilibili", "videoTitle": "Hi there"}],
                "presets": {"bilibili": {"author": "me"}}
            }"##,
        )
        .unwrap();
        assert_eq!(import_bundle(&mut conn, &bundle).unwrap(), 3);

        let payload = load_payload(&conn, "a1", "bilibili").unwrap().unwrap();
        assert_eq!(payload.video_title.as_deref(), Some("Hi there"));
        assert_eq!(payload.preset.unwrap().author.as_deref(), Some("me"));
    }

    #[test]
    fn upsert_replaces_and_delete_removes() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        upsert_article(&conn, &article()).unwrap();
        let mut changed = article();
        changed.title = "Renamed".into();
        changed.images.clear();
        upsert_article(&conn, &changed).unwrap();

        let stored = get_article(&conn, "a1").unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert!(stored.images.is_empty());
        assert_eq!(list_articles(&conn).unwrap().len(), 1);

        assert!(delete_article(&conn, "a1").unwrap());
        assert!(!delete_article(&conn, "a1").unwrap());
        assert!(load_payload(&conn, "a1", "zhihu").unwrap().is_none());
    }
}
