//! Post table operations.

use anyhow::{Context, Result};
use rusqlite::{params, Row};

use super::Database;
use crate::post::{Animal, Extras, Post, PostKey, PostType, Sex};

const POST_COLUMNS: &str = r#"
    owner_id, post_id, date, raw, text, type, animal, sex,
    breed, age, name, location, "when", status_details,
    phones, contact_names, vk_accounts, photos,
    sterilized, vaccinated, chipped, litter_ok
"#;

impl Database {
    pub fn post_exists(&self, key: PostKey) -> Result<bool> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE owner_id = ? AND post_id = ?)",
            params![key.owner_id, key.post_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Insert or overwrite every derived field of a post.
    ///
    /// `created_at` is only set on first insert, so re-saving an identical
    /// post leaves the row unchanged.
    pub fn upsert_post(&self, post: &Post, now: i64) -> Result<()> {
        let phones = serde_json::to_string(&post.phones)?;
        let contact_names = serde_json::to_string(&post.contact_names)?;
        let vk_accounts = serde_json::to_string(&post.vk_accounts)?;
        let photos = serde_json::to_string(&post.photos)?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO posts (
                owner_id, post_id, date, raw, text, type, animal, sex,
                breed, age, name, location, "when", status_details,
                phones, contact_names, vk_accounts, photos,
                sterilized, vaccinated, chipped, litter_ok, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23
            )
            ON CONFLICT(owner_id, post_id) DO UPDATE SET
                date = excluded.date,
                raw = excluded.raw,
                text = excluded.text,
                type = excluded.type,
                animal = excluded.animal,
                sex = excluded.sex,
                breed = excluded.breed,
                age = excluded.age,
                name = excluded.name,
                location = excluded.location,
                "when" = excluded."when",
                status_details = excluded.status_details,
                phones = excluded.phones,
                contact_names = excluded.contact_names,
                vk_accounts = excluded.vk_accounts,
                photos = excluded.photos,
                sterilized = excluded.sterilized,
                vaccinated = excluded.vaccinated,
                chipped = excluded.chipped,
                litter_ok = excluded.litter_ok
            "#,
            params![
                post.owner_id,
                post.post_id,
                post.date,
                post.raw,
                post.text,
                post.post_type.as_str(),
                post.animal.as_str(),
                post.sex.as_str(),
                post.breed,
                post.age,
                post.name,
                post.location,
                post.when,
                post.status_details,
                phones,
                contact_names,
                vk_accounts,
                photos,
                post.extras.sterilized,
                post.extras.vaccinated,
                post.extras.chipped,
                post.extras.litter_ok,
                now,
            ],
        )
        .with_context(|| format!("Failed to upsert post {}", post.key()))?;
        Ok(())
    }

    pub fn get_post(&self, key: PostKey) -> Result<Option<Post>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM posts WHERE owner_id = ? AND post_id = ?",
            POST_COLUMNS
        );
        let result = conn.query_row(&sql, params![key.owner_id, key.post_id], row_to_post);
        match result {
            Ok(post) => Ok(Some(post)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        owner_id: row.get(0)?,
        post_id: row.get(1)?,
        date: row.get(2)?,
        raw: row.get(3)?,
        text: row.get(4)?,
        post_type: PostType::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
        animal: Animal::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        sex: Sex::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
        breed: row.get(8)?,
        age: row.get(9)?,
        name: row.get(10)?,
        location: row.get(11)?,
        when: row.get(12)?,
        status_details: row.get(13)?,
        phones: json_list(row, 14)?,
        contact_names: json_list(row, 15)?,
        vk_accounts: json_list(row, 16)?,
        photos: json_list(row, 17)?,
        extras: Extras {
            sterilized: row.get(18)?,
            vaccinated: row.get(19)?,
            chipped: row.get(20)?,
            litter_ok: row.get(21)?,
        },
    })
}

fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::classify;

    fn sample() -> Post {
        let mut post = classify(
            PostKey::new(-42, 7),
            "Найдена собака, кобель. Улица Ленина, 5. 8 922 405 26 12 Татьяна",
        );
        post.date = 1_700_000_000;
        post.photos = vec!["https://example.org/a.jpg".to_string()];
        post
    }

    fn raw_row(db: &Database, key: PostKey) -> Vec<String> {
        let conn = db.conn().unwrap();
        conn.query_row(
            "SELECT * FROM posts WHERE owner_id = ? AND post_id = ?",
            params![key.owner_id, key.post_id],
            |row| {
                let count = row.as_ref().column_count();
                (0..count)
                    .map(|i| {
                        row.get::<_, rusqlite::types::Value>(i)
                            .map(|v| format!("{:?}", v))
                    })
                    .collect()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_upsert_then_get_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let post = sample();
        db.upsert_post(&post, 100).unwrap();

        let loaded = db.get_post(post.key()).unwrap().unwrap();
        assert_eq!(loaded, post);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let post = sample();
        db.upsert_post(&post, 100).unwrap();
        let first = raw_row(&db, post.key());

        db.upsert_post(&post, 200).unwrap();
        let second = raw_row(&db, post.key());
        assert_eq!(first, second);

        let count: i64 = db
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_upsert_overwrites_derived_fields() {
        let db = Database::open_in_memory().unwrap();
        let mut post = sample();
        db.upsert_post(&post, 100).unwrap();

        post.post_type = PostType::Lost;
        post.breed = None;
        db.upsert_post(&post, 200).unwrap();

        let loaded = db.get_post(post.key()).unwrap().unwrap();
        assert_eq!(loaded.post_type, PostType::Lost);
        assert_eq!(loaded.breed, None);
    }

    #[test]
    fn test_absent_fields_are_null() {
        let db = Database::open_in_memory().unwrap();
        let post = classify(PostKey::new(1, 1), "Привет всем");
        db.upsert_post(&post, 1).unwrap();

        let breed_is_null: bool = db
            .conn()
            .unwrap()
            .query_row("SELECT breed IS NULL FROM posts", [], |row| row.get(0))
            .unwrap();
        assert!(breed_is_null);
    }

    #[test]
    fn test_exists() {
        let db = Database::open_in_memory().unwrap();
        let post = sample();
        assert!(!db.post_exists(post.key()).unwrap());
        db.upsert_post(&post, 1).unwrap();
        assert!(db.post_exists(post.key()).unwrap());
        assert!(!db.post_exists(PostKey::new(-42, 8)).unwrap());
    }

    #[test]
    fn test_get_missing_post() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_post(PostKey::new(1, 2)).unwrap().is_none());
    }
}
