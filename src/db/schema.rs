/// SQL schema for the lostdogs database.
///
/// Outbox tables share one shape; only the name of the remote id column
/// differs per channel.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    owner_id INTEGER NOT NULL,
    post_id INTEGER NOT NULL,
    date INTEGER NOT NULL,
    raw TEXT NOT NULL,
    text TEXT NOT NULL,
    type TEXT NOT NULL,
    animal TEXT NOT NULL,
    sex TEXT NOT NULL,
    breed TEXT,
    age TEXT,
    name TEXT,
    location TEXT,
    "when" TEXT,
    status_details TEXT,
    phones TEXT NOT NULL DEFAULT '[]',
    contact_names TEXT NOT NULL DEFAULT '[]',
    vk_accounts TEXT NOT NULL DEFAULT '[]',
    photos TEXT NOT NULL DEFAULT '[]',
    sterilized INTEGER NOT NULL DEFAULT 0,
    vaccinated INTEGER NOT NULL DEFAULT 0,
    chipped INTEGER NOT NULL DEFAULT 0,
    litter_ok INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (owner_id, post_id)
);

CREATE INDEX IF NOT EXISTS idx_posts_date ON posts(date);
CREATE INDEX IF NOT EXISTS idx_posts_type_animal ON posts(type, animal);

CREATE TABLE IF NOT EXISTS outbox_telegram (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    post_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    leased_until INTEGER,
    retries INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    tg_message_id INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (owner_id, post_id)
);

CREATE INDEX IF NOT EXISTS idx_outbox_telegram_claim ON outbox_telegram(status, created_at, id);
CREATE INDEX IF NOT EXISTS idx_outbox_telegram_lease ON outbox_telegram(status, leased_until);

CREATE TABLE IF NOT EXISTS outbox_vk (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    post_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    leased_until INTEGER,
    retries INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    vk_post_id INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (owner_id, post_id)
);

CREATE INDEX IF NOT EXISTS idx_outbox_vk_claim ON outbox_vk(status, created_at, id);
CREATE INDEX IF NOT EXISTS idx_outbox_vk_lease ON outbox_vk(status, leased_until);
"#;
