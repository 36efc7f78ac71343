use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                name                TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                hash                TEXT NOT NULL,
                filled_preferences  INTEGER NOT NULL DEFAULT 0,
                registered_at       TEXT NOT NULL DEFAULT (datetime('now')),
                last_login          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE players (
                user_id     INTEGER PRIMARY KEY REFERENCES users(id)
            );

            CREATE TABLE gms (
                user_id     INTEGER PRIMARY KEY REFERENCES users(id)
            );

            CREATE TABLE systems (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL UNIQUE,
                abbreviation    TEXT
            );

            CREATE TABLE games_posts (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                title               TEXT NOT NULL,
                system_id           INTEGER NOT NULL REFERENCES systems(id),
                max_players         INTEGER NOT NULL CHECK (max_players > 0),
                description         TEXT,
                gm_id               INTEGER NOT NULL REFERENCES users(id),
                accepted_players    INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (accepted_players BETWEEN 0 AND max_players)
            );

            CREATE INDEX idx_games_posts_gm ON games_posts(gm_id);

            CREATE TABLE chat_rooms (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id     INTEGER NOT NULL UNIQUE REFERENCES games_posts(id)
            );

            CREATE TABLE chat_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                chatroom_id INTEGER NOT NULL REFERENCES chat_rooms(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                message     TEXT NOT NULL,
                timestamp   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_chat_messages_room
                ON chat_messages(chatroom_id, timestamp);

            CREATE TABLE users_in_chat (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                chatroom_id INTEGER NOT NULL REFERENCES chat_rooms(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                UNIQUE(chatroom_id, user_id)
            );

            CREATE TABLE waiting_for_accept (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                chatroom_id INTEGER NOT NULL REFERENCES chat_rooms(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                UNIQUE(chatroom_id, user_id)
            );

            -- Reference data for the post-game form
            INSERT INTO systems (title, abbreviation) VALUES
                ('Dungeons & Dragons 5e', 'D&D 5e'),
                ('Warhammer Fantasy Roleplay 4e', 'WFRP'),
                ('Zew Cthulhu 7e', 'CoC'),
                ('Pathfinder 2e', 'PF2e'),
                ('Wampir: Maskarada', 'VtM'),
                ('Neuroshima', NULL);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
