use anyhow::Result;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Params, Row};
use tracing::info;

use tavern_types::models::{Role, Roles};

use crate::Database;
use crate::models::{
    CreateGameOutcome, CreateUserOutcome, GameRow, LoginColumn, NewGame, SystemRow, UserRow,
};

const USER_COLUMNS: &str =
    "id, name, email, hash, filled_preferences, registered_at, last_login";

pub(crate) const GAME_SELECT: &str = "
    SELECT g.id, g.title, g.system_id, s.title, s.abbreviation, g.max_players,
           g.accepted_players, g.description, g.gm_id, u.name, g.created_at
    FROM games_posts g
    JOIN systems s ON s.id = g.system_id
    JOIN users u ON u.id = g.gm_id";

impl Database {
    // -- Users --

    pub fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<CreateUserOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE name = ?1 OR email = ?2)",
                (name, email),
                |row| row.get(0),
            )?;
            if taken {
                return Ok(CreateUserOutcome::Duplicate);
            }

            let inserted = tx.execute(
                "INSERT INTO users (name, email, hash, filled_preferences) VALUES (?1, ?2, ?3, 0)",
                (name, email, password_hash),
            );
            match inserted {
                Ok(_) => {
                    let id = tx.last_insert_rowid();
                    tx.commit()?;
                    info!(user_id = id, name, "User registered");
                    Ok(CreateUserOutcome::Created(id))
                }
                // Unique indexes still guard writers outside this connection.
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(CreateUserOutcome::Duplicate)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_login(&self, column: LoginColumn, value: &str) -> Result<Option<UserRow>> {
        let sql = match column {
            LoginColumn::Name => format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
            LoginColumn::Email => format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        };
        self.with_conn(|conn| {
            let row = conn.query_row(&sql, [value], map_user).optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"), [id], map_user)
                .optional()?;
            Ok(row)
        })
    }

    pub fn update_last_login(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET last_login = datetime('now') WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Roles --

    pub fn get_roles(&self, user_id: i64) -> Result<Roles> {
        self.with_conn(|conn| query_roles(conn, user_id))
    }

    /// Grant the selected roles and mark the questionnaire as filled.
    /// Roles already held stay as they are; nothing is ever revoked.
    /// Returns the full set the user holds afterwards.
    pub fn set_preferences(&self, user_id: i64, selected: Roles) -> Result<Roles> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for role in selected.iter() {
                let sql = match role {
                    Role::Player => "INSERT OR IGNORE INTO players (user_id) VALUES (?1)",
                    Role::Gm => "INSERT OR IGNORE INTO gms (user_id) VALUES (?1)",
                };
                tx.execute(sql, [user_id])?;
            }
            tx.execute("UPDATE users SET filled_preferences = 1 WHERE id = ?1", [user_id])?;
            let roles = query_roles(&tx, user_id)?;
            tx.commit()?;
            Ok(roles)
        })
    }

    // -- Systems --

    pub fn get_systems(&self) -> Result<Vec<SystemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, title, abbreviation FROM systems ORDER BY title")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SystemRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        abbreviation: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Games --

    pub fn create_game(&self, game: &NewGame) -> Result<CreateGameOutcome> {
        self.with_conn(|conn| {
            let known: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM systems WHERE id = ?1)",
                [game.system_id],
                |row| row.get(0),
            )?;
            if !known {
                return Ok(CreateGameOutcome::UnknownSystem);
            }

            conn.execute(
                "INSERT INTO games_posts (title, system_id, max_players, description, gm_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    game.title,
                    game.system_id,
                    game.max_players,
                    game.description,
                    game.gm_id
                ],
            )?;
            let id = conn.last_insert_rowid();
            info!(game_id = id, gm_id = game.gm_id, "Game posted: {}", game.title);
            Ok(CreateGameOutcome::Created(id))
        })
    }

    pub fn list_games(&self) -> Result<Vec<GameRow>> {
        self.with_conn(|conn| query_games(conn, "ORDER BY g.id DESC", []))
    }

    pub fn get_game(&self, id: i64) -> Result<Option<GameRow>> {
        self.with_conn(|conn| query_game(conn, id))
    }

    pub fn games_by_gm(&self, gm_id: i64) -> Result<Vec<GameRow>> {
        self.with_conn(|conn| query_games(conn, "WHERE g.gm_id = ?1 ORDER BY g.id DESC", [gm_id]))
    }

    /// Games the user was accepted into.
    pub fn games_joined(&self, user_id: i64) -> Result<Vec<GameRow>> {
        self.with_conn(|conn| {
            query_games(
                conn,
                "JOIN chat_rooms c ON c.game_id = g.id
                 JOIN users_in_chat m ON m.chatroom_id = c.id
                 WHERE m.user_id = ?1 ORDER BY g.id DESC",
                [user_id],
            )
        })
    }

    /// Games the user applied to and is still waiting on.
    pub fn games_pending(&self, user_id: i64) -> Result<Vec<GameRow>> {
        self.with_conn(|conn| {
            query_games(
                conn,
                "JOIN chat_rooms c ON c.game_id = g.id
                 JOIN waiting_for_accept w ON w.chatroom_id = c.id
                 WHERE w.user_id = ?1 ORDER BY g.id DESC",
                [user_id],
            )
        })
    }
}

pub(crate) fn query_roles(conn: &Connection, user_id: i64) -> Result<Roles> {
    let (player, gm) = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM players WHERE user_id = ?1),
                EXISTS(SELECT 1 FROM gms WHERE user_id = ?1)",
        [user_id],
        |row| Ok((row.get::<_, bool>(0)?, row.get::<_, bool>(1)?)),
    )?;
    Ok(Roles::from_flags(player, gm))
}

pub(crate) fn query_game(conn: &Connection, id: i64) -> Result<Option<GameRow>> {
    let row = conn
        .query_row(&format!("{GAME_SELECT} WHERE g.id = ?1"), [id], map_game)
        .optional()?;
    Ok(row)
}

fn query_games<P: Params>(conn: &Connection, tail: &str, params: P) -> Result<Vec<GameRow>> {
    let mut stmt = conn.prepare(&format!("{GAME_SELECT} {tail}"))?;
    let rows = stmt
        .query_map(params, map_game)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        hash: row.get(3)?,
        filled_preferences: row.get(4)?,
        registered_at: row.get(5)?,
        last_login: row.get(6)?,
    })
}

fn map_game(row: &Row<'_>) -> rusqlite::Result<GameRow> {
    Ok(GameRow {
        id: row.get(0)?,
        title: row.get(1)?,
        system_id: row.get(2)?,
        system_title: row.get(3)?,
        system_abbreviation: row.get(4)?,
        max_players: row.get(5)?,
        accepted_players: row.get(6)?,
        description: row.get(7)?,
        gm_id: row.get(8)?,
        gm_name: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn register(db: &Database, name: &str) -> i64 {
        match db.create_user(name, &format!("{name}@example.com"), "$argon2id$fake").unwrap() {
            CreateUserOutcome::Created(id) => id,
            CreateUserOutcome::Duplicate => panic!("{name} already registered"),
        }
    }

    pub(crate) fn post_game(db: &Database, gm_id: i64, max_players: i64) -> i64 {
        let system_id = db.get_systems().unwrap()[0].id;
        let game = NewGame {
            title: "Kopalnia Phandelver".into(),
            system_id,
            max_players,
            description: Some("Sesja dla początkujących".into()),
            gm_id,
        };
        match db.create_game(&game).unwrap() {
            CreateGameOutcome::Created(id) => id,
            CreateGameOutcome::UnknownSystem => panic!("seed systems missing"),
        }
    }

    #[test]
    fn duplicate_name_or_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        register(&db, "bilbo");

        let same_name = db.create_user("bilbo", "other@example.com", "h").unwrap();
        assert_eq!(same_name, CreateUserOutcome::Duplicate);

        let same_email = db.create_user("baggins", "bilbo@example.com", "h").unwrap();
        assert_eq!(same_email, CreateUserOutcome::Duplicate);
    }

    #[test]
    fn refused_registration_leaves_nothing_behind() {
        let db = Database::open_in_memory().unwrap();
        let first = register(&db, "bilbo");
        assert_eq!(db.create_user("bilbo", "x@example.com", "h").unwrap(), CreateUserOutcome::Duplicate);

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(count, 1);

        // The connection is usable for the next registration straight away.
        assert_eq!(db.create_user("frodo", "frodo@example.com", "h").unwrap(), CreateUserOutcome::Created(first + 1));
    }

    #[test]
    fn user_found_by_either_login_column() {
        let db = Database::open_in_memory().unwrap();
        let id = register(&db, "frodo");

        let by_name = db.get_user_by_login(LoginColumn::Name, "frodo").unwrap().unwrap();
        let by_email = db
            .get_user_by_login(LoginColumn::Email, "frodo@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, id);
        assert_eq!(by_email.id, id);
        assert!(!by_name.filled_preferences);

        assert!(db.get_user_by_login(LoginColumn::Name, "sam").unwrap().is_none());
    }

    #[test]
    fn preferences_insert_roles_exactly_once() {
        let db = Database::open_in_memory().unwrap();
        let id = register(&db, "gandalf");
        assert!(db.get_roles(id).unwrap().is_empty());

        let both = Roles::from_flags(true, true);
        assert_eq!(db.set_preferences(id, both).unwrap(), both);
        // Resubmitting must not fail on the primary keys or duplicate rows.
        assert_eq!(db.set_preferences(id, both).unwrap(), both);

        let counts: (i64, i64) = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM players WHERE user_id = ?1),
                            (SELECT COUNT(*) FROM gms WHERE user_id = ?1)",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!(counts, (1, 1));
        assert!(db.get_user_by_id(id).unwrap().unwrap().filled_preferences);
    }

    #[test]
    fn preferences_never_revoke() {
        let db = Database::open_in_memory().unwrap();
        let id = register(&db, "aragorn");

        db.set_preferences(id, Roles::from_flags(false, true)).unwrap();
        let after = db.set_preferences(id, Roles::from_flags(true, false)).unwrap();
        assert_eq!(after, Roles::from_flags(true, true));
    }

    #[test]
    fn game_requires_known_system() {
        let db = Database::open_in_memory().unwrap();
        let gm = register(&db, "elrond");
        let game = NewGame {
            title: "Rivendell".into(),
            system_id: 9999,
            max_players: 4,
            description: None,
            gm_id: gm,
        };
        assert_eq!(db.create_game(&game).unwrap(), CreateGameOutcome::UnknownSystem);
        assert!(db.list_games().unwrap().is_empty());
    }

    #[test]
    fn games_listed_with_system_and_gm() {
        let db = Database::open_in_memory().unwrap();
        let gm = register(&db, "galadriel");
        let first = post_game(&db, gm, 4);
        let second = post_game(&db, gm, 5);

        let games = db.list_games().unwrap();
        let ids: Vec<i64> = games.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(games[0].gm_name, "galadriel");
        assert_eq!(games[0].accepted_players, 0);

        assert_eq!(db.games_by_gm(gm).unwrap().len(), 2);
        assert!(db.get_game(first).unwrap().is_some());
        assert!(db.get_game(12345).unwrap().is_none());
    }
}
