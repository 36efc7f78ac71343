//! Application workflow: apply → waiting → accepted (or rejected), and the
//! per-game chat that carries it. Every multi-statement step runs in one
//! transaction.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use tavern_types::models::Participation;

use crate::Database;
use crate::models::{
    AcceptOutcome, ApplyOutcome, ChatMessageRow, GameRow, ParticipantRow, PostMessageOutcome,
    RejectOutcome,
};
use crate::queries::{query_game, query_roles};

impl Database {
    pub fn apply_for_game(&self, game_id: i64, user_id: i64, message: &str) -> Result<ApplyOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(game) = query_game(&tx, game_id)? else {
                return Ok(ApplyOutcome::GameNotFound);
            };
            if game.gm_id == user_id {
                return Ok(ApplyOutcome::OwnGame);
            }
            if !query_roles(&tx, user_id)?.is_player() {
                return Ok(ApplyOutcome::NotPlayer);
            }
            if query_participation(&tx, &game, user_id)? != Participation::Outsider {
                return Ok(ApplyOutcome::AlreadyApplied);
            }

            let chatroom_id = ensure_chatroom(&tx, game_id)?;
            tx.execute(
                "INSERT INTO waiting_for_accept (chatroom_id, user_id) VALUES (?1, ?2)",
                (chatroom_id, user_id),
            )?;
            insert_message(&tx, chatroom_id, user_id, message)?;
            tx.commit()?;

            info!(game_id, user_id, chatroom_id, "Application received");
            Ok(ApplyOutcome::Applied { chatroom_id })
        })
    }

    /// `None` when the game doesn't exist.
    pub fn participation(&self, game_id: i64, user_id: i64) -> Result<Option<Participation>> {
        self.with_conn(|conn| match query_game(conn, game_id)? {
            Some(game) => Ok(Some(query_participation(conn, &game, user_id)?)),
            None => Ok(None),
        })
    }

    pub fn post_message(&self, game_id: i64, user_id: i64, message: &str) -> Result<PostMessageOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(game) = query_game(&tx, game_id)? else {
                return Ok(PostMessageOutcome::GameNotFound);
            };
            if !query_participation(&tx, &game, user_id)?.can_chat() {
                return Ok(PostMessageOutcome::NotAllowed);
            }

            // The GM may speak before anyone has applied.
            let chatroom_id = ensure_chatroom(&tx, game_id)?;
            insert_message(&tx, chatroom_id, user_id, message)?;
            tx.commit()?;
            Ok(PostMessageOutcome::Posted)
        })
    }

    /// Newest first.
    pub fn get_chat_messages(&self, game_id: i64) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.chatroom_id, m.user_id, u.name, m.message, m.timestamp
                 FROM chat_messages m
                 JOIN chat_rooms c ON c.id = m.chatroom_id
                 JOIN users u ON u.id = m.user_id
                 WHERE c.game_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC",
            )?;

            let rows = stmt
                .query_map([game_id], |row| {
                    Ok(ChatMessageRow {
                        id: row.get(0)?,
                        chatroom_id: row.get(1)?,
                        user_id: row.get(2)?,
                        author_name: row.get(3)?,
                        message: row.get(4)?,
                        timestamp: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn waiting_list(&self, game_id: i64) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| query_participants(conn, "waiting_for_accept", game_id))
    }

    pub fn members(&self, game_id: i64) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| query_participants(conn, "users_in_chat", game_id))
    }

    /// Move an applicant from the waiting queue into the game.
    pub fn accept_applicant(&self, game_id: i64, gm_id: i64, user_id: i64) -> Result<AcceptOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(game) = query_game(&tx, game_id)? else {
                return Ok(AcceptOutcome::GameNotFound);
            };
            if game.gm_id != gm_id {
                return Ok(AcceptOutcome::NotGm);
            }
            let Some(chatroom_id) = find_chatroom(&tx, game_id)? else {
                return Ok(AcceptOutcome::NotWaiting);
            };
            if !is_in(&tx, "waiting_for_accept", chatroom_id, user_id)? {
                return Ok(AcceptOutcome::NotWaiting);
            }
            if game.accepted_players >= game.max_players {
                return Ok(AcceptOutcome::GameFull);
            }

            tx.execute(
                "DELETE FROM waiting_for_accept WHERE chatroom_id = ?1 AND user_id = ?2",
                (chatroom_id, user_id),
            )?;
            tx.execute(
                "INSERT INTO users_in_chat (chatroom_id, user_id) VALUES (?1, ?2)",
                (chatroom_id, user_id),
            )?;
            tx.execute(
                "UPDATE games_posts SET accepted_players = accepted_players + 1 WHERE id = ?1",
                [game_id],
            )?;
            tx.commit()?;

            info!(game_id, user_id, "Applicant accepted");
            Ok(AcceptOutcome::Accepted)
        })
    }

    /// Drop a pending application. The user is free to apply again.
    pub fn reject_applicant(&self, game_id: i64, gm_id: i64, user_id: i64) -> Result<RejectOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(game) = query_game(&tx, game_id)? else {
                return Ok(RejectOutcome::GameNotFound);
            };
            if game.gm_id != gm_id {
                return Ok(RejectOutcome::NotGm);
            }
            let Some(chatroom_id) = find_chatroom(&tx, game_id)? else {
                return Ok(RejectOutcome::NotWaiting);
            };

            let removed = tx.execute(
                "DELETE FROM waiting_for_accept WHERE chatroom_id = ?1 AND user_id = ?2",
                (chatroom_id, user_id),
            )?;
            if removed == 0 {
                return Ok(RejectOutcome::NotWaiting);
            }
            tx.commit()?;

            info!(game_id, user_id, "Applicant rejected");
            Ok(RejectOutcome::Rejected)
        })
    }
}

fn query_participation(conn: &Connection, game: &GameRow, user_id: i64) -> Result<Participation> {
    if game.gm_id == user_id {
        return Ok(Participation::Gm);
    }
    let Some(chatroom_id) = find_chatroom(conn, game.id)? else {
        return Ok(Participation::Outsider);
    };
    if is_in(conn, "users_in_chat", chatroom_id, user_id)? {
        return Ok(Participation::Member);
    }
    if is_in(conn, "waiting_for_accept", chatroom_id, user_id)? {
        return Ok(Participation::Waiting);
    }
    Ok(Participation::Outsider)
}

fn find_chatroom(conn: &Connection, game_id: i64) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM chat_rooms WHERE game_id = ?1", [game_id], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn ensure_chatroom(conn: &Connection, game_id: i64) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO chat_rooms (game_id) VALUES (?1)", [game_id])?;
    let id = conn.query_row("SELECT id FROM chat_rooms WHERE game_id = ?1", [game_id], |row| row.get(0))?;
    Ok(id)
}

fn insert_message(conn: &Connection, chatroom_id: i64, user_id: i64, message: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO chat_messages (chatroom_id, user_id, message) VALUES (?1, ?2, ?3)",
        (chatroom_id, user_id, message),
    )?;
    Ok(())
}

/// `table` is one of the two membership tables; never user input.
fn is_in(conn: &Connection, table: &str, chatroom_id: i64, user_id: i64) -> Result<bool> {
    let found = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE chatroom_id = ?1 AND user_id = ?2)"),
        (chatroom_id, user_id),
        |row| row.get(0),
    )?;
    Ok(found)
}

fn query_participants(conn: &Connection, table: &str, game_id: i64) -> Result<Vec<ParticipantRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.name
         FROM {table} p
         JOIN chat_rooms c ON c.id = p.chatroom_id
         JOIN users u ON u.id = p.user_id
         WHERE c.game_id = ?1
         ORDER BY p.id"
    ))?;

    let rows = stmt
        .query_map([game_id], |row| {
            Ok(ParticipantRow {
                user_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tests::{post_game, register};
    use tavern_types::models::Roles;

    fn player(db: &Database, name: &str) -> i64 {
        let id = register(db, name);
        db.set_preferences(id, Roles::from_flags(true, false)).unwrap();
        id
    }

    fn gm(db: &Database, name: &str) -> i64 {
        let id = register(db, name);
        db.set_preferences(id, Roles::from_flags(true, true)).unwrap();
        id
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?)).unwrap()
    }

    #[test]
    fn application_creates_room_queue_entry_and_message() {
        let db = Database::open_in_memory().unwrap();
        let gm = gm(&db, "gm");
        let pippin = player(&db, "pippin");
        let game = post_game(&db, gm, 4);

        let outcome = db.apply_for_game(game, pippin, "Mogę dołączyć?").unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));

        assert_eq!(db.participation(game, pippin).unwrap(), Some(Participation::Waiting));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM chat_rooms"), 1);
        let messages = db.get_chat_messages(game).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].author_name, "pippin");
    }

    #[test]
    fn gm_cannot_apply_to_own_game() {
        let db = Database::open_in_memory().unwrap();
        let gm = gm(&db, "gm");
        let game = post_game(&db, gm, 4);

        assert_eq!(db.apply_for_game(game, gm, "hej").unwrap(), ApplyOutcome::OwnGame);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM chat_rooms"), 0);
    }

    #[test]
    fn second_application_rejected() {
        let db = Database::open_in_memory().unwrap();
        let gm = gm(&db, "gm");
        let merry = player(&db, "merry");
        let game = post_game(&db, gm, 4);

        db.apply_for_game(game, merry, "raz").unwrap();
        assert_eq!(db.apply_for_game(game, merry, "dwa").unwrap(), ApplyOutcome::AlreadyApplied);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM waiting_for_accept"), 1);
        assert_eq!(db.get_chat_messages(game).unwrap().len(), 1);
    }

    #[test]
    fn only_players_apply() {
        let db = Database::open_in_memory().unwrap();
        let gm = gm(&db, "gm");
        let nobody = register(&db, "nobody");
        let game = post_game(&db, gm, 4);

        assert_eq!(db.apply_for_game(game, nobody, "hej").unwrap(), ApplyOutcome::NotPlayer);
        assert_eq!(db.apply_for_game(999, nobody, "hej").unwrap(), ApplyOutcome::GameNotFound);
    }

    #[test]
    fn accept_moves_applicant_and_respects_cap() {
        let db = Database::open_in_memory().unwrap();
        let gm = gm(&db, "gm");
        let sam = player(&db, "sam");
        let rosie = player(&db, "rosie");
        let game = post_game(&db, gm, 1);

        db.apply_for_game(game, sam, "1").unwrap();
        db.apply_for_game(game, rosie, "2").unwrap();

        assert_eq!(db.accept_applicant(game, sam, rosie).unwrap(), AcceptOutcome::NotGm);
        assert_eq!(db.accept_applicant(game, gm, sam).unwrap(), AcceptOutcome::Accepted);
        assert_eq!(db.participation(game, sam).unwrap(), Some(Participation::Member));
        assert_eq!(db.get_game(game).unwrap().unwrap().accepted_players, 1);

        assert_eq!(db.accept_applicant(game, gm, rosie).unwrap(), AcceptOutcome::GameFull);
        assert_eq!(db.participation(game, rosie).unwrap(), Some(Participation::Waiting));

        assert_eq!(db.accept_applicant(game, gm, sam).unwrap(), AcceptOutcome::NotWaiting);
        assert_eq!(db.apply_for_game(game, sam, "znowu").unwrap(), ApplyOutcome::AlreadyApplied);

        let members: Vec<i64> = db.members(game).unwrap().iter().map(|p| p.user_id).collect();
        assert_eq!(members, vec![sam]);
        let waiting: Vec<i64> = db.waiting_list(game).unwrap().iter().map(|p| p.user_id).collect();
        assert_eq!(waiting, vec![rosie]);
    }

    #[test]
    fn rejected_applicant_may_reapply() {
        let db = Database::open_in_memory().unwrap();
        let gm = gm(&db, "gm");
        let lobelia = player(&db, "lobelia");
        let game = post_game(&db, gm, 3);

        db.apply_for_game(game, lobelia, "proszę").unwrap();
        assert_eq!(db.reject_applicant(game, gm, lobelia).unwrap(), RejectOutcome::Rejected);
        assert_eq!(db.participation(game, lobelia).unwrap(), Some(Participation::Outsider));
        assert_eq!(db.reject_applicant(game, gm, lobelia).unwrap(), RejectOutcome::NotWaiting);

        let again = db.apply_for_game(game, lobelia, "jeszcze raz").unwrap();
        assert!(matches!(again, ApplyOutcome::Applied { .. }));
    }

    #[test]
    fn chat_closed_to_outsiders_and_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let gm = gm(&db, "gm");
        let fatty = player(&db, "fatty");
        let outsider = player(&db, "outsider");
        let game = post_game(&db, gm, 3);

        assert_eq!(db.post_message(game, gm, "Witajcie").unwrap(), PostMessageOutcome::Posted);
        db.apply_for_game(game, fatty, "Cześć").unwrap();
        assert_eq!(db.post_message(game, outsider, "psst").unwrap(), PostMessageOutcome::NotAllowed);
        assert_eq!(db.post_message(404, gm, "?").unwrap(), PostMessageOutcome::GameNotFound);

        let texts: Vec<String> = db
            .get_chat_messages(game)
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, vec!["Cześć".to_string(), "Witajcie".to_string()]);
    }
}
