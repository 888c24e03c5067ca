#![allow(dead_code)]
//! Test doubles and fixtures shared by the integration suites.
//!
//! `ScriptedConnection` records every statement issued and replays canned
//! replies in order, so the suites can assert both the SQL the engine
//! emits and how it consumes results. Drivers are external collaborators;
//! none is exercised here.

use activerow::{Connection, Cx, EntityMeta, Error, Outcome, RelationDef, Row, RowCursor, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One canned reply.
#[derive(Debug)]
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    InsertId(i64),
    Failure(String),
}

/// A connection double driven by a scripted reply queue.
pub struct ScriptedConnection {
    driver: &'static str,
    replies: Mutex<VecDeque<Reply>>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl ScriptedConnection {
    pub fn new(driver: &'static str) -> Self {
        Self {
            driver,
            replies: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_rows(&self, rows: Vec<Row>) -> &Self {
        self.replies.lock().unwrap().push_back(Reply::Rows(rows));
        self
    }

    pub fn reply_affected(&self, n: u64) -> &Self {
        self.replies.lock().unwrap().push_back(Reply::Affected(n));
        self
    }

    pub fn reply_insert_id(&self, id: i64) -> &Self {
        self.replies.lock().unwrap().push_back(Reply::InsertId(id));
        self
    }

    pub fn reply_failure(&self, message: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Failure(message.to_string()));
        self
    }

    /// Every statement issued so far, with its bindings.
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.log
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
    }

    fn next_reply(&self, sql: &str) -> Reply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted reply for: {sql}"))
    }
}

impl Connection for ScriptedConnection {
    type Cursor = ScriptedCursor;

    fn driver_name(&self) -> &str {
        self.driver
    }

    async fn query(&self, _cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        self.record(sql, params);
        match self.next_reply(sql) {
            Reply::Rows(rows) => Outcome::Ok(rows),
            Reply::Failure(message) => Outcome::Err(Error::query(sql, message)),
            other => panic!("query got non-row reply {other:?} for: {sql}"),
        }
    }

    async fn execute(&self, _cx: &Cx, sql: &str, params: &[Value]) -> Outcome<u64, Error> {
        self.record(sql, params);
        match self.next_reply(sql) {
            Reply::Affected(n) => Outcome::Ok(n),
            Reply::Failure(message) => Outcome::Err(Error::query(sql, message)),
            other => panic!("execute got non-affected reply {other:?} for: {sql}"),
        }
    }

    async fn insert(&self, _cx: &Cx, sql: &str, params: &[Value]) -> Outcome<i64, Error> {
        self.record(sql, params);
        match self.next_reply(sql) {
            Reply::InsertId(id) => Outcome::Ok(id),
            Reply::Failure(message) => Outcome::Err(Error::query(sql, message)),
            other => panic!("insert got non-id reply {other:?} for: {sql}"),
        }
    }

    async fn fetch(&self, _cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Self::Cursor, Error> {
        self.record(sql, params);
        match self.next_reply(sql) {
            Reply::Rows(rows) => Outcome::Ok(ScriptedCursor {
                rows: rows.into(),
            }),
            Reply::Failure(message) => Outcome::Err(Error::query(sql, message)),
            other => panic!("fetch got non-row reply {other:?} for: {sql}"),
        }
    }

    async fn begin_transaction(&self, _cx: &Cx) -> Outcome<(), Error> {
        self.record("BEGIN", &[]);
        Outcome::Ok(())
    }

    async fn commit(&self, _cx: &Cx) -> Outcome<(), Error> {
        self.record("COMMIT", &[]);
        Outcome::Ok(())
    }

    async fn roll_back(&self, _cx: &Cx) -> Outcome<(), Error> {
        self.record("ROLLBACK", &[]);
        Outcome::Ok(())
    }
}

/// Forward-only cursor over scripted rows.
pub struct ScriptedCursor {
    rows: VecDeque<Row>,
}

impl RowCursor for ScriptedCursor {
    async fn next_row(&mut self, _cx: &Cx) -> Outcome<Option<Row>, Error> {
        Outcome::Ok(self.rows.pop_front())
    }
}

/// Build a row from column names and values.
pub fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|&c| c.to_string()).collect(), values)
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

// ==================== Fixture schema ====================
//
// users 1-* posts 1-* comments, plus heroes *-* powers through
// hero_powers, and categories as a self-referential tree.

static USER_RELATIONS: [RelationDef; 1] =
    [RelationDef::has_many("posts", posts_meta, "user_id")];

pub static USERS: EntityMeta = EntityMeta::new("users", "id", &["id", "name", "age"])
    .fillable(&["name", "age"])
    .relations(&USER_RELATIONS);

static POST_RELATIONS: [RelationDef; 2] = [
    RelationDef::has_many("comments", comments_meta, "post_id"),
    RelationDef::belongs_to("user", users_meta, "user_id"),
];

pub static POSTS: EntityMeta = EntityMeta::new("posts", "id", &["id", "user_id", "title"])
    .fillable(&["user_id", "title"])
    .relations(&POST_RELATIONS);

pub static COMMENTS: EntityMeta =
    EntityMeta::new("comments", "id", &["id", "post_id", "body"]).fillable(&["post_id", "body"]);

static HERO_RELATIONS: [RelationDef; 1] = [RelationDef::belongs_to_many(
    "powers",
    powers_meta,
    "hero_powers",
    "hero_id",
    "power_id",
)];

pub static HEROES: EntityMeta = EntityMeta::new("heroes", "id", &["id", "name"])
    .fillable(&["name"])
    .relations(&HERO_RELATIONS);

pub static POWERS: EntityMeta = EntityMeta::new("powers", "id", &["id", "name"]);

pub fn users_meta() -> &'static EntityMeta {
    &USERS
}

pub fn posts_meta() -> &'static EntityMeta {
    &POSTS
}

pub fn comments_meta() -> &'static EntityMeta {
    &COMMENTS
}

pub fn powers_meta() -> &'static EntityMeta {
    &POWERS
}

pub struct User;

impl activerow::Entity for User {
    fn meta() -> &'static EntityMeta {
        &USERS
    }
}

pub struct Hero;

impl activerow::Entity for Hero {
    fn meta() -> &'static EntityMeta {
        &HEROES
    }
}
