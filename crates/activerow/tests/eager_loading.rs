//! Batched eager loading: one query per relation level, no N+1.

mod support;

use activerow::prelude::*;
use asupersync::runtime::RuntimeBuilder;
use support::{Hero, POSTS, ScriptedConnection, User, row, unwrap_outcome};

fn run<F: std::future::Future>(f: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(f)
}

fn user_row(id: i64, name: &str) -> Row {
    row(
        &["id", "name", "age"],
        vec![Value::Int(id), Value::Text(name.into()), Value::Int(30)],
    )
}

fn post_row(id: i64, user_id: i64, title: &str) -> Row {
    row(
        &["id", "user_id", "title"],
        vec![Value::Int(id), Value::Int(user_id), Value::Text(title.into())],
    )
}

fn comment_row(id: i64, post_id: i64, body: &str) -> Row {
    row(
        &["id", "post_id", "body"],
        vec![Value::Int(id), Value::Int(post_id), Value::Text(body.into())],
    )
}

fn many<'a>(record: &'a Record, name: &str) -> &'a [Record] {
    match record.relation(name) {
        Some(RelationValue::Many(records)) => records,
        other => panic!("expected loaded collection for '{name}', got {other:?}"),
    }
}

#[test]
fn nested_path_issues_one_query_per_level() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![user_row(1, "a"), user_row(2, "b"), user_row(3, "c")]);
    conn.reply_rows(vec![
        post_row(10, 1, "first"),
        post_row(11, 1, "second"),
        post_row(12, 3, "third"),
    ]);
    conn.reply_rows(vec![
        comment_row(100, 10, "nice"),
        comment_row(101, 10, "agreed"),
        comment_row(102, 12, "hm"),
    ]);

    let users = run(async {
        unwrap_outcome(
            User::query_on(&conn)
                .embed("posts.comments")
                .get(&cx, &conn)
                .await,
        )
    });

    // Three parents, two relation levels: exactly three statements total,
    // regardless of how many parents there are.
    let statements = conn.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(statements[0].0, "SELECT * FROM users");
    assert_eq!(
        statements[1].0,
        "SELECT * FROM posts WHERE user_id IN (?, ?, ?)"
    );
    assert_eq!(
        statements[1].1,
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
    assert_eq!(
        statements[2].0,
        "SELECT * FROM comments WHERE post_id IN (?, ?, ?)"
    );
    assert_eq!(
        statements[2].1,
        vec![Value::Int(10), Value::Int(11), Value::Int(12)]
    );

    // Each parent got its slice.
    let first = users.get(0).unwrap();
    let posts = many(first, "posts");
    assert_eq!(posts.len(), 2);
    assert_eq!(many(&posts[0], "comments").len(), 2);
    assert_eq!(many(&posts[1], "comments").len(), 0);

    let second = users.get(1).unwrap();
    assert_eq!(many(second, "posts").len(), 0);

    let third = users.get(2).unwrap();
    let third_posts = many(third, "posts");
    assert_eq!(third_posts.len(), 1);
    assert_eq!(many(&third_posts[0], "comments").len(), 1);
}

#[test]
fn belongs_to_batches_by_distinct_owner_keys() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    // Two posts share an owner, one is orphaned (NULL user_id).
    conn.reply_rows(vec![
        post_row(10, 1, "x"),
        post_row(11, 1, "y"),
        row(
            &["id", "user_id", "title"],
            vec![Value::Int(12), Value::Null, Value::Text("orphan".into())],
        ),
    ]);
    conn.reply_rows(vec![user_row(1, "owner")]);

    let posts = run(async {
        unwrap_outcome(
            Query::new(&POSTS)
                .with_dialect(Dialect::Mysql)
                .embed("user")
                .get(&cx, &conn)
                .await,
        )
    });

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    // Distinct keys only: the shared owner appears once, NULL is skipped.
    assert_eq!(statements[1].0, "SELECT * FROM users WHERE id IN (?)");
    assert_eq!(statements[1].1, vec![Value::Int(1)]);

    for i in 0..2 {
        match posts.get(i).unwrap().relation("user") {
            Some(RelationValue::One(Some(owner))) => {
                assert_eq!(owner.get("name"), Some(&Value::Text("owner".into())));
            }
            other => panic!("expected loaded owner, got {other:?}"),
        }
    }
    match posts.get(2).unwrap().relation("user") {
        Some(RelationValue::One(None)) => {}
        other => panic!("expected empty owner slot, got {other:?}"),
    }
}

#[test]
fn many_to_many_loads_through_pivot_and_attaches_pivot_rows() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![
        row(&["id", "name"], vec![Value::Int(1), Value::Text("a".into())]),
        row(&["id", "name"], vec![Value::Int(2), Value::Text("b".into())]),
    ]);
    conn.reply_rows(vec![
        row(
            &["id", "name", "pivot_hero_id", "pivot_power_id"],
            vec![
                Value::Int(7),
                Value::Text("Flight".into()),
                Value::Int(1),
                Value::Int(7),
            ],
        ),
        row(
            &["id", "name", "pivot_hero_id", "pivot_power_id"],
            vec![
                Value::Int(7),
                Value::Text("Flight".into()),
                Value::Int(2),
                Value::Int(7),
            ],
        ),
        row(
            &["id", "name", "pivot_hero_id", "pivot_power_id"],
            vec![
                Value::Int(8),
                Value::Text("Invisibility".into()),
                Value::Int(1),
                Value::Int(8),
            ],
        ),
    ]);

    let heroes = run(async {
        unwrap_outcome(Hero::query_on(&conn).embed("powers").get(&cx, &conn).await)
    });

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[1].0,
        "SELECT powers.*, hero_powers.hero_id AS pivot_hero_id, \
         hero_powers.power_id AS pivot_power_id FROM powers \
         INNER JOIN hero_powers ON hero_powers.power_id = powers.id \
         WHERE hero_powers.hero_id IN (?, ?)"
    );

    let first_powers = many(heroes.get(0).unwrap(), "powers");
    assert_eq!(first_powers.len(), 2);
    // Pivot columns are detached into the sub-object, not left as
    // attributes.
    assert_eq!(first_powers[0].get("pivot_hero_id"), None);
    let pivot = first_powers[0].pivot().unwrap();
    assert_eq!(pivot.get("hero_id"), Some(&Value::Int(1)));
    assert_eq!(pivot.get("power_id"), Some(&Value::Int(7)));

    assert_eq!(many(heroes.get(1).unwrap(), "powers").len(), 1);
}

#[test]
fn embed_count_attaches_synthetic_attribute() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![user_row(1, "a"), user_row(2, "b")]);
    conn.reply_rows(vec![row(
        &["group_key", "aggregate"],
        vec![Value::Int(1), Value::Int(3)],
    )]);

    let users = run(async {
        unwrap_outcome(
            User::query_on(&conn)
                .embed_count("posts")
                .get(&cx, &conn)
                .await,
        )
    });

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[1].0,
        "SELECT user_id AS group_key, COUNT(*) AS aggregate FROM posts \
         WHERE user_id IN (?, ?) GROUP BY user_id"
    );

    assert_eq!(
        users.get(0).unwrap().get("posts_count"),
        Some(&Value::Int(3))
    );
    // Parents with no related rows get an explicit zero.
    assert_eq!(
        users.get(1).unwrap().get("posts_count"),
        Some(&Value::Int(0))
    );
}

#[test]
fn embed_with_constraint_narrows_the_batched_query() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![user_row(1, "a")]);
    conn.reply_rows(vec![post_row(10, 1, "published")]);

    run(async {
        unwrap_outcome(
            User::query_on(&conn)
                .embed_with("posts", |q| q.filter("title", "=", "published"))
                .get(&cx, &conn)
                .await,
        )
    });

    let statements = conn.statements();
    assert_eq!(
        statements[1].0,
        "SELECT * FROM posts WHERE user_id IN (?) AND title = ?"
    );
    assert_eq!(
        statements[1].1,
        vec![Value::Int(1), Value::Text("published".into())]
    );
}

#[test]
fn unknown_relation_path_fails_with_unresolved_relationship() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![user_row(1, "a")]);

    run(async {
        let outcome = User::query_on(&conn).embed("sidekicks").get(&cx, &conn).await;
        match outcome {
            Outcome::Err(Error::UnresolvedRelationship(e)) => {
                assert_eq!(e.entity, "users");
                assert_eq!(e.relation, "sidekicks");
            }
            other => panic!("expected unresolved relationship, got {other:?}"),
        }
    });
}

#[test]
fn empty_parent_set_skips_the_batch_query() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![]);

    let users = run(async {
        unwrap_outcome(User::query_on(&conn).embed("posts").get(&cx, &conn).await)
    });

    assert!(users.is_empty());
    assert_eq!(conn.statement_count(), 1);
}

#[test]
fn present_filter_compiles_to_correlated_exists() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![user_row(1, "a")]);

    run(async {
        let q = User::query_on(&conn).present("posts").unwrap();
        unwrap_outcome(q.get(&cx, &conn).await);
    });

    assert_eq!(
        conn.statements()[0].0,
        "SELECT * FROM users WHERE EXISTS \
         (SELECT 1 FROM posts WHERE posts.user_id = users.id)"
    );
}

#[test]
fn linked_filter_renders_constraint_inside_subquery() {
    let cx = Cx::for_testing();
    let conn = ScriptedConnection::new("mysql");
    conn.reply_rows(vec![]);

    run(async {
        let q = User::query_on(&conn)
            .linked("posts", |sub| sub.filter("title", "=", "x"))
            .unwrap();
        unwrap_outcome(q.get(&cx, &conn).await);
    });

    let statements = conn.statements();
    assert_eq!(
        statements[0].0,
        "SELECT * FROM users WHERE EXISTS \
         (SELECT 1 FROM posts WHERE posts.user_id = users.id AND (title = ?))"
    );
    assert_eq!(statements[0].1, vec![Value::Text("x".into())]);
}
