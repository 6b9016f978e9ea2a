use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::Connection;

use global_password_reset::auth::{authenticate, hash_password, verify_password, Session};
use global_password_reset::db::{self, SqliteUserStore};
use global_password_reset::logger::{AuditEvent, AuditLog};
use global_password_reset::notice::{notice_for, NoticeKind};
use global_password_reset::rotator::*;

const OLD_PASSWORD: &str = "Old-Password-2024!";

struct Site {
    conn: Connection,
    audit: AuditLog,
    admin: UserId,
    bob: UserId,
    carol: UserId,
}

// A: administrator, B and C: editors, all sharing one starting password.
fn site() -> Site {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_user_db(&conn).unwrap();
    let hashed = hash_password(OLD_PASSWORD).unwrap();

    let admin = db::insert_user(&mut conn, "site_admin", &hashed, &["administrator"]).unwrap();
    let bob = db::insert_user(&mut conn, "bob", &hashed, &["editor"]).unwrap();
    let carol = db::insert_user(&mut conn, "carol", &hashed, &["editor"]).unwrap();

    Site { conn, audit: AuditLog::in_memory().unwrap(), admin, bob, carol }
}

fn login(site: &Site) -> Session {
    authenticate(&site.conn, &site.audit, "site_admin", OLD_PASSWORD)
        .unwrap()
        .expect("admin can log in")
}

fn still_has_old_password(conn: &Connection, username: &str) -> bool {
    let row = db::find_login(conn, username).unwrap().unwrap();
    verify_password(OLD_PASSWORD, &row.hashed_password).unwrap()
}

/// Store that refuses writes for one user and delegates the rest.
struct FlakyStore<'a> {
    inner: SqliteUserStore<'a>,
    broken: UserId,
}

impl CredentialStore for FlakyStore<'_> {
    fn set_credential(&self, user: UserId, new_value: &str) -> Result<()> {
        if user == self.broken {
            anyhow::bail!("database is locked");
        }
        self.inner.set_credential(user, new_value)
    }
}

#[test]
fn admin_login_builds_managing_session() {
    let site = site();
    let session = login(&site);
    assert_eq!(session.user_id, site.admin);
    assert!(session.can_manage);
    assert_eq!(session.roles, BTreeSet::from(["administrator".to_string()]));

    let editor = authenticate(&site.conn, &site.audit, "bob", OLD_PASSWORD).unwrap().unwrap();
    assert!(!editor.can_manage);

    assert!(authenticate(&site.conn, &site.audit, "bob", "nope").unwrap().is_none());
    assert!(authenticate(&site.conn, &site.audit, "nobody", "nope").unwrap().is_none());
}

#[test]
fn reset_everyone_but_the_admin() {
    let site = site();
    let session = login(&site);
    let store = SqliteUserStore::new(&site.conn);
    let rotator = Rotator::new(&store, &store, &session).with_audit(&site.audit);

    let report = rotator
        .process(&RotationRequest {
            requester: session.user_id,
            scope: RoleScope::AllRoles,
            confirmed: true,
        })
        .unwrap();

    assert_eq!(
        report.outcome,
        Outcome::Completed(RotationResult { attempted: 2, succeeded: 2, failures: vec![] })
    );
    assert!(still_has_old_password(&site.conn, "site_admin"));
    assert!(!still_has_old_password(&site.conn, "bob"));
    assert!(!still_has_old_password(&site.conn, "carol"));

    let notice = notice_for(&report.outcome);
    assert_eq!(notice.kind, NoticeKind::Success);
    assert_eq!(notice.message, "Success! 2 passwords have been reset.");
}

#[test]
fn editor_scope_targets_editors_only() {
    let mut site = site();
    let dave = db::insert_user(&mut site.conn, "dave", "unused", &["subscriber"]).unwrap();
    let session = login(&site);
    let store = SqliteUserStore::new(&site.conn);
    let rotator = Rotator::new(&store, &store, &session);

    let targets = rotator
        .resolve_targets(session.user_id, &RoleScope::from_keys(["Editor"]))
        .unwrap();
    assert_eq!(targets, BTreeSet::from([site.bob, site.carol]));
    assert!(!targets.contains(&dave));

    let admin_scope = rotator
        .resolve_targets(session.user_id, &RoleScope::from_keys(["administrator", "editor"]))
        .unwrap();
    assert!(!admin_scope.contains(&site.admin));
}

#[test]
fn lone_admin_gets_no_users() {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_user_db(&conn).unwrap();
    let hashed = hash_password(OLD_PASSWORD).unwrap();
    db::insert_user(&mut conn, "site_admin", &hashed, &["administrator"]).unwrap();
    let audit = AuditLog::in_memory().unwrap();

    let session = authenticate(&conn, &audit, "site_admin", OLD_PASSWORD).unwrap().unwrap();
    let store = SqliteUserStore::new(&conn);
    let rotator = Rotator::new(&store, &store, &session).with_audit(&audit);

    let report = rotator
        .process(&RotationRequest {
            requester: session.user_id,
            scope: RoleScope::AllRoles,
            confirmed: true,
        })
        .unwrap();
    assert_eq!(report.outcome, Outcome::Rejected(RejectReason::NoUsers));

    let events = audit.events_for_run(&report.run_id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, AuditEvent::RotationRejected);
    assert_eq!(events[0].detail.as_deref(), Some("users"));
}

#[test]
fn one_broken_write_does_not_stop_the_batch() {
    let site = site();
    let session = login(&site);
    let directory = SqliteUserStore::new(&site.conn);
    let store = FlakyStore { inner: SqliteUserStore::new(&site.conn), broken: site.carol };
    let rotator = Rotator::new(&directory, &store, &session);

    let report = rotator
        .process(&RotationRequest {
            requester: session.user_id,
            scope: RoleScope::from_keys(["editor"]),
            confirmed: true,
        })
        .unwrap();

    let Outcome::Completed(result) = report.outcome else {
        panic!("expected a completed rotation");
    };
    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].0, site.carol);
    assert!(matches!(result.failures[0].1, FailureCause::CredentialStoreFailure(_)));

    assert!(!still_has_old_password(&site.conn, "bob"));
    assert!(still_has_old_password(&site.conn, "carol"));
}

#[test]
fn unconfirmed_request_changes_nothing() {
    let site = site();
    let session = login(&site);
    let store = SqliteUserStore::new(&site.conn);
    let rotator = Rotator::new(&store, &store, &session);

    let report = rotator
        .process(&RotationRequest {
            requester: session.user_id,
            scope: RoleScope::Roles(BTreeSet::new()),
            confirmed: false,
        })
        .unwrap();
    assert_eq!(report.outcome, Outcome::Rejected(RejectReason::MissingConfirmation));
    assert!(still_has_old_password(&site.conn, "bob"));
}

#[test]
fn editors_cannot_run_a_reset() {
    let site = site();
    let editor = authenticate(&site.conn, &site.audit, "bob", OLD_PASSWORD).unwrap().unwrap();
    let store = SqliteUserStore::new(&site.conn);
    let rotator = Rotator::new(&store, &store, &editor);

    let denied = rotator
        .process(&RotationRequest {
            requester: editor.user_id,
            scope: RoleScope::AllRoles,
            confirmed: true,
        })
        .unwrap_err();
    assert_eq!(denied.user, site.bob);
    assert!(still_has_old_password(&site.conn, "site_admin"));
}
