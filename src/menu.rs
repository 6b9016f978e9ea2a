use anyhow::{Context, Result};
use rpassword::read_password;
use rusqlite::Connection;
use std::io::{self, Write};
use zeroize::Zeroizing;

use crate::auth::{self, Session};
use crate::config::Config;
use crate::db::{self, SqliteUserStore};
use crate::function::{is_affirmative, prompt_input, prompt_line, wait_for_enter};
use crate::logger::AuditLog;
use crate::notice::{notice_for, Notice, NoticeKind};
use crate::rotator::{RoleInfo, RoleScope, RotationRequest, Rotator};
use crate::ui;

const RECENT_ACTIVITY_LIMIT: usize = 20;

/// Turn the role prompt answer into a scope. `all` means no filter; numbers
/// pick from the listed roles; anything else is taken as a role key.
pub fn parse_role_selection(input: &str, roles: &[RoleInfo]) -> RoleScope {
    if input.trim().eq_ignore_ascii_case("all") {
        return RoleScope::AllRoles;
    }

    let keys = input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|token| match token.parse::<usize>() {
            Ok(n) => roles.get(n.wrapping_sub(1)).map(|r| r.key.clone()),
            Err(_) => Some(token.to_string()),
        });
    RoleScope::from_keys(keys)
}

// ===============================================================
//                      FIRST ADMINISTRATOR
// ===============================================================
pub fn create_first_admin(conn: &mut Connection) -> Result<bool> {
    ui::first_run_ui();

    let Some(username) = prompt_line("Administrator username (3-32 chars, letters/digits/_ only): ") else {
        return Ok(false);
    };
    if !auth::username_is_valid(&username) {
        return Ok(false);
    }
    if db::user_exists(conn, &username)? {
        println!("Username '{}' already exists.", username);
        return Ok(false);
    }

    print!("Password: ");
    io::stdout().flush().ok();
    let password = Zeroizing::new(read_password().context("Failed to read password input")?);
    if !auth::password_is_strong(password.trim(), &username) {
        return Ok(false);
    }

    print!("Confirm password: ");
    io::stdout().flush().ok();
    let confirm = Zeroizing::new(read_password().context("Failed to read confirmation input")?);
    if confirm.trim() != password.trim() {
        println!("Passwords do not match.");
        return Ok(false);
    }

    let hashed = auth::hash_password(password.trim())?;
    db::insert_user(conn, &username, &hashed, &["administrator"])?;
    println!("Created administrator '{}'.", username);
    Ok(true)
}

// ===============================================================
//                        RESET PASSWORDS
// ===============================================================
fn reset_passwords(rotator: &Rotator<'_>, session: &Session) -> Result<()> {
    let roles = rotator.available_roles()?;
    ui::reset_page_ui(&roles);

    let Some(selection) = prompt_line("Roles: ") else {
        println!("No input detected.");
        return Ok(());
    };
    let scope = parse_role_selection(&selection, &roles);

    ui::reset_warning_ui();
    let confirmed = prompt_input().is_some_and(|a| is_affirmative(&a));

    let request = RotationRequest {
        requester: session.user_id,
        scope,
        confirmed,
    };

    match rotator.process(&request) {
        Ok(report) => ui::notice_ui(&notice_for(&report.outcome)),
        Err(denied) => ui::notice_ui(&Notice {
            kind: NoticeKind::Error,
            message: denied.to_string(),
            details: Vec::new(),
        }),
    }
    Ok(())
}

// ===============================================================
//                         ADMIN MENU
// ===============================================================
pub fn admin_menu(conn: &Connection, audit: &AuditLog, config: &Config, session: &Session) -> Result<()> {
    let store = SqliteUserStore::new(conn);
    let rotator = Rotator::new(&store, &store, session)
        .with_policy(config.password_policy)
        .with_audit(audit);

    loop {
        ui::admin_ui(&session.username);
        let Some(choice) = prompt_input() else {
            println!("End of input detected. Logging out...");
            return Ok(());
        };

        match choice.as_str() {
            "1" => {
                if let Err(e) = reset_passwords(&rotator, session) {
                    eprintln!("Password reset error: {e:#}");
                }
                wait_for_enter();
            }
            "2" => {
                ui::roles_ui(&rotator.available_roles()?);
                wait_for_enter();
            }
            "3" => {
                ui::users_ui(&db::list_user_summaries(conn)?);
                wait_for_enter();
            }
            "4" => {
                ui::activity_ui(&audit.recent(RECENT_ACTIVITY_LIMIT)?);
                wait_for_enter();
            }
            "0" => {
                println!("Logging out {}...", session.username);
                return Ok(());
            }
            _ => println!("Invalid choice. Please enter 0-4.\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn roles() -> Vec<RoleInfo> {
        ["administrator", "editor", "author"]
            .iter()
            .map(|k| RoleInfo { key: k.to_string(), label: k.to_string() })
            .collect()
    }

    fn keys(list: &[&str]) -> RoleScope {
        RoleScope::Roles(list.iter().map(|k| k.to_string()).collect())
    }

    #[test]
    fn all_means_no_filter() {
        assert_eq!(parse_role_selection(" ALL ", &roles()), RoleScope::AllRoles);
    }

    #[test]
    fn numbers_and_keys_mix() {
        assert_eq!(parse_role_selection("2, author", &roles()), keys(&["editor", "author"]));
    }

    #[test]
    fn out_of_range_numbers_are_dropped() {
        assert_eq!(parse_role_selection("0, 9", &roles()), RoleScope::Roles(BTreeSet::new()));
    }

    #[test]
    fn blank_answer_selects_nothing() {
        assert_eq!(parse_role_selection("  ", &roles()), RoleScope::Roles(BTreeSet::new()));
    }
}
