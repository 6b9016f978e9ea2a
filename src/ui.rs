use colored::*;

use crate::db::{to_eastern_time, UserSummary};
use crate::logger::AuditRecord;
use crate::notice::{Notice, NoticeKind};
use crate::rotator::RoleInfo;

pub fn front_page_ui() {
    let bar = "=".repeat(58);
    let pad = " ".repeat(6);

    println!();
    println!("{}{}", pad, bar.color(Color::BrightBlue));
    println!("{}{}{}", pad, " ".repeat(14), "GLOBAL USER PASSWORD RESET".bold().color(Color::BrightYellow));
    println!("{}{}{}", pad, " ".repeat(9), "reset every password except your own".color(Color::White));
    println!("{}{}", pad, bar.color(Color::BrightBlue));
    println!();
    println!(
        "{}{}",
        "        ",
        "[1] Administrator Login   [2] About   [3] Exit".color(Color::BrightYellow).bold()
    );
    println!();
    print!("{}", "Select an option [1-3]: ".bold().color(Color::Cyan));
}

pub fn user_login_ui() {
    let port_spc = " ".repeat(11);
    let port_bar = "=".repeat(46);
    println!("{}{}", port_spc, port_bar.color(Color::BrightGreen));
    println!("{}{}{}", port_spc, " ".repeat(12), "ADMINISTRATOR LOGIN".color(Color::BrightYellow));
    println!("{}{}", port_spc, port_bar.color(Color::BrightGreen));
}

pub fn first_run_ui() {
    println!("\n{}", "No administrator account exists yet.".bold().color(Color::BrightYellow));
    println!("Create one now. This account is never included in a reset.\n");
}

pub fn about_ui() {
    println!("\n{}", "About".bold().color(Color::BrightYellow));
    println!("Resets the passwords of all users, or of users in selected roles,");
    println!("excluding the administrator who runs it. New passwords are random,");
    println!("stored only as Argon2id hashes, and never displayed or logged.\n");
}

pub fn admin_ui(username: &str) {
    let bar_color = Color::Red;
    let menu_bar = "=".repeat(48);
    let spacing1 = " ".repeat(7);
    let spacing2 = " ".repeat(8);

    println!("{}{}", spacing1, menu_bar.color(bar_color));
    println!("{}{}{}", spacing1, " ".repeat(10), "PASSWORD RESET ADMIN MENU".bold().color(Color::BrightYellow));
    println!("{}{}{}", spacing1, " ".repeat(10), format!("signed in as {username}").color(Color::White));
    println!("{}{}", spacing1, menu_bar.color(bar_color));

    println!("{}{}", spacing2, "[1] Reset passwords           |  [3] View users".color(Color::White));
    println!("{}{}", spacing2, "[2] List roles                |  [4] Recent activity".color(Color::White));
    println!("{}{}", spacing2, "              [0] Log out".color(Color::Red));

    println!();
    print!("{}", "Select an option [0-4]: ".bold().color(Color::Cyan));
}

pub fn roles_ui(roles: &[RoleInfo]) {
    println!("\n{}", "Available roles".bold().color(Color::BrightYellow));
    for (i, role) in roles.iter().enumerate() {
        println!("  [{}] {:<16} {}", i + 1, role.label, format!("({})", role.key).dimmed());
    }
    println!();
}

pub fn reset_page_ui(roles: &[RoleInfo]) {
    println!("\n{}", "Global User Password Reset".bold().color(Color::BrightYellow));
    println!("Select the user role or roles you want to reset passwords for.");
    roles_ui(roles);
    println!("Enter role numbers or keys separated by commas, or 'all' for every user.");
}

pub fn reset_warning_ui() {
    println!(
        "\n{}: {}",
        "WARNING".bold().color(Color::Red),
        "This is not reversible, and any existing password data will not be retrievable."
    );
    print!("{}", "Yes, I am aware of what I am doing. [y/N]: ".bold().color(Color::Cyan));
}

pub fn notice_ui(notice: &Notice) {
    let color = match notice.kind {
        NoticeKind::Success => Color::BrightGreen,
        NoticeKind::Warning => Color::BrightYellow,
        NoticeKind::Error => Color::Red,
    };
    println!("\n{}", notice.message.bold().color(color));
    for line in &notice.details {
        println!("  - {}", line.color(color));
    }
    println!();
}

pub fn users_ui(users: &[UserSummary]) {
    println!("\n===== Registered Users =====");
    println!("{:<5} {:<18} {:<28} {:<9} {:<25}", "ID", "Username", "Roles", "Active", "Updated (EST)");
    println!("{}", "-".repeat(88));
    for u in users {
        let updated = u
            .updated_at
            .as_deref()
            .and_then(to_eastern_time)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<5} {:<18} {:<28} {:<9} {:<25}",
            u.id,
            u.username,
            u.roles,
            if u.is_active { "ACTIVE" } else { "INACTIVE" },
            updated
        );
    }
    println!("{}\n", "=".repeat(40));
}

pub fn activity_ui(records: &[AuditRecord]) {
    println!("\n===== Recent Activity =====");
    if records.is_empty() {
        println!("No activity recorded yet.");
    }
    for r in records {
        let who = r.actor.map(|a| format!("#{a}")).unwrap_or_else(|| "-".into());
        let target = r.target.map(|t| format!(" -> #{t}")).unwrap_or_default();
        let detail = r.detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default();
        println!("{} {:<18} {}{}{}", r.timestamp, r.event.as_str(), who, target, detail);
    }
    println!();
}
