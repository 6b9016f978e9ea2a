use anyhow::{Context, Result};

use global_password_reset::config::Config;
use global_password_reset::logger::AuditLog;
use global_password_reset::{auth, db, function, menu, ui};

fn main() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    // Users and roles live in one database; the audit trail in another.
    let mut conn = db::get_connection(&config.db_path)?;
    let audit = AuditLog::open(&config.audit_db_path, Some(&config.audit_log_path))?;

    while !db::has_administrator(&conn)? {
        if !menu::create_first_admin(&mut conn)? {
            println!("An administrator account is required. Exiting.");
            return Ok(());
        }
    }

    ui::front_page_ui();

    loop {
        match function::prompt_input() {
            Some(choice) => match choice.trim() {
                // === [1] ADMINISTRATOR LOGIN ===
                "1" => {
                    ui::user_login_ui();
                    match auth::login_user(&conn, &audit) {
                        Ok(Some(session)) => {
                            menu::admin_menu(&conn, &audit, &config, &session)?;
                        }
                        Ok(None) => {}
                        Err(e) => eprintln!("Login error: {e:#}"),
                    }
                    ui::front_page_ui();
                }

                // === [2] ABOUT ===
                "2" => {
                    ui::about_ui();
                    function::wait_for_enter();
                    ui::front_page_ui();
                }

                // === [3] EXIT ===
                "3" => {
                    println!("Goodbye!");
                    break;
                }

                _ => println!("Invalid choice. Please enter 1-3.\n"),
            },
            None => {
                println!("End of input detected. Exiting...");
                break;
            }
        }
    }

    Ok(())
}
