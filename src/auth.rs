use anyhow::{anyhow, bail, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
}; //Argon2 hashing algorithm for hashing and verification
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex; // validating usernames and typed passwords
use rpassword::read_password; // hidden password entry for CLI
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use zeroize::{Zeroize, Zeroizing};

use crate::db;
use crate::logger::{AuditEvent, AuditLog};
use crate::rotator::{IdentityProvider, UserId};

pub const DEFAULT_PASSWORD_LENGTH: usize = 20;
pub const MIN_PASSWORD_LENGTH: usize = 12;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()";

/*------------------------ Generation ---------------------*/

/// Shape of generated passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { length: DEFAULT_PASSWORD_LENGTH }
    }
}

impl PasswordPolicy {
    pub fn new(length: usize) -> Result<Self> {
        if length < MIN_PASSWORD_LENGTH {
            bail!("Password length {length} is below the minimum of {MIN_PASSWORD_LENGTH}");
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Generate a password from the thread-local CSPRNG. Every character class
    /// appears at least once; the rest is drawn from the full alphabet.
    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        let classes = [LOWER, UPPER, DIGITS, SPECIAL];
        let alphabet: Zeroizing<Vec<u8>> = Zeroizing::new(classes.concat());

        let mut chars: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(self.length));
        for class in classes {
            chars.push(class[rng.random_range(0..class.len())]);
        }
        while chars.len() < self.length {
            chars.push(alphabet[rng.random_range(0..alphabet.len())]);
        }
        chars.shuffle(&mut rng);

        chars.iter().map(|&b| b as char).collect()
    }
}

/*------------------------ Hashing ---------------------*/

// Argon2id: m = 64 MiB, t = 3 passes, p = 1 lane, default 32-byte output.
fn argon2_hasher() -> Result<Argon2<'static>> {
    let params = argon2::Params::new(65_536, 3, 1, None)
        .map_err(|e| anyhow!("Invalid Argon2 params: {e}"))?;
    Ok(Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params))
}

// Hash a plaintext password into a PHC string suitable for storage.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let phc = argon2_hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(phc.to_string())
}

// Verify a password against a stored PHC hash
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;
    Ok(argon2_hasher()?.verify_password(password.as_bytes(), &parsed).is_ok())
}

/*------------------------ Validation ---------------------*/

// Validates a username format (no special characters)
pub fn username_is_valid(username: &str) -> bool {
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        eprintln!("Username contains spaces or control characters");
        return false;
    }
    if !username.is_ascii() {
        eprintln!("Username contains non-ASCII characters.");
        return false;
    }
    match Regex::new(r"^[A-Za-z0-9_]{3,32}$") {
        Ok(re) => {
            if !re.is_match(username) {
                eprintln!("Invalid username: only letters, digits, and underscores are allowed (3-32 chars).");
                return false;
            }
            true
        }
        Err(err) => {
            eprintln!("Internal regex error: {}", err);
            false
        }
    }
}

// Validates a typed password (upper, lower, digit, special)
pub fn password_is_strong(password: &str, username: &str) -> bool {
    if password.to_lowercase().contains(&username.to_lowercase()) {
        eprintln!("Password should not contain the username.");
        return false;
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        eprintln!("Password too short (minimum {MIN_PASSWORD_LENGTH} characters).");
        return false;
    }

    let checks = [r"[A-Z]", r"[a-z]", r"\d", r"[!@#$%^&*()\-_]"];
    for pattern in checks {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(password) => {}
            Ok(_) => {
                eprintln!(
                    "Weak password. Must include at least:
                    - 1 uppercase letter
                    - 1 lowercase letter
                    - 1 digit
                    - 1 special character (!@#$%^&*()_-)"
                );
                return false;
            }
            Err(err) => {
                eprintln!("Internal regex error: {}", err);
                return false;
            }
        }
    }
    true
}

/*------------------------ Session ---------------------*/

/// The logged-in administrator. Acts as the identity provider for rotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub roles: BTreeSet<String>,
    pub can_manage: bool,
}

impl IdentityProvider for Session {
    fn current_user_id(&self) -> UserId {
        self.user_id
    }

    fn current_user_can_administer(&self) -> bool {
        self.can_manage
    }
}

// Small random delay so unknown usernames cost about as much as a real verify
pub fn fake_verification_delay() {
    let delay_ms: u64 = rand::rng().random_range(100..=250);
    thread::sleep(Duration::from_millis(delay_ms));
}

/// Check credentials and build a session. `Ok(None)` for any login refusal.
pub fn authenticate(conn: &Connection, audit: &AuditLog, username: &str, password: &str) -> Result<Option<Session>> {
    let Some(row) = db::find_login(conn, username)? else {
        fake_verification_delay();
        audit.log_event(AuditEvent::LoginFailure, None, None, None, Some(username))?;
        return Ok(None);
    };

    if !row.is_active {
        println!("Account {} is currently disabled. Please contact administrator.", username);
        audit.log_event(AuditEvent::LoginFailure, None, Some(row.id), None, Some("account disabled"))?;
        return Ok(None);
    }

    if !verify_password(password, &row.hashed_password)? {
        audit.log_event(AuditEvent::LoginFailure, None, Some(row.id), None, Some("bad password"))?;
        return Ok(None);
    }

    db::touch_last_login(conn, row.id)?;
    audit.log_event(AuditEvent::LoginSuccess, None, Some(row.id), None, None)?;

    Ok(Some(Session {
        user_id: row.id,
        username: row.username,
        roles: db::roles_of(conn, row.id)?,
        can_manage: db::can_manage(conn, row.id)?,
    }))
}

/*------------------------ LOGIN ---------------------*/

// Interactive login. Only accounts holding a managing role get a session.
pub fn login_user(conn: &Connection, audit: &AuditLog) -> Result<Option<Session>> {
    print!("Username: ");
    io::stdout()
        .flush()
        .context("Failed to flush stdout while asking for username")?;

    let mut username_input = String::new();
    io::stdin()
        .read_line(&mut username_input)
        .context("Failed to read username input")?;
    let username = username_input.trim().to_string();
    if username.is_empty() {
        eprintln!("Username is required.");
        return Ok(None);
    }

    print!("Password: ");
    io::stdout()
        .flush()
        .context("Failed to flush stdout while asking for password")?;
    let mut password = read_password().context("Failed to read password input")?;

    let session = authenticate(conn, audit, &username, password.trim());
    password.zeroize();

    match session? {
        Some(s) if s.can_manage => {
            println!("Welcome, {}! Accessing password administration...", s.username);
            Ok(Some(s))
        }
        Some(s) => {
            println!("Access denied: '{}' is not an administrator.", s.username);
            Ok(None)
        }
        None => {
            println!("Invalid username or password.");
            Ok(None)
        }
    }
}
