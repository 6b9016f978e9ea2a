use std::io::{self, Write};

/// ==============================================
/// Helper: Prompt user for input
/// ==============================================
pub fn prompt_input() -> Option<String> {
    if io::stdout().flush().is_err() {
        eprintln!("Error flushing stdout.");
        return None;
    }

    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(0) => None, // EOF
        Ok(_) => Some(input.trim().to_string()),
        Err(e) => {
            eprintln!("Error reading input: {e}");
            None
        }
    }
}

/// Print a label and read one line.
pub fn prompt_line(label: &str) -> Option<String> {
    print!("{label}");
    prompt_input()
}

/// Only an explicit yes counts as confirmation.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// ==============================================
/// Helper: Pause until user presses ENTER
/// ==============================================
pub fn wait_for_enter() {
    print!("Press ENTER to continue...");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    let _ = io::stdin().read_line(&mut buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("yep"));
    }
}
