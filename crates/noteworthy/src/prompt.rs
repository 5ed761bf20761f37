use std::io::{self, BufRead, Write};

use noteworthy_core::Confirm;

/// Asks on stderr and reads a `y`/`yes` answer from stdin.
///
/// Anything else, including a closed stdin, counts as no.
pub struct StdinConfirm;

#[async_trait::async_trait(?Send)]
impl Confirm for StdinConfirm {
    async fn confirm(&self, message: &str) -> bool {
        eprint!("{} [y/N] ", message);
        let _ = io::stderr().flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
