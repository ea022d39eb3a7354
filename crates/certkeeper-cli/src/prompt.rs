//! Interactive input collection
//!
//! All prompting lives here; the library crates only ever see already
//! collected values. Invalid-input retry loops run against the pure
//! validation predicates exported by certkeeper-source.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Ask a yes/no question. Empty input takes the default.
pub fn confirm(question: &str, default_yes: bool) -> io::Result<bool> {
    let hint = if default_yes { "Y/n" } else { "y/N" };
    loop {
        print!("{} [{}]: ", question, hint);
        io::stdout().flush()?;
        let answer = read_line()?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default_yes),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("Please answer y or n."),
        }
    }
}

/// Present a 1-indexed candidate list and read a selection.
///
/// Empty input means the default (first candidate); the returned index is
/// range-checked by the resolver, not here.
pub fn select_index(label: &str, candidates: &[PathBuf]) -> Option<usize> {
    println!("Available {} files:", label);
    for (i, path) in candidates.iter().enumerate() {
        println!("  {}) {}", i + 1, path.display());
    }
    loop {
        print!("Select {} [1]: ", label);
        let _ = io::stdout().flush();
        let answer = match read_line() {
            Ok(s) => s,
            Err(_) => return None,
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return None;
        }
        match answer.parse::<usize>() {
            Ok(i) => return Some(i),
            Err(_) => println!("Please enter a number."),
        }
    }
}

/// Prompt until `valid` accepts the trimmed input.
pub fn line_until_valid(label: &str, valid: impl Fn(&str) -> bool) -> io::Result<String> {
    loop {
        print!("{}: ", label);
        io::stdout().flush()?;
        let answer = read_line()?;
        let answer = answer.trim();
        if valid(answer) {
            return Ok(answer.to_string());
        }
        println!("Invalid value, try again.");
    }
}

fn read_line() -> io::Result<String> {
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stdin closed",
        ));
    }
    Ok(line)
}
