//! Line-oriented stdin prompts.

use std::io::{self, BufRead, Write};

use npm_bisect_common::{Error, Result, Timestamp};

/// Ask a yes/no question on stdin.
pub fn confirm(question: &str) -> Result<bool> {
    let stdin = io::stdin();
    confirm_from(question, &mut stdin.lock(), &mut io::stdout())
}

fn confirm_from<R: BufRead, W: Write>(question: &str, input: &mut R, out: &mut W) -> Result<bool> {
    loop {
        write!(out, "{question} [y/n] ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(Error::Config(
                "stdin closed while waiting for an answer".to_string(),
            ));
        }
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}

/// Ask for an instant, offering a default for an empty answer.
pub fn prompt_timestamp(question: &str, default: Timestamp) -> Result<Timestamp> {
    let stdin = io::stdin();
    prompt_timestamp_from(question, default, &mut stdin.lock(), &mut io::stdout())
}

fn prompt_timestamp_from<R: BufRead, W: Write>(
    question: &str,
    default: Timestamp,
    input: &mut R,
    out: &mut W,
) -> Result<Timestamp> {
    loop {
        write!(out, "{question} [{default}] ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(Error::Config(
                "stdin closed while waiting for an instant".to_string(),
            ));
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(default);
        }
        match Timestamp::parse(answer) {
            Ok(ts) => return Ok(ts),
            Err(err) => writeln!(out, "{err}")?,
        }
    }
}

/// Offer to exclude each package name from the search; returns the excluded
/// names.
pub fn select_exclusions(names: &[String]) -> Result<Vec<String>> {
    let stdin = io::stdin();
    select_exclusions_from(names, &mut stdin.lock(), &mut io::stdout())
}

fn select_exclusions_from<R: BufRead, W: Write>(
    names: &[String],
    input: &mut R,
    out: &mut W,
) -> Result<Vec<String>> {
    writeln!(
        out,
        "{} packages published in the suspect window. Choose which to search.",
        names.len()
    )?;
    let mut excluded = Vec::new();
    for name in names {
        if !confirm_from(&format!("Search publications of {name}?"), input, out)? {
            excluded.push(name.clone());
        }
    }
    Ok(excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_confirm_parses_answers() {
        let mut out = Vec::new();
        assert!(confirm_from("ok?", &mut Cursor::new("y\n"), &mut out).unwrap());
        assert!(!confirm_from("ok?", &mut Cursor::new("NO\n"), &mut out).unwrap());
        // Nonsense answers re-prompt until something parses.
        assert!(confirm_from("ok?", &mut Cursor::new("maybe\nyes\n"), &mut out).unwrap());
    }

    #[test]
    fn test_confirm_errors_on_eof() {
        let mut out = Vec::new();
        assert!(confirm_from("ok?", &mut Cursor::new(""), &mut out).is_err());
    }

    #[test]
    fn test_prompt_timestamp_default_and_retry() {
        let default = Timestamp::parse("2020-01-01").unwrap();
        let mut out = Vec::new();

        let picked =
            prompt_timestamp_from("when?", default, &mut Cursor::new("\n"), &mut out).unwrap();
        assert_eq!(picked, default);

        let picked = prompt_timestamp_from(
            "when?",
            default,
            &mut Cursor::new("garbage\n2021-06-01\n"),
            &mut out,
        )
        .unwrap();
        assert_eq!(picked, Timestamp::parse("2021-06-01").unwrap());
    }

    #[test]
    fn test_select_exclusions() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut out = Vec::new();
        let excluded =
            select_exclusions_from(&names, &mut Cursor::new("y\nn\ny\n"), &mut out).unwrap();
        assert_eq!(excluded, vec!["b".to_string()]);
    }
}
