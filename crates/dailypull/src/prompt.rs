use anyhow::{Context, bail};
use std::io::{self, BufRead, Write};

/// Read one non-empty line from stdin after printing `label`.
pub fn line(label: &str) -> anyhow::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .with_context(|| format!("reading {}", label))?;
    let input = input.trim().to_string();
    if input.is_empty() {
        bail!("{} must not be empty", label);
    }
    Ok(input)
}

/// Like [`line`] but without echo.
pub fn secret(label: &str) -> anyhow::Result<String> {
    let input = rpassword::prompt_password(format!("{}: ", label))
        .with_context(|| format!("reading {}", label))?;
    if input.is_empty() {
        bail!("{} must not be empty", label);
    }
    Ok(input)
}

/// Comma-separated list, blanks dropped.
pub fn list(label: &str) -> anyhow::Result<Vec<String>> {
    let items = split_list(&line(label)?);
    if items.is_empty() {
        bail!("{} must contain at least one entry", label);
    }
    Ok(items)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_input_is_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            split_list(" a@x.com, ,b@x.com ,"),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
    }
}
