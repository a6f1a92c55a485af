//! Plain-text inputs: URL lists and recorded viewport event scripts.

use anyhow::{bail, Context, Result};
use photowall_scheduler::ViewportEvent;

/// One URL per line; blank lines and `#` comments are skipped.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToOwned::to_owned)
        .collect()
}

/// One line of a recorded viewport script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Event(ViewportEvent),
    /// Let every in-flight fetch finish before the next event
    Idle,
}

/// One step per line: `<first> <count> <settled|scrolling>` or `idle`.
pub fn parse_script(text: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "idle" {
            steps.push(Step::Idle);
            continue;
        }
        let event = parse_event(line).with_context(|| format!("events line {}", number + 1))?;
        steps.push(Step::Event(event));
    }
    Ok(steps)
}

fn parse_event(line: &str) -> Result<ViewportEvent> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [first, count, state] = fields.as_slice() else {
        bail!("expected `<first> <count> <settled|scrolling>`, got `{line}`");
    };

    let first: usize = first.parse().with_context(|| format!("invalid first index `{first}`"))?;
    let count: usize = count.parse().with_context(|| format!("invalid count `{count}`"))?;

    match *state {
        "settled" => Ok(ViewportEvent::settled(first, count)),
        "scrolling" => Ok(ViewportEvent::scrolling(first, count)),
        other => bail!("unknown scroll state `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_skips_comments_and_blanks() {
        let text = "# wall\nhttps://a.test/1.jpg\n\n  https://a.test/2.jpg  \n#https://a.test/3.jpg\n";
        assert_eq!(parse_url_list(text), vec!["https://a.test/1.jpg", "https://a.test/2.jpg"]);
    }

    #[test]
    fn steps_parse_in_order() {
        let steps = parse_script("0 3 scrolling\n# pause\n4 3 settled\nidle\n").unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Event(ViewportEvent::scrolling(0, 3)),
                Step::Event(ViewportEvent::settled(4, 3)),
                Step::Idle,
            ]
        );
    }

    #[test]
    fn malformed_event_names_the_line() {
        let err = parse_script("0 3 settled\n1 two settled\n").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("events line 2"), "{message}");
        assert!(message.contains("invalid count `two`"), "{message}");
    }

    #[test]
    fn unknown_state_is_rejected() {
        assert!(parse_script("0 1 flinging").is_err());
        assert!(parse_script("0 1").is_err());
    }
}
