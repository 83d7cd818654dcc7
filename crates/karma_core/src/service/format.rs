//! Reply text helpers.

use crate::config::ChannelSettings;
use crate::service::karma_engine::{Adjustment, ResponseCategory};

/// Fills the channel template matching `adjustment.category`.
///
/// `points` becomes `point` when the absolute total is 1, then `USER` and
/// `TOTAL` are substituted. Alias hits render as `token (canonical)`.
pub fn render_karma_message(settings: &ChannelSettings, adjustment: &Adjustment) -> String {
    let template = match adjustment.category {
        ResponseCategory::Up => &settings.karma_message_up,
        ResponseCategory::Down => &settings.karma_message_down,
        ResponseCategory::None => &settings.karma_message_none,
    };
    let mut message = template.clone();
    if adjustment.total.abs() == 1 {
        message = message.replace("points", "point");
    }

    let user = match &adjustment.via_alias {
        Some(token) => format!("{token} ({})", adjustment.target),
        None => adjustment.target.clone(),
    };
    message
        .replace("USER", &user)
        .replace("TOTAL", &adjustment.total.to_string())
}

/// Joins items as English prose: `a`, `a and b`, `a, b, and c`.
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [first, second] => format!("{} and {}", first.as_ref(), second.as_ref()),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|item| item.as_ref()).collect();
            format!("{}, and {}", head.join(", "), last.as_ref())
        }
    }
}

/// `1 time`, `3 times`.
pub fn times(count: i64) -> String {
    if count == 1 {
        "1 time".to_string()
    } else {
        format!("{count} times")
    }
}

/// Wraps a name in double quotes for list output.
pub fn quoted(name: &str) -> String {
    format!("\"{name}\"")
}
