//! Consumer naming.
//!
//! A gateway consumer represents one application's subscription to one API,
//! so its username is derived from the pair. `%` and `$` inside the
//! application id are percent-escaped; the first literal `$` therefore always
//! separates the two halves and the mapping is injective.

use std::borrow::Cow;

const SEPARATOR: char = '$';

/// Username of the consumer for `(app_id, api_id)`.
pub fn username(app_id: &str, api_id: &str) -> String {
    let app = escape(app_id);
    let mut out = String::with_capacity(app.len() + api_id.len() + 1);
    out.push_str(&app);
    out.push(SEPARATOR);
    out.push_str(api_id);
    out
}

fn escape(app_id: &str) -> Cow<'_, str> {
    if !app_id.contains(['%', SEPARATOR]) {
        return Cow::Borrowed(app_id);
    }
    let mut out = String::with_capacity(app_id.len() + 4);
    for c in app_id.chars() {
        match c {
            '%' => out.push_str("%25"),
            '$' => out.push_str("%24"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}
