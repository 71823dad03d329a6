//! The post-login continuation page.
//!
//! Some browsers drop a cookie set on a redirect response, so a login
//! that has just set the session cookie answers with this page instead
//! of a 3xx. Navigation happens in a same-origin script, with a meta
//! refresh and a plain link as fallbacks.

use axum::http::header;
use axum::response::{Html, IntoResponse, Response};

/// Script served at the configured post-authentication script path.
pub const POST_AUTHENTICATION_REDIRECT_JS: &str =
    include_str!("../static/postAuthenticationRedirect.js");

/// Renders the continuation page navigating to `back_to_path`.
#[must_use]
pub fn continuation_page(back_to_path: &str, script_path: &str) -> Html<String> {
    let target = escape(back_to_path);
    let script = escape(script_path);
    Html(format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta http-equiv=\"refresh\" content=\"1;url={target}\">\n\
         <title>Signing you in</title>\n\
         </head>\n\
         <body data-redirect=\"{target}\">\n\
         <p>Please wait&hellip; <a href=\"{target}\">Continue</a></p>\n\
         <script src=\"{script}\"></script>\n\
         </body>\n\
         </html>\n"
    ))
}

/// Response serving [`POST_AUTHENTICATION_REDIRECT_JS`].
pub async fn redirect_script() -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        POST_AUTHENTICATION_REDIRECT_JS,
    )
        .into_response()
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_points_at_back_to_path_and_script() {
        let Html(page) = continuation_page("/account?tab=1&x=2", "/idm/redirect.js");
        assert!(page.contains("url=/account?tab=1&amp;x=2"));
        assert!(page.contains("data-redirect=\"/account?tab=1&amp;x=2\""));
        assert!(page.contains("<script src=\"/idm/redirect.js\"></script>"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn markup_in_path_is_escaped() {
        let Html(page) = continuation_page("/\"><script>alert(1)</script>", "/s.js");
        assert!(!page.contains("<script>alert"));
        assert!(page.contains("&quot;&gt;&lt;script&gt;"));
    }

    #[test]
    fn script_reads_the_data_attribute() {
        assert!(POST_AUTHENTICATION_REDIRECT_JS.contains("data-redirect"));
    }
}
