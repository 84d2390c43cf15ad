// ABOUTME: Askama template definitions for the session terminal page.

use askama::Template;

#[derive(Template)]
#[template(path = "session.html")]
pub struct SessionTemplate {
    pub token: String,
    pub ws_path: String,
}
