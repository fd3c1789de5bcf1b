use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::feedback::Feedback;
use crate::forms::{FeedbackForm, FormErrors, LoginForm, RegisterForm};
use crate::session::{Category, Flash};
use crate::user::User;

fn page(title: &str, flashes: &[Flash], body: &str) -> String {
    let mut notices = String::new();
    for flash in flashes {
        let class = match flash.category {
            Category::Success => "success",
            Category::Error => "error",
        };
        let _ = writeln!(
            notices,
            r#"<p class="flash {class}">{}</p>"#,
            text(&flash.message)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
{notices}<h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = text(title),
    )
}

fn field(name: &str, label: &str, kind: &str, value: &str, errors: &FormErrors) -> String {
    let mut out = format!(
        r#"<p><label for="{name}">{label}</label>
<input id="{name}" name="{name}" type="{kind}" value="{value}">"#,
        value = attr(value),
    );
    for e in errors.get(name) {
        let _ = write!(out, r#"<span class="error">{}</span>"#, text(e));
    }
    out.push_str("</p>\n");
    out
}

fn textarea(name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    let mut out = format!(
        r#"<p><label for="{name}">{label}</label>
<textarea id="{name}" name="{name}">{value}</textarea>"#,
        value = text(value),
    );
    for e in errors.get(name) {
        let _ = write!(out, r#"<span class="error">{}</span>"#, text(e));
    }
    out.push_str("</p>\n");
    out
}

fn form(action: &str, fields: &[String], submit: &str) -> String {
    format!(
        "<form method=\"POST\" action=\"{}\">\n{}<button>{submit}</button>\n</form>",
        attr(action),
        fields.concat(),
    )
}

pub fn register(form_data: &RegisterForm, errors: &FormErrors, flashes: &[Flash]) -> String {
    let fields = [
        field("username", "Username", "text", &form_data.username, errors),
        // never echo the password back
        field("password", "Password", "password", "", errors),
        field("email", "Email", "email", &form_data.email, errors),
        field("firstname", "First Name", "text", &form_data.firstname, errors),
        field("lastname", "Last Name", "text", &form_data.lastname, errors),
    ];

    let body = form("/register", &fields, "Register")
        + "\n<p>Already signed up? <a href=\"/login\">Log in</a></p>";
    page("Register", flashes, &body)
}

pub fn login(form_data: &LoginForm, errors: &FormErrors, flashes: &[Flash]) -> String {
    let fields = [
        field("username", "Username", "text", &form_data.username, errors),
        field("password", "Password", "password", "", errors),
    ];

    let body = form("/login", &fields, "Log in")
        + "\n<p>New here? <a href=\"/register\">Register</a></p>";
    page("Log in", flashes, &body)
}

pub fn user(user: &User, feedback: &[Feedback], flashes: &[Flash]) -> String {
    let username = text(&user.username);
    let mut body = format!(
        "<ul>
<li>Username: {username}</li>
<li>Email: {}</li>
<li>First Name: {}</li>
<li>Last Name: {}</li>
</ul>
<h2>Feedback</h2>
<ul>
",
        text(&user.email),
        text(&user.first_name),
        text(&user.last_name),
    );

    for fb in feedback {
        let _ = writeln!(
            body,
            r#"<li><b>{}</b> {} <a href="/feedback/{id}/update">Edit</a>
<form method="POST" action="/feedback/{id}/delete"><button>Delete</button></form></li>"#,
            text(&fb.title),
            text(&fb.content),
            id = fb.id,
        );
    }

    let _ = write!(
        body,
        r#"</ul>
<p><a href="/users/{path}/feedback/add">Add feedback</a></p>
<form method="POST" action="/users/{path}/delete"><button>Delete account</button></form>
<p><a href="/logout">Log out</a></p>"#,
        path = attr(&user.username),
    );

    page(&user.username, flashes, &body)
}

pub fn feedback(
    heading: &str,
    action: &str,
    form_data: &FeedbackForm,
    errors: &FormErrors,
    flashes: &[Flash],
) -> String {
    let fields = [
        field("title", "Title", "text", &form_data.title, errors),
        textarea("content", "Content", &form_data.content, errors),
    ];

    page(heading, flashes, &form(action, &fields, "Save"))
}

pub fn not_found(flashes: &[Flash]) -> String {
    page(
        "Not Found",
        flashes,
        "<p>There's nothing here.</p>\n<p><a href=\"/\">Home</a></p>",
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn escapes_user_content() {
        let user = User {
            username: "alice".into(),
            pwhash: "hash".into(),
            email: "alice@example.com".into(),
            first_name: "<script>".into(),
            last_name: "Liddell".into(),
        };
        let fb = Feedback {
            id: 7,
            title: "a & b".into(),
            content: "<b>bold</b>".into(),
            username: "alice".into(),
        };

        let html = user_page(&user, &[fb]);

        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a &amp; b"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(html.contains(r#"action="/feedback/7/delete""#));
        assert!(!html.contains("hash"));
    }

    fn user_page(user: &User, feedback: &[Feedback]) -> String {
        super::user(user, feedback, &[])
    }

    #[test]
    fn flashes_and_errors_are_shown() {
        let mut errors = FormErrors::default();
        errors.add("username", "Username taken.  Please pick another");
        let flashes = [Flash {
            category: Category::Error,
            message: "You must be logged in to view that page.".into(),
        }];
        let form_data = RegisterForm {
            username: "alice\"".into(),
            password: "secret".into(),
            ..Default::default()
        };

        let html = register(&form_data, &errors, &flashes);

        assert!(html.contains("Username taken.  Please pick another"));
        assert!(html.contains(r#"class="flash error""#));
        assert!(html.contains(r#"value="alice&quot;""#));
        assert!(!html.contains("secret"));
    }
}
