//! Minimal HTML pages for the browser flow.
//!
//! Markup is deliberately bare; tenants are expected to restyle or replace it.

use crate::flow::FieldErrors;
use axum::response::Html;

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{body}\n</body>\n</html>\n",
        escape(title)
    ))
}

/// Escape text for HTML element and attribute content.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn field_errors(errors: &FieldErrors, field: &str) -> String {
    errors
        .for_field(field)
        .map(|message| format!("<span class=\"error\">{}</span>", escape(message)))
        .collect()
}

#[must_use]
pub fn login(email: &str, error: Option<&str>) -> Html<String> {
    let error = error
        .map(|message| format!("<p class=\"error\">{}</p>", escape(message)))
        .unwrap_or_default();
    page(
        "Sign in",
        &format!(
            "<h1>Sign in</h1>\n{error}\
             <form method=\"post\" action=\"/auth/login\">\
             <label>Email <input type=\"email\" name=\"email\" value=\"{}\"></label>\
             <label>Password <input type=\"password\" name=\"password\"></label>\
             <button type=\"submit\">Sign in</button>\
             </form>\n<p><a href=\"/auth/signup\">Create an account</a></p>",
            escape(email)
        ),
    )
}

/// Values echoed back into the signup form on re-render; passwords never are.
#[derive(Debug, Default)]
pub struct SignupValues<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

#[must_use]
pub fn signup(values: &SignupValues<'_>, errors: &FieldErrors) -> Html<String> {
    page(
        "Create account",
        &format!(
            "<h1>Create account</h1>\n\
             <form method=\"post\" action=\"/auth/signup\">\
             <label>First name <input name=\"first_name\" value=\"{}\"></label>{}\
             <label>Last name <input name=\"last_name\" value=\"{}\"></label>{}\
             <label>Email <input type=\"email\" name=\"email\" value=\"{}\"></label>{}\
             <label>Password <input type=\"password\" name=\"password\"></label>{}\
             <label>Confirm password <input type=\"password\" name=\"confirm_password\"></label>{}\
             <button type=\"submit\">Sign up</button>\
             </form>\n<p><a href=\"/auth/login\">Back to sign in</a></p>",
            escape(values.first_name),
            field_errors(errors, "first_name"),
            escape(values.last_name),
            field_errors(errors, "last_name"),
            escape(values.email),
            field_errors(errors, "email"),
            field_errors(errors, "password"),
            field_errors(errors, "confirm_password"),
        ),
    )
}

#[must_use]
pub fn pending_confirmation() -> Html<String> {
    page(
        "Confirm your email",
        "<h1>Check your inbox</h1>\n\
         <p>We sent you a confirmation link. It only lasts for a day.</p>\
         <form method=\"post\" action=\"/auth/confirm/resend\">\
         <label>Email <input type=\"email\" name=\"email\"></label>\
         <button type=\"submit\">Send it again</button>\
         </form>\n<p><a href=\"/auth/login\">Back to sign in</a></p>",
    )
}

#[must_use]
pub fn confirmed() -> Html<String> {
    page(
        "Account confirmed",
        "<h1>Account confirmed</h1>\n\
         <p><a href=\"/auth/login\">Sign in</a> or <a href=\"/error/go-back\">return to the application</a>.</p>",
    )
}

#[must_use]
pub fn failure() -> Html<String> {
    page(
        "Something went wrong",
        "<h1>Something went wrong</h1>\n\
         <p>Your session may have expired. Please start again from the application.</p>\
         <p><a href=\"/error/go-back\">Go back</a></p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_markup() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn login_echoes_escaped_email_and_error() {
        let Html(body) = login("<b>@x.com", Some("invalid email or password!"));
        assert!(body.contains("value=\"&lt;b&gt;@x.com\""));
        assert!(body.contains("invalid email or password!"));
    }

    #[test]
    fn signup_places_errors_next_to_fields() {
        let mut errors = FieldErrors::default();
        errors.push("confirm_password", "password mismatch!");
        let Html(body) = signup(&SignupValues::default(), &errors);
        assert!(body.contains("<span class=\"error\">password mismatch!</span>"));
    }
}
