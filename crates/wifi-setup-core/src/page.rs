//! HTML pages served by the setup portal.
//!
//! Pages are small and self-contained (inline CSS, no scripts) so they fit
//! the flash budget of the device and render on any phone browser.

use crate::guard::CsrfToken;
use crate::model::{PASSWORD_MAX_LEN, SSID_MAX_LEN};
use crate::password::{SetupPassword, SETUP_PASSWORD_LEN};

/// Response headers sent with every portal page.
pub const SECURITY_HEADERS: [(&str, &str); 2] = [
    ("X-Frame-Options", "DENY"),
    ("X-Content-Type-Options", "nosniff"),
];

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const STYLE: &str = "\
body{font-family:Arial;margin:40px;background:#f0f0f0}\
.container{max-width:400px;margin:0 auto;background:white;padding:30px;border-radius:10px;box-shadow:0 2px 10px rgba(0,0,0,0.1)}\
h1{color:#333;text-align:center;margin-bottom:30px}\
input{width:100%;padding:12px;margin:8px 0;border:1px solid #ddd;border-radius:5px;box-sizing:border-box;font-size:16px}\
button{width:100%;padding:15px;background:#007bff;color:white;border:none;border-radius:5px;font-size:16px;cursor:pointer;margin-top:10px}\
button:hover{background:#0056b3}\
.info{background:#e7f3ff;padding:15px;border-radius:5px;margin-bottom:20px;color:#31708f;font-size:14px}\
.error{background:#f8d7da;padding:15px;border-radius:5px;margin-bottom:20px;color:#721c24;font-size:14px}\
.success{background:#d4edda;padding:20px;border-radius:5px;color:#155724}";

/// Render the setup form embedding the setup password and a fresh token.
pub fn setup_page(password: &SetupPassword, token: CsrfToken) -> String {
    format!(
        "<!DOCTYPE html><html><head>\
<title>WiFi Setup</title>\
<meta name='viewport' content='width=device-width,initial-scale=1'>\
<style>{style}</style>\
</head><body><div class='container'>\
<h1>WiFi Setup</h1>\
<div class='info'>Connect this device to your WiFi network. Password required: <strong>{password}</strong></div>\
<form action='/save' method='post'>\
<input type='password' name='setup_pwd' placeholder='Setup Password' required maxlength='{pwd_len}'>\
<input type='text' name='ssid' placeholder='WiFi Network Name' required maxlength='{ssid_len}'>\
<input type='password' name='password' placeholder='WiFi Password' maxlength='{secret_len}'>\
<input type='hidden' name='csrf' value='{token}'>\
<button type='submit'>Save &amp; Connect</button>\
</form></div></body></html>",
        style = STYLE,
        password = escape_html(password.as_str()),
        pwd_len = SETUP_PASSWORD_LEN,
        ssid_len = SSID_MAX_LEN,
        secret_len = PASSWORD_MAX_LEN,
        token = token,
    )
}

/// Page confirming the credentials were saved.
pub fn success_page() -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Success</title>\
<meta name='viewport' content='width=device-width,initial-scale=1'>\
<meta http-equiv='refresh' content='3;url=/'>\
<style>{style}</style></head>\
<body><div class='container success'><h2>Success!</h2>Connecting to WiFi...</div></body></html>",
        style = STYLE,
    )
}

/// Plain-language error page.
pub fn error_page(status: u16, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Error {status}</title>\
<meta name='viewport' content='width=device-width,initial-scale=1'>\
<style>{style}</style></head>\
<body><div class='container'><div class='error'>{message}</div>\
<a href='/'>Back to setup</a></div></body></html>",
        status = status,
        style = STYLE,
        message = escape_html(message),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_page_embeds_password_and_token() {
        let html = setup_page(&SetupPassword::new("28A10BFE"), CsrfToken::new(0xdeadbeef));
        assert!(html.contains("<strong>28A10BFE</strong>"));
        assert!(html.contains("name='csrf' value='deadbeef'"));
        assert!(html.contains("action='/save' method='post'"));
        assert!(html.contains("maxlength='31'"));
        assert!(html.contains("maxlength='63'"));
    }

    #[test]
    fn test_error_page_escapes_message() {
        let html = error_page(400, "<script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
