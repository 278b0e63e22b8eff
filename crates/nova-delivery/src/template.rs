//! Branded HTML email rendering.
//!
//! Every interpolated value is HTML-escaped, and button targets accept
//! nothing but http(s) URLs. The body is a dark-themed single-card
//! layout with the product accent color.

const ACCENT: &str = "#37ebec";
const BUTTON_BG: &str = "#24262e";

/// Escape text for safe interpolation into HTML.
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Accept only http(s) URLs; anything else renders no link at all.
pub fn safe_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Content of one branded email.
#[derive(Debug, Clone, Default)]
pub struct EmailTemplate {
    pub title: String,
    pub message: String,
    pub button_text: String,
    pub button_url: String,
}

impl EmailTemplate {
    /// Render the full HTML document.
    pub fn render(&self) -> String {
        let title = if self.title.is_empty() {
            "GeNova".to_string()
        } else {
            escape_html(&self.title)
        };
        let message = escape_html(&self.message);
        let button_text = if self.button_text.is_empty() {
            "Open".to_string()
        } else {
            escape_html(&self.button_text)
        };

        let button = match safe_url(&self.button_url) {
            Some(url) => format!(
                r#"<div style="text-align:center;margin:18px 0 6px;">
        <a href="{url}" style="display:inline-block;background:{BUTTON_BG};color:{ACCENT};border:1px solid {ACCENT};text-decoration:none;padding:10px 18px;border-radius:999px;font-weight:600;font-size:14px;line-height:1;">{button_text}</a>
      </div>"#
            ),
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0"/>
  <title>{title}</title>
</head>
<body style="margin:0;padding:0;background:#05070D;">
  <div style="font-family:Arial,sans-serif;background:linear-gradient(180deg,#0B0F13,#05070D);color:#FFFFFF;padding:24px 14px;">
    <div style="max-width:640px;margin:0 auto;background:rgba(15,15,22,0.88);border-radius:18px;padding:26px 18px;border:1px solid rgba(148,163,184,0.25);">
      <h2 style="color:{ACCENT};font-size:22px;font-weight:400;margin:14px 0 18px;text-align:center;line-height:1.25;">{title}</h2>
      <p style="font-size:15px;color:#C9D1E6;line-height:1.65;margin:0 0 17px;text-align:center;">{message}</p>
      {button}
      <p style="font-size:12.5px;color:#8B93A7;text-align:center;margin:22px 0 0;">If you didn&#39;t request this, you can safely ignore this message.</p>
      <hr style="border:none;border-top:1px solid rgba(148,163,184,0.18);margin:22px 0;"/>
      <p style="font-size:12px;color:#6B7280;text-align:center;margin:0;">&copy; 2025 GeNova Labs</p>
    </div>
  </div>
</body>
</html>"#
        )
    }
}
