//! Subject and HTML body for a due notice.

use chrono::{DateTime, Utc};

use crate::notification::{DueNotification, NotificationKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject: String,
    pub html: String,
}

/// Build the message for `due`. Output depends only on its inputs.
pub fn compose(due: &DueNotification, product_name: &str) -> ComposedMessage {
    ComposedMessage {
        subject: subject(due, product_name),
        html: html_body(due),
    }
}

fn subject(due: &DueNotification, product_name: &str) -> String {
    let label = match due.kind {
        NotificationKind::Deprecate => "Deprecation notice",
        NotificationKind::Sunset => "Sunset notice",
    };
    format!("[{product_name}] {label} – {} {}", due.api_name, due.version)
}

fn html_body(due: &DueNotification) -> String {
    let title = match due.kind {
        NotificationKind::Deprecate => "Deprecation Notice",
        NotificationKind::Sunset => "Sunset Notice",
    };

    let mut html = String::new();
    html.push_str(
        "<div style=\"font-family:ui-sans-serif,system-ui,Segoe UI,Roboto,Arial,sans-serif;line-height:1.5;color:#111\">",
    );
    html.push_str(&format!("<h2 style=\"margin:0 0 12px 0\">{title}</h2>"));
    html.push_str(&format!(
        "<p style=\"margin:0 0 8px 0\"><b>API:</b> {}<br/><b>Version:</b> {}<br/><b>Scheduled at:</b> {}</p>",
        html_escape(&due.api_name),
        html_escape(&due.version),
        html_escape(&rfc1123(due.scheduled_at)),
    ));
    for (label, url) in [("Base URL", &due.base_url), ("Docs", &due.docs_url)] {
        if let Some(url) = url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            let url = html_escape(url);
            html.push_str(&format!(
                "<p style=\"margin:8px 0\"><b>{label}:</b> <a href=\"{url}\">{url}</a></p>"
            ));
        }
    }
    html.push_str("<p style=\"margin-top:16px\">If you have questions, please reply to this email.</p>");
    html.push_str("</div>");
    html
}

/// `Mon, 02 Jan 2006 15:04:05 UTC`
pub fn rfc1123(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S UTC").to_string()
}

/// Escape `&`, `"`, `<` and `>`.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn due(kind: NotificationKind) -> DueNotification {
        DueNotification {
            id: "n1".into(),
            api_id: "a1".into(),
            version_id: "v1".into(),
            kind,
            scheduled_at: Utc.with_ymd_and_hms(2026, 1, 2, 15, 4, 5).unwrap(),
            attempts: 0,
            api_name: "Payments".into(),
            version: "v1".into(),
            contact_email: Some("dev@acme.io".into()),
            base_url: Some("https://api.acme.io".into()),
            docs_url: None,
        }
    }

    #[test]
    fn test_subjects() {
        let m = compose(&due(NotificationKind::Deprecate), "Smelinx");
        assert_eq!(m.subject, "[Smelinx] Deprecation notice – Payments v1");
        let m = compose(&due(NotificationKind::Sunset), "Acme");
        assert_eq!(m.subject, "[Acme] Sunset notice – Payments v1");
    }

    #[test]
    fn test_body_fields_and_optional_links() {
        let html = compose(&due(NotificationKind::Sunset), "Smelinx").html;
        assert!(html.contains("<h2 style=\"margin:0 0 12px 0\">Sunset Notice</h2>"));
        assert!(html.contains("<b>API:</b> Payments<br/>"));
        assert!(html.contains("<b>Scheduled at:</b> Fri, 02 Jan 2026 15:04:05 UTC</p>"));
        assert!(html.contains(
            "<b>Base URL:</b> <a href=\"https://api.acme.io\">https://api.acme.io</a>"
        ));
        assert!(!html.contains("Docs:"));
        assert!(html.ends_with("please reply to this email.</p></div>"));
    }

    #[test]
    fn test_blank_links_are_omitted() {
        let mut d = due(NotificationKind::Deprecate);
        d.base_url = Some("   ".into());
        let html = compose(&d, "Smelinx").html;
        assert!(!html.contains("Base URL"));
    }

    #[test]
    fn test_interpolated_values_are_escaped() {
        let mut d = due(NotificationKind::Deprecate);
        d.api_name = "<script>\"x\" & y</script>".into();
        d.docs_url = Some("https://d.io/?a=1&b=\"2\"".into());
        let html = compose(&d, "Smelinx").html;
        assert!(html.contains("&lt;script&gt;&quot;x&quot; &amp; y&lt;/script&gt;"));
        assert!(html.contains("href=\"https://d.io/?a=1&amp;b=&quot;2&quot;\""));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let d = due(NotificationKind::Sunset);
        assert_eq!(compose(&d, "Smelinx"), compose(&d, "Smelinx"));
    }
}
