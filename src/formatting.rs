// src/formatting.rs

use crate::core::{AlertNotice, EmailMessage};
use chrono::{DateTime, Utc};

/// How loudly an alert is worded, derived from the days remaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Critical,
    Urgent,
    Attention,
    Notice,
}

impl Urgency {
    pub fn from_days(days_remaining: i64) -> Self {
        match days_remaining {
            d if d <= 1 => Urgency::Critical,
            d if d <= 7 => Urgency::Urgent,
            d if d <= 14 => Urgency::Attention,
            _ => Urgency::Notice,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Urgency::Critical => "#ef4444",
            Urgency::Urgent => "#f97316",
            Urgency::Attention => "#f59e0b",
            Urgency::Notice => "#3b82f6",
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            Urgency::Critical => "CRITICAL",
            Urgency::Urgent => "URGENT",
            Urgency::Attention | Urgency::Notice => "ATTENTION",
        }
    }
}

/// "13 August 2030".
pub fn format_expiry_date(expiry: DateTime<Utc>) -> String {
    expiry.format("%d %B %Y").to_string()
}

/// "1 day", "5 days".
pub fn day_count(days: i64) -> String {
    if days.abs() == 1 {
        format!("{} day", days)
    } else {
        format!("{} days", days)
    }
}

/// "Expired" or "5 days left".
pub fn remaining_phrase(days_remaining: i64) -> String {
    if days_remaining < 0 {
        "Expired".to_string()
    } else {
        format!("{} left", day_count(days_remaining))
    }
}

/// Subject line of an alert email.
pub fn email_subject(notice: &AlertNotice) -> String {
    let facet = notice.kind.facet();
    let domain = &notice.domain_name;
    match notice.days_remaining {
        d if d < 0 => format!("[CRITICAL] {} of {} has expired", facet, domain),
        d if d <= 1 => format!("[CRITICAL] {} of {} expires tomorrow", facet, domain),
        d if d <= 7 => format!("[URGENT] {} of {} expires in {}d", facet, domain, d),
        d => format!("{} of {} expires in {} days", facet, domain, d),
    }
}

/// HTML body of an alert email.
pub fn email_html(notice: &AlertNotice) -> String {
    let urgency = Urgency::from_days(notice.days_remaining);
    let color = urgency.color();
    let domain = escape_html(&notice.domain_name);
    let label = notice.kind.label();
    let date = format_expiry_date(notice.expiry);
    let remaining = day_count(notice.days_remaining);
    let dashboard = escape_html(&notice.dashboard_url);
    let verb = if notice.days_remaining < 0 { "expired" } else { "expires" };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background-color:#0b1120;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif">
  <table width="100%" cellpadding="0" cellspacing="0" style="background-color:#0b1120;padding:40px 20px">
    <tr><td align="center">
      <table width="560" cellpadding="0" cellspacing="0" style="background-color:#0f1729;border-radius:16px;overflow:hidden">
        <tr><td style="padding:32px 32px 0;text-align:center">
          <h1 style="margin:0;font-size:20px;color:#ffffff">domainwatch alert</h1>
        </td></tr>
        <tr><td style="padding:24px 32px 0;text-align:center">
          <div style="display:inline-block;border:1px solid {color};border-radius:24px;padding:6px 16px;font-size:13px;font-weight:600;color:{color}">{badge}: {remaining} remaining</div>
        </td></tr>
        <tr><td style="padding:24px 32px">
          <p style="margin:0 0 16px;font-size:15px;line-height:1.6;color:#cbd5e1">
            The <strong style="color:#fff">{label}</strong> of <strong style="color:#fff">{domain}</strong> {verb} on <strong style="color:#fff">{date}</strong>.
          </p>
          <table width="100%" cellpadding="0" cellspacing="0" style="background-color:#1e293b;border-radius:12px">
            <tr><td style="padding:16px 20px;border-bottom:1px solid #334155;color:#64748b">Domain<br><span style="color:#fff">{domain}</span></td></tr>
            <tr><td style="padding:16px 20px;border-bottom:1px solid #334155;color:#64748b">Type<br><span style="color:#fff">{label}</span></td></tr>
            <tr><td style="padding:16px 20px;border-bottom:1px solid #334155;color:#64748b">Expiry date<br><span style="color:#fff">{date}</span></td></tr>
            <tr><td style="padding:16px 20px;color:#64748b">Time remaining<br><span style="font-weight:600;color:{color}">{remaining}</span></td></tr>
          </table>
        </td></tr>
        <tr><td style="padding:0 32px 32px;text-align:center">
          <a href="{dashboard}" style="display:inline-block;background-color:#2563eb;color:#fff;text-decoration:none;font-size:14px;font-weight:600;padding:12px 28px;border-radius:10px">Open dashboard</a>
        </td></tr>
      </table>
    </td></tr>
  </table>
</body>
</html>"#,
        badge = urgency.badge(),
    )
}

/// Renders the complete alert email for `to`.
pub fn alert_email(to: &str, notice: &AlertNotice) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: email_subject(notice),
        html: email_html(notice),
        attachment: None,
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
