//! Channel-specific alert payloads.
//!
//! Truncation happens here, before any rate limiting or transport concern,
//! so every channel receives fields that fit its documented limits.

use crate::models::{status_color, status_emoji, SkillResult, Status};
use serde_json::{json, Value};

/// Discord caps embed field values at 1024 characters.
pub const DISCORD_FIELD_LIMIT: usize = 1024;

/// Slack caps section text at 3000 characters; leave room for the heading.
pub const SLACK_ERROR_LIMIT: usize = 2000;

/// Keep console alerts readable.
pub const STDOUT_ERROR_LIMIT: usize = 500;

/// How many artifact references the console block lists.
pub const STDOUT_ARTIFACT_PREVIEW: usize = 3;

/// Appended to every FAIL alert.
pub const CALL_TO_ACTION: &str = "Need help? Check the runbook for this skill.";

const RULE_WIDTH: usize = 80;

/// Truncate to at most `limit` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Human readable block for the console channel.
pub fn format_stdout(result: &SkillResult, target_url: Option<&str>) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![
        rule.clone(),
        format!("{} ALERT: {}", result.status.emoji(), result.skill_name),
        rule.clone(),
        format!("Status:    {}", result.status),
        format!("Timestamp: {}", result.timestamp.to_rfc3339()),
        format!("Summary:   {}", result.summary),
    ];

    if let Some(url) = target_url {
        lines.push(format!("Target:    {}", url));
    }

    if let Some(ref error) = result.error {
        lines.push(format!(
            "Error:     {}",
            truncate_chars(error, STDOUT_ERROR_LIMIT)
        ));
    }

    if !result.artifacts.is_empty() {
        lines.push(format!("Artifacts: {} available", result.artifacts.len()));
        for (i, artifact) in result
            .artifacts
            .iter()
            .take(STDOUT_ARTIFACT_PREVIEW)
            .enumerate()
        {
            lines.push(format!("  [{}] {}", i + 1, artifact));
        }
    }

    if result.status == Status::Fail {
        lines.push(String::new());
        lines.push(CALL_TO_ACTION.to_string());
    }

    lines.push(rule);
    lines.join("\n")
}

/// Discord webhook payload with a single embed.
pub fn format_discord(result: &SkillResult, target_url: Option<&str>) -> Value {
    let status = result.status.as_str();
    let mut fields = vec![json!({
        "name": "Status",
        "value": status,
        "inline": true,
    })];

    if let Some(url) = target_url {
        fields.push(json!({
            "name": "Target",
            "value": format!("[Open]({})", url),
            "inline": true,
        }));
    }

    if let Some(ref error) = result.error {
        fields.push(json!({
            "name": "Error",
            "value": truncate_chars(error, DISCORD_FIELD_LIMIT),
            "inline": false,
        }));
    }

    if !result.artifacts.is_empty() {
        // Artifacts are not uploaded; only their count travels.
        fields.push(json!({
            "name": "Artifacts",
            "value": format!("{} available", result.artifacts.len()),
            "inline": true,
        }));
    }

    let mut embed = json!({
        "title": format!("{} {}", status_emoji(status), result.skill_name),
        "description": result.summary,
        "color": status_color(status),
        "timestamp": result.timestamp.to_rfc3339(),
        "fields": fields,
    });

    if result.status == Status::Fail {
        embed["footer"] = json!({ "text": CALL_TO_ACTION });
    }

    json!({ "embeds": [embed] })
}

/// Slack webhook payload using Block Kit.
pub fn format_slack(result: &SkillResult, target_url: Option<&str>) -> Value {
    let status = result.status.as_str();
    let unix = result.timestamp.timestamp();

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{} {}", status_emoji(status), result.skill_name),
            },
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Status:*\n{}", status) },
                {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Timestamp:*\n<!date^{}^{{date_short_pretty}} {{time}}|{}>",
                        unix,
                        result.timestamp.to_rfc3339()
                    ),
                },
            ],
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Summary:*\n{}", result.summary) },
        }),
    ];

    if let Some(url) = target_url {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Target:* <{}|Open>", url) },
        }));
    }

    if let Some(ref error) = result.error {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Error:*\n```{}```", truncate_chars(error, SLACK_ERROR_LIMIT)),
            },
        }));
    }

    if result.status == Status::Fail {
        blocks.push(json!({
            "type": "context",
            "elements": [{ "type": "mrkdwn", "text": CALL_TO_ACTION }],
        }));
    }

    json!({ "blocks": blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(error: &str) -> SkillResult {
        SkillResult::failed("pixel_auditor", error).with_artifact("shots/home.png")
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_discord_preserves_identity_fields() {
        let result = SkillResult::warn("headless_probe", "Checkout slow: 4.2s");
        let payload = format_discord(&result, None);
        let embed = &payload["embeds"][0];

        assert_eq!(embed["title"], "⚠️ headless_probe");
        assert_eq!(embed["description"], "Checkout slow: 4.2s");
        assert_eq!(embed["color"], 0xFFFF00);
        assert_eq!(embed["fields"][0]["value"], "WARN");
        assert!(embed.get("footer").is_none());
    }

    #[test]
    fn test_discord_truncates_error_to_exact_limit() {
        let long_error = "x".repeat(DISCORD_FIELD_LIMIT + 500);
        let payload = format_discord(&failing(&long_error), None);
        let fields = payload["embeds"][0]["fields"].as_array().unwrap();
        let error = fields.iter().find(|f| f["name"] == "Error").unwrap();

        assert_eq!(
            error["value"].as_str().unwrap().chars().count(),
            DISCORD_FIELD_LIMIT
        );
        assert_eq!(payload["embeds"][0]["footer"]["text"], CALL_TO_ACTION);
    }

    #[test]
    fn test_discord_target_and_artifacts() {
        let payload = format_discord(&failing("boom"), Some("https://shop.example.com"));
        let fields = payload["embeds"][0]["fields"].as_array().unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Status", "Target", "Error", "Artifacts"]);
    }

    #[test]
    fn test_slack_preserves_identity_fields() {
        let result = SkillResult::pass("shopify_doctor", "All good");
        let payload = format_slack(&result, None);
        let blocks = payload["blocks"].as_array().unwrap();

        assert_eq!(blocks[0]["text"]["text"], "✅ shopify_doctor");
        assert_eq!(blocks[1]["fields"][0]["text"], "*Status:*\nPASS");
        assert_eq!(blocks[2]["text"]["text"], "*Summary:*\nAll good");
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_slack_truncates_error_to_exact_limit() {
        let long_error = "é".repeat(SLACK_ERROR_LIMIT * 2);
        let payload = format_slack(&failing(&long_error), None);
        let blocks = payload["blocks"].as_array().unwrap();

        let text = blocks[3]["text"]["text"].as_str().unwrap();
        let inner = text
            .trim_start_matches("*Error:*\n```")
            .trim_end_matches("```");
        assert_eq!(inner.chars().count(), SLACK_ERROR_LIMIT);
        assert_eq!(blocks.last().unwrap()["type"], "context");
    }

    #[test]
    fn test_stdout_block() {
        let result = failing("timeout waiting for selector")
            .with_artifact("shots/cart.png")
            .with_artifact("shots/checkout.png")
            .with_artifact("shots/thanks.png");
        let text = format_stdout(&result, Some("https://shop.example.com"));

        assert!(text.contains("❌ ALERT: pixel_auditor"));
        assert!(text.contains("Status:    FAIL"));
        assert!(text.contains("Target:    https://shop.example.com"));
        assert!(text.contains("Artifacts: 4 available"));
        assert!(text.contains("  [3] shots/checkout.png"));
        assert!(!text.contains("shots/thanks.png"));
        assert!(text.contains(CALL_TO_ACTION));
    }

    #[test]
    fn test_stdout_pass_has_no_call_to_action() {
        let text = format_stdout(&SkillResult::pass("probe", "ok"), None);
        assert!(!text.contains(CALL_TO_ACTION));
        assert!(!text.contains("Error:"));
    }
}
