use crate::utils::error::{Result, SyncError};
use regex::Regex;

/// 法律聲明區塊的結尾判斷
#[derive(Debug)]
enum NoticeEnd {
    /// 只移除符合的文字本身
    Match,
    /// 移除到下一個空行（或內容結尾）
    BlankLine,
    /// 移除到指定標記之前（或內容結尾），標記本身保留
    Marker(Regex),
}

#[derive(Debug)]
struct NoticeRule {
    start: Regex,
    end: NoticeEnd,
}

const BUILTIN_NOTICES: &[(&str, Option<&str>)] = &[
    (r"CONFIDENTIALITY NOTICE:", None),
    (r"AVISO LEGAL:", Some(r"PROTECCIÓN DE DATOS")),
    (r"LEGAL WARNING:", Some(r"This message and its attachments")),
    (r"(?i)PROTECCIÓN DE DATOS", None),
    (r"(?i)Confidentiality:", None),
    (
        r"(?i)In compliance with the European Union General Data Protection Regulation \(GDPR\), you receive this message",
        Some(r"(?i)Headquarter:"),
    ),
    (r"(?i)Headquarter:", None),
    (r"(?i)This message and its attachments are addressed exclusively", None),
];

/// 郵件內容清理：HTML 轉純文字、移除法律聲明、壓縮多餘空行
#[derive(Debug)]
pub struct MailCleaner {
    rules: Vec<NoticeRule>,
    blank_line: Regex,
    blank_runs: Regex,
}

/// html2text 的折行寬度；PDF 端會再自行折行
const TEXT_WIDTH: usize = 1000;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SyncError::InvalidConfigValueError {
        field: "mail.notice_patterns".to_string(),
        value: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl MailCleaner {
    /// `extra_patterns` 為設定檔中的額外正規表達式，符合的文字直接移除
    pub fn new(extra_patterns: &[String]) -> Result<Self> {
        let mut rules = vec![NoticeRule {
            start: compile(r"\[crm\\img_id:[^\]]*\]")?,
            end: NoticeEnd::Match,
        }];

        for (start, marker) in BUILTIN_NOTICES {
            rules.push(NoticeRule {
                start: compile(start)?,
                end: match marker {
                    Some(marker) => NoticeEnd::Marker(compile(marker)?),
                    None => NoticeEnd::BlankLine,
                },
            });
        }

        for pattern in extra_patterns {
            rules.push(NoticeRule {
                start: compile(pattern)?,
                end: NoticeEnd::Match,
            });
        }

        Ok(Self {
            rules,
            blank_line: compile(r"\n[ \t]*\n")?,
            blank_runs: compile(r"(\n\s*){3,}")?,
        })
    }

    pub fn clean(&self, content: &str) -> String {
        self.strip_notices(&self.html_to_text(content))
    }

    /// 在純文字上套用移除規則並壓縮空行
    fn strip_notices(&self, text: &str) -> String {
        let mut text = text.to_string();
        for rule in &self.rules {
            text = self.strip_rule(&text, rule);
        }

        self.blank_runs.replace_all(&text, "\n\n").trim().to_string()
    }

    fn strip_rule(&self, text: &str, rule: &NoticeRule) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(found) = rule.start.find(rest) {
            if found.as_str().is_empty() {
                break;
            }
            result.push_str(&rest[..found.start()]);
            let tail = &rest[found.end()..];
            let cut = match &rule.end {
                NoticeEnd::Match => 0,
                NoticeEnd::BlankLine => self.blank_line.find(tail).map_or(tail.len(), |m| m.start()),
                NoticeEnd::Marker(marker) => marker.find(tail).map_or(tail.len(), |m| m.start()),
            };
            rest = &tail[cut..];
        }

        result.push_str(rest);
        result
    }

    /// HTML 轉純文字；解析失敗時退回原始內容
    pub fn html_to_text(&self, html: &str) -> String {
        let text = match html2text::config::plain().string_from_read(html.as_bytes(), TEXT_WIDTH) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("⚠️ Could not convert mail HTML to text: {}", e);
                html.to_string()
            }
        };

        text.replace('\u{a0}', " ")
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> MailCleaner {
        MailCleaner::new(&[]).unwrap()
    }

    #[test]
    fn test_html_to_text() {
        let text = cleaner().html_to_text(
            "<html><body><p>Hello&nbsp;Jane,</p><div>Line one<br/>Line two</div><p>&lt;ok&gt; &amp; &#233;</p></body></html>",
        );
        assert!(text.contains("Hello Jane,"), "{}", text);
        assert!(text.contains("Line one\nLine two"), "{}", text);
        assert!(text.contains("<ok> & é"), "{}", text);
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_named_entities_are_decoded() {
        let text = cleaner().html_to_text("<p>Estimado Se&ntilde;or, informaci&oacute;n adjunta &euro;</p>");
        assert_eq!(text.trim(), "Estimado Señor, información adjunta €");
    }

    #[test]
    fn test_comments_are_dropped() {
        let text = cleaner().html_to_text("<!-- if a > b --><p>Hi</p>");
        assert_eq!(text.trim(), "Hi");
    }

    #[test]
    fn test_clean_html_mail_with_encoded_notice() {
        let html = "<p>Body</p><p>AVISO LEGAL: texto legal m&aacute;s texto PROTECCI&Oacute;N DE DATOS secci&oacute;n final</p>";
        assert_eq!(cleaner().clean(html), "Body");
    }

    #[test]
    fn test_strips_notice_until_blank_line() {
        let content = "Thanks for your visit.\n\nCONFIDENTIALITY NOTICE: this email\nis private.\n\nKind regards";
        assert_eq!(cleaner().strip_notices(content), "Thanks for your visit.\n\nKind regards");
    }

    #[test]
    fn test_strips_notice_until_marker() {
        let content = "Body\nAVISO LEGAL: texto legal\nmás texto PROTECCIÓN DE DATOS sección final";
        assert_eq!(cleaner().strip_notices(content), "Body");
    }

    #[test]
    fn test_strips_inline_image_markers_and_collapses_blank_lines() {
        let content = "Hi [crm\\img_id:abc123] there\n\n\n\n\nBye";
        assert_eq!(cleaner().strip_notices(content), "Hi  there\n\nBye");
    }

    #[test]
    fn test_extra_patterns() {
        let cleaner = MailCleaner::new(&["(?i)sent from my phone".to_string()]).unwrap();
        assert_eq!(cleaner.strip_notices("See you\nSent from my Phone"), "See you");
    }

    #[test]
    fn test_invalid_extra_pattern() {
        assert!(MailCleaner::new(&["(".to_string()]).is_err());
    }
}
