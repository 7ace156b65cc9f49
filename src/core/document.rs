use crate::domain::model::MailEntry;
use crate::utils::error::{Result, SyncError};
use chrono::DateTime;
use printpdf::*;
use std::io::BufWriter;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 20.0;
const LINE_HEIGHT: f32 = 5.0;
const FONT_SIZE: f32 = 10.0;
const MAX_CHARS: usize = 95;

fn pdf_error(context: &str, e: impl std::fmt::Display) -> SyncError {
    SyncError::DocumentError {
        message: format!("{}: {}", context, e),
    }
}

/// 寄送時間轉成 "May 3 2024, 10:15:00 am"；無法解析時保留原字串
pub fn format_sent_time(sent_time: Option<&str>) -> String {
    match sent_time {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.format("%B %-d %Y, %-I:%M:%S %P").to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => "No date available".to_string(),
    }
}

/// 單封郵件在 PDF 中的文字行
pub fn mail_lines(index: usize, mail: &MailEntry) -> Vec<String> {
    let mut lines = vec![
        format!("MAIL {}:", index + 1),
        format!("Sent: {}", format_sent_time(mail.sent_time.as_deref())),
        format!("Subject: {}", mail.subject),
        format!("From: {}", mail.from),
        format!("To: {}", mail.to),
        String::new(),
        "Content:".to_string(),
    ];

    for paragraph in mail.content.lines() {
        lines.extend(wrap_text(paragraph, MAX_CHARS));
    }
    lines
}

/// 把郵件依序寫成 PDF，回傳 PDF 內容
pub fn render_mail_pdf(title: &str, mails: &[MailEntry]) -> Result<Vec<u8>> {
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| pdf_error("PDF font error", e))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| pdf_error("PDF font error", e))?;

    let mut layer = doc.get_page(page1).get_layer(layer1);
    let mut y = Mm(TOP);

    for (index, mail) in mails.iter().enumerate() {
        if index > 0 {
            // 郵件之間留三行空白
            y -= Mm(LINE_HEIGHT * 3.0);
        }

        for (line_no, line) in mail_lines(index, mail).iter().enumerate() {
            if y < Mm(BOTTOM) {
                let (page, page_layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
                layer = doc.get_page(page).get_layer(page_layer);
                y = Mm(TOP);
            }

            let face = if line_no == 0 { &bold } else { &font };
            layer.use_text(line.as_str(), FONT_SIZE, Mm(LEFT), y, face);
            y -= Mm(LINE_HEIGHT);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| pdf_error("PDF save error", e))?;
    buf.into_inner().map_err(|e| pdf_error("PDF buffer error", e))
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(content: &str) -> MailEntry {
        MailEntry {
            subject: "Results".to_string(),
            from: "clinic@example.com".to_string(),
            to: "jane@example.com".to_string(),
            sent_time: Some("2024-05-03T10:15:00+01:00".to_string()),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_format_sent_time() {
        assert_eq!(
            format_sent_time(Some("2024-05-03T10:15:00+01:00")),
            "May 3 2024, 10:15:00 am"
        );
        assert_eq!(format_sent_time(Some("yesterday")), "yesterday");
        assert_eq!(format_sent_time(None), "No date available");
    }

    #[test]
    fn test_mail_lines_layout() {
        let lines = mail_lines(1, &mail("Hello\n\nBye"));
        assert_eq!(lines[0], "MAIL 2:");
        assert_eq!(lines[2], "Subject: Results");
        assert_eq!(lines[6], "Content:");
        assert_eq!(&lines[7..], &["Hello", "", "Bye"]);
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }

    #[test]
    fn test_render_mail_pdf_spans_pages() {
        let long = (0..200).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let bytes = render_mail_pdf("emails-Jane", &[mail("short"), mail(&long)]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
