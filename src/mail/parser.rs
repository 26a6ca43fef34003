use mail_parser::{Address, Addr, MessageParser, MimeHeaders};

use super::types::{AttachmentInfo, HeaderFields, MessageContent};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message source is empty")]
    Empty,
    #[error("message could not be parsed as MIME")]
    Malformed,
}

/// Extract the list-view header fields from a raw header block.
pub fn parse_header_fields(raw_header: &[u8]) -> HeaderFields {
    let mut fields = HeaderFields::new();
    let Some(message) = MessageParser::default().parse(raw_header) else {
        return fields;
    };

    if let Some(subject) = message.subject() {
        fields.insert("subject".into(), vec![subject.to_string()]);
    }
    if let Some(from) = message.from().and_then(format_address) {
        fields.insert("from".into(), vec![from]);
    }
    if let Some(to) = message.to().and_then(format_address) {
        fields.insert("to".into(), vec![to]);
    }
    if let Some(date) = message.date() {
        fields.insert("date".into(), vec![date.to_rfc822()]);
    }
    if let Some(id) = message.message_id() {
        fields.insert("message-id".into(), vec![id.to_string()]);
    }

    fields
}

/// Build a bounded text preview from a header block and a partial body.
///
/// The partial body is decoded through the MIME structure when possible and
/// used verbatim otherwise.
pub fn extract_preview(raw_header: &[u8], partial_body: &[u8], max_len: usize) -> String {
    let mut raw = Vec::with_capacity(raw_header.len() + 4 + partial_body.len());
    raw.extend_from_slice(raw_header);
    if !raw_header.ends_with(b"\r\n\r\n") && !raw_header.ends_with(b"\n\n") {
        raw.extend_from_slice(b"\r\n\r\n");
    }
    raw.extend_from_slice(partial_body);

    let decoded = MessageParser::default()
        .parse(&raw)
        .and_then(|message| message.body_text(0).map(|text| text.into_owned()))
        .filter(|text| !text.trim().is_empty());

    let text = match decoded {
        Some(text) => text,
        None => String::from_utf8_lossy(partial_body).into_owned(),
    };

    truncate_chars(text.trim(), max_len)
}

/// Parse a complete message source into the full view.
pub fn parse_message(uid: u32, raw: &[u8]) -> Result<MessageContent, ParseError> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::Empty);
    }

    let message = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Malformed)?;

    let attachments = message
        .attachments()
        .map(|part| AttachmentInfo {
            filename: part.attachment_name().map(|s| s.to_string()),
            content_type: part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size: part.contents().len(),
        })
        .collect();

    Ok(MessageContent {
        uid,
        subject: message.subject().map(|s| s.to_string()),
        from: message.from().and_then(format_address),
        to: message.to().and_then(format_address),
        date: message.date().map(|d| d.to_rfc3339()),
        message_id: message.message_id().map(|s| s.to_string()),
        text: message.body_text(0).map(|t| t.into_owned()),
        html: message.body_html(0).map(|h| h.into_owned()),
        attachments,
    })
}

fn format_address(address: &Address) -> Option<String> {
    let formatted: Vec<String> = address.iter().filter_map(format_addr).collect();
    if formatted.is_empty() {
        None
    } else {
        Some(formatted.join(", "))
    }
}

fn format_addr(addr: &Addr) -> Option<String> {
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => Some(format!("{} <{}>", name, address)),
        (None, Some(address)) => Some(address.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}

/// Truncate to at most `max_len` characters (never splits a code point).
pub fn truncate_chars(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
