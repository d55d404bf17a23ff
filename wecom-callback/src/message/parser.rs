//! WeCom message document parser.
//!
//! Extracts the sender and message kind from a decrypted callback document,
//! plus the content field that kind requires.
//! Reference: https://developer.work.weixin.qq.com/document/path/90239

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::types::{MessageKind, ParsedMessage};
use crate::xml::read_fields;

/// Reasons a decrypted document cannot become a [`ParsedMessage`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed message document: {0}")]
    Malformed(String),

    #[error("missing required field {0}")]
    MissingField(&'static str),
}

/// Parse a decrypted message document.
///
/// `FromUserName` and `MsgType` are always required. A `text` message also
/// requires `Content`, an `image` message requires `PicUrl`. Other kinds
/// parse as [`MessageKind::Unknown`] with no content.
///
/// A missing or empty required field fails the whole parse.
pub fn parse_message(xml: &str) -> Result<ParsedMessage, ParseError> {
    let mut fields = read_fields(xml).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let sender_id = required(&mut fields, "FromUserName")?;
    let msg_type = required(&mut fields, "MsgType")?;
    let kind = MessageKind::from_msg_type(&msg_type);

    let (text_content, image_url) = match kind {
        MessageKind::Text => (Some(required(&mut fields, "Content")?), None),
        MessageKind::Image => (None, Some(required(&mut fields, "PicUrl")?)),
        MessageKind::Unknown => (None, None),
    };

    debug!(
        msg_type = %msg_type,
        kind = ?kind,
        field_count = fields.len(),
        "message_parse_complete"
    );

    Ok(ParsedMessage {
        sender_id,
        kind,
        text_content,
        image_url,
    })
}

fn required(fields: &mut HashMap<String, String>, name: &'static str) -> Result<String, ParseError> {
    match fields.remove(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ParseError::MissingField(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(sender: &str, content: &str) -> String {
        format!(
            r#"<xml>
<ToUserName><![CDATA[wx5823bf96d3bd56c7]]></ToUserName>
<FromUserName><![CDATA[{}]]></FromUserName>
<CreateTime>1348831860</CreateTime>
<MsgType><![CDATA[text]]></MsgType>
<Content><![CDATA[{}]]></Content>
<MsgId>1234567890123456</MsgId>
<AgentID>1</AgentID>
</xml>"#,
            sender, content
        )
    }

    #[test]
    fn test_parse_text_message() {
        let parsed = parse_message(&text_message("alice", "hi")).unwrap();

        assert_eq!(
            parsed,
            ParsedMessage {
                sender_id: "alice".to_string(),
                kind: MessageKind::Text,
                text_content: Some("hi".to_string()),
                image_url: None,
            }
        );
    }

    #[test]
    fn test_parse_is_deterministic() {
        let xml = text_message("alice", "hi");
        assert_eq!(parse_message(&xml), parse_message(&xml));
    }

    #[test]
    fn test_parse_image_message() {
        let xml = r#"<xml>
<ToUserName><![CDATA[corp]]></ToUserName>
<FromUserName><![CDATA[carol]]></FromUserName>
<CreateTime>1348831860</CreateTime>
<MsgType><![CDATA[image]]></MsgType>
<PicUrl><![CDATA[https://wework.qpic.cn/pic.jpg]]></PicUrl>
<MediaId><![CDATA[media_id]]></MediaId>
<MsgId>1234567890123456</MsgId>
</xml>"#;

        let parsed = parse_message(xml).unwrap();
        assert_eq!(parsed.sender_id, "carol");
        assert_eq!(parsed.kind, MessageKind::Image);
        assert_eq!(parsed.image_url.as_deref(), Some("https://wework.qpic.cn/pic.jpg"));
        assert_eq!(parsed.text_content, None);
    }

    #[test]
    fn test_parse_unknown_kind() {
        let xml = r#"<xml>
<FromUserName><![CDATA[dave]]></FromUserName>
<MsgType><![CDATA[voice]]></MsgType>
<MediaId><![CDATA[media_id]]></MediaId>
</xml>"#;

        let parsed = parse_message(xml).unwrap();
        assert_eq!(parsed.kind, MessageKind::Unknown);
        assert_eq!(parsed.text_content, None);
        assert_eq!(parsed.image_url, None);
        assert!(parsed.into_dispatch_job(0).is_none());
    }

    #[test]
    fn test_parse_text_missing_content() {
        let xml = r#"<xml>
<FromUserName><![CDATA[alice]]></FromUserName>
<MsgType><![CDATA[text]]></MsgType>
</xml>"#;

        assert_eq!(parse_message(xml), Err(ParseError::MissingField("Content")));
    }

    #[test]
    fn test_parse_text_empty_content() {
        assert_eq!(
            parse_message(&text_message("alice", "")),
            Err(ParseError::MissingField("Content"))
        );
    }

    #[test]
    fn test_parse_image_missing_pic_url() {
        let xml = r#"<xml>
<FromUserName><![CDATA[carol]]></FromUserName>
<MsgType><![CDATA[image]]></MsgType>
<Content><![CDATA[not a picture]]></Content>
</xml>"#;

        assert_eq!(parse_message(xml), Err(ParseError::MissingField("PicUrl")));
    }

    #[test]
    fn test_parse_missing_sender() {
        let xml = "<xml><MsgType><![CDATA[text]]></MsgType><Content>hi</Content></xml>";
        assert_eq!(parse_message(xml), Err(ParseError::MissingField("FromUserName")));
    }

    #[test]
    fn test_parse_missing_msg_type() {
        let xml = "<xml><FromUserName>alice</FromUserName><Content>hi</Content></xml>";
        assert_eq!(parse_message(xml), Err(ParseError::MissingField("MsgType")));
    }

    #[test]
    fn test_parse_malformed_document() {
        assert!(matches!(parse_message(""), Err(ParseError::Malformed(_))));
        assert!(matches!(
            parse_message("<xml><FromUserName>alice</MsgType></xml>"),
            Err(ParseError::Malformed(_))
        ));
    }
}
