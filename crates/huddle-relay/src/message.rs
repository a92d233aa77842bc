use std::sync::Arc;

use bytes::Bytes;

use crate::connection::Frame;
use crate::types::ConnectionId;

/// Who, among a room's members, receives a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Every member, the sending connection included.
    AllMembers,
    /// Every member except the exact sending connection.
    ExcludeSender,
}

/// One inbound message, tagged with its sender.
///
/// The routing rule is fixed by the kind: chat text is echoed back to the
/// sender, media frames are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Chat { sender: ConnectionId, text: Arc<str> },
    Media { sender: ConnectionId, payload: Bytes },
}

impl Message {
    pub fn chat(sender: ConnectionId, text: impl Into<Arc<str>>) -> Self {
        Message::Chat {
            sender,
            text: text.into(),
        }
    }

    pub fn media(sender: ConnectionId, payload: impl Into<Bytes>) -> Self {
        Message::Media {
            sender,
            payload: payload.into(),
        }
    }

    /// Classify a raw transport payload: binary frames are media, text
    /// frames are chat.
    ///
    /// Text payloads are decoded as UTF-8; invalid sequences become U+FFFD
    /// rather than failing the whole message.
    pub fn from_payload(sender: ConnectionId, payload: Bytes, is_binary: bool) -> Self {
        if is_binary {
            return Message::Media { sender, payload };
        }
        let text: Arc<str> = String::from_utf8_lossy(&payload).into();
        Message::Chat { sender, text }
    }

    pub fn sender(&self) -> &ConnectionId {
        match self {
            Message::Chat { sender, .. } | Message::Media { sender, .. } => sender,
        }
    }

    pub fn routing(&self) -> Routing {
        match self {
            Message::Chat { .. } => Routing::AllMembers,
            Message::Media { .. } => Routing::ExcludeSender,
        }
    }

    /// Whether `member` is on this message's recipient list.
    pub fn is_recipient(&self, member: &ConnectionId) -> bool {
        match self.routing() {
            Routing::AllMembers => true,
            Routing::ExcludeSender => member != self.sender(),
        }
    }

    /// The frame handed to each recipient. Shares the payload buffer.
    pub fn frame(&self) -> Frame {
        match self {
            Message::Chat { text, .. } => Frame::Text(text.clone()),
            Message::Media { payload, .. } => Frame::Binary(payload.clone()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Chat { .. } => "chat",
            Message::Media { .. } => "media",
        }
    }
}
