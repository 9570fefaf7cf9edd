//! Message envelope exchanged with remote agents.
//!
//! [`Message`] mirrors the envelope of the bus protocol: a set of routing
//! [`Properties`], free-form application properties, and an opaque body. The
//! identity fields (`message_id`, `correlation_id`, `reply_to`) are stamped by
//! the command client when a request is dispatched; callers leave them unset.

use std::collections::BTreeMap;

use bincode::{Decode, Encode};

/// Routing and identity properties carried by every [`Message`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Properties {
    /// Unique identifier of this message.
    pub message_id: Option<String>,
    /// Identifier of the request this message answers, if any.
    pub correlation_id: Option<String>,
    /// Address to which replies should be sent.
    pub reply_to: Option<String>,
    /// Destination address.
    pub to: Option<String>,
    /// Application-defined operation name.
    pub subject: Option<String>,
    /// MIME type of the body.
    pub content_type: Option<String>,
}

/// A command or reply travelling over the bus.
///
/// # Examples
///
/// ```
/// use agentlink::Message;
///
/// let msg = Message::new(b"{}".to_vec())
///     .with_subject("getQueueDepth")
///     .with_property("queue", "orders");
/// assert_eq!(msg.properties.subject.as_deref(), Some("getQueueDepth"));
/// assert_eq!(msg.application_properties.get("queue").map(String::as_str), Some("orders"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    /// Routing and identity properties.
    pub properties: Properties,
    /// Application-defined string properties.
    pub application_properties: BTreeMap<String, String>,
    /// Opaque payload.
    pub body: Vec<u8>,
}

impl Message {
    /// Create a message carrying `body` with no properties set.
    #[must_use]
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Set the subject property.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.properties.subject = Some(subject.into());
        self
    }

    /// Insert an application property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }

    /// Return the correlation identifier, if set.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> { self.properties.correlation_id.as_deref() }

    /// Stamp the identity fields used to correlate a reply with this message.
    ///
    /// `token` becomes both the message id and the correlation id.
    pub fn stamp(&mut self, token: &str, reply_to: &str) {
        self.properties.message_id = Some(token.to_owned());
        self.properties.correlation_id = Some(token.to_owned());
        self.properties.reply_to = Some(reply_to.to_owned());
    }
}
