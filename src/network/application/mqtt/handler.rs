//! Incoming PUBLISH handling.

use super::codec::PublishInfo;

/// Receives the application messages the dispatcher decodes.
///
/// The message borrows from the session buffer and is only valid for the
/// duration of the call; a handler that needs the data later must copy it.
pub trait PublishHandler {
    /// Handle one incoming PUBLISH.
    ///
    /// `subscribed` tells whether the topic matches one of the session's
    /// topic filters.
    fn on_publish(&mut self, packet_id: Option<u16>, publish: &PublishInfo<'_>, subscribed: bool);
}

impl<H: PublishHandler + ?Sized> PublishHandler for &mut H {
    fn on_publish(&mut self, packet_id: Option<u16>, publish: &PublishInfo<'_>, subscribed: bool) {
        (**self).on_publish(packet_id, publish, subscribed)
    }
}

/// Handler that only logs what arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopicLogger;

impl PublishHandler for TopicLogger {
    fn on_publish(&mut self, packet_id: Option<u16>, publish: &PublishInfo<'_>, subscribed: bool) {
        if !subscribed {
            warn!(
                "Incoming PUBLISH on {}, which matches no subscribed filter.",
                publish.topic_name
            );
        }
        match core::str::from_utf8(publish.payload) {
            Ok(text) => info!(
                "Incoming PUBLISH on {} (id {:?}): {}",
                publish.topic_name,
                packet_id,
                text
            ),
            Err(_) => info!(
                "Incoming PUBLISH on {} (id {:?}): {} binary bytes.",
                publish.topic_name,
                packet_id,
                publish.payload.len()
            ),
        }
    }
}
