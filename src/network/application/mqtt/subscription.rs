//! Per-topic subscription state and SUBACK correlation.
//!
//! A [`TopicTable`] holds the configured topic filters in request order
//! together with the broker's verdict for each of them. Before every
//! SUBSCRIBE round the verdicts are reset to [`AckStatus::Pending`]; the
//! SUBACK's return codes are then applied one byte per filter, in the same
//! order the filters were sent.

use super::codec::{QoS, SUBACK_FAILURE, SubscribeInfo};
use super::error::SessionError;
use heapless::Vec;

/// Broker verdict for one topic filter.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AckStatus {
    /// No SUBACK covering this filter has been seen yet.
    Pending,
    /// The broker accepted the filter with the given maximum QoS.
    Accepted(QoS),
    /// The broker refused the filter (return code 0x80).
    Rejected,
}

#[cfg(feature = "defmt")]
impl defmt::Format for AckStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            AckStatus::Pending => defmt::write!(f, "Pending"),
            AckStatus::Accepted(qos) => defmt::write!(f, "Accepted({})", qos),
            AckStatus::Rejected => defmt::write!(f, "Rejected"),
        }
    }
}

/// A topic filter together with its requested QoS and current verdict.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TopicSubscription<'a> {
    /// Topic filter.
    pub topic_filter: &'a str,
    /// Requested maximum QoS.
    pub qos: QoS,
    /// Broker verdict.
    pub status: AckStatus,
}

/// Ordered set of at most `T` topic filters and their SUBACK verdicts.
#[derive(Debug, Clone)]
pub struct TopicTable<'a, const T: usize> {
    requests: Vec<SubscribeInfo<'a>, T>,
    statuses: Vec<AckStatus, T>,
}

impl<'a, const T: usize> TopicTable<'a, T> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
            statuses: Vec::new(),
        }
    }

    /// Build a table requesting `qos` for every filter in `filters`.
    pub fn from_filters(filters: &[&'a str], qos: QoS) -> Result<Self, SessionError> {
        let mut table = Self::new();
        for filter in filters {
            table.push(filter, qos)?;
        }
        Ok(table)
    }

    /// Append a filter. Its verdict starts out as [`AckStatus::Pending`].
    pub fn push(&mut self, topic_filter: &'a str, qos: QoS) -> Result<(), SessionError> {
        self.requests
            .push(SubscribeInfo { topic_filter, qos })
            .map_err(|_| SessionError::TooManyTopics)?;
        // Both vectors share the capacity and grow together.
        self.statuses
            .push(AckStatus::Pending)
            .map_err(|_| SessionError::TooManyTopics)
    }

    /// The filters in request order, ready for the SUBSCRIBE serializer.
    pub fn requests(&self) -> &[SubscribeInfo<'a>] {
        &self.requests
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the table holds no filter.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Verdict for the filter at `index`.
    pub fn status(&self, index: usize) -> Option<AckStatus> {
        self.statuses.get(index).copied()
    }

    /// Iterate over filters and verdicts in request order.
    pub fn iter(&self) -> impl Iterator<Item = TopicSubscription<'a>> + '_ {
        self.requests
            .iter()
            .zip(self.statuses.iter())
            .map(|(request, status)| TopicSubscription {
                topic_filter: request.topic_filter,
                qos: request.qos,
                status: *status,
            })
    }

    /// Mark every filter [`AckStatus::Pending`].
    pub fn reset_statuses(&mut self) {
        for status in self.statuses.iter_mut() {
            *status = AckStatus::Pending;
        }
    }

    /// Record the return codes of a SUBACK.
    ///
    /// `return_codes` is the SUBACK payload after the packet identifier: one
    /// byte per filter. A code with the top bit set rejects the filter, any
    /// other code accepts it with the QoS in its low bits.
    pub fn apply_suback(&mut self, return_codes: &[u8]) -> Result<(), SessionError> {
        if return_codes.len() != self.statuses.len() {
            return Err(SessionError::SubAckCountMismatch {
                expected: self.statuses.len(),
                received: return_codes.len(),
            });
        }

        for (index, (status, code)) in self.statuses.iter_mut().zip(return_codes).enumerate() {
            *status = if code & SUBACK_FAILURE != 0 {
                warn!(
                    "Broker rejected subscription to {}.",
                    self.requests[index].topic_filter
                );
                AckStatus::Rejected
            } else {
                // Granted QoS values above 2 are reserved; take the highest.
                AckStatus::Accepted(QoS::try_from(code & 0x03).unwrap_or(QoS::ExactlyOnce))
            };
        }
        Ok(())
    }

    /// Whether the broker accepted every filter.
    pub fn all_accepted(&self) -> bool {
        self.statuses
            .iter()
            .all(|status| matches!(status, AckStatus::Accepted(_)))
    }

    /// Whether `topic` is matched by at least one filter of the table.
    pub fn matches(&self, topic: &str) -> bool {
        self.requests
            .iter()
            .any(|request| topic_matches_filter(topic, request.topic_filter))
    }
}

impl<const T: usize> Default for TopicTable<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// MQTT topic filter matching.
///
/// `+` matches exactly one level, a trailing `#` matches the parent level and
/// everything below it. Topics starting with `$` are not matched by a filter
/// that starts with a wildcard.
///
/// ```rust
/// use lwmqtt::network::application::mqtt::topic_matches_filter;
///
/// assert!(topic_matches_filter("sensors/kitchen/temp", "sensors/+/temp"));
/// assert!(topic_matches_filter("sensors", "sensors/#"));
/// assert!(!topic_matches_filter("$SYS/uptime", "#"));
/// ```
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
