//! Packet identifier allocation.

/// Source of packet identifiers for SUBSCRIBE and UNSUBSCRIBE requests.
///
/// Identifiers increase by one per call and wrap from 65535 back to 1, so the
/// reserved value 0 is never handed out.
///
/// ```rust
/// use lwmqtt::network::application::mqtt::PacketIdAllocator;
///
/// let mut ids = PacketIdAllocator::new();
/// assert_eq!(ids.next(), 1);
/// assert_eq!(ids.next(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PacketIdAllocator {
    last: u16,
}

impl PacketIdAllocator {
    /// Create an allocator whose first identifier is 1.
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Create an allocator that continues after `last`.
    pub const fn starting_after(last: u16) -> Self {
        Self { last }
    }

    /// Hand out the next identifier.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u16 {
        self.last = match self.last.wrapping_add(1) {
            0 => 1,
            id => id,
        };
        self.last
    }

    /// The identifier handed out most recently, or 0 if none was.
    pub fn last(&self) -> u16 {
        self.last
    }
}
