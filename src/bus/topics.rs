//! Fixed topic names used across the outbox, queue, and saga components.

pub const BOOKING_EVENTS: &str = "booking-events";

pub mod booking_event_type {
    pub const RESERVED: &str = "booking.reserved";
    pub const CONFIRMED: &str = "booking.confirmed";
    pub const CANCELLED: &str = "booking.cancelled";
    pub const EXPIRED: &str = "booking.expired";
}

pub fn saga_command_topic(saga_type: &str, step: &str) -> String {
    format!("saga.{saga_type}.{step}.command")
}

pub fn saga_event_topic(saga_type: &str, step: &str) -> String {
    format!("saga.{saga_type}.{step}.event")
}

pub fn dlq_topic(original_topic: &str) -> String {
    format!("{original_topic}.dlq")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saga_topics_follow_naming_convention() {
        assert_eq!(
            saga_command_topic("booking", "reserve-seats"),
            "saga.booking.reserve-seats.command"
        );
        assert_eq!(
            saga_event_topic("booking", "reserve-seats"),
            "saga.booking.reserve-seats.event"
        );
    }

    #[test]
    fn dlq_topic_is_suffixed() {
        assert_eq!(dlq_topic("booking-events"), "booking-events.dlq");
    }
}
