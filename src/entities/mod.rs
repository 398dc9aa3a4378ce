pub mod booking;
pub mod dead_letter;
pub mod outbox_event;
pub mod saga_instance;

pub use booking::Entity as BookingEntity;
pub use dead_letter::Entity as DeadLetterEntity;
pub use outbox_event::Entity as OutboxEventEntity;
pub use saga_instance::Entity as SagaInstanceEntity;
