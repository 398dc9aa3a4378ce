//! Concrete three-step booking saga: reserve seats, take payment, confirm
//! the booking. `confirm-booking` has no compensation — once a booking is
//! confirmed the only way out is a separate, user-initiated cancellation.

use super::{SagaDefinition, SagaStep};
use crate::errors::ServiceError;
use crate::reservation::{ReservationService, ReserveSeatsRequest};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const SAGA_TYPE: &str = "booking";

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, booking_id: Uuid, user_id: Uuid, amount: Decimal) -> Result<String, ServiceError>;
    async fn refund(&self, payment_id: &str) -> Result<(), ServiceError>;
}

/// Builds the `reserve-seats -> process-payment -> confirm-booking` saga.
pub fn definition(reservation: Arc<ReservationService>, payment: Arc<dyn PaymentGateway>) -> SagaDefinition {
    SagaDefinition {
        saga_type: SAGA_TYPE.to_string(),
        steps: vec![
            Arc::new(ReserveSeatsStep {
                reservation: reservation.clone(),
            }),
            Arc::new(ProcessPaymentStep { payment: payment.clone() }),
            Arc::new(ConfirmBookingStep { reservation }),
        ],
    }
}

struct ReserveSeatsStep {
    reservation: Arc<ReservationService>,
}

#[async_trait]
impl SagaStep for ReserveSeatsStep {
    fn name(&self) -> &str {
        "reserve-seats"
    }

    async fn execute(&self, context: &mut Value) -> Result<(), ServiceError> {
        let user_id = field_uuid(context, "user_id")?;
        let zone_id = field_uuid(context, "zone_id")?;
        let event_id = field_uuid(context, "event_id")?;
        let show_id = field_uuid(context, "show_id")?;
        let quantity = field_i64(context, "quantity")?;
        let unit_price = field_decimal(context, "unit_price")?;
        let idempotency_key = field_string(context, "idempotency_key")?;
        let queue_pass = field_string(context, "queue_pass")?;

        let result = self
            .reservation
            .reserve_seats(ReserveSeatsRequest {
                idempotency_key,
                user_id,
                zone_id,
                event_id,
                show_id,
                quantity,
                unit_price,
                queue_pass,
            })
            .await?;

        context["booking_id"] = json!(result.booking_id);
        Ok(())
    }

    async fn compensate(&self, context: &Value) -> Result<(), ServiceError> {
        let Some(booking_id) = context.get("booking_id").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        let booking_id = Uuid::parse_str(booking_id).map_err(ServiceError::internal)?;
        let user_id = field_uuid(context, "user_id")?;
        self.reservation.cancel_booking(booking_id, user_id).await?;
        Ok(())
    }
}

struct ProcessPaymentStep {
    payment: Arc<dyn PaymentGateway>,
}

#[async_trait]
impl SagaStep for ProcessPaymentStep {
    fn name(&self) -> &str {
        "process-payment"
    }

    async fn execute(&self, context: &mut Value) -> Result<(), ServiceError> {
        let booking_id = field_uuid(context, "booking_id")?;
        let user_id = field_uuid(context, "user_id")?;
        let amount = field_decimal(context, "unit_price")? * Decimal::from(field_i64(context, "quantity")?);

        let payment_id = self.payment.charge(booking_id, user_id, amount).await?;
        context["payment_id"] = json!(payment_id);
        Ok(())
    }

    async fn compensate(&self, context: &Value) -> Result<(), ServiceError> {
        let Some(payment_id) = context.get("payment_id").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        self.payment.refund(payment_id).await
    }
}

struct ConfirmBookingStep {
    reservation: Arc<ReservationService>,
}

#[async_trait]
impl SagaStep for ConfirmBookingStep {
    fn name(&self) -> &str {
        "confirm-booking"
    }

    async fn execute(&self, context: &mut Value) -> Result<(), ServiceError> {
        let booking_id = field_uuid(context, "booking_id")?;
        let user_id = field_uuid(context, "user_id")?;
        let payment_id = field_string(context, "payment_id")?;
        self.reservation.confirm_booking(booking_id, user_id, &payment_id).await?;
        Ok(())
    }

    async fn compensate(&self, _context: &Value) -> Result<(), ServiceError> {
        Ok(())
    }
}

fn field_uuid(context: &Value, key: &str) -> Result<Uuid, ServiceError> {
    context
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::internal(format!("saga context missing {key}")))
        .and_then(|s| Uuid::parse_str(s).map_err(ServiceError::internal))
}

fn field_i64(context: &Value, key: &str) -> Result<i64, ServiceError> {
    context
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ServiceError::internal(format!("saga context missing {key}")))
}

fn field_decimal(context: &Value, key: &str) -> Result<Decimal, ServiceError> {
    context
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::internal(format!("saga context missing {key}")))
        .and_then(|s| s.parse().map_err(ServiceError::internal))
}

fn field_string(context: &Value, key: &str) -> Result<String, ServiceError> {
    context
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ServiceError::internal(format!("saga context missing {key}")))
}

/// Payment gateway used in tests: always succeeds, remembers refunds.
pub struct MockPaymentGateway {
    pub charges: tokio::sync::Mutex<Vec<(Uuid, Decimal)>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            charges: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, booking_id: Uuid, _user_id: Uuid, amount: Decimal) -> Result<String, ServiceError> {
        self.charges.lock().await.push((booking_id, amount));
        Ok(format!("pay_{booking_id}"))
    }

    async fn refund(&self, _payment_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[tokio::test]
    async fn mock_gateway_records_charges() {
        let gateway = MockPaymentGateway::new();
        let booking_id = Uuid::new_v4();
        let payment_id = gateway.charge(booking_id, Uuid::new_v4(), Decimal::new(1000, 2)).await.unwrap();
        assert!(payment_id.starts_with("pay_"));
        assert_eq!(gateway.charges.lock().await.len(), 1);
    }

    mockall::mock! {
        pub Gateway {}

        #[async_trait]
        impl PaymentGateway for Gateway {
            async fn charge(&self, booking_id: Uuid, user_id: Uuid, amount: Decimal) -> Result<String, ServiceError>;
            async fn refund(&self, payment_id: &str) -> Result<(), ServiceError>;
        }
    }

    /// Exercises `ProcessPaymentStep` directly, without a `ReservationService`
    /// or Redis in the loop, by mocking the payment gateway seam.
    #[tokio::test]
    async fn process_payment_step_charges_quantity_times_unit_price_and_records_payment_id() {
        let booking_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let mut mock = MockGateway::new();
        mock.expect_charge()
            .with(eq(booking_id), eq(user_id), eq(Decimal::new(4000, 2)))
            .times(1)
            .returning(move |_, _, _| Ok(format!("pay_{booking_id}")));

        let step = ProcessPaymentStep {
            payment: Arc::new(mock),
        };

        let mut context = json!({
            "booking_id": booking_id,
            "user_id": user_id,
            "unit_price": "20.00",
            "quantity": 2,
        });

        step.execute(&mut context).await.unwrap();
        assert_eq!(context["payment_id"], json!(format!("pay_{booking_id}")));
    }

    #[tokio::test]
    async fn process_payment_step_compensation_refunds_the_recorded_payment_id() {
        let mut mock = MockGateway::new();
        mock.expect_charge()
            .returning(|booking_id, _, _| Ok(format!("pay_{booking_id}")));
        mock.expect_refund()
            .with(eq("pay_refund_me"))
            .times(1)
            .returning(|_| Ok(()));

        let step = ProcessPaymentStep {
            payment: Arc::new(mock),
        };

        let context = json!({ "payment_id": "pay_refund_me" });
        step.compensate(&context).await.unwrap();
    }

    #[tokio::test]
    async fn process_payment_step_propagates_gateway_failure() {
        let mut mock = MockGateway::new();
        mock.expect_charge()
            .returning(|_, _, _| Err(ServiceError::DependencyUnavailable("payment processor down".to_string())));

        let step = ProcessPaymentStep {
            payment: Arc::new(mock),
        };

        let mut context = json!({
            "booking_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "unit_price": "10.00",
            "quantity": 1,
        });

        let err = step.execute(&mut context).await.unwrap_err();
        assert!(matches!(err, ServiceError::DependencyUnavailable(_)));
    }
}
