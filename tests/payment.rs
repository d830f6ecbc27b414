//! Card payments: the Stripe client against a mock server, and the payment
//! service against an in-process gateway.

mod common;

use std::sync::Mutex;

use async_trait::async_trait;
use common::{TestResult, TestSetup};
use mockito::{Matcher, Server};
use ride_hailing_backend::entities::payment::{PaymentMethod, PaymentStatus};
use ride_hailing_backend::entities::user::UserRole;
use ride_hailing_backend::services::payment::{
    PaymentGateway, PaymentIntent, PaymentService, StripeGateway,
};
use ride_hailing_backend::services::wallet::WalletService;
use ride_hailing_backend::{AppError, AppResult};
use serde_json::json;
use uuid::Uuid;

const CURRENCY: &str = "usd";

/// Gateway whose intents report whatever status the test sets.
struct FakeGateway {
    status: Mutex<String>,
    created: Mutex<Vec<i64>>,
}

impl FakeGateway {
    fn new(status: &str) -> Self {
        Self {
            status: Mutex::new(status.to_string()),
            created: Mutex::new(Vec::new()),
        }
    }

    fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = status.to_string();
    }

    fn intent(&self, amount: i64) -> PaymentIntent {
        PaymentIntent {
            id: "pi_fake_1".to_string(),
            amount,
            currency: CURRENCY.to_string(),
            status: self.status.lock().unwrap().clone(),
            client_secret: Some("pi_fake_1_secret".to_string()),
            last_payment_error: None,
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        _currency: &str,
        _ride_id: Uuid,
    ) -> AppResult<PaymentIntent> {
        self.created.lock().unwrap().push(amount_minor);
        Ok(self.intent(amount_minor))
    }

    async fn retrieve_intent(&self, _intent_id: &str) -> AppResult<PaymentIntent> {
        Ok(self.intent(8373))
    }
}

/// Expected: form-encoded POST with bearer auth, intent parsed from the body
#[tokio::test]
async fn stripe_creates_payment_intent() -> TestResult {
    let mut server = Server::new_async().await;
    let ride_id = Uuid::new_v4();

    let mock = server
        .mock("POST", "/v1/payment_intents")
        .match_header("authorization", "Bearer sk_test_123")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("amount".into(), "8373".into()),
            Matcher::UrlEncoded("currency".into(), "usd".into()),
            Matcher::UrlEncoded("metadata[ride_id]".into(), ride_id.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "pi_123",
                "object": "payment_intent",
                "amount": 8373,
                "currency": "usd",
                "status": "requires_payment_method",
                "client_secret": "pi_123_secret_abc"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let gateway = StripeGateway::new(server.url(), "sk_test_123");
    let intent = gateway.create_intent(8373, "USD", ride_id).await?;

    assert_eq!(intent.id, "pi_123");
    assert_eq!(intent.client_secret.as_deref(), Some("pi_123_secret_abc"));
    assert_eq!(intent.local_status(), PaymentStatus::Pending);
    mock.assert_async().await;

    Ok(())
}

#[tokio::test]
async fn stripe_retrieves_payment_intent() -> TestResult {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/v1/payment_intents/pi_123")
        .match_header("authorization", "Bearer sk_test_123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "pi_123",
                "amount": 8373,
                "currency": "usd",
                "status": "succeeded",
                "client_secret": null
            })
            .to_string(),
        )
        .create_async()
        .await;

    let gateway = StripeGateway::new(server.url(), "sk_test_123");
    let intent = gateway.retrieve_intent("pi_123").await?;

    assert_eq!(intent.local_status(), PaymentStatus::Succeeded);
    mock.assert_async().await;

    Ok(())
}

/// Expected: the gateway's error message surfaces as a PaymentGateway error
#[tokio::test]
async fn stripe_error_maps_to_gateway_error() -> TestResult {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/v1/payment_intents")
        .with_status(402)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "error": { "message": "Your card was declined.", "type": "card_error" } })
                .to_string(),
        )
        .create_async()
        .await;

    let gateway = StripeGateway::new(server.url(), "sk_test_123");
    let result = gateway.create_intent(500, "usd", Uuid::new_v4()).await;

    match result {
        Err(AppError::PaymentGateway(message)) => {
            assert!(message.contains("Your card was declined."));
        }
        other => panic!("expected gateway error, got {:?}", other),
    }

    Ok(())
}

/// Expected: pending card payment for the fare in minor units, then succeeded after confirm
#[tokio::test]
async fn card_payment_confirms_from_gateway() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, _, ride) = test.completed_ride().await;
    let gateway = FakeGateway::new("requires_payment_method");

    let payments = PaymentService::new(&test.db, Some(&gateway as &dyn PaymentGateway), CURRENCY);
    let card = payments.create_card_payment(ride.id, rider.id).await?;

    assert_eq!(*gateway.created.lock().unwrap(), vec![8373]);
    assert_eq!(card.client_secret.as_deref(), Some("pi_fake_1_secret"));
    assert_eq!(card.payment.method, PaymentMethod::Card);
    assert_eq!(card.payment.status, PaymentStatus::Pending);
    assert_eq!(card.payment.amount, 83.73);
    assert_eq!(card.payment.paid_at, None);

    gateway.set_status("succeeded");
    let confirmed = payments.confirm_payment(card.payment.id, rider.id).await?;

    assert_eq!(confirmed.status, PaymentStatus::Succeeded);
    assert!(confirmed.paid_at.is_some());

    // A succeeded payment blocks another attempt
    let again = payments.create_card_payment(ride.id, rider.id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn confirm_is_limited_to_payment_owner() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, _, ride) = test.completed_ride().await;
    let stranger = test.insert_user(UserRole::Rider).await;
    let gateway = FakeGateway::new("processing");

    let payments = PaymentService::new(&test.db, Some(&gateway as &dyn PaymentGateway), CURRENCY);
    let card = payments.create_card_payment(ride.id, rider.id).await?;
    assert_eq!(card.payment.status, PaymentStatus::Processing);

    let result = payments.confirm_payment(card.payment.id, stranger.id).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    Ok(())
}

/// Expected: without a configured gateway card payments are refused up front
#[tokio::test]
async fn card_payment_requires_gateway() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, _, ride) = test.completed_ride().await;

    let result = PaymentService::new(&test.db, None, CURRENCY)
        .create_card_payment(ride.id, rider.id)
        .await;

    assert!(matches!(result, Err(AppError::PaymentGateway(_))));

    let listed = PaymentService::new(&test.db, None, CURRENCY)
        .list_for_user(rider.id)
        .await?;
    assert!(listed.is_empty());

    Ok(())
}

/// Expected: once a card payment has succeeded, the wallet is not debited for the same ride
#[tokio::test]
async fn wallet_payment_refused_after_card_success() -> TestResult {
    let test = TestSetup::new().await;
    let (rider, _, ride) = test.completed_ride().await;
    let gateway = FakeGateway::new("succeeded");
    let wallets = WalletService::new(&test.db, CURRENCY);
    wallets.credit(rider.id, 100.0, "top-up").await?;

    let payments = PaymentService::new(&test.db, Some(&gateway as &dyn PaymentGateway), CURRENCY);
    let card = payments.create_card_payment(ride.id, rider.id).await?;
    assert_eq!(card.payment.status, PaymentStatus::Succeeded);

    let result = payments.pay_with_wallet(ride.id, rider.id).await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(wallets.get_or_create_wallet(rider.id).await?.balance, 100.0);
    assert_eq!(wallets.history(rider.id).await?.len(), 1);

    Ok(())
}
