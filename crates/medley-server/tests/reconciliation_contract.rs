mod support;

use chrono::{Days, Utc};
use medley_model::{AppointmentId, SlotId};
use serde_json::{json, Value};
use support::{
    completed_event_body, post_json, send_raw, sign_webhook, spawn_default_server, TestServer,
    WEBHOOK_SECRET,
};

fn future_date(days: u64) -> String {
    (Utc::now().date_naive() + Days::new(days))
        .format("%Y-%m-%d")
        .to_string()
}

async fn create_slot(server: &TestServer, date: &str, capacity: u32) -> i64 {
    let body = json!({
        "date": date,
        "start_time": "09:00:00",
        "end_time": "09:30:00",
        "capacity": capacity,
    })
    .to_string();
    let (status, body) = post_json(server.addr, "/v1/slots", &body).await;
    assert_eq!(status, 201, "create slot: {body}");
    let parsed: Value = serde_json::from_str(&body).expect("slot json");
    parsed["slot"]["id"].as_i64().expect("slot id")
}

async fn reserve(server: &TestServer, slot_id: i64, patient: &str, date: &str) -> String {
    let body = json!({
        "slot_id": slot_id,
        "patient_id": patient,
        "appointment_date": date,
        "start_time": "09:00:00",
        "duration_minutes": 30,
        "reason": "checkup",
        "fee_cents": 5000,
    })
    .to_string();
    let (status, body) = post_json(server.addr, "/v1/appointments", &body).await;
    assert_eq!(status, 201, "reserve: {body}");
    let parsed: Value = serde_json::from_str(&body).expect("appointment json");
    parsed["appointment"]["id"].as_str().expect("id").to_string()
}

async fn open_checkout(server: &TestServer, appointment_id: &str) -> String {
    let body = json!({
        "appointment_id": appointment_id,
        "product_order_ref": null,
        "amount_cents": null,
        "success_url": "https://app.example/success",
        "cancel_url": "https://app.example/cancel",
    })
    .to_string();
    let (status, body) = post_json(server.addr, "/v1/checkout/sessions", &body).await;
    assert_eq!(status, 201, "checkout: {body}");
    let parsed: Value = serde_json::from_str(&body).expect("session json");
    parsed["session_id"].as_str().expect("session id").to_string()
}

async fn confirm(server: &TestServer, session_id: &str) -> (u16, Value) {
    let (status, body) = post_json(
        server.addr,
        "/v1/checkout/confirm",
        &json!({"session_id": session_id}).to_string(),
    )
    .await;
    let parsed: Value = serde_json::from_str(&body).expect("confirm json");
    (status, parsed)
}

async fn deliver_webhook(server: &TestServer, event_body: &str) -> (u16, Value) {
    let signature = sign_webhook(WEBHOOK_SECRET, event_body);
    let (status, body) = send_raw(
        server.addr,
        "POST",
        "/v1/webhooks/checkout",
        &[("x-checkout-signature", &signature)],
        event_body,
    )
    .await;
    let parsed: Value = serde_json::from_str(&body).expect("webhook response json");
    (status, parsed)
}

#[tokio::test]
async fn confirm_then_webhook_converges_on_one_payment() {
    let server = spawn_default_server().await;
    let date = future_date(7);
    let slot_id = create_slot(&server, &date, 1).await;
    let appointment_id = reserve(&server, slot_id, "p1", &date).await;
    let session_id = open_checkout(&server, &appointment_id).await;

    let session = server
        .gateway
        .complete_session(&session_id, Some("pi_100"))
        .await
        .expect("settle session");

    // Client-confirm path lands first.
    let (status, parsed) = confirm(&server, &session_id).await;
    assert_eq!(status, 200);
    assert_eq!(parsed["outcome"], "scheduled");
    assert_eq!(parsed["transaction_id"], "pi_100");
    assert_eq!(parsed["appointment"]["status"], "scheduled");
    assert_eq!(parsed["appointment"]["payment_status"], "paid");

    // The at-least-once webhook for the same charge is a no-op.
    let (status, parsed) = deliver_webhook(&server, &completed_event_body(&session)).await;
    assert_eq!(status, 200);
    assert_eq!(parsed["outcome"], "already_processed");

    let payments = server.store.list_payments().await.expect("payments");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].transaction_id.as_str(), "pi_100");

    let appointment = server
        .store
        .get_appointment(&AppointmentId::parse(&appointment_id).expect("id"))
        .await
        .expect("appointment");
    assert_eq!(appointment.status.as_str(), "scheduled");
}

#[tokio::test]
async fn webhook_then_confirm_is_equally_confluent() {
    let server = spawn_default_server().await;
    let date = future_date(7);
    let slot_id = create_slot(&server, &date, 1).await;
    let appointment_id = reserve(&server, slot_id, "p1", &date).await;
    let session_id = open_checkout(&server, &appointment_id).await;
    let session = server
        .gateway
        .complete_session(&session_id, Some("pi_200"))
        .await
        .expect("settle session");

    let (status, parsed) = deliver_webhook(&server, &completed_event_body(&session)).await;
    assert_eq!(status, 200);
    assert_eq!(parsed["outcome"], "scheduled");

    let (status, parsed) = confirm(&server, &session_id).await;
    assert_eq!(status, 200);
    assert_eq!(parsed["outcome"], "already_processed");

    assert_eq!(server.store.list_payments().await.expect("payments").len(), 1);
    let slot = server.store.get_slot(SlotId::new(slot_id)).await.expect("slot");
    assert_eq!(slot.booked_count, 1, "the held seat was reused, not re-claimed");
}

#[tokio::test]
async fn concurrent_confirm_and_webhook_produce_one_payment_row() {
    let server = spawn_default_server().await;
    let date = future_date(7);
    let slot_id = create_slot(&server, &date, 1).await;
    let appointment_id = reserve(&server, slot_id, "p1", &date).await;
    let session_id = open_checkout(&server, &appointment_id).await;
    let session = server
        .gateway
        .complete_session(&session_id, Some("pi_300"))
        .await
        .expect("settle session");

    let event = completed_event_body(&session);
    let ((confirm_status, confirm_body), (webhook_status, webhook_body)) =
        tokio::join!(confirm(&server, &session_id), deliver_webhook(&server, &event));

    assert_eq!(confirm_status, 200);
    assert_eq!(webhook_status, 200);
    let outcomes = [
        confirm_body["outcome"].as_str().expect("outcome"),
        webhook_body["outcome"].as_str().expect("outcome"),
    ];
    assert!(outcomes.contains(&"scheduled"), "{outcomes:?}");
    assert!(outcomes.contains(&"already_processed"), "{outcomes:?}");

    assert_eq!(server.store.list_payments().await.expect("payments").len(), 1);
}

#[tokio::test]
async fn webhook_retries_are_idempotent() {
    let server = spawn_default_server().await;
    let date = future_date(7);
    let slot_id = create_slot(&server, &date, 2).await;
    let appointment_id = reserve(&server, slot_id, "p1", &date).await;
    let session_id = open_checkout(&server, &appointment_id).await;
    let session = server
        .gateway
        .complete_session(&session_id, Some("pi_400"))
        .await
        .expect("settle session");

    let event = completed_event_body(&session);
    let (_, first) = deliver_webhook(&server, &event).await;
    assert_eq!(first["outcome"], "scheduled");
    for _ in 0..3 {
        let (status, parsed) = deliver_webhook(&server, &event).await;
        assert_eq!(status, 200);
        assert_eq!(parsed["outcome"], "already_processed");
    }
    assert_eq!(server.store.list_payments().await.expect("payments").len(), 1);
}

#[tokio::test]
async fn confirming_an_unpaid_session_is_rejected_without_writes() {
    let server = spawn_default_server().await;
    let date = future_date(7);
    let slot_id = create_slot(&server, &date, 1).await;
    let appointment_id = reserve(&server, slot_id, "p1", &date).await;
    let session_id = open_checkout(&server, &appointment_id).await;

    let (status, parsed) = confirm(&server, &session_id).await;
    assert_eq!(status, 409);
    assert_eq!(parsed["error"]["code"], "session_not_paid");
    assert!(server.store.list_payments().await.expect("payments").is_empty());
}

#[tokio::test]
async fn confirming_an_unknown_session_is_not_found() {
    let server = spawn_default_server().await;
    let (status, parsed) = confirm(&server, "cs_ghost").await;
    assert_eq!(status, 404);
    assert_eq!(parsed["error"]["code"], "session_not_found");
}

#[tokio::test]
async fn slot_filled_between_checkout_and_webhook_is_a_flagged_failure() {
    let server = spawn_default_server().await;
    let date = future_date(7);
    let slot_id = create_slot(&server, &date, 1).await;

    // A gateway-initiated order with no prior hold, for a slot that a
    // rival books while the shopper is on the hosted payment page.
    let order_details = json!({
        "type": "appointment",
        "slot_id": slot_id,
        "patient_id": "p1",
        "appointment_date": date,
        "start_time": "09:00:00",
        "duration_minutes": 30,
        "reason": "checkup",
        "fee_cents": 5000,
    })
    .to_string();
    reserve(&server, slot_id, "rival", &date).await;

    let event = json!({
        "id": "evt_late",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_late",
            "payment_status": "paid",
            "amount_total": 5000,
            "payment_intent": "pi_late",
            "metadata": { "order_details": order_details },
        }}
    })
    .to_string();

    let (status, parsed) = deliver_webhook(&server, &event).await;
    assert_eq!(status, 409, "{parsed}");
    assert_eq!(parsed["error"]["code"], "reconciliation_failed");
    assert_eq!(parsed["error"]["details"]["transaction_id"], "pi_late");
    assert!(
        parsed["error"]["details"]["follow_up"]
            .as_str()
            .expect("follow_up")
            .contains("manual"),
        "failure carries the follow-up instruction"
    );

    // The charge is flagged, not silently recorded or lost locally.
    assert!(server.store.list_payments().await.expect("payments").is_empty());
    assert_eq!(server.metrics_failed_total(), 1);
    let slot = server.store.get_slot(SlotId::new(slot_id)).await.expect("slot");
    assert_eq!(slot.booked_count, 1, "no overbooking");
}

#[tokio::test]
async fn product_orders_reconcile_through_the_same_barrier() {
    let server = spawn_default_server().await;
    let body = json!({
        "appointment_id": null,
        "product_order_ref": "ord-9",
        "amount_cents": 1299,
        "success_url": "https://app.example/success",
        "cancel_url": "https://app.example/cancel",
    })
    .to_string();
    let (status, body) = post_json(server.addr, "/v1/checkout/sessions", &body).await;
    assert_eq!(status, 201, "{body}");
    let parsed: Value = serde_json::from_str(&body).expect("session json");
    let session_id = parsed["session_id"].as_str().expect("session id").to_string();

    server
        .gateway
        .complete_session(&session_id, Some("pi_prod"))
        .await
        .expect("settle session");

    let (status, parsed) = confirm(&server, &session_id).await;
    assert_eq!(status, 200);
    assert_eq!(parsed["outcome"], "recorded");

    let (_, parsed) = confirm(&server, &session_id).await;
    assert_eq!(parsed["outcome"], "already_processed");

    let payments = server.store.list_payments().await.expect("payments");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].product_order_ref.as_deref(), Some("ord-9"));
}
