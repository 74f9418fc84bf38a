//! Multi-step order processing driven one step at a time.
//!
//! Demonstrates:
//! - Typed activity input and output through serde
//! - Input mapping from session memory
//! - Branch suggestions and an optional notification step
//! - Retrying a flaky activity

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use stepline::prelude::*;
use stepline::{JsonType, ObjectSchema};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Order {
    id: String,
    items: Vec<OrderItem>,
    payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderItem {
    product_id: String,
    quantity: u32,
    price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PaymentMethod {
    CreditCard,
    BankTransfer,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payment {
    order_id: String,
    amount: f64,
    status: String,
}

fn parse<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, ActivityError> {
    serde_json::from_value(value.clone()).map_err(|e| ActivityError::failed(e.to_string()))
}

struct ValidateOrder;

#[async_trait]
impl ActivityHandler for ValidateOrder {
    async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError> {
        let order: Order = parse(ctx.input())?;
        if order.items.is_empty() {
            return Ok(ActivityResult::failure("Order has no items"));
        }
        let total: f64 = order
            .items
            .iter()
            .map(|item| item.price * f64::from(item.quantity))
            .sum();
        println!("Validated order {} (total {:.2})", order.id, total);
        Ok(ActivityResult::ok(json!({ "order": order, "total": total })))
    }
}

/// Fails on its first call to show retries.
struct ReserveInventory {
    calls: AtomicU32,
}

#[async_trait]
impl ActivityHandler for ReserveInventory {
    async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ActivityError::failed("inventory service busy"));
        }
        let order: Order = parse(&ctx.input()["order"])?;
        let reserved: Vec<&str> = order
            .items
            .iter()
            .map(|item| item.product_id.as_str())
            .collect();
        println!("Reserved {:?}", reserved);
        Ok(ActivityResult::ok(json!({ "reserved": reserved })))
    }
}

struct ChargePayment;

#[async_trait]
impl ActivityHandler for ChargePayment {
    async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError> {
        let order: Order = parse(&ctx.input()["order"])?;
        let amount = ctx.input()["total"].as_f64().unwrap_or_default();
        let status = match order.payment_method {
            PaymentMethod::CreditCard => "captured",
            PaymentMethod::BankTransfer => "pending",
        };
        let payment = Payment {
            order_id: order.id,
            amount,
            status: status.to_string(),
        };
        Ok(ActivityResult::ok(json!(payment)))
    }
}

struct NotifyCustomer;

#[async_trait]
impl ActivityHandler for NotifyCustomer {
    async fn run(&self, ctx: &mut ActivityContext) -> Result<ActivityResult, ActivityError> {
        let payment: Payment = parse(ctx.input())?;
        println!(
            "Notified customer: order {} is {}",
            payment.order_id, payment.status
        );
        Ok(ActivityResult::ok(json!({ "notified": true })))
    }
}

fn build_workflow() -> Result<Workflow, WorkflowError> {
    let validate = Activity::new("validate_order", ValidateOrder)
        .with_description("Checks the order and computes its total")
        .with_input_validator(
            ObjectSchema::new()
                .required("id", JsonType::String)
                .required("items", JsonType::Array)
                .required("paymentMethod", JsonType::String),
        );

    let reserve = Activity::new(
        "reserve_inventory",
        ReserveInventory {
            calls: AtomicU32::new(0),
        },
    )
    .with_retry(RetryPolicy::exponential(3, Duration::from_millis(50)))
    .with_timeout(Duration::from_secs(2));

    let charge = Step::new(Activity::new("charge_payment", ChargePayment))
        .map_input(|_input, memory| {
            memory
                .get("validate_order")
                .cloned()
                .ok_or_else(|| ActivityError::failed("order was not validated"))
        })
        .branch(
            Branch::new("send_transfer_instructions", |data, _, _| {
                data["status"] == "pending"
            })
            .with_params(|data, _, _| json!({ "orderId": data["orderId"] }))
            .with_description("Payment awaits a bank transfer"),
        );

    Workflow::builder("order_processing")
        .description("Validate, reserve, charge, notify")
        .step(validate)
        .step(reserve)
        .step(charge)
        .step(Step::new(Activity::new("notify_customer", NotifyCustomer)).optional())
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let order = Order {
        id: "ORD-123".to_string(),
        items: vec![
            OrderItem {
                product_id: "PROD-001".to_string(),
                quantity: 2,
                price: 29.99,
            },
            OrderItem {
                product_id: "PROD-002".to_string(),
                quantity: 1,
                price: 49.99,
            },
        ],
        payment_method: PaymentMethod::BankTransfer,
    };

    let workflow = build_workflow()?;
    println!(
        "Tools: {} / {}",
        workflow.start_tool_name(),
        workflow.continue_tool_name()
    );

    let mut response = workflow.start(serde_json::to_value(&order)?).await?;
    loop {
        println!("{}", serde_json::to_string_pretty(&response)?);
        match &response {
            WorkflowResponse::Step(step) => {
                for option in &step.branch_options {
                    println!(
                        "  option: {} (priority {:?})",
                        option.tool_name, option.priority
                    );
                }
                let session_id = step.session_id.clone();
                response = workflow.continue_session(&session_id).await?;
            }
            WorkflowResponse::Completed(done) => {
                println!("Finished in {}ms", done.execution_time_ms);
                break;
            }
            WorkflowResponse::Failed(failure) => {
                println!("Failed: {}", failure.error);
                break;
            }
        }
    }

    let session = workflow.session_status(response.session_id()).await?;
    println!(
        "Session {} ended as {} after {} steps",
        session.session_id,
        session.status,
        session.history.len()
    );
    Ok(())
}
