//! Demonstrates a full escrow lifecycle end to end:
//!
//! 1. Create and fund a milestone escrow
//! 2. Approve and release the first milestone
//! 3. Open a dispute over the remainder
//! 4. Resolve it with a partial release
//! 5. Refund what is left
//!
//! Run with: cargo run --example escrow_cycle

use std::sync::Arc;

use trustline_engine::{DisputeCoordinator, EngineConfig, EscrowEngine};
use trustline_gateway::{MemoryNotifier, MemoryPaymentGateway, MemoryPayoutGateway};
use trustline_store::MemoryStore;
use trustline_types::{
    Amount, CreateEscrowRequest, Currency, DisputeParty, DisputeResolution, MilestoneSpec,
    OrderId, PartyId, PaymentDetails,
};

#[tokio::main]
async fn main() -> trustline_types::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Trustline Escrow Lifecycle Demo                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let payouts = Arc::new(MemoryPayoutGateway::new());
    let engine = Arc::new(EscrowEngine::new(
        Arc::new(MemoryStore::new("escrow")),
        Arc::new(MemoryPaymentGateway::new()),
        payouts.clone(),
        Arc::new(MemoryNotifier::new()),
        EngineConfig::default(),
    ));
    let coordinator =
        DisputeCoordinator::new(engine.clone(), Arc::new(MemoryStore::new("dispute_index")));

    let buyer = PartyId::new();
    let seller = PartyId::new();

    // Create a $1,000 escrow split into two milestones
    let (account, version) = engine
        .create(CreateEscrowRequest {
            order_id: OrderId::new(),
            buyer: buyer.clone(),
            seller: seller.clone(),
            principal: Amount::major(1000, Currency::USD),
            milestones: vec![
                MilestoneSpec {
                    description: "Design mockups".to_string(),
                    amount: Amount::major(400, Currency::USD),
                    percentage_of_principal: 40,
                    due_date: None,
                },
                MilestoneSpec {
                    description: "Implementation".to_string(),
                    amount: Amount::major(600, Currency::USD),
                    percentage_of_principal: 60,
                    due_date: None,
                },
            ],
        })
        .await?;
    println!("✓ Created escrow {} ({}, fee {})", account.id, account.principal, account.fee);

    // Buyer funds it
    let (account, version) = engine
        .fund(
            &account.id,
            version,
            PaymentDetails {
                instrument: "card_tok_demo".to_string(),
                metadata: serde_json::json!({ "last4": "4242" }),
            },
        )
        .await?;
    println!("✓ Funded: status {:?}, version {}", account.status, version);

    // First milestone: approve, then release $400 to the seller
    let design = account.milestones[0].id.clone();
    let (_, version) = engine
        .approve_milestone(&account.id, &design, version, vec!["mockups.pdf".to_string()])
        .await?;
    let (account, version) = engine
        .release_milestone(&account.id, &design, version)
        .await?;
    println!(
        "✓ Milestone released: {} of {} paid out",
        account.released, account.principal
    );

    // The buyer disputes the second milestone
    let (account, version) = coordinator
        .open_dispute(
            &account.id,
            version,
            DisputeParty::Buyer,
            "implementation incomplete".to_string(),
            "delivered build fails the acceptance checklist".to_string(),
            vec!["qa_report.pdf".to_string()],
        )
        .await?;
    let dispute_id = account.dispute.as_ref().expect("dispute just opened").id.clone();
    println!("✓ Dispute {} opened: status {:?}", dispute_id, account.status);

    // Resolution splits the remainder: $250 to the seller now
    let (account, version) = coordinator
        .resolve(
            &dispute_id,
            version,
            DisputeResolution::PartialRelease,
            Some(Amount::major(250, Currency::USD)),
            "half of the remaining work was delivered".to_string(),
        )
        .await?;
    println!(
        "✓ Partial release: {} released, {} remaining, status {:?}",
        account.released,
        account.remaining(),
        account.status
    );

    // The parties abandon the order; the rest goes back to the buyer
    let (account, version) = engine
        .refund(&account.id, version, "order abandoned".to_string())
        .await?;
    println!(
        "✓ Refunded remainder: status {:?}, final version {}",
        account.status, version
    );

    println!();
    println!(
        "Seller received {}, buyer recovered {}",
        payouts.total_paid(&seller, Currency::USD).await,
        payouts.total_paid(&buyer, Currency::USD).await,
    );
    Ok(())
}
