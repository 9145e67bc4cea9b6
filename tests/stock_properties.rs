//! Property tests: the ledger invariants hold over arbitrary committed
//! sequences, and totals are always recomputed from the lines.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use stockline::models::variant::VariantSelector;
use stockline::services::catalog::{ProductInput, VariantInput};
use stockline::{
    CatalogService, DraftLine, EventSender, InventoryConfig, InventoryService, MovementDraft,
    MovementKind, StockLedger,
};

fn harness() -> (Arc<CatalogService>, InventoryService) {
    let config = InventoryConfig::default();
    let (events, _rx) = EventSender::channel(config.event_channel_capacity);
    let ledger = Arc::new(StockLedger::new(
        events.clone(),
        config.default_low_stock_threshold,
    ));
    let catalog = Arc::new(CatalogService::new(
        ledger.clone(),
        events,
        config.default_low_stock_threshold,
    ));
    let service = InventoryService::new(catalog.clone(), ledger, config);
    (catalog, service)
}

async fn seed_variant(catalog: &CatalogService, sku: &str) -> Uuid {
    let product = catalog
        .publish_product(ProductInput {
            vendor_id: Uuid::new_v4(),
            name: sku.to_string(),
            brand: None,
            declared_attributes: Vec::new(),
            low_stock_threshold: None,
            variants: vec![VariantInput {
                sku: Some(sku.to_string()),
                price: dec!(10.00),
                sale_price: None,
                cost_price: dec!(4.00),
                weight_kg: None,
                dimensions: None,
                attributes: BTreeMap::new(),
            }],
        })
        .await
        .expect("seed product publishes");
    catalog.variants_of_product(product.id)[0].id
}

#[derive(Debug, Clone)]
enum Op {
    Receive(u32),
    WriteOff(u32),
    Return(u32),
    Reserve(i64),
    Release(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..200).prop_map(Op::Receive),
        (1u32..120).prop_map(Op::WriteOff),
        (1u32..120).prop_map(Op::Return),
        (1i64..60).prop_map(Op::Reserve),
        (1i64..60).prop_map(Op::Release),
    ]
}

fn draft_for(kind: MovementKind, variant_id: Uuid, quantity: u32) -> MovementDraft {
    let mut draft = MovementDraft::new(kind, "PROP-DOC");
    if kind.requires_counterparty() {
        draft.counterparty_id = Some(Uuid::new_v4());
    }
    draft.lines.push(DraftLine {
        variant: VariantSelector::Id(variant_id),
        quantity,
        unit_cost: dec!(1.25),
        note: None,
    });
    draft
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Non-negativity: whatever the op sequence, `on_hand >= 0` and
    /// `0 <= reserved <= on_hand` after every step, and the counters match
    /// an independently tracked model.
    #[test]
    fn counters_never_break_invariants(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        rt.block_on(async move {
            let (catalog, service) = harness();
            let variant_id = seed_variant(&catalog, "PROP").await;

            let mut model_on_hand: i64 = 0;
            let mut model_reserved: i64 = 0;

            for op in ops {
                match op {
                    Op::Receive(quantity) => {
                        let draft = draft_for(MovementKind::PurchaseOrder, variant_id, quantity);
                        let document = service.validate(&draft).expect("inbound always validates");
                        service.commit(document).await.expect("inbound always commits");
                        model_on_hand += i64::from(quantity);
                    }
                    Op::WriteOff(quantity) | Op::Return(quantity) => {
                        let kind = if matches!(op, Op::WriteOff(_)) {
                            MovementKind::LossDamage
                        } else {
                            MovementKind::SupplierReturn
                        };
                        let draft = draft_for(kind, variant_id, quantity);
                        match service.validate(&draft) {
                            Ok(document) => {
                                service.commit(document).await.expect("validated outbound commits");
                                model_on_hand -= i64::from(quantity);
                            }
                            Err(failure) => {
                                // Only the availability rule can fire here.
                                prop_assert!(
                                    i64::from(quantity) > model_on_hand - model_reserved,
                                    "unexpected rejection: {failure}"
                                );
                            }
                        }
                    }
                    Op::Reserve(quantity) => {
                        if service.ledger().reserve(variant_id, quantity).await.is_ok() {
                            model_reserved += quantity;
                        }
                    }
                    Op::Release(quantity) => {
                        if service.ledger().release(variant_id, quantity).await.is_ok() {
                            model_reserved -= quantity;
                        }
                    }
                }

                let levels = service.stock_levels(variant_id).expect("record exists");
                prop_assert!(levels.on_hand >= 0);
                prop_assert!(levels.reserved >= 0);
                prop_assert!(levels.reserved <= levels.on_hand);
                prop_assert_eq!(levels.available, levels.on_hand - levels.reserved);
                prop_assert_eq!(levels.on_hand, model_on_hand);
                prop_assert_eq!(levels.reserved, model_reserved);
            }
            Ok(())
        })?;
    }

    /// Total correctness: grand total and unit count always equal the sums
    /// over the lines, independent of anything the caller supplies.
    #[test]
    fn totals_equal_line_sums(
        quantities in proptest::collection::vec(1u32..500, 1..12),
        cents in proptest::collection::vec(1u32..100_000, 12),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        rt.block_on(async move {
            let (catalog, service) = harness();

            let mut draft = MovementDraft::new(MovementKind::PurchaseOrder, "PROP-TOTALS");
            draft.counterparty_id = Some(Uuid::new_v4());

            let mut expected_total = Decimal::ZERO;
            let mut expected_units: u64 = 0;
            for (index, quantity) in quantities.iter().enumerate() {
                let sku = format!("PROP-{index}");
                let variant_id = seed_variant(&catalog, &sku).await;
                let unit_cost = Decimal::new(i64::from(cents[index]), 2);
                draft.lines.push(DraftLine {
                    variant: VariantSelector::Id(variant_id),
                    quantity: *quantity,
                    unit_cost,
                    note: None,
                });
                expected_total += unit_cost * Decimal::from(*quantity);
                expected_units += u64::from(*quantity);
            }

            let document = service.validate(&draft).expect("purchase order validates");
            prop_assert_eq!(document.totals().grand_total, expected_total);
            prop_assert_eq!(document.totals().total_units, expected_units);
            prop_assert_eq!(
                document.totals().line_totals.len(),
                document.lines().len()
            );

            let receipt = service.commit(document).await.expect("purchase order commits");
            prop_assert_eq!(receipt.totals.grand_total, expected_total);
            Ok(())
        })?;
    }
}
