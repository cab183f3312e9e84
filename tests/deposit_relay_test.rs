//! Deposit Relay Tests - Idempotent Delivery Under Races
//!
//! Exercises the deposit relay against a mocked destination: nonce
//! races, deliveries applied by a competing relayer, reverted receipts
//! and mismatching records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use mockall::mock;
use mockall::predicate::eq;

use relay_book_packer::error::PackerError;
use relay_book_packer::ports::deposit::{DepositDestination, DepositPayload, DepositRecord};
use relay_book_packer::usecases::{DeliveryOutcome, DepositRelay, RetryPolicy};

mock! {
    pub Destination {}

    #[async_trait::async_trait]
    impl DepositDestination for Destination {
        fn relayer_address(&self) -> Address;
        async fn pending_nonce(&self, address: Address) -> anyhow::Result<u64>;
        async fn send_delivery(&self, payload: &DepositPayload, nonce: u64) -> anyhow::Result<String>;
        async fn confirm_delivery(&self, tx_hash: &str) -> anyhow::Result<bool>;
        async fn lookup_deposit(&self, deposit_id: B256) -> anyhow::Result<Option<DepositRecord>>;
    }
}

fn payload() -> DepositPayload {
    DepositPayload {
        deposit_id: B256::repeat_byte(0xde),
        recipient: Address::repeat_byte(0xaa),
        amount: U256::from(1_000_000u64),
    }
}

fn relay(destination: MockDestination) -> DepositRelay<MockDestination> {
    DepositRelay::new(Arc::new(destination), RetryPolicy::new(5, Duration::from_millis(1)))
}

fn destination() -> MockDestination {
    let mut destination = MockDestination::new();
    destination
        .expect_relayer_address()
        .return_const(Address::repeat_byte(0x01));
    destination
}

#[tokio::test]
async fn test_nonce_races_then_delivery_with_fresh_nonce() {
    let mut destination = destination();
    let next = Arc::new(AtomicU64::new(7));
    let next_ref = Arc::clone(&next);
    destination
        .expect_pending_nonce()
        .with(eq(Address::repeat_byte(0x01)))
        .times(3)
        .returning(move |_| Ok(next_ref.fetch_add(1, Ordering::SeqCst)));
    destination
        .expect_send_delivery()
        .times(3)
        .returning(|_, nonce| {
            if nonce < 9 {
                Err(PackerError::from_message("nonce too low").into())
            } else {
                Ok(format!("0xtx{nonce}"))
            }
        });
    destination
        .expect_confirm_delivery()
        .times(1)
        .returning(|_| Ok(true));

    let mut relay = relay(destination);
    let outcome = relay.deliver(&payload()).await.unwrap();
    assert_eq!(
        outcome,
        DeliveryOutcome::Delivered {
            tx_hash: "0xtx9".into()
        }
    );
    assert_eq!(relay.delivered_count(), 1);
}

#[tokio::test]
async fn test_second_delivery_counts_once() {
    let mut destination = destination();
    destination.expect_pending_nonce().times(1).returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .times(1)
        .returning(|_, _| Ok("0xfirst".into()));
    destination
        .expect_confirm_delivery()
        .times(1)
        .returning(|_| Ok(true));

    let mut relay = relay(destination);
    relay.deliver(&payload()).await.unwrap();
    let again = relay.deliver(&payload()).await.unwrap();

    assert_eq!(again, DeliveryOutcome::Duplicate);
    assert_eq!(relay.delivered_count(), 1);
}

#[tokio::test]
async fn test_already_processed_with_matching_record_is_success() {
    let mut destination = destination();
    destination.expect_pending_nonce().returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .times(1)
        .returning(|_, _| Err(PackerError::from_message("execution reverted: already processed").into()));
    destination
        .expect_lookup_deposit()
        .with(eq(B256::repeat_byte(0xde)))
        .returning(|_| {
            Ok(Some(DepositRecord {
                recipient: Address::repeat_byte(0xaa),
                amount: U256::from(1_000_000u64),
            }))
        });

    let mut relay = relay(destination);
    let outcome = relay.deliver(&payload()).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::AlreadyProcessed { verified: true });
    assert_eq!(relay.delivered_count(), 1);
}

#[tokio::test]
async fn test_already_processed_with_different_contents_is_rejected() {
    let mut destination = destination();
    destination.expect_pending_nonce().returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .returning(|_, _| Err(anyhow::anyhow!("Deposit processed")));
    destination.expect_lookup_deposit().returning(|_| {
        Ok(Some(DepositRecord {
            recipient: Address::repeat_byte(0xbb),
            amount: U256::from(1_000_000u64),
        }))
    });

    let mut relay = relay(destination);
    let err = relay.deliver(&payload()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PackerError>(),
        Some(PackerError::DepositMismatch { .. })
    ));
    assert_eq!(relay.delivered_count(), 0);
}

#[tokio::test]
async fn test_already_processed_without_record_is_accepted() {
    let mut destination = destination();
    destination.expect_pending_nonce().returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .returning(|_, _| Err(PackerError::from_message("already processed").into()));
    destination.expect_lookup_deposit().returning(|_| Ok(None));

    let mut relay = relay(destination);
    let outcome = relay.deliver(&payload()).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::AlreadyProcessed { verified: false });
}

#[tokio::test]
async fn test_other_errors_fail_on_first_attempt() {
    let mut destination = destination();
    destination.expect_pending_nonce().times(1).returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .times(1)
        .returning(|_, _| Err(PackerError::from_message("execution reverted: paused").into()));
    destination.expect_lookup_deposit().times(0);

    let mut relay = relay(destination);
    let err = relay.deliver(&payload()).await.unwrap_err();
    assert!(format!("{err:#}").contains("paused"));
    assert_eq!(relay.delivered_count(), 0);
}

#[tokio::test]
async fn test_batch_report_counts_each_outcome() {
    let mut destination = destination();
    destination.expect_pending_nonce().returning(|_| Ok(0));
    destination.expect_send_delivery().returning(|payload, _| {
        if payload.deposit_id == B256::repeat_byte(0xde) {
            Ok("0xok".into())
        } else {
            Err(PackerError::from_message("execution reverted: paused").into())
        }
    });
    destination
        .expect_confirm_delivery()
        .times(1)
        .returning(|_| Ok(true));

    let other = DepositPayload {
        deposit_id: B256::repeat_byte(0x02),
        ..payload()
    };
    let mut relay = relay(destination);
    let report = relay.deliver_all(&[payload(), payload(), other]).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_reverted_delivery_is_not_counted() {
    let mut destination = destination();
    destination.expect_pending_nonce().returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .times(2)
        .returning(|_, _| Ok("0xreverted".into()));
    let mut receipts = mockall::Sequence::new();
    destination
        .expect_confirm_delivery()
        .times(1)
        .in_sequence(&mut receipts)
        .returning(|_| Ok(false));
    destination
        .expect_confirm_delivery()
        .times(1)
        .in_sequence(&mut receipts)
        .returning(|_| Ok(true));
    destination.expect_lookup_deposit().times(1).returning(|_| Ok(None));

    let mut relay = relay(destination);
    let err = relay.deliver(&payload()).await.unwrap_err();
    assert!(format!("{err:#}").contains("0xreverted reverted"));
    assert_eq!(relay.delivered_count(), 0);

    let retried = relay.deliver(&payload()).await.unwrap();
    assert_eq!(
        retried,
        DeliveryOutcome::Delivered {
            tx_hash: "0xreverted".into()
        }
    );
    assert_eq!(relay.delivered_count(), 1);
}

#[tokio::test]
async fn test_reverted_delivery_with_matching_record_lost_the_race() {
    let mut destination = destination();
    destination.expect_pending_nonce().returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .times(1)
        .returning(|_, _| Ok("0xlate".into()));
    destination
        .expect_confirm_delivery()
        .times(1)
        .returning(|_| Ok(false));
    destination.expect_lookup_deposit().returning(|_| {
        Ok(Some(DepositRecord {
            recipient: Address::repeat_byte(0xaa),
            amount: U256::from(1_000_000u64),
        }))
    });

    let mut relay = relay(destination);
    let outcome = relay.deliver(&payload()).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::AlreadyProcessed { verified: true });
    assert_eq!(relay.delivered_count(), 1);
}

#[tokio::test]
async fn test_missing_receipt_is_an_error() {
    let mut destination = destination();
    destination.expect_pending_nonce().returning(|_| Ok(0));
    destination
        .expect_send_delivery()
        .times(1)
        .returning(|_, _| Ok("0xslow".into()));
    destination
        .expect_confirm_delivery()
        .returning(|_| Err(PackerError::Transient("no receipt for delivery 0xslow within 120s".into()).into()));
    destination.expect_lookup_deposit().times(0);

    let mut relay = relay(destination);
    let err = relay.deliver(&payload()).await.unwrap_err();
    assert!(format!("{err:#}").contains("not confirmed"));
    assert_eq!(relay.delivered_count(), 0);
}
