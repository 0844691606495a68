// Artifact signing benchmarks.
//
// Covers the Gemini HMAC signature window for a full block, Uphold transfer
// signing, and PayPal conversion of a maximum-size batch.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;

use settlement::config::{GEMINI_BULK_PAY_PATH, GEMINI_MAX_BLOCK_SIZE, PAYPAL_MAX_ROWS};
use settlement::crypto::keys::SigningKeypair;
use settlement::custodian::gemini::{sign_window, tx_ref, BulkPayoutPayload, PayoutPayload};
use settlement::custodian::paypal::PayoutCurrency;
use settlement::custodian::uphold::sign_transfer;
use settlement::custodian::PaypalGenerator;
use settlement::transaction::{Custodian, Payout, WalletType};

fn payout(custodian: Custodian, wallet_type: WalletType, n: usize) -> Payout {
    Payout {
        altcurrency: "BAT".into(),
        amount: Decimal::new(1234, 2),
        currency: "BAT".into(),
        destination: format!("dest-{n}"),
        origin: format!("publishers#uuid:{n}"),
        channel: format!("channel-{n}.com"),
        custodian,
        wallet_provider_id: format!("provider-{n}"),
        settlement_id: "settlement-bench".into(),
        wallet_type,
        note: None,
        signed_tx: None,
    }
}

fn bench_gemini_sign_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("gemini/sign_window");
    for size in [1usize, 100, GEMINI_MAX_BLOCK_SIZE] {
        let payload = BulkPayoutPayload {
            request: GEMINI_BULK_PAY_PATH.into(),
            nonce: 1_700_000_000_000,
            payouts: (0..size)
                .map(|n| {
                    let p = payout(Custodian::Gemini, WalletType::Contribution, n);
                    PayoutPayload {
                        tx_ref: tx_ref(&p),
                        amount: p.amount,
                        currency: p.currency,
                        destination: p.destination,
                        account: None,
                    }
                })
                .collect(),
            client_id: "client-bench".into(),
            account: None,
        };
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| sign_window(b"bench-secret", payload).unwrap());
        });
    }
    group.finish();
}

fn bench_uphold_sign_transfer(c: &mut Criterion) {
    let signer = SigningKeypair::generate();
    let p = payout(Custodian::Uphold, WalletType::Contribution, 7);

    c.bench_function("uphold/sign_transfer", |b| {
        b.iter(|| sign_transfer(&signer, "card-bench", &p).unwrap());
    });
}

fn bench_paypal_build_records(c: &mut Criterion) {
    let payouts: Vec<Payout> = (0..PAYPAL_MAX_ROWS)
        .map(|n| payout(Custodian::Paypal, WalletType::Default, n))
        .collect();
    let rate = Decimal::new(4567, 2);

    let mut group = c.benchmark_group("paypal/build_records");
    group.throughput(Throughput::Elements(payouts.len() as u64));
    group.bench_function("max_rows", |b| {
        b.iter(|| {
            PaypalGenerator
                .build_records(PayoutCurrency::Jpy, rate, &payouts)
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_gemini_sign_window,
    bench_uphold_sign_transfer,
    bench_paypal_build_records,
);
criterion_main!(benches);
