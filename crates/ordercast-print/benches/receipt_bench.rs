// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for receipt rendering in the ordercast-print crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ordercast_core::types::{LineItem, Order};
use ordercast_print::receipt::{ReceiptFormatter, escape_xml};

/// A busy table: many items, free text that needs escaping.
fn large_order() -> Order {
    Order {
        id: "bench-order".into(),
        order_number: Some("98231".into()),
        location: "siteA".into(),
        customer_name: "Smith & Sons <catering>".into(),
        customer_phone: "+1 555 0100".into(),
        customer_email: "orders@example.com".into(),
        items: (0..40)
            .map(|i| LineItem {
                name: format!("Dish #{i} \"house\" special"),
                quantity: (i % 4) + 1,
                price: 7.5 + f64::from(i),
            })
            .collect(),
        total_amount: 1234.5,
        delivery_method: "delivery".into(),
        notes: "Leave at the back door; ring twice & wait".into(),
        created_at: None,
    }
}

fn bench_format_raw(c: &mut Criterion) {
    let formatter = ReceiptFormatter::default();
    let order = large_order();
    c.bench_function("format_raw_40_items", |b| {
        b.iter(|| formatter.format_raw(black_box(&order)));
    });
}

fn bench_format_control_xml(c: &mut Criterion) {
    let formatter = ReceiptFormatter::default();
    let order = large_order();
    c.bench_function("format_control_xml_40_items", |b| {
        b.iter(|| formatter.format_control_xml(black_box(&order)));
    });
}

fn bench_escape_xml(c: &mut Criterion) {
    let text = "Tom & \"Jerry\" <b>'s</b> ".repeat(64);
    c.bench_function("escape_xml_1_5k", |b| {
        b.iter(|| escape_xml(black_box(&text)));
    });
}

criterion_group!(benches, bench_format_raw, bench_format_control_xml, bench_escape_xml);
criterion_main!(benches);
