// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_full_command() {
    let q = parse_command("cek ongkir dari jakarta ke bandung 2kg jne").expect("parse");
    assert_eq!(
        q,
        ShippingQuery {
            origin: "jakarta".into(),
            destination: "bandung".into(),
            weight_grams: 2000,
            courier: "jne".into(),
        }
    );
}

#[test]
fn dari_is_optional_and_defaults_apply() {
    let q = parse_command("cek ongkir jakarta ke surabaya").expect("parse");
    assert_eq!(q.origin, "jakarta");
    assert_eq!(q.destination, "surabaya");
    assert_eq!(q.weight_grams, 1000, "weight defaults to 1 kg");
    assert_eq!(q.courier, "jne", "courier defaults to jne");
}

#[test]
fn fractional_weight_and_courier() {
    let q = parse_command("CEK ONGKIR Jakarta ke Medan 1,5kg sicepat").expect("parse");
    assert_eq!(q.weight_grams, 1500);
    assert_eq!(q.courier, "sicepat");

    let q = parse_command("cek ongkir depok ke bogor 0.25 kg tiki").expect("parse");
    assert_eq!(q.weight_grams, 250);
    assert_eq!(q.courier, "tiki");
}

#[test]
fn non_commands_do_not_parse() {
    assert!(parse_command("berapa ongkir ke bandung?").is_none());
    assert!(parse_command("cek ongkir jakarta").is_none());
    assert!(parse_command("halo").is_none());
}

#[test]
fn quote_format_lists_each_service() {
    let query = parse_command("cek ongkir jakarta ke bandung 2kg jne").expect("parse");
    let quote = ShippingQuote {
        services: vec![
            ShippingService {
                service: "REG".into(),
                description: "Layanan Reguler".into(),
                cost: 18000,
                etd: "2-3".into(),
            },
            ShippingService {
                service: "YES".into(),
                description: "Yakin Esok Sampai".into(),
                cost: 36000,
                etd: "1-1".into(),
            },
        ],
    };
    let text = format_quote(&query, &quote);
    assert!(text.contains("jakarta"));
    assert!(text.contains("bandung"));
    assert!(text.contains("2 kg"));
    assert!(text.contains("JNE"));
    assert!(text.contains("REG"));
    assert!(text.contains("Rp18.000"));
    assert!(text.contains("Rp36.000"));
    assert!(text.contains("2-3"));
}

#[test]
fn help_reply_shows_format() {
    let help = help_reply();
    assert!(help.contains("cek ongkir"));
    assert!(help.contains("Contoh"));
}

#[test]
fn thousands_grouping() {
    assert_eq!(group_thousands(0), "0");
    assert_eq!(group_thousands(999), "999");
    assert_eq!(group_thousands(18000), "18.000");
    assert_eq!(group_thousands(1234567), "1.234.567");
}
