// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn substitution_prefers_name_then_phone() {
    assert_eq!(render_template("Halo {{name}}!", Some("Budi"), "628111"), "Halo Budi!");
    assert_eq!(render_template("Halo {{name}}!", None, "628111"), "Halo 628111!");
    assert_eq!(render_template("Halo {{name}}!", Some(""), "628111"), "Halo 628111!");
}

#[test]
fn phone_variable_substitutes() {
    assert_eq!(
        render_template("{{name}} ({{phone}})", Some("Budi"), "628111"),
        "Budi (628111)"
    );
}

#[test]
fn identity_on_templates_without_variables() {
    let template = "Promo akhir pekan, diskon 20%!";
    assert_eq!(render_template(template, Some("Budi"), "628111"), template);
    assert_eq!(render_template(template, None, "628111"), template);
}

#[test]
fn document_meta_guesses_from_url() {
    let (filename, mimetype) = document_meta("https://cdn.example.com/files/katalog.pdf");
    assert_eq!(filename, "katalog.pdf");
    assert_eq!(mimetype, "application/pdf");

    let (filename, mimetype) = document_meta("https://cdn.example.com/files/data.csv?sig=abc");
    assert_eq!(filename, "data.csv");
    assert_eq!(mimetype, "text/csv");

    let (filename, mimetype) = document_meta("https://cdn.example.com/blob");
    assert_eq!(filename, "blob");
    assert_eq!(mimetype, "application/octet-stream");
}
