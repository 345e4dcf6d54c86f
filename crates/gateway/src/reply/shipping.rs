// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `cek ongkir` domain command: parse, query the shipping-cost
//! collaborator, format the reply. Any provider error collapses into the
//! canonical help reply.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::GatewayError;

/// Parsed shipping-cost request. Weight is normalized to grams, courier
/// defaults to `jne`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingQuery {
    pub origin: String,
    pub destination: String,
    pub weight_grams: u32,
    pub courier: String,
}

fn command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern, exercised by tests
        let re = Regex::new(
            r"(?i)^\s*cek\s+ongkir\s+(?:dari\s+)?(\S+)\s+ke\s+(\S+)(?:\s+(\d+(?:[.,]\d+)?)\s*kg)?(?:\s+([a-zA-Z]+))?\s*$",
        )
        .unwrap();
        re
    })
}

/// Parse the command; `None` means the text is not a shipping request.
pub fn parse_command(text: &str) -> Option<ShippingQuery> {
    let caps = command_re().captures(text)?;
    let origin = caps.get(1)?.as_str().to_lowercase();
    let destination = caps.get(2)?.as_str().to_lowercase();
    let weight_kg: f64 = caps
        .get(3)
        .map(|m| m.as_str().replace(',', "."))
        .and_then(|s| s.parse().ok())
        .unwrap_or(1.0);
    let weight_grams = (weight_kg * 1000.0).round().max(1.0) as u32;
    let courier = caps
        .get(4)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| "jne".to_owned());
    Some(ShippingQuery { origin, destination, weight_grams, courier })
}

/// One service offering inside a quote.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingService {
    pub service: String,
    pub description: String,
    pub cost: u64,
    /// Estimated delivery, e.g. "2-3".
    pub etd: String,
}

/// A resolved quote.
#[derive(Debug, Clone)]
pub struct ShippingQuote {
    pub services: Vec<ShippingService>,
}

/// Shipping-cost collaborator seam.
#[async_trait]
pub trait ShippingProvider: Send + Sync {
    async fn cost(&self, query: &ShippingQuery) -> Result<ShippingQuote, GatewayError>;
}

/// Format a quote as the customer-facing reply.
pub fn format_quote(query: &ShippingQuery, quote: &ShippingQuote) -> String {
    let mut out = format!(
        "📦 Ongkos kirim {} → {}\nBerat: {} kg | Kurir: {}\n",
        query.origin,
        query.destination,
        query.weight_grams as f64 / 1000.0,
        query.courier.to_uppercase(),
    );
    for service in &quote.services {
        out.push_str(&format!(
            "\n• {} ({})\n  Rp{} — estimasi {} hari",
            service.service,
            service.description,
            group_thousands(service.cost),
            service.etd,
        ));
    }
    out
}

/// Canonical help reply for malformed requests and provider failures.
pub fn help_reply() -> String {
    "Format cek ongkir:\n\
     cek ongkir <asal> ke <tujuan> [berat]kg [kurir]\n\
     Contoh: cek ongkir jakarta ke bandung 2kg jne"
        .to_owned()
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

// -- HTTP provider ------------------------------------------------------------

/// RajaOngkir-style HTTP client.
pub struct HttpShippingProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpShippingProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { http, base_url, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct CostEnvelope {
    rajaongkir: CostBody,
}

#[derive(Debug, Deserialize)]
struct CostBody {
    #[serde(default)]
    results: Vec<CourierResult>,
}

#[derive(Debug, Deserialize)]
struct CourierResult {
    #[serde(default)]
    costs: Vec<ServiceCost>,
}

#[derive(Debug, Deserialize)]
struct ServiceCost {
    service: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    cost: Vec<CostDetail>,
}

#[derive(Debug, Deserialize)]
struct CostDetail {
    value: u64,
    #[serde(default)]
    etd: String,
}

#[async_trait]
impl ShippingProvider for HttpShippingProvider {
    async fn cost(&self, query: &ShippingQuery) -> Result<ShippingQuote, GatewayError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::dependency("shipping API key not configured"))?;

        let weight = query.weight_grams.to_string();
        let response = self
            .http
            .post(format!("{}/cost", self.base_url))
            .header("key", key)
            .form(&[
                ("origin", query.origin.as_str()),
                ("destination", query.destination.as_str()),
                ("weight", weight.as_str()),
                ("courier", query.courier.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::dependency(format!("shipping request: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::dependency(format!(
                "shipping provider returned {}",
                response.status()
            )));
        }

        let envelope: CostEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::dependency(format!("shipping response: {e}")))?;

        let services = envelope
            .rajaongkir
            .results
            .into_iter()
            .flat_map(|r| r.costs)
            .filter_map(|c| {
                let detail = c.cost.into_iter().next()?;
                Some(ShippingService {
                    service: c.service,
                    description: c.description,
                    cost: detail.value,
                    etd: detail.etd,
                })
            })
            .collect::<Vec<_>>();

        if services.is_empty() {
            return Err(GatewayError::dependency("shipping provider returned no services"));
        }
        Ok(ShippingQuote { services })
    }
}

#[cfg(test)]
#[path = "shipping_tests.rs"]
mod tests;
