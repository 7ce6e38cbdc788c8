//! Reference code canonicalization and deterministic generation.
//!
//! A canonical code is `<PREFIX>_<code>` where `PREFIX` is a fixed-length,
//! upper-case, letters-only abbreviation of the supplier name. Everything in
//! this module is pure: no I/O, no clock, no configuration lookups beyond the
//! [`IngestConfig`] handed in.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::IngestConfig;
use crate::entities::ReferenceOrigin;

/// Prefix used when the supplier name carries no letters at all.
pub const FALLBACK_PREFIX: &str = "SUP";

const PREFIX_PAD: char = 'X';

/// `.` must also match newlines, otherwise a code containing one would be
/// prefixed again on every pass.
static CANONICAL_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^([A-Z]+)_.+$").unwrap());

/// What the resolver was given for one line.
#[derive(Debug, Clone, Copy)]
pub struct LineReference<'a> {
    pub raw_code: Option<&'a str>,
    pub supplier_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub invoice_number: Option<&'a str>,
    /// Origin recorded when `raw_code` is present
    pub origin: ReferenceOrigin,
}

/// Outcome of resolving one line's reference code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Resolution {
    /// Trimmed code as supplied, kept for audit
    pub raw_code: Option<String>,
    pub code: Option<String>,
    pub origin: Option<ReferenceOrigin>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.code.is_some()
    }
}

/// Canonicalizes supplied codes and fabricates missing ones.
#[derive(Debug, Clone)]
pub struct ReferenceCodeResolver {
    prefix_len: usize,
    hash_len: usize,
    enforce_prefix: bool,
    auto_generate: bool,
}

impl ReferenceCodeResolver {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            prefix_len: config.reference_code_prefix_len.max(1),
            hash_len: config.reference_code_hash_len.max(1),
            enforce_prefix: config.enforce_reference_code_prefix,
            auto_generate: config.auto_reference_code,
        }
    }

    /// Letters of the supplier name, upper-cased, cut or padded to the prefix length.
    pub fn supplier_prefix(&self, supplier_name: Option<&str>) -> String {
        let letters: String = supplier_name
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_uppercase())
            .take(self.prefix_len)
            .collect();

        let base = if letters.is_empty() {
            FALLBACK_PREFIX.chars().take(self.prefix_len).collect()
        } else {
            letters
        };

        let padding = self.prefix_len.saturating_sub(base.len());
        let mut prefix = base;
        prefix.extend(std::iter::repeat(PREFIX_PAD).take(padding));
        prefix
    }

    pub fn is_canonical(&self, code: &str) -> bool {
        CANONICAL_CODE_RE
            .captures(code)
            .and_then(|caps| caps.get(1))
            .is_some_and(|prefix| prefix.as_str().len() == self.prefix_len)
    }

    /// Canonical form of `raw_code`, or `None` when it is absent or blank.
    ///
    /// Already-canonical input comes back unchanged, so applying this twice
    /// gives the same result as applying it once.
    pub fn normalize(&self, raw_code: Option<&str>, supplier_name: Option<&str>) -> Option<String> {
        let code = raw_code.map(str::trim).filter(|c| !c.is_empty())?;
        if self.is_canonical(code) {
            return Some(code.to_string());
        }
        Some(format!("{}_{}", self.supplier_prefix(supplier_name), code))
    }

    /// Deterministic code derived from the supplier, description and invoice
    /// number. `None` when there is neither a description nor an invoice number.
    pub fn generate(
        &self,
        supplier_name: Option<&str>,
        description: Option<&str>,
        invoice_number: Option<&str>,
    ) -> Option<String> {
        let blank = |v: Option<&str>| v.map_or(true, str::is_empty);
        if blank(description) && blank(invoice_number) {
            return None;
        }

        let seed = format!(
            "{}|{}|{}",
            supplier_name.unwrap_or_default(),
            description.unwrap_or_default(),
            invoice_number.unwrap_or_default()
        );
        let digest = Sha256::digest(seed.trim().as_bytes());
        let mut hash = URL_SAFE_NO_PAD.encode(digest);
        hash.truncate(self.hash_len);

        Some(format!("{}_{}", self.supplier_prefix(supplier_name), hash))
    }

    /// Applies the prefix and auto-generation gates to one line.
    pub fn resolve(&self, line: LineReference<'_>) -> Resolution {
        let raw_code = line
            .raw_code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        if let Some(raw) = raw_code {
            let code = if self.enforce_prefix {
                self.normalize(Some(&raw), line.supplier_name)
            } else {
                Some(raw.clone())
            };
            return Resolution {
                raw_code: Some(raw),
                code,
                origin: Some(line.origin),
            };
        }

        if self.auto_generate {
            if let Some(code) =
                self.generate(line.supplier_name, line.description, line.invoice_number)
            {
                return Resolution {
                    raw_code: None,
                    code: Some(code),
                    origin: Some(ReferenceOrigin::Auto),
                };
            }
        }

        Resolution::default()
    }
}

/// Canonical form of a supplied code under `config`.
pub fn resolve_reference_code(
    raw_code: Option<&str>,
    supplier_name: Option<&str>,
    config: &IngestConfig,
) -> Option<String> {
    ReferenceCodeResolver::new(config).normalize(raw_code, supplier_name)
}

/// Deterministic fabricated code under `config`.
pub fn generate_reference_code(
    supplier_name: Option<&str>,
    description: Option<&str>,
    invoice_number: Option<&str>,
    config: &IngestConfig,
) -> Option<String> {
    ReferenceCodeResolver::new(config).generate(supplier_name, description, invoice_number)
}
