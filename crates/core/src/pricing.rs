//! C1 — pricing table. Pure data plus a lookup with fallback, per spec §4.1.

use std::collections::HashMap;

/// Per-million-token prices plus the model's context window, in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_m: f64,
    pub output_per_m: f64,
    pub cache_creation_per_m: f64,
    pub cache_read_per_m: f64,
    pub max_context_tokens: u64,
}

/// Token class a price applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Input,
    Output,
    CacheCreation,
    CacheRead,
}

impl ModelPricing {
    pub fn per_m(&self, class: TokenClass) -> f64 {
        match class {
            TokenClass::Input => self.input_per_m,
            TokenClass::Output => self.output_per_m,
            TokenClass::CacheCreation => self.cache_creation_per_m,
            TokenClass::CacheRead => self.cache_read_per_m,
        }
    }
}

/// Cost for `n` tokens of `class`, rounded to micro-cent (6 decimal places).
pub fn cost_for(pricing: &ModelPricing, class: TokenClass, n: u64) -> f64 {
    round6((n as f64 / 1_000_000.0) * pricing.per_m(class))
}

/// `min(100, (input + cacheRead) / maxContext * 100)`, rounded to 2 decimals.
pub fn context_usage_percent(input_tokens: u64, cache_read_tokens: u64, max_context: u64) -> f64 {
    if max_context == 0 {
        return 0.0;
    }
    let pct = ((input_tokens + cache_read_tokens) as f64 / max_context as f64) * 100.0;
    round2(pct.min(100.0))
}

/// `cacheRead / (cacheRead + cacheCreation) * 100`, zero if denominator is zero.
pub fn cache_hit_rate(cache_read: u64, cache_creation: u64) -> f64 {
    let denom = cache_read + cache_creation;
    if denom == 0 {
        return 0.0;
    }
    round2((cache_read as f64 / denom as f64) * 100.0)
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// The model name used when a lookup falls back to the default entry.
pub const FALLBACK_MODEL: &str = "default";

/// Maps model identifier to price. Lookup order (spec §4.1/§9 fallback): exact
/// match, then the key as a prefix of the model id, then the model id as a
/// prefix of the key — favouring the longest candidate in each tier, so a
/// versioned id like `claude-3-5-sonnet-20241022` matches a `claude-3-5-sonnet`
/// entry without needing an exhaustive table of every dated snapshot.
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new(entries: HashMap<String, ModelPricing>) -> Self {
        Self { entries }
    }

    /// The table this system ships with. Grounded in the general shape of a
    /// hardcoded default table with an explicit fallback entry; prices
    /// themselves are inputs (spec Non-goals: correctness of prices is out of
    /// scope).
    pub fn default_table() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "claude-3-5-sonnet".to_string(),
            ModelPricing {
                input_per_m: 3.00,
                output_per_m: 15.00,
                cache_creation_per_m: 3.75,
                cache_read_per_m: 0.30,
                max_context_tokens: 200_000,
            },
        );
        entries.insert(
            "claude-3-5-haiku".to_string(),
            ModelPricing {
                input_per_m: 0.80,
                output_per_m: 4.00,
                cache_creation_per_m: 1.00,
                cache_read_per_m: 0.08,
                max_context_tokens: 200_000,
            },
        );
        entries.insert(
            "claude-3-opus".to_string(),
            ModelPricing {
                input_per_m: 15.00,
                output_per_m: 75.00,
                cache_creation_per_m: 18.75,
                cache_read_per_m: 1.50,
                max_context_tokens: 200_000,
            },
        );
        entries.insert(
            FALLBACK_MODEL.to_string(),
            ModelPricing {
                input_per_m: 3.00,
                output_per_m: 15.00,
                cache_creation_per_m: 3.75,
                cache_read_per_m: 0.30,
                max_context_tokens: 200_000,
            },
        );
        Self { entries }
    }

    /// Looks up pricing for a model id, falling back to [`FALLBACK_MODEL`]
    /// when nothing matches.
    pub fn lookup(&self, model: &str) -> ModelPricing {
        if let Some(p) = self.entries.get(model) {
            return *p;
        }
        if let Some(p) = self.best_prefix_match(model) {
            return p;
        }
        self.entries[FALLBACK_MODEL]
    }

    fn best_prefix_match(&self, model: &str) -> Option<ModelPricing> {
        let key_is_prefix = self
            .entries
            .iter()
            .filter(|(k, _)| k.as_str() != FALLBACK_MODEL && model.starts_with(k.as_str()))
            .max_by_key(|(k, _)| k.len());
        if let Some((_, p)) = key_is_prefix {
            return Some(*p);
        }
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != FALLBACK_MODEL && k.starts_with(model))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, p)| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_scenario_s1_cost_and_context_usage() {
        let pricing = ModelPricing {
            input_per_m: 3.00,
            output_per_m: 15.00,
            cache_creation_per_m: 3.75,
            cache_read_per_m: 0.30,
            max_context_tokens: 200_000,
        };
        let input_cost = cost_for(&pricing, TokenClass::Input, 10);
        let output_cost = cost_for(&pricing, TokenClass::Output, 5);
        assert!((input_cost - 0.00003).abs() < 1e-9);
        assert!((output_cost - 0.000075).abs() < 1e-9);
        assert_eq!(context_usage_percent(10, 0, 200_000), 0.01);
    }

    #[test]
    fn cache_hit_rate_is_zero_with_no_cache_activity() {
        assert_eq!(cache_hit_rate(0, 0), 0.0);
    }

    #[test]
    fn cache_hit_rate_computes_ratio() {
        assert_eq!(cache_hit_rate(80, 20), 80.0);
    }

    #[test]
    fn lookup_exact_match() {
        let table = PricingTable::default_table();
        let p = table.lookup("claude-3-5-sonnet");
        assert_eq!(p.input_per_m, 3.00);
    }

    #[test]
    fn lookup_falls_back_when_key_is_prefix_of_model_id() {
        let table = PricingTable::default_table();
        let p = table.lookup("claude-3-5-sonnet-20241022");
        assert_eq!(p.input_per_m, 3.00);
    }

    #[test]
    fn lookup_falls_back_to_default_for_unknown_model() {
        let table = PricingTable::default_table();
        let p = table.lookup("some-future-model-nobody-has-heard-of");
        assert_eq!(p, table.entries[FALLBACK_MODEL]);
    }

    #[test]
    fn context_usage_clamps_to_100() {
        assert_eq!(context_usage_percent(500_000, 0, 200_000), 100.0);
    }
}
