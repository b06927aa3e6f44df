//! C6 — metrics engine. Pure functions: `turn_metrics` (turn → per-turn
//! numbers) and `session_metrics` (reduction of turn metrics → session
//! totals, averages, peaks, and the composite efficiency score), per spec
//! §4.6.

use std::collections::HashMap;

use crate::pricing::{self, PricingTable, TokenClass};
use crate::types::{
    Averages, CodeMetrics, CostTotals, EfficiencyComponents, Peaks, SessionMetrics, ToolBreakdown,
    TokenTotals, Turn, TurnMetrics,
};

/// Configurable efficiency weights and the `codeOutputRatio` clamp
/// multiplier (spec §9: both are heuristics and must be configurable).
#[derive(Debug, Clone, Copy)]
pub struct EfficiencyConfig {
    pub cache_weight: f64,
    pub tool_success_weight: f64,
    pub context_weight: f64,
    pub code_output_weight: f64,
    /// `codeOutputRatio` is scaled by this before being clamped to
    /// `[0, 100]` and folded into the composite score.
    pub code_output_clamp_multiplier: f64,
}

impl Default for EfficiencyConfig {
    fn default() -> Self {
        Self {
            cache_weight: 0.25,
            tool_success_weight: 0.25,
            context_weight: 0.25,
            code_output_weight: 0.25,
            code_output_clamp_multiplier: 10.0,
        }
    }
}

/// Computes per-turn metrics (spec §3 `TurnMetrics`, §4.6).
pub fn turn_metrics(turn: &Turn, pricing: &PricingTable) -> TurnMetrics {
    let model_pricing = pricing.lookup(turn.model.as_deref().unwrap_or(pricing::FALLBACK_MODEL));

    let tokens = TokenTotals::from_turn_tokens(turn.usage);
    let cost = CostTotals {
        input: pricing::cost_for(&model_pricing, TokenClass::Input, turn.usage.input),
        output: pricing::cost_for(&model_pricing, TokenClass::Output, turn.usage.output),
        cache_creation: pricing::cost_for(
            &model_pricing,
            TokenClass::CacheCreation,
            turn.usage.cache_creation,
        ),
        cache_read: pricing::cost_for(&model_pricing, TokenClass::CacheRead, turn.usage.cache_read),
        total: 0.0,
    };
    let cost = CostTotals {
        total: cost.input + cost.output + cost.cache_creation + cost.cache_read,
        ..cost
    };

    let context_usage_percent = pricing::context_usage_percent(
        turn.usage.input,
        turn.usage.cache_read,
        model_pricing.max_context_tokens,
    );

    let mut tool_breakdown: ToolBreakdown = HashMap::new();
    for tool in &turn.tool_uses {
        *tool_breakdown.entry(tool.name.clone()).or_insert(0) += 1;
    }

    let code_metrics = CodeMetrics {
        files_changed: turn.code_changes.len() as u64,
        lines_added: turn.code_changes.iter().map(|c| c.lines_added).sum(),
        lines_removed: turn.code_changes.iter().map(|c| c.lines_removed).sum(),
    };

    TurnMetrics {
        turn_id: turn.id.clone(),
        turn_number: turn.turn_number,
        timestamp: turn.started_at,
        tokens,
        cost,
        duration_ms: turn.duration_ms,
        context_usage_percent,
        tool_count: turn.tool_uses.len() as u64,
        tool_breakdown,
        code_metrics,
    }
}

/// Reduces a session's turns and their metrics into `SessionMetrics`,
/// including the composite efficiency score (spec §4.6). Takes both `turns`
/// and their `turn_metrics` because tool success rate needs per-tool error
/// flags that live on `Turn`, not on the already-aggregated `TurnMetrics`.
pub fn session_metrics(
    session_id: &str,
    turns: &[Turn],
    turn_metrics_list: &[TurnMetrics],
    cfg: &EfficiencyConfig,
) -> SessionMetrics {
    let turn_count = turn_metrics_list.len() as u32;

    let mut tokens = TokenTotals::default();
    let mut cost = CostTotals::default();
    let mut duration_ms: i64 = 0;
    let mut tool_count: u64 = 0;
    let mut code_metrics = CodeMetrics::default();
    let mut tool_breakdown: ToolBreakdown = HashMap::new();
    let mut peaks = Peaks::default();
    let mut context_usage_sum = 0.0;

    for tm in turn_metrics_list {
        tokens.add(&tm.tokens);
        cost.add(&tm.cost);
        duration_ms += tm.duration_ms;
        tool_count += tm.tool_count;
        code_metrics.add(&tm.code_metrics);
        for (name, count) in &tm.tool_breakdown {
            *tool_breakdown.entry(name.clone()).or_insert(0) += count;
        }
        context_usage_sum += tm.context_usage_percent;

        peaks.max_tokens_in_turn = peaks.max_tokens_in_turn.max(tm.tokens.total);
        peaks.max_cost_in_turn = peaks.max_cost_in_turn.max(tm.cost.total);
        peaks.max_duration_ms = peaks.max_duration_ms.max(tm.duration_ms);
        peaks.max_context_usage_percent =
            peaks.max_context_usage_percent.max(tm.context_usage_percent);
    }

    let averages = if turn_count == 0 {
        Averages::default()
    } else {
        let n = turn_count as f64;
        Averages {
            tokens_per_turn: tokens.total as f64 / n,
            cost_per_turn: cost.total / n,
            duration_ms_per_turn: duration_ms as f64 / n,
            context_usage_percent: context_usage_sum / n,
        }
    };

    let (non_error_tools, total_tools) = turns.iter().fold((0u64, 0u64), |(ok, total), t| {
        let ok = ok + t.tool_uses.iter().filter(|tu| !tu.is_error).count() as u64;
        (ok, total + t.tool_uses.len() as u64)
    });

    let cache_utilization = pricing::cache_hit_rate(tokens.cache_read, tokens.cache_creation);
    let code_output_ratio = if tokens.total == 0 {
        0.0
    } else {
        (code_metrics.lines_added + code_metrics.lines_removed) as f64
            / (tokens.total as f64 / 1000.0)
    };
    let tool_success_rate = if total_tools == 0 {
        100.0
    } else {
        (non_error_tools as f64 / total_tools as f64) * 100.0
    };
    let context_efficiency = (100.0 * (1.0 - averages.context_usage_percent / 100.0)).clamp(0.0, 100.0);

    let clamped_code_output = (code_output_ratio * cfg.code_output_clamp_multiplier).min(100.0);
    let composite_score = cfg.cache_weight * cache_utilization
        + cfg.tool_success_weight * tool_success_rate
        + cfg.context_weight * context_efficiency
        + cfg.code_output_weight * clamped_code_output;

    let efficiency = EfficiencyComponents {
        cache_utilization,
        code_output_ratio,
        tool_success_rate,
        context_efficiency,
        composite_score: composite_score.clamp(0.0, 100.0),
    };

    SessionMetrics {
        session_id: session_id.to_string(),
        tokens,
        cost,
        duration_ms,
        tool_count,
        code_metrics,
        cost_breakdown: cost,
        averages,
        peaks,
        tool_breakdown,
        efficiency_score: efficiency.composite_score,
        cache_hit_rate: cache_utilization,
        efficiency,
        turn_count,
    }
}
