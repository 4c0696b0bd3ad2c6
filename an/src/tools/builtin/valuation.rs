//! valuation tool - deterministic valuation arithmetic
//!
//! The model is poor at compounding and discounting by hand, so these
//! calculations are exposed as a tool. All functions are pure.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Result of a discounted cash-flow valuation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dcf {
    pub present_value_of_cash_flows: f64,
    pub present_value_of_terminal: f64,
    pub enterprise_value: f64,
    pub equity_value: f64,
    pub per_share: Option<f64>,
}

/// Discounted cash flow with a Gordon-growth terminal value
///
/// `cash_flows[0]` is received one period from now. Rates are fractions
/// (0.09 for 9%). `net_debt` is subtracted from enterprise value.
pub fn dcf(
    cash_flows: &[f64],
    discount_rate: f64,
    terminal_growth: f64,
    net_debt: f64,
    shares: Option<f64>,
) -> Result<Dcf, String> {
    debug!(periods = cash_flows.len(), %discount_rate, %terminal_growth, "dcf: called");
    let Some(&last) = cash_flows.last() else {
        return Err("cash_flows must not be empty".to_string());
    };
    if discount_rate <= terminal_growth {
        return Err(format!(
            "discount_rate ({}) must exceed terminal_growth ({})",
            discount_rate, terminal_growth
        ));
    }
    if discount_rate <= -1.0 {
        return Err("discount_rate must be greater than -1".to_string());
    }

    let present_value_of_cash_flows: f64 = cash_flows
        .iter()
        .enumerate()
        .map(|(i, cf)| cf / (1.0 + discount_rate).powi(i as i32 + 1))
        .sum();
    let terminal = last * (1.0 + terminal_growth) / (discount_rate - terminal_growth);
    let present_value_of_terminal = terminal / (1.0 + discount_rate).powi(cash_flows.len() as i32);
    let enterprise_value = present_value_of_cash_flows + present_value_of_terminal;
    let equity_value = enterprise_value - net_debt;
    let per_share = match shares {
        Some(s) if s > 0.0 => Some(equity_value / s),
        Some(_) => return Err("shares must be positive".to_string()),
        None => None,
    };

    Ok(Dcf {
        present_value_of_cash_flows,
        present_value_of_terminal,
        enterprise_value,
        equity_value,
        per_share,
    })
}

/// Compound annual growth rate between two positive values
pub fn cagr(start: f64, end: f64, years: f64) -> Result<f64, String> {
    debug!(%start, %end, %years, "cagr: called");
    if start <= 0.0 || end <= 0.0 {
        return Err("start and end values must be positive".to_string());
    }
    if years <= 0.0 {
        return Err("years must be positive".to_string());
    }
    Ok((end / start).powf(1.0 / years) - 1.0)
}

/// Discount of price to intrinsic value, as a fraction of intrinsic value
pub fn margin_of_safety(intrinsic_value: f64, price: f64) -> Result<f64, String> {
    debug!(%intrinsic_value, %price, "margin_of_safety: called");
    if intrinsic_value <= 0.0 {
        return Err("intrinsic_value must be positive".to_string());
    }
    Ok((intrinsic_value - price) / intrinsic_value)
}

/// Price divided by a per-share metric (earnings, book, sales)
pub fn implied_multiple(price: f64, per_share_metric: f64) -> Result<f64, String> {
    debug!(%price, %per_share_metric, "implied_multiple: called");
    if per_share_metric == 0.0 {
        return Err("per_share_metric must not be zero".to_string());
    }
    Ok(price / per_share_metric)
}

/// Valuation calculator exposed to the model
pub struct ValuationTool;

fn number(input: &Value, key: &str) -> Result<f64, String> {
    input[key].as_f64().ok_or_else(|| format!("{} is required for this operation", key))
}

fn run_operation(input: &Value) -> Result<Value, String> {
    match input["operation"].as_str().unwrap_or_default() {
        "dcf" => {
            let cash_flows: Vec<f64> = input["cash_flows"]
                .as_array()
                .ok_or("cash_flows is required for dcf")?
                .iter()
                .filter_map(Value::as_f64)
                .collect();
            let result = dcf(
                &cash_flows,
                number(input, "discount_rate")?,
                number(input, "terminal_growth")?,
                input["net_debt"].as_f64().unwrap_or(0.0),
                input["shares"].as_f64(),
            )?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        }
        "cagr" => {
            let rate = cagr(number(input, "start")?, number(input, "end")?, number(input, "years")?)?;
            Ok(serde_json::json!({ "cagr": rate }))
        }
        "margin_of_safety" => {
            let margin = margin_of_safety(number(input, "intrinsic_value")?, number(input, "price")?)?;
            Ok(serde_json::json!({ "margin_of_safety": margin }))
        }
        "implied_multiple" => {
            let multiple = implied_multiple(number(input, "price")?, number(input, "per_share_metric")?)?;
            Ok(serde_json::json!({ "multiple": multiple }))
        }
        other => Err(format!("Unknown operation: {}", other)),
    }
}

#[async_trait]
impl Tool for ValuationTool {
    fn name(&self) -> &'static str {
        "valuation"
    }

    fn description(&self) -> &'static str {
        "Valuation arithmetic: dcf (cash_flows, discount_rate, terminal_growth, optional net_debt and shares), cagr (start, end, years), margin_of_safety (intrinsic_value, price), implied_multiple (price, per_share_metric). Rates are fractions."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["dcf", "cagr", "margin_of_safety", "implied_multiple"]
                },
                "cash_flows": {"type": "array", "items": {"type": "number"}},
                "discount_rate": {"type": "number"},
                "terminal_growth": {"type": "number"},
                "net_debt": {"type": "number"},
                "shares": {"type": "number"},
                "start": {"type": "number"},
                "end": {"type": "number"},
                "years": {"type": "number"},
                "intrinsic_value": {"type": "number"},
                "price": {"type": "number"},
                "per_share_metric": {"type": "number"}
            },
            "required": ["operation"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        debug!(?input, "ValuationTool::execute: called");
        let outcome = run_operation(&input);

        match outcome {
            Ok(value) => ToolResult::json(&value),
            Err(message) => {
                debug!(%message, "ValuationTool::execute: calculation rejected");
                ToolResult::error(message)
            }
        }
    }
}
