// src/application/usecase/signal_evaluation_usecase.rs
// Signal evaluation: run calculation routines and turn their values into events

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::domain::errors::{SignalError, SignalResult};
use crate::domain::model::{BarWindow, Condition, Side, SignalRule, SignalSpec};

/// Make sure the window holds the numeric column for `spec` and return its name.
///
/// A column already present under the signal's name (exact or normalized
/// match) is reused without running the calculation. Otherwise the routine
/// runs once over the whole window. On failure any columns the routine added
/// are removed again and the error names the signal.
pub fn evaluate_signal(window: &mut BarWindow, spec: &SignalSpec) -> SignalResult<String> {
    if let Some(existing) = window.find_numeric_column(&spec.name) {
        log::debug!("Reusing column '{}' for signal '{}'", existing, spec.name);
        return Ok(existing.to_string());
    }

    let before: HashSet<String> = window.column_names().into_iter().collect();
    let calculation = spec.calculation.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| calculation.calculate(window)));

    let result = match outcome {
        Ok(Ok(column)) => verify_column(window, spec, column),
        Ok(Err(e)) => Err(SignalError::computation(&spec.name, e)),
        Err(payload) => Err(SignalError::computation(
            &spec.name,
            format!("calculation panicked: {}", panic_message(payload.as_ref())),
        )),
    };

    if result.is_err() {
        for name in window.column_names() {
            if !before.contains(&name) {
                window.remove_column(&name);
            }
        }
    }

    if let Ok(column) = &result {
        log::debug!("Signal '{}' computed into column '{}'", spec.name, column);
    }
    result
}

fn verify_column(window: &BarWindow, spec: &SignalSpec, column: String) -> SignalResult<String> {
    if column.trim().is_empty() {
        return Err(SignalError::computation(
            &spec.name,
            "calculation did not name a column",
        ));
    }
    match window.numeric(&column) {
        Ok(values) if values.len() == window.len() => Ok(column),
        Ok(values) => Err(SignalError::computation(
            &spec.name,
            format!(
                "column '{}' has {} values for {} bars",
                column,
                values.len(),
                window.len()
            ),
        )),
        Err(_) => Err(SignalError::computation(
            &spec.name,
            format!("declared column '{}' is not a numeric column of the window", column),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Flag every bar whose `column` value satisfies `condition` in the side's
/// event column. Existing flags are kept (logical OR). Returns the number of
/// bars that satisfied the condition.
pub fn apply_condition(
    window: &mut BarWindow,
    column: &str,
    condition: &Condition,
    side: Side,
) -> SignalResult<usize> {
    let hits: Vec<bool> = window
        .numeric(column)?
        .iter()
        .map(|value| condition.holds(*value))
        .collect();

    let flags = window.ensure_flag_column(side.event_column())?;
    for (flag, hit) in flags.iter_mut().zip(&hits) {
        *flag |= *hit;
    }

    let count = hits.iter().filter(|hit| **hit).count();
    log::debug!(
        "{} condition '{} {}' fired on {} of {} bars",
        side,
        column,
        condition,
        count,
        hits.len()
    );
    Ok(count)
}

/// Evaluate `condition` for a single bar only. Returns whether it held.
pub fn apply_condition_at(
    window: &mut BarWindow,
    column: &str,
    condition: &Condition,
    side: Side,
    index: usize,
) -> SignalResult<bool> {
    let value = window
        .numeric(column)?
        .get(index)
        .copied()
        .ok_or_else(|| SignalError::malformed(column, format!("no bar at index {}", index)))?;

    let hit = condition.holds(value);
    let flags = window.ensure_flag_column(side.event_column())?;
    if hit {
        flags[index] = true;
    }
    Ok(hit)
}

/// Evaluate a rule's signal over the whole window and merge its events into
/// the side's event column. Returns the signal column name.
pub fn evaluate_rule(window: &mut BarWindow, rule: &SignalRule, side: Side) -> SignalResult<String> {
    let column = evaluate_signal(window, &rule.spec)?;
    apply_condition(window, &column, &rule.condition, side)?;
    Ok(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Bar;
    use crate::domain::service::CalculationError;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn window(closes: &[f64]) -> BarWindow {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        BarWindow::from_bars(closes.iter().enumerate().map(|(i, c)| {
            Bar::new(start + Duration::minutes(i as i64), *c, c + 1.0, c - 1.0, *c, 1.0).unwrap()
        }))
    }

    fn close_copy(name: &'static str) -> SignalSpec {
        SignalSpec::new(
            name,
            Arc::new(move |w: &mut BarWindow| -> Result<String, CalculationError> {
                let values = w.closes().into_iter().map(Some).collect();
                w.set_numeric_column(name, values)?;
                Ok(name.to_string())
            }),
        )
    }

    #[test]
    fn computes_a_new_column() {
        let mut w = window(&[1.0, 2.0, 3.0]);
        let column = evaluate_signal(&mut w, &close_copy("price")).unwrap();
        assert_eq!(column, "price");
        assert_eq!(w.numeric("price").unwrap(), &[Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn reuses_existing_column_without_running_the_calculation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let spec = SignalSpec::new(
            "Moving Average",
            Arc::new(move |_: &mut BarWindow| -> Result<String, CalculationError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("should not run".into())
            }),
        );

        let mut w = window(&[1.0, 2.0]);
        w.set_numeric_column("moving_average", vec![None, Some(1.5)]).unwrap();

        assert_eq!(evaluate_signal(&mut w, &spec).unwrap(), "moving_average");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn routine_failure_names_the_signal_and_cleans_up() {
        let spec = SignalSpec::new(
            "broken",
            Arc::new(|w: &mut BarWindow| -> Result<String, CalculationError> {
                w.set_numeric_column("scratch", vec![None; w.len()])?;
                Err("boom".into())
            }),
        );
        let mut w = window(&[1.0, 2.0]);

        let err = evaluate_signal(&mut w, &spec).unwrap_err();
        assert_eq!(err, SignalError::computation("broken", "boom"));
        assert!(!w.has_column("scratch"));
    }

    #[test]
    fn undeclared_column_is_a_computation_error() {
        let spec = SignalSpec::new(
            "ghost",
            Arc::new(|_: &mut BarWindow| -> Result<String, CalculationError> {
                Ok("ghost_values".to_string())
            }),
        );
        let mut w = window(&[1.0]);
        assert!(matches!(
            evaluate_signal(&mut w, &spec),
            Err(SignalError::Computation { .. })
        ));
    }

    #[test]
    fn panicking_routine_is_a_computation_error() {
        let spec = SignalSpec::new(
            "panicky",
            Arc::new(|_: &mut BarWindow| -> Result<String, CalculationError> {
                panic!("index out of range")
            }),
        );
        let mut w = window(&[1.0]);
        match evaluate_signal(&mut w, &spec) {
            Err(SignalError::Computation { signal, reason }) => {
                assert_eq!(signal, "panicky");
                assert!(reason.contains("index out of range"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn condition_merges_with_existing_flags() {
        let mut w = window(&[10.0, 20.0, 30.0, 40.0]);
        let column = evaluate_signal(&mut w, &close_copy("price")).unwrap();

        let low = Condition::parse("<", dec!(15)).unwrap();
        let high = Condition::parse(">", dec!(35)).unwrap();
        assert_eq!(apply_condition(&mut w, &column, &low, Side::Buy).unwrap(), 1);
        assert_eq!(apply_condition(&mut w, &column, &high, Side::Buy).unwrap(), 1);

        assert_eq!(w.flags("buy_signal").unwrap(), &[true, false, false, true]);
        assert!(!w.has_column("sell_signal"));
    }

    #[test]
    fn missing_values_never_fire() {
        let mut w = window(&[1.0, 2.0, 3.0]);
        w.set_numeric_column("sma", vec![None, None, Some(2.0)]).unwrap();

        let any = Condition::parse("!=", dec!(-1)).unwrap();
        apply_condition(&mut w, "sma", &any, Side::Sell).unwrap();
        assert_eq!(w.flags("sell_signal").unwrap(), &[false, false, true]);
    }

    #[test]
    fn single_bar_condition_only_touches_that_bar() {
        let mut w = window(&[50.0, 50.0, 50.0]);
        let column = evaluate_signal(&mut w, &close_copy("price")).unwrap();
        let cond = Condition::parse(">=", dec!(50)).unwrap();

        assert!(apply_condition_at(&mut w, &column, &cond, Side::Buy, 2).unwrap());
        assert_eq!(w.flags("buy_signal").unwrap(), &[false, false, true]);
        assert!(apply_condition_at(&mut w, &column, &cond, Side::Buy, 3).is_err());
    }

    #[test]
    fn condition_on_missing_column_is_malformed() {
        let mut w = window(&[1.0]);
        let cond = Condition::parse(">", dec!(0)).unwrap();
        assert!(matches!(
            apply_condition(&mut w, "nope", &cond, Side::Buy),
            Err(SignalError::Malformed { .. })
        ));
    }
}
