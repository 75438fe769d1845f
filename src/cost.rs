//! Planner cost for a scripted scan.
//!
//! The script is opaque to the planner, so the estimate is a sequential scan
//! over whatever size statistics the host has, with a flat per-tuple charge
//! for running the interpreter.

/// Per-tuple CPU weight of one `each` call, in units of `cpu_tuple_cost`.
pub const SCRIPT_TUPLE_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelSize {
    pub pages: f64,
    pub tuples: f64,
}

impl Default for RelSize {
    fn default() -> Self { Self { pages: 0.0, tuples: 1000.0 } }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostParams {
    pub seq_page_cost: f64,
    pub cpu_tuple_cost: f64,
}

impl Default for CostParams {
    fn default() -> Self { Self { seq_page_cost: 1.0, cpu_tuple_cost: 0.01 } }
}

/// Cost of the scan's restriction clauses, as computed by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RestrictCost {
    pub startup: f64,
    pub per_tuple: f64,
}

/// Returns (startup_cost, total_cost).
pub fn estimate(rel: &RelSize, restrict: &RestrictCost, params: &CostParams) -> (f64, f64) {
    let startup = restrict.startup;
    let cpu_per_tuple = params.cpu_tuple_cost * SCRIPT_TUPLE_WEIGHT + restrict.per_tuple;
    let run = params.seq_page_cost * rel.pages + cpu_per_tuple * rel.tuples;
    (startup, startup + run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_relation_costs_one_per_tuple() {
        let (startup, total) = estimate(&RelSize::default(), &RestrictCost::default(), &CostParams::default());
        assert_eq!(startup, 0.0);
        assert!((total - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn restrictions_add_startup_and_per_tuple() {
        let rel = RelSize { pages: 10.0, tuples: 50.0 };
        let restrict = RestrictCost { startup: 2.5, per_tuple: 0.5 };
        let (startup, total) = estimate(&rel, &restrict, &CostParams::default());
        assert_eq!(startup, 2.5);
        assert!((total - (2.5 + 10.0 + 1.5 * 50.0)).abs() < 1e-9);
    }

    #[test]
    fn monotonic_in_size() {
        let p = CostParams::default();
        let r = RestrictCost::default();
        let mut last = 0.0;
        for n in [0.0, 1.0, 10.0, 1e6] {
            let (_, total) = estimate(&RelSize { pages: n, tuples: n }, &r, &p);
            assert!(total >= last);
            last = total;
        }
    }
}
