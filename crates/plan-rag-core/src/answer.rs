//! Answer assembly: authoritative recomputation of table sums.
//!
//! Every table that leaves the query pipeline passes through [`assemble`].
//! Sums produced by a language model (or stored with a scraped plan) are
//! discarded and recomputed from the cells.

use crate::models::{Answer, Plan, Table};

/// Recompute every row's sum and return the aggregate of the row sums.
pub fn update_sums(table: &mut Table) -> f64 {
    let mut total = 0.0;
    for row in table.0.iter_mut() {
        row.update_sum();
        total += row.sum;
    }
    total
}

/// Turn a plan into an [`Answer`], recomputing all sums unconditionally.
pub fn assemble(plan: Plan) -> Answer {
    let Plan {
        title,
        description,
        mut table,
    } = plan;
    let total = update_sums(&mut table);
    Answer {
        title,
        description,
        table,
        total,
    }
}
