//! Browser-side smoke test of the exported API.
//!
//! Run with `wasm-pack test --headless --firefox econ-core`.

#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::*;

use econ_core::Simulation;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn reference_scenario_runs_in_browser() {
    let mut sim = Simulation::with_reference_scenario().unwrap();
    let report = sim.run().unwrap();
    assert!(report.solved);
    assert!(sim.trajectory("China").is_ok());
    assert!(sim.trajectory("Atlantis").is_err());
}

#[wasm_bindgen_test]
fn bad_document_is_rejected() {
    assert!(Simulation::new("[]").is_err());
}
