//! Basic smoke test to verify the public API surface.

#[test]
fn crate_compiles() {
    let _ = std::any::type_name::<keyledger::KeyledgerConfig>();
    let _ = std::any::type_name::<keyledger::KeyledgerError>();
    let _ = std::any::type_name::<keyledger::EntitlementManager>();
}
