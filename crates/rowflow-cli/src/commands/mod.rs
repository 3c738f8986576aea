pub mod check;
pub mod run;
pub mod stages;

use rowflow_engine::StageRegistry;

/// Built-in stages plus every adapter this binary ships with.
pub fn registry() -> StageRegistry {
    let mut registry = StageRegistry::with_builtins();
    rowflow_sqlite::register(&mut registry);
    registry
}
